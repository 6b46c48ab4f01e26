use thiserror::Error;

/// Errors crossing component boundaries of the notice relay.
///
/// Payload decoding problems and unknown notice codes are not represented
/// here: the formatter absorbs them and always produces a message.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The upstream notice store could not be queried (connect, timeout, decode).
    #[error("Notice store unavailable: {0}")]
    StoreUnavailable(String),

    /// A single message could not be handed to the chat transport.
    #[error("Delivery to {destination} failed: {reason}")]
    DeliveryFailed { destination: i64, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for RelayError {
    fn from(e: sqlx::Error) -> Self {
        RelayError::StoreUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
