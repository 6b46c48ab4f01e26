pub mod bot;

pub use bot::{BotConfig, OneBotConfig, MAX_ONEBOT_RETRIES};
