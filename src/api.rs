// src/api.rs
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use tower_http::cors::CorsLayer;

use crate::commands::{CommandHandler, IncomingMessage};
use crate::gate::{BroadcastGate, GateChange};
use crate::notify::DeliverySink;

#[derive(Clone)]
pub struct AppState {
    pub gate: BroadcastGate,
    pub commands: CommandHandler,
    pub sink: Arc<dyn DeliverySink>,
    /// Bearer token for the HTTP broadcast switch. `None` disables the
    /// HTTP switch; chat commands still work.
    pub admin_token: Option<String>,
    /// OneBot `secret` used to check `X-Signature` on inbound events.
    /// `None` rejects every event.
    pub event_secret: Option<String>,
}

type HmacSha1 = Hmac<Sha1>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/broadcast", get(broadcast_status))
        .route("/broadcast/open", post(broadcast_open))
        .route("/broadcast/close", post(broadcast_close))
        .route("/onebot/event", post(onebot_event))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct GateStatus {
    enabled: bool,
}

#[derive(Serialize)]
struct GateToggle {
    enabled: bool,
    changed: bool,
}

async fn broadcast_status(State(state): State<AppState>) -> Json<GateStatus> {
    Json(GateStatus {
        enabled: state.gate.get(),
    })
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.admin_token.as_deref() else {
        return false;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|got| bool::from(got.as_bytes().ct_eq(expected.as_bytes())))
}

fn toggle(state: &AppState, headers: &HeaderMap, enable: bool) -> Response {
    if !authorized(state, headers) {
        tracing::warn!(target: "api", enable, "unauthorized broadcast toggle");
        return StatusCode::FORBIDDEN.into_response();
    }
    let change = state.gate.set(enable);
    Json(GateToggle {
        enabled: state.gate.get(),
        changed: change == GateChange::Changed,
    })
    .into_response()
}

async fn broadcast_open(State(state): State<AppState>, headers: HeaderMap) -> Response {
    toggle(&state, &headers, true)
}

async fn broadcast_close(State(state): State<AppState>, headers: HeaderMap) -> Response {
    toggle(&state, &headers, false)
}

/// Subset of a OneBot v11 event we care about.
#[derive(Debug, Deserialize)]
struct OneBotEvent {
    #[serde(default)]
    post_type: String,
    #[serde(default)]
    message_type: Option<String>,
    #[serde(default)]
    group_id: Option<i64>,
    #[serde(default)]
    user_id: Option<i64>,
    #[serde(default)]
    raw_message: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

impl OneBotEvent {
    fn into_message(self) -> Option<IncomingMessage> {
        if self.post_type != "message" {
            return None;
        }
        let text = self.raw_message.or_else(|| match self.message {
            Some(serde_json::Value::String(s)) => Some(s),
            _ => None,
        })?;
        let group_id = match self.message_type.as_deref() {
            Some("group") => self.group_id,
            _ => None,
        };
        Some(IncomingMessage {
            group_id,
            user_id: self.user_id?,
            text,
        })
    }
}

/// `X-Signature: sha1=<hex>` must be the HMAC-SHA1 of the raw body under `secret`.
fn signature_valid(secret: &str, headers: &HeaderMap, body: &[u8]) -> bool {
    let Some(sig) = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("sha1="))
    else {
        return false;
    };
    let Ok(expected) = hex::decode(sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha1::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

async fn onebot_event(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    let Some(secret) = state.event_secret.as_deref() else {
        tracing::warn!(target: "api", "event rejected: onebot.secret is not configured");
        return StatusCode::FORBIDDEN;
    };
    if !signature_valid(secret, &headers, &body) {
        tracing::warn!(target: "api", "event rejected: bad or missing X-Signature");
        return StatusCode::UNAUTHORIZED;
    }
    let ev: OneBotEvent = match serde_json::from_slice(&body) {
        Ok(ev) => ev,
        Err(e) => {
            tracing::debug!(target: "api", error = %e, "malformed event body");
            return StatusCode::BAD_REQUEST;
        }
    };
    let Some(msg) = ev.into_message() else {
        return StatusCode::NO_CONTENT;
    };
    let Some(reply) = state.commands.handle(&msg).await else {
        return StatusCode::NO_CONTENT;
    };
    if let Some(group) = msg.group_id {
        if let Err(e) = state.sink.deliver(group, &reply).await {
            tracing::warn!(target: "api", group, error = %e, "command reply failed");
        }
    }
    StatusCode::NO_CONTENT
}
