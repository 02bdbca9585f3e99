//! HTTP endpoint receiving gateway events.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use plugin_core::{InboundMessage, MediaKind, MediaRef};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::supervisor::{ConnectionState, SessionEvent};

/// Status reason the gateway reports when the device was unlinked.
const LOGGED_OUT_REASON: i64 = 401;

pub fn router(events: mpsc::Sender<SessionEvent>) -> Router {
    Router::new()
        .route("/webhook", post(receive))
        .route("/webhook/{event}", post(receive))
        .with_state(events)
}

/// Always answers 200 so the gateway never retries a delivery.
async fn receive(State(events): State<mpsc::Sender<SessionEvent>>, body: Bytes) -> StatusCode {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "Ignoring undecodable webhook body");
            return StatusCode::OK;
        }
    };
    for event in parse(&payload) {
        if events.send(event).await.is_err() {
            warn!("Supervisor stopped; dropping webhook event");
            break;
        }
    }
    StatusCode::OK
}

/// Decode one delivery. Events of other types, and messages without a usable
/// payload, yield nothing.
pub fn parse(payload: &Value) -> Vec<SessionEvent> {
    let event = payload
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_lowercase()
        .replace('_', ".");
    let data = payload.get("data").unwrap_or(&Value::Null);

    match event.as_str() {
        "messages.upsert" => {
            let items = data.as_array().map_or_else(|| vec![data], |arr| arr.iter().collect());
            items.into_iter().filter_map(parse_message).map(SessionEvent::Message).collect()
        }
        "connection.update" => parse_state(data).map(SessionEvent::State).into_iter().collect(),
        "qrcode.updated" => data
            .pointer("/qrcode/code")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(|c| SessionEvent::Qr(c.to_owned()))
            .into_iter()
            .collect(),
        other => {
            debug!(event = %other, "Ignoring webhook event");
            Vec::new()
        }
    }
}

fn parse_message(data: &Value) -> Option<InboundMessage> {
    let key = data.get("key")?;
    let message = data.get("message").filter(|m| m.is_object())?;
    let str_at = |v: &Value, p: &str| v.pointer(p).and_then(Value::as_str).map(ToOwned::to_owned);

    let media = [("imageMessage", MediaKind::Image), ("videoMessage", MediaKind::Video)]
        .into_iter()
        .find_map(|(field, kind)| {
            message.get(field).map(|m| MediaRef {
                kind,
                mimetype: str_at(m, "/mimetype"),
            })
        });
    let text = [
        "/conversation",
        "/extendedTextMessage/text",
        "/imageMessage/caption",
        "/videoMessage/caption",
    ]
    .into_iter()
    .filter_map(|p| message.pointer(p).and_then(Value::as_str))
    .find(|t| !t.is_empty())
    .unwrap_or_default()
    .to_owned();

    Some(InboundMessage {
        id: str_at(key, "/id")?,
        chat: str_at(key, "/remoteJid")?,
        push_name: str_at(data, "/pushName"),
        text,
        media,
        from_me: key.get("fromMe").and_then(Value::as_bool).unwrap_or(false),
    })
}

fn parse_state(data: &Value) -> Option<ConnectionState> {
    let reason = data.get("statusReason").and_then(Value::as_i64);
    match data.get("state").and_then(Value::as_str)? {
        "open" => Some(ConnectionState::Open),
        "connecting" => Some(ConnectionState::Connecting),
        "close" => Some(ConnectionState::Closed {
            logged_out: reason == Some(LOGGED_OUT_REASON),
            reason,
        }),
        other => {
            debug!(state = %other, "Unknown connection state");
            None
        }
    }
}
