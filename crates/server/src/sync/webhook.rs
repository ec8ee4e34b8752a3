// Webhook signature verification and payload parsing.
//
// Signed content is `{webhook-id}.{webhook-timestamp}.{body}`, HMAC-SHA256
// keyed with the base64 part of a `whsec_` secret. `webhook-signature` holds
// space-separated `v1,<base64>` entries; any one matching is enough.

use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const WEBHOOK_ID_HEADER: &str = "webhook-id";
pub const WEBHOOK_TIMESTAMP_HEADER: &str = "webhook-timestamp";
pub const WEBHOOK_SIGNATURE_HEADER: &str = "webhook-signature";

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";
/// Maximum clock skew accepted between the sender and this server.
pub const TIMESTAMP_TOLERANCE_SECS: u64 = 5 * 60;

pub const STORAGE_UPDATED: &str = "storageUpdated";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("webhook secret is not valid base64")]
    InvalidSecret,
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("webhook timestamp is not a unix timestamp")]
    InvalidTimestamp,
    #[error("webhook timestamp is outside the accepted window")]
    StaleTimestamp,
    #[error("no webhook signature matched")]
    SignatureMismatch,
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

#[derive(Clone)]
pub struct WebhookVerifier {
    keyed: HmacSha256,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier").finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: &str) -> Result<Self, WebhookError> {
        let encoded = secret.trim();
        let encoded = encoded.strip_prefix(SECRET_PREFIX).unwrap_or(encoded);
        let key = STANDARD.decode(encoded).map_err(|_| WebhookError::InvalidSecret)?;
        if key.is_empty() {
            return Err(WebhookError::InvalidSecret);
        }
        let keyed = <HmacSha256 as Mac>::new_from_slice(&key)
            .map_err(|_| WebhookError::InvalidSecret)?;
        Ok(Self { keyed })
    }

    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), WebhookError> {
        self.verify_at(headers, body, chrono::Utc::now().timestamp())
    }

    pub(crate) fn verify_at(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        now: i64,
    ) -> Result<(), WebhookError> {
        let message_id = header(headers, WEBHOOK_ID_HEADER)?;
        let timestamp = header(headers, WEBHOOK_TIMESTAMP_HEADER)?;
        let signatures = header(headers, WEBHOOK_SIGNATURE_HEADER)?;

        let sent_at: i64 = timestamp.trim().parse().map_err(|_| WebhookError::InvalidTimestamp)?;
        if now.abs_diff(sent_at) > TIMESTAMP_TOLERANCE_SECS {
            return Err(WebhookError::StaleTimestamp);
        }

        let mac = self.mac(message_id, timestamp, body);
        let matched = signatures
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == SIGNATURE_VERSION)
            .filter_map(|(_, signature)| STANDARD.decode(signature).ok())
            .any(|signature| mac.clone().verify_slice(&signature).is_ok());

        if matched {
            Ok(())
        } else {
            Err(WebhookError::SignatureMismatch)
        }
    }

    /// `v1,<base64>` signature for a message, as the sender would compute it.
    pub fn sign(&self, message_id: &str, timestamp: i64, body: &[u8]) -> String {
        let signature = self.mac(message_id, &timestamp.to_string(), body).finalize().into_bytes();
        format!("{SIGNATURE_VERSION},{}", STANDARD.encode(signature))
    }

    fn mac(&self, message_id: &str, timestamp: &str, body: &[u8]) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(message_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        mac
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, WebhookError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.trim().is_empty())
        .ok_or(WebhookError::MissingHeader(name))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    StorageUpdated { room_id: String },
    /// Any other event type; acknowledged and ignored.
    Other { event_type: String },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Value,
}

pub fn parse_notification(body: &[u8]) -> Result<Notification, WebhookError> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|error| WebhookError::MalformedPayload(error.to_string()))?;

    if envelope.event_type != STORAGE_UPDATED {
        return Ok(Notification::Other { event_type: envelope.event_type });
    }

    let room_id = envelope
        .data
        .get("roomId")
        .and_then(Value::as_str)
        .filter(|room_id| !room_id.is_empty())
        .ok_or_else(|| WebhookError::MalformedPayload("storageUpdated without data.roomId".into()))?;

    Ok(Notification::StorageUpdated { room_id: room_id.to_owned() })
}
