// Profile Gate - Intent Credential
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Decodes the optional out-of-band credential an agent may send with a
// request. Token: header.payload.signature, each segment base64url JSON.
// The payload's `intent` object carries id, goal and mode.
//
// Structure is the only check. The signature segment is never verified, so
// a token proves nothing about who minted it. Failures never escape: every
// problem collapses to None plus a warn line.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Longest token the decoder will look at
pub const MAX_TOKEN_BYTES: usize = 8 * 1024;

/// Declared purpose extracted from a well-formed credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub id: String,
    pub goal: String,
    pub mode: String,
}

/// Wire shape of the intent object. `intent_id` is an older spelling of
/// `id`; when both are present `id` wins.
#[derive(Deserialize)]
struct WireIntent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    intent_id: Option<String>,
    goal: String,
    mode: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
enum DecodeFailure {
    #[error("empty token")]
    Empty,
    #[error("token is {0} bytes, over the size limit")]
    Oversize(usize),
    #[error("expected 3 segments, found {0}")]
    Segments(usize),
    #[error("{0} segment is not base64url")]
    Base64(&'static str),
    #[error("{0} segment is not a JSON object")]
    NotObject(&'static str),
    #[error("payload has no intent")]
    MissingIntent,
    #[error("intent is malformed: {0}")]
    BadIntent(String),
}

/// Decode a raw credential. Absent on any failure.
pub fn verify(raw: &str) -> Option<Intent> {
    match decode(raw) {
        Ok(intent) => {
            log::info!(
                "intent credential accepted: id={} mode={} goal={:?}",
                intent.id, intent.mode, intent.goal
            );
            Some(intent)
        }
        Err(failure) => {
            log::warn!("intent credential ignored: {}", failure);
            None
        }
    }
}

fn decode(raw: &str) -> Result<Intent, DecodeFailure> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(DecodeFailure::Empty);
    }
    if token.len() > MAX_TOKEN_BYTES {
        return Err(DecodeFailure::Oversize(token.len()));
    }

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(DecodeFailure::Segments(segments.len()));
    }

    decode_object(segments[0], "header")?;
    let mut payload = decode_object(segments[1], "payload")?;

    let intent = match payload.get_mut("intent").map(Value::take) {
        Some(v @ Value::Object(_)) => v,
        _ => return Err(DecodeFailure::MissingIntent),
    };
    let wire: WireIntent =
        serde_json::from_value(intent).map_err(|e| DecodeFailure::BadIntent(e.to_string()))?;
    let id = wire.id.or(wire.intent_id).unwrap_or_default();
    if id.trim().is_empty() {
        return Err(DecodeFailure::BadIntent("empty id".to_string()));
    }
    Ok(Intent { id, goal: wire.goal, mode: wire.mode })
}

fn decode_object(segment: &str, which: &'static str) -> Result<Value, DecodeFailure> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|_| DecodeFailure::Base64(which))?;
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(v) if v.is_object() => Ok(v),
        _ => Err(DecodeFailure::NotObject(which)),
    }
}

/// Mint an unsigned token for an intent. The signature segment is empty.
pub fn encode_unsigned(intent: &Intent) -> String {
    let header = json!({"alg": "none", "typ": "agent-intent"});
    let payload = json!({"intent": intent});
    format!(
        "{}.{}.",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(payload.to_string()),
    )
}

// ============================================================================
// TESTS
// ============================================================================
