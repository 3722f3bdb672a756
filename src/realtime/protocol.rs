//! Inbound client messages

use std::fmt;

use serde_json::Value;

use crate::matches::MatchId;

/// Recognized client message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    Subscribe(MatchId),
    Unsubscribe(MatchId),
}

#[derive(Debug)]
pub enum ProtocolError {
    /// Frame was not valid JSON
    Malformed(serde_json::Error),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::Malformed(e) => write!(f, "Malformed client message: {}", e),
        }
    }
}

impl std::error::Error for ProtocolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProtocolError::Malformed(e) => Some(e),
        }
    }
}

/// Parse one text frame.
///
/// Invalid JSON is an error. Valid JSON of any unrecognized shape, including
/// a `matchId` that is not an integer, yields `Ok(None)`.
pub fn parse_client_message(text: &str) -> Result<Option<ClientMessage>, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;

    let Some(object) = value.as_object() else {
        return Ok(None);
    };
    let Some(match_id) = object.get("matchId").and_then(integer) else {
        return Ok(None);
    };

    Ok(match object.get("type").and_then(Value::as_str) {
        Some("subscribe") => Some(ClientMessage::Subscribe(match_id)),
        Some("unsubscribe") => Some(ClientMessage::Unsubscribe(match_id)),
        _ => None,
    })
}

fn integer(value: &Value) -> Option<MatchId> {
    let Value::Number(number) = value else {
        return None;
    };
    if let Some(i) = number.as_i64() {
        return Some(i);
    }
    // 3.0 is an integer
    let f = number.as_f64()?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}
