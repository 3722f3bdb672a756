use axum::extract::ws::Utf8Bytes;
use serde::Serialize;

use crate::matches::{Commentary, Match, MatchId, Score};

/// Server-pushed event.
///
/// Wire envelope is `{"type": <kind>, "data"?: ..., "matchId"?: ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Welcome,
    MatchCreated {
        data: Match,
    },
    ScoreUpdate {
        #[serde(rename = "matchId")]
        match_id: MatchId,
        data: Score,
    },
    Commentary {
        #[serde(rename = "matchId")]
        match_id: MatchId,
        data: Commentary,
    },
    Subscribed {
        #[serde(rename = "matchId")]
        match_id: MatchId,
    },
    Unsubscribed {
        #[serde(rename = "matchId")]
        match_id: MatchId,
    },
    #[serde(rename = "error")]
    ErrorNotice {
        data: String,
    },
}

impl Event {
    pub fn error(message: impl Into<String>) -> Self {
        Event::ErrorNotice {
            data: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Welcome => "welcome",
            Event::MatchCreated { .. } => "match_created",
            Event::ScoreUpdate { .. } => "score_update",
            Event::Commentary { .. } => "commentary",
            Event::Subscribed { .. } => "subscribed",
            Event::Unsubscribed { .. } => "unsubscribed",
            Event::ErrorNotice { .. } => "error",
        }
    }

    /// Serialize into a frame payload shared by every recipient
    pub fn to_frame(&self) -> Result<Utf8Bytes, serde_json::Error> {
        serde_json::to_string(self).map(Utf8Bytes::from)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;

    fn wire(event: &Event) -> Value {
        serde_json::from_str(event.to_frame().unwrap().as_str()).unwrap()
    }

    #[test]
    fn test_envelope_shapes() {
        assert_eq!(wire(&Event::Welcome), json!({"type": "welcome"}));
        assert_eq!(
            wire(&Event::Subscribed { match_id: 4 }),
            json!({"type": "subscribed", "matchId": 4})
        );
        assert_eq!(
            wire(&Event::error("Invalid JSON")),
            json!({"type": "error", "data": "Invalid JSON"})
        );
        assert_eq!(
            wire(&Event::ScoreUpdate {
                match_id: 2,
                data: Score {
                    home_score: 1,
                    away_score: 0
                }
            }),
            json!({"type": "score_update", "matchId": 2, "data": {"homeScore": 1, "awayScore": 0}})
        );
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        for event in [
            Event::Welcome,
            Event::Unsubscribed { match_id: 1 },
            Event::error("x"),
        ] {
            assert_eq!(wire(&event)["type"], json!(event.kind()));
        }
    }
}
