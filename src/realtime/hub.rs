use std::sync::Arc;

use super::broadcast::{Broadcaster, Delivery};
use super::connection::{ConnectionHandle, ConnectionId, ConnectionStream};
use super::event::Event;
use super::protocol::{parse_client_message, ClientMessage};
use super::registry::Registry;
use crate::matches::{Commentary, Match, MatchId, Score};

/// Entry point for the transport layer and the write-side HTTP handlers.
///
/// Owns the [`Registry`] and the [`Broadcaster`] built on it.
pub struct RealtimeHub {
    registry: Arc<Registry>,
    broadcaster: Broadcaster,
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new(Arc::new(Registry::new()))
    }
}

impl RealtimeHub {
    pub fn new(registry: Arc<Registry>) -> Self {
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        Self {
            registry,
            broadcaster,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Register a freshly upgraded connection and greet it
    pub fn connect(&self) -> (ConnectionHandle, ConnectionStream) {
        let (handle, stream) = self.registry.open();
        self.registry.register(handle.clone());
        self.broadcaster.send_to(&handle, &Event::Welcome);
        log::debug!("connection {} registered", handle.id());
        (handle, stream)
    }

    /// Dispatch one inbound text frame
    pub fn handle_text(&self, handle: &ConnectionHandle, text: &str) {
        let message = match parse_client_message(text) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                log::debug!("connection {}: {}", handle.id(), e);
                self.broadcaster.send_to(handle, &Event::error("Invalid JSON"));
                return;
            }
        };

        match message {
            ClientMessage::Subscribe(match_id) => {
                if self.registry.subscribe(match_id, handle.id()) {
                    self.broadcaster
                        .send_to(handle, &Event::Subscribed { match_id });
                }
            }
            ClientMessage::Unsubscribe(match_id) => {
                self.registry.unsubscribe(match_id, handle.id());
                self.broadcaster
                    .send_to(handle, &Event::Unsubscribed { match_id });
            }
        }
    }

    pub fn pong(&self, id: ConnectionId) {
        self.registry.mark_alive(id);
    }

    /// Cleanup shared by every way a connection can end
    pub fn disconnect(&self, id: ConnectionId) {
        if self.registry.unregister(id).is_some() {
            log::debug!("connection {} unregistered", id);
        }
    }

    /// Terminate and forget every connection
    pub fn shutdown(&self) -> usize {
        let handles = self.registry.drain();
        for handle in &handles {
            handle.terminate();
        }
        handles.len()
    }

    pub fn match_created(&self, created: &Match) -> Delivery {
        self.broadcaster.broadcast_all(&Event::MatchCreated {
            data: created.clone(),
        })
    }

    pub fn score_update(&self, match_id: MatchId, score: Score) -> Delivery {
        self.broadcaster.broadcast_to_match(
            match_id,
            &Event::ScoreUpdate {
                match_id,
                data: score,
            },
        )
    }

    pub fn commentary(&self, entry: &Commentary) -> Delivery {
        self.broadcaster.broadcast_to_match(
            entry.match_id,
            &Event::Commentary {
                match_id: entry.match_id,
                data: entry.clone(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::realtime::connection::Outbound;

    fn recv(stream: &mut ConnectionStream) -> Option<Value> {
        match stream.outbound.try_recv() {
            Ok(Outbound::Text(t)) => serde_json::from_str(t.as_str()).ok(),
            _ => None,
        }
    }

    #[test]
    fn test_connect_sends_welcome() {
        let hub = RealtimeHub::default();
        let (_h, mut s) = hub.connect();
        assert_eq!(recv(&mut s), Some(json!({"type": "welcome"})));
        assert_eq!(hub.registry().len(), 1);
    }

    #[test]
    fn test_subscribe_flow() {
        let hub = RealtimeHub::default();
        let (h, mut s) = hub.connect();
        recv(&mut s);

        hub.handle_text(&h, r#"{"type":"subscribe","matchId":5}"#);
        assert_eq!(recv(&mut s), Some(json!({"type": "subscribed", "matchId": 5})));

        let delivery = hub.score_update(
            5,
            Score {
                home_score: 2,
                away_score: 1,
            },
        );
        assert_eq!(delivery.sent, 1);
        assert_eq!(recv(&mut s).unwrap()["type"], json!("score_update"));

        hub.handle_text(&h, r#"{"type":"unsubscribe","matchId":5}"#);
        assert_eq!(recv(&mut s), Some(json!({"type": "unsubscribed", "matchId": 5})));
        assert!(hub.registry().subscribers(5).is_none());
    }

    #[test]
    fn test_malformed_json_reports_and_keeps_connection() {
        let hub = RealtimeHub::default();
        let (h, mut s) = hub.connect();
        recv(&mut s);

        hub.handle_text(&h, "{oops");
        assert_eq!(recv(&mut s), Some(json!({"type": "error", "data": "Invalid JSON"})));
        assert!(recv(&mut s).is_none());
        assert!(h.is_open());
        assert!(hub.registry().contains(h.id()));

        hub.handle_text(&h, r#"{"type":"ping"}"#);
        assert!(recv(&mut s).is_none());
    }

    #[test]
    fn test_shutdown_terminates_all() {
        let hub = RealtimeHub::default();
        let (a, _sa) = hub.connect();
        let (b, _sb) = hub.connect();
        hub.handle_text(&a, r#"{"type":"subscribe","matchId":1}"#);

        assert_eq!(hub.shutdown(), 2);
        assert!(!a.is_open() && !b.is_open());
        assert_eq!(hub.registry().stats().subscribed_matches, 0);

        hub.disconnect(a.id());
    }
}
