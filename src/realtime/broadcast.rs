//! Broadcast Engine: serialize once, fan out to many.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;

use super::connection::{ConnectionHandle, SendStatus};
use super::event::Event;
use super::registry::Registry;
use crate::matches::MatchId;

/// Statistics for broadcast operations
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Frames queued to a connection
    pub total_sent: u64,
    /// Frames dropped because the stream was closed or its queue full
    pub total_skipped: u64,
    /// Events serialized
    pub total_serialized: u64,
    /// Events that failed to serialize
    pub total_failed: u64,
}

/// Outcome of one broadcast call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    pub sent: usize,
    pub skipped: usize,
}

pub struct Broadcaster {
    registry: Arc<Registry>,
    total_sent: AtomicU64,
    total_skipped: AtomicU64,
    total_serialized: AtomicU64,
    total_failed: AtomicU64,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            total_sent: AtomicU64::new(0),
            total_skipped: AtomicU64::new(0),
            total_serialized: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Send to every registered connection whose stream is open
    pub fn broadcast_all(&self, event: &Event) -> Delivery {
        let targets = self.registry.connections();
        if targets.is_empty() {
            return Delivery::default();
        }
        match self.serialize(event) {
            Some(frame) => self.fan_out(&targets, &frame),
            None => Delivery::default(),
        }
    }

    /// Send to the subscribers of one match; a no-op when there are none
    pub fn broadcast_to_match(&self, match_id: MatchId, event: &Event) -> Delivery {
        let Some(targets) = self.registry.subscribers(match_id) else {
            return Delivery::default();
        };
        match self.serialize(event) {
            Some(frame) => self.fan_out(&targets, &frame),
            None => Delivery::default(),
        }
    }

    /// Send to a single connection
    pub fn send_to(&self, target: &ConnectionHandle, event: &Event) -> bool {
        match self.serialize(event) {
            Some(frame) => self.fan_out(std::slice::from_ref(target), &frame).sent == 1,
            None => false,
        }
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            total_sent: self.total_sent.load(Ordering::Relaxed),
            total_skipped: self.total_skipped.load(Ordering::Relaxed),
            total_serialized: self.total_serialized.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }

    fn serialize(&self, event: &Event) -> Option<Utf8Bytes> {
        match event.to_frame() {
            Ok(frame) => {
                self.total_serialized.fetch_add(1, Ordering::Relaxed);
                Some(frame)
            }
            Err(e) => {
                self.total_failed.fetch_add(1, Ordering::Relaxed);
                log::error!("failed to serialize {} event: {}", event.kind(), e);
                None
            }
        }
    }

    fn fan_out(&self, targets: &[ConnectionHandle], frame: &Utf8Bytes) -> Delivery {
        let mut delivery = Delivery::default();
        for target in targets {
            match target.try_send(frame.clone()) {
                SendStatus::Queued => delivery.sent += 1,
                SendStatus::Skipped => delivery.skipped += 1,
            }
        }
        self.total_sent
            .fetch_add(delivery.sent as u64, Ordering::Relaxed);
        self.total_skipped
            .fetch_add(delivery.skipped as u64, Ordering::Relaxed);
        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::connection::{ConnectionStream, Outbound};

    fn setup(n: usize) -> (Broadcaster, Vec<(ConnectionHandle, ConnectionStream)>) {
        let registry = Arc::new(Registry::new());
        let conns = (0..n)
            .map(|_| {
                let (h, s) = registry.open();
                registry.register(h.clone());
                (h, s)
            })
            .collect();
        (Broadcaster::new(registry), conns)
    }

    fn next_text(stream: &mut ConnectionStream) -> Option<Utf8Bytes> {
        match stream.outbound.try_recv() {
            Ok(Outbound::Text(t)) => Some(t),
            _ => None,
        }
    }

    #[test]
    fn test_zero_subscribers_is_free() {
        let (broadcaster, _conns) = setup(3);
        let delivery = broadcaster.broadcast_to_match(42, &Event::Subscribed { match_id: 42 });

        assert_eq!(delivery, Delivery::default());
        let stats = broadcaster.stats();
        assert_eq!(stats.total_serialized, 0);
        assert_eq!(stats.total_sent, 0);
    }

    #[test]
    fn test_match_broadcast_reaches_only_subscribers() {
        let (broadcaster, mut conns) = setup(5);
        for (h, _) in conns.iter().take(3) {
            broadcaster.registry().subscribe(9, h.id());
        }

        let event = Event::Unsubscribed { match_id: 9 };
        let delivery = broadcaster.broadcast_to_match(9, &event);
        assert_eq!(delivery.sent, 3);
        assert_eq!(broadcaster.stats().total_serialized, 1);

        let expected = event.to_frame().unwrap();
        for (i, (_, stream)) in conns.iter_mut().enumerate() {
            let got = next_text(stream);
            if i < 3 {
                assert_eq!(got.as_ref(), Some(&expected));
            } else {
                assert!(got.is_none());
            }
        }
    }

    #[test]
    fn test_broadcast_all_skips_closed_and_continues() {
        let (broadcaster, mut conns) = setup(3);
        conns[0].0.terminate();

        let delivery = broadcaster.broadcast_all(&Event::Welcome);
        assert_eq!(delivery, Delivery { sent: 2, skipped: 1 });
        assert!(next_text(&mut conns[1].1).is_some());
        assert!(next_text(&mut conns[2].1).is_some());
        assert_eq!(broadcaster.stats().total_skipped, 1);
    }

    #[test]
    fn test_send_to_single_connection() {
        let (broadcaster, mut conns) = setup(2);
        assert!(broadcaster.send_to(&conns[1].0, &Event::error("Invalid JSON")));
        assert!(next_text(&mut conns[0].1).is_none());
        assert!(next_text(&mut conns[1].1).is_some());
    }
}
