use std::sync::Arc;

use axum::extract::ws::Utf8Bytes;
use tokio::sync::{mpsc, watch};

/// Registry-assigned connection identifier
pub type ConnectionId = u64;

/// Default capacity of a connection's outbound queue
pub const OUTBOUND_QUEUE_SIZE: usize = 256;

/// Frame queued for a connection's writer task
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(Utf8Bytes),
    Ping,
}

/// Result of a non-blocking send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Queued,
    /// Stream closed or queue full; the frame was dropped
    Skipped,
}

/// Cloneable handle to one live connection.
///
/// The transport side owns the matching [`ConnectionStream`] and drains the
/// outbound queue into the socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    shutdown: Arc<watch::Sender<bool>>,
}

/// Transport-side half of a connection
#[derive(Debug)]
pub struct ConnectionStream {
    pub outbound: mpsc::Receiver<Outbound>,
    pub shutdown: watch::Receiver<bool>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, capacity: usize) -> (Self, ConnectionStream) {
        let (tx, outbound) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown) = watch::channel(false);
        let handle = Self {
            id,
            tx,
            shutdown: Arc::new(shutdown_tx),
        };
        (handle, ConnectionStream { outbound, shutdown })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the stream still accepts frames
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed() && !*self.shutdown.borrow()
    }

    pub fn try_send(&self, frame: Utf8Bytes) -> SendStatus {
        self.push(Outbound::Text(frame))
    }

    /// Queue a transport-level liveness probe
    pub fn ping(&self) -> SendStatus {
        self.push(Outbound::Ping)
    }

    /// Ask the transport to close the socket without a close handshake
    pub fn terminate(&self) {
        self.shutdown.send_replace(true);
    }

    fn push(&self, frame: Outbound) -> SendStatus {
        if !self.is_open() {
            return SendStatus::Skipped;
        }
        match self.tx.try_send(frame) {
            Ok(()) => SendStatus::Queued,
            Err(_) => SendStatus::Skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_after_terminate_is_skipped() {
        let (handle, mut stream) = ConnectionHandle::new(1, 4);
        assert_eq!(handle.try_send("a".into()), SendStatus::Queued);

        handle.terminate();
        assert!(!handle.is_open());
        assert!(*stream.shutdown.borrow());
        assert_eq!(handle.ping(), SendStatus::Skipped);

        assert_eq!(stream.outbound.try_recv().unwrap(), Outbound::Text("a".into()));
        assert!(stream.outbound.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_skips() {
        let (handle, _stream) = ConnectionHandle::new(1, 1);
        assert_eq!(handle.ping(), SendStatus::Queued);
        assert_eq!(handle.ping(), SendStatus::Skipped);
    }

    #[test]
    fn test_dropped_stream_closes_handle() {
        let (handle, stream) = ConnectionHandle::new(1, 4);
        drop(stream);
        assert!(!handle.is_open());
        assert_eq!(handle.try_send("a".into()), SendStatus::Skipped);
    }
}
