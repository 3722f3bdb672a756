//! Live WebSocket fan-out
//!
//! Connection registry with a bidirectional subscription index, a
//! serialize-once broadcaster, and the two-strike liveness supervisor.

pub mod broadcast;
pub mod connection;
pub mod event;
pub mod heartbeat;
pub mod hub;
pub mod protocol;
pub mod registry;

pub use broadcast::{BroadcastStats, Broadcaster, Delivery};
pub use connection::{ConnectionHandle, ConnectionId, ConnectionStream, Outbound, SendStatus};
pub use event::Event;
pub use heartbeat::{HeartbeatConfig, HeartbeatStats, LivenessSupervisor};
pub use hub::RealtimeHub;
pub use protocol::{parse_client_message, ClientMessage, ProtocolError};
pub use registry::{Registry, RegistryStats};
