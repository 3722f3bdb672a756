pub mod websocket;

pub use websocket::{ws_handler, MAX_MESSAGE_SIZE};
