pub mod pagination;
pub mod time_utils;

pub use pagination::LimitBounds;
pub use time_utils::{format_timestamp, parse_iso, parse_rfc3339};
