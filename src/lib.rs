#[cfg(not(any(
    target_env = "musl",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "windows",
    feature = "mimalloc"
)))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod admission;
pub mod config;
pub mod errors;
pub mod http;
pub mod logging;
pub mod matches;
pub mod realtime;
pub mod server;
pub mod utils;
pub mod ws;

pub use config::AppConfig;
pub use errors::{Error, Result};
pub use server::Server;
