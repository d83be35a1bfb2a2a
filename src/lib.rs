//! File based service discovery of Amazon WorkSpaces for Prometheus.

#[macro_use]
extern crate tracing;

pub mod adapter;
pub mod app;
pub mod config;
pub mod discovery;
pub mod http;
pub mod inventory;
pub mod launch;
pub mod metrics;
pub mod signal;
pub mod target;
pub mod trace;
pub mod workspaces;

/// The basic error type, dynamically dispatched and safe to send across threads
pub type Error = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The basic result type, defined in terms of [`Error`] and generic over `T`
pub type Result<T> = std::result::Result<T, Error>;

pub const fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
