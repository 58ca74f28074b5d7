//! shiftkit-runtime: the coordination layer between the attendance
//! backend, the background location engine, and the host UI.
//!
//! Everything here runs inside the mobile app's process; there is no
//! CLI and no listening socket. The host's composition root builds one
//! [`context::ShiftRuntime`] at startup and opens a session per login.

pub mod config;
pub mod context;
pub mod dialogs;
pub mod error;
pub mod poller;
pub mod session;
pub mod storage;
pub mod store;
pub mod tracking;

pub use shiftkit_core::{state, status, throttle, types};

/// Install a tracing subscriber for hosts that do not bring their own.
///
/// Filter precedence: `SHIFTKIT_LOG`, then `RUST_LOG`, then `info`.
/// Uses `try_init` so an already-installed subscriber wins.
pub fn init_tracing() {
    let filter = std::env::var("SHIFTKIT_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .try_init();
}
