//! HTTP API: configuration and session management.

pub mod handlers;
pub mod models;
pub mod server;

pub use server::{start_http_server, AppState};
