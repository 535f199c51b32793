//! Server wiring and startup logic.

pub mod http_api;
pub mod server;

pub use server::start_server;
