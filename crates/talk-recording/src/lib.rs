#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Recording server for call backends.
//!
//! The backend sends authenticated start/stop commands for a call; the
//! server drives a participant client and a recorder process for as long as
//! the call is recorded and reports lifecycle events back to the backend.

mod adapters;
mod app;
mod common;
mod domain;
mod infra;
mod usecases;

#[cfg(test)]
mod test_support;

pub use app::Application;
