#![deny(clippy::all)]

pub mod checksum;
mod server_error;
mod sync;
pub mod telemetry;

pub use checksum::compute_checksum;
pub use checksum::generate_nonce;
pub use checksum::verify_checksum;
pub use server_error::ServerError;
pub use sync::mutex_lock_or_recover;
pub use sync::poison_recovery_count;
