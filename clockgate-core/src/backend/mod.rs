//! Service backends.
//!
//! - [`MemoryBackend`]: in-process attendance, registration and ceremony
//!   backend over an [`crate::ledger::AttendanceLedger`]. Used by the demo
//!   CLI and the tests.
//! - `HttpBackend` (feature `network`): client for `clockgate-server`.

mod memory;
#[cfg(feature = "network")]
mod http;

pub use memory::MemoryBackend;
#[cfg(feature = "network")]
pub use http::{HttpBackend, HttpBackendConfig};
