//! Worker wire protocol
//!
//! Request/response schemas shared by the coordinator's HTTP client and the
//! processing worker's HTTP service. Every shape is an explicit tagged
//! struct; malformed payloads are parse failures, not runtime surprises.

pub mod types;

pub use types::*;
