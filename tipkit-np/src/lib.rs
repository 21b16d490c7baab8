//! # TipKit Nightly Processor
//!
//! Coordinates one processing run from a constrained host:
//! 1. Claims pending tips from the persistence gateway
//! 2. Wakes the processing worker over the LAN when it is asleep
//! 3. Fans batches out to the worker's `/process-batch` endpoint
//! 4. Persists per-tip results and failures
//! 5. Promotes consensus tips per location

pub mod coordinator;
pub mod promotion;
pub mod wol;
pub mod worker_client;
