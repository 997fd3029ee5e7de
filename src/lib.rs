//! picket: coordination-free replicated rate limiting.
//!
//! Each node enforces a token-bucket admission policy per named resource
//! and periodically reconciles its state with peers through a convergent
//! (CRDT-style) merge, so no node needs a lock, quorum, or leader to stay
//! consistent with the rest of the cluster.

pub mod api;
pub mod bucket;
pub mod cli;
pub mod cluster;
pub mod error;
pub mod rate;
pub mod replicator;
pub mod settings;
pub mod store;
