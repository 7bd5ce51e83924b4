//! Cluster-wide rolling binary update.
//!
//! Any node accepts an admin update request, fans it out to every member of
//! the cluster (itself included), and answers with one membership-ordered
//! report of per-node outcomes.

pub mod admin_client;
pub mod aggregator;
pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod deployment;
pub mod drain;
pub mod error;
pub mod executor;
pub mod peer;
pub mod server;
pub mod types;

#[cfg(test)]
mod test_support;
