//! Batch cache-aside layer over a pluggable key-value store.
//!
//! The [`cache`] module is the core: a resilient single-key facade, a batch
//! reconciliation engine, and a declarative binding layer that validates an
//! operation's shape before dispatching it. The remaining modules are the
//! demo application wrapped around it.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
