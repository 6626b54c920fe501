//! Frozen bucket archiver.
//!
//! Archives immutable index buckets into a shared filesystem or object-storage
//! archive, and restores, prunes, summarizes and rebuilds them later. Peers of
//! an indexer cluster coordinate through per-bucket lock markers stored in the
//! archive itself.

pub mod config;
pub mod errors;
pub mod models;
pub mod services;
