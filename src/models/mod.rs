//! Core value types for the frozen bucket archive.
//!
//! These describe bucket identity, the per-index bucket set, restore windows,
//! the local peer and the status records emitted by every archive flow.

pub mod bucket;
pub mod collection;
pub mod peer;
pub mod status;
pub mod time_range;
