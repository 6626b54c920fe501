//! Archive flows and the infrastructure they run on.

pub mod archive_service;
pub mod local_tree;
pub mod lock_service;
pub mod rebuild_service;
pub mod status_sink;
pub mod storage;
