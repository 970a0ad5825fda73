//! 版本模块 - 乐观并发控制

pub mod tracker;

pub use tracker::{KeyverWriteGuard, VersionGuard, VersionLedger, DEFAULT_KEYVER_POWER, KEYVER_COUNT};
