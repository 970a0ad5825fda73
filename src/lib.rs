//! 单写多读 Cuckoo 哈希表库
//!
//! 定容、内存内的键值表：读操作无锁，写操作由一把表级互斥锁串行化。
//!
//! ## 主要特性
//! - 每个键只可能位于两个候选桶之一，查找最多读两个桶
//! - 两个候选桶都满时沿驱逐路径搬迁已有条目腾出空位
//! - 读者用版本计数器检测并发修改并重读，从不阻塞写者
//! - 可选的两倍扩容，扩容期间读者继续读取旧数组
//! - 操作与内存统计，支持 Prometheus 文本格式导出
//!
//! ## 快速开始
//!
//! ```rust
//! use swmr_cuckoo::*;
//!
//! let table: CuckooTable = CuckooTable::init(10).expect("初始化失败");
//!
//! table.insert(1, 100).expect("插入失败");
//! assert_eq!(table.find(1), Some(100));
//!
//! // 插入不覆盖旧值
//! assert!(matches!(table.insert(1, 200), Err(CuckooError::KeyAlreadyExists { .. })));
//!
//! table.delete(1).expect("删除失败");
//! assert_eq!(table.find(1), None);
//!
//! println!("{}", table.report());
//! table.exit();
//! ```

#![warn(clippy::all)]
#[cfg(feature = "logging")]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        log::debug!($($arg)*)
    };
}

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        log::info!($($arg)*)
    };
}

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        log::warn!($($arg)*)
    };
}

#[cfg(feature = "logging")]
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!($($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "logging"))]
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {};
}
// 核心模块导出
pub mod error;
pub mod hash;
pub mod map;
pub mod stats;
pub mod types;
pub mod version;

// 公共接口导出
pub use crate::{
    error::CuckooError,
    hash::{
        alt_index, build_digest, lock_index, primary_index, DigestFunction, HashAlgorithm,
        KeyPosition,
    },
    map::{
        BucketArray, CuckooTable, CuckooTableConfig, TableReport, BUCKET_SIZE, DEFAULT_CONFIG,
        MAX_CUCKOO_COUNT,
    },
    stats::{OperationStatsSnapshot, StatsRecorder, StatsRecorderFactory},
    types::{FixedWord, OperationType, SlotId},
    version::{VersionLedger, KEYVER_COUNT},
};

/// 批量插入
///
/// 返回成功插入的条数，失败的条目（重复键、表满等）被跳过。
pub fn batch_insert<K: FixedWord, V: FixedWord>(
    table: &CuckooTable<K, V>,
    items: impl IntoIterator<Item = (K, V)>,
) -> usize {
    items
        .into_iter()
        .filter(|&(k, v)| table.insert(k, v).is_ok())
        .count()
}

/// 批量查询
pub fn batch_find<K: FixedWord, V: FixedWord>(
    table: &CuckooTable<K, V>,
    keys: impl IntoIterator<Item = K>,
) -> Vec<Option<V>> {
    keys.into_iter().map(|k| table.find(k)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_helpers() {
        let table: CuckooTable = CuckooTable::init(6).unwrap();
        let inserted = batch_insert(&table, (1..=10u32).map(|k| (k, k * 7)).chain([(3, 0), (0, 1)]));
        // 重复键3和保留键0被跳过
        assert_eq!(inserted, 10);
        assert_eq!(table.len(), 10);

        let found = batch_find(&table, [1u32, 3, 11]);
        assert_eq!(found, vec![Some(7), Some(21), None]);
    }
}
