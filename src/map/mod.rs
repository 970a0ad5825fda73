//! 哈希表核心模块 - 实现Cuckoo哈希表及其组件

pub mod bucket;
pub mod config;
pub mod cuckoo_map;
pub mod path;

pub use bucket::{Bucket, BucketArray, BUCKET_SIZE};
pub use config::{CuckooTableConfig, DEFAULT_HASHPOWER, MAX_HASHPOWER};
pub use cuckoo_map::{CuckooTable, TableReport};
pub use path::{CuckooPath, CuckooRecord, MAX_CUCKOO_COUNT, NUM_CUCKOO_PATH};

use once_cell::sync::Lazy;

/// 全局默认配置
pub static DEFAULT_CONFIG: Lazy<CuckooTableConfig> = Lazy::new(CuckooTableConfig::default);
