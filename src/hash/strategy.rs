//! 哈希策略模块 - 定义键到32位摘要的映射

use ahash::RandomState;
use std::{
    fmt,
    hash::{BuildHasher, Hasher},
    sync::Arc,
};

// FNV-1a 哈希算法常量
const FNV_PRIME: u32 = 0x0100_0193; // 16777619
const FNV_OFFSET_BASIS: u32 = 0x811C_9DC5; // 2166136261

/// 哈希算法选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    /// xxHash32
    #[default]
    XxHash,
    /// aHash，64位结果折叠为32位
    AHash,
    /// FNV-1a 32位
    Fnv,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::XxHash => "xxhash32",
            HashAlgorithm::AHash => "ahash",
            HashAlgorithm::Fnv => "fnv1a",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 摘要函数特征 - `hash(bytes) -> u32`
///
/// 桶索引取摘要的高位，备用桶的标签取摘要的低8位，
/// 两端都需要分布均匀。
pub trait DigestFunction: Send + Sync {
    fn hash_bytes(&self, data: &[u8]) -> u32;
}

impl<T> DigestFunction for T
where
    T: Fn(&[u8]) -> u32 + Send + Sync,
{
    fn hash_bytes(&self, data: &[u8]) -> u32 {
        self(data)
    }
}

/// 构建摘要函数
pub fn build_digest(algorithm: HashAlgorithm, seed: u64) -> Arc<dyn DigestFunction> {
    match algorithm {
        HashAlgorithm::XxHash => {
            let seed = seed as u32;
            Arc::new(move |data: &[u8]| {
                let mut hasher = twox_hash::XxHash32::with_seed(seed);
                hasher.write(data);
                hasher.finish() as u32
            })
        }
        HashAlgorithm::AHash => {
            let state = RandomState::with_seed(seed as usize);
            Arc::new(move |data: &[u8]| {
                let mut hasher = state.build_hasher();
                hasher.write(data);
                let h = hasher.finish();
                (h ^ (h >> 32)) as u32
            })
        }
        HashAlgorithm::Fnv => {
            let basis = FNV_OFFSET_BASIS ^ (seed as u32);
            Arc::new(move |data: &[u8]| fnv1a(basis, data))
        }
    }
}

#[inline]
fn fnv1a(basis: u32, data: &[u8]) -> u32 {
    let mut hash = basis;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
