//! 哈希模块 - 由摘要推导两个候选桶和版本锁索引
//!
//! 三个函数都是纯函数：
//! - 主桶取摘要的高 `hashpower` 位
//! - 备用桶由主桶异或标签混合值得到，对同一摘要是自逆的
//! - 锁索引取摘要的低位，与桶位置无关

pub mod strategy;

pub use strategy::{build_digest, DigestFunction, HashAlgorithm};

/// MurmurHash2 的混合常量
pub const ALT_INDEX_MIX: u32 = 0x5bd1_e995;

/// 计算主桶索引
#[inline]
pub fn primary_index(hv: u32, hashpower: u32) -> usize {
    debug_assert!(hashpower >= 1 && hashpower <= 32);
    ((hv as u64) >> (32 - hashpower)) as usize
}

/// 计算备用桶索引
///
/// `alt_index(hv, alt_index(hv, i)) == i`。踢出时必须使用被踢键自己的摘要，
/// 不能沿用新键的摘要。
#[inline]
pub fn alt_index(hv: u32, index: usize, hashmask: usize) -> usize {
    let tag = hv & 0xFF;
    (index ^ tag.wrapping_mul(ALT_INDEX_MIX) as usize) & hashmask
}

/// 计算版本计数器索引
#[inline]
pub fn lock_index(hv: u32, keyver_mask: usize) -> usize {
    hv as usize & keyver_mask
}

/// 键的定位信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPosition {
    pub hv: u32,
    pub i1: usize,
    pub i2: usize,
    pub lock: usize,
}

impl KeyPosition {
    pub fn locate(hv: u32, hashpower: u32, keyver_mask: usize) -> Self {
        let hashmask = (1usize << hashpower) - 1;
        let i1 = primary_index(hv, hashpower);
        Self {
            hv,
            i1,
            i2: alt_index(hv, i1, hashmask),
            lock: lock_index(hv, keyver_mask),
        }
    }
}
