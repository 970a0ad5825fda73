//! 核心类型定义 - 定长键值记录和操作类型

use crate::hash::strategy::DigestFunction;
use std::{
    fmt::{Debug, Display},
    sync::atomic::{AtomicU32, AtomicU64, Ordering},
};

/// 定长记录特征 - 键和值都是定宽整数
///
/// 每种记录类型带一个对应的原子单元，读线程在不持锁的情况下读取槽位，
/// 因此槽位内容必须存放在原子单元中，配合版本计数器判断读到的是否一致。
/// 键值 `ZERO` 作为空槽位标记，不能作为有效键插入。
pub trait FixedWord: Copy + Eq + Debug + Display + Send + Sync + 'static {
    /// 槽位中存放该记录的原子单元
    type Atomic: Send + Sync;

    /// 空槽位标记
    const ZERO: Self;

    /// 创建原子单元
    fn new_atomic(value: Self) -> Self::Atomic;

    /// 读取原子单元（Relaxed，顺序由版本协议的栅栏保证）
    fn load(cell: &Self::Atomic) -> Self;

    /// 写入原子单元（Relaxed，只由持有写锁的线程调用）
    fn store(cell: &Self::Atomic, value: Self);

    /// 以本机字节序计算摘要
    fn digest(self, digest: &dyn DigestFunction) -> u32;

    /// 是否为空槽位标记
    #[inline]
    fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

macro_rules! impl_fixed_word {
    ($ty:ty, $atomic:ty) => {
        impl FixedWord for $ty {
            type Atomic = $atomic;

            const ZERO: Self = 0;

            #[inline]
            fn new_atomic(value: Self) -> Self::Atomic {
                <$atomic>::new(value)
            }

            #[inline]
            fn load(cell: &Self::Atomic) -> Self {
                cell.load(Ordering::Relaxed)
            }

            #[inline]
            fn store(cell: &Self::Atomic, value: Self) {
                cell.store(value, Ordering::Relaxed)
            }

            #[inline]
            fn digest(self, digest: &dyn DigestFunction) -> u32 {
                digest.hash_bytes(&self.to_ne_bytes())
            }
        }
    };
}

impl_fixed_word!(u32, AtomicU32);
impl_fixed_word!(u64, AtomicU64);

/// 桶内槽位坐标 (桶索引, 槽位索引)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId {
    pub bucket: usize,
    pub slot: usize,
}

impl SlotId {
    pub const fn new(bucket: usize, slot: usize) -> Self {
        Self { bucket, slot }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// 查找操作
    Find,
    /// 插入操作
    Insert,
    /// 删除操作
    Delete,
    /// 踢出操作
    Kick,
    /// 扩容操作
    Expand,
    /// 报告操作
    Report,
}

impl OperationType {
    /// 全部操作类型
    pub const ALL: [OperationType; 6] = [
        OperationType::Find,
        OperationType::Insert,
        OperationType::Delete,
        OperationType::Kick,
        OperationType::Expand,
        OperationType::Report,
    ];

    /// 转换为字符串表示
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Find => "find",
            OperationType::Insert => "insert",
            OperationType::Delete => "delete",
            OperationType::Kick => "kick",
            OperationType::Expand => "expand",
            OperationType::Report => "report",
        }
    }
}

// 单元测试
#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::strategy::{build_digest, HashAlgorithm};

    #[test]
    fn test_atomic_roundtrip() {
        let cell = <u32 as FixedWord>::new_atomic(0);
        assert!(<u32 as FixedWord>::load(&cell).is_zero());
        <u32 as FixedWord>::store(&cell, 0xDEAD_BEEF);
        assert_eq!(<u32 as FixedWord>::load(&cell), 0xDEAD_BEEF);

        let wide = <u64 as FixedWord>::new_atomic(u64::MAX);
        assert_eq!(<u64 as FixedWord>::load(&wide), u64::MAX);
    }

    #[test]
    fn test_digest_uses_native_bytes() {
        let digest = build_digest(HashAlgorithm::XxHash, 0);
        let key: u32 = 12345;
        assert_eq!(key.digest(&*digest), digest.hash_bytes(&key.to_ne_bytes()));

        // 同一数值在不同宽度下字节不同，摘要一般也不同
        let wide: u64 = 12345;
        assert_eq!(wide.digest(&*digest), digest.hash_bytes(&wide.to_ne_bytes()));
    }

    #[test]
    fn test_operation_type() {
        assert_eq!(OperationType::ALL.len(), 6);
        assert_eq!(OperationType::Expand.as_str(), "expand");
    }
}
