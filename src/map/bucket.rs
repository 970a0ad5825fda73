// src/map/bucket.rs
//! 桶实现 - 管理一组槽位和槽位级读写原语
//!
//! 槽位内容存放在原子单元中，所有写入都由持有表写锁的线程执行，
//! 并由版本账本的奇偶计数包围，读线程据此判断读取是否一致。

use crate::{
    error::{try_allocate, CuckooError},
    hash::KeyPosition,
    types::{FixedWord, SlotId},
    version::VersionLedger,
};
use rayon::prelude::*;
use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

pub const BUCKET_SIZE: usize = 4;

/// 单个桶 - 4个定长键值槽位，键为 `ZERO` 表示空槽位
pub struct Bucket<K: FixedWord, V: FixedWord> {
    keys: [K::Atomic; BUCKET_SIZE],
    vals: [V::Atomic; BUCKET_SIZE],
}

impl<K: FixedWord, V: FixedWord> Bucket<K, V> {
    pub fn new() -> Self {
        Self {
            keys: std::array::from_fn(|_| K::new_atomic(K::ZERO)),
            vals: std::array::from_fn(|_| V::new_atomic(V::ZERO)),
        }
    }

    #[inline]
    pub fn key(&self, slot: usize) -> K {
        K::load(&self.keys[slot])
    }

    #[inline]
    pub fn value(&self, slot: usize) -> V {
        V::load(&self.vals[slot])
    }

    #[inline]
    pub fn is_slot_empty(&self, slot: usize) -> bool {
        self.key(slot).is_zero()
    }

    /// 第一个空槽位
    #[inline]
    pub fn first_empty(&self) -> Option<usize> {
        (0..BUCKET_SIZE).find(|&j| self.is_slot_empty(j))
    }

    /// 键所在槽位
    #[inline]
    pub fn find_slot(&self, key: K) -> Option<usize> {
        (0..BUCKET_SIZE).find(|&j| self.key(j) == key)
    }

    /// 遍历非空槽位的键值
    pub fn entries(&self) -> impl Iterator<Item = (K, V)> + '_ {
        (0..BUCKET_SIZE).filter_map(move |j| {
            let key = self.key(j);
            (!key.is_zero()).then(|| (key, self.value(j)))
        })
    }

    #[inline]
    fn write(&self, slot: usize, key: K, value: V) {
        K::store(&self.keys[slot], key);
        V::store(&self.vals[slot], value);
    }

    #[inline]
    fn clear(&self, slot: usize) {
        K::store(&self.keys[slot], K::ZERO);
        V::store(&self.vals[slot], V::ZERO);
    }
}

impl<K: FixedWord, V: FixedWord> Default for Bucket<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: FixedWord, V: FixedWord> fmt::Debug for Bucket<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries((0..BUCKET_SIZE).map(|j| (self.key(j), self.value(j))))
            .finish()
    }
}

/// 桶数组 - `2^hashpower` 个连续存放的桶及其条目计数
///
/// 扩容时整体替换为新数组，因此条目计数跟随数组而不是表。
pub struct BucketArray<K: FixedWord, V: FixedWord> {
    hashpower: u32,
    hashmask: usize,
    buckets: Box<[Bucket<K, V>]>,
    items: AtomicUsize,
}

impl<K: FixedWord, V: FixedWord> BucketArray<K, V> {
    /// 分配全部为空的桶数组，分配失败时返回 `AllocationFailed`
    pub fn allocate(hashpower: u32) -> Result<Self, CuckooError> {
        let count = 1usize
            .checked_shl(hashpower)
            .filter(|_| hashpower >= 1 && hashpower <= 32)
            .ok_or(CuckooError::CapacityExceeded { hashpower })?;

        let mut buckets = try_allocate::<Bucket<K, V>>(count)?;
        buckets.extend((0..count).map(|_| Bucket::new()));

        Ok(Self {
            hashpower,
            hashmask: count - 1,
            buckets: buckets.into_boxed_slice(),
            items: AtomicUsize::new(0),
        })
    }

    #[inline]
    pub fn hashpower(&self) -> u32 {
        self.hashpower
    }

    #[inline]
    pub fn hashmask(&self) -> usize {
        self.hashmask
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// 槽位总数
    #[inline]
    pub fn slot_capacity(&self) -> usize {
        self.buckets.len() * BUCKET_SIZE
    }

    /// 当前条目数
    #[inline]
    pub fn len(&self) -> usize {
        self.items.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 负载因子 = 条目数 / 槽位总数
    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / self.slot_capacity() as f64
    }

    /// 桶数组占用字节数
    pub fn byte_size(&self) -> usize {
        self.buckets.len() * std::mem::size_of::<Bucket<K, V>>()
    }

    #[inline]
    pub fn bucket(&self, i: usize) -> &Bucket<K, V> {
        &self.buckets[i]
    }

    /// 计算键在本数组中的两个候选桶和锁索引
    #[inline]
    pub fn locate(&self, hv: u32, keyver_mask: usize) -> KeyPosition {
        KeyPosition::locate(hv, self.hashpower, keyver_mask)
    }

    #[inline]
    pub fn slot_key(&self, at: SlotId) -> K {
        self.buckets[at.bucket].key(at.slot)
    }

    /// 在桶 `i` 中查找键，不做任何同步，由调用方包裹版本校验
    #[inline]
    pub fn try_read(&self, i: usize, key: K) -> Option<V> {
        let bucket = &self.buckets[i];
        bucket.find_slot(key).map(|j| bucket.value(j))
    }

    /// 尝试把键值写入桶 `i` 的第一个空槽位，桶满时返回 false
    pub fn try_add(&self, i: usize, key: K, value: V, lock: usize, ledger: &VersionLedger) -> bool {
        let bucket = &self.buckets[i];
        match bucket.first_empty() {
            Some(j) => {
                let _write = ledger.begin_write(lock);
                bucket.write(j, key, value);
                self.items.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// 尝试从桶 `i` 删除键，不存在时返回 false
    pub fn try_delete(&self, i: usize, key: K, lock: usize, ledger: &VersionLedger) -> bool {
        let bucket = &self.buckets[i];
        match bucket.find_slot(key) {
            Some(j) => {
                let _write = ledger.begin_write(lock);
                bucket.clear(j);
                self.items.fetch_sub(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// 把 `from` 中的条目搬到空槽位 `to`，条目数不变
    pub fn relocate(&self, from: SlotId, to: SlotId, lock: usize, ledger: &VersionLedger) {
        let src = &self.buckets[from.bucket];
        let dst = &self.buckets[to.bucket];
        debug_assert!(dst.is_slot_empty(to.slot), "搬迁目标槽位非空: {:?}", to);

        let _write = ledger.begin_write(lock);
        dst.write(to.slot, src.key(from.slot), src.value(from.slot));
        src.clear(from.slot);
    }

    /// 收集全部条目（写锁内调用，结果是一致快照）
    pub fn collect_entries(&self) -> Vec<(K, V)> {
        self.buckets
            .par_iter()
            .flat_map_iter(|bucket| bucket.entries())
            .collect()
    }
}

impl<K: FixedWord, V: FixedWord> fmt::Debug for BucketArray<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketArray")
            .field("hashpower", &self.hashpower)
            .field("buckets", &self.buckets.len())
            .field("items", &self.len())
            .finish()
    }
}
