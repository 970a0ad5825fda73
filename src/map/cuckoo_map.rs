//! 单写多读 Cuckoo 哈希表
//!
//! 读操作不加锁：采样版本计数器、读两个候选桶、再次采样，不一致则重读。
//! 写操作（插入、删除、扩容）由一把表级互斥锁串行化。

use crate::{
    error::CuckooError,
    hash::{build_digest, lock_index, DigestFunction, KeyPosition},
    map::{
        bucket::BucketArray,
        config::{CuckooTableConfig, MAX_HASHPOWER},
        path::CuckooPath,
    },
    stats::{timed, MemoryRegion, StatsRecorder, StatsRecorderFactory},
    types::{FixedWord, OperationType},
    version::VersionLedger,
};
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned};
use parking_lot::Mutex;
use rand::{rngs::StdRng, SeedableRng};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

/// 诊断报告
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableReport {
    pub hashpower: u32,
    pub bucket_count: usize,
    pub item_count: usize,
    pub byte_size: usize,
    pub load_factor: f64,
}

impl fmt::Display for TableReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[report]")?;
        writeln!(f, "total number of items {}", self.item_count)?;
        writeln!(
            f,
            "total size {} Bytes, or {:.2} MB",
            self.byte_size,
            self.byte_size as f64 / (1 << 20) as f64
        )?;
        write!(f, "load factor {:.4}", self.load_factor)
    }
}

// 只有持有写锁的线程才能访问
struct WriterState<K: FixedWord> {
    path: CuckooPath<K>,
    rng: StdRng,
}

/// 单写多读 Cuckoo 哈希表
///
/// 键和值都是定宽整数，键 `0` 保留为空槽位标记。
pub struct CuckooTable<K: FixedWord = u32, V: FixedWord = u32> {
    // 当前桶数组，扩容时整体替换
    buckets: Atomic<BucketArray<K, V>>,
    // 版本账本，大小与桶数组无关，扩容后继续使用
    ledger: VersionLedger,
    digest: Arc<dyn DigestFunction>,
    writer: Mutex<WriterState<K>>,
    expanding: AtomicBool,
    config: CuckooTableConfig,
    stats: Arc<dyn StatsRecorder>,
}

/// 扩容占用标志，释放时清除
struct ExpansionClaim<'a>(&'a AtomicBool);

impl<'a> ExpansionClaim<'a> {
    fn try_claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ExpansionClaim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<K: FixedWord, V: FixedWord> CuckooTable<K, V> {
    /// 以 `2^hashpower` 个桶创建哈希表，`hashpower` 为 0 时使用默认值
    pub fn init(hashpower: u32) -> Result<Self, CuckooError> {
        Self::with_config(super::DEFAULT_CONFIG.clone().with_hashpower(hashpower))
    }

    /// 按配置创建哈希表
    pub fn with_config(config: CuckooTableConfig) -> Result<Self, CuckooError> {
        let digest = build_digest(config.hash_algorithm, config.hash_seed);
        Self::with_digest(config, digest)
    }

    /// 使用外部提供的摘要函数创建哈希表
    pub fn with_digest(
        config: CuckooTableConfig,
        digest: Arc<dyn DigestFunction>,
    ) -> Result<Self, CuckooError> {
        let stats = if config.enable_stats {
            StatsRecorderFactory::create_default()
        } else {
            StatsRecorderFactory::create_disabled()
        };
        Self::with_recorder(config, digest, stats)
    }

    /// 使用外部统计记录器创建哈希表，`enable_stats` 不再生效
    ///
    /// 记录器可以比表活得更久，表销毁时会登记全部存储的释放。
    pub fn with_recorder(
        config: CuckooTableConfig,
        digest: Arc<dyn DigestFunction>,
        stats: Arc<dyn StatsRecorder>,
    ) -> Result<Self, CuckooError> {
        config.validate()?;

        let hashpower = config.effective_hashpower();
        let ledger = VersionLedger::with_power(config.keyver_power)?;
        let array = BucketArray::<K, V>::allocate(hashpower)?;

        let memory = stats.memory_stats();
        memory.record_allocation(MemoryRegion::Ledger, ledger.byte_size());
        memory.record_allocation(MemoryRegion::Buckets, array.byte_size());

        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        log_info!(
            "cuckoo table initialized: hashpower {}, {} buckets, {} keyvers",
            hashpower,
            array.bucket_count(),
            ledger.len()
        );

        Ok(Self {
            buckets: Atomic::new(array),
            ledger,
            digest,
            writer: Mutex::new(WriterState {
                path: CuckooPath::new(config.max_cuckoo_count),
                rng,
            }),
            expanding: AtomicBool::new(false),
            config,
            stats,
        })
    }

    #[inline]
    fn current<'g>(&self, guard: &'g Guard) -> &'g BucketArray<K, V> {
        let shared = self.buckets.load(Ordering::Acquire, guard);
        // SAFETY: 指针从不为空；被替换下来的数组经 defer_destroy 回收，
        // 在 guard 存活期间不会被释放
        unsafe { shared.deref() }
    }

    /// 查找键对应的值
    ///
    /// 不加锁，读期间版本计数器变化就整体重读。重试没有次数上限：
    /// 写者持续修改同一锁索引时读者可能长时间得不到结果。
    pub fn find(&self, key: K) -> Option<V> {
        if key.is_zero() {
            self.stats.record_operation_count(OperationType::Find, false);
            return None;
        }

        let hv = key.digest(&*self.digest);
        let lock = lock_index(hv, self.ledger.mask());
        let guard = &epoch::pin();

        loop {
            let version = self.ledger.begin_read(lock);
            // 桶数组指针必须在第一次采样之后读取
            let array = self.current(guard);
            let pos = array.locate(hv, self.ledger.mask());
            let result = array
                .try_read(pos.i1, key)
                .or_else(|| array.try_read(pos.i2, key));

            if !self.ledger.validate(&version) {
                self.stats.operation_stats().record_read_retry();
                continue;
            }

            self.stats
                .record_operation_count(OperationType::Find, result.is_some());
            return result;
        }
    }

    /// 键是否存在
    pub fn contains(&self, key: K) -> bool {
        self.find(key).is_some()
    }

    /// 插入键值对，键已存在时返回 `KeyAlreadyExists` 且不修改旧值
    pub fn insert(&self, key: K, value: V) -> Result<(), CuckooError> {
        timed(&*self.stats, OperationType::Insert, || {
            if key.is_zero() {
                return Err(CuckooError::ReservedKey);
            }

            let mut writer = self.writer.lock();
            let guard = &epoch::pin();
            let array = self.current(guard);

            let pos = array.locate(key.digest(&*self.digest), self.ledger.mask());
            // 写锁内没有并发修改，直接读即可
            if array.try_read(pos.i1, key).is_some() || array.try_read(pos.i2, key).is_some() {
                return Err(CuckooError::KeyAlreadyExists {
                    key: key.to_string(),
                });
            }

            if self.place(array, &mut writer, &pos, key, value) {
                return Ok(());
            }

            self.stats.operation_stats().record_table_full();
            log_warn!(
                "hash table is full (hashpower = {}, hash_items = {}, load factor = {:.2}), need to increase hashpower",
                array.hashpower(),
                array.len(),
                array.load_factor()
            );
            Err(CuckooError::TableFull {
                hashpower: array.hashpower(),
                capacity: array.slot_capacity(),
                size: array.len(),
                load_factor: array.load_factor() as f32,
            })
        })
    }

    // 直接写入两个候选桶之一，都满时走驱逐路径后重试腾出的桶
    fn place(
        &self,
        array: &BucketArray<K, V>,
        writer: &mut WriterState<K>,
        pos: &KeyPosition,
        key: K,
        value: V,
    ) -> bool {
        if array.try_add(pos.i1, key, value, pos.lock, &self.ledger)
            || array.try_add(pos.i2, key, value, pos.lock, &self.ledger)
        {
            return true;
        }

        let WriterState { path, rng } = writer;
        let freed = path.run(array, &self.ledger, &*self.digest, rng, pos.i1, pos.i2);
        self.stats.operation_stats().record_kicks(path.kick_count() as u64);

        match freed {
            Some(i) => array.try_add(i, key, value, pos.lock, &self.ledger),
            None => false,
        }
    }

    /// 删除键
    pub fn delete(&self, key: K) -> Result<(), CuckooError> {
        timed(&*self.stats, OperationType::Delete, || {
            if !key.is_zero() {
                let _writer = self.writer.lock();
                let guard = &epoch::pin();
                let array = self.current(guard);

                let pos = array.locate(key.digest(&*self.digest), self.ledger.mask());
                if array.try_delete(pos.i1, key, pos.lock, &self.ledger)
                    || array.try_delete(pos.i2, key, pos.lock, &self.ledger)
                {
                    return Ok(());
                }
            }
            Err(CuckooError::KeyNotFound {
                key: key.to_string(),
            })
        })
    }

    /// 扩容为两倍桶数并重新放置全部条目
    ///
    /// 同一时刻只允许一次扩容，其余调用立即返回 `UnderExpansion`。
    /// 扩容期间写操作等待写锁，读操作继续读取旧数组。
    /// 任何条目放不进新数组时放弃扩容，旧数组保持不变。
    pub fn expand(&self) -> Result<(), CuckooError> {
        let _claim = match ExpansionClaim::try_claim(&self.expanding) {
            Some(claim) => claim,
            None => {
                log_debug!("expand skipped: another expansion is in progress");
                return Err(CuckooError::UnderExpansion);
            }
        };

        timed(&*self.stats, OperationType::Expand, || {
            let mut writer = self.writer.lock();
            let guard = &epoch::pin();
            let old = self.current(guard);

            let new_power = old.hashpower() + 1;
            if new_power > MAX_HASHPOWER {
                return Err(CuckooError::CapacityExceeded {
                    hashpower: old.hashpower(),
                });
            }

            log_info!(
                "expansion started: hashpower {} -> {}, {} items",
                old.hashpower(),
                new_power,
                old.len()
            );

            let memory = self.stats.memory_stats();
            let fresh = BucketArray::<K, V>::allocate(new_power)?;
            memory.record_allocation(MemoryRegion::Buckets, fresh.byte_size());

            for (key, value) in old.collect_entries() {
                let pos = fresh.locate(key.digest(&*self.digest), self.ledger.mask());
                if !self.place(&fresh, &mut writer, &pos, key, value) {
                    log_error!(
                        "expansion to hashpower {} failed after placing {} of {} items",
                        new_power,
                        fresh.len(),
                        old.len()
                    );
                    memory.record_deallocation(MemoryRegion::Buckets, fresh.byte_size());
                    return Err(CuckooError::ExpansionFailed {
                        hashpower: new_power,
                    });
                }
            }

            let old_bytes = old.byte_size();
            let previous = self.buckets.swap(Owned::new(fresh), Ordering::AcqRel, guard);
            // SAFETY: 旧数组已不可从表中取得，只剩已 pin 的读者可能还持有它
            unsafe { guard.defer_destroy(previous) };
            memory.record_deallocation(MemoryRegion::Buckets, old_bytes);

            log_info!("expansion completed: hashpower {}", new_power);
            Ok(())
        })
    }

    /// 生成诊断报告
    pub fn report(&self) -> TableReport {
        let guard = &epoch::pin();
        let array = self.current(guard);
        let report = TableReport {
            hashpower: array.hashpower(),
            bucket_count: array.bucket_count(),
            item_count: array.len(),
            byte_size: array.byte_size(),
            load_factor: array.load_factor(),
        };
        self.stats.record_operation_count(OperationType::Report, true);
        log_info!("{}", report);
        report
    }

    /// 销毁哈希表并释放全部存储
    pub fn exit(self) {
        log_info!("cuckoo table exit: {} items dropped", self.len());
    }

    /// 当前条目数
    pub fn len(&self) -> usize {
        self.current(&epoch::pin()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 负载因子
    pub fn load_factor(&self) -> f64 {
        self.current(&epoch::pin()).load_factor()
    }

    /// 获取桶的数量
    pub fn bucket_count(&self) -> usize {
        self.current(&epoch::pin()).bucket_count()
    }

    /// 获取总槽位数（容量）
    pub fn slot_capacity(&self) -> usize {
        self.current(&epoch::pin()).slot_capacity()
    }

    pub fn hashpower(&self) -> u32 {
        self.current(&epoch::pin()).hashpower()
    }

    /// 是否正在扩容
    pub fn is_expanding(&self) -> bool {
        self.expanding.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &CuckooTableConfig {
        &self.config
    }

    pub fn stats(&self) -> &dyn StatsRecorder {
        &*self.stats
    }

    /// 导出Prometheus格式指标
    pub fn export_prometheus(&self) -> String {
        let report = {
            let guard = &epoch::pin();
            let array = self.current(guard);
            (array.hashpower(), array.len(), array.load_factor())
        };
        let mut output = self.stats.export_prometheus();
        output.push_str("# HELP cuckoo_table_hashpower Log2 of the bucket count\n");
        output.push_str("# TYPE cuckoo_table_hashpower gauge\n");
        output.push_str(&format!("cuckoo_table_hashpower {}\n", report.0));
        output.push_str("# HELP cuckoo_table_items Live items\n");
        output.push_str("# TYPE cuckoo_table_items gauge\n");
        output.push_str(&format!("cuckoo_table_items {}\n", report.1));
        output.push_str("# HELP cuckoo_table_load_factor Live items over slot capacity\n");
        output.push_str("# TYPE cuckoo_table_load_factor gauge\n");
        output.push_str(&format!("cuckoo_table_load_factor {:.4}\n", report.2));
        output
    }
}

impl<K: FixedWord, V: FixedWord> Drop for CuckooTable<K, V> {
    fn drop(&mut self) {
        let memory = self.stats.memory_stats();
        // SAFETY: &mut self 保证没有读者持有表的引用
        unsafe {
            let guard = epoch::unprotected();
            let array = self.buckets.load(Ordering::Relaxed, guard);
            if !array.is_null() {
                let array = array.into_owned();
                memory.record_deallocation(MemoryRegion::Buckets, array.byte_size());
            }
        }
        memory.record_deallocation(MemoryRegion::Ledger, self.ledger.byte_size());
    }
}

impl<K: FixedWord, V: FixedWord> fmt::Debug for CuckooTable<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = &epoch::pin();
        let array = self.current(guard);
        f.debug_struct("CuckooTable")
            .field("hashpower", &array.hashpower())
            .field("size", &array.len())
            .field("capacity", &array.slot_capacity())
            .field("load_factor", &array.load_factor())
            .finish()
    }
}
