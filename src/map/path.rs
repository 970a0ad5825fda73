//! 驱逐路径 - 两个候选桶都满时寻找并执行一串搬迁来腾出空槽位
//!
//! 搜索阶段从新键的两个候选桶出发，两条路径按深度同步推进：
//! 当前桶有空槽位就停止，否则随机选一个受害者，
//! 用受害者自己的摘要计算它的备用桶作为下一层。
//! 执行阶段从找到空槽位的深度倒序回放，每一步把上一层的受害者搬进下一层腾出的槽位。

use crate::{
    hash::{alt_index, lock_index, DigestFunction},
    map::bucket::{BucketArray, BUCKET_SIZE},
    types::{FixedWord, SlotId},
    version::VersionLedger,
};
use rand::{rngs::StdRng, Rng};

/// 并行路径数
pub const NUM_CUCKOO_PATH: usize = 2;

/// 单次插入的踢出预算
pub const MAX_CUCKOO_COUNT: usize = 500;

/// 路径上一层的记录：每条路径考察的桶、选中的槽位和受害者的键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CuckooRecord<K: FixedWord> {
    pub buckets: [usize; NUM_CUCKOO_PATH],
    pub slots: [usize; NUM_CUCKOO_PATH],
    pub keys: [K; NUM_CUCKOO_PATH],
}

impl<K: FixedWord> CuckooRecord<K> {
    const EMPTY: Self = Self {
        buckets: [0; NUM_CUCKOO_PATH],
        slots: [0; NUM_CUCKOO_PATH],
        keys: [K::ZERO; NUM_CUCKOO_PATH],
    };

    #[inline]
    fn slot_id(&self, path: usize) -> SlotId {
        SlotId::new(self.buckets[path], self.slots[path])
    }
}

/// 搜索找到的空槽位：所在深度和路径编号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathHit {
    pub depth: usize,
    pub path: usize,
}

/// 驱逐路径引擎，只在写锁内使用，记录缓冲区跨插入复用
#[derive(Debug)]
pub struct CuckooPath<K: FixedWord> {
    records: Vec<CuckooRecord<K>>,
    kick_count: usize,
    max_cuckoo_count: usize,
}

impl<K: FixedWord> CuckooPath<K> {
    pub fn new(max_cuckoo_count: usize) -> Self {
        let max_cuckoo_count = max_cuckoo_count.max(NUM_CUCKOO_PATH);
        Self {
            records: vec![CuckooRecord::EMPTY; max_cuckoo_count],
            kick_count: 0,
            max_cuckoo_count,
        }
    }

    /// 本次插入已消耗的踢出次数
    pub fn kick_count(&self) -> usize {
        self.kick_count
    }

    /// 从 `depth_start` 继续搜索空槽位，预算或深度耗尽时返回 None
    pub fn search<V: FixedWord>(
        &mut self,
        array: &BucketArray<K, V>,
        digest: &dyn DigestFunction,
        rng: &mut StdRng,
        depth_start: usize,
    ) -> Option<PathHit> {
        let mut depth = depth_start;
        while self.kick_count < self.max_cuckoo_count && depth < self.max_cuckoo_count - 1 {
            for path in 0..NUM_CUCKOO_PATH {
                let i = self.records[depth].buckets[path];
                let bucket = array.bucket(i);

                if let Some(j) = bucket.first_empty() {
                    self.records[depth].slots[path] = j;
                    return Some(PathHit { depth, path });
                }

                let j = rng.gen_range(0..BUCKET_SIZE);
                let victim = bucket.key(j);
                // 受害者的下一站必须由它自己的摘要决定
                let hv = victim.digest(digest);
                self.records[depth].slots[path] = j;
                self.records[depth].keys[path] = victim;
                self.records[depth + 1].buckets[path] = alt_index(hv, i, array.hashmask());
            }

            self.kick_count += NUM_CUCKOO_PATH;
            depth += 1;
        }

        log_debug!("{} max cuckoo achieved, abort", self.kick_count);
        None
    }

    /// 沿路径 `path` 从 `depth_start` 倒序执行搬迁
    ///
    /// 全部完成返回 0；某一步发现受害者已不在记录的位置时立即停止，
    /// 返回停止时的深度，此前完成的搬迁都保持有效。
    pub fn execute_moves<V: FixedWord>(
        &self,
        array: &BucketArray<K, V>,
        ledger: &VersionLedger,
        digest: &dyn DigestFunction,
        depth_start: usize,
        path: usize,
    ) -> usize {
        let mut depth = depth_start;
        while depth > 0 {
            let from = &self.records[depth - 1];
            let to = &self.records[depth];
            let src = from.slot_id(path);

            if array.slot_key(src) != from.keys[path] {
                log_debug!("cuckoo path stale at depth {}, search again", depth);
                return depth;
            }

            let hv = from.keys[path].digest(digest);
            array.relocate(src, to.slot_id(path), lock_index(hv, ledger.mask()), ledger);
            depth -= 1;
        }
        depth
    }

    /// 为候选桶 `i1`/`i2` 腾出一个空槽位，成功时返回腾出空位的桶
    pub fn run<V: FixedWord>(
        &mut self,
        array: &BucketArray<K, V>,
        ledger: &VersionLedger,
        digest: &dyn DigestFunction,
        rng: &mut StdRng,
        i1: usize,
        i2: usize,
    ) -> Option<usize> {
        for path in 0..NUM_CUCKOO_PATH {
            self.records[0].buckets[path] = if path < NUM_CUCKOO_PATH / 2 { i1 } else { i2 };
        }
        self.kick_count = 0;

        let mut depth = 0;
        loop {
            let hit = self.search(array, digest, rng, depth)?;
            match self.execute_moves(array, ledger, digest, hit.depth, hit.path) {
                0 => return Some(self.records[0].buckets[hit.path]),
                stopped => depth = stopped - 1,
            }
        }
    }
}
