//! 单写多读并发测试

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use swmr_cuckoo::{log_info, CuckooError, CuckooTable, CuckooTableConfig};
use test_log::test;

/// 测试用键范围内结果都不为0，读到0只可能是读到了被清空的槽位
fn value_of(key: u32) -> u32 {
    key.wrapping_mul(3).wrapping_add(15)
}

/// 高32位为键，低32位为从1开始的写入代数
fn tagged(key: u32, generation: u32) -> u64 {
    (u64::from(key) << 32) | u64::from(generation)
}

fn reader_count() -> usize {
    num_cpus::get().clamp(2, 8)
}

fn shared_table(hashpower: u32) -> Arc<CuckooTable> {
    Arc::new(
        CuckooTable::with_config(
            CuckooTableConfig::default()
                .with_hashpower(hashpower)
                .with_rng_seed(7),
        )
        .expect("初始化失败"),
    )
}

/// 插入一个键，表满时扩容后重试
fn insert_growing(table: &CuckooTable, key: u32) {
    loop {
        match table.insert(key, value_of(key)) {
            Ok(()) => return,
            Err(CuckooError::TableFull { .. }) => match table.expand() {
                Ok(()) | Err(CuckooError::UnderExpansion) => thread::yield_now(),
                Err(e) => panic!("扩容失败: {}", e),
            },
            Err(e) => panic!("inserting key {} fails: {}", key, e),
        }
    }
}

#[test]
fn test_readers_see_every_published_key() {
    let table = shared_table(8);
    let total_inserted = Arc::new(AtomicU32::new(0));
    let keep_reading = Arc::new(AtomicBool::new(true));

    let readers: Vec<_> = (0..reader_count())
        .map(|id| {
            let (table, total_inserted, keep_reading) =
                (table.clone(), total_inserted.clone(), keep_reading.clone());
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(id as u64);
                let mut lookups = 0u64;
                while keep_reading.load(Ordering::Acquire) {
                    let published = total_inserted.load(Ordering::Acquire);
                    if published == 0 {
                        thread::yield_now();
                        continue;
                    }
                    let key = rng.gen_range(1..=published);
                    match table.find(key) {
                        Some(val) => assert_eq!(val, value_of(key), "[reader{}] wrong value for key {}", id, key),
                        None => panic!("[reader{}] reading key {} from table fails", id, key),
                    }
                    lookups += 1;
                }
                lookups
            })
        })
        .collect();

    // 写入量远超初始容量，期间会多次扩容
    for key in 1..=40_000u32 {
        insert_growing(&table, key);
        total_inserted.store(key, Ordering::Release);
    }
    keep_reading.store(false, Ordering::Release);

    let lookups: u64 = readers.into_iter().map(|r| r.join().unwrap()).sum();
    log_info!("{} lookups, hashpower {}", lookups, table.hashpower());

    assert_eq!(table.len(), 40_000);
    assert!(table.hashpower() > 8);
    let snap = table.stats().operation_stats_snapshot();
    assert!(snap.expand_count > 0);
    assert_eq!(snap.find_miss_count, 0);
}

#[test]
fn test_no_torn_reads_under_churn() {
    const KEYS: u32 = 2_000;
    let table = Arc::new(
        CuckooTable::<u32, u64>::with_config(
            CuckooTableConfig::default()
                .with_hashpower(10)
                .with_rng_seed(7),
        )
        .expect("初始化失败"),
    );
    // 每个键最近一次写入的代数，写者先公布再插入
    let generations: Arc<Vec<AtomicU32>> =
        Arc::new((0..=KEYS).map(|_| AtomicU32::new(0)).collect());
    let writing = Arc::new(AtomicBool::new(true));

    let readers: Vec<_> = (0..reader_count())
        .map(|id| {
            let (table, generations, writing) =
                (table.clone(), generations.clone(), writing.clone());
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(100 + id as u64);
                let mut hits = 0u64;
                while writing.load(Ordering::Acquire) {
                    // 包含不存在的键
                    let key = rng.gen_range(1..=KEYS + KEYS / 4);
                    let lo = generations.get(key as usize).map_or(0, |g| g.load(Ordering::Acquire));
                    let found = table.find(key);
                    let hi = generations.get(key as usize).map_or(0, |g| g.load(Ordering::Acquire));

                    if let Some(val) = found {
                        let generation = val as u32;
                        assert_eq!(val >> 32, u64::from(key), "torn read for key {}: {:#x}", key, val);
                        // 查找开始前已删除的旧代不应再被读到
                        assert!(
                            generation >= lo.max(1) && generation <= hi,
                            "key {} read generation {} outside [{}, {}]",
                            key,
                            generation,
                            lo,
                            hi
                        );
                        hits += 1;
                    }
                }
                hits
            })
        })
        .collect();

    // 单写者反复插入、删除，驱动驱逐路径不断搬迁条目
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..60_000 {
        let key = rng.gen_range(1..=KEYS);
        if table.contains(key) {
            table.delete(key).unwrap();
        } else {
            let slot = &generations[key as usize];
            let generation = slot.load(Ordering::Relaxed) + 1;
            slot.store(generation, Ordering::Release);
            match table.insert(key, tagged(key, generation)) {
                Ok(()) | Err(CuckooError::TableFull { .. }) => {}
                Err(e) => panic!("意外错误: {}", e),
            }
        }
    }
    writing.store(false, Ordering::Release);

    let hits: u64 = readers.into_iter().map(|r| r.join().unwrap()).sum();
    log_info!("{} validated hits", hits);
    for key in KEYS + 1..=KEYS + KEYS / 4 {
        assert_eq!(table.find(key), None);
    }
    for key in 1..=KEYS {
        if let Some(val) = table.find(key) {
            assert_eq!(val, tagged(key, generations[key as usize].load(Ordering::Relaxed)));
        }
    }
}

#[test]
fn test_writers_are_serialized() {
    const PER_WRITER: u32 = 5_000;
    let table = shared_table(8);

    let writers: Vec<_> = (0..4u32)
        .map(|w| {
            let table = table.clone();
            thread::spawn(move || {
                for key in (w * PER_WRITER + 1)..=((w + 1) * PER_WRITER) {
                    insert_growing(&table, key);
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(table.len(), (4 * PER_WRITER) as usize);
    for key in 1..=4 * PER_WRITER {
        assert_eq!(table.find(key), Some(value_of(key)));
    }
}

#[test]
fn test_concurrent_expand_is_single_flight() {
    let table = shared_table(10);
    for key in 1..=2_000u32 {
        table.insert(key, value_of(key)).unwrap();
    }

    let results: Vec<_> = (0..8)
        .map(|_| {
            let table = table.clone();
            thread::spawn(move || table.expand())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    let succeeded = results.iter().filter(|r| r.is_ok()).count() as u32;
    assert!(succeeded >= 1);
    assert!(results
        .iter()
        .all(|r| matches!(r, Ok(()) | Err(CuckooError::UnderExpansion))));
    assert_eq!(table.hashpower(), 10 + succeeded);

    for key in 1..=2_000u32 {
        assert_eq!(table.find(key), Some(value_of(key)));
    }
}
