//! 版本账本 - 实现无锁读操作检测并发修改
//!
//! 每个计数器对应一个锁索引而不是一个桶。写者在修改前后各加一次，
//! 奇数表示写入进行中；读者在读取前后各采样一次，
//! 首次采样为奇数或两次不相等时整体重读。

use crate::error::{try_allocate, CuckooError};
use std::{
    fmt,
    sync::atomic::{fence, AtomicU32, Ordering},
};

/// 默认计数器数量的对数 (2^13 = 8192)
pub const DEFAULT_KEYVER_POWER: u32 = 13;

/// 默认计数器数量
pub const KEYVER_COUNT: usize = 1 << DEFAULT_KEYVER_POWER;

/// 版本保护器 - 读操作开始时的计数器快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionGuard {
    lock_index: usize,
    version: u32,
}

impl VersionGuard {
    /// 获取开始时的版本号
    pub fn version(&self) -> u32 {
        self.version
    }

    /// 获取锁索引
    pub fn lock_index(&self) -> usize {
        self.lock_index
    }

    /// 开始时是否有写入正在进行
    pub fn write_in_progress(&self) -> bool {
        self.version & 1 == 1
    }

    /// 验证版本是否仍然有效
    pub fn is_valid(&self, current_version: u32) -> bool {
        !self.write_in_progress() && self.version == current_version
    }
}

/// 写保护器 - 构造时计数器变为奇数，释放时恢复为偶数
pub struct KeyverWriteGuard<'a> {
    ledger: &'a VersionLedger,
    lock_index: usize,
}

impl<'a> KeyverWriteGuard<'a> {
    pub fn lock_index(&self) -> usize {
        self.lock_index
    }
}

impl Drop for KeyverWriteGuard<'_> {
    fn drop(&mut self) {
        self.ledger.keyvers[self.lock_index].fetch_add(1, Ordering::Release);
    }
}

/// 版本账本 - 固定数量的序列计数器，与桶数组大小无关
pub struct VersionLedger {
    keyvers: Box<[AtomicU32]>,
    mask: usize,
}

impl VersionLedger {
    /// 创建默认大小的版本账本
    pub fn new() -> Result<Self, CuckooError> {
        Self::with_power(DEFAULT_KEYVER_POWER)
    }

    /// 创建 2^power 个计数器的版本账本
    pub fn with_power(power: u32) -> Result<Self, CuckooError> {
        let count = 1usize
            .checked_shl(power)
            .ok_or_else(|| CuckooError::InvalidConfig {
                reason: format!("keyver_power 过大: {}", power),
            })?;

        let mut keyvers = try_allocate::<AtomicU32>(count)?;
        keyvers.extend((0..count).map(|_| AtomicU32::new(0)));

        Ok(Self {
            keyvers: keyvers.into_boxed_slice(),
            mask: count - 1,
        })
    }

    /// 计数器数量
    pub fn len(&self) -> usize {
        self.keyvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyvers.is_empty()
    }

    /// 锁索引掩码
    pub fn mask(&self) -> usize {
        self.mask
    }

    /// 占用字节数
    pub fn byte_size(&self) -> usize {
        self.keyvers.len() * std::mem::size_of::<AtomicU32>()
    }

    /// 开始一次读操作
    #[inline]
    pub fn begin_read(&self, lock_index: usize) -> VersionGuard {
        let lock_index = lock_index & self.mask;
        VersionGuard {
            lock_index,
            version: self.keyvers[lock_index].load(Ordering::Acquire),
        }
    }

    /// 验证读操作期间没有写入
    #[inline]
    pub fn validate(&self, guard: &VersionGuard) -> bool {
        // 槽位读取都是 Relaxed，栅栏保证它们先于第二次采样完成
        fence(Ordering::Acquire);
        let current = self.keyvers[guard.lock_index].load(Ordering::Relaxed);
        guard.is_valid(current)
    }

    /// 开始一次写操作，返回的保护器释放时结束写操作
    ///
    /// 只能由持有表写锁的线程调用。
    #[inline]
    pub fn begin_write(&self, lock_index: usize) -> KeyverWriteGuard<'_> {
        let lock_index = lock_index & self.mask;
        self.keyvers[lock_index].fetch_add(1, Ordering::Relaxed);
        // 奇数计数必须先于随后的槽位写入对读者可见
        fence(Ordering::Release);
        KeyverWriteGuard {
            ledger: self,
            lock_index,
        }
    }

    /// 获取当前版本号
    pub fn current_version(&self, lock_index: usize) -> u32 {
        self.keyvers[lock_index & self.mask].load(Ordering::Acquire)
    }
}

impl fmt::Debug for VersionLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionLedger")
            .field("count", &self.keyvers.len())
            .field("mask", &format_args!("{:#x}", self.mask))
            .finish()
    }
}

// 单元测试
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, AtomicU64},
        Arc,
    };
    use std::thread;

    #[test]
    fn test_version_tracking() {
        let ledger = VersionLedger::new().unwrap();
        assert_eq!(ledger.len(), KEYVER_COUNT);
        assert_eq!(ledger.current_version(5), 0);

        // 开始读操作
        let read_guard = ledger.begin_read(5);
        assert_eq!(read_guard.version(), 0);
        assert!(ledger.validate(&read_guard));

        {
            let _write = ledger.begin_write(5);
            // 写入进行中：计数为奇数
            assert_eq!(ledger.current_version(5), 1);
            let during = ledger.begin_read(5);
            assert!(during.write_in_progress());
            assert!(!ledger.validate(&during));
            assert!(!ledger.validate(&read_guard));
        }

        assert_eq!(ledger.current_version(5), 2);
        // 读操作已失效
        assert!(!ledger.validate(&read_guard));

        // 新的读操作有效
        let new_guard = ledger.begin_read(5);
        assert_eq!(new_guard.version(), 2);
        assert!(ledger.validate(&new_guard));
    }

    #[test]
    fn test_index_masking() {
        let ledger = VersionLedger::with_power(4).unwrap();
        assert_eq!(ledger.mask(), 0xF);
        drop(ledger.begin_write(0x13));
        assert_eq!(ledger.current_version(0x3), 2);
        // 其他计数器不受影响
        assert_eq!(ledger.current_version(0x4), 0);
    }

    #[test]
    fn test_invalid_power() {
        assert!(matches!(
            VersionLedger::with_power(200),
            Err(CuckooError::InvalidConfig { .. })
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_oversized_ledger_reports_allocation_failure() {
        // 2^62 个 4 字节计数器超出地址空间，预留阶段即失败
        assert_eq!(
            VersionLedger::with_power(62).unwrap_err(),
            CuckooError::AllocationFailed {
                size: usize::MAX,
                align: std::mem::align_of::<AtomicU32>(),
            }
        );
    }

    #[test]
    fn test_concurrent_validation() {
        // 写者同时修改两个原子单元，读者只在版本有效时接受读到的数据
        let ledger = Arc::new(VersionLedger::with_power(1).unwrap());
        let left = Arc::new(AtomicU64::new(0));
        let right = Arc::new(AtomicU64::new(0));
        let running = Arc::new(AtomicBool::new(true));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let (ledger, left, right, running) =
                    (ledger.clone(), left.clone(), right.clone(), running.clone());
                thread::spawn(move || {
                    let mut accepted = 0u64;
                    while running.load(Ordering::Relaxed) {
                        loop {
                            let guard = ledger.begin_read(0);
                            let l = left.load(Ordering::Relaxed);
                            let r = right.load(Ordering::Relaxed);
                            if !ledger.validate(&guard) {
                                continue;
                            }
                            assert_eq!(l, r, "读到了撕裂的写入");
                            accepted += 1;
                            break;
                        }
                    }
                    accepted
                })
            })
            .collect();

        for i in 1..=20_000u64 {
            let _write = ledger.begin_write(0);
            left.store(i, Ordering::Relaxed);
            right.store(i, Ordering::Relaxed);
        }
        running.store(false, Ordering::Relaxed);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
        assert_eq!(ledger.current_version(0), 40_000);
    }
}
