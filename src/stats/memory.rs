//! 内存统计 - 分别跟踪表持有的桶数组和版本账本字节数
//!
//! 扩容时新数组先于旧数组的释放被记录，峰值因此包含新旧两个数组同时存在的时刻。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// 表持有的存储区域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryRegion {
    /// 桶数组，扩容时整体替换
    Buckets,
    /// 版本账本，随表创建和销毁
    Ledger,
}

impl MemoryRegion {
    pub const ALL: [MemoryRegion; 2] = [MemoryRegion::Buckets, MemoryRegion::Ledger];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryRegion::Buckets => "buckets",
            MemoryRegion::Ledger => "ledger",
        }
    }
}

/// 内存统计接口
pub trait MemoryRecorder: Send + Sync {
    /// 表开始持有一块存储
    fn record_allocation(&self, region: MemoryRegion, bytes: usize);

    /// 表不再持有一块存储
    fn record_deallocation(&self, region: MemoryRegion, bytes: usize);

    fn snapshot(&self) -> MemoryStatsSnapshot;

    fn reset(&self);

    /// 导出Prometheus格式指标
    fn export_prometheus(&self) -> String;
}

/// 内存统计快照
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStatsSnapshot {
    pub bucket_bytes: usize,
    pub ledger_bytes: usize,
    pub peak_bytes: usize,
    pub bucket_arrays_allocated: u64,
    pub bucket_arrays_released: u64,
}

impl MemoryStatsSnapshot {
    /// 当前持有的总字节数
    pub fn current_used(&self) -> usize {
        self.bucket_bytes + self.ledger_bytes
    }

    /// 是否已归还全部存储
    pub fn is_released(&self) -> bool {
        self.current_used() == 0 && self.bucket_arrays_allocated == self.bucket_arrays_released
    }
}

/// 原子内存统计
#[derive(Debug, Default)]
pub struct AtomicMemoryStats {
    bytes: [AtomicUsize; 2],
    peak_bytes: AtomicUsize,
    arrays_allocated: AtomicU64,
    arrays_released: AtomicU64,
}

impl AtomicMemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn cell(&self, region: MemoryRegion) -> &AtomicUsize {
        &self.bytes[region as usize]
    }

    fn held(&self) -> usize {
        self.bytes.iter().map(|b| b.load(Ordering::Relaxed)).sum()
    }
}

impl MemoryRecorder for AtomicMemoryStats {
    fn record_allocation(&self, region: MemoryRegion, bytes: usize) {
        self.cell(region).fetch_add(bytes, Ordering::Relaxed);
        if region == MemoryRegion::Buckets {
            self.arrays_allocated.fetch_add(1, Ordering::Relaxed);
        }
        // 只有写锁持有者记录，求和与更新峰值之间没有竞争
        self.peak_bytes.fetch_max(self.held(), Ordering::Relaxed);
    }

    fn record_deallocation(&self, region: MemoryRegion, bytes: usize) {
        self.cell(region).fetch_sub(bytes, Ordering::Relaxed);
        if region == MemoryRegion::Buckets {
            self.arrays_released.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> MemoryStatsSnapshot {
        MemoryStatsSnapshot {
            bucket_bytes: self.cell(MemoryRegion::Buckets).load(Ordering::Relaxed),
            ledger_bytes: self.cell(MemoryRegion::Ledger).load(Ordering::Relaxed),
            peak_bytes: self.peak_bytes.load(Ordering::Relaxed),
            bucket_arrays_allocated: self.arrays_allocated.load(Ordering::Relaxed),
            bucket_arrays_released: self.arrays_released.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for cell in &self.bytes {
            cell.store(0, Ordering::Relaxed);
        }
        self.peak_bytes.store(0, Ordering::Relaxed);
        self.arrays_allocated.store(0, Ordering::Relaxed);
        self.arrays_released.store(0, Ordering::Relaxed);
    }

    fn export_prometheus(&self) -> String {
        let snap = self.snapshot();
        let mut output = String::new();

        output.push_str("# HELP cuckoo_memory_bytes Bytes currently held by the table\n");
        output.push_str("# TYPE cuckoo_memory_bytes gauge\n");
        for region in MemoryRegion::ALL {
            output.push_str(&format!(
                "cuckoo_memory_bytes{{region=\"{}\"}} {}\n",
                region.as_str(),
                self.cell(region).load(Ordering::Relaxed)
            ));
        }

        output.push_str("# HELP cuckoo_memory_peak_bytes Peak bytes held, including both arrays during expansion\n");
        output.push_str("# TYPE cuckoo_memory_peak_bytes gauge\n");
        output.push_str(&format!("cuckoo_memory_peak_bytes {}\n", snap.peak_bytes));

        output.push_str("# HELP cuckoo_bucket_arrays_total Bucket arrays allocated and released\n");
        output.push_str("# TYPE cuckoo_bucket_arrays_total counter\n");
        output.push_str(&format!(
            "cuckoo_bucket_arrays_total{{event=\"allocated\"}} {}\n",
            snap.bucket_arrays_allocated
        ));
        output.push_str(&format!(
            "cuckoo_bucket_arrays_total{{event=\"released\"}} {}\n",
            snap.bucket_arrays_released
        ));

        output
    }
}

/// 禁用内存统计
#[derive(Debug, Default)]
pub struct DisabledMemoryRecorder;

impl MemoryRecorder for DisabledMemoryRecorder {
    fn record_allocation(&self, _region: MemoryRegion, _bytes: usize) {}
    fn record_deallocation(&self, _region: MemoryRegion, _bytes: usize) {}
    fn snapshot(&self) -> MemoryStatsSnapshot {
        MemoryStatsSnapshot::default()
    }
    fn reset(&self) {}
    fn export_prometheus(&self) -> String {
        String::new()
    }
}
