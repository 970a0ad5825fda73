// src/stats/operation.rs
//! 操作统计 - 跟踪哈希表操作次数、失败次数和写操作耗时

use crate::types::OperationType;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

const OP_KINDS: usize = OperationType::ALL.len();

/// 操作统计接口
pub trait OperationRecorder: Send + Sync {
    /// 记录带耗时的操作
    fn record(&self, op_type: OperationType, duration: Duration, success: bool);

    /// 只记录次数（读路径不计时）
    fn record_count(&self, op_type: OperationType, success: bool);

    /// 记录一次插入中消耗的踢出次数
    fn record_kicks(&self, kicks: u64);

    /// 记录一次读重试
    fn record_read_retry(&self);

    /// 记录一次表满
    fn record_table_full(&self);

    /// 获取操作统计快照
    fn snapshot(&self) -> OperationStatsSnapshot;

    /// 重置统计
    fn reset(&self);

    /// 导出Prometheus格式指标
    fn export_prometheus(&self) -> String;
}

/// 操作统计快照
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationStatsSnapshot {
    pub find_count: u64,
    pub find_miss_count: u64,
    pub insert_count: u64,
    pub insert_failure_count: u64,
    pub delete_count: u64,
    pub delete_failure_count: u64,
    pub expand_count: u64,
    pub expand_failure_count: u64,
    pub report_count: u64,
    pub kick_count: u64,
    pub read_retry_count: u64,
    pub table_full_count: u64,
    pub total_duration: u64, // 纳秒
}

impl OperationStatsSnapshot {
    /// 按操作类型取次数
    pub fn count(&self, op_type: OperationType) -> u64 {
        match op_type {
            OperationType::Find => self.find_count,
            OperationType::Insert => self.insert_count,
            OperationType::Delete => self.delete_count,
            OperationType::Kick => self.kick_count,
            OperationType::Expand => self.expand_count,
            OperationType::Report => self.report_count,
        }
    }
}

/// 原子操作统计
#[derive(Debug, Default)]
pub struct AtomicOperationStats {
    counts: [AtomicU64; OP_KINDS],
    failures: [AtomicU64; OP_KINDS],
    read_retry_count: AtomicU64,
    table_full_count: AtomicU64,
    total_duration: AtomicU64, // 纳秒
}

impl AtomicOperationStats {
    /// 创建新统计
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn load(cells: &[AtomicU64; OP_KINDS], op_type: OperationType) -> u64 {
        cells[op_type as usize].load(Ordering::Relaxed)
    }
}

impl OperationRecorder for AtomicOperationStats {
    fn record(&self, op_type: OperationType, duration: Duration, success: bool) {
        self.record_count(op_type, success);
        self.total_duration
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    #[inline]
    fn record_count(&self, op_type: OperationType, success: bool) {
        self.counts[op_type as usize].fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failures[op_type as usize].fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_kicks(&self, kicks: u64) {
        self.counts[OperationType::Kick as usize].fetch_add(kicks, Ordering::Relaxed);
    }

    #[inline]
    fn record_read_retry(&self) {
        self.read_retry_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_table_full(&self) {
        self.table_full_count.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> OperationStatsSnapshot {
        OperationStatsSnapshot {
            find_count: Self::load(&self.counts, OperationType::Find),
            find_miss_count: Self::load(&self.failures, OperationType::Find),
            insert_count: Self::load(&self.counts, OperationType::Insert),
            insert_failure_count: Self::load(&self.failures, OperationType::Insert),
            delete_count: Self::load(&self.counts, OperationType::Delete),
            delete_failure_count: Self::load(&self.failures, OperationType::Delete),
            expand_count: Self::load(&self.counts, OperationType::Expand),
            expand_failure_count: Self::load(&self.failures, OperationType::Expand),
            report_count: Self::load(&self.counts, OperationType::Report),
            kick_count: Self::load(&self.counts, OperationType::Kick),
            read_retry_count: self.read_retry_count.load(Ordering::Relaxed),
            table_full_count: self.table_full_count.load(Ordering::Relaxed),
            total_duration: self.total_duration.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for cell in self.counts.iter().chain(self.failures.iter()) {
            cell.store(0, Ordering::Relaxed);
        }
        self.read_retry_count.store(0, Ordering::Relaxed);
        self.table_full_count.store(0, Ordering::Relaxed);
        self.total_duration.store(0, Ordering::Relaxed);
    }

    fn export_prometheus(&self) -> String {
        let mut output = String::new();

        for op in OperationType::ALL {
            output.push_str(&format!(
                "# HELP cuckoo_operation_{}_count Total {} operations\n",
                op.as_str(),
                op.as_str()
            ));
            output.push_str(&format!("# TYPE cuckoo_operation_{}_count counter\n", op.as_str()));
            output.push_str(&format!(
                "cuckoo_operation_{}_count {}\n",
                op.as_str(),
                Self::load(&self.counts, op)
            ));
        }

        for op in [OperationType::Find, OperationType::Insert, OperationType::Delete, OperationType::Expand] {
            output.push_str(&format!(
                "# HELP cuckoo_operation_{}_failure_count Failed {} operations\n",
                op.as_str(),
                op.as_str()
            ));
            output.push_str(&format!(
                "# TYPE cuckoo_operation_{}_failure_count counter\n",
                op.as_str()
            ));
            output.push_str(&format!(
                "cuckoo_operation_{}_failure_count {}\n",
                op.as_str(),
                Self::load(&self.failures, op)
            ));
        }

        output.push_str("# HELP cuckoo_read_retry_count Optimistic read retries\n");
        output.push_str("# TYPE cuckoo_read_retry_count counter\n");
        output.push_str(&format!(
            "cuckoo_read_retry_count {}\n",
            self.read_retry_count.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP cuckoo_table_full_count Inserts rejected because the table is full\n");
        output.push_str("# TYPE cuckoo_table_full_count counter\n");
        output.push_str(&format!(
            "cuckoo_table_full_count {}\n",
            self.table_full_count.load(Ordering::Relaxed)
        ));

        output.push_str("# HELP cuckoo_operation_total_duration Total write operation duration (ns)\n");
        output.push_str("# TYPE cuckoo_operation_total_duration counter\n");
        output.push_str(&format!(
            "cuckoo_operation_total_duration {}\n",
            self.total_duration.load(Ordering::Relaxed)
        ));

        output
    }
}

/// 禁用操作统计实现
#[derive(Default)]
pub struct DisabledOperationRecorder;

impl OperationRecorder for DisabledOperationRecorder {
    fn record(&self, _op_type: OperationType, _duration: Duration, _success: bool) {}
    fn record_count(&self, _op_type: OperationType, _success: bool) {}
    fn record_kicks(&self, _kicks: u64) {}
    fn record_read_retry(&self) {}
    fn record_table_full(&self) {}
    fn snapshot(&self) -> OperationStatsSnapshot {
        OperationStatsSnapshot::default()
    }
    fn reset(&self) {}
    fn export_prometheus(&self) -> String {
        String::new()
    }
}
