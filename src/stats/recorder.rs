// src/stats/recorder.rs
//! 统计记录器 - 把操作统计和内存统计组合成每张表的记录器

use std::{sync::Arc, time::Duration};

use crate::{
    stats::{
        memory::{AtomicMemoryStats, DisabledMemoryRecorder, MemoryRecorder, MemoryStatsSnapshot},
        operation::{
            AtomicOperationStats, DisabledOperationRecorder, OperationRecorder,
            OperationStatsSnapshot,
        },
    },
    types::OperationType,
};

/// 统计记录器特征
pub trait StatsRecorder: Send + Sync {
    fn operation_stats(&self) -> &dyn OperationRecorder;

    fn memory_stats(&self) -> &dyn MemoryRecorder;

    /// 为 false 时写路径跳过计时
    fn is_enabled(&self) -> bool;

    /// 记录带耗时的操作
    fn record_operation(&self, op_type: OperationType, duration: Duration, success: bool) {
        self.operation_stats().record(op_type, duration, success);
    }

    /// 记录操作计数
    fn record_operation_count(&self, op_type: OperationType, success: bool) {
        self.operation_stats().record_count(op_type, success);
    }

    /// 重置所有统计
    fn reset(&self) {
        self.operation_stats().reset();
        self.memory_stats().reset();
    }

    /// 导出Prometheus格式指标
    fn export_prometheus(&self) -> String {
        let mut output = self.operation_stats().export_prometheus();
        output.push_str(&self.memory_stats().export_prometheus());
        output
    }

    fn operation_stats_snapshot(&self) -> OperationStatsSnapshot {
        self.operation_stats().snapshot()
    }

    fn memory_stats_snapshot(&self) -> MemoryStatsSnapshot {
        self.memory_stats().snapshot()
    }
}

/// 一张表的统计：操作部分和内存部分可以分别替换
#[derive(Debug)]
pub struct TableStats<O, M> {
    operation: O,
    memory: M,
    enabled: bool,
}

/// 默认统计记录器
pub type DefaultStatsRecorder = TableStats<AtomicOperationStats, AtomicMemoryStats>;

/// 禁用统计的记录器
pub type DisabledStatsRecorder = TableStats<DisabledOperationRecorder, DisabledMemoryRecorder>;

impl<O: OperationRecorder, M: MemoryRecorder> TableStats<O, M> {
    pub fn from_parts(operation: O, memory: M) -> Self {
        Self {
            operation,
            memory,
            enabled: true,
        }
    }
}

impl DefaultStatsRecorder {
    pub fn new() -> Self {
        Self::from_parts(AtomicOperationStats::new(), AtomicMemoryStats::new())
    }
}

impl DisabledStatsRecorder {
    pub fn new() -> Self {
        Self {
            operation: DisabledOperationRecorder,
            memory: DisabledMemoryRecorder,
            enabled: false,
        }
    }
}

impl<O: OperationRecorder, M: MemoryRecorder> StatsRecorder for TableStats<O, M> {
    fn operation_stats(&self) -> &dyn OperationRecorder {
        &self.operation
    }

    fn memory_stats(&self) -> &dyn MemoryRecorder {
        &self.memory
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// 统计记录器工厂
pub struct StatsRecorderFactory;

impl StatsRecorderFactory {
    pub fn create_default() -> Arc<dyn StatsRecorder> {
        Arc::new(DefaultStatsRecorder::new())
    }

    pub fn create_disabled() -> Arc<dyn StatsRecorder> {
        Arc::new(DisabledStatsRecorder::new())
    }

    /// 组合自定义的操作统计和内存统计
    pub fn create_custom(
        operation: impl OperationRecorder + 'static,
        memory: impl MemoryRecorder + 'static,
    ) -> Arc<dyn StatsRecorder> {
        Arc::new(TableStats::from_parts(operation, memory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::memory::MemoryRegion;

    #[test]
    fn test_default_recorder() {
        let recorder = StatsRecorderFactory::create_default();
        assert!(recorder.is_enabled());
        recorder.record_operation_count(OperationType::Find, true);
        recorder.record_operation(OperationType::Expand, Duration::from_millis(1), true);
        recorder
            .memory_stats()
            .record_allocation(MemoryRegion::Buckets, 4096);

        assert_eq!(recorder.operation_stats_snapshot().find_count, 1);
        assert_eq!(recorder.operation_stats_snapshot().expand_count, 1);
        assert_eq!(recorder.memory_stats_snapshot().bucket_bytes, 4096);

        let text = recorder.export_prometheus();
        assert!(text.contains("cuckoo_operation_find_count 1\n"));
        assert!(text.contains("cuckoo_memory_bytes{region=\"buckets\"} 4096\n"));

        recorder.reset();
        assert_eq!(recorder.operation_stats_snapshot().find_count, 0);
        assert_eq!(recorder.memory_stats_snapshot(), MemoryStatsSnapshot::default());
    }

    #[test]
    fn test_disabled_recorder() {
        let recorder = StatsRecorderFactory::create_disabled();
        assert!(!recorder.is_enabled());
        recorder.record_operation_count(OperationType::Insert, true);
        recorder.operation_stats().record_read_retry();
        recorder
            .memory_stats()
            .record_allocation(MemoryRegion::Ledger, 64);
        assert_eq!(recorder.operation_stats_snapshot(), OperationStatsSnapshot::default());
        assert_eq!(recorder.memory_stats_snapshot(), MemoryStatsSnapshot::default());
        assert!(recorder.export_prometheus().is_empty());
    }

    #[test]
    fn test_custom_recorder() {
        let recorder =
            StatsRecorderFactory::create_custom(AtomicOperationStats::new(), DisabledMemoryRecorder);
        assert!(recorder.is_enabled());
        recorder.record_operation_count(OperationType::Delete, false);
        recorder
            .memory_stats()
            .record_allocation(MemoryRegion::Buckets, 64);

        let snap = recorder.operation_stats_snapshot();
        assert_eq!(snap.delete_count, 1);
        assert_eq!(snap.delete_failure_count, 1);
        assert_eq!(recorder.memory_stats_snapshot(), MemoryStatsSnapshot::default());
    }
}
