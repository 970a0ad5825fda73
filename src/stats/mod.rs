//! 统计模块 - 统一管理哈希表性能指标
//!
//! 每张表持有自己的记录器，进程内没有全局统计状态。

pub mod memory;
pub mod operation;
pub mod recorder;

use std::time::Instant;

pub use memory::{AtomicMemoryStats, MemoryRecorder, MemoryRegion, MemoryStatsSnapshot};
pub use operation::{AtomicOperationStats, OperationRecorder, OperationStatsSnapshot};
pub use recorder::{
    DefaultStatsRecorder, DisabledStatsRecorder, StatsRecorder, StatsRecorderFactory, TableStats,
};

use crate::types::OperationType;

/// 计时并记录一次写操作
pub(crate) fn timed<T, E>(
    recorder: &dyn StatsRecorder,
    op_type: OperationType,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E> {
    if !recorder.is_enabled() {
        return f();
    }
    let start = Instant::now();
    let result = f();
    recorder.record_operation(op_type, start.elapsed(), result.is_ok());
    result
}
