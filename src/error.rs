//! 统一错误处理 - 所有可能错误类型和恢复逻辑

/// Cuckoo哈希表可能发生的错误
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CuckooError {
    #[error("表已满，无法插入新条目 (hashpower: {hashpower}, 容量: {capacity}, 当前大小: {size}, 负载因子: {load_factor:.2})")]
    TableFull {
        hashpower: u32,
        capacity: usize,
        size: usize,
        load_factor: f32,
    },

    #[error("键已存在: {key}")]
    KeyAlreadyExists {
        key: String,
    },

    #[error("键不存在: {key}")]
    KeyNotFound {
        key: String,
    },

    #[error("键0为空槽位保留值，不能插入")]
    ReservedKey,

    #[error("内存分配失败 (大小: {size}, 对齐: {align})")]
    AllocationFailed {
        size: usize,
        align: usize,
    },

    #[error("扩容操作正在进行中")]
    UnderExpansion,

    #[error("扩容失败: 无法将全部条目放入 hashpower={hashpower} 的新表")]
    ExpansionFailed {
        hashpower: u32,
    },

    #[error("已达到最大容量 (hashpower: {hashpower})")]
    CapacityExceeded {
        hashpower: u32,
    },

    #[error("无效配置: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// 预留 `count` 个元素的连续存储，失败时返回 `AllocationFailed` 而不是中止进程
pub(crate) fn try_allocate<T>(count: usize) -> Result<Vec<T>, CuckooError> {
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(count)
        .map_err(|_| CuckooError::AllocationFailed {
            size: count.saturating_mul(std::mem::size_of::<T>()),
            align: std::mem::align_of::<T>(),
        })?;
    Ok(storage)
}

impl CuckooError {
    /// 获取错误恢复建议
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::TableFull { .. } => Some("调用 expand() 扩容后重试插入"),
            Self::KeyAlreadyExists { .. } => Some("插入不覆盖旧值，如需更新请先删除"),
            Self::KeyNotFound { .. } => None,
            Self::ReservedKey => Some("使用非零键"),
            Self::AllocationFailed { .. } => Some("检查系统内存或减小 hashpower"),
            Self::UnderExpansion => Some("等待当前扩容完成后重试"),
            Self::ExpansionFailed { .. } => Some("更换哈希种子或增大 max_cuckoo_count"),
            Self::CapacityExceeded { .. } => Some("拆分数据到多张表"),
            Self::InvalidConfig { .. } => Some("检查配置参数"),
        }
    }

    /// 判断错误是否可恢复
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::AllocationFailed { .. } | Self::CapacityExceeded { .. } | Self::InvalidConfig { .. }
        )
    }

    /// 是否为正常的业务结果（查无此键、重复插入），而非故障
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. } | Self::KeyAlreadyExists { .. })
    }

    /// 是否需要操作重试
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::UnderExpansion | Self::TableFull { .. })
    }
}
