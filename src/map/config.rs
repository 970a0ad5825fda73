//! 哈希表配置

use crate::{
    error::CuckooError,
    hash::HashAlgorithm,
    map::path::{MAX_CUCKOO_COUNT, NUM_CUCKOO_PATH},
    version::DEFAULT_KEYVER_POWER,
};

/// 默认 hashpower (2^16 个桶)
pub const DEFAULT_HASHPOWER: u32 = 16;

/// hashpower 上限，主桶索引取摘要高位，最多32位
pub const MAX_HASHPOWER: u32 = if usize::BITS >= 64 { 32 } else { usize::BITS - 4 };

/// 版本计数器数量对数的上限
pub const MAX_KEYVER_POWER: u32 = 24;

/// 哈希表配置
#[derive(Clone, Debug, PartialEq)]
pub struct CuckooTableConfig {
    // 桶数量的对数，0 表示使用默认值
    pub hashpower: u32,
    pub max_cuckoo_count: usize,
    pub keyver_power: u32,
    pub hash_algorithm: HashAlgorithm,
    pub hash_seed: u64,
    // 受害者选择的随机种子，None 时从系统熵初始化
    pub rng_seed: Option<u64>,
    pub enable_stats: bool,
}

impl Default for CuckooTableConfig {
    fn default() -> Self {
        Self {
            hashpower: DEFAULT_HASHPOWER,
            max_cuckoo_count: MAX_CUCKOO_COUNT,
            keyver_power: DEFAULT_KEYVER_POWER,
            hash_algorithm: HashAlgorithm::default(),
            hash_seed: 0,
            rng_seed: None,
            enable_stats: true,
        }
    }
}

impl CuckooTableConfig {
    pub fn with_hashpower(mut self, hashpower: u32) -> Self {
        self.hashpower = hashpower;
        self
    }

    pub fn with_max_cuckoo_count(mut self, max_cuckoo_count: usize) -> Self {
        self.max_cuckoo_count = max_cuckoo_count;
        self
    }

    pub fn with_keyver_power(mut self, keyver_power: u32) -> Self {
        self.keyver_power = keyver_power;
        self
    }

    pub fn with_hash(mut self, algorithm: HashAlgorithm, seed: u64) -> Self {
        self.hash_algorithm = algorithm;
        self.hash_seed = seed;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn with_stats(mut self, enable: bool) -> Self {
        self.enable_stats = enable;
        self
    }

    /// 实际使用的 hashpower
    pub fn effective_hashpower(&self) -> u32 {
        if self.hashpower == 0 {
            DEFAULT_HASHPOWER
        } else {
            self.hashpower
        }
    }

    /// 校验配置参数
    pub fn validate(&self) -> Result<(), CuckooError> {
        let hashpower = self.effective_hashpower();
        if hashpower > MAX_HASHPOWER {
            return Err(CuckooError::InvalidConfig {
                reason: format!("hashpower 必须在 1..={} 之间, 实际为 {}", MAX_HASHPOWER, hashpower),
            });
        }
        if self.max_cuckoo_count < NUM_CUCKOO_PATH {
            return Err(CuckooError::InvalidConfig {
                reason: format!(
                    "max_cuckoo_count 至少为 {}, 实际为 {}",
                    NUM_CUCKOO_PATH, self.max_cuckoo_count
                ),
            });
        }
        if self.keyver_power == 0 || self.keyver_power > MAX_KEYVER_POWER {
            return Err(CuckooError::InvalidConfig {
                reason: format!(
                    "keyver_power 必须在 1..={} 之间, 实际为 {}",
                    MAX_KEYVER_POWER, self.keyver_power
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CuckooTableConfig::default();
        assert_eq!(config.hashpower, 16);
        assert_eq!(config.max_cuckoo_count, 500);
        assert_eq!(config.keyver_power, 13);
        assert_eq!(config.hash_algorithm, HashAlgorithm::XxHash);
        assert!(config.rng_seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_hashpower_maps_to_default() {
        let config = CuckooTableConfig::default().with_hashpower(0);
        assert_eq!(config.effective_hashpower(), DEFAULT_HASHPOWER);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        let too_big = CuckooTableConfig::default().with_hashpower(MAX_HASHPOWER + 1);
        assert!(matches!(too_big.validate(), Err(CuckooError::InvalidConfig { .. })));

        let no_budget = CuckooTableConfig::default().with_max_cuckoo_count(1);
        assert!(no_budget.validate().is_err());

        let no_keyvers = CuckooTableConfig::default().with_keyver_power(0);
        assert!(no_keyvers.validate().is_err());

        let huge_ledger = CuckooTableConfig::default().with_keyver_power(30);
        assert!(huge_ledger.validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = CuckooTableConfig::default()
            .with_hashpower(10)
            .with_hash(HashAlgorithm::Fnv, 99)
            .with_rng_seed(5)
            .with_stats(false);
        assert_eq!(config.hashpower, 10);
        assert_eq!(config.hash_algorithm, HashAlgorithm::Fnv);
        assert_eq!(config.hash_seed, 99);
        assert_eq!(config.rng_seed, Some(5));
        assert!(!config.enable_stats);
    }
}
