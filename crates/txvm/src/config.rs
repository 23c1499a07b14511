use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub type Fuel = u64;

pub const DEFAULT_FUEL_LIMIT: Fuel = 100_000;
pub const DEFAULT_MAX_CONDITION_DEPTH: usize = 16;
pub const DEFAULT_MAX_STACK_LEN: usize = 1_024;
pub const DEFAULT_MAX_VALUE_DEPTH: usize = 64;
pub const DEFAULT_MAX_VALUE_SIZE: usize = 64 * 1024;
/// Bytes copied, hashed or compared per extra unit of fuel.
pub const BYTES_PER_FUEL: usize = 256;

static GLOBAL: Lazy<EngineConfig> = Lazy::new(EngineConfig::from_env);

/// Per-run resource bounds. Every validator must run with the same
/// values or they will disagree on Faulted outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Instruction budget shared by the root program and every nested
    /// condition run.
    pub fuel_limit: Fuel,
    /// Maximum nesting of condition invocations.
    pub max_condition_depth: usize,
    /// Maximum length of any single stack.
    pub max_stack_len: usize,
    /// Maximum tuple nesting of a value built or pushed by a program.
    pub max_value_depth: usize,
    /// Maximum encoded size in bytes of such a value.
    pub max_value_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fuel_limit: DEFAULT_FUEL_LIMIT,
            max_condition_depth: DEFAULT_MAX_CONDITION_DEPTH,
            max_stack_len: DEFAULT_MAX_STACK_LEN,
            max_value_depth: DEFAULT_MAX_VALUE_DEPTH,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
        }
    }
}

impl EngineConfig {
    /// Reads `TXVM_FUEL_LIMIT`, `TXVM_MAX_CONDITION_DEPTH`,
    /// `TXVM_MAX_STACK_LEN`, `TXVM_MAX_VALUE_DEPTH` and
    /// `TXVM_MAX_VALUE_SIZE`; missing or unparsable values keep defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            fuel_limit: env_or("TXVM_FUEL_LIMIT", d.fuel_limit),
            max_condition_depth: env_or("TXVM_MAX_CONDITION_DEPTH", d.max_condition_depth),
            max_stack_len: env_or("TXVM_MAX_STACK_LEN", d.max_stack_len),
            max_value_depth: env_or("TXVM_MAX_VALUE_DEPTH", d.max_value_depth),
            max_value_size: env_or("TXVM_MAX_VALUE_SIZE", d.max_value_size),
        }
    }

    /// Fuel beyond the per-instruction unit for touching `bytes` of
    /// value data.
    pub fn byte_fuel(bytes: usize) -> Fuel {
        (bytes / BYTES_PER_FUEL) as Fuel
    }

    /// Process-wide configuration, loaded from the environment once.
    pub fn global() -> &'static EngineConfig {
        &GLOBAL
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
