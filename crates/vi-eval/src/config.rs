//! Engine limits and seeds.

use serde::{Deserialize, Serialize};

/// Default step budget per event.
pub const DEFAULT_GAS_LIMIT: u64 = 1_000_000;

/// Default maximum nesting of user-function calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Interpreter configuration.
///
/// Every field has a default, so hosts can pass partial JSON such as
/// `{"rng_seed": 7}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Steps (expression nodes plus statements) allowed per event.
    pub gas_limit: u64,
    pub max_call_depth: usize,
    /// Seed for `random(lo, hi)`.
    pub rng_seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gas_limit: DEFAULT_GAS_LIMIT,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            rng_seed: 0,
        }
    }
}

impl EngineConfig {
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"rng_seed": 7}"#).unwrap();
        assert_eq!(config.rng_seed, 7);
        assert_eq!(config.gas_limit, DEFAULT_GAS_LIMIT);
        assert_eq!(config.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
    }
}
