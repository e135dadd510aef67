//! Engine configuration.
//!
//! Options can be built in code, read from TOML or taken from the
//! environment:
//!
//! ```toml
//! tier_threshold = 8
//! max_call_depth = 512
//! default_policy = "tiered_compilation"
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::eval::call_stack::DEFAULT_MAX_CALL_DEPTH;
use crate::tier::{DEFAULT_TIER_THRESHOLD, Policy};

pub const ENV_TIER_THRESHOLD: &str = "LAMTIER_TIER_THRESHOLD";
pub const ENV_MAX_CALL_DEPTH: &str = "LAMTIER_MAX_CALL_DEPTH";
pub const ENV_POLICY: &str = "LAMTIER_POLICY";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Toml(String),
    #[error("Invalid value \"{value}\" for {name}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("Tier threshold must be at least 1")]
    InvalidThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitOptions {
    /// Calls after which tiered compilation switches to compiled code.
    pub tier_threshold: usize,
    pub max_call_depth: u32,
    /// Policy used by [`Engine::create_default_callable`](crate::Engine::create_default_callable).
    pub default_policy: Policy,
}

impl Default for JitOptions {
    fn default() -> Self {
        Self {
            tier_threshold: DEFAULT_TIER_THRESHOLD,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            default_policy: Policy::default(),
        }
    }
}

impl JitOptions {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let options: JitOptions = toml::from_str(s).map_err(|e| ConfigError::Toml(e.to_string()))?;
        options.validate()
    }

    /// Defaults overridden by whichever `LAMTIER_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut options = Self::default();
        if let Some(value) = lookup(ENV_TIER_THRESHOLD) {
            options.tier_threshold = parse(ENV_TIER_THRESHOLD, value)?;
        }
        if let Some(value) = lookup(ENV_MAX_CALL_DEPTH) {
            options.max_call_depth = parse(ENV_MAX_CALL_DEPTH, value)?;
        }
        if let Some(value) = lookup(ENV_POLICY) {
            options.default_policy = parse(ENV_POLICY, value)?;
        }
        options.validate()
    }

    pub fn with_tier_threshold(mut self, tier_threshold: usize) -> Self {
        self.tier_threshold = tier_threshold;
        self
    }

    pub fn with_max_call_depth(mut self, max_call_depth: u32) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    pub fn with_default_policy(mut self, default_policy: Policy) -> Self {
        self.default_policy = default_policy;
        self
    }

    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.tier_threshold == 0 {
            return Err(ConfigError::InvalidThreshold);
        }
        Ok(self)
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv { name, value })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use rustc_hash::FxHashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: FxHashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let options = JitOptions::default();
        assert_eq!(options.tier_threshold, 4);
        assert_eq!(options.max_call_depth, 1024);
        assert_eq!(options.default_policy, Policy::Compiling);
    }

    #[test]
    fn test_from_toml_fills_defaults() {
        let options = JitOptions::from_toml_str("default_policy = \"tiered_compilation\"").unwrap();
        assert_eq!(options.default_policy, Policy::TieredCompilation);
        assert_eq!(options.tier_threshold, 4);
    }

    #[rstest]
    #[case::zero_threshold("tier_threshold = 0", ConfigError::InvalidThreshold)]
    fn test_from_toml_rejects(#[case] input: &str, #[case] expected: ConfigError) {
        assert_eq!(JitOptions::from_toml_str(input), Err(expected));
    }

    #[test]
    fn test_from_toml_unknown_policy() {
        assert!(matches!(
            JitOptions::from_toml_str("default_policy = \"eager\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_from_env() {
        let options = JitOptions::from_env_with(env(&[
            (ENV_TIER_THRESHOLD, "10"),
            (ENV_POLICY, "interpreting"),
        ]))
        .unwrap();
        assert_eq!(options.tier_threshold, 10);
        assert_eq!(options.default_policy, Policy::Interpreting);
        assert_eq!(options.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
    }

    #[rstest]
    #[case::threshold(ENV_TIER_THRESHOLD, "many")]
    #[case::depth(ENV_MAX_CALL_DEPTH, "-1")]
    #[case::policy(ENV_POLICY, "eager")]
    fn test_from_env_rejects(#[case] name: &'static str, #[case] value: &str) {
        assert_eq!(
            JitOptions::from_env_with(env(&[(name, value)])),
            Err(ConfigError::InvalidEnv {
                name,
                value: value.to_string()
            })
        );
    }
}
