//! Layered configuration, mirroring SPEC_FULL.md §6's configuration table.
//!
//! Loaded from a TOML file (`CoreConfig::from_file`, grounded on the
//! teacher's `SystemConfig::load`) with documented defaults for every
//! field, then optionally overridden by environment variables of the same
//! name (`CoreConfig::apply_env_overrides`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoreConfig {
    pub bind_addr: String,
    pub data_dir: String,
    pub auth_token: String,
    pub heartbeat_timeout_ms: u64,
    pub orch_timeout_ms: u64,
    pub auction_default_ms: u64,
    pub min_lease_ttl_ms: u64,
    pub max_lease_ttl_ms: u64,
    pub snapshot_every_n: u64,
    pub project_idle_ms: u64,
    pub max_connections_per_project: usize,
    pub max_event_queue: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            data_dir: "./data".to_string(),
            auth_token: "dev-token".to_string(),
            heartbeat_timeout_ms: 60_000,
            orch_timeout_ms: 120_000,
            auction_default_ms: 10_000,
            min_lease_ttl_ms: 30_000,
            max_lease_ttl_ms: 30 * 60_000,
            snapshot_every_n: 500,
            project_idle_ms: 15 * 60_000,
            max_connections_per_project: 64,
            max_event_queue: 256,
        }
    }
}

impl CoreConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CoreConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.min_lease_ttl_ms == 0 {
            anyhow::bail!("min_lease_ttl_ms must be greater than zero");
        }
        if self.max_lease_ttl_ms < self.min_lease_ttl_ms {
            anyhow::bail!("max_lease_ttl_ms must be >= min_lease_ttl_ms");
        }
        if self.max_connections_per_project == 0 {
            anyhow::bail!("max_connections_per_project must be greater than zero");
        }
        Ok(())
    }

    /// Overlay environment variables (same names as the config table) on
    /// top of whatever was loaded from file or from `Default`, following
    /// the precedence documented in SPEC_FULL.md §6.
    pub fn apply_env_overrides(mut self) -> Self {
        macro_rules! env_str {
            ($field:ident, $key:literal) => {
                if let Ok(v) = std::env::var($key) {
                    self.$field = v;
                }
            };
        }
        macro_rules! env_num {
            ($field:ident, $key:literal) => {
                if let Ok(v) = std::env::var($key) {
                    if let Ok(parsed) = v.parse() {
                        self.$field = parsed;
                    }
                }
            };
        }

        env_str!(bind_addr, "BIND_ADDR");
        env_str!(data_dir, "DATA_DIR");
        env_str!(auth_token, "AUTH_TOKEN");
        env_num!(heartbeat_timeout_ms, "HEARTBEAT_TIMEOUT_MS");
        env_num!(orch_timeout_ms, "ORCH_TIMEOUT_MS");
        env_num!(auction_default_ms, "AUCTION_DEFAULT_MS");
        env_num!(min_lease_ttl_ms, "MIN_LEASE_TTL_MS");
        env_num!(max_lease_ttl_ms, "MAX_LEASE_TTL_MS");
        env_num!(snapshot_every_n, "SNAPSHOT_EVERY_N");
        env_num!(project_idle_ms, "PROJECT_IDLE_MS");
        env_num!(max_connections_per_project, "MAX_CONNECTIONS_PER_PROJECT");
        env_num!(max_event_queue, "MAX_EVENT_QUEUE");

        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_ttl_bounds() {
        let mut config = CoreConfig::default();
        config.max_lease_ttl_ms = config.min_lease_ttl_ms - 1;
        assert!(config.validate().is_err());
    }
}
