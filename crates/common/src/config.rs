//! Runtime configuration (spec §6).
//!
//! Layered with the `config` crate: bundled defaults, then an optional
//! config file, then `MULTISIG_`-prefixed environment variables, the same
//! layering style used elsewhere in the corpus for service configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRateLimitConfig {
    pub max_attempts: u32,
    pub window_ms: u64,
    pub block_duration_ms: u64,
}

impl Default for AuthRateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window_ms: 60_000,
            block_duration_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    ReplicatedKv,
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::Memory
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicatedKvConfig {
    pub endpoints: Vec<String>,
    pub key_prefix: String,
}

impl Default for ReplicatedKvConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["127.0.0.1:2379".to_string()],
            key_prefix: "sessions:".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub listen_host: String,
    pub listen_port: u16,
    pub session_timeout_ms: u64,
    pub transaction_safety_margin_ms: u64,
    pub auth_rate_limit: AuthRateLimitConfig,
    pub store_backend: StoreBackend,
    pub replicated_kv: ReplicatedKvConfig,
    pub tunnel_provider: Option<String>,
    pub retention_after_terminal_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_host: "localhost".to_string(),
            listen_port: 3000,
            session_timeout_ms: 1_800_000,
            transaction_safety_margin_ms: 10_000,
            auth_rate_limit: AuthRateLimitConfig::default(),
            store_backend: StoreBackend::Memory,
            replicated_kv: ReplicatedKvConfig::default(),
            tunnel_provider: None,
            retention_after_terminal_ms: 300_000,
        }
    }
}

impl Config {
    /// Load configuration, layering: built-in defaults, an optional file at
    /// `path`, then `MULTISIG_`-prefixed environment variables (e.g.
    /// `MULTISIG_LISTEN_PORT=4000`).
    pub fn load(path: Option<&str>) -> Result<Self, crate::error::MultisigError> {
        let defaults = Self::default();
        let defaults_json = serde_json::to_value(&defaults)
            .map_err(|e| crate::error::MultisigError::Configuration(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(
            config::File::from_str(&defaults_json.to_string(), config::FileFormat::Json),
        );

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MULTISIG")
                .separator("__")
                .try_parsing(true),
        );

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::error::MultisigError::Configuration(e.to_string()))
    }

    /// The ledger's own transaction validity window (spec §4.2): fixed by
    /// the network, not by this coordinator's configuration.
    pub const LEDGER_VALIDITY_MS: u64 = 120_000;

    /// The effective transaction signing window: the ledger's validity
    /// window less the configured safety margin, nominally 110s for the
    /// default 10s margin.
    pub fn transaction_validity_ms(&self) -> u64 {
        Self::LEDGER_VALIDITY_MS.saturating_sub(self.transaction_safety_margin_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.listen_port, 3000);
        assert_eq!(c.session_timeout_ms, 1_800_000);
        assert_eq!(c.transaction_safety_margin_ms, 10_000);
        assert_eq!(c.auth_rate_limit.max_attempts, 5);
        assert_eq!(c.auth_rate_limit.window_ms, 60_000);
        assert_eq!(c.auth_rate_limit.block_duration_ms, 300_000);
        assert_eq!(c.retention_after_terminal_ms, 300_000);
        assert_eq!(c.transaction_validity_ms(), 110_000);
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let c = Config::load(None).unwrap();
        assert_eq!(c.listen_port, 3000);
    }
}
