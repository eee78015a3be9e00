use crate::error::EngineError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration, loaded from an optional `osprey.toml` plus
/// `OSPREY_*` environment overrides, with serde defaults underneath.
/// Immutable after construction; components receive it explicitly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub scoring: ScoringConfig,
    pub features: FeatureConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the trained model artifact. When unset the engine serves the
    /// built-in reference weights.
    pub artifact_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Decision threshold: phishing iff probability is strictly above it.
    pub threshold: f64,
    /// How many contributions to keep in `top_features`.
    pub top_features: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            top_features: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub check_dns: bool,
    pub check_domain_age: bool,
    pub fetch_content: bool,
    pub dns_timeout_ms: u64,
    pub whois_timeout_ms: u64,
    pub content_timeout_ms: u64,
    /// Page bodies are read through this cap and then cut off.
    pub max_content_bytes: usize,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    /// Base URL of the RDAP service used for domain-age lookups.
    pub rdap_endpoint: String,
    pub user_agent: String,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            check_dns: true,
            check_domain_age: true,
            fetch_content: true,
            dns_timeout_ms: 2_000,
            whois_timeout_ms: 2_000,
            content_timeout_ms: 3_000,
            max_content_bytes: 512 * 1024,
            cache_ttl_secs: 3_600,
            cache_max_entries: 5_000,
            rdap_endpoint: "https://rdap.org".to_string(),
            user_agent: concat!("osprey-engine/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FeatureConfig {
    /// All network stages disabled. Lexical features are still computed;
    /// network-derived features carry their defaults plus `*_disabled`
    /// warnings. Intended for air-gapped deployments and hermetic tests.
    pub fn offline() -> Self {
        Self {
            check_dns: false,
            check_domain_age: false,
            fetch_content: false,
            ..Self::default()
        }
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    pub fn whois_timeout(&self) -> Duration {
        Duration::from_millis(self.whois_timeout_ms)
    }

    pub fn content_timeout(&self) -> Duration {
        Duration::from_millis(self.content_timeout_ms)
    }
}

impl Config {
    pub fn load() -> Result<Self, EngineError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name("osprey").required(false))
            .add_source(config::Environment::with_prefix("OSPREY").separator("__"))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn offline() -> Self {
        Self {
            features: FeatureConfig::offline(),
            ..Self::default()
        }
    }
}
