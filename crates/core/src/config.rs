use crate::error::HbResult;
use serde::Deserialize;
use std::time::Duration;

/// Root configuration. Loaded from environment variables with the prefix
/// `HEADER_BIDDING__`, every field falling back to its default.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub bidding: BiddingConfig,
    #[serde(default)]
    pub direct_demand: DirectDemandConfig,
}

// ─── Bidding Config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct BiddingConfig {
    /// Per-request deadline used when the caller does not supply one.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_bidders")]
    pub max_concurrent_bidders: usize,
}

fn default_node_id() -> String { "sdk-01".to_string() }
fn default_timeout_ms() -> u64 { 2000 }
fn default_max_concurrent_bidders() -> usize { 8 }

impl BiddingConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl Default for BiddingConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_concurrent_bidders: default_max_concurrent_bidders(),
        }
    }
}

// ─── Direct Demand Config ───────────────────────────────────────────────────

/// Owned-and-operated demand source queried alongside the primary auction.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectDemandConfig {
    #[serde(default = "default_direct_enabled")]
    pub enabled: bool,
    #[serde(default = "default_direct_endpoint")]
    pub endpoint_url: String,
    /// Used for targeting keys and as the `ext` namespace of the owned-and-operated flag.
    #[serde(default = "default_bidder_code")]
    pub bidder_code: String,
    #[serde(default = "default_renderer_name")]
    pub renderer_name: String,
    #[serde(default = "default_renderer_version")]
    pub renderer_version: String,
}

fn default_direct_enabled() -> bool { true }
fn default_direct_endpoint() -> String { "https://direct.example.com/openrtb2/auction".to_string() }
fn default_bidder_code() -> String { "direct".to_string() }
fn default_renderer_name() -> String { "DirectRenderer".to_string() }
fn default_renderer_version() -> String { "1.0.0".to_string() }

impl Default for DirectDemandConfig {
    fn default() -> Self {
        Self {
            enabled: default_direct_enabled(),
            endpoint_url: default_direct_endpoint(),
            bidder_code: default_bidder_code(),
            renderer_name: default_renderer_name(),
            renderer_version: default_renderer_version(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            bidding: BiddingConfig::default(),
            direct_demand: DirectDemandConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> HbResult<Self> {
        Self::from_builder(config::Config::builder().add_source(
            config::Environment::with_prefix("HEADER_BIDDING")
                .separator("__")
                .try_parsing(true),
        ))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> HbResult<Self> {
        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HbError;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.bidding.default_timeout_ms, 2000);
        assert_eq!(config.bidding.default_timeout(), Duration::from_secs(2));
        assert_eq!(config.bidding.max_concurrent_bidders, 8);
        assert!(config.direct_demand.enabled);
        assert_eq!(config.direct_demand.bidder_code, "direct");
    }

    #[test]
    fn test_partial_source_fills_defaults() {
        let config: AppConfig = config::Config::builder()
            .set_override("bidding.default_timeout_ms", 350)
            .unwrap()
            .set_override("direct_demand.bidder_code", "house")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.bidding.default_timeout_ms, 350);
        assert_eq!(config.bidding.max_concurrent_bidders, 8);
        assert_eq!(config.direct_demand.bidder_code, "house");
        assert_eq!(config.node_id, "sdk-01");
    }

    #[test]
    fn test_bad_value_surfaces_as_config_error() {
        let builder = config::Config::builder()
            .set_override("bidding.default_timeout_ms", "soon")
            .unwrap();

        let err = AppConfig::from_builder(builder).unwrap_err();
        assert!(matches!(err, HbError::Config(_)));
        assert!(err.to_string().starts_with("Configuration error:"));
    }
}
