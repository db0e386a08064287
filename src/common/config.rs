//! TOML-backed hub configuration (spec §1 "trivial glue", expanded per SPEC_FULL §1.1).

use config::Config as ConfigBuilder;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config load error: {0}")]
    LoadError(String),
    #[error("config parse error: {0}")]
    ParseError(String),
    #[error("validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_management_port")]
    pub management_port: u16,
    #[serde(default)]
    pub diagnostics_dir: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            management_port: default_management_port(),
            diagnostics_dir: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8443
}
fn default_management_port() -> u16 {
    9000
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieSection {
    /// Base64 or hex HMAC key material; loaded once at startup and held for process
    /// lifetime (§3 "Ownership").
    pub hmac_key: String,
    #[serde(default = "default_samlrequest_ttl")]
    pub samlrequest_ttl_seconds: i64,
    #[serde(default = "default_slo_ttl")]
    pub slo_ttl_seconds: i64,
    #[serde(default = "default_vvpmss_ttl")]
    pub vvpmss_ttl_seconds: i64,
}

fn default_samlrequest_ttl() -> i64 {
    180
}
fn default_slo_ttl() -> i64 {
    8 * 3600
}
fn default_vvpmss_ttl() -> i64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetadataSetConfig {
    pub path: String,
    #[serde(default)]
    pub feed_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetadataSection {
    pub hub: MetadataSetConfig,
    pub internal: MetadataSetConfig,
    pub external_idp: MetadataSetConfig,
    pub external_sp: MetadataSetConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CryptoSection {
    /// Hub signing/decryption private key. May be a filesystem path or an
    /// `hsm:<label>:<endpoint>` URI (§4.2).
    pub signing_key: String,
    pub signing_cert: String,
    pub encryption_key: String,
    pub encryption_cert: String,
    #[serde(default)]
    pub hsm_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtSection {
    pub signing_key: String,
    #[serde(default = "default_jwt_alg")]
    pub alg: String,
    #[serde(default = "default_jwt_ttl")]
    pub ttl_seconds: i64,
}

fn default_jwt_alg() -> String {
    "RS256".to_string()
}
fn default_jwt_ttl() -> i64 {
    300
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DiscoverySection {
    pub service_url: Option<String>,
    /// The hub's own ACS URL, advertised to IdPs in the outbound `AuthnRequest`.
    /// Defaults to `<service_url>/acs` when unset.
    #[serde(default)]
    pub acs_url: Option<String>,
    #[serde(default)]
    pub test_idps: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    #[serde(default)]
    pub server: ServerSection,
    pub cookies: CookieSection,
    #[serde(default)]
    pub metadata: MetadataSection,
    pub crypto: CryptoSection,
    pub jwt: JwtSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
}

impl HubConfig {
    /// Loads `FEDHUB_CONFIG` (default `./fedhub.toml`) and validates the required
    /// sections are present. Mirrors the teacher's `Config::load()` shape.
    pub async fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("FEDHUB_CONFIG").unwrap_or_else(|_| "fedhub.toml".to_string());

        let builder = ConfigBuilder::builder()
            .add_source(config::File::with_name(&path).required(true))
            .add_source(config::Environment::with_prefix("FEDHUB").separator("__"));

        let raw = builder
            .build()
            .map_err(|e| ConfigError::LoadError(e.to_string()))?;

        let cfg: HubConfig = raw
            .try_deserialize()
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cookies.hmac_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "cookies.hmac_key must not be empty".to_string(),
            ));
        }
        if self.cookies.samlrequest_ttl_seconds <= 0 || self.cookies.slo_ttl_seconds <= 0 {
            return Err(ConfigError::ValidationError(
                "cookie TTLs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
