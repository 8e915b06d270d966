use chrono::Duration;
use serde::Deserialize;
use std::env;

use ticketline_catalog::{PriceTable, Timetable};
use ticketline_core::identity::IdDocumentPolicy;
use ticketline_order::LifecycleRules;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub payment: PaymentConfig,
    pub business_rules: BusinessRules,
    pub storage: StorageConfig,
    pub inventory: InventoryConfig,
    #[serde(default)]
    pub pricing: PriceTable,
    #[serde(default)]
    pub timetable: Timetable,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    /// Shared HMAC key for provider callbacks
    pub callback_secret: String,
    pub gateway_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub payment_window_minutes: i64,
    pub max_passengers: usize,
    #[serde(default)]
    pub strict_id_checksum: bool,
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_sweep_batch")]
    pub sweep_batch_size: usize,
}

fn default_sweep_batch() -> usize { 100 }

impl BusinessRules {
    pub fn lifecycle_rules(&self) -> LifecycleRules {
        LifecycleRules {
            payment_window: Duration::minutes(self.payment_window_minutes),
            max_passengers: self.max_passengers,
            id_policy: IdDocumentPolicy::new(self.strict_id_checksum),
            sweep_batch_size: self.sweep_batch_size,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InventoryBackend {
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    pub backend: InventoryBackend,
    pub redis_url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `TICKETLINE__STORAGE__BACKEND=postgres`
            .add_source(config::Environment::with_prefix("TICKETLINE").separator("__"));

        builder.build()?.try_deserialize()
    }

    /// Parse a single TOML document with no file or environment layering
    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
