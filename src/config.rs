use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub ssh: SshSettings,
    #[serde(default)]
    pub provision: ProvisionSettings,
    #[serde(default)]
    pub catalog: CatalogSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,

    #[serde(default)]
    pub cookie_domain: String,

    #[serde(default = "default_cookie_secure")]
    pub cookie_secure: bool,

    /// DNS provider API base URL, e.g. `https://api.cloudflare.com/client/v4`.
    pub dns_provider_base_url: String,
}

fn default_cookie_secure() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SshSettings {
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_secs: u64,
    #[serde(default = "default_command_deadline")]
    pub command_deadline_secs: u64,
}

fn default_dial_timeout() -> u64 {
    30
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_reaper_interval() -> u64 {
    60
}
fn default_command_deadline() -> u64 {
    30
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            dial_timeout_secs: default_dial_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            reaper_interval_secs: default_reaper_interval(),
            command_deadline_secs: default_command_deadline(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvisionSettings {
    #[serde(default = "default_poll_interval_normal")]
    pub poll_interval_normal_secs: u64,
    #[serde(default = "default_poll_interval_transitional")]
    pub poll_interval_transitional_secs: u64,
    #[serde(default = "default_provider_deadline")]
    pub provider_deadline_secs: u64,
}

fn default_poll_interval_normal() -> u64 {
    10
}
fn default_poll_interval_transitional() -> u64 {
    5
}
fn default_provider_deadline() -> u64 {
    30
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        Self {
            poll_interval_normal_secs: default_poll_interval_normal(),
            poll_interval_transitional_secs: default_poll_interval_transitional(),
            provider_deadline_secs: default_provider_deadline(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogSettings {
    #[serde(default = "default_catalog_dir")]
    pub descriptor_dir: String,
    #[serde(default = "default_version_cache_ttl")]
    pub version_cache_ttl_secs: u64,
}

fn default_catalog_dir() -> String {
    "catalog".to_string()
}
fn default_version_cache_ttl() -> u64 {
    600
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            descriptor_dir: default_catalog_dir(),
            version_cache_ttl_secs: default_version_cache_ttl(),
        }
    }
}

impl Settings {
    /// Loads `config/default.toml`, overlays `config/<XANTHUS_RUN_MODE>.toml` and
    /// `config/local.toml` if present, then layers `XANTHUS__SECTION__FIELD`
    /// environment variables on top (double underscore nesting).
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("XANTHUS_RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir = env::var("XANTHUS_CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let settings = Config::builder()
            .add_source(File::with_name(&format!("{config_dir}/default")).required(true))
            .add_source(File::with_name(&format!("{config_dir}/{run_mode}")).required(false))
            .add_source(File::with_name(&format!("{config_dir}/local")).required(false))
            .add_source(
                Environment::with_prefix("XANTHUS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
