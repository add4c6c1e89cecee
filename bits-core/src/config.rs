use config::{Config, ConfigError, File};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize, Clone)]
pub struct BitsConfig {
    pub service: ServiceConfig,
    pub backend: BackendConfig,
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    /// Project URL of the hosted backend, e.g. `https://abc.supabase.co`
    pub url: String,
    /// Public (anon) API key. Falls back to `BITS_API_KEY` when empty.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_photo_bucket")]
    pub photo_bucket: String,
    #[serde(default = "default_transcribe_function")]
    pub transcribe_function: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_photo_bucket() -> String {
    "bit-photos".to_string()
}

fn default_transcribe_function() -> String {
    "transcribe-audio".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

impl BackendConfig {
    pub fn resolved_api_key(&self) -> String {
        if self.api_key.is_empty() {
            std::env::var("BITS_API_KEY").unwrap_or_default()
        } else {
            self.api_key.clone()
        }
    }
}

/// Direct Postgres access, used instead of the hosted REST API when selected.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Rows are scoped to this owner, standing in for the hosted row-level policies.
    pub owner_id: Option<Uuid>,
    /// Directory receiving uploaded photos.
    #[serde(default = "default_photo_dir")]
    pub photo_dir: String,
}

fn default_photo_dir() -> String {
    "photos".to_string()
}

impl BitsConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}
