use crate::error::{AppError, Result};
use std::{env, fmt, str::FromStr};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub catalog: CatalogConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_size: usize,
}

/// Where products and images live.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Postgres document collection plus an S3 bucket.
    Remote {
        database: DatabaseConfig,
        s3: S3Config,
    },
    /// Process memory; nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    pub collection: String,
    pub image_url_ttl_secs: u64,
    pub upload_attempts: u32,
    pub cleanup_interval_secs: u64,
    pub cleanup_max_attempts: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            collection: "ProductosMEX".to_string(),
            image_url_ttl_secs: 3600,
            upload_attempts: 2,
            cleanup_interval_secs: 60,
            cleanup_max_attempts: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = CatalogConfig::default();

        let backend = match lookup("CATALOG_BACKEND")
            .unwrap_or_else(|| "remote".to_string())
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "remote" => BackendConfig::Remote {
                database: DatabaseConfig {
                    url: required(&lookup, "DB_URL")?,
                    max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 20)?,
                },
                s3: S3Config {
                    bucket: required(&lookup, "S3_BUCKET")?,
                    region: lookup("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                    endpoint: lookup("S3_ENDPOINT").filter(|v| !v.trim().is_empty()),
                    access_key_id: required(&lookup, "AWS_ACCESS_KEY_ID")?,
                    secret_access_key: required(&lookup, "AWS_SECRET_ACCESS_KEY")?,
                },
            },
            "memory" => BackendConfig::Memory,
            other => {
                return Err(AppError::ConfigError(format!(
                    "Invalid CATALOG_BACKEND value: {}",
                    other
                )));
            }
        };

        Ok(Self {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "PORT", 3000)?,
                max_body_size: parse_or(&lookup, "MAX_BODY_SIZE", 10_485_760)?,
            },
            backend,
            catalog: CatalogConfig {
                collection: lookup("CATALOG_COLLECTION").unwrap_or(defaults.collection),
                image_url_ttl_secs: parse_or(
                    &lookup,
                    "IMAGE_URL_TTL_SECS",
                    defaults.image_url_ttl_secs,
                )?,
                upload_attempts: parse_or(&lookup, "UPLOAD_ATTEMPTS", defaults.upload_attempts)?
                    .max(1),
                cleanup_interval_secs: parse_or(
                    &lookup,
                    "CLEANUP_INTERVAL_SECS",
                    defaults.cleanup_interval_secs,
                )?
                .max(1),
                cleanup_max_attempts: parse_or(
                    &lookup,
                    "CLEANUP_MAX_ATTEMPTS",
                    defaults.cleanup_max_attempts,
                )?,
            },
            cors: CorsConfig {
                allowed_origins: required(&lookup, "FRONTEND_URL")?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::ConfigError(format!("{} not set", key)))
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| AppError::ConfigError(format!("Invalid {} value", key))),
        None => Ok(default),
    }
}
