//! Configuration module
//!
//! Settings are read from the environment (after loading `.env`) with a named
//! default for every optional value.

use std::env;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::DEFAULT_SIGNED_URL_TTL_SECS;
use crate::storage_types::StorageBackend;

const SERVER_PORT: u16 = 3000;
const DB_MAX_CONNECTIONS: u32 = 10;
const MAX_UPLOAD_SIZE_MB: usize = 10;
const WORKER_CONCURRENCY: usize = 4;
const WORKER_POLL_INTERVAL_MS: u64 = 1000;
const JOB_MAX_ATTEMPTS: u32 = 3;
const JOB_VISIBILITY_TIMEOUT_SECS: u64 = 300;
const JOB_REAP_INTERVAL_SECS: u64 = 60;
const LOCAL_STORAGE_PATH: &str = "./uploads";
const LOCAL_STORAGE_BASE_URL: &str = "/uploads";

/// Which halves of the system a process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessRole {
    /// HTTP API and an embedded worker pool
    #[default]
    All,
    /// HTTP API only; jobs are left for worker processes
    Api,
    /// Worker pool only
    Worker,
}

impl ProcessRole {
    pub fn serves_http(self) -> bool {
        matches!(self, ProcessRole::All | ProcessRole::Api)
    }

    pub fn runs_workers(self) -> bool {
        matches!(self, ProcessRole::All | ProcessRole::Worker)
    }
}

impl FromStr for ProcessRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(ProcessRole::All),
            "api" => Ok(ProcessRole::Api),
            "worker" => Ok(ProcessRole::Worker),
            _ => Err(anyhow::anyhow!("Invalid process role: {}", s)),
        }
    }
}

impl Display for ProcessRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ProcessRole::All => write!(f, "all"),
            ProcessRole::Api => write!(f, "api"),
            ProcessRole::Worker => write!(f, "worker"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct PictorConfig {
    pub server_port: u16,
    pub environment: String,
    pub role: ProcessRole,
    pub log_json: bool,
    // Persistence; without a database URL the repository and queue live in memory
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    // Storage
    pub storage_backend: StorageBackend,
    pub local_storage_path: String,
    pub local_storage_base_url: String,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub signed_url_ttl_secs: u64,
    // Processing
    pub max_upload_size_bytes: usize,
    pub watermark_font_path: Option<String>,
    // Jobs
    pub worker_concurrency: usize,
    pub worker_poll_interval_ms: u64,
    pub job_max_attempts: u32,
    pub job_visibility_timeout_secs: u64,
    pub job_reap_interval_secs: u64,
}

impl PictorConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let role = match env::var("PICTOR_ROLE") {
            Ok(value) => value.parse()?,
            Err(_) => ProcessRole::default(),
        };

        let storage_backend = match env::var("STORAGE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => StorageBackend::Local,
        };

        let max_upload_size_mb = parse_or("MAX_UPLOAD_SIZE_MB", MAX_UPLOAD_SIZE_MB);

        let config = PictorConfig {
            server_port: parse_or("PORT", SERVER_PORT),
            environment,
            role,
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            database_url: non_empty("DATABASE_URL"),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS),
            storage_backend,
            local_storage_path: env::var("LOCAL_STORAGE_PATH")
                .unwrap_or_else(|_| LOCAL_STORAGE_PATH.to_string()),
            local_storage_base_url: env::var("LOCAL_STORAGE_BASE_URL")
                .unwrap_or_else(|_| LOCAL_STORAGE_BASE_URL.to_string()),
            s3_bucket: non_empty("S3_BUCKET"),
            s3_region: non_empty("S3_REGION").or_else(|| non_empty("AWS_REGION")),
            s3_endpoint: non_empty("S3_ENDPOINT"),
            signed_url_ttl_secs: parse_or("SIGNED_URL_TTL_SECS", DEFAULT_SIGNED_URL_TTL_SECS),
            max_upload_size_bytes: max_upload_size_mb * 1024 * 1024,
            watermark_font_path: non_empty("WATERMARK_FONT_PATH"),
            worker_concurrency: parse_or("WORKER_CONCURRENCY", WORKER_CONCURRENCY),
            worker_poll_interval_ms: parse_or("WORKER_POLL_INTERVAL_MS", WORKER_POLL_INTERVAL_MS),
            job_max_attempts: parse_or("JOB_MAX_ATTEMPTS", JOB_MAX_ATTEMPTS),
            job_visibility_timeout_secs: parse_or(
                "JOB_VISIBILITY_TIMEOUT_SECS",
                JOB_VISIBILITY_TIMEOUT_SECS,
            ),
            job_reap_interval_secs: parse_or("JOB_REAP_INTERVAL_SECS", JOB_REAP_INTERVAL_SECS),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if let Some(url) = &self.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.trim().is_empty() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must not be empty when using local storage backend"
                    ));
                }
            }
        }

        if self.worker_concurrency == 0 {
            return Err(anyhow::anyhow!("WORKER_CONCURRENCY must be at least 1"));
        }
        if self.job_max_attempts == 0 {
            return Err(anyhow::anyhow!("JOB_MAX_ATTEMPTS must be at least 1"));
        }
        if self.signed_url_ttl_secs == 0 {
            return Err(anyhow::anyhow!("SIGNED_URL_TTL_SECS must be positive"));
        }

        Ok(())
    }
}

impl Default for PictorConfig {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            environment: "development".to_string(),
            role: ProcessRole::default(),
            log_json: false,
            database_url: None,
            db_max_connections: DB_MAX_CONNECTIONS,
            storage_backend: StorageBackend::Local,
            local_storage_path: LOCAL_STORAGE_PATH.to_string(),
            local_storage_base_url: LOCAL_STORAGE_BASE_URL.to_string(),
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
            signed_url_ttl_secs: DEFAULT_SIGNED_URL_TTL_SECS,
            max_upload_size_bytes: MAX_UPLOAD_SIZE_MB * 1024 * 1024,
            watermark_font_path: None,
            worker_concurrency: WORKER_CONCURRENCY,
            worker_poll_interval_ms: WORKER_POLL_INTERVAL_MS,
            job_max_attempts: JOB_MAX_ATTEMPTS,
            job_visibility_timeout_secs: JOB_VISIBILITY_TIMEOUT_SECS,
            job_reap_interval_secs: JOB_REAP_INTERVAL_SECS,
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr + ToString>(key: &str, default: T) -> T {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse::<T>()
        .unwrap_or(default)
}

/// Application configuration.
#[derive(Clone, Debug, Default)]
pub struct Config(pub Box<PictorConfig>);

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        Ok(Config(Box::new(PictorConfig::from_env()?)))
    }

    pub fn inner(&self) -> &PictorConfig {
        &self.0
    }

    pub fn is_production(&self) -> bool {
        let env = self.0.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn server_port(&self) -> u16 {
        self.0.server_port
    }

    pub fn role(&self) -> ProcessRole {
        self.0.role
    }

    pub fn log_json(&self) -> bool {
        self.0.log_json
    }

    pub fn database_url(&self) -> Option<&str> {
        self.0.database_url.as_deref()
    }

    pub fn db_max_connections(&self) -> u32 {
        self.0.db_max_connections
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.0.storage_backend
    }

    pub fn local_storage_path(&self) -> &str {
        &self.0.local_storage_path
    }

    pub fn local_storage_base_url(&self) -> &str {
        &self.0.local_storage_base_url
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.0.s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.0.s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.0.s3_endpoint.as_deref()
    }

    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.0.signed_url_ttl_secs)
    }

    pub fn max_upload_size_bytes(&self) -> usize {
        self.0.max_upload_size_bytes
    }

    pub fn watermark_font_path(&self) -> Option<&str> {
        self.0.watermark_font_path.as_deref()
    }

    pub fn worker_concurrency(&self) -> usize {
        self.0.worker_concurrency
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.0.worker_poll_interval_ms)
    }

    pub fn job_max_attempts(&self) -> u32 {
        self.0.job_max_attempts
    }

    pub fn job_visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.0.job_visibility_timeout_secs)
    }

    pub fn job_reap_interval(&self) -> Duration {
        Duration::from_secs(self.0.job_reap_interval_secs)
    }
}
