//! Configuration module
//!
//! The relay is configured once at start-up from the environment (a `.env`
//! file is loaded first when present). Components never read the environment
//! themselves; they receive the values they need at construction time.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::validation::SourcePolicy;

// Common constants
const SERVER_PORT: u16 = 3000;
const REQUEST_TIMEOUT_SECS: u64 = 300;
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;
const HTTP_CONCURRENCY_LIMIT: usize = 1_024;

const DESTINATION_URL: &str = "https://catbox.moe/user/api.php";

const FETCH_TIMEOUT_SECS: u64 = 20;
const UPLOAD_TIMEOUT_SECS: u64 = 120;
const MAX_SOURCE_BYTES: u64 = 200 * 1024 * 1024;

const RETRY_MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;
const RETRY_MAX_DELAY_MS: u64 = 8_000;

const CHUNK_THRESHOLD_BYTES: u64 = 20 * 1024 * 1024;
const CHUNK_SIZE_BYTES: u64 = 5 * 1024 * 1024;
const MAX_PARALLEL_CHUNKS: usize = 4;
const BATCH_CONCURRENCY: usize = 4;
const MAX_BATCH_SIZE: usize = 50;

const TEMP_MAX_AGE_SECS: u64 = 30 * 60;
const SWEEP_INTERVAL_SECS: u64 = 30 * 60;

/// Browser user agents rotated across source requests.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
];

/// Server-level settings
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub environment: String,
    pub request_timeout_secs: u64,
    pub max_request_body_bytes: usize,
    /// In-flight HTTP requests across all routes
    pub http_concurrency_limit: usize,
    /// Emit logs as JSON lines instead of the compact console format
    pub log_json: bool,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            server_port: SERVER_PORT,
            cors_origins: vec!["*".to_string()],
            environment: "development".to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            max_request_body_bytes: MAX_REQUEST_BODY_BYTES,
            http_concurrency_limit: HTTP_CONCURRENCY_LIMIT,
            log_json: false,
        }
    }
}

/// Relay pipeline configuration
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub base: BaseConfig,
    // Destination file host
    pub destination_url: String,
    /// Account token sent as the `userhash` form field
    pub destination_userhash: Option<String>,
    /// Let the destination fetch plain links itself (`reqtype=urlupload`)
    pub destination_remote_upload: bool,
    // Source fetching
    pub fetch_timeout_secs: u64,
    pub max_source_bytes: u64,
    pub user_agents: Vec<String>,
    pub allow_private_hosts: bool,
    /// If set, only sources on these domains (or their subdomains) are fetched
    pub source_host_allowlist: Option<Vec<String>>,
    // Retry
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    // Upload
    pub upload_timeout_secs: u64,
    pub chunk_threshold_bytes: u64,
    pub chunk_size_bytes: u64,
    pub max_parallel_chunks: usize,
    // Batch
    pub batch_concurrency: usize,
    pub max_batch_size: usize,
    // Transient storage
    pub temp_dir: PathBuf,
    pub temp_max_age_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base: BaseConfig::default(),
            destination_url: DESTINATION_URL.to_string(),
            destination_userhash: None,
            destination_remote_upload: false,
            fetch_timeout_secs: FETCH_TIMEOUT_SECS,
            max_source_bytes: MAX_SOURCE_BYTES,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            allow_private_hosts: false,
            source_host_allowlist: None,
            retry_max_attempts: RETRY_MAX_ATTEMPTS,
            retry_base_delay_ms: RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: RETRY_MAX_DELAY_MS,
            upload_timeout_secs: UPLOAD_TIMEOUT_SECS,
            chunk_threshold_bytes: CHUNK_THRESHOLD_BYTES,
            chunk_size_bytes: CHUNK_SIZE_BYTES,
            max_parallel_chunks: MAX_PARALLEL_CHUNKS,
            batch_concurrency: BATCH_CONCURRENCY,
            max_batch_size: MAX_BATCH_SIZE,
            temp_dir: env::temp_dir().join("mediarelay"),
            temp_max_age_secs: TEMP_MAX_AGE_SECS,
            sweep_interval_secs: SWEEP_INTERVAL_SECS,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn parse_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let defaults = RelayConfig::default();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());

        let base = BaseConfig {
            server_port: env::var("PORT")
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins: parse_list(&cors_origins_str, ','),
            environment,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", REQUEST_TIMEOUT_SECS),
            max_request_body_bytes: parse_env("MAX_REQUEST_BODY_BYTES", MAX_REQUEST_BODY_BYTES),
            http_concurrency_limit: parse_env("HTTP_CONCURRENCY_LIMIT", HTTP_CONCURRENCY_LIMIT),
            log_json: env::var("LOG_FORMAT")
                .map(|f| f.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        let user_agents = env::var("USER_AGENTS")
            .map(|raw| parse_list(&raw, '|'))
            .ok()
            .filter(|agents| !agents.is_empty())
            .unwrap_or(defaults.user_agents);

        let source_host_allowlist = env::var("SOURCE_HOST_ALLOWLIST")
            .ok()
            .map(|raw| {
                parse_list(&raw, ',')
                    .into_iter()
                    .map(|d| d.to_lowercase())
                    .collect::<Vec<_>>()
            })
            .filter(|domains| !domains.is_empty());

        let config = RelayConfig {
            base,
            destination_url: env::var("DESTINATION_URL")
                .unwrap_or_else(|_| DESTINATION_URL.to_string()),
            destination_userhash: env::var("DESTINATION_USERHASH")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            destination_remote_upload: parse_bool_env("DESTINATION_REMOTE_UPLOAD", false),
            fetch_timeout_secs: parse_env("FETCH_TIMEOUT_SECS", FETCH_TIMEOUT_SECS),
            max_source_bytes: parse_env("MAX_SOURCE_BYTES", MAX_SOURCE_BYTES),
            user_agents,
            allow_private_hosts: parse_bool_env("ALLOW_PRIVATE_HOSTS", false),
            source_host_allowlist,
            retry_max_attempts: parse_env("RETRY_MAX_ATTEMPTS", RETRY_MAX_ATTEMPTS),
            retry_base_delay_ms: parse_env("RETRY_BASE_DELAY_MS", RETRY_BASE_DELAY_MS),
            retry_max_delay_ms: parse_env("RETRY_MAX_DELAY_MS", RETRY_MAX_DELAY_MS),
            upload_timeout_secs: parse_env("UPLOAD_TIMEOUT_SECS", UPLOAD_TIMEOUT_SECS),
            chunk_threshold_bytes: parse_env("CHUNK_THRESHOLD_BYTES", CHUNK_THRESHOLD_BYTES),
            chunk_size_bytes: parse_env("CHUNK_SIZE_BYTES", CHUNK_SIZE_BYTES),
            max_parallel_chunks: parse_env("MAX_PARALLEL_CHUNKS", MAX_PARALLEL_CHUNKS),
            batch_concurrency: parse_env("BATCH_CONCURRENCY", BATCH_CONCURRENCY),
            max_batch_size: parse_env("MAX_BATCH_SIZE", MAX_BATCH_SIZE),
            temp_dir: env::var("TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            temp_max_age_secs: parse_env("TEMP_MAX_AGE_SECS", TEMP_MAX_AGE_SECS),
            sweep_interval_secs: parse_env("SWEEP_INTERVAL_SECS", SWEEP_INTERVAL_SECS),
        };

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        let env = self.base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.is_production() && self.base.cors_origins.iter().any(|o| o == "*") {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        let destination = url::Url::parse(&self.destination_url)
            .map_err(|e| anyhow::anyhow!("DESTINATION_URL is not a valid URL: {}", e))?;
        if !matches!(destination.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!("DESTINATION_URL must use http or https"));
        }

        if self.base.http_concurrency_limit == 0 {
            return Err(anyhow::anyhow!("HTTP_CONCURRENCY_LIMIT must be at least 1"));
        }

        if self.retry_max_attempts == 0 {
            return Err(anyhow::anyhow!("RETRY_MAX_ATTEMPTS must be at least 1"));
        }

        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(anyhow::anyhow!(
                "RETRY_BASE_DELAY_MS must not exceed RETRY_MAX_DELAY_MS"
            ));
        }

        if self.chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("CHUNK_SIZE_BYTES must be greater than 0"));
        }

        if self.chunk_size_bytes > self.chunk_threshold_bytes {
            return Err(anyhow::anyhow!(
                "CHUNK_SIZE_BYTES must not exceed CHUNK_THRESHOLD_BYTES"
            ));
        }

        if self.max_parallel_chunks == 0 || self.batch_concurrency == 0 {
            return Err(anyhow::anyhow!(
                "MAX_PARALLEL_CHUNKS and BATCH_CONCURRENCY must be at least 1"
            ));
        }

        if self.max_batch_size == 0 {
            return Err(anyhow::anyhow!("MAX_BATCH_SIZE must be at least 1"));
        }

        if self.user_agents.is_empty() {
            return Err(anyhow::anyhow!("USER_AGENTS must contain at least one entry"));
        }

        if self.sweep_interval_secs == 0 {
            return Err(anyhow::anyhow!("SWEEP_INTERVAL_SECS must be greater than 0"));
        }

        Ok(())
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<RelayConfig>);

impl Config {
    pub fn new(config: RelayConfig) -> Self {
        Config(Box::new(config))
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = RelayConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.0.validate()
    }

    pub fn relay(&self) -> &RelayConfig {
        &self.0
    }

    pub fn is_production(&self) -> bool {
        self.0.is_production()
    }

    // Convenience getters for common fields
    pub fn server_port(&self) -> u16 {
        self.0.base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.0.base.cors_origins
    }

    pub fn environment(&self) -> &str {
        &self.0.base.environment
    }

    pub fn request_timeout_secs(&self) -> u64 {
        self.0.base.request_timeout_secs
    }

    pub fn max_request_body_bytes(&self) -> usize {
        self.0.base.max_request_body_bytes
    }

    pub fn http_concurrency_limit(&self) -> usize {
        self.0.base.http_concurrency_limit
    }

    pub fn log_json(&self) -> bool {
        self.0.base.log_json
    }

    pub fn temp_dir(&self) -> &PathBuf {
        &self.0.temp_dir
    }

    pub fn temp_max_age_secs(&self) -> u64 {
        self.0.temp_max_age_secs
    }

    pub fn sweep_interval_secs(&self) -> u64 {
        self.0.sweep_interval_secs
    }

    pub fn max_batch_size(&self) -> usize {
        self.0.max_batch_size
    }

    pub fn source_policy(&self) -> SourcePolicy {
        SourcePolicy {
            allow_private_hosts: self.0.allow_private_hosts,
            allowlist: self.0.source_host_allowlist.clone(),
        }
    }
}
