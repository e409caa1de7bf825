//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::optimizer::OptimizerLimits;
use crate::cache::CacheConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "sitemend";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_JOB_POLL_INTERVAL_MS: u64 = 1_000;
const DEFAULT_JOB_MAX_CONCURRENT: u32 = 5;
const DEFAULT_JOB_PACING_MS: u64 = 500;
const DEFAULT_JOB_UNIT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 15;
const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 10;
const DEFAULT_VISION_TIMEOUT_SECS: u64 = 25;

/// Command-line arguments for the Sitemend binary.
#[derive(Debug, Parser)]
#[command(name = "sitemend", version, about = "Sitemend SEO repair server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SITEMEND_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Sitemend HTTP service and job runner.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long = "log-json", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the job poll interval.
    #[arg(long = "jobs-poll-interval-ms", value_name = "MILLIS")]
    pub jobs_poll_interval_ms: Option<u64>,

    /// Override the per-group suggestion concurrency.
    #[arg(long = "jobs-max-concurrent", value_name = "COUNT")]
    pub jobs_max_concurrent: Option<u32>,

    /// Override the vision endpoint URL.
    #[arg(long = "vision-endpoint", value_name = "URL")]
    pub vision_endpoint: Option<String>,

    /// Override the vision API key.
    #[arg(long = "vision-api-key", env = "SITEMEND_VISION_API_KEY", value_name = "KEY")]
    pub vision_api_key: Option<String>,

    /// Disable the in-memory read cache.
    #[arg(long = "cache-disabled", action = clap::ArgAction::SetTrue)]
    pub cache_disabled: bool,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub jobs: JobsSettings,
    pub vision: VisionSettings,
    pub outbound: OutboundSettings,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub poll_interval: Duration,
    pub max_concurrent: NonZeroU32,
    pub pacing: Duration,
    pub unit_timeout: Duration,
}

impl JobsSettings {
    pub fn optimizer_limits(&self) -> OptimizerLimits {
        OptimizerLimits {
            max_concurrent: self.max_concurrent.get() as usize,
            pacing: self.pacing,
            unit_timeout: self.unit_timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisionSettings {
    pub endpoint: String,
    pub api_key: String,
    pub timeout: Duration,
}

/// Timeouts for the page fetcher and webhook deliverer.
#[derive(Debug, Clone)]
pub struct OutboundSettings {
    pub fetch_timeout: Duration,
    pub webhook_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SITEMEND").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    jobs: RawJobsSettings,
    vision: RawVisionSettings,
    outbound: RawOutboundSettings,
    cache: RawCacheSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    poll_interval_ms: Option<u64>,
    max_concurrent: Option<u32>,
    pacing_ms: Option<u64>,
    unit_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawVisionSettings {
    endpoint: Option<String>,
    api_key: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawOutboundSettings {
    fetch_timeout_seconds: Option<u64>,
    webhook_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    asset_limit: Option<usize>,
    list_limit: Option<usize>,
    summary_limit: Option<usize>,
    balance_limit: Option<usize>,
    progress_limit: Option<usize>,
    event_batch_size: Option<usize>,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(interval) = overrides.jobs_poll_interval_ms {
            self.jobs.poll_interval_ms = Some(interval);
        }
        if let Some(max) = overrides.jobs_max_concurrent {
            self.jobs.max_concurrent = Some(max);
        }
        if let Some(endpoint) = overrides.vision_endpoint.as_ref() {
            self.vision.endpoint = Some(endpoint.clone());
        }
        if let Some(key) = overrides.vision_api_key.as_ref() {
            self.vision.api_key = Some(key.clone());
        }
        if overrides.cache_disabled {
            self.cache.enabled = Some(false);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            jobs,
            vision,
            outbound,
            cache,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            jobs: build_jobs_settings(jobs)?,
            vision: build_vision_settings(vision)?,
            outbound: build_outbound_settings(outbound)?,
            cache: build_cache_settings(cache),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_value.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let poll_ms = jobs.poll_interval_ms.unwrap_or(DEFAULT_JOB_POLL_INTERVAL_MS);
    if poll_ms == 0 {
        return Err(LoadError::invalid(
            "jobs.poll_interval_ms",
            "must be greater than zero",
        ));
    }

    let max_concurrent = non_zero_u32(
        jobs.max_concurrent
            .unwrap_or(DEFAULT_JOB_MAX_CONCURRENT)
            .into(),
        "jobs.max_concurrent",
    )?;

    let unit_timeout_secs = jobs
        .unit_timeout_seconds
        .unwrap_or(DEFAULT_JOB_UNIT_TIMEOUT_SECS);
    if unit_timeout_secs == 0 {
        return Err(LoadError::invalid(
            "jobs.unit_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(JobsSettings {
        poll_interval: Duration::from_millis(poll_ms),
        max_concurrent,
        pacing: Duration::from_millis(jobs.pacing_ms.unwrap_or(DEFAULT_JOB_PACING_MS)),
        unit_timeout: Duration::from_secs(unit_timeout_secs),
    })
}

fn build_vision_settings(vision: RawVisionSettings) -> Result<VisionSettings, LoadError> {
    let endpoint = vision
        .endpoint
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid("vision.endpoint", "must be set"))?;
    let api_key = vision
        .api_key
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid("vision.api_key", "must be set"))?;

    let timeout_secs = vision.timeout_seconds.unwrap_or(DEFAULT_VISION_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "vision.timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(VisionSettings {
        endpoint,
        api_key,
        timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_outbound_settings(outbound: RawOutboundSettings) -> Result<OutboundSettings, LoadError> {
    let fetch_secs = outbound
        .fetch_timeout_seconds
        .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
    let webhook_secs = outbound
        .webhook_timeout_seconds
        .unwrap_or(DEFAULT_WEBHOOK_TIMEOUT_SECS);
    if fetch_secs == 0 {
        return Err(LoadError::invalid(
            "outbound.fetch_timeout_seconds",
            "must be greater than zero",
        ));
    }
    if webhook_secs == 0 {
        return Err(LoadError::invalid(
            "outbound.webhook_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(OutboundSettings {
        fetch_timeout: Duration::from_secs(fetch_secs),
        webhook_timeout: Duration::from_secs(webhook_secs),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> CacheConfig {
    let defaults = CacheConfig::default();
    CacheConfig {
        enabled: cache.enabled.unwrap_or(defaults.enabled),
        asset_limit: cache.asset_limit.unwrap_or(defaults.asset_limit),
        list_limit: cache.list_limit.unwrap_or(defaults.list_limit),
        summary_limit: cache.summary_limit.unwrap_or(defaults.summary_limit),
        balance_limit: cache.balance_limit.unwrap_or(defaults.balance_limit),
        progress_limit: cache.progress_limit.unwrap_or(defaults.progress_limit),
        event_batch_size: cache.event_batch_size.unwrap_or(defaults.event_batch_size),
    }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    format!("{host}:{port}")
        .parse()
        .map_err(|err| format!("failed to parse `{host}:{port}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value = u32::try_from(value)
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range"))?;
    NonZeroU32::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
