use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub watchers: WatcherConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Business-calendar settings used by the availability engine.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulingConfig {
    /// Fixed offset of the shop's local time from UTC, in minutes (default: +07:00)
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    /// Slot granularity in minutes (default: 30)
    #[serde(default = "default_slot_interval")]
    pub slot_interval_minutes: u32,
    /// Same-day bookings must start at least this many minutes from now (default: 30)
    #[serde(default = "default_same_day_buffer")]
    pub same_day_buffer_minutes: u32,
    /// Opening time used when a barber has no working hours (default: 09:00)
    #[serde(default = "default_open")]
    pub default_open: String,
    /// Closing time used when a barber has no working hours (default: 19:00)
    #[serde(default = "default_close")]
    pub default_close: String,
    /// New bookings start as `pending` and need an emailed confirmation
    #[serde(default = "default_true")]
    pub require_email_confirmation: bool,
    /// Lifetime of a booking confirmation token in hours (default: 24)
    #[serde(default = "default_confirmation_ttl")]
    pub confirmation_ttl_hours: i64,
    /// Base URL used when building confirmation links
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_utc_offset_minutes(),
            slot_interval_minutes: default_slot_interval(),
            same_day_buffer_minutes: default_same_day_buffer(),
            default_open: default_open(),
            default_close: default_close(),
            require_email_confirmation: true,
            confirmation_ttl_hours: default_confirmation_ttl(),
            public_url: default_public_url(),
        }
    }
}

fn default_utc_offset_minutes() -> i32 {
    7 * 60
}

fn default_slot_interval() -> u32 {
    30
}

fn default_same_day_buffer() -> u32 {
    30
}

fn default_open() -> String {
    "09:00".to_string()
}

fn default_close() -> String {
    "19:00".to_string()
}

fn default_true() -> bool {
    true
}

fn default_confirmation_ttl() -> i64 {
    24
}

fn default_public_url() -> String {
    "http://localhost:5000".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Origins allowed to open a socket or call the API from a browser
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Interval between server pings in seconds (default: 25)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Close a socket that has been silent for this many seconds (default: 60)
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Per-subscriber buffer of pending events (default: 256)
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Serve the Server-Sent Events fallback transport
    #[serde(default = "default_true")]
    pub sse_enabled: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            idle_timeout_secs: default_idle_timeout(),
            channel_capacity: default_channel_capacity(),
            sse_enabled: true,
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

fn default_heartbeat_interval() -> u64 {
    25
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_channel_capacity() -> usize {
    256
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    /// Start the change-feed watchers at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fixed delay before a failed watcher reopens its feed (default: 5)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
    /// How often the change log is polled in milliseconds (default: 500)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_delay_secs: default_retry_delay(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_retry_delay() -> u64 {
    5
}

fn default_poll_interval() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Seconds between housekeeping runs (default: 300)
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,
    /// Change-log rows older than this are deleted (default: 3600)
    #[serde(default = "default_change_log_retention")]
    pub change_log_retention_secs: i64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval(),
            change_log_retention_secs: default_change_log_retention(),
        }
    }
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_change_log_retention() -> i64 {
    3600
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}
