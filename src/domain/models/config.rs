use serde::{Deserialize, Serialize};

/// Main configuration structure for tally
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Application name, reported by the health endpoint and used as the Kafka client id
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Aggregate store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Accumulator retry policy
    #[serde(default)]
    pub accumulator: AccumulatorConfig,

    /// Consumer group configuration
    #[serde(default)]
    pub consumer: ConsumerConfig,

    /// Read API listener
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_app_name() -> String {
    "tally".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            store: StoreConfig::default(),
            accumulator: AccumulatorConfig::default(),
            consumer: ConsumerConfig::default(),
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Aggregate store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StoreConfig {
    /// Directory holding the embedded store files
    #[serde(default = "default_store_dir")]
    pub dir: String,

    /// Maximum number of pooled store connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits for the write lock before reporting a conflict
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,

    /// Upper bound on opening the store at startup
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,
}

fn default_store_dir() -> String {
    ".tally/store".to_string()
}

const fn default_max_connections() -> u32 {
    8
}

const fn default_busy_timeout_secs() -> u64 {
    30
}

const fn default_open_timeout_secs() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
            open_timeout_secs: default_open_timeout_secs(),
        }
    }
}

/// Accumulator retry policy for write conflicts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AccumulatorConfig {
    /// Attempts per accumulate call when the store reports a conflict
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,

    /// Initial delay between conflict retries
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

const fn default_max_conflict_retries() -> u32 {
    3
}

const fn default_retry_backoff_ms() -> u64 {
    50
}

impl Default for AccumulatorConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: default_max_conflict_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Where a new consumer group starts reading when it has no committed offset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    Earliest,
    Latest,
}

impl OffsetReset {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Earliest => "earliest",
            Self::Latest => "latest",
        }
    }
}

/// Consumer group configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConsumerConfig {
    /// Comma-separated bootstrap brokers
    #[serde(default = "default_brokers")]
    pub brokers: String,

    /// Topic carrying observations
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Consumer group name
    #[serde(default = "default_group")]
    pub group: String,

    #[serde(default = "default_offset_reset")]
    pub offset_reset: OffsetReset,

    /// Upper bound on waiting for the first partition assignment
    #[serde(default = "default_join_timeout_secs")]
    pub join_timeout_secs: u64,
}

fn default_brokers() -> String {
    "broker_1:9092".to_string()
}

fn default_topic() -> String {
    "user_details_1".to_string()
}

fn default_group() -> String {
    "user_group_1".to_string()
}

const fn default_offset_reset() -> OffsetReset {
    OffsetReset::Earliest
}

const fn default_join_timeout_secs() -> u64 {
    120
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            brokers: default_brokers(),
            topic: default_topic(),
            group: default_group(),
            offset_reset: default_offset_reset(),
            join_timeout_secs: default_join_timeout_secs(),
        }
    }
}

/// Read API listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpConfig {
    #[serde(default = "default_http_host")]
    pub host: String,

    #[serde(default = "default_http_port")]
    pub port: u16,
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_http_port() -> u16 {
    8080
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Directory for rolling JSON log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation of the rolling log files
    #[serde(default)]
    pub rotation: RotationPolicy,
}

/// Stdout log format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}
