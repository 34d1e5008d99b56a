use commonware_codec::DecodeExt;
use commonware_cryptography::{ed25519::PrivateKey, Signer};
use commonware_utils::{from_hex_formatted, hex};
use paddock_execution::{EngineConfig, RetryPolicy, UnclaimedPoolPolicy};
use paddock_types::{constants::MAX_LOOKUP_TABLE_ADDRESSES, Address};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;
use tracing::Level;
use url::Url;

pub mod defaults;
pub mod store;

pub use store::SqliteStore;

#[derive(Clone, PartialEq, Eq)]
pub struct HexBytes(Vec<u8>);

impl AsRef<[u8]> for HexBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for HexBytes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex(self.as_ref()))
    }
}

impl<'de> Deserialize<'de> for HexBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        let bytes = from_hex_formatted(&value)
            .ok_or_else(|| serde::de::Error::custom("expected a hex string"))?;
        Ok(Self(bytes))
    }
}

/// Service configuration, loaded from YAML.
#[derive(Deserialize, Serialize)]
pub struct Config {
    /// Race authority; signs and pays for every settlement.
    pub authority_key: HexBytes,
    pub program_id: Address,
    pub rpc_url: String,
    pub database_path: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_json")]
    pub log_json: bool,

    #[serde(default = "default_pool_count")]
    pub pool_count: u16,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_race_duration_secs")]
    pub race_duration_secs: u64,
    #[serde(default)]
    pub unclaimed_pool_policy: UnclaimedPoolPolicy,

    #[serde(default = "default_resolve_interval_ms")]
    pub resolve_interval_ms: u64,
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_lookup_table_min_age_ms")]
    pub lookup_table_min_age_ms: u64,
    #[serde(default = "default_settlement_lease_ms")]
    pub settlement_lease_ms: u64,
    #[serde(default = "default_lookup_table_threshold")]
    pub lookup_table_threshold: usize,
    #[serde(default = "default_lookup_table_chunk_size")]
    pub lookup_table_chunk_size: usize,

    #[serde(default = "default_store_max_attempts")]
    pub store_max_attempts: u32,
    #[serde(default = "default_chain_max_attempts")]
    pub chain_max_attempts: u32,
    #[serde(default = "default_retry_initial_backoff_ms")]
    pub retry_initial_backoff_ms: u64,
    #[serde(default = "default_retry_max_backoff_ms")]
    pub retry_max_backoff_ms: u64,
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    #[serde(default = "default_confirm_poll_ms")]
    pub confirm_poll_ms: u64,
    #[serde(default = "default_compute_unit_price")]
    pub compute_unit_price_micro_lamports: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} is invalid: {value}")]
    InvalidDecode {
        field: &'static str,
        value: String,
        #[source]
        source: commonware_codec::Error,
    },
    #[error("invalid log level: {value}")]
    InvalidLogLevel { value: String },
    #[error("{field} must be > 0 (got {value})")]
    InvalidNonZero { field: &'static str, value: u64 },
    #[error("{field} must be <= {max} (got {value})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        max: u64,
    },
    #[error("{field} must be a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("{field} URL scheme must be http or https: {value}")]
    InvalidUrlScheme { field: &'static str, value: String },
}

pub struct ValidatedConfig {
    pub signer: PrivateKey,
    pub authority: Address,
    pub program_id: Address,
    pub rpc_url: String,
    pub database_path: PathBuf,
    pub log_level: Level,
    pub log_json: bool,

    pub engine: EngineConfig,
    pub resolve_interval: Duration,
    pub sweep_interval: Duration,
    pub confirm_timeout: Duration,
    pub confirm_poll: Duration,
    pub compute_unit_price_micro_lamports: u64,
}

impl ValidatedConfig {
    pub fn engine_config(&self) -> EngineConfig {
        self.engine.clone()
    }
}

struct RedactedConfig<'a>(&'a Config);

impl fmt::Debug for RedactedConfig<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cfg = self.0;
        f.debug_struct("Config")
            .field("authority_key", &"<redacted>")
            .field("program_id", &cfg.program_id)
            .field("rpc_url", &cfg.rpc_url)
            .field("database_path", &cfg.database_path)
            .field("log_level", &cfg.log_level)
            .field("log_json", &cfg.log_json)
            .field("pool_count", &cfg.pool_count)
            .field("max_entries", &cfg.max_entries)
            .field("race_duration_secs", &cfg.race_duration_secs)
            .field("unclaimed_pool_policy", &cfg.unclaimed_pool_policy)
            .field("resolve_interval_ms", &cfg.resolve_interval_ms)
            .field("sweep_interval_ms", &cfg.sweep_interval_ms)
            .field("lookup_table_min_age_ms", &cfg.lookup_table_min_age_ms)
            .field("settlement_lease_ms", &cfg.settlement_lease_ms)
            .field("lookup_table_threshold", &cfg.lookup_table_threshold)
            .field("lookup_table_chunk_size", &cfg.lookup_table_chunk_size)
            .field("store_max_attempts", &cfg.store_max_attempts)
            .field("chain_max_attempts", &cfg.chain_max_attempts)
            .field("retry_initial_backoff_ms", &cfg.retry_initial_backoff_ms)
            .field("retry_max_backoff_ms", &cfg.retry_max_backoff_ms)
            .field("confirm_timeout_ms", &cfg.confirm_timeout_ms)
            .field("confirm_poll_ms", &cfg.confirm_poll_ms)
            .field(
                "compute_unit_price_micro_lamports",
                &cfg.compute_unit_price_micro_lamports,
            )
            .finish()
    }
}

fn default_log_level() -> String {
    defaults::DEFAULT_LOG_LEVEL.to_string()
}

fn default_log_json() -> bool {
    defaults::DEFAULT_LOG_JSON
}

fn default_pool_count() -> u16 {
    defaults::DEFAULT_POOL_COUNT_CONFIG
}

fn default_max_entries() -> usize {
    defaults::DEFAULT_MAX_ENTRIES
}

fn default_race_duration_secs() -> u64 {
    defaults::DEFAULT_RACE_DURATION_SECS
}

fn default_resolve_interval_ms() -> u64 {
    defaults::DEFAULT_RESOLVE_INTERVAL_MS
}

fn default_sweep_interval_ms() -> u64 {
    defaults::DEFAULT_SWEEP_INTERVAL_MS
}

fn default_lookup_table_min_age_ms() -> u64 {
    defaults::DEFAULT_LOOKUP_TABLE_MIN_AGE_MS
}

fn default_settlement_lease_ms() -> u64 {
    defaults::DEFAULT_SETTLEMENT_LEASE_MS
}

fn default_lookup_table_threshold() -> usize {
    defaults::DEFAULT_LOOKUP_TABLE_THRESHOLD
}

fn default_lookup_table_chunk_size() -> usize {
    defaults::DEFAULT_LOOKUP_TABLE_CHUNK_SIZE
}

fn default_store_max_attempts() -> u32 {
    defaults::DEFAULT_STORE_MAX_ATTEMPTS
}

fn default_chain_max_attempts() -> u32 {
    defaults::DEFAULT_CHAIN_MAX_ATTEMPTS
}

fn default_retry_initial_backoff_ms() -> u64 {
    defaults::DEFAULT_RETRY_INITIAL_BACKOFF_MS
}

fn default_retry_max_backoff_ms() -> u64 {
    defaults::DEFAULT_RETRY_MAX_BACKOFF_MS
}

fn default_confirm_timeout_ms() -> u64 {
    defaults::DEFAULT_CONFIRM_TIMEOUT_MS
}

fn default_confirm_poll_ms() -> u64 {
    defaults::DEFAULT_CONFIRM_POLL_MS
}

fn default_compute_unit_price() -> u64 {
    defaults::DEFAULT_COMPUTE_UNIT_PRICE_MICRO_LAMPORTS
}

fn ensure_nonzero(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidNonZero { field, value });
    }
    Ok(())
}

fn ensure_at_most(field: &'static str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::OutOfRange { field, value, max });
    }
    Ok(())
}

fn validate_http_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|_| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => {}
        _ => {
            return Err(ConfigError::InvalidUrlScheme {
                field,
                value: value.to_string(),
            })
        }
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl Config {
    pub fn redacted_debug(&self) -> impl fmt::Debug + '_ {
        RedactedConfig(self)
    }

    pub fn parse_signer(&self) -> Result<PrivateKey, ConfigError> {
        PrivateKey::decode(self.authority_key.as_ref()).map_err(|source| {
            ConfigError::InvalidDecode {
                field: "authority_key",
                value: "<redacted>".to_string(),
                source,
            }
        })
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        let signer = self.parse_signer()?;

        ensure_nonzero("pool_count", u64::from(self.pool_count))?;
        ensure_nonzero("max_entries", self.max_entries as u64)?;
        // A settlement must fit in a single lookup table.
        ensure_at_most(
            "max_entries",
            self.max_entries as u64,
            MAX_LOOKUP_TABLE_ADDRESSES as u64,
        )?;
        ensure_nonzero("race_duration_secs", self.race_duration_secs)?;
        ensure_nonzero("resolve_interval_ms", self.resolve_interval_ms)?;
        ensure_nonzero("sweep_interval_ms", self.sweep_interval_ms)?;
        ensure_nonzero("settlement_lease_ms", self.settlement_lease_ms)?;
        ensure_nonzero("lookup_table_chunk_size", self.lookup_table_chunk_size as u64)?;
        ensure_at_most(
            "lookup_table_chunk_size",
            self.lookup_table_chunk_size as u64,
            MAX_LOOKUP_TABLE_ADDRESSES as u64,
        )?;
        ensure_nonzero("store_max_attempts", u64::from(self.store_max_attempts))?;
        ensure_nonzero("chain_max_attempts", u64::from(self.chain_max_attempts))?;
        ensure_at_most(
            "retry_initial_backoff_ms",
            self.retry_initial_backoff_ms,
            self.retry_max_backoff_ms,
        )?;
        ensure_nonzero("confirm_timeout_ms", self.confirm_timeout_ms)?;
        ensure_nonzero("confirm_poll_ms", self.confirm_poll_ms)?;

        validate_http_url("rpc_url", &self.rpc_url)?;

        let log_level =
            Level::from_str(&self.log_level).map_err(|_| ConfigError::InvalidLogLevel {
                value: self.log_level.clone(),
            })?;

        let backoff = RetryPolicy {
            max_attempts: self.store_max_attempts,
            initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry_max_backoff_ms),
        };
        let engine = EngineConfig {
            pool_count: self.pool_count,
            max_entries: self.max_entries,
            race_duration: Duration::from_secs(self.race_duration_secs),
            lookup_table_threshold: self.lookup_table_threshold,
            lookup_table_chunk_size: self.lookup_table_chunk_size,
            lookup_table_min_age: Duration::from_millis(self.lookup_table_min_age_ms),
            unclaimed_pool_policy: self.unclaimed_pool_policy,
            settlement_lease: Duration::from_millis(self.settlement_lease_ms),
            store_retry: backoff,
            chain_retry: RetryPolicy {
                max_attempts: self.chain_max_attempts,
                ..backoff
            },
        };

        let authority = Address::from(&signer.public_key());
        Ok(ValidatedConfig {
            signer,
            authority,
            program_id: self.program_id,
            rpc_url: self.rpc_url,
            database_path: PathBuf::from(self.database_path),
            log_level,
            log_json: self.log_json,
            engine,
            resolve_interval: Duration::from_millis(self.resolve_interval_ms),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            confirm_timeout: Duration::from_millis(self.confirm_timeout_ms),
            confirm_poll: Duration::from_millis(self.confirm_poll_ms),
            compute_unit_price_micro_lamports: self.compute_unit_price_micro_lamports,
        })
    }
}
