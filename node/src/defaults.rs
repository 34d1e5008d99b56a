//! Defaults for optional config fields.

use paddock_types::constants::{
    COMPUTE_UNIT_PRICE_MICRO_LAMPORTS, DEFAULT_POOL_COUNT, LOOKUP_TABLE_CHUNK_SIZE,
    LOOKUP_TABLE_THRESHOLD, MAX_RACE_ENTRIES,
};

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_LOG_JSON: bool = false;

pub const DEFAULT_POOL_COUNT_CONFIG: u16 = DEFAULT_POOL_COUNT;
pub const DEFAULT_MAX_ENTRIES: usize = MAX_RACE_ENTRIES;
pub const DEFAULT_RACE_DURATION_SECS: u64 = 60;

pub const DEFAULT_RESOLVE_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_LOOKUP_TABLE_MIN_AGE_MS: u64 = 120_000;
pub const DEFAULT_SETTLEMENT_LEASE_MS: u64 = 600_000;
pub const DEFAULT_LOOKUP_TABLE_THRESHOLD: usize = LOOKUP_TABLE_THRESHOLD;
pub const DEFAULT_LOOKUP_TABLE_CHUNK_SIZE: usize = LOOKUP_TABLE_CHUNK_SIZE;

pub const DEFAULT_STORE_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_CHAIN_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_RETRY_INITIAL_BACKOFF_MS: u64 = 200;
pub const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 5_000;
pub const DEFAULT_CONFIRM_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_CONFIRM_POLL_MS: u64 = 500;
pub const DEFAULT_COMPUTE_UNIT_PRICE_MICRO_LAMPORTS: u64 = COMPUTE_UNIT_PRICE_MICRO_LAMPORTS;
