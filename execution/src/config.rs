use crate::{payout::UnclaimedPoolPolicy, RetryPolicy};
use paddock_types::{
    constants::{
        DEFAULT_POOL_COUNT, LOOKUP_TABLE_CHUNK_SIZE, LOOKUP_TABLE_THRESHOLD, MAX_RACE_ENTRIES,
    },
    PoolId,
};
use std::time::Duration;

/// Tunables shared by every engine component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Pools are numbered `1..=pool_count`.
    pub pool_count: u16,
    /// Bets a single race accepts.
    pub max_entries: usize,
    /// Time between `start_race` and the race ending.
    pub race_duration: Duration,
    /// Settlements with more participants than this stage their accounts in a lookup table.
    pub lookup_table_threshold: usize,
    /// Addresses per extend transaction.
    pub lookup_table_chunk_size: usize,
    /// Tables younger than this are left alone by the sweep.
    pub lookup_table_min_age: Duration,
    pub unclaimed_pool_policy: UnclaimedPoolPolicy,
    /// How long a settler's claim on a race keeps others from submitting it.
    /// Must outlast one full submission including lookup table staging.
    pub settlement_lease: Duration,
    /// Applied to store write conflicts.
    pub store_retry: RetryPolicy,
    /// Applied to transient chain failures.
    pub chain_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_count: DEFAULT_POOL_COUNT,
            max_entries: MAX_RACE_ENTRIES,
            race_duration: Duration::from_secs(60),
            lookup_table_threshold: LOOKUP_TABLE_THRESHOLD,
            lookup_table_chunk_size: LOOKUP_TABLE_CHUNK_SIZE,
            lookup_table_min_age: Duration::from_secs(120),
            unclaimed_pool_policy: UnclaimedPoolPolicy::default(),
            settlement_lease: Duration::from_secs(600),
            store_retry: RetryPolicy::default(),
            chain_retry: RetryPolicy {
                max_attempts: 4,
                ..RetryPolicy::default()
            },
        }
    }
}

impl EngineConfig {
    pub fn first_pool(&self) -> PoolId {
        PoolId(1)
    }

    pub fn pool_in_range(&self, pool: PoolId) -> bool {
        (1..=self.pool_count).contains(&pool.0)
    }
}
