//! Ledger store collaborator.
//!
//! The store is the only serialization point for financial state. Every read
//! and write an operation performs happens inside one [LedgerStore::transact]
//! call, so checks and writes observe the same snapshot and either all land or
//! none do.

use crate::{Error, RetryPolicy, StoreError};
use paddock_types::{Address, LookupTableRecord, Race, RaceId, User};
use std::future::Future;
use tracing::{debug, warn};

/// Document access inside a single store transaction.
pub trait LedgerTx {
    /// Race with the highest id.
    fn latest_race(&mut self) -> Result<Option<Race>, StoreError>;
    fn race(&mut self, id: RaceId) -> Result<Option<Race>, StoreError>;
    fn put_race(&mut self, race: &Race) -> Result<(), StoreError>;

    fn user(&mut self, handle: &str) -> Result<Option<User>, StoreError>;
    fn put_user(&mut self, user: &User) -> Result<(), StoreError>;
    /// Users holding a bet on `race_id`, ordered by handle.
    fn bettors(&mut self, race_id: RaceId) -> Result<Vec<User>, StoreError>;

    fn lookup_tables(&mut self) -> Result<Vec<LookupTableRecord>, StoreError>;
    fn put_lookup_table(&mut self, record: &LookupTableRecord) -> Result<(), StoreError>;
    fn remove_lookup_table(&mut self, address: &Address) -> Result<(), StoreError>;
}

/// A transactional document store.
pub trait LedgerStore: Clone + Send + Sync + 'static {
    /// Run `f` inside one atomic transaction.
    ///
    /// If `f` returns an error nothing it wrote is kept. If another writer
    /// committed a conflicting change first, returns
    /// `Error::Store(StoreError::Conflict)` and nothing is kept.
    fn transact<T, F>(&self, f: F) -> impl Future<Output = Result<T, Error>> + Send
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, Error> + Send + 'static;
}

/// Run a transaction, rebuilding and retrying it with backoff while it loses
/// write conflicts.
///
/// `make` is called once per attempt so every attempt re-validates from a
/// fresh snapshot.
pub async fn transact_with_retry<S, T, F, M>(
    store: &S,
    policy: &RetryPolicy,
    mut make: M,
) -> Result<T, Error>
where
    S: LedgerStore,
    T: Send + 'static,
    F: FnOnce(&mut dyn LedgerTx) -> Result<T, Error> + Send + 'static,
    M: FnMut() -> F,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match store.transact(make()).await {
            Err(err) if err.is_conflict() => {
                if attempt >= max_attempts {
                    warn!(attempts = attempt, "store conflicts exhausted retries");
                    return Err(Error::RetriesExhausted { attempts: attempt });
                }
                let delay = policy.delay(&mut rand::thread_rng(), attempt);
                debug!(attempt, ?delay, "store conflict, retrying");
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}
