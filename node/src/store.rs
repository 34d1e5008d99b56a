//! SQLite ledger store.
//!
//! Documents are stored as JSON, one row each. `user_bets` indexes which users
//! hold a bet on which race and is rewritten whenever a user is saved.

use paddock_execution::{Error, LedgerStore, LedgerTx, StoreError};
use paddock_types::{Address, LookupTableRecord, Race, RaceId, User};
use rusqlite::{
    params, Connection, ErrorCode, OptionalExtension, TransactionBehavior,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};
use tracing::debug;

/// How long a writer waits on a lock held by another connection before
/// reporting a conflict.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(backend)?;
        init_schema(&conn)?;
        debug!(path = %path.display(), "opened ledger store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         CREATE TABLE IF NOT EXISTS races (
             id INTEGER PRIMARY KEY,
             doc TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS users (
             handle TEXT PRIMARY KEY,
             doc TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS user_bets (
             race_id INTEGER NOT NULL,
             handle TEXT NOT NULL,
             PRIMARY KEY (race_id, handle)
         );
         CREATE TABLE IF NOT EXISTS lookup_tables (
             address TEXT PRIMARY KEY,
             doc TEXT NOT NULL
         );",
    )
    .map_err(backend)
}

fn backend(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => StoreError::Conflict,
        _ => StoreError::Backend(err.to_string()),
    }
}

fn encode<T: Serialize>(doc: &T) -> Result<String, StoreError> {
    serde_json::to_string(doc).map_err(|err| StoreError::Corrupt(err.to_string()))
}

fn decode<T: DeserializeOwned>(doc: &str) -> Result<T, StoreError> {
    serde_json::from_str(doc).map_err(|err| StoreError::Corrupt(err.to_string()))
}

fn race_key(id: RaceId) -> Result<i64, StoreError> {
    i64::try_from(id.0).map_err(|_| StoreError::Backend(format!("race id {id} out of range")))
}

struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl SqliteTx<'_> {
    fn doc<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Option<T>, StoreError> {
        let doc: Option<String> = self
            .conn
            .query_row(sql, params, |row| row.get(0))
            .optional()
            .map_err(backend)?;
        doc.as_deref().map(decode).transpose()
    }

    fn docs<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<T>, StoreError> {
        let mut stmt = self.conn.prepare(sql).map_err(backend)?;
        let rows = stmt
            .query_map(params, |row| row.get::<_, String>(0))
            .map_err(backend)?;
        let mut docs = Vec::new();
        for row in rows {
            docs.push(decode(&row.map_err(backend)?)?);
        }
        Ok(docs)
    }
}

impl LedgerTx for SqliteTx<'_> {
    fn latest_race(&mut self) -> Result<Option<Race>, StoreError> {
        self.doc("SELECT doc FROM races ORDER BY id DESC LIMIT 1", [])
    }

    fn race(&mut self, id: RaceId) -> Result<Option<Race>, StoreError> {
        self.doc("SELECT doc FROM races WHERE id = ?1", params![race_key(id)?])
    }

    fn put_race(&mut self, race: &Race) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO races (id, doc) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET doc = excluded.doc",
                params![race_key(race.id)?, encode(race)?],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn user(&mut self, handle: &str) -> Result<Option<User>, StoreError> {
        self.doc("SELECT doc FROM users WHERE handle = ?1", params![handle])
    }

    fn put_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO users (handle, doc) VALUES (?1, ?2)
                 ON CONFLICT(handle) DO UPDATE SET doc = excluded.doc",
                params![user.handle, encode(user)?],
            )
            .map_err(backend)?;
        self.conn
            .execute(
                "DELETE FROM user_bets WHERE handle = ?1",
                params![user.handle],
            )
            .map_err(backend)?;
        for bet in &user.bets {
            self.conn
                .execute(
                    "INSERT OR IGNORE INTO user_bets (race_id, handle) VALUES (?1, ?2)",
                    params![race_key(bet.race_id)?, user.handle],
                )
                .map_err(backend)?;
        }
        Ok(())
    }

    fn bettors(&mut self, race_id: RaceId) -> Result<Vec<User>, StoreError> {
        self.docs(
            "SELECT u.doc FROM user_bets b
             JOIN users u ON u.handle = b.handle
             WHERE b.race_id = ?1
             ORDER BY u.handle",
            params![race_key(race_id)?],
        )
    }

    fn lookup_tables(&mut self) -> Result<Vec<LookupTableRecord>, StoreError> {
        self.docs("SELECT doc FROM lookup_tables ORDER BY address", [])
    }

    fn put_lookup_table(&mut self, record: &LookupTableRecord) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO lookup_tables (address, doc) VALUES (?1, ?2)
                 ON CONFLICT(address) DO UPDATE SET doc = excluded.doc",
                params![record.address.to_string(), encode(record)?],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn remove_lookup_table(&mut self, address: &Address) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM lookup_tables WHERE address = ?1",
                params![address.to_string()],
            )
            .map_err(backend)?;
        Ok(())
    }
}

impl LedgerStore for SqliteStore {
    async fn transact<T, F>(&self, f: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))?;
            // Take the write lock up front so two connections never both read
            // a snapshot and then race to commit.
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(backend)?;
            let value = f(&mut SqliteTx { conn: &tx })?;
            tx.commit().map_err(backend)?;
            Ok(value)
        })
        .await
        .map_err(|err| StoreError::Backend(format!("store task failed: {err}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paddock_execution::{
        mocks::MockChain, BetAccountingEngine, EngineConfig, RaceLedger, ResolutionScheduler,
        RetryPolicy, StateError, TickOutcome,
    };
    use paddock_types::{
        constants::LAMPORTS_PER_SOL, GameSnapshot, Lamports, PoolId, RaceState,
        SettlementStatus, Signature, UserBet,
    };
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> SqliteStore {
        SqliteStore::open(&dir.path().join("ledger.db")).unwrap()
    }

    fn bettor(handle: &str, wallet: u8, race_id: RaceId) -> User {
        let mut user = User::new(handle, Address([wallet; 32]));
        user.bets.push(UserBet {
            race_id,
            pool: PoolId(1),
            amount: Lamports(LAMPORTS_PER_SOL),
            payout: None,
        });
        user
    }

    #[tokio::test]
    async fn documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .transact(|tx| {
                tx.put_race(&Race::new(RaceId(1), "op", 10))?;
                tx.put_race(&Race::new(RaceId(2), "op", 20))?;
                tx.put_user(&User::new("alice", Address([1; 32])))?;
                tx.put_lookup_table(&LookupTableRecord::new(Address([9; 32]), 30))?;
                Ok(())
            })
            .await
            .unwrap();
        drop(store);

        let store = open(&dir);
        let (latest, first, alice, tables) = store
            .transact(|tx| {
                Ok((
                    tx.latest_race()?,
                    tx.race(RaceId(1))?,
                    tx.user("alice")?,
                    tx.lookup_tables()?,
                ))
            })
            .await
            .unwrap();
        assert_eq!(latest.unwrap().id, RaceId(2));
        assert_eq!(first.unwrap().created_at_ms, 10);
        assert_eq!(alice.unwrap().wallet, Address([1; 32]));
        assert_eq!(tables, vec![LookupTableRecord::new(Address([9; 32]), 30)]);
    }

    #[tokio::test]
    async fn missing_documents_are_none() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let (race, user) = store
            .transact(|tx| Ok((tx.latest_race()?, tx.user("nobody")?)))
            .await
            .unwrap();
        assert!(race.is_none());
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn bettors_are_joined_by_race_and_ordered() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .transact(|tx| {
                tx.put_user(&bettor("carol", 3, RaceId(1)))?;
                tx.put_user(&bettor("alice", 1, RaceId(1)))?;
                tx.put_user(&bettor("bob", 2, RaceId(2)))?;
                tx.put_user(&User::new("dave", Address([4; 32])))?;
                Ok(())
            })
            .await
            .unwrap();

        let handles = |users: Vec<User>| -> Vec<String> {
            users.into_iter().map(|user| user.handle).collect()
        };
        let first = store.transact(|tx| Ok(tx.bettors(RaceId(1))?)).await.unwrap();
        assert_eq!(handles(first), vec!["alice", "carol"]);
        let second = store.transact(|tx| Ok(tx.bettors(RaceId(2))?)).await.unwrap();
        assert_eq!(handles(second), vec!["bob"]);
    }

    #[tokio::test]
    async fn saving_a_user_refreshes_the_bet_index() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .transact(|tx| Ok(tx.put_user(&bettor("alice", 1, RaceId(1)))?))
            .await
            .unwrap();
        store
            .transact(|tx| {
                let mut alice = tx.user("alice")?.unwrap();
                alice.bets[0].race_id = RaceId(2);
                tx.put_user(&alice)?;
                Ok(())
            })
            .await
            .unwrap();

        let (old, new) = store
            .transact(|tx| Ok((tx.bettors(RaceId(1))?, tx.bettors(RaceId(2))?)))
            .await
            .unwrap();
        assert!(old.is_empty());
        assert_eq!(new.len(), 1);
    }

    #[tokio::test]
    async fn failed_transactions_keep_nothing() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let result: Result<(), Error> = store
            .transact(|tx| {
                tx.put_race(&Race::new(RaceId(1), "op", 0))?;
                Err(StateError::RaceInProgress.into())
            })
            .await;
        assert_eq!(result, Err(Error::State(StateError::RaceInProgress)));

        let latest = store.transact(|tx| Ok(tx.latest_race()?)).await.unwrap();
        assert!(latest.is_none());
    }

    #[tokio::test]
    async fn removed_lookup_tables_are_gone() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let table = Address([7; 32]);
        store
            .transact(move |tx| {
                tx.put_lookup_table(&LookupTableRecord::new(table, 0))?;
                tx.put_lookup_table(&LookupTableRecord::new(Address([8; 32]), 0))?;
                tx.remove_lookup_table(&table)?;
                Ok(())
            })
            .await
            .unwrap();
        let tables = store.transact(|tx| Ok(tx.lookup_tables()?)).await.unwrap();
        assert_eq!(tables, vec![LookupTableRecord::new(Address([8; 32]), 0)]);
    }

    #[tokio::test]
    async fn unreadable_documents_are_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");
        let store = SqliteStore::open(&path).unwrap();
        Connection::open(&path)
            .unwrap()
            .execute("INSERT INTO races (id, doc) VALUES (1, 'not json')", [])
            .unwrap();

        let result = store.transact(|tx| Ok(tx.latest_race()?)).await;
        assert!(matches!(result, Err(Error::Store(StoreError::Corrupt(_)))));
    }

    #[tokio::test]
    async fn a_held_write_lock_is_a_conflict() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.db");
        let store = SqliteStore::open(&path).unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.busy_timeout(Duration::from_millis(10)).unwrap();
        }
        let mut other = Connection::open(&path).unwrap();
        let held = other
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .unwrap();

        let result = store
            .transact(|tx| Ok(tx.put_race(&Race::new(RaceId(1), "op", 0))?))
            .await;
        assert_eq!(result, Err(Error::Store(StoreError::Conflict)));
        drop(held);
    }

    #[tokio::test]
    async fn race_settles_end_to_end() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let chain = MockChain::default();
        let config = EngineConfig {
            store_retry: RetryPolicy::immediate(5),
            chain_retry: RetryPolicy::immediate(3),
            ..EngineConfig::default()
        };
        let ledger = RaceLedger::new(store.clone(), config.clone());
        let engine = BetAccountingEngine::new(store.clone(), chain.clone(), config.clone());
        let scheduler = ResolutionScheduler::new(store.clone(), chain.clone(), config.clone());

        ledger.create_race("op", 0).await.unwrap();
        for (i, (handle, pool)) in [("alice", 1), ("bob", 2)].into_iter().enumerate() {
            let wallet = Address([i as u8 + 1; 32]);
            chain.set_balance(wallet, Lamports(10 * LAMPORTS_PER_SOL));
            engine.register_user(handle, wallet).await.unwrap();
            engine
                .place_bet(handle, PoolId(pool), Lamports(LAMPORTS_PER_SOL))
                .await
                .unwrap();
        }
        ledger.start_race(0).await.unwrap();
        chain.set_snapshot(GameSnapshot {
            winning_pool: Some(PoolId(2)),
            ..GameSnapshot::default()
        });

        let ends_at_ms = config.race_duration.as_millis() as u64;
        let outcome = scheduler.tick(ends_at_ms).await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Settled {
                race_id: RaceId(1),
                winning_pool: PoolId(2),
                signature: Some(Signature("sig1".to_string())),
            }
        );

        let race = ledger.race(RaceId(1)).await.unwrap();
        assert_eq!(race.state, RaceState::Finished);
        assert!(matches!(race.settlement, SettlementStatus::Settled { .. }));
        let bob = engine.user("bob").await.unwrap();
        let bet = bob.bet_for(RaceId(1)).unwrap();
        assert_eq!(bet.payout, Some(Lamports(2 * LAMPORTS_PER_SOL)));
        assert_eq!(bob.earned_funds, Lamports::ZERO);
        assert_eq!(chain.balance(&bob.wallet), Lamports(12 * LAMPORTS_PER_SOL));
        assert_eq!(
            engine.available_balance("bob").await.unwrap(),
            Lamports(11 * LAMPORTS_PER_SOL)
        );
        let alice = engine.user("alice").await.unwrap();
        assert_eq!(alice.bet_for(RaceId(1)).unwrap().payout, Some(Lamports::ZERO));

        assert_eq!(scheduler.tick(ends_at_ms + 1).await.unwrap(), TickOutcome::Idle);
        assert_eq!(chain.settlements(), 1);
    }

    #[tokio::test]
    async fn settlers_on_separate_connections_submit_once() {
        let dir = TempDir::new().unwrap();
        let daemon_store = open(&dir);
        let operator_store = open(&dir);
        let chain = MockChain::default();
        let config = EngineConfig {
            store_retry: RetryPolicy::immediate(5),
            chain_retry: RetryPolicy::immediate(3),
            ..EngineConfig::default()
        };
        let ledger = RaceLedger::new(daemon_store.clone(), config.clone());
        let engine = BetAccountingEngine::new(daemon_store.clone(), chain.clone(), config.clone());

        ledger.create_race("op", 0).await.unwrap();
        for (i, (handle, pool)) in [("alice", 1), ("bob", 2)].into_iter().enumerate() {
            let wallet = Address([i as u8 + 1; 32]);
            chain.set_balance(wallet, Lamports(LAMPORTS_PER_SOL));
            engine.register_user(handle, wallet).await.unwrap();
            engine
                .place_bet(handle, PoolId(pool), Lamports(LAMPORTS_PER_SOL))
                .await
                .unwrap();
        }
        ledger.start_race(0).await.unwrap();
        let race = RaceLedger::new(operator_store.clone(), config.clone())
            .finish_race(PoolId(1))
            .await
            .unwrap();

        let daemon = ResolutionScheduler::new(daemon_store, chain.clone(), config.clone());
        let operator = ResolutionScheduler::new(operator_store, chain.clone(), config.clone());
        let ends_at_ms = config.race_duration.as_millis() as u64;
        let (forced, ticked) = tokio::join!(
            operator.settle(race, ends_at_ms),
            daemon.tick(ends_at_ms)
        );
        let outcomes = [forced.unwrap(), ticked.unwrap()];
        let settled = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, TickOutcome::Settled { .. }))
            .count();
        assert_eq!(settled, 1, "{outcomes:?}");
        assert_eq!(chain.attempts(), 1);
        assert_eq!(chain.balance(&Address([1; 32])), Lamports(3 * LAMPORTS_PER_SOL));
    }
}
