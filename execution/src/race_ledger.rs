//! Race lifecycle.
//!
//! A race moves `Created -> Started -> Finished` and never back. Bets are
//! accepted only while `Created`; `start_race` closes betting and fixes when
//! the race ends. At most one race is open at a time because a new race is
//! only created once the latest one is finished.

use crate::{
    store::transact_with_retry, EngineConfig, Error, LedgerStore, LedgerTx, StateError,
    ValidationError,
};
use paddock_types::{PoolId, Race, RaceId, RaceState, SettlementStatus};
use tracing::info;

#[derive(Clone)]
pub struct RaceLedger<S: LedgerStore> {
    store: S,
    config: EngineConfig,
}

impl<S: LedgerStore> RaceLedger<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn latest_race(&self) -> Result<Option<Race>, Error> {
        self.store.transact(|tx| Ok(tx.latest_race()?)).await
    }

    pub async fn race(&self, id: RaceId) -> Result<Race, Error> {
        self.store
            .transact(move |tx| tx.race(id)?.ok_or(Error::State(StateError::NoRace)))
            .await
    }

    /// Open a new race. Fails while the latest race is not finished.
    pub async fn create_race(&self, operator: &str, now_ms: u64) -> Result<Race, Error> {
        let operator = operator.to_string();
        let race = transact_with_retry(&self.store, &self.config.store_retry, || {
            let operator = operator.clone();
            move |tx: &mut dyn LedgerTx| {
                let id = match tx.latest_race()? {
                    Some(latest) if latest.is_open() => {
                        return Err(StateError::RaceInProgress.into());
                    }
                    Some(latest) => latest.id.next(),
                    None => RaceId::FIRST,
                };
                let race = Race::new(id, operator, now_ms);
                tx.put_race(&race)?;
                Ok(race)
            }
        })
        .await?;
        info!(race_id = %race.id, created_by = %race.created_by, "race created");
        Ok(race)
    }

    /// Close betting on the race in `Created` and start the clock.
    pub async fn start_race(&self, now_ms: u64) -> Result<Race, Error> {
        let duration_ms = self.config.race_duration.as_millis() as u64;
        let race = transact_with_retry(&self.store, &self.config.store_retry, || {
            move |tx: &mut dyn LedgerTx| {
                let mut race = tx.latest_race()?.ok_or(StateError::NoRace)?;
                advance(&mut race, RaceState::Created)?;
                race.started_at_ms = Some(now_ms);
                race.ends_at_ms = Some(now_ms.saturating_add(duration_ms));
                tx.put_race(&race)?;
                Ok(race)
            }
        })
        .await?;
        info!(race_id = %race.id, ends_at_ms = ?race.ends_at_ms, entries = race.total_entries(), "race started");
        Ok(race)
    }

    /// Stamp the winner of the started race.
    ///
    /// Calling this on a finished race changes nothing and returns
    /// `StateError::AlreadyResolved`.
    pub async fn finish_race(&self, winning_pool: PoolId) -> Result<Race, Error> {
        let race = transact_with_retry(&self.store, &self.config.store_retry, || {
            move |tx: &mut dyn LedgerTx| {
                let mut race = tx.latest_race()?.ok_or(StateError::NoRace)?;
                if race.state == RaceState::Finished {
                    return Err(StateError::AlreadyResolved.into());
                }
                advance(&mut race, RaceState::Started)?;
                if race.pool(winning_pool).is_none() {
                    return Err(ValidationError::UnknownPool(winning_pool).into());
                }
                race.winning_pool = Some(winning_pool);
                tx.put_race(&race)?;
                Ok(race)
            }
        })
        .await?;
        info!(race_id = %race.id, winning_pool = %winning_pool, "race finished");
        Ok(race)
    }

    /// Finish a started race nobody bet on. There is nothing to pay, so the
    /// race is settled immediately with the first pool as its winner.
    pub async fn finish_empty_race(&self) -> Result<Race, Error> {
        let winning_pool = self.config.first_pool();
        let race = transact_with_retry(&self.store, &self.config.store_retry, || {
            move |tx: &mut dyn LedgerTx| {
                let mut race = tx.latest_race()?.ok_or(StateError::NoRace)?;
                if race.state == RaceState::Finished {
                    return Err(StateError::AlreadyResolved.into());
                }
                if race.total_entries() > 0 {
                    return Err(StateError::WrongState {
                        expected: RaceState::Started,
                        actual: race.state,
                    }
                    .into());
                }
                advance(&mut race, RaceState::Started)?;
                race.winning_pool = Some(winning_pool);
                race.settlement = SettlementStatus::Settled { signature: None };
                tx.put_race(&race)?;
                Ok(race)
            }
        })
        .await?;
        info!(race_id = %race.id, "empty race finished");
        Ok(race)
    }

    /// Move a rejected settlement back to `Unsettled` so the scheduler tries
    /// again. Returns whether anything changed.
    pub async fn retry_settlement(&self, id: RaceId) -> Result<bool, Error> {
        let reset = transact_with_retry(&self.store, &self.config.store_retry, || {
            move |tx: &mut dyn LedgerTx| {
                let mut race = tx.race(id)?.ok_or(StateError::NoRace)?;
                match race.settlement {
                    SettlementStatus::Rejected { .. } => {
                        race.settlement = SettlementStatus::Unsettled;
                        tx.put_race(&race)?;
                        Ok(true)
                    }
                    SettlementStatus::Settled { .. } => Err(StateError::AlreadyResolved.into()),
                    _ => Ok(false),
                }
            }
        })
        .await?;
        if reset {
            info!(race_id = %id, "settlement reset for retry");
        }
        Ok(reset)
    }
}

/// Move `race` out of `from` into the state that follows it.
fn advance(race: &mut Race, from: RaceState) -> Result<(), StateError> {
    if race.state != from {
        return Err(StateError::WrongState {
            expected: from,
            actual: race.state,
        });
    }
    race.state = from.successor().ok_or(StateError::AlreadyResolved)?;
    Ok(())
}
