//! Periodic resolution.
//!
//! Each tick looks at the latest race and does the next piece of work it
//! needs: finish it once it has ended, then settle it. Ticks are single-flight;
//! a tick that starts while another is running returns
//! [TickOutcome::Skipped] without touching the store. Every step re-reads the
//! race first, so a tick that finds nothing to do is a no-op.

use crate::{
    payout::PayoutResolver,
    settlement::{ChainSettlementBatcher, SettleOutcome},
    ChainClient, EngineConfig, Error, LedgerStore, RaceLedger,
};
use paddock_types::{PoolId, Race, RaceId, RaceState, SettlementStatus, Signature};
use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still running.
    Skipped,
    /// No race, a race still taking bets, or nothing left to do.
    Idle,
    /// The race is running and has not ended yet.
    Racing { race_id: RaceId, ends_at_ms: u64 },
    Settled {
        race_id: RaceId,
        winning_pool: PoolId,
        signature: Option<Signature>,
    },
    /// Another settler holds the claim on this race.
    Submitting { race_id: RaceId },
    /// Settlement was sent but is not confirmed yet.
    InFlight { race_id: RaceId, signature: Signature },
    /// Settlement was rejected and waits for an operator.
    Rejected { race_id: RaceId, reason: String },
}

pub struct ResolutionScheduler<S: LedgerStore, C: ChainClient> {
    store: S,
    chain: C,
    ledger: RaceLedger<S>,
    resolver: PayoutResolver,
    batcher: ChainSettlementBatcher<S, C>,
    running: Mutex<()>,
}

impl<S: LedgerStore, C: ChainClient> ResolutionScheduler<S, C> {
    pub fn new(store: S, chain: C, config: EngineConfig) -> Self {
        Self {
            ledger: RaceLedger::new(store.clone(), config.clone()),
            resolver: PayoutResolver::new(config.unclaimed_pool_policy),
            batcher: ChainSettlementBatcher::new(store.clone(), chain.clone(), config),
            store,
            chain,
            running: Mutex::new(()),
        }
    }

    pub async fn tick(&self, now_ms: u64) -> Result<TickOutcome, Error> {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("previous tick still running");
            return Ok(TickOutcome::Skipped);
        };

        let Some(race) = self.ledger.latest_race().await? else {
            return Ok(TickOutcome::Idle);
        };
        match race.state {
            RaceState::Created => Ok(TickOutcome::Idle),
            RaceState::Started => {
                let Some(ends_at_ms) = race.ends_at_ms else {
                    return Ok(TickOutcome::Idle);
                };
                if !race.has_ended(now_ms) {
                    return Ok(TickOutcome::Racing {
                        race_id: race.id,
                        ends_at_ms,
                    });
                }
                if race.total_entries() == 0 {
                    let race = self.ledger.finish_empty_race().await?;
                    return Ok(TickOutcome::Settled {
                        race_id: race.id,
                        winning_pool: race
                            .winning_pool
                            .unwrap_or_else(|| self.ledger.config().first_pool()),
                        signature: None,
                    });
                }
                let winning_pool = self.pick_winner(&race).await?;
                let race = self.ledger.finish_race(winning_pool).await?;
                self.settle(race, now_ms).await
            }
            RaceState::Finished => self.settle(race, now_ms).await,
        }
    }

    /// Resolve and settle a finished race, if it still needs it.
    pub async fn settle(&self, race: Race, now_ms: u64) -> Result<TickOutcome, Error> {
        match &race.settlement {
            SettlementStatus::Settled { .. } => return Ok(TickOutcome::Idle),
            SettlementStatus::Rejected { reason } => {
                warn!(race_id = %race.id, %reason, "settlement rejected, waiting for operator retry");
                return Ok(TickOutcome::Rejected {
                    race_id: race.id,
                    reason: reason.clone(),
                });
            }
            SettlementStatus::Unsettled
            | SettlementStatus::Submitting { .. }
            | SettlementStatus::InFlight { .. } => {}
        }

        let race_id = race.id;
        let bettors = self.store.transact(move |tx| Ok(tx.bettors(race_id)?)).await?;
        let payouts = self.resolver.resolve(&race, &bettors)?;
        info!(
            race_id = %race_id,
            winning_pool = %payouts.winning_pool,
            total_stake = %payouts.total_stake,
            winning_stake = %payouts.winning_stake,
            unclaimed = %payouts.unclaimed,
            "race resolved"
        );
        let outcome = match self.batcher.settle(&payouts, now_ms).await? {
            SettleOutcome::Settled { signature } => TickOutcome::Settled {
                race_id,
                winning_pool: payouts.winning_pool,
                signature,
            },
            SettleOutcome::AlreadySettled => TickOutcome::Idle,
            SettleOutcome::InFlight { signature } => TickOutcome::InFlight { race_id, signature },
            SettleOutcome::Submitting => TickOutcome::Submitting { race_id },
        };
        Ok(outcome)
    }

    /// The chain's winner if it reported one for a pool with bets, otherwise a
    /// uniform draw among pools with bets.
    async fn pick_winner(&self, race: &Race) -> Result<PoolId, Error> {
        let snapshot = self.chain.query_race_state().await?;
        if let Some(pool) = snapshot.winning_pool {
            if race.pool(pool).is_some() {
                return Ok(pool);
            }
            warn!(race_id = %race.id, %pool, "chain winner has no bets, drawing instead");
        }
        let candidates: Vec<PoolId> = race.pools.iter().map(|totals| totals.pool).collect();
        candidates
            .choose(&mut rand::thread_rng())
            .copied()
            .ok_or_else(|| crate::ValidationError::UnknownPool(self.ledger.config().first_pool()).into())
    }
}
