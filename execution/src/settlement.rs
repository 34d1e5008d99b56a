//! Chain settlement.
//!
//! Winners are paid by the chain itself: the resolve instruction moves each
//! payout into the winner's wallet. The ledger only notes what each bet paid,
//! in the same store transaction that marks the race `Settled`, and only
//! after the chain confirms.
//!
//! Before sending, a settler claims the race by moving it to `Submitting` in
//! a store transaction that fails if anyone else changed the status first.
//! Only the claim holder submits. A confirmation timeout is recorded as
//! `InFlight` with its signature so the next attempt asks the chain what
//! happened before sending anything new. A race that is already `Settled` is
//! never submitted again.

use crate::{
    chain::{Submission, TxStatus},
    payout::Payouts,
    store::transact_with_retry,
    ChainClient, ChainError, EngineConfig, Error, LedgerStore, LedgerTx, StateError, StoreError,
};
use paddock_types::{
    Address, Lamports, LookupTable, LookupTableRecord, Race, RaceId, RaceState, SettlementStatus,
    Signature,
};
use tracing::{debug, info, warn};

/// Result of a settlement attempt that did not fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Confirmed and recorded by this call.
    Settled { signature: Option<Signature> },
    /// Already settled before this call; nothing was submitted.
    AlreadySettled,
    /// Sent but unconfirmed. Retried on the next call.
    InFlight { signature: Signature },
    /// Another settler holds the claim; nothing was submitted.
    Submitting,
}

#[derive(Clone)]
pub struct ChainSettlementBatcher<S: LedgerStore, C: ChainClient> {
    store: S,
    chain: C,
    config: EngineConfig,
}

impl<S: LedgerStore, C: ChainClient> ChainSettlementBatcher<S, C> {
    pub fn new(store: S, chain: C, config: EngineConfig) -> Self {
        Self {
            store,
            chain,
            config,
        }
    }

    /// Submit `payouts` for a finished race and record them once the chain
    /// confirms.
    pub async fn settle(&self, payouts: &Payouts, now_ms: u64) -> Result<SettleOutcome, Error> {
        let race_id = payouts.race_id;
        let race = self.load(race_id).await?;
        if race.state != RaceState::Finished {
            return Err(StateError::WrongState {
                expected: RaceState::Finished,
                actual: race.state,
            }
            .into());
        }

        let lease_ms = self.config.settlement_lease.as_millis() as u64;
        match &race.settlement {
            SettlementStatus::Settled { .. } => {
                debug!(race_id = %race_id, "race already settled");
                return Ok(SettleOutcome::AlreadySettled);
            }
            SettlementStatus::Rejected { reason } => {
                return Err(ChainError::Rejected {
                    reason: reason.clone(),
                }
                .into());
            }
            SettlementStatus::Submitting { claimed_at_ms } => {
                if race.settlement.is_claimed(now_ms, lease_ms) {
                    debug!(race_id = %race_id, claimed_at_ms, "settlement claimed elsewhere");
                    return Ok(SettleOutcome::Submitting);
                }
                warn!(race_id = %race_id, claimed_at_ms, "settlement claim expired, taking over");
            }
            SettlementStatus::InFlight { signature } => {
                match self.chain.signature_status(signature).await? {
                    TxStatus::Confirmed => {
                        info!(race_id = %race_id, %signature, "in-flight settlement confirmed");
                        return self.commit(payouts, Some(signature.clone())).await;
                    }
                    TxStatus::Pending => {
                        debug!(race_id = %race_id, %signature, "settlement still pending");
                        return Ok(SettleOutcome::InFlight {
                            signature: signature.clone(),
                        });
                    }
                    TxStatus::Failed(reason) => {
                        warn!(race_id = %race_id, %signature, %reason, "in-flight settlement failed, resubmitting");
                    }
                    TxStatus::Dropped => {
                        warn!(race_id = %race_id, %signature, "in-flight settlement dropped, resubmitting");
                    }
                }
            }
            SettlementStatus::Unsettled => {}
        }

        if payouts.entries.is_empty() {
            return self.commit(payouts, None).await;
        }

        let claim = SettlementStatus::Submitting {
            claimed_at_ms: now_ms,
        };
        if let Err(current) = self.claim(race_id, race.settlement, claim.clone()).await? {
            debug!(race_id = %race_id, ?current, "lost settlement claim");
            return claimed_elsewhere(current);
        }

        let result = self.submit_claimed(payouts, now_ms).await;
        if result.is_err() {
            if let Err(err) = self.release(race_id, claim).await {
                warn!(race_id = %race_id, %err, "could not release settlement claim");
            }
        }
        result
    }

    /// Send the settlement for a race this settler has claimed.
    async fn submit_claimed(&self, payouts: &Payouts, now_ms: u64) -> Result<SettleOutcome, Error> {
        let race_id = payouts.race_id;
        let participants = payouts.participants();
        let instructions = self.chain.build_resolve_instructions(
            payouts.winning_pool,
            &payouts.active_pools(),
            &participants,
        );
        let mut submission = Submission::new(instructions);
        if participants.len() > self.config.lookup_table_threshold {
            let wallets: Vec<Address> = participants.iter().map(|(wallet, _)| *wallet).collect();
            let table = self.stage_lookup_table(race_id, wallets, now_ms).await?;
            submission = submission.with_lookup_table(table);
        }

        match self.submit(submission).await {
            Ok(signature) => {
                info!(race_id = %race_id, %signature, winners = payouts.winners().count(), "settlement confirmed");
                self.commit(payouts, Some(signature)).await
            }
            Err(Error::Chain(ChainError::ConfirmationTimeout { signature })) => {
                warn!(race_id = %race_id, %signature, "settlement confirmation timed out");
                self.record(race_id, SettlementStatus::InFlight {
                    signature: signature.clone(),
                })
                .await?;
                Ok(SettleOutcome::InFlight { signature })
            }
            Err(Error::Chain(ChainError::Rejected { reason })) => {
                warn!(race_id = %race_id, %reason, "settlement rejected");
                self.record(race_id, SettlementStatus::Rejected {
                    reason: reason.clone(),
                })
                .await?;
                Err(ChainError::Rejected { reason }.into())
            }
            Err(err) => Err(err),
        }
    }

    /// Move the race from `observed` to `claim`. Returns the status found
    /// instead if another caller changed it first.
    async fn claim(
        &self,
        race_id: RaceId,
        observed: SettlementStatus,
        claim: SettlementStatus,
    ) -> Result<Result<(), SettlementStatus>, Error> {
        transact_with_retry(&self.store, &self.config.store_retry, || {
            let observed = observed.clone();
            let claim = claim.clone();
            move |tx: &mut dyn LedgerTx| {
                let mut race = tx.race(race_id)?.ok_or(StateError::NoRace)?;
                if race.settlement != observed {
                    return Ok(Err(race.settlement));
                }
                race.settlement = claim;
                tx.put_race(&race)?;
                Ok(Ok(()))
            }
        })
        .await
    }

    /// Return the race to `Unsettled` if `claim` is still its status.
    async fn release(&self, race_id: RaceId, claim: SettlementStatus) -> Result<(), Error> {
        transact_with_retry(&self.store, &self.config.store_retry, || {
            let claim = claim.clone();
            move |tx: &mut dyn LedgerTx| {
                let mut race = tx.race(race_id)?.ok_or(StateError::NoRace)?;
                if race.settlement == claim {
                    race.settlement = SettlementStatus::Unsettled;
                    tx.put_race(&race)?;
                }
                Ok(())
            }
        })
        .await
    }

    /// Create a lookup table holding `addresses` and wait for every extend to
    /// confirm. The table is recorded before the create is sent so the sweep
    /// finds it whatever happens to the send.
    async fn stage_lookup_table(
        &self,
        race_id: RaceId,
        addresses: Vec<Address>,
        now_ms: u64,
    ) -> Result<LookupTable, Error> {
        let authority = self.chain.authority();
        let (create, table) = self.chain.create_lookup_table(&authority).await?;
        let record = LookupTableRecord::new(table, now_ms);
        transact_with_retry(&self.store, &self.config.store_retry, || {
            let record = record.clone();
            move |tx: &mut dyn LedgerTx| Ok(tx.put_lookup_table(&record)?)
        })
        .await?;

        self.submit(Submission::new(vec![create])).await?;
        info!(race_id = %race_id, %table, participants = addresses.len(), "lookup table created");

        let chunk_size = self.config.lookup_table_chunk_size.max(1);
        for (index, chunk) in addresses.chunks(chunk_size).enumerate() {
            let extend = self.chain.extend_lookup_table(&table, chunk);
            self.submit(Submission::new(vec![extend])).await?;
            debug!(race_id = %race_id, %table, chunk = index, accounts = chunk.len(), "extended lookup table");
        }

        Ok(LookupTable {
            address: table,
            addresses,
        })
    }

    /// Submit with bounded retries on transient failures.
    async fn submit(&self, submission: Submission) -> Result<Signature, Error> {
        submit_with_retry(&self.chain, &self.config, submission).await
    }

    async fn load(&self, race_id: RaceId) -> Result<Race, Error> {
        self.store
            .transact(move |tx| tx.race(race_id)?.ok_or(Error::State(StateError::NoRace)))
            .await
    }

    async fn record(&self, race_id: RaceId, status: SettlementStatus) -> Result<(), Error> {
        transact_with_retry(&self.store, &self.config.store_retry, || {
            let status = status.clone();
            move |tx: &mut dyn LedgerTx| {
                let mut race = tx.race(race_id)?.ok_or(StateError::NoRace)?;
                if race.settlement.is_settled() {
                    return Ok(());
                }
                race.settlement = status;
                tx.put_race(&race)?;
                Ok(())
            }
        })
        .await
    }

    /// Note each bet's payout and mark the race settled, unless it already
    /// is. Balances are left alone since the chain already paid the wallets.
    async fn commit(
        &self,
        payouts: &Payouts,
        signature: Option<Signature>,
    ) -> Result<SettleOutcome, Error> {
        let race_id = payouts.race_id;
        let paid: Vec<(String, Lamports)> = payouts
            .entries
            .iter()
            .map(|payout| (payout.handle.clone(), payout.amount))
            .collect();
        transact_with_retry(&self.store, &self.config.store_retry, || {
            let paid = paid.clone();
            let signature = signature.clone();
            move |tx: &mut dyn LedgerTx| {
                let mut race = tx.race(race_id)?.ok_or(StateError::NoRace)?;
                if race.settlement.is_settled() {
                    return Ok(SettleOutcome::AlreadySettled);
                }
                for (handle, amount) in paid {
                    let mut user = tx.user(&handle)?.ok_or_else(|| {
                        StoreError::Corrupt(format!("bettor {handle} is missing"))
                    })?;
                    if !user.record_payout(race_id, amount) {
                        return Err(StoreError::Corrupt(format!(
                            "bettor {handle} has no bet on race {race_id}"
                        ))
                        .into());
                    }
                    tx.put_user(&user)?;
                }
                race.settlement = SettlementStatus::Settled {
                    signature: signature.clone(),
                };
                tx.put_race(&race)?;
                Ok(SettleOutcome::Settled { signature })
            }
        })
        .await
    }
}

/// What to report when another settler changed the status under us.
fn claimed_elsewhere(current: SettlementStatus) -> Result<SettleOutcome, Error> {
    match current {
        SettlementStatus::Settled { .. } => Ok(SettleOutcome::AlreadySettled),
        SettlementStatus::InFlight { signature } => Ok(SettleOutcome::InFlight { signature }),
        SettlementStatus::Rejected { reason } => Err(ChainError::Rejected { reason }.into()),
        SettlementStatus::Unsettled | SettlementStatus::Submitting { .. } => {
            Ok(SettleOutcome::Submitting)
        }
    }
}

async fn submit_with_retry<C: ChainClient>(
    chain: &C,
    config: &EngineConfig,
    submission: Submission,
) -> Result<Signature, Error> {
    let policy = config.chain_retry;
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match chain.submit_and_confirm(submission.clone()).await {
            Ok(signature) => return Ok(signature),
            Err(err) if err.is_transient() => {
                if attempt >= max_attempts {
                    warn!(attempts = attempt, %err, "chain submission exhausted retries");
                    return Err(Error::RetriesExhausted { attempts: attempt });
                }
                let delay = policy.delay(&mut rand::thread_rng(), attempt);
                debug!(attempt, ?delay, %err, "transient chain failure, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// What one sweep did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub closed: Vec<Address>,
    pub failed: Vec<Address>,
    /// Too young to close.
    pub skipped: Vec<Address>,
}

/// Closes lookup tables left behind by settlements.
#[derive(Clone)]
pub struct LookupTableSweeper<S: LedgerStore, C: ChainClient> {
    store: S,
    chain: C,
    config: EngineConfig,
}

impl<S: LedgerStore, C: ChainClient> LookupTableSweeper<S, C> {
    pub fn new(store: S, chain: C, config: EngineConfig) -> Self {
        Self {
            store,
            chain,
            config,
        }
    }

    /// Try to close every recorded table old enough to close. A failure on
    /// one table is logged and does not stop the others.
    pub async fn sweep(&self, now_ms: u64) -> Result<SweepReport, Error> {
        let min_age_ms = self.config.lookup_table_min_age.as_millis() as u64;
        let tables = self.store.transact(|tx| Ok(tx.lookup_tables()?)).await?;
        let mut report = SweepReport::default();
        for record in tables {
            if record.age_ms(now_ms) < min_age_ms {
                report.skipped.push(record.address);
                continue;
            }
            let table = record.address;
            match self.chain.lookup_table_exists(&table).await {
                Ok(true) => {
                    let close = self.chain.close_lookup_table(&table);
                    let submission = Submission::new(vec![close]);
                    if let Err(err) = submit_with_retry(&self.chain, &self.config, submission).await {
                        warn!(%table, %err, "failed to close lookup table");
                        report.failed.push(table);
                        continue;
                    }
                }
                Ok(false) => debug!(%table, "lookup table never landed or is already closed"),
                Err(err) => {
                    warn!(%table, %err, "failed to look up lookup table");
                    report.failed.push(table);
                    continue;
                }
            }
            let removed = transact_with_retry(&self.store, &self.config.store_retry, || {
                move |tx: &mut dyn LedgerTx| Ok(tx.remove_lookup_table(&table)?)
            })
            .await;
            match removed {
                Ok(()) => {
                    info!(%table, "lookup table closed");
                    report.closed.push(table);
                }
                Err(err) => {
                    warn!(%table, %err, "closed lookup table but could not remove its record");
                    report.failed.push(table);
                }
            }
        }
        Ok(report)
    }
}
