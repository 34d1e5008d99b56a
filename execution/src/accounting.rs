//! Bet placement.
//!
//! Bets are ledger-only: a placement reads the bettor's wallet balance from
//! the chain but never submits anything. Every rule is checked inside the
//! same store transaction that writes the user and race documents, so a
//! concurrent burst cannot admit two bets from the same user or exceed the
//! entry cap.

use crate::{
    store::transact_with_retry, ChainClient, EngineConfig, Error, LedgerStore, LedgerTx,
    StateError, ValidationError,
};
use paddock_types::{Address, Lamports, PoolId, PoolTotals, RaceId, User, UserBet};
use tracing::{debug, info};

/// Accepted bet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BetReceipt {
    pub race_id: RaceId,
    pub pool: PoolId,
    pub amount: Lamports,
    /// Pool totals after this bet.
    pub totals: PoolTotals,
    /// Balance left to stake after this bet.
    pub remaining: Lamports,
}

#[derive(Clone)]
pub struct BetAccountingEngine<S: LedgerStore, C: ChainClient> {
    store: S,
    chain: C,
    config: EngineConfig,
}

impl<S: LedgerStore, C: ChainClient> BetAccountingEngine<S, C> {
    pub fn new(store: S, chain: C, config: EngineConfig) -> Self {
        Self {
            store,
            chain,
            config,
        }
    }

    /// Create the ledger record for a new bettor.
    pub async fn register_user(&self, handle: &str, wallet: Address) -> Result<User, Error> {
        let handle = handle.to_string();
        let user = transact_with_retry(&self.store, &self.config.store_retry, || {
            let handle = handle.clone();
            move |tx: &mut dyn LedgerTx| {
                if let Some(existing) = tx.user(&handle)? {
                    return Err(ValidationError::UserExists {
                        wallet: existing.wallet,
                    }
                    .into());
                }
                let user = User::new(handle, wallet);
                tx.put_user(&user)?;
                Ok(user)
            }
        })
        .await?;
        info!(handle = %user.handle, wallet = %user.wallet, "user registered");
        Ok(user)
    }

    pub async fn user(&self, handle: &str) -> Result<User, Error> {
        let handle = handle.to_string();
        self.store
            .transact(move |tx| {
                tx.user(&handle)?
                    .ok_or(Error::Validation(ValidationError::UnknownUser))
            })
            .await
    }

    /// Balance `handle` may still stake.
    pub async fn available_balance(&self, handle: &str) -> Result<Lamports, Error> {
        let user = self.user(handle).await?;
        let wallet_balance = self.chain.wallet_balance(&user.wallet).await?;
        Ok(user.available_balance(wallet_balance))
    }

    /// Place a bet given as a decimal SOL string.
    pub async fn place_bet_sol(
        &self,
        handle: &str,
        pool: PoolId,
        amount: &str,
    ) -> Result<BetReceipt, Error> {
        let amount = Lamports::parse_sol(amount)
            .map_err(|err| ValidationError::InvalidAmount(err.to_string()))?;
        self.place_bet(handle, pool, amount).await
    }

    pub async fn place_bet(
        &self,
        handle: &str,
        pool: PoolId,
        amount: Lamports,
    ) -> Result<BetReceipt, Error> {
        if amount.is_zero() {
            return Err(ValidationError::InvalidAmount("amount must be greater than zero".into()).into());
        }

        // The wallet balance is external state; the ledger side is re-read
        // inside the transaction.
        let user = self.user(handle).await?;
        let wallet_balance = self.chain.wallet_balance(&user.wallet).await?;

        let handle = user.handle;
        let pool_count = self.config.pool_count;
        let max_entries = self.config.max_entries;
        let receipt = transact_with_retry(&self.store, &self.config.store_retry, || {
            let handle = handle.clone();
            move |tx: &mut dyn LedgerTx| {
                let mut race = match tx.latest_race()? {
                    Some(race) if race.accepts_bets() => race,
                    _ => return Err(StateError::NoActiveRace.into()),
                };
                if !(1..=pool_count).contains(&pool.0) {
                    return Err(ValidationError::PoolOutOfRange {
                        pool,
                        max: pool_count,
                    }
                    .into());
                }
                let mut user = tx.user(&handle)?.ok_or(ValidationError::UnknownUser)?;
                if user.bet_for(race.id).is_some() {
                    return Err(StateError::DuplicateBet.into());
                }
                if race.total_entries() >= max_entries {
                    return Err(StateError::EntriesCapReached.into());
                }
                let available = user.available_balance(wallet_balance);
                if available < amount {
                    return Err(ValidationError::InsufficientFunds {
                        available,
                        requested: amount,
                    }
                    .into());
                }

                user.bets.push(UserBet {
                    race_id: race.id,
                    pool,
                    amount,
                    payout: None,
                });
                user.spent_funds = user
                    .spent_funds
                    .checked_add(amount)
                    .ok_or_else(|| ValidationError::InvalidAmount("spent funds overflow".into()))?;
                let totals = race
                    .record_stake(pool, amount)
                    .ok_or_else(|| ValidationError::InvalidAmount("pool total overflow".into()))?;
                tx.put_user(&user)?;
                tx.put_race(&race)?;
                Ok(BetReceipt {
                    race_id: race.id,
                    pool,
                    amount,
                    totals,
                    remaining: user.available_balance(wallet_balance),
                })
            }
        })
        .await;

        match &receipt {
            Ok(receipt) => info!(
                race_id = %receipt.race_id,
                handle = %handle,
                pool = %pool,
                amount = %amount,
                pool_total = %receipt.totals.total_stake,
                "bet placed"
            ),
            Err(err) => debug!(handle = %handle, pool = %pool, amount = %amount, %err, "bet rejected"),
        }
        receipt
    }
}
