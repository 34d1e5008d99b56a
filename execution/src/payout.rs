//! Pari-mutuel payout computation.
//!
//! A winner staking `s` on a pool holding `T_win` out of `T_all` receives
//! `s * T_all / T_win`. Shares are floored in lamports and the rounding
//! remainder goes to the largest winning stake (smallest handle on ties), so
//! the payouts sum to exactly `T_all`.

use crate::{Error, StateError, StoreError};
use paddock_types::{Address, Lamports, PoolId, Race, RaceId, RaceState, User};
use serde::{Deserialize, Serialize};

/// What happens to the stakes when nobody backed the winning pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnclaimedPoolPolicy {
    /// Pay nothing; every stake is reported as unclaimed.
    #[default]
    Retain,
    /// Return every stake to its bettor.
    Refund,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payout {
    pub handle: String,
    pub wallet: Address,
    pub pool: PoolId,
    pub stake: Lamports,
    /// Zero for losing bets.
    pub amount: Lamports,
}

/// Resolution of one finished race. `entries` holds every bettor, ordered by handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payouts {
    pub race_id: RaceId,
    pub winning_pool: PoolId,
    pub total_stake: Lamports,
    pub winning_stake: Lamports,
    /// Stake left undistributed.
    pub unclaimed: Lamports,
    pub entries: Vec<Payout>,
}

impl Payouts {
    pub fn total_paid(&self) -> Lamports {
        self.entries.iter().map(|entry| entry.amount).sum()
    }

    pub fn winners(&self) -> impl Iterator<Item = &Payout> {
        self.entries.iter().filter(|entry| !entry.amount.is_zero())
    }

    /// Bettor wallets with the amount owed to each, in entry order.
    pub fn participants(&self) -> Vec<(Address, Lamports)> {
        self.entries
            .iter()
            .map(|entry| (entry.wallet, entry.amount))
            .collect()
    }

    /// Pools that received at least one bet.
    pub fn active_pools(&self) -> Vec<PoolId> {
        let mut pools: Vec<PoolId> = self.entries.iter().map(|entry| entry.pool).collect();
        pools.sort();
        pools.dedup();
        pools
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PayoutResolver {
    policy: UnclaimedPoolPolicy,
}

impl PayoutResolver {
    pub fn new(policy: UnclaimedPoolPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> UnclaimedPoolPolicy {
        self.policy
    }

    /// Compute payouts for a finished race from its pool totals and the bets
    /// of `bettors`.
    pub fn resolve(&self, race: &Race, bettors: &[User]) -> Result<Payouts, Error> {
        if race.state != RaceState::Finished {
            return Err(StateError::WrongState {
                expected: RaceState::Finished,
                actual: race.state,
            }
            .into());
        }
        let winning_pool = race
            .winning_pool
            .ok_or_else(|| corrupt(race.id, "finished race has no winning pool"))?;

        let mut entries: Vec<Payout> = bettors
            .iter()
            .filter_map(|user| {
                user.bet_for(race.id).map(|bet| Payout {
                    handle: user.handle.clone(),
                    wallet: user.wallet,
                    pool: bet.pool,
                    stake: bet.amount,
                    amount: Lamports::ZERO,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.handle.cmp(&b.handle));

        let total_stake = race.total_stake();
        let winning_stake = race
            .pool(winning_pool)
            .map(|totals| totals.total_stake)
            .unwrap_or(Lamports::ZERO);

        let staked: Lamports = entries.iter().map(|entry| entry.stake).sum();
        if staked != total_stake {
            return Err(corrupt(race.id, "pool totals disagree with recorded bets"));
        }

        let mut payouts = Payouts {
            race_id: race.id,
            winning_pool,
            total_stake,
            winning_stake,
            unclaimed: Lamports::ZERO,
            entries,
        };

        if winning_stake.is_zero() {
            match self.policy {
                UnclaimedPoolPolicy::Retain => payouts.unclaimed = total_stake,
                UnclaimedPoolPolicy::Refund => {
                    for entry in &mut payouts.entries {
                        entry.amount = entry.stake;
                    }
                }
            }
            return Ok(payouts);
        }

        let winning_staked: Lamports = payouts
            .entries
            .iter()
            .filter(|entry| entry.pool == winning_pool)
            .map(|entry| entry.stake)
            .sum();
        if winning_staked != winning_stake {
            return Err(corrupt(race.id, "winning pool total disagrees with its bets"));
        }

        let t_all = total_stake.get() as u128;
        let t_win = winning_stake.get() as u128;
        let mut distributed = 0u128;
        for entry in payouts
            .entries
            .iter_mut()
            .filter(|entry| entry.pool == winning_pool)
        {
            let share = entry.stake.get() as u128 * t_all / t_win;
            distributed += share;
            entry.amount = Lamports(share as u64);
        }

        // Entries are sorted by handle, so the first maximum wins ties.
        let remainder = (t_all - distributed) as u64;
        if remainder > 0 {
            let largest = payouts
                .entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| entry.pool == winning_pool)
                .fold(None, |best: Option<(usize, Lamports)>, (index, entry)| match best {
                    Some((_, stake)) if stake >= entry.stake => best,
                    _ => Some((index, entry.stake)),
                });
            let (index, _) =
                largest.ok_or_else(|| corrupt(race.id, "winning pool has no bettors"))?;
            let entry = &mut payouts.entries[index];
            entry.amount = entry.amount.saturating_add(Lamports(remainder));
        }
        Ok(payouts)
    }
}

fn corrupt(race_id: RaceId, message: &str) -> Error {
    StoreError::Corrupt(format!("race {race_id}: {message}")).into()
}
