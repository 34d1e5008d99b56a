use crate::{Address, Lamports, PoolId, RaceId};
use serde::{Deserialize, Serialize};

/// A single stake placed by a user on a race.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBet {
    pub race_id: RaceId,
    pub pool: PoolId,
    pub amount: Lamports,
    /// Paid to the wallet on chain when the race settled. Zero for a losing
    /// bet; `None` until then.
    #[serde(default)]
    pub payout: Option<Lamports>,
}

/// A bettor, keyed by their front-end handle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub handle: String,
    pub wallet: Address,
    #[serde(default)]
    pub spent_funds: Lamports,
    /// Credits granted in the ledger only. Settlement pays winners to the
    /// wallet itself, so their payouts are not counted here.
    #[serde(default)]
    pub earned_funds: Lamports,
    /// At most one entry per race, in placement order.
    #[serde(default)]
    pub bets: Vec<UserBet>,
}

impl User {
    pub fn new(handle: impl Into<String>, wallet: Address) -> Self {
        Self {
            handle: handle.into(),
            wallet,
            spent_funds: Lamports::ZERO,
            earned_funds: Lamports::ZERO,
            bets: Vec::new(),
        }
    }

    pub fn bet_for(&self, race_id: RaceId) -> Option<&UserBet> {
        self.bets.iter().find(|bet| bet.race_id == race_id)
    }

    /// Note what the bet on `race_id` paid out. Returns false if the user has
    /// no bet on that race.
    pub fn record_payout(&mut self, race_id: RaceId, amount: Lamports) -> bool {
        match self.bets.iter_mut().find(|bet| bet.race_id == race_id) {
            Some(bet) => {
                bet.payout = Some(amount);
                true
            }
            None => false,
        }
    }

    /// Funds the user may still stake: wallet balance plus ledger winnings
    /// minus ledger stakes, floored at zero.
    pub fn available_balance(&self, wallet_balance: Lamports) -> Lamports {
        wallet_balance
            .saturating_add(self.earned_funds)
            .saturating_sub(self.spent_funds)
    }
}
