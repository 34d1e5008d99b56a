use crate::{Address, Lamports, Signature};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequential race identifier. Races are never deleted, so the latest id is
/// always the only race that can still be open.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RaceId(pub u64);

impl RaceId {
    pub const FIRST: RaceId = RaceId(1);

    pub fn next(self) -> RaceId {
        RaceId(self.0.saturating_add(1))
    }
}

impl fmt::Display for RaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the mutually exclusive outcomes of a race. Pools are numbered from 1.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PoolId(pub u16);

impl PoolId {
    /// Seed bytes for the pool treasury account.
    pub fn seed(self) -> [u8; 2] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Write for PoolId {
    fn write(&self, writer: &mut impl BufMut) {
        self.0.write(writer);
    }
}

impl Read for PoolId {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self(u16::read(reader)?))
    }
}

impl EncodeSize for PoolId {
    fn encode_size(&self) -> usize {
        u16::SIZE
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaceState {
    /// Accepting bets.
    Created,
    /// Racing; no further bets.
    Started,
    /// Winning pool stamped.
    Finished,
}

impl RaceState {
    /// The only state a race may move to from `self`.
    pub fn successor(self) -> Option<RaceState> {
        match self {
            RaceState::Created => Some(RaceState::Started),
            RaceState::Started => Some(RaceState::Finished),
            RaceState::Finished => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RaceState::Created => "created",
            RaceState::Started => "started",
            RaceState::Finished => "finished",
        }
    }
}

impl fmt::Display for RaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Totals accumulated for one pool of a race.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolTotals {
    pub pool: PoolId,
    pub total_bets: u32,
    pub total_stake: Lamports,
}

impl PoolTotals {
    pub fn empty(pool: PoolId) -> Self {
        Self {
            pool,
            total_bets: 0,
            total_stake: Lamports::ZERO,
        }
    }
}

/// Chain-side progress of a finished race's payout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SettlementStatus {
    /// Nothing has been confirmed on chain.
    #[default]
    Unsettled,
    /// A settler claimed the race and may be sending right now. Others leave
    /// it alone until the claim is older than the settlement lease.
    Submitting { claimed_at_ms: u64 },
    /// Submitted but unconfirmed; the transaction may still land.
    InFlight { signature: Signature },
    /// The program rejected the settlement. Only an operator retry moves on.
    Rejected { reason: String },
    /// Confirmed and recorded in the ledger. `None` when nothing had to be
    /// submitted (a race without bets).
    Settled { signature: Option<Signature> },
}

impl SettlementStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, SettlementStatus::Settled { .. })
    }

    /// Whether a claim made at `claimed_at_ms` still holds at `now_ms`.
    pub fn is_claimed(&self, now_ms: u64, lease_ms: u64) -> bool {
        matches!(self, SettlementStatus::Submitting { claimed_at_ms }
            if now_ms.saturating_sub(*claimed_at_ms) < lease_ms)
    }
}

/// A betting round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Race {
    pub id: RaceId,
    pub state: RaceState,
    pub created_by: String,
    pub created_at_ms: u64,
    /// Set when betting closes and the race starts.
    #[serde(default)]
    pub started_at_ms: Option<u64>,
    /// Set together with `started_at_ms`.
    #[serde(default)]
    pub ends_at_ms: Option<u64>,
    /// Set if and only if `state == Finished`.
    #[serde(default)]
    pub winning_pool: Option<PoolId>,
    /// Sorted by pool id; one entry per pool that received a bet.
    #[serde(default)]
    pub pools: Vec<PoolTotals>,
    #[serde(default)]
    pub settlement: SettlementStatus,
}

impl Race {
    pub fn new(id: RaceId, created_by: impl Into<String>, created_at_ms: u64) -> Self {
        Self {
            id,
            state: RaceState::Created,
            created_by: created_by.into(),
            created_at_ms,
            started_at_ms: None,
            ends_at_ms: None,
            winning_pool: None,
            pools: Vec::new(),
            settlement: SettlementStatus::Unsettled,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state != RaceState::Finished
    }

    pub fn accepts_bets(&self) -> bool {
        self.state == RaceState::Created
    }

    pub fn has_ended(&self, now_ms: u64) -> bool {
        matches!(self.ends_at_ms, Some(ends_at) if now_ms >= ends_at)
    }

    pub fn pool(&self, pool: PoolId) -> Option<&PoolTotals> {
        self.pools.iter().find(|totals| totals.pool == pool)
    }

    /// Add a stake to `pool`, creating its entry on the first bet.
    pub fn record_stake(&mut self, pool: PoolId, amount: Lamports) -> Option<PoolTotals> {
        let index = match self.pools.binary_search_by_key(&pool, |totals| totals.pool) {
            Ok(index) => index,
            Err(index) => {
                self.pools.insert(index, PoolTotals::empty(pool));
                index
            }
        };
        let totals = &mut self.pools[index];
        let total_bets = totals.total_bets.checked_add(1)?;
        let total_stake = totals.total_stake.checked_add(amount)?;
        totals.total_bets = total_bets;
        totals.total_stake = total_stake;
        Some(*totals)
    }

    pub fn total_stake(&self) -> Lamports {
        self.pools.iter().map(|totals| totals.total_stake).sum()
    }

    pub fn total_entries(&self) -> usize {
        self.pools
            .iter()
            .map(|totals| totals.total_bets as usize)
            .sum()
    }
}

/// Bookkeeping for a lookup table created during settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupTableRecord {
    pub address: Address,
    pub created_at_ms: u64,
    #[serde(default)]
    pub closed: bool,
}

impl LookupTableRecord {
    pub fn new(address: Address, created_at_ms: u64) -> Self {
        Self {
            address,
            created_at_ms,
            closed: false,
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_at_ms)
    }
}
