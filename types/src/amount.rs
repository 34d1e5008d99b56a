use crate::constants::{LAMPORTS_PER_SOL, SOL_DECIMALS};
use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use serde::{Deserialize, Serialize};
use std::{fmt, iter::Sum, str::FromStr};
use thiserror::Error as ThisError;

/// An amount of SOL expressed in its minor unit.
///
/// All ledger arithmetic happens on lamports so that pool totals and payouts
/// never drift through floating point rounding.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Lamports(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount must be greater than zero")]
    NotPositive,
    #[error("amount is malformed: {0}")]
    Malformed(String),
    #[error("amount has more than {SOL_DECIMALS} fractional digits")]
    TooPrecise,
    #[error("amount overflows")]
    Overflow,
}

impl Lamports {
    pub const ZERO: Lamports = Lamports(0);

    pub fn from_sol(sol: u64) -> Option<Self> {
        sol.checked_mul(LAMPORTS_PER_SOL).map(Self)
    }

    /// Parse a decimal SOL string ("1", "0.25", "2.000000001") into lamports.
    ///
    /// Zero and negative amounts are rejected.
    pub fn parse_sol(value: &str) -> Result<Self, AmountError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(AmountError::Empty);
        }
        if value.starts_with('-') {
            return Err(AmountError::NotPositive);
        }
        let value = value.strip_prefix('+').unwrap_or(value);
        let (whole, fraction) = match value.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (value, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(AmountError::Malformed(value.to_string()));
        }
        let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !digits(whole) || !digits(fraction) {
            return Err(AmountError::Malformed(value.to_string()));
        }
        if fraction.len() > SOL_DECIMALS {
            return Err(AmountError::TooPrecise);
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| AmountError::Overflow)?
        };
        let mut fraction_lamports = 0u64;
        if !fraction.is_empty() {
            let padded = format!("{fraction:0<width$}", width = SOL_DECIMALS);
            fraction_lamports = padded
                .parse()
                .map_err(|_| AmountError::Malformed(value.to_string()))?;
        }
        let lamports = whole
            .checked_mul(LAMPORTS_PER_SOL)
            .and_then(|w| w.checked_add(fraction_lamports))
            .ok_or(AmountError::Overflow)?;
        if lamports == 0 {
            return Err(AmountError::NotPositive);
        }
        Ok(Self(lamports))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Lamports) -> Option<Lamports> {
        self.0.checked_add(other.0).map(Lamports)
    }

    pub fn checked_sub(self, other: Lamports) -> Option<Lamports> {
        self.0.checked_sub(other.0).map(Lamports)
    }

    pub fn saturating_add(self, other: Lamports) -> Lamports {
        Lamports(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Lamports) -> Lamports {
        Lamports(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Lamports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / LAMPORTS_PER_SOL;
        let fraction = self.0 % LAMPORTS_PER_SOL;
        if fraction == 0 {
            return write!(f, "{whole} SOL");
        }
        let fraction = format!("{fraction:0width$}", width = SOL_DECIMALS);
        write!(f, "{whole}.{} SOL", fraction.trim_end_matches('0'))
    }
}

impl FromStr for Lamports {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_sol(s)
    }
}

impl Sum for Lamports {
    fn sum<I: Iterator<Item = Lamports>>(iter: I) -> Self {
        iter.fold(Lamports::ZERO, Lamports::saturating_add)
    }
}

impl From<u64> for Lamports {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Write for Lamports {
    fn write(&self, writer: &mut impl BufMut) {
        self.0.write(writer);
    }
}

impl Read for Lamports {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self(u64::read(reader)?))
    }
}

impl EncodeSize for Lamports {
    fn encode_size(&self) -> usize {
        u64::SIZE
    }
}
