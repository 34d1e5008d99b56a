use paddock_types::{Address, Lamports, PoolId, RaceState, Signature};
use thiserror::Error;

/// Bad input from the caller. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("pool {pool} is out of range (1..={max})")]
    PoolOutOfRange { pool: PoolId, max: u16 },
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Lamports,
        requested: Lamports,
    },
    #[error("unknown user")]
    UnknownUser,
    #[error("user already exists with wallet {wallet}")]
    UserExists { wallet: Address },
    #[error("pool {0} has no bets")]
    UnknownPool(PoolId),
}

/// The race is not in a state that allows the operation. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("no race is accepting bets")]
    NoActiveRace,
    #[error("a race is still in progress")]
    RaceInProgress,
    #[error("race is {actual}, expected {expected}")]
    WrongState {
        expected: RaceState,
        actual: RaceState,
    },
    #[error("user already has a bet on this race")]
    DuplicateBet,
    #[error("race has reached its entry cap")]
    EntriesCapReached,
    #[error("race already resolved")]
    AlreadyResolved,
    #[error("no race exists")]
    NoRace,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A concurrent writer committed first. Safe to retry the whole transaction.
    #[error("write conflict")]
    Conflict,
    #[error("store backend: {0}")]
    Backend(String),
    #[error("corrupt document: {0}")]
    Corrupt(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("blockhash expired")]
    BlockhashExpired,
    /// The transaction was sent but not observed as confirmed in time. It may
    /// still land.
    #[error("confirmation timed out for {signature}")]
    ConfirmationTimeout { signature: Signature },
    #[error("rejected by program: {reason}")]
    Rejected { reason: String },
    #[error("missing signer {0}")]
    MissingSigner(Address),
    #[error("decode: {0}")]
    Decode(String),
}

impl ChainError {
    /// Whether resubmitting the same instructions may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transport(_) | ChainError::BlockhashExpired)
    }
}

/// Error returned by every engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error("gave up after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Store(StoreError::Conflict))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
