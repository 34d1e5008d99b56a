//! Paddock race settlement engine.
//!
//! This crate holds the race lifecycle ([RaceLedger]), bet placement
//! ([BetAccountingEngine]), pari-mutuel payouts ([PayoutResolver]), chain
//! settlement ([ChainSettlementBatcher], [LookupTableSweeper]) and the
//! periodic driver tying them together ([ResolutionScheduler]).
//!
//! ## Collaborators
//! The engine owns no state. Races, users and lookup table records live in a
//! [LedgerStore]; the chain is reached through a [ChainClient]. Both are
//! passed to each component's constructor.
//!
//! ## Exactly-once payouts
//! - Bet rules are checked inside the transaction that writes the bet.
//! - The chain pays winners into their wallets. The ledger records each bet's
//!   payout in the same transaction that marks a race settled, and only after
//!   the chain confirmed it. Payouts never touch `earned_funds`.
//! - Only the settler holding the `Submitting` claim sends a settlement.
//! - A settled race is never submitted again; an unconfirmed one is looked up
//!   by signature before anything new is sent.
//!
//! ## Example
//! ```rust,ignore
//! # #[cfg(feature = "mocks")]
//! # {
//! use paddock_execution::{mocks::{MemoryStore, MockChain}, EngineConfig, ResolutionScheduler};
//!
//! # async fn example() -> Result<(), paddock_execution::Error> {
//! let scheduler = ResolutionScheduler::new(
//!     MemoryStore::default(),
//!     MockChain::default(),
//!     EngineConfig::default(),
//! );
//! let outcome = scheduler.tick(/* now_ms */ 0).await?;
//! # Ok(())
//! # }
//! # }
//! ```

pub mod accounting;
mod backoff;
pub mod chain;
mod config;
mod error;
pub mod payout;
pub mod race_ledger;
pub mod scheduler;
pub mod settlement;
pub mod store;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

#[cfg(test)]
mod concurrency_tests;
#[cfg(test)]
mod settlement_tests;

pub use accounting::{BetAccountingEngine, BetReceipt};
pub use backoff::RetryPolicy;
pub use chain::{ChainClient, Submission, TxStatus};
pub use config::EngineConfig;
pub use error::{ChainError, Error, Result, StateError, StoreError, ValidationError};
pub use payout::{Payout, PayoutResolver, Payouts, UnclaimedPoolPolicy};
pub use race_ledger::RaceLedger;
pub use scheduler::{ResolutionScheduler, TickOutcome};
pub use settlement::{ChainSettlementBatcher, LookupTableSweeper, SettleOutcome, SweepReport};
pub use store::{transact_with_retry, LedgerStore, LedgerTx};
