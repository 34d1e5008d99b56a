//! Documents and wire types shared by the paddock settlement engine.

pub mod address;
pub use address::{Address, Blockhash, ParseError, Signature, ADDRESS_LEN};
pub mod amount;
pub use amount::{AmountError, Lamports};
pub mod chain;
pub use chain::{AccountMeta, CompileError, Instruction, LookupTable, Message, SignedTransaction};
pub mod constants;
pub mod program;
pub use program::{GamePlayer, GameSnapshot};
pub mod race;
pub use race::{LookupTableRecord, PoolId, PoolTotals, Race, RaceId, RaceState, SettlementStatus};
pub mod user;
pub use user::{User, UserBet};

/// Display name of a pool, if it is one of the default pools.
pub fn pool_name(pool: PoolId) -> Option<&'static str> {
    let index = usize::from(pool.0).checked_sub(1)?;
    constants::POOL_NAMES.get(index).copied()
}
