//! Chain client collaborator.

use crate::ChainError;
use paddock_types::{
    Address, GameSnapshot, Instruction, Lamports, LookupTable, PoolId, Signature,
};
use std::future::Future;

/// Instructions to land in one transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Submission {
    pub instructions: Vec<Instruction>,
    /// Accounts that must sign besides the fee payer.
    pub signers: Vec<Address>,
    /// Tables the message may resolve accounts through.
    pub lookup_tables: Vec<LookupTable>,
}

impl Submission {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            instructions,
            ..Default::default()
        }
    }

    pub fn with_lookup_table(mut self, table: LookupTable) -> Self {
        self.lookup_tables.push(table);
        self
    }
}

/// Chain-side view of a previously sent transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Confirmed,
    /// Known to the network but not yet confirmed.
    Pending,
    /// Landed and failed.
    Failed(String),
    /// Unknown to the network and its blockhash has expired.
    Dropped,
}

/// Builds, signs, submits and confirms transactions against the race program.
pub trait ChainClient: Clone + Send + Sync + 'static {
    /// Account that signs and pays for every submission.
    fn authority(&self) -> Address;

    fn query_race_state(&self) -> impl Future<Output = Result<GameSnapshot, ChainError>> + Send;

    fn wallet_balance(
        &self,
        wallet: &Address,
    ) -> impl Future<Output = Result<Lamports, ChainError>> + Send;

    fn build_place_bet_instruction(
        &self,
        payer: &Address,
        pool: PoolId,
        amount: Lamports,
    ) -> Instruction;

    /// `participants` pairs each bettor wallet with the amount owed to it.
    fn build_resolve_instructions(
        &self,
        winning_pool: PoolId,
        active_pools: &[PoolId],
        participants: &[(Address, Lamports)],
    ) -> Vec<Instruction>;

    /// Returns the create instruction and the address the table will have.
    fn create_lookup_table(
        &self,
        authority: &Address,
    ) -> impl Future<Output = Result<(Instruction, Address), ChainError>> + Send;

    fn extend_lookup_table(&self, table: &Address, addresses: &[Address]) -> Instruction;

    fn close_lookup_table(&self, table: &Address) -> Instruction;

    /// Whether `table` is a live account. False for a table whose create
    /// never landed or that has been closed.
    fn lookup_table_exists(
        &self,
        table: &Address,
    ) -> impl Future<Output = Result<bool, ChainError>> + Send;

    /// Sign, send and wait for confirmation.
    fn submit_and_confirm(
        &self,
        submission: Submission,
    ) -> impl Future<Output = Result<Signature, ChainError>> + Send;

    fn signature_status(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = Result<TxStatus, ChainError>> + Send;
}
