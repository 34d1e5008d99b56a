//! In-memory collaborators for tests.

use crate::{
    chain::{Submission, TxStatus},
    ChainClient, ChainError, Error, LedgerStore, LedgerTx, StoreError,
};
use paddock_types::{
    program, Address, GameSnapshot, Instruction, Lamports, LookupTableRecord, PoolId, Race,
    RaceId, Signature, User,
};
use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

#[derive(Clone, Debug, Default)]
struct Documents {
    races: BTreeMap<RaceId, Race>,
    users: BTreeMap<String, User>,
    tables: BTreeMap<Address, LookupTableRecord>,
}

struct MemoryTx {
    docs: Documents,
    dirty: bool,
}

impl LedgerTx for MemoryTx {
    fn latest_race(&mut self) -> Result<Option<Race>, StoreError> {
        Ok(self.docs.races.values().next_back().cloned())
    }

    fn race(&mut self, id: RaceId) -> Result<Option<Race>, StoreError> {
        Ok(self.docs.races.get(&id).cloned())
    }

    fn put_race(&mut self, race: &Race) -> Result<(), StoreError> {
        self.dirty = true;
        self.docs.races.insert(race.id, race.clone());
        Ok(())
    }

    fn user(&mut self, handle: &str) -> Result<Option<User>, StoreError> {
        Ok(self.docs.users.get(handle).cloned())
    }

    fn put_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.dirty = true;
        self.docs.users.insert(user.handle.clone(), user.clone());
        Ok(())
    }

    fn bettors(&mut self, race_id: RaceId) -> Result<Vec<User>, StoreError> {
        Ok(self
            .docs
            .users
            .values()
            .filter(|user| user.bet_for(race_id).is_some())
            .cloned()
            .collect())
    }

    fn lookup_tables(&mut self) -> Result<Vec<LookupTableRecord>, StoreError> {
        Ok(self.docs.tables.values().cloned().collect())
    }

    fn put_lookup_table(&mut self, record: &LookupTableRecord) -> Result<(), StoreError> {
        self.dirty = true;
        self.docs.tables.insert(record.address, record.clone());
        Ok(())
    }

    fn remove_lookup_table(&mut self, address: &Address) -> Result<(), StoreError> {
        self.dirty = true;
        self.docs.tables.remove(address);
        Ok(())
    }
}

/// A serializable in-memory store.
///
/// Each transaction works on a private copy of every document and publishes it
/// only on success. [MemoryStore::fail_next_commits] makes the next writing
/// transactions lose with `StoreError::Conflict`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    docs: Arc<Mutex<Documents>>,
    failures: Arc<Mutex<u32>>,
    commits: Arc<Mutex<u64>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn fail_next_commits(&self, count: u32) {
        *lock(&self.failures) = count;
    }

    /// Transactions that wrote and committed.
    pub fn commits(&self) -> u64 {
        *lock(&self.commits)
    }

    pub fn races(&self) -> Vec<Race> {
        lock(&self.docs).races.values().cloned().collect()
    }

    pub fn users(&self) -> Vec<User> {
        lock(&self.docs).users.values().cloned().collect()
    }

    pub fn lookup_tables(&self) -> Vec<LookupTableRecord> {
        lock(&self.docs).tables.values().cloned().collect()
    }

    pub fn insert_lookup_table(&self, record: LookupTableRecord) {
        lock(&self.docs).tables.insert(record.address, record);
    }

    /// Mutate a race outside any transaction.
    pub fn update_race(&self, id: RaceId, f: impl FnOnce(&mut Race)) {
        if let Some(race) = lock(&self.docs).races.get_mut(&id) {
            f(race);
        }
    }

    /// Mutate a user outside any transaction.
    pub fn update_user(&self, handle: &str, f: impl FnOnce(&mut User)) {
        if let Some(user) = lock(&self.docs).users.get_mut(handle) {
            f(user);
        }
    }
}

impl LedgerStore for MemoryStore {
    async fn transact<T, F>(&self, f: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, Error> + Send + 'static,
    {
        // Yield so concurrent callers interleave between transactions.
        tokio::task::yield_now().await;

        let mut docs = lock(&self.docs);
        let mut tx = MemoryTx {
            docs: docs.clone(),
            dirty: false,
        };
        let value = f(&mut tx)?;
        if !tx.dirty {
            return Ok(value);
        }
        {
            let mut failures = lock(&self.failures);
            if *failures > 0 {
                *failures -= 1;
                return Err(StoreError::Conflict.into());
            }
        }
        *docs = tx.docs;
        *lock(&self.commits) += 1;
        Ok(value)
    }
}

/// Outcome the mock chain reports for one submission.
#[derive(Clone, Debug)]
pub enum Scripted {
    Confirm,
    Fail(ChainError),
    /// Send succeeds but confirmation times out; the signature's status is
    /// left as given. A `Pending` submission lands if its status is later
    /// set to `Confirmed`.
    Timeout(TxStatus),
}

#[derive(Default)]
struct ChainState {
    balances: HashMap<Address, Lamports>,
    snapshot: GameSnapshot,
    script: VecDeque<Scripted>,
    statuses: HashMap<Signature, TxStatus>,
    confirmed: Vec<Submission>,
    pending: HashMap<Signature, Submission>,
    tables: HashSet<Address>,
    attempts: usize,
    slot: u64,
    next_signature: u64,
}

/// A scripted chain. Submissions confirm unless an outcome was queued with
/// [MockChain::script].
#[derive(Clone)]
pub struct MockChain {
    program: Address,
    authority: Address,
    state: Arc<Mutex<ChainState>>,
}

impl ChainState {
    /// Apply a confirmed submission: credit resolve payouts to wallets and
    /// track lookup tables it creates or closes.
    fn land(&mut self, submission: Submission) {
        for instruction in &submission.instructions {
            if let Some(transfers) = program::resolve_transfers(instruction) {
                for (wallet, amount) in transfers {
                    let balance = self.balances.entry(wallet).or_insert(Lamports::ZERO);
                    *balance = balance.saturating_add(amount);
                }
            }
            let Some(table) = instruction.accounts.first().map(|meta| meta.address) else {
                continue;
            };
            match MockChain::lookup_table_tag(instruction) {
                Some(0) => {
                    self.tables.insert(table);
                }
                Some(2) => {
                    self.tables.remove(&table);
                }
                _ => {}
            }
        }
        self.confirmed.push(submission);
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new(Address([0xA0; 32]), Address([0xB0; 32]))
    }
}

impl MockChain {
    pub fn new(program: Address, authority: Address) -> Self {
        Self {
            program,
            authority,
            state: Arc::new(Mutex::new(ChainState::default())),
        }
    }

    pub fn program(&self) -> Address {
        self.program
    }

    pub fn set_balance(&self, wallet: Address, balance: Lamports) {
        lock(&self.state).balances.insert(wallet, balance);
    }

    pub fn set_snapshot(&self, snapshot: GameSnapshot) {
        lock(&self.state).snapshot = snapshot;
    }

    pub fn script(&self, outcome: Scripted) {
        lock(&self.state).script.push_back(outcome);
    }

    pub fn set_status(&self, signature: &Signature, status: TxStatus) {
        let mut state = lock(&self.state);
        if status != TxStatus::Pending {
            if let Some(submission) = state.pending.remove(signature) {
                if status == TxStatus::Confirmed {
                    state.land(submission);
                }
            }
        }
        state.statuses.insert(signature.clone(), status);
    }

    pub fn balance(&self, wallet: &Address) -> Lamports {
        lock(&self.state)
            .balances
            .get(wallet)
            .copied()
            .unwrap_or(Lamports::ZERO)
    }

    /// Make `table` exist as if its create had landed.
    pub fn insert_lookup_table(&self, table: Address) {
        lock(&self.state).tables.insert(table);
    }

    /// Lookup tables that currently exist.
    pub fn lookup_tables(&self) -> Vec<Address> {
        let mut tables: Vec<Address> = lock(&self.state).tables.iter().copied().collect();
        tables.sort();
        tables
    }

    /// Submissions attempted, including failed ones.
    pub fn attempts(&self) -> usize {
        lock(&self.state).attempts
    }

    /// Submissions that confirmed, in order.
    pub fn confirmed(&self) -> Vec<Submission> {
        lock(&self.state).confirmed.clone()
    }

    fn count_confirmed(&self, matches: impl Fn(&Instruction) -> bool) -> usize {
        lock(&self.state)
            .confirmed
            .iter()
            .filter(|submission| submission.instructions.iter().any(&matches))
            .count()
    }

    fn lookup_table_tag(instruction: &Instruction) -> Option<u8> {
        (instruction.program_id == Address::LOOKUP_TABLE_PROGRAM)
            .then(|| instruction.data.first().copied())
            .flatten()
    }

    pub fn lookup_table_creates(&self) -> usize {
        self.count_confirmed(|ix| Self::lookup_table_tag(ix) == Some(0))
    }

    pub fn lookup_table_extends(&self) -> usize {
        self.count_confirmed(|ix| Self::lookup_table_tag(ix) == Some(1))
    }

    pub fn lookup_table_closes(&self) -> usize {
        self.count_confirmed(|ix| Self::lookup_table_tag(ix) == Some(2))
    }

    /// Confirmed submissions that touched the race program.
    pub fn settlements(&self) -> usize {
        let program = self.program;
        self.count_confirmed(move |ix| ix.program_id == program)
    }
}

impl ChainClient for MockChain {
    fn authority(&self) -> Address {
        self.authority
    }

    async fn query_race_state(&self) -> Result<GameSnapshot, ChainError> {
        Ok(lock(&self.state).snapshot.clone())
    }

    async fn wallet_balance(&self, wallet: &Address) -> Result<Lamports, ChainError> {
        Ok(self.balance(wallet))
    }

    fn build_place_bet_instruction(
        &self,
        payer: &Address,
        pool: PoolId,
        amount: Lamports,
    ) -> Instruction {
        program::place_bet(&self.program, payer, pool, amount)
    }

    fn build_resolve_instructions(
        &self,
        winning_pool: PoolId,
        active_pools: &[PoolId],
        participants: &[(Address, Lamports)],
    ) -> Vec<Instruction> {
        vec![
            program::pre_resolve(&self.program, &self.authority, active_pools),
            program::resolve_bet(&self.program, &self.authority, winning_pool, participants),
        ]
    }

    async fn create_lookup_table(
        &self,
        authority: &Address,
    ) -> Result<(Instruction, Address), ChainError> {
        let slot = {
            let mut state = lock(&self.state);
            state.slot += 1;
            state.slot
        };
        Ok(program::create_lookup_table(authority, slot))
    }

    fn extend_lookup_table(&self, table: &Address, addresses: &[Address]) -> Instruction {
        program::extend_lookup_table(table, &self.authority, addresses)
    }

    fn close_lookup_table(&self, table: &Address) -> Instruction {
        program::close_lookup_table(table, &self.authority)
    }

    async fn lookup_table_exists(&self, table: &Address) -> Result<bool, ChainError> {
        Ok(lock(&self.state).tables.contains(table))
    }

    async fn submit_and_confirm(&self, submission: Submission) -> Result<Signature, ChainError> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        state.attempts += 1;
        if let Some(signer) = submission
            .signers
            .iter()
            .find(|signer| **signer != self.authority)
        {
            return Err(ChainError::MissingSigner(*signer));
        }
        let outcome = state.script.pop_front().unwrap_or(Scripted::Confirm);
        match outcome {
            Scripted::Fail(err) => Err(err),
            Scripted::Confirm => {
                state.next_signature += 1;
                let signature = Signature(format!("sig{}", state.next_signature));
                state.statuses.insert(signature.clone(), TxStatus::Confirmed);
                state.land(submission);
                Ok(signature)
            }
            Scripted::Timeout(status) => {
                state.next_signature += 1;
                let signature = Signature(format!("sig{}", state.next_signature));
                match &status {
                    TxStatus::Confirmed => state.land(submission),
                    TxStatus::Pending => {
                        state.pending.insert(signature.clone(), submission);
                    }
                    TxStatus::Failed(_) | TxStatus::Dropped => {}
                }
                state.statuses.insert(signature.clone(), status);
                Err(ChainError::ConfirmationTimeout { signature })
            }
        }
    }

    async fn signature_status(&self, signature: &Signature) -> Result<TxStatus, ChainError> {
        Ok(lock(&self.state)
            .statuses
            .get(signature)
            .cloned()
            .unwrap_or(TxStatus::Dropped))
    }
}
