//! Payloads understood by the race program and the native programs settlement
//! relies on, plus the account layouts each instruction expects.

use crate::{
    chain::{AccountMeta, Instruction},
    constants::{GAME_SEED, GLOBAL_SEED, MAX_GAME_PLAYERS, MAX_INSTRUCTION_ACCOUNTS},
    Address, Lamports, PoolId,
};
use bytes::{Buf, BufMut};
use commonware_codec::{
    DecodeExt, Encode, EncodeSize, Error, FixedSize, RangeCfg, Read, ReadExt, Write,
};

/// Game config account.
pub fn game_address(program: &Address) -> Address {
    Address::derive(program, &[GAME_SEED])
}

/// Treasury holding the stakes of one pool.
pub fn pool_treasury(program: &Address, pool: PoolId) -> Address {
    Address::derive(program, &[GAME_SEED, &pool.seed()])
}

/// Treasury that losing pools are swept into before payout.
pub fn global_treasury(program: &Address) -> Address {
    Address::derive(program, &[GLOBAL_SEED])
}

/// Address a lookup table created by `authority` at `recent_slot` will have.
pub fn lookup_table_address(authority: &Address, recent_slot: u64) -> Address {
    Address::derive(
        &Address::LOOKUP_TABLE_PROGRAM,
        &[authority.as_ref(), &recent_slot.to_le_bytes()],
    )
}

/// Race program instructions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProgramInstruction {
    /// Escrow a stake in the pool treasury.
    ///
    /// Accounts: `[payer (signer), game, pool treasury, system program]`
    PlaceBet { pool: PoolId, amount: Lamports },

    /// Sweep every active pool treasury into the global treasury.
    ///
    /// Accounts: `[authority (signer), game, global treasury, system program, ..pool treasuries]`
    PreResolve,

    /// Pay winners from the global treasury. `payouts[i]` is owed to the
    /// i-th trailing account.
    ///
    /// Accounts: `[authority (signer), game, global treasury, system program, ..participants]`
    ResolveBet {
        winning_pool: PoolId,
        payouts: Vec<Lamports>,
    },
}

impl ProgramInstruction {
    const PLACE_BET: u8 = 0;
    const PRE_RESOLVE: u8 = 1;
    const RESOLVE_BET: u8 = 2;
}

impl Write for ProgramInstruction {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::PlaceBet { pool, amount } => {
                Self::PLACE_BET.write(writer);
                pool.write(writer);
                amount.write(writer);
            }
            Self::PreResolve => Self::PRE_RESOLVE.write(writer),
            Self::ResolveBet {
                winning_pool,
                payouts,
            } => {
                Self::RESOLVE_BET.write(writer);
                winning_pool.write(writer);
                payouts.write(writer);
            }
        }
    }
}

impl Read for ProgramInstruction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let kind = u8::read(reader)?;
        let instruction = match kind {
            Self::PLACE_BET => Self::PlaceBet {
                pool: PoolId::read(reader)?,
                amount: Lamports::read(reader)?,
            },
            Self::PRE_RESOLVE => Self::PreResolve,
            Self::RESOLVE_BET => Self::ResolveBet {
                winning_pool: PoolId::read(reader)?,
                payouts: Vec::<Lamports>::read_cfg(
                    reader,
                    &(RangeCfg::from(0..=MAX_INSTRUCTION_ACCOUNTS), ()),
                )?,
            },
            i => return Err(Error::InvalidEnum(i)),
        };
        Ok(instruction)
    }
}

impl EncodeSize for ProgramInstruction {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::PlaceBet { pool, amount } => pool.encode_size() + amount.encode_size(),
                Self::PreResolve => 0,
                Self::ResolveBet {
                    winning_pool,
                    payouts,
                } => winning_pool.encode_size() + payouts.encode_size(),
            }
    }
}

/// Native lookup table program instructions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupTableInstruction {
    /// Accounts: `[table, authority (signer), payer (signer), system program]`
    Create { recent_slot: u64 },
    /// Accounts: `[table, authority (signer), payer (signer), system program]`
    Extend { addresses: Vec<Address> },
    /// Accounts: `[table, authority (signer), recipient]`
    Close,
}

impl Write for LookupTableInstruction {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Create { recent_slot } => {
                0u8.write(writer);
                recent_slot.write(writer);
            }
            Self::Extend { addresses } => {
                1u8.write(writer);
                addresses.write(writer);
            }
            Self::Close => 2u8.write(writer),
        }
    }
}

impl Read for LookupTableInstruction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::Create {
                recent_slot: u64::read(reader)?,
            }),
            1 => Ok(Self::Extend {
                addresses: Vec::<Address>::read_cfg(
                    reader,
                    &(
                        RangeCfg::from(1..=crate::constants::MAX_LOOKUP_TABLE_ADDRESSES),
                        (),
                    ),
                )?,
            }),
            2 => Ok(Self::Close),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for LookupTableInstruction {
    fn encode_size(&self) -> usize {
        u8::SIZE
            + match self {
                Self::Create { recent_slot } => recent_slot.encode_size(),
                Self::Extend { addresses } => addresses.encode_size(),
                Self::Close => 0,
            }
    }
}

/// Compute budget program instructions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComputeBudgetInstruction {
    SetComputeUnitPrice { micro_lamports: u64 },
}

impl Write for ComputeBudgetInstruction {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::SetComputeUnitPrice { micro_lamports } => {
                3u8.write(writer);
                micro_lamports.write(writer);
            }
        }
    }
}

impl Read for ComputeBudgetInstruction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            3 => Ok(Self::SetComputeUnitPrice {
                micro_lamports: u64::read(reader)?,
            }),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for ComputeBudgetInstruction {
    fn encode_size(&self) -> usize {
        u8::SIZE + u64::SIZE
    }
}

/// A stake recorded by the on-chain game account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GamePlayer {
    pub user: Address,
    pub pool: PoolId,
    pub amount: Lamports,
}

impl Write for GamePlayer {
    fn write(&self, writer: &mut impl BufMut) {
        self.user.write(writer);
        self.pool.write(writer);
        self.amount.write(writer);
    }
}

impl Read for GamePlayer {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            user: Address::read(reader)?,
            pool: PoolId::read(reader)?,
            amount: Lamports::read(reader)?,
        })
    }
}

impl EncodeSize for GamePlayer {
    fn encode_size(&self) -> usize {
        self.user.encode_size() + self.pool.encode_size() + self.amount.encode_size()
    }
}

/// Decoded contents of the game config account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GameSnapshot {
    /// Unix seconds.
    pub started_at: u64,
    /// Seconds.
    pub duration: u64,
    pub resolved: bool,
    pub winning_pool: Option<PoolId>,
    pub players: Vec<GamePlayer>,
    pub active_pools: Vec<PoolId>,
}

impl GameSnapshot {
    pub fn ends_at(&self) -> u64 {
        self.started_at.saturating_add(self.duration)
    }
}

impl Write for GameSnapshot {
    fn write(&self, writer: &mut impl BufMut) {
        self.started_at.write(writer);
        self.duration.write(writer);
        self.resolved.write(writer);
        self.winning_pool.write(writer);
        self.players.write(writer);
        self.active_pools.write(writer);
    }
}

impl Read for GameSnapshot {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            started_at: u64::read(reader)?,
            duration: u64::read(reader)?,
            resolved: bool::read(reader)?,
            winning_pool: Option::<PoolId>::read(reader)?,
            players: Vec::<GamePlayer>::read_cfg(
                reader,
                &(RangeCfg::from(0..=MAX_GAME_PLAYERS), ()),
            )?,
            active_pools: Vec::<PoolId>::read_cfg(
                reader,
                &(RangeCfg::from(0..=u16::MAX as usize), ()),
            )?,
        })
    }
}

impl EncodeSize for GameSnapshot {
    fn encode_size(&self) -> usize {
        self.started_at.encode_size()
            + self.duration.encode_size()
            + self.resolved.encode_size()
            + self.winning_pool.encode_size()
            + self.players.encode_size()
            + self.active_pools.encode_size()
    }
}

pub fn place_bet(program: &Address, payer: &Address, pool: PoolId, amount: Lamports) -> Instruction {
    Instruction {
        program_id: *program,
        accounts: vec![
            AccountMeta::signer(*payer),
            AccountMeta::writable(game_address(program)),
            AccountMeta::writable(pool_treasury(program, pool)),
            AccountMeta::readonly(Address::SYSTEM_PROGRAM),
        ],
        data: ProgramInstruction::PlaceBet { pool, amount }.encode().to_vec(),
    }
}

fn authority_accounts(program: &Address, authority: &Address) -> Vec<AccountMeta> {
    vec![
        AccountMeta::signer(*authority),
        AccountMeta::writable(game_address(program)),
        AccountMeta::writable(global_treasury(program)),
        AccountMeta::readonly(Address::SYSTEM_PROGRAM),
    ]
}

pub fn pre_resolve(program: &Address, authority: &Address, active_pools: &[PoolId]) -> Instruction {
    let mut accounts = authority_accounts(program, authority);
    accounts.extend(
        active_pools
            .iter()
            .map(|pool| AccountMeta::writable(pool_treasury(program, *pool))),
    );
    Instruction {
        program_id: *program,
        accounts,
        data: ProgramInstruction::PreResolve.encode().to_vec(),
    }
}

pub fn resolve_bet(
    program: &Address,
    authority: &Address,
    winning_pool: PoolId,
    participants: &[(Address, Lamports)],
) -> Instruction {
    let mut accounts = authority_accounts(program, authority);
    accounts.extend(
        participants
            .iter()
            .map(|(wallet, _)| AccountMeta::writable(*wallet)),
    );
    let payouts = participants.iter().map(|(_, amount)| *amount).collect();
    Instruction {
        program_id: *program,
        accounts,
        data: ProgramInstruction::ResolveBet {
            winning_pool,
            payouts,
        }
        .encode()
        .to_vec(),
    }
}

/// Wallet credits a `ResolveBet` instruction makes when it lands, paired from
/// its trailing accounts and encoded payouts. `None` for any other instruction.
pub fn resolve_transfers(instruction: &Instruction) -> Option<Vec<(Address, Lamports)>> {
    let ProgramInstruction::ResolveBet { payouts, .. } =
        ProgramInstruction::decode(instruction.data.as_slice()).ok()?
    else {
        return None;
    };
    let participants = instruction.accounts.get(4..)?;
    if participants.len() != payouts.len() {
        return None;
    }
    Some(
        participants
            .iter()
            .zip(payouts)
            .map(|(meta, amount)| (meta.address, amount))
            .collect(),
    )
}

pub fn create_lookup_table(authority: &Address, recent_slot: u64) -> (Instruction, Address) {
    let table = lookup_table_address(authority, recent_slot);
    let instruction = Instruction {
        program_id: Address::LOOKUP_TABLE_PROGRAM,
        accounts: vec![
            AccountMeta::writable(table),
            AccountMeta::signer(*authority),
            AccountMeta::signer(*authority),
            AccountMeta::readonly(Address::SYSTEM_PROGRAM),
        ],
        data: LookupTableInstruction::Create { recent_slot }.encode().to_vec(),
    };
    (instruction, table)
}

pub fn extend_lookup_table(table: &Address, authority: &Address, addresses: &[Address]) -> Instruction {
    Instruction {
        program_id: Address::LOOKUP_TABLE_PROGRAM,
        accounts: vec![
            AccountMeta::writable(*table),
            AccountMeta::signer(*authority),
            AccountMeta::signer(*authority),
            AccountMeta::readonly(Address::SYSTEM_PROGRAM),
        ],
        data: LookupTableInstruction::Extend {
            addresses: addresses.to_vec(),
        }
        .encode()
        .to_vec(),
    }
}

pub fn close_lookup_table(table: &Address, authority: &Address) -> Instruction {
    Instruction {
        program_id: Address::LOOKUP_TABLE_PROGRAM,
        accounts: vec![
            AccountMeta::writable(*table),
            AccountMeta::signer(*authority),
            AccountMeta::writable(*authority),
        ],
        data: LookupTableInstruction::Close.encode().to_vec(),
    }
}

pub fn set_compute_unit_price(micro_lamports: u64) -> Instruction {
    Instruction {
        program_id: Address::COMPUTE_BUDGET_PROGRAM,
        accounts: Vec::new(),
        data: ComputeBudgetInstruction::SetComputeUnitPrice { micro_lamports }
            .encode()
            .to_vec(),
    }
}
