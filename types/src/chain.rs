//! Chain wire types.
//!
//! Instructions are built against full account lists and compiled into a
//! [Message] that references each account either inline (a static key) or
//! through an address lookup table. Lookup tables keep large settlements under
//! the per-transaction account ceiling: every looked-up account costs one byte
//! instead of a full address.

use crate::{
    constants::{
        MAX_INSTRUCTION_ACCOUNTS, MAX_INSTRUCTION_DATA, MAX_LOOKUP_TABLE_ADDRESSES,
        MAX_MESSAGE_INSTRUCTIONS, MAX_MESSAGE_LOOKUP_TABLES, TRANSACTION_NAMESPACE,
    },
    Address, Blockhash, Signature,
};
use bytes::{Buf, BufMut};
use commonware_codec::{
    Encode, EncodeSize, Error, RangeCfg, Read, ReadExt, ReadRangeExt, Write,
};
use commonware_cryptography::{ed25519, Signer, Verifier};
use std::collections::HashMap;
use thiserror::Error as ThisError;

/// Largest account index a compiled instruction can reference.
const MAX_ACCOUNT_INDEX: usize = u8::MAX as usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AccountMeta {
    pub address: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(address: Address) -> Self {
        Self {
            address,
            is_signer: false,
            is_writable: true,
        }
    }

    pub fn readonly(address: Address) -> Self {
        Self {
            address,
            is_signer: false,
            is_writable: false,
        }
    }

    pub fn signer(address: Address) -> Self {
        Self {
            address,
            is_signer: true,
            is_writable: true,
        }
    }
}

impl Write for AccountMeta {
    fn write(&self, writer: &mut impl BufMut) {
        self.address.write(writer);
        self.is_signer.write(writer);
        self.is_writable.write(writer);
    }
}

impl Read for AccountMeta {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            address: Address::read(reader)?,
            is_signer: bool::read(reader)?,
            is_writable: bool::read(reader)?,
        })
    }
}

impl EncodeSize for AccountMeta {
    fn encode_size(&self) -> usize {
        self.address.encode_size() + self.is_signer.encode_size() + self.is_writable.encode_size()
    }
}

/// A program invocation against a full account list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Address,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

impl Instruction {
    pub fn keys(&self) -> impl Iterator<Item = &Address> {
        self.accounts.iter().map(|meta| &meta.address)
    }
}

impl Write for Instruction {
    fn write(&self, writer: &mut impl BufMut) {
        self.program_id.write(writer);
        self.accounts.write(writer);
        self.data.write(writer);
    }
}

impl Read for Instruction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let program_id = Address::read(reader)?;
        let accounts = Vec::<AccountMeta>::read_cfg(
            reader,
            &(RangeCfg::from(0..=MAX_INSTRUCTION_ACCOUNTS), ()),
        )?;
        let data = Vec::<u8>::read_range(reader, 0..=MAX_INSTRUCTION_DATA)?;
        Ok(Self {
            program_id,
            accounts,
            data,
        })
    }
}

impl EncodeSize for Instruction {
    fn encode_size(&self) -> usize {
        self.program_id.encode_size() + self.accounts.encode_size() + self.data.encode_size()
    }
}

/// Contents of an on-chain address lookup table, as known to the submitter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupTable {
    pub address: Address,
    pub addresses: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum CompileError {
    #[error("message references {got} accounts (max {max})")]
    TooManyAccounts { got: usize, max: usize },
    #[error("message has {got} instructions (max {max})")]
    TooManyInstructions { got: usize, max: usize },
    #[error("message references {got} lookup tables (max {max})")]
    TooManyLookupTables { got: usize, max: usize },
    #[error("lookup table {table} holds {got} addresses (max {max})")]
    LookupTableTooLarge {
        table: Address,
        got: usize,
        max: usize,
    },
}

/// An account inlined in the message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaticKey {
    pub address: Address,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl Write for StaticKey {
    fn write(&self, writer: &mut impl BufMut) {
        self.address.write(writer);
        self.is_signer.write(writer);
        self.is_writable.write(writer);
    }
}

impl Read for StaticKey {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            address: Address::read(reader)?,
            is_signer: bool::read(reader)?,
            is_writable: bool::read(reader)?,
        })
    }
}

impl EncodeSize for StaticKey {
    fn encode_size(&self) -> usize {
        self.address.encode_size() + self.is_signer.encode_size() + self.is_writable.encode_size()
    }
}

/// Accounts resolved through one lookup table, by index into the table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableLookup {
    pub table: Address,
    pub writable: Vec<u8>,
    pub readonly: Vec<u8>,
}

impl Write for TableLookup {
    fn write(&self, writer: &mut impl BufMut) {
        self.table.write(writer);
        self.writable.write(writer);
        self.readonly.write(writer);
    }
}

impl Read for TableLookup {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            table: Address::read(reader)?,
            writable: Vec::<u8>::read_range(reader, 0..=MAX_LOOKUP_TABLE_ADDRESSES)?,
            readonly: Vec::<u8>::read_range(reader, 0..=MAX_LOOKUP_TABLE_ADDRESSES)?,
        })
    }
}

impl EncodeSize for TableLookup {
    fn encode_size(&self) -> usize {
        self.table.encode_size() + self.writable.encode_size() + self.readonly.encode_size()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledInstruction {
    pub program_index: u8,
    pub accounts: Vec<u8>,
    pub data: Vec<u8>,
}

impl Write for CompiledInstruction {
    fn write(&self, writer: &mut impl BufMut) {
        self.program_index.write(writer);
        self.accounts.write(writer);
        self.data.write(writer);
    }
}

impl Read for CompiledInstruction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            program_index: u8::read(reader)?,
            accounts: Vec::<u8>::read_range(reader, 0..=MAX_INSTRUCTION_ACCOUNTS)?,
            data: Vec::<u8>::read_range(reader, 0..=MAX_INSTRUCTION_DATA)?,
        })
    }
}

impl EncodeSize for CompiledInstruction {
    fn encode_size(&self) -> usize {
        self.program_index.encode_size() + self.accounts.encode_size() + self.data.encode_size()
    }
}

/// A compiled, unsigned transaction message.
///
/// Account indexes address the concatenation of `static_keys` followed, per
/// table lookup, by its writable then readonly entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub recent_blockhash: Blockhash,
    pub static_keys: Vec<StaticKey>,
    pub table_lookups: Vec<TableLookup>,
    pub instructions: Vec<CompiledInstruction>,
}

#[derive(Clone, Copy)]
struct KeyFlags {
    is_signer: bool,
    is_writable: bool,
    is_program: bool,
}

impl Message {
    /// Compile instructions for `payer`, moving every account found in
    /// `tables` out of the static key list. Signers, programs, and the payer
    /// always stay inline.
    pub fn compile(
        payer: &Address,
        recent_blockhash: Blockhash,
        instructions: &[Instruction],
        tables: &[LookupTable],
    ) -> Result<Message, CompileError> {
        if instructions.len() > MAX_MESSAGE_INSTRUCTIONS {
            return Err(CompileError::TooManyInstructions {
                got: instructions.len(),
                max: MAX_MESSAGE_INSTRUCTIONS,
            });
        }
        if tables.len() > MAX_MESSAGE_LOOKUP_TABLES {
            return Err(CompileError::TooManyLookupTables {
                got: tables.len(),
                max: MAX_MESSAGE_LOOKUP_TABLES,
            });
        }
        for table in tables {
            if table.addresses.len() > MAX_LOOKUP_TABLE_ADDRESSES {
                return Err(CompileError::LookupTableTooLarge {
                    table: table.address,
                    got: table.addresses.len(),
                    max: MAX_LOOKUP_TABLE_ADDRESSES,
                });
            }
        }

        // Merge flags per unique key, preserving first-seen order with the payer first.
        let mut order: Vec<Address> = vec![*payer];
        let mut flags: HashMap<Address, KeyFlags> = HashMap::new();
        flags.insert(
            *payer,
            KeyFlags {
                is_signer: true,
                is_writable: true,
                is_program: false,
            },
        );
        let mut merge = |address: Address, update: KeyFlags| {
            let entry = flags.entry(address).or_insert_with(|| {
                order.push(address);
                KeyFlags {
                    is_signer: false,
                    is_writable: false,
                    is_program: false,
                }
            });
            entry.is_signer |= update.is_signer;
            entry.is_writable |= update.is_writable;
            entry.is_program |= update.is_program;
        };
        for instruction in instructions {
            merge(
                instruction.program_id,
                KeyFlags {
                    is_signer: false,
                    is_writable: false,
                    is_program: true,
                },
            );
            for meta in &instruction.accounts {
                merge(
                    meta.address,
                    KeyFlags {
                        is_signer: meta.is_signer,
                        is_writable: meta.is_writable,
                        is_program: false,
                    },
                );
            }
        }

        let mut static_keys = Vec::new();
        let mut lookups: Vec<TableLookup> = tables
            .iter()
            .map(|table| TableLookup {
                table: table.address,
                writable: Vec::new(),
                readonly: Vec::new(),
            })
            .collect();
        // Per table: (writable addresses, readonly addresses) in lookup order.
        let mut looked_up: Vec<(Vec<Address>, Vec<Address>)> =
            vec![(Vec::new(), Vec::new()); tables.len()];

        for address in &order {
            let key = flags[address];
            let location = if key.is_signer || key.is_program {
                None
            } else {
                tables.iter().enumerate().find_map(|(table_index, table)| {
                    table
                        .addresses
                        .iter()
                        .position(|candidate| candidate == address)
                        .map(|position| (table_index, position as u8))
                })
            };
            match location {
                Some((table_index, position)) => {
                    if key.is_writable {
                        lookups[table_index].writable.push(position);
                        looked_up[table_index].0.push(*address);
                    } else {
                        lookups[table_index].readonly.push(position);
                        looked_up[table_index].1.push(*address);
                    }
                }
                None => static_keys.push(StaticKey {
                    address: *address,
                    is_signer: key.is_signer,
                    is_writable: key.is_writable,
                }),
            }
        }

        let mut index: HashMap<Address, usize> = HashMap::new();
        let mut next = 0usize;
        for key in &static_keys {
            index.insert(key.address, next);
            next += 1;
        }
        for (writable, readonly) in &looked_up {
            for address in writable.iter().chain(readonly.iter()) {
                index.insert(*address, next);
                next += 1;
            }
        }
        if next > MAX_ACCOUNT_INDEX + 1 {
            return Err(CompileError::TooManyAccounts {
                got: next,
                max: MAX_ACCOUNT_INDEX + 1,
            });
        }

        let compiled = instructions
            .iter()
            .map(|instruction| CompiledInstruction {
                program_index: index[&instruction.program_id] as u8,
                accounts: instruction
                    .keys()
                    .map(|address| index[address] as u8)
                    .collect(),
                data: instruction.data.clone(),
            })
            .collect();

        lookups.retain(|lookup| !lookup.writable.is_empty() || !lookup.readonly.is_empty());

        Ok(Message {
            recent_blockhash,
            static_keys,
            table_lookups: lookups,
            instructions: compiled,
        })
    }

    pub fn payer(&self) -> Option<&Address> {
        self.static_keys.first().map(|key| &key.address)
    }

    /// Number of accounts resolved through lookup tables.
    pub fn looked_up_count(&self) -> usize {
        self.table_lookups
            .iter()
            .map(|lookup| lookup.writable.len() + lookup.readonly.len())
            .sum()
    }

    pub fn required_signers(&self) -> impl Iterator<Item = &Address> {
        self.static_keys
            .iter()
            .filter(|key| key.is_signer)
            .map(|key| &key.address)
    }
}

impl Write for Message {
    fn write(&self, writer: &mut impl BufMut) {
        self.recent_blockhash.write(writer);
        self.static_keys.write(writer);
        self.table_lookups.write(writer);
        self.instructions.write(writer);
    }
}

impl Read for Message {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            recent_blockhash: Blockhash::read(reader)?,
            static_keys: Vec::<StaticKey>::read_cfg(
                reader,
                &(RangeCfg::from(1..=MAX_ACCOUNT_INDEX + 1), ()),
            )?,
            table_lookups: Vec::<TableLookup>::read_cfg(
                reader,
                &(RangeCfg::from(0..=MAX_MESSAGE_LOOKUP_TABLES), ()),
            )?,
            instructions: Vec::<CompiledInstruction>::read_cfg(
                reader,
                &(RangeCfg::from(0..=MAX_MESSAGE_INSTRUCTIONS), ()),
            )?,
        })
    }
}

impl EncodeSize for Message {
    fn encode_size(&self) -> usize {
        self.recent_blockhash.encode_size()
            + self.static_keys.encode_size()
            + self.table_lookups.encode_size()
            + self.instructions.encode_size()
    }
}

/// A message signed by its fee payer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedTransaction {
    pub message: Message,
    pub public: ed25519::PublicKey,
    pub signature: ed25519::Signature,
}

impl SignedTransaction {
    pub fn sign(private: &ed25519::PrivateKey, message: Message) -> Self {
        let payload = message.encode();
        let signature = private.sign(TRANSACTION_NAMESPACE, payload.as_ref());
        Self {
            message,
            public: private.public_key(),
            signature,
        }
    }

    pub fn verify(&self) -> bool {
        let payload = self.message.encode();
        self.public.verify(
            TRANSACTION_NAMESPACE,
            payload.as_ref(),
            &self.signature,
        )
    }

    pub fn signature(&self) -> Signature {
        Signature::from(&self.signature)
    }
}

impl Write for SignedTransaction {
    fn write(&self, writer: &mut impl BufMut) {
        self.message.write(writer);
        self.public.write(writer);
        self.signature.write(writer);
    }
}

impl Read for SignedTransaction {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            message: Message::read(reader)?,
            public: ed25519::PublicKey::read(reader)?,
            signature: ed25519::Signature::read(reader)?,
        })
    }
}

impl EncodeSize for SignedTransaction {
    fn encode_size(&self) -> usize {
        self.message.encode_size() + self.public.encode_size() + self.signature.encode_size()
    }
}
