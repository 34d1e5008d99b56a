/// Lamports per whole SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Fractional digits accepted when parsing a SOL amount.
pub const SOL_DECIMALS: usize = 9;

/// Number of pools a race offers unless configured otherwise.
pub const DEFAULT_POOL_COUNT: u16 = 5;

/// Display names for the default pools, indexed by `pool - 1`.
pub const POOL_NAMES: [&str; DEFAULT_POOL_COUNT as usize] =
    ["THEO", "CHARLOTTE", "BANKSY", "CK", "POOKIE"];

/// Maximum number of bets a single race accepts.
pub const MAX_RACE_ENTRIES: usize = 250;

/// Participant count above which settlement stages accounts in a lookup table.
pub const LOOKUP_TABLE_THRESHOLD: usize = 25;

/// Addresses appended per lookup table extend transaction.
pub const LOOKUP_TABLE_CHUNK_SIZE: usize = 15;

/// Maximum addresses a single lookup table can hold.
pub const MAX_LOOKUP_TABLE_ADDRESSES: usize = 256;

/// Maximum accounts referenced by one instruction.
pub const MAX_INSTRUCTION_ACCOUNTS: usize = 255;

/// Maximum instruction payload size in bytes.
pub const MAX_INSTRUCTION_DATA: usize = 4_096;

/// Maximum instructions in one message.
pub const MAX_MESSAGE_INSTRUCTIONS: usize = 16;

/// Maximum lookup tables referenced by one message.
pub const MAX_MESSAGE_LOOKUP_TABLES: usize = 8;

/// Maximum players the on-chain game account tracks.
pub const MAX_GAME_PLAYERS: usize = MAX_RACE_ENTRIES;

/// Priority fee attached to every submitted transaction.
pub const COMPUTE_UNIT_PRICE_MICRO_LAMPORTS: u64 = 9_000_000;

/// Signing namespace for settlement transactions.
pub const TRANSACTION_NAMESPACE: &[u8] = b"_PADDOCK_TX";

/// Seed for the game config account.
pub const GAME_SEED: &[u8] = b"hamsai";

/// Seed for the global treasury account.
pub const GLOBAL_SEED: &[u8] = b"global";
