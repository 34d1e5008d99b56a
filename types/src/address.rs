use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, Write};
use commonware_cryptography::{ed25519, sha256::Sha256, Hasher};
use commonware_utils::{from_hex_formatted, hex};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error as ThisError;

pub const ADDRESS_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ParseError {
    #[error("expected hex: {0}")]
    InvalidHex(String),
    #[error("expected {expected} bytes, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

fn read_fixed<const N: usize>(reader: &mut impl Buf) -> Result<[u8; N], Error> {
    if reader.remaining() < N {
        return Err(Error::EndOfBuffer);
    }
    let mut out = [0u8; N];
    reader.copy_to_slice(&mut out);
    Ok(out)
}

fn parse_fixed<const N: usize>(value: &str) -> Result<[u8; N], ParseError> {
    let bytes =
        from_hex_formatted(value).ok_or_else(|| ParseError::InvalidHex(value.to_string()))?;
    if bytes.len() != N {
        return Err(ParseError::InvalidLength {
            expected: N,
            got: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// A 32-byte account address on the settlement chain.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// Native system program.
    pub const SYSTEM_PROGRAM: Address = Address([0u8; ADDRESS_LEN]);
    /// Address lookup table program.
    pub const LOOKUP_TABLE_PROGRAM: Address = Address::tagged(b"AddressLookupTab1e");
    /// Compute budget program.
    pub const COMPUTE_BUDGET_PROGRAM: Address = Address::tagged(b"ComputeBudget111");

    /// Build a well-known address from an ASCII tag, zero padded.
    pub const fn tagged(tag: &[u8]) -> Address {
        let mut out = [0u8; ADDRESS_LEN];
        let mut i = 0;
        while i < tag.len() && i < ADDRESS_LEN {
            out[i] = tag[i];
            i += 1;
        }
        Address(out)
    }

    /// Deterministically derive a program-owned address from seeds.
    pub fn derive(program: &Address, seeds: &[&[u8]]) -> Address {
        let mut hasher = Sha256::new();
        for seed in seeds {
            hasher.update(seed);
        }
        hasher.update(program.as_ref());
        hasher.update(b"ProgramDerivedAddress");
        let digest = hasher.finalize();
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&digest.as_ref()[..ADDRESS_LEN]);
        Address(out)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&ed25519::PublicKey> for Address {
    fn from(public: &ed25519::PublicKey) -> Self {
        let bytes: &[u8] = public.as_ref();
        let mut out = [0u8; ADDRESS_LEN];
        out.copy_from_slice(&bytes[..ADDRESS_LEN]);
        Address(out)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex(&self.0))
    }
}

impl FromStr for Address {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed::<ADDRESS_LEN>(s).map(Address)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex(&self.0))
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

impl Write for Address {
    fn write(&self, writer: &mut impl BufMut) {
        writer.put_slice(&self.0);
    }
}

impl Read for Address {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        read_fixed::<ADDRESS_LEN>(reader).map(Address)
    }
}

impl EncodeSize for Address {
    fn encode_size(&self) -> usize {
        ADDRESS_LEN
    }
}

/// Recent blockhash a message is anchored to.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Blockhash(pub [u8; 32]);

impl fmt::Debug for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blockhash({})", hex(&self.0))
    }
}

impl fmt::Display for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex(&self.0))
    }
}

impl FromStr for Blockhash {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed::<32>(s).map(Blockhash)
    }
}

impl Write for Blockhash {
    fn write(&self, writer: &mut impl BufMut) {
        writer.put_slice(&self.0);
    }
}

impl Read for Blockhash {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        read_fixed::<32>(reader).map(Blockhash)
    }
}

impl EncodeSize for Blockhash {
    fn encode_size(&self) -> usize {
        32
    }
}

/// Transaction signature as reported by the chain (hex encoded).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(pub String);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&ed25519::Signature> for Signature {
    fn from(signature: &ed25519::Signature) -> Self {
        Self::from_bytes(signature.as_ref())
    }
}
