//! Byte-level primitives shared by the wallet and the oracle transports.
//!
//! Transaction ids are kept in internal (little-endian) form everywhere in
//! this crate; the oracle wire and all hex renderings use the reversed form.

use std::fmt;
use std::str::FromStr;

use bitcoin::hex::{DisplayHex, FromHex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Decode `s` into a fixed-width byte array, rejecting any other length.
pub fn array_from_hex<const N: usize>(field: &'static str, s: &str) -> Result<[u8; N]> {
    if s.len() != N * 2 {
        return Err(Error::InvalidLength {
            field,
            expected: N,
            got: s.len() / 2,
        });
    }
    let bytes = Vec::<u8>::from_hex(s).map_err(|_| Error::InvalidHex(field))?;
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Reverse a fixed-width byte array into a fresh copy.
pub fn reverse_bytes<const N: usize>(bytes: &[u8; N]) -> [u8; N] {
    let mut out = *bytes;
    out.reverse();
    out
}

/// A transaction id in internal (little-endian) byte order.
///
/// `Display`, `FromStr` and the serde impls all speak the reversed wire form.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Txid([u8; 32]);

impl Txid {
    /// Wrap bytes already in internal order.
    pub fn from_internal_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Wrap bytes in wire (reversed) order.
    pub fn from_wire_bytes(bytes: [u8; 32]) -> Self {
        Self(reverse_bytes(&bytes))
    }

    pub fn from_wire_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| Error::InvalidLength {
            field: "txid",
            expected: 32,
            got: bytes.len(),
        })?;
        Ok(Self::from_wire_bytes(arr))
    }

    /// Internal byte order.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Wire (reversed) byte order.
    pub fn to_wire_bytes(&self) -> [u8; 32] {
        reverse_bytes(&self.0)
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wire_bytes().as_hex())
    }
}

impl fmt::Debug for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txid({self})")
    }
}

impl FromStr for Txid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self::from_wire_bytes(array_from_hex::<32>("txid", s)?))
    }
}

impl Serialize for Txid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Txid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Canonical UTXO identity: `reversed(txid) || vout` as little-endian u32.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Outpoint([u8; 36]);

impl Outpoint {
    pub fn new(txid: &Txid, vout: u32) -> Self {
        let mut out = [0u8; 36];
        out[..32].copy_from_slice(&txid.to_wire_bytes());
        out[32..].copy_from_slice(&vout.to_le_bytes());
        Self(out)
    }

    pub fn txid(&self) -> Txid {
        let mut wire = [0u8; 32];
        wire.copy_from_slice(&self.0[..32]);
        Txid::from_wire_bytes(wire)
    }

    pub fn vout(&self) -> u32 {
        let mut le = [0u8; 4];
        le.copy_from_slice(&self.0[32..]);
        u32::from_le_bytes(le)
    }

    pub fn as_bytes(&self) -> &[u8; 36] {
        &self.0
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hex())
    }
}

impl fmt::Debug for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Outpoint({}:{})", self.txid(), self.vout())
    }
}

impl FromStr for Outpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Self(array_from_hex::<36>("outpoint", s)?))
    }
}

impl Serialize for Outpoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Outpoint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// The bitcoin network a wallet lives on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl Network {
    pub fn is_mainnet(&self) -> bool {
        matches!(self, Network::Mainnet)
    }

    /// BIP-352 derivation coin type.
    pub(crate) fn coin_type(&self) -> u32 {
        match self {
            Network::Mainnet => 0,
            _ => 1,
        }
    }
}

impl From<Network> for bitcoin::NetworkKind {
    fn from(value: Network) -> Self {
        match value {
            Network::Mainnet => bitcoin::NetworkKind::Main,
            _ => bitcoin::NetworkKind::Test,
        }
    }
}
