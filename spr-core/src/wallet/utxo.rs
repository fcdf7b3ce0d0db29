use bitcoin::secp256k1::{SecretKey, XOnlyPublicKey};
use bitcoin::Amount;
use serde::{Deserialize, Serialize};

use crate::protocol::Label;
use crate::types::{Outpoint, Txid};

/// Spend lifecycle of an owned output.
///
/// `UnconfirmedSpent` marks outputs consumed by a locally constructed
/// transaction that the chain has not confirmed yet; the scanner moves
/// outputs to `Spent` when their prefix shows up in a block's spent index.
/// Transitions are additive, an output is never moved back to `Unspent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UtxoState {
    Unconfirmed,
    Unspent,
    UnconfirmedSpent,
    Spent,
}

/// A fully verified output owned by the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnedUtxo {
    pub txid: Txid,
    pub vout: u32,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount: Amount,
    pub priv_key_tweak: SecretKey,
    pub pub_key: XOnlyPublicKey,
    pub height: u32,
    pub timestamp: u64,
    pub state: UtxoState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
}

impl OwnedUtxo {
    /// Canonical 36-byte identity used for deduplication.
    pub fn outpoint(&self) -> Outpoint {
        Outpoint::new(&self.txid, self.vout)
    }

    /// First 8 bytes of the x-only key, as published in spent indexes.
    pub fn pub_key_prefix(&self) -> [u8; 8] {
        let ser = self.pub_key.serialize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&ser[..8]);
        prefix
    }
}
