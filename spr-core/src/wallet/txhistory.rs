//! Wallet-level transaction history.
//!
//! Kept as a runtime aggregate next to the UTXO set: receives confirm
//! pending sends, and the list stays sorted with pending entries first,
//! then confirmed by height descending, ties broken by txid.

use bitcoin::Amount;
use serde::{Deserialize, Serialize};

use super::utxo::OwnedUtxo;
use crate::error::{Error, Result};
use crate::types::{Outpoint, Txid};

/// Confirm height of a transaction that is not yet mined.
pub const TX_PENDING: i64 = -1;

/// Which outputs to aggregate when summing inflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InflowMode {
    All,
    SelfOnly,
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxIn {
    pub outpoint: Outpoint,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOut {
    /// Full output script; taproot outputs are `0x5120 || x-only`.
    pub pubkey: Vec<u8>,
    #[serde(with = "bitcoin::amount::serde::as_sat")]
    pub amount: Amount,
    /// Whether the output belongs to this wallet.
    #[serde(rename = "self")]
    pub is_self: bool,
    /// Needed to tell apart identical scripts within one transaction.
    pub vout: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxItem {
    pub txid: Txid,
    /// Block height, or [`TX_PENDING`].
    pub confirm_height: i64,
    pub tx_ins: Vec<TxIn>,
    pub tx_outs: Vec<TxOut>,
}

impl TxItem {
    pub fn is_pending(&self) -> bool {
        self.confirm_height == TX_PENDING
    }

    /// Total net effect on the wallet, fees included.
    pub fn net_amount(&self) -> i64 {
        self.sum_inflows(InflowMode::SelfOnly) - self.sum_outflows()
    }

    pub fn fees(&self) -> i64 {
        if self.tx_ins.is_empty() {
            // we did not fund this transaction, so we did not pay the fee
            return 0;
        }
        self.sum_inflows(InflowMode::All) - self.sum_outflows()
    }

    pub fn sum_inflows(&self, mode: InflowMode) -> i64 {
        self.tx_outs
            .iter()
            .filter(|out| match mode {
                InflowMode::All => true,
                InflowMode::SelfOnly => out.is_self,
                InflowMode::External => !out.is_self,
            })
            .map(|out| out.amount.to_sat() as i64)
            .sum()
    }

    pub fn sum_outflows(&self) -> i64 {
        self.tx_ins
            .iter()
            .map(|txin| txin.amount.to_sat() as i64)
            .sum()
    }

    /// 8-byte prefixes of the output keys, optionally restricted to own outputs.
    pub fn short_pubkeys(&self, self_only: bool) -> Vec<[u8; 8]> {
        self.tx_outs
            .iter()
            .filter(|out| !self_only || out.is_self)
            .filter(|out| out.pubkey.len() >= 10)
            .map(|out| {
                let mut prefix = [0u8; 8];
                prefix.copy_from_slice(&out.pubkey[2..10]);
                prefix
            })
            .collect()
    }

    /// Add an owned output to this item, skipping duplicates.
    ///
    /// Dedup key is (x-only key, vout); the stored pubkey is the full
    /// `0x5120 || x-only` script form.
    pub fn add_output_safely(&mut self, utxo: &OwnedUtxo) -> Result<()> {
        if self.txid != utxo.txid {
            return Err(Error::TxidMismatch {
                got: utxo.txid,
                expected: self.txid,
            });
        }

        let xonly = utxo.pub_key.serialize();
        let exists = self.tx_outs.iter().any(|out| {
            out.vout == utxo.vout && out.pubkey.len() == 34 && out.pubkey[2..] == xonly
        });
        if exists {
            return Ok(());
        }

        let mut script = Vec::with_capacity(34);
        script.extend_from_slice(&[0x51, 0x20]);
        script.extend_from_slice(&xonly);
        self.tx_outs.push(TxOut {
            pubkey: script,
            amount: utxo.amount,
            is_self: true,
            vout: utxo.vout,
        });
        Ok(())
    }
}

/// Ordered list of wallet transactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHistory(Vec<TxItem>);

impl TxHistory {
    /// Record a received UTXO: confirms a pending send with the same txid,
    /// or inserts a fresh item.
    pub fn add_out_utxo(&mut self, utxo: &OwnedUtxo) -> Result<()> {
        if let Some(item) = self.find_by_txid_mut(&utxo.txid) {
            item.confirm_height = i64::from(utxo.height);
            item.add_output_safely(utxo)?;
            self.sort();
            return Ok(());
        }

        let mut item = TxItem {
            txid: utxo.txid,
            confirm_height: i64::from(utxo.height),
            tx_ins: Vec::new(),
            tx_outs: Vec::new(),
        };
        item.add_output_safely(utxo)?;
        self.0.push(item);
        self.sort();
        Ok(())
    }

    /// Insert a locally built (pending) transaction record.
    pub fn add_record(&mut self, item: TxItem) {
        self.0.push(item);
        self.sort();
    }

    pub fn find_by_txid(&self, txid: &Txid) -> Option<&TxItem> {
        self.0.iter().find(|item| item.txid == *txid)
    }

    fn find_by_txid_mut(&mut self, txid: &Txid) -> Option<&mut TxItem> {
        self.0.iter_mut().find(|item| item.txid == *txid)
    }

    pub fn find_by_outpoint(&self, outpoint: &Outpoint) -> Option<&TxItem> {
        self.0
            .iter()
            .find(|item| item.tx_ins.iter().any(|txin| txin.outpoint == *outpoint))
    }

    pub fn items(&self) -> &[TxItem] {
        &self.0
    }

    pub fn sort(&mut self) {
        self.0.sort_by(|a, b| {
            use std::cmp::Ordering;
            match (a.is_pending(), b.is_pending()) {
                (true, false) => return Ordering::Less,
                (false, true) => return Ordering::Greater,
                (true, true) => return Ordering::Equal,
                (false, false) => {}
            }
            // confirmed: height descending, then txid ascending on the wire form
            b.confirm_height
                .cmp(&a.confirm_height)
                .then_with(|| a.txid.to_wire_bytes().cmp(&b.txid.to_wire_bytes()))
        });
    }
}
