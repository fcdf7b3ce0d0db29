use std::collections::{BTreeMap, HashSet};

use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::address::encode_silent_payment_address;
use super::keys::derive_keys_from_mnemonic;
use super::txhistory::TxHistory;
use super::utxo::{OwnedUtxo, UtxoState};
use crate::error::{Error, Result};
use crate::protocol::Label;
use crate::types::{Network, Outpoint};

/// In-memory wallet state: keys, owned UTXOs, labels and history.
///
/// The serialized form matches the persisted wallet JSON layout; after
/// deserializing, [`Wallet::init`] rebuilds the runtime caches (outpoint
/// dedup set, label slice). [`Wallet::from_json`] does both.
#[derive(Debug, Serialize, Deserialize)]
pub struct Wallet {
    pub mnemonic: String,
    pub network: Network,
    pub sec_key_scan: SecretKey,
    pub pub_key_scan: PublicKey,
    pub sec_key_spend: SecretKey,
    pub pub_key_spend: PublicKey,
    pub birth_height: u32,
    pub last_scan_height: u32,
    utxos: Vec<OwnedUtxo>,
    /// All computed labels keyed by m, including the change label at m=0.
    labels: BTreeMap<u32, Label>,

    #[serde(skip)]
    outpoints: HashSet<Outpoint>,
    #[serde(skip)]
    label_slice: Vec<Option<Label>>,
    #[serde(skip)]
    tx_history: TxHistory,
}

impl Wallet {
    /// Create a wallet from a BIP-39 mnemonic phrase.
    pub fn new_from_mnemonic(mnemonic: &str, network: Network, birth_height: u32) -> Result<Self> {
        let parsed = bip39::Mnemonic::parse(mnemonic).map_err(|_| Error::InvalidMnemonic)?;
        let (sec_key_scan, sec_key_spend) =
            derive_keys_from_mnemonic(&parsed, "", network, 0)?;

        let secp = Secp256k1::new();
        Ok(Wallet {
            mnemonic: parsed.to_string(),
            network,
            pub_key_scan: sec_key_scan.public_key(&secp),
            pub_key_spend: sec_key_spend.public_key(&secp),
            sec_key_scan,
            sec_key_spend,
            birth_height,
            last_scan_height: birth_height,
            utxos: Vec::new(),
            labels: BTreeMap::new(),
            outpoints: HashSet::new(),
            label_slice: Vec::new(),
            tx_history: TxHistory::default(),
        })
    }

    /// Generate a fresh 24-word mnemonic phrase.
    pub fn generate_mnemonic() -> Result<String> {
        let mnemonic = bip39::Mnemonic::generate(24).map_err(|_| Error::InvalidMnemonic)?;
        Ok(mnemonic.to_string())
    }

    /// Rebuild the runtime caches after deserialization.
    pub fn init(&mut self) {
        self.outpoints = self.utxos.iter().map(OwnedUtxo::outpoint).collect();
        self.label_slice.clear();
        for (m, label) in &self.labels {
            let idx = *m as usize;
            if self.label_slice.len() < idx + 1 {
                self.label_slice.resize(idx + 1, None);
            }
            self.label_slice[idx] = Some(label.clone());
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let mut wallet: Wallet = serde_json::from_str(json)?;
        wallet.init();
        Ok(wallet)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Add UTXOs, skipping any outpoint the wallet already tracks.
    /// Existing entries are never replaced or mutated.
    pub fn add_utxos<I>(&mut self, utxos: I)
    where
        I: IntoIterator<Item = OwnedUtxo>,
    {
        for utxo in utxos {
            let outpoint = utxo.outpoint();
            if self.outpoints.insert(outpoint) {
                self.utxos.push(utxo);
            }
        }
    }

    /// Owned UTXOs, filtered by state when `states` is non-empty.
    /// The returned vector is a copy.
    pub fn get_utxos(&self, states: &[UtxoState]) -> Vec<OwnedUtxo> {
        if states.is_empty() {
            return self.utxos.clone();
        }
        self.utxos
            .iter()
            .filter(|u| states.contains(&u.state))
            .cloned()
            .collect()
    }

    /// Total balance of spendable outputs.
    pub fn balance(&self) -> bitcoin::Amount {
        self.utxos
            .iter()
            .filter(|u| matches!(u.state, UtxoState::Unspent | UtxoState::Unconfirmed))
            .map(|u| u.amount)
            .sum()
    }

    /// The wallet's primary receiving address.
    ///
    /// Panics on cryptographic failure; a wallet whose stored keys cannot be
    /// encoded is beyond recovery.
    pub fn address(&self) -> String {
        encode_silent_payment_address(&self.pub_key_scan, &self.pub_key_spend, self.network)
            .expect("address encoding of wallet keys")
    }

    /// The change address, label m=0, computed lazily.
    pub fn change_address(&mut self) -> String {
        self.get_label(0).address
    }

    /// Cached label for m, computing and caching it on first use.
    ///
    /// Panics on cryptographic failure, as [`Wallet::address`] does.
    pub fn get_label(&mut self, m: u32) -> Label {
        if let Some(label) = self.labels.get(&m) {
            return label.clone();
        }
        self.compute_label_for_m(m)
            .expect("label derivation from wallet keys")
    }

    /// A copy of the cached labels in m order.
    pub fn label_slice(&self) -> Vec<Label> {
        self.label_slice.iter().flatten().cloned().collect()
    }

    fn compute_label_for_m(&mut self, m: u32) -> Result<Label> {
        let mut label = Label::generate(&self.sec_key_scan, m)?;
        let b_m = self.pub_key_spend.combine(&label.pub_key)?;
        label.address = encode_silent_payment_address(&self.pub_key_scan, &b_m, self.network)?;

        let idx = m as usize;
        if self.label_slice.len() < idx + 1 {
            self.label_slice.resize(idx + 1, None);
        }
        self.label_slice[idx] = Some(label.clone());
        self.labels.insert(m, label.clone());
        Ok(label)
    }

    /// Move the given outpoints to `Spent`, returning the outputs that
    /// actually transitioned. Already-spent entries are left alone; nothing
    /// is ever moved back to unspent.
    pub fn mark_spent(&mut self, outpoints: &[Outpoint]) -> Vec<OwnedUtxo> {
        let mut transitioned = Vec::new();
        for utxo in &mut self.utxos {
            if utxo.state != UtxoState::Spent && outpoints.contains(&utxo.outpoint()) {
                utxo.state = UtxoState::Spent;
                transitioned.push(utxo.clone());
            }
        }
        transitioned
    }

    /// Mark the inputs of a locally constructed spend. Errors if any
    /// requested outpoint is unknown to the wallet.
    pub fn mark_unconfirmed_spent(&mut self, outpoints: &[Outpoint]) -> Result<()> {
        let mut marked = 0;
        for utxo in &mut self.utxos {
            if outpoints.contains(&utxo.outpoint()) {
                utxo.state = UtxoState::UnconfirmedSpent;
                marked += 1;
            }
        }
        if marked != outpoints.len() {
            return Err(Error::MarkSpent {
                marked,
                needed: outpoints.len(),
            });
        }
        Ok(())
    }

    pub fn tx_history(&self) -> &TxHistory {
        &self.tx_history
    }

    pub fn tx_history_mut(&mut self) -> &mut TxHistory {
        &mut self.tx_history
    }
}

impl Drop for Wallet {
    fn drop(&mut self) {
        self.mnemonic.zeroize();
        self.sec_key_scan.non_secure_erase();
        self.sec_key_spend.non_secure_erase();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Txid;
    use bitcoin::Amount;

    const MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn wallet() -> Wallet {
        Wallet::new_from_mnemonic(MNEMONIC, Network::Regtest, 100).unwrap()
    }

    fn utxo(txid_byte: u8, vout: u32) -> OwnedUtxo {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[txid_byte.max(1); 32]).unwrap();
        OwnedUtxo {
            txid: Txid::from_internal_bytes([txid_byte; 32]),
            vout,
            amount: Amount::from_sat(5_000),
            priv_key_tweak: sk,
            pub_key: sk.public_key(&secp).x_only_public_key().0,
            height: 150,
            timestamp: 0,
            state: UtxoState::Unspent,
            label: None,
        }
    }

    #[test]
    fn add_utxos_dedups_by_outpoint() {
        let mut w = wallet();
        w.add_utxos([utxo(1, 0), utxo(1, 0), utxo(1, 1)]);
        assert_eq!(w.get_utxos(&[]).len(), 2);

        // overlapping rescans never duplicate
        w.add_utxos([utxo(1, 0), utxo(2, 0)]);
        assert_eq!(w.get_utxos(&[]).len(), 3);
    }

    #[test]
    fn get_utxos_filters_by_state() {
        let mut w = wallet();
        let mut spent = utxo(3, 0);
        spent.state = UtxoState::Spent;
        w.add_utxos([utxo(1, 0), spent]);

        assert_eq!(w.get_utxos(&[UtxoState::Unspent]).len(), 1);
        assert_eq!(w.get_utxos(&[UtxoState::Spent]).len(), 1);
        assert_eq!(
            w.get_utxos(&[UtxoState::Unspent, UtxoState::Spent]).len(),
            2
        );
    }

    #[test]
    fn label_slice_grows_without_clobbering() {
        let mut w = wallet();
        let l3 = w.get_label(3);
        let l1 = w.get_label(1);
        assert_eq!(w.get_label(3), l3);
        assert_eq!(w.get_label(1), l1);
        // cached labels in m order
        let slice = w.label_slice();
        assert_eq!(slice.len(), 2);
        assert_eq!(slice[0].m, 1);
        assert_eq!(slice[1].m, 3);
    }

    #[test]
    fn change_address_is_label_zero() {
        let mut w = wallet();
        let change = w.change_address();
        assert_eq!(change, w.get_label(0).address);
        assert_ne!(change, w.address());
        assert!(change.starts_with("sprt1"));
    }

    #[test]
    fn label_addresses_encode_tweaked_spend_key() {
        let mut w = wallet();
        let label = w.get_label(2);
        let (scan, m_pub, _) =
            super::super::address::decode_silent_payment_address(&label.address).unwrap();
        assert_eq!(scan, w.pub_key_scan);
        assert_eq!(m_pub, w.pub_key_spend.combine(&label.pub_key).unwrap());
    }

    #[test]
    fn json_roundtrip_rebuilds_caches() {
        let mut w = wallet();
        w.add_utxos([utxo(1, 0), utxo(2, 1)]);
        w.get_label(1);
        w.last_scan_height = 321;

        let json = w.to_json().unwrap();
        assert!(json.contains("\"sec_key_scan\""));
        assert!(json.contains("\"last_scan_height\":321"));

        let mut back = Wallet::from_json(&json).unwrap();
        assert_eq!(back.get_utxos(&[]), w.get_utxos(&[]));
        assert_eq!(back.label_slice().len(), 1);
        assert_eq!(back.last_scan_height, 321);

        // the rebuilt dedup set still rejects known outpoints
        back.add_utxos([utxo(1, 0)]);
        assert_eq!(back.get_utxos(&[]).len(), 2);
    }

    #[test]
    fn mark_spent_is_additive() {
        let mut w = wallet();
        w.add_utxos([utxo(1, 0)]);
        let op = utxo(1, 0).outpoint();

        let first = w.mark_spent(&[op]);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].state, UtxoState::Spent);

        // re-marking does not transition again
        assert!(w.mark_spent(&[op]).is_empty());
        assert_eq!(w.get_utxos(&[UtxoState::Spent]).len(), 1);
    }

    #[test]
    fn mark_unconfirmed_spent_requires_known_outpoints() {
        let mut w = wallet();
        w.add_utxos([utxo(1, 0)]);

        let unknown = Outpoint::new(&Txid::from_internal_bytes([9; 32]), 0);
        let err = w.mark_unconfirmed_spent(&[utxo(1, 0).outpoint(), unknown]);
        assert!(matches!(
            err,
            Err(Error::MarkSpent {
                marked: 1,
                needed: 2
            })
        ));

        w.mark_unconfirmed_spent(&[utxo(1, 0).outpoint()]).unwrap();
        assert_eq!(w.get_utxos(&[UtxoState::UnconfirmedSpent]).len(), 1);
    }

    #[test]
    fn invalid_mnemonic_is_rejected() {
        assert!(matches!(
            Wallet::new_from_mnemonic("not a mnemonic", Network::Regtest, 0),
            Err(Error::InvalidMnemonic)
        ));
    }

    #[test]
    fn generated_mnemonic_is_valid() {
        let phrase = Wallet::generate_mnemonic().unwrap();
        assert_eq!(phrase.split_whitespace().count(), 24);
        Wallet::new_from_mnemonic(&phrase, Network::Mainnet, 0).unwrap();
    }
}
