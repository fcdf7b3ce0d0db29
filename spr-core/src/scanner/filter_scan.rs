//! Legacy per-block scan with the BIP-158 fast path.
//!
//! For each block the oracle serves a tweak list plus two GCS filters. All
//! possible owned outputs for the block are precomputed from the tweaks
//! (base output per tweak, plus label sum and difference combinations) and
//! checked against the created-UTXO filter; only matching blocks pay for a
//! full UTXO fetch and receiver scan. Spends are detected the same way
//! through hashed owned outpoints and the spent filter. A filter false
//! positive costs one wasted fetch, a false negative would lose money, so
//! the candidate set errs on the wide side.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bitcoin::bip158::BlockFilter;
use bitcoin::hashes::{sha256, Hash};
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey, XOnlyPublicKey};
use bitcoin::{Amount, BlockHash};
use futures::{pin_mut, StreamExt};
use rayon::prelude::*;

use super::txscan::scan_transaction_with_shared_secret;
use crate::constants::SAVE_INTERVAL;
use crate::error::{Error, Result};
use crate::oracle::{FilterBackend, FilterBlockData, OracleUtxo};
use crate::protocol::{calculate_p_k, calculate_shared_secret, calculate_t_k, Label};
use crate::types::{Outpoint, Txid};
use crate::updater::Updater;
use crate::wallet::{OwnedUtxo, UtxoState, Wallet};

fn xonly_bytes(key: &PublicKey) -> [u8; 32] {
    let ser = key.serialize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&ser[1..]);
    out
}

/// Precompute every x-only output the wallet could own for these tweaks,
/// mapped to the tweak's ECDH shared secret so matching transactions can be
/// rescanned without renegotiating.
///
/// Per tweak: the base output `P(T, spend, 0)`, and for each label both
/// `P + label` and `P - label` (the label matcher works on x coordinates
/// only, so the difference is part of its acceptance set).
pub(crate) fn precompute_candidate_secrets(
    scan_key: &SecretKey,
    spend_pub: &PublicKey,
    labels: &[Label],
    tweaks: &[PublicKey],
) -> Result<HashMap<[u8; 32], PublicKey>> {
    let items: Result<Vec<(PublicKey, Vec<[u8; 32]>)>> = tweaks
        .par_iter()
        .map(|tweak| {
            let secp = Secp256k1::new();
            let secret = calculate_shared_secret(tweak, scan_key, None)?;
            let t_0 = calculate_t_k(&secret, 0)?;
            let p_0 = calculate_p_k(&secp, spend_pub, &t_0)?;

            let mut outputs = vec![xonly_bytes(&p_0)];
            for label in labels {
                let sum = p_0.combine(&label.pub_key)?;
                outputs.push(xonly_bytes(&sum));
                let diff = p_0.combine(&label.pub_key.negate(&secp))?;
                outputs.push(xonly_bytes(&diff));
            }
            Ok((secret, outputs))
        })
        .collect();

    let mut map = HashMap::new();
    for (secret, outputs) in items? {
        for output in outputs {
            map.insert(output, secret);
        }
    }
    Ok(map)
}

/// Check the created-UTXO filter against the candidate outputs.
pub(crate) fn check_block_outputs(
    filter: &BlockFilter,
    block_hash: &BlockHash,
    candidates: Vec<&[u8; 32]>,
) -> Result<bool> {
    // match_any returns true for an empty query
    if candidates.is_empty() {
        return Ok(false);
    }
    Ok(filter.match_any(block_hash, &mut candidates.into_iter().map(|c| c.as_slice()))?)
}

/// 8-byte hashes of owned outpoints against a given block hash, as the
/// oracle puts them into the spent filter and spent index.
pub(crate) fn input_hashes(
    utxos: &[OwnedUtxo],
    block_hash: &BlockHash,
) -> HashMap<[u8; 8], Outpoint> {
    let mut map = HashMap::new();
    for utxo in utxos {
        let mut arr = [0u8; 68];
        arr[..32].copy_from_slice(utxo.txid.as_bytes());
        arr[32..36].copy_from_slice(&utxo.vout.to_le_bytes());
        arr[36..].copy_from_slice(&block_hash.to_byte_array());
        let hash = sha256::Hash::hash(&arr);

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&hash.as_byte_array()[..8]);
        map.insert(prefix, utxo.outpoint());
    }
    map
}

/// Check the spent filter against our hashed outpoints.
pub(crate) fn check_block_inputs(
    filter: &BlockFilter,
    block_hash: &BlockHash,
    hashes: Vec<[u8; 8]>,
) -> Result<bool> {
    if hashes.is_empty() {
        return Ok(false);
    }
    Ok(filter.match_any(block_hash, &mut hashes.iter().map(|h| h.as_slice()))?)
}

/// Run the full receiver scan over a block's fetched UTXOs.
fn find_owned_in_utxos(
    spend_pub: &PublicKey,
    labels: &[Label],
    utxos: Vec<OracleUtxo>,
    secrets: &HashMap<[u8; 32], PublicKey>,
) -> Result<Vec<OwnedUtxo>> {
    let mut by_txid: HashMap<Txid, Vec<OracleUtxo>> = HashMap::new();
    for utxo in utxos {
        by_txid.entry(utxo.txid).or_default().push(utxo);
    }

    let mut res = Vec::new();
    for (txid, group) in by_txid {
        // a transaction is ours if any of its outputs hit the candidate map
        let secret = group.iter().find_map(|utxo| {
            if !utxo.script_pubkey.is_p2tr() {
                return None;
            }
            let mut key = [0u8; 32];
            key.copy_from_slice(&utxo.script_pubkey.as_bytes()[2..]);
            secrets.get(&key)
        });
        let Some(secret) = secret else { continue };

        let mut tx_outputs = Vec::new();
        for utxo in &group {
            if !utxo.script_pubkey.is_p2tr() {
                continue;
            }
            match XOnlyPublicKey::from_slice(&utxo.script_pubkey.as_bytes()[2..]) {
                Ok(xonly) => tx_outputs.push(xonly),
                Err(err) => log::error!("invalid x-only key in utxo script: {err}"),
            }
        }

        let founds = scan_transaction_with_shared_secret(secret, spend_pub, labels, tx_outputs)?;
        for found in founds {
            let output_bytes = found.output.serialize();
            let Some(utxo) = group.iter().find(|u| {
                u.script_pubkey.is_p2tr() && u.script_pubkey.as_bytes()[2..] == output_bytes
            }) else {
                continue;
            };
            if utxo.spent {
                continue;
            }
            res.push(OwnedUtxo {
                txid,
                vout: utxo.vout,
                amount: utxo.amount,
                priv_key_tweak: found.sec_key_tweak,
                pub_key: found.output,
                height: utxo.block_height,
                timestamp: utxo.timestamp,
                state: UtxoState::Unspent,
                label: found.label,
            });
        }
    }
    Ok(res)
}

/// Blocking per-block scanner over a [`FilterBackend`].
pub struct FilterScanner {
    backend: Box<dyn FilterBackend>,
    updater: Box<dyn Updater>,
    wallet: Arc<Mutex<Wallet>>,
    scan_key: SecretKey,
    spend_pub: PublicKey,
    labels: Vec<Label>,
    keep_scanning: Arc<AtomicBool>,
    dust_limit: Option<Amount>,
}

impl FilterScanner {
    /// Keys and labels are captured from the wallet; compute the labels you
    /// want scanned (at least the change label) before constructing.
    pub fn new(
        backend: Box<dyn FilterBackend>,
        updater: Box<dyn Updater>,
        wallet: Arc<Mutex<Wallet>>,
        keep_scanning: Arc<AtomicBool>,
        dust_limit: Option<Amount>,
    ) -> Self {
        let (scan_key, spend_pub, labels) = {
            let wallet = wallet.lock().expect("wallet lock");
            (
                wallet.sec_key_scan,
                wallet.pub_key_spend,
                wallet.label_slice(),
            )
        };
        FilterScanner {
            backend,
            updater,
            wallet,
            scan_key,
            spend_pub,
            labels,
            keep_scanning,
            dust_limit,
        }
    }

    /// Scan the inclusive range, blocking until done or interrupted via the
    /// shared flag. Wallet state is persisted through the updater on the
    /// last block and at most every 30 seconds in between.
    pub async fn scan_blocks(&mut self, start: u32, end: u32) -> Result<()> {
        if start > end {
            return Err(Error::InvalidRange(start, end));
        }

        log::info!("start: {start} end: {end}");
        let start_time = Instant::now();

        let stream = self.backend.block_data_stream(start..=end, self.dust_limit);
        pin_mut!(stream);

        let mut update_time = Instant::now();
        while let Some(block_data) = stream.next().await {
            let block_data = block_data?;
            let height = block_data.height;
            let block_hash = block_data.block_hash;

            if !self.keep_scanning.load(Ordering::Relaxed) {
                self.updater.save_to_persistent_storage()?;
                return Ok(());
            }

            // always save on the last block or after 30 seconds
            let mut save_to_storage =
                height == end || update_time.elapsed() > SAVE_INTERVAL;

            let found_outputs = self.process_block_outputs(&block_data).await?;
            if !found_outputs.is_empty() {
                save_to_storage = true;
                self.wallet
                    .lock()
                    .expect("wallet lock")
                    .add_utxos(found_outputs.iter().cloned());
                self.updater
                    .record_block_outputs(height, block_hash, found_outputs)?;
            }

            let found_inputs = self.process_block_inputs(&block_data).await?;
            if !found_inputs.is_empty() {
                save_to_storage = true;
                self.wallet
                    .lock()
                    .expect("wallet lock")
                    .mark_spent(&found_inputs);
                self.updater
                    .record_block_inputs(height, block_hash, found_inputs)?;
            }

            {
                let mut wallet = self.wallet.lock().expect("wallet lock");
                wallet.last_scan_height = wallet.last_scan_height.max(height);
            }
            self.updater.record_scan_progress(start, height, end)?;

            if save_to_storage {
                self.updater.save_to_persistent_storage()?;
                update_time = Instant::now();
            }
        }

        log::info!(
            "filter scan complete in {} seconds",
            start_time.elapsed().as_secs()
        );
        Ok(())
    }

    async fn process_block_outputs(
        &self,
        block_data: &FilterBlockData,
    ) -> Result<Vec<OwnedUtxo>> {
        if block_data.tweaks.is_empty() {
            return Ok(Vec::new());
        }

        let secrets = precompute_candidate_secrets(
            &self.scan_key,
            &self.spend_pub,
            &self.labels,
            &block_data.tweaks,
        )?;
        let candidates: Vec<&[u8; 32]> = secrets.keys().collect();

        let filter = BlockFilter::new(&block_data.new_utxo_filter.data);
        if !check_block_outputs(&filter, &block_data.new_utxo_filter.block_hash, candidates)? {
            return Ok(Vec::new());
        }

        log::info!("matched outputs on: {}", block_data.height);
        let utxos = self.backend.utxos(block_data.height).await?;
        find_owned_in_utxos(&self.spend_pub, &self.labels, utxos, &secrets)
    }

    async fn process_block_inputs(
        &self,
        block_data: &FilterBlockData,
    ) -> Result<Vec<Outpoint>> {
        let owned = self.wallet.lock().expect("wallet lock").get_utxos(&[
            UtxoState::Unconfirmed,
            UtxoState::Unspent,
            UtxoState::UnconfirmedSpent,
        ]);
        if owned.is_empty() {
            return Ok(Vec::new());
        }

        let block_hash = block_data.spent_filter.block_hash;
        let hashes = input_hashes(&owned, &block_hash);

        let filter = BlockFilter::new(&block_data.spent_filter.data);
        if !check_block_inputs(&filter, &block_hash, hashes.keys().copied().collect())? {
            return Ok(Vec::new());
        }

        log::info!("matched inputs on: {}", block_data.height);
        let spent = self.backend.spent_index(block_data.height).await?;
        Ok(spent
            .data
            .iter()
            .filter_map(|hash| hashes.get(hash))
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{FilterData, OracleStream, SpentIndexData};
    use crate::types::Network;
    use crate::updater::DummyUpdater;
    use async_trait::async_trait;
    use bitcoin::bip158::GcsFilterWriter;
    use futures::stream;
    use std::ops::RangeInclusive;
    use std::sync::atomic::AtomicUsize;

    const MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn test_wallet() -> Arc<Mutex<Wallet>> {
        Arc::new(Mutex::new(
            Wallet::new_from_mnemonic(MNEMONIC, Network::Regtest, 0).unwrap(),
        ))
    }

    /// Build raw GCS filter bytes the way the oracle does: BIP-158
    /// parameters, sip keys from the first 16 bytes of the block hash.
    fn build_filter(block_hash: &BlockHash, elements: &[&[u8]]) -> Vec<u8> {
        let bytes = block_hash.to_byte_array();
        let k0 = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let k1 = u64::from_le_bytes(bytes[8..16].try_into().unwrap());

        let mut out = Vec::new();
        let mut writer = GcsFilterWriter::new(&mut out, k0, k1, 784931, 19);
        for element in elements {
            writer.add_element(element);
        }
        writer.finish().unwrap();
        out
    }

    struct MockFilterBackend {
        blocks: Vec<FilterBlockData>,
        utxos: HashMap<u32, Vec<OracleUtxo>>,
        spent: HashMap<u32, SpentIndexData>,
        utxo_fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl FilterBackend for MockFilterBackend {
        fn block_data_stream(
            &self,
            range: RangeInclusive<u32>,
            _dust_limit: Option<Amount>,
        ) -> OracleStream<FilterBlockData> {
            let items: Vec<Result<FilterBlockData>> = self
                .blocks
                .iter()
                .filter(|b| range.contains(&b.height))
                .cloned()
                .map(Ok)
                .collect();
            Box::pin(stream::iter(items))
        }

        async fn utxos(&self, height: u32) -> Result<Vec<OracleUtxo>> {
            self.utxo_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.utxos.get(&height).cloned().unwrap_or_default())
        }

        async fn spent_index(&self, height: u32) -> Result<SpentIndexData> {
            Ok(self
                .spent
                .get(&height)
                .cloned()
                .unwrap_or_else(|| SpentIndexData {
                    block_hash: BlockHash::from_byte_array([0; 32]),
                    data: Vec::new(),
                }))
        }

        async fn block_height(&self) -> Result<u32> {
            Ok(self.blocks.iter().map(|b| b.height).max().unwrap_or(0))
        }
    }

    #[test]
    fn precompute_covers_base_and_label_combinations() {
        let secp = Secp256k1::new();
        let scan = SecretKey::from_slice(&[0xcd; 32]).unwrap();
        let spend_pub = SecretKey::from_slice(&[0xab; 32])
            .unwrap()
            .public_key(&secp);
        let label = Label::generate(&scan, 1).unwrap();
        let tweak = SecretKey::from_slice(&[0x31; 32])
            .unwrap()
            .public_key(&secp);

        let secrets =
            precompute_candidate_secrets(&scan, &spend_pub, &[label.clone()], &[tweak]).unwrap();
        assert_eq!(secrets.len(), 3);

        let secret = calculate_shared_secret(&tweak, &scan, None).unwrap();
        let t_0 = calculate_t_k(&secret, 0).unwrap();
        let p_0 = calculate_p_k(&secp, &spend_pub, &t_0).unwrap();
        assert!(secrets.contains_key(&xonly_bytes(&p_0)));
        assert!(secrets.contains_key(&xonly_bytes(&p_0.combine(&label.pub_key).unwrap())));
        let diff = p_0.combine(&label.pub_key.negate(&secp)).unwrap();
        assert!(secrets.contains_key(&xonly_bytes(&diff)));
        // every candidate maps back to the negotiated secret
        assert!(secrets.values().all(|s| *s == secret));
    }

    #[test]
    fn empty_candidate_set_never_matches() {
        let block_hash = BlockHash::from_byte_array([7; 32]);
        let filter_bytes = build_filter(&block_hash, &[b"something".as_slice()]);
        let filter = BlockFilter::new(&filter_bytes);
        assert!(!check_block_outputs(&filter, &block_hash, Vec::new()).unwrap());
    }

    #[test]
    fn filter_roundtrip_matches_contained_elements() {
        let block_hash = BlockHash::from_byte_array([9; 32]);
        let element = [0x42u8; 32];
        let filter_bytes = build_filter(&block_hash, &[element.as_slice()]);
        let filter = BlockFilter::new(&filter_bytes);

        assert!(check_block_outputs(&filter, &block_hash, vec![&element]).unwrap());
        let absent = [0x43u8; 32];
        // a different element may only match as a false positive, which the
        // parameters make wildly improbable for a single-entry filter
        assert!(!check_block_outputs(&filter, &block_hash, vec![&absent]).unwrap());
    }

    fn owned_output_case() -> (Arc<Mutex<Wallet>>, PublicKey, XOnlyPublicKey) {
        let wallet = test_wallet();
        let secp = Secp256k1::new();
        let (scan, spend_pub) = {
            let w = wallet.lock().unwrap();
            (w.sec_key_scan, w.pub_key_spend)
        };
        let tweak = SecretKey::from_slice(&[0x31; 32])
            .unwrap()
            .public_key(&secp);
        let secret = calculate_shared_secret(&tweak, &scan, None).unwrap();
        let t_0 = calculate_t_k(&secret, 0).unwrap();
        let p_0 = calculate_p_k(&secp, &spend_pub, &t_0).unwrap();
        (wallet, tweak, p_0.x_only_public_key().0)
    }

    fn p2tr_script(xonly: &XOnlyPublicKey) -> bitcoin::ScriptBuf {
        let mut script = vec![0x51, 0x20];
        script.extend_from_slice(&xonly.serialize());
        bitcoin::ScriptBuf::from_bytes(script)
    }

    #[tokio::test]
    async fn matching_block_is_fetched_and_scanned() {
        let (wallet, tweak, xonly) = owned_output_case();
        let block_hash = BlockHash::from_byte_array([1; 32]);
        let other_hash = BlockHash::from_byte_array([2; 32]);
        let txid = Txid::from_internal_bytes([5; 32]);

        let matching = FilterBlockData {
            height: 100,
            block_hash,
            tweaks: vec![tweak],
            new_utxo_filter: FilterData {
                block_hash,
                data: build_filter(&block_hash, &[&xonly.serialize()]),
            },
            spent_filter: FilterData {
                block_hash,
                data: build_filter(&block_hash, &[b"unrelated".as_slice()]),
            },
        };
        // same tweaks, but the filter holds nothing of ours
        let empty = FilterBlockData {
            height: 101,
            block_hash: other_hash,
            tweaks: vec![tweak],
            new_utxo_filter: FilterData {
                block_hash: other_hash,
                data: build_filter(&other_hash, &[b"unrelated".as_slice()]),
            },
            spent_filter: FilterData {
                block_hash: other_hash,
                data: build_filter(&other_hash, &[b"unrelated".as_slice()]),
            },
        };

        let fetches = Arc::new(AtomicUsize::new(0));
        let backend = MockFilterBackend {
            blocks: vec![matching, empty],
            utxos: HashMap::from([(
                100,
                vec![OracleUtxo {
                    txid,
                    vout: 0,
                    amount: Amount::from_sat(21_000),
                    script_pubkey: p2tr_script(&xonly),
                    block_height: 100,
                    block_hash: block_hash.to_byte_array(),
                    timestamp: 0,
                    spent: false,
                }],
            )]),
            spent: HashMap::new(),
            utxo_fetches: fetches.clone(),
        };

        let mut scanner = FilterScanner::new(
            Box::new(backend),
            Box::new(DummyUpdater::new()),
            wallet.clone(),
            Arc::new(AtomicBool::new(true)),
            None,
        );
        scanner.scan_blocks(100, 101).await.unwrap();

        // the non-matching block was skipped without fetching utxos
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        let wallet = wallet.lock().unwrap();
        let utxos = wallet.get_utxos(&[]);
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].pub_key, xonly);
        assert_eq!(utxos[0].amount, Amount::from_sat(21_000));
        assert_eq!(wallet.last_scan_height, 101);
    }

    #[tokio::test]
    async fn spent_filter_marks_owned_outpoints() {
        let (wallet, _, xonly) = owned_output_case();
        let txid = Txid::from_internal_bytes([5; 32]);
        let existing = OwnedUtxo {
            txid,
            vout: 0,
            amount: Amount::from_sat(21_000),
            priv_key_tweak: SecretKey::from_slice(&[1; 32]).unwrap(),
            pub_key: xonly,
            height: 100,
            timestamp: 0,
            state: UtxoState::Unspent,
            label: None,
        };
        wallet.lock().unwrap().add_utxos([existing.clone()]);

        let block_hash = BlockHash::from_byte_array([3; 32]);
        let hashes = input_hashes(&[existing.clone()], &block_hash);
        let hash = *hashes.keys().next().unwrap();

        let block = FilterBlockData {
            height: 102,
            block_hash,
            tweaks: Vec::new(),
            new_utxo_filter: FilterData {
                block_hash,
                data: build_filter(&block_hash, &[b"unrelated".as_slice()]),
            },
            spent_filter: FilterData {
                block_hash,
                data: build_filter(&block_hash, &[hash.as_slice()]),
            },
        };
        let backend = MockFilterBackend {
            blocks: vec![block],
            utxos: HashMap::new(),
            spent: HashMap::from([(
                102,
                SpentIndexData {
                    block_hash,
                    data: vec![hash],
                },
            )]),
            utxo_fetches: Arc::new(AtomicUsize::new(0)),
        };

        let mut scanner = FilterScanner::new(
            Box::new(backend),
            Box::new(DummyUpdater::new()),
            wallet.clone(),
            Arc::new(AtomicBool::new(true)),
            None,
        );
        scanner.scan_blocks(102, 102).await.unwrap();

        let states: Vec<UtxoState> = wallet
            .lock()
            .unwrap()
            .get_utxos(&[])
            .iter()
            .map(|u| u.state)
            .collect();
        assert_eq!(states, vec![UtxoState::Spent]);
    }

    #[tokio::test]
    async fn interrupt_flag_stops_between_blocks() {
        let (wallet, tweak, _) = owned_output_case();
        let block_hash = BlockHash::from_byte_array([4; 32]);
        let block = FilterBlockData {
            height: 100,
            block_hash,
            tweaks: vec![tweak],
            new_utxo_filter: FilterData {
                block_hash,
                data: build_filter(&block_hash, &[b"x".as_slice()]),
            },
            spent_filter: FilterData {
                block_hash,
                data: build_filter(&block_hash, &[b"x".as_slice()]),
            },
        };
        let backend = MockFilterBackend {
            blocks: vec![block],
            utxos: HashMap::new(),
            spent: HashMap::new(),
            utxo_fetches: Arc::new(AtomicUsize::new(0)),
        };

        let keep_scanning = Arc::new(AtomicBool::new(false));
        let mut scanner = FilterScanner::new(
            Box::new(backend),
            Box::new(DummyUpdater::new()),
            wallet.clone(),
            keep_scanning,
            None,
        );
        scanner.scan_blocks(100, 100).await.unwrap();
        // nothing processed, the flag was already lowered
        assert_eq!(wallet.lock().unwrap().last_scan_height, 0);
    }
}
