//! Completion of probable matches into fully owned UTXOs.

use std::collections::{BTreeMap, HashMap};

use bitcoin::hex::DisplayHex;
use bitcoin::secp256k1::{PublicKey, SecretKey, XOnlyPublicKey};

use super::txscan::{scan_transaction, FoundOutputShort};
use crate::error::{Error, Result};
use crate::oracle::{Oracle, OracleUtxo};
use crate::protocol::Label;
use crate::wallet::{OwnedUtxo, UtxoState};

/// Re-run the receiver scan for each probable match against the full 32-byte
/// outputs of its transaction.
///
/// Founds are grouped by height so each block is fetched once. Every full
/// scan receives its own copy of the 33-byte tweak: several founds may share
/// one, and the public component must survive each call unchanged. 8-byte
/// prefix collisions complete to nothing and are not an error; a verified
/// output missing from the fetched block is.
pub(crate) async fn complete_found_short_outputs(
    oracle: &dyn Oracle,
    scan_key: &SecretKey,
    spend_pub: &PublicKey,
    labels: &[Label],
    founds: &[FoundOutputShort],
) -> Result<Vec<OwnedUtxo>> {
    let mut by_height: BTreeMap<u32, Vec<&FoundOutputShort>> = BTreeMap::new();
    for found in founds {
        by_height.entry(found.height).or_default().push(found);
    }

    let mut owned = Vec::new();
    for (height, group) in by_height {
        let block = oracle.get_full_block(height).await?;

        for short in group {
            let mut tx_outputs: Vec<XOnlyPublicKey> = Vec::new();
            let mut details: HashMap<XOnlyPublicKey, &OracleUtxo> = HashMap::new();
            for utxo in &block.utxos {
                if utxo.txid != short.txid || !utxo.script_pubkey.is_p2tr() {
                    continue;
                }
                match XOnlyPublicKey::from_slice(&utxo.script_pubkey.as_bytes()[2..]) {
                    Ok(xonly) => {
                        tx_outputs.push(xonly);
                        details.insert(xonly, utxo);
                    }
                    Err(_) => {
                        log::error!(
                            "unparseable x-only key in utxo script: {}",
                            utxo.script_pubkey.as_bytes().as_hex()
                        );
                    }
                }
            }

            let tweak = short.tweak;
            let verified =
                scan_transaction(scan_key, spend_pub, labels, tx_outputs, &tweak, None)?;

            for found in verified {
                let Some(utxo) = details.get(&found.output) else {
                    return Err(Error::OutputNotInBlock {
                        output: found.output.serialize().as_hex().to_string(),
                        height,
                    });
                };
                let state = if utxo.spent {
                    UtxoState::Spent
                } else {
                    UtxoState::Unspent
                };
                owned.push(OwnedUtxo {
                    txid: utxo.txid,
                    vout: utxo.vout,
                    amount: utxo.amount,
                    priv_key_tweak: found.sec_key_tweak,
                    pub_key: found.output,
                    height: short.height,
                    timestamp: utxo.timestamp,
                    state,
                    label: found.label,
                });
            }
        }
    }

    Ok(owned)
}
