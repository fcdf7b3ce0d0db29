use std::collections::HashMap;

use crate::types::Outpoint;
use crate::wallet::OwnedUtxo;

/// Match a block's 8-byte spent-output prefixes against wallet UTXOs.
///
/// Returns the outpoints of every UTXO whose pubkey prefix appears in
/// `spent_outputs`. Purely a matcher: state transitions are the caller's job
/// and are only ever towards `Spent`.
pub fn match_spent_utxos(utxos: &[OwnedUtxo], spent_outputs: &[[u8; 8]]) -> Vec<Outpoint> {
    if utxos.is_empty() || spent_outputs.is_empty() {
        return Vec::new();
    }

    let mut by_prefix: HashMap<[u8; 8], Vec<Outpoint>> = HashMap::new();
    for utxo in utxos {
        by_prefix
            .entry(utxo.pub_key_prefix())
            .or_default()
            .push(utxo.outpoint());
    }

    spent_outputs
        .iter()
        .filter_map(|prefix| by_prefix.get(prefix))
        .flatten()
        .copied()
        .collect()
}
