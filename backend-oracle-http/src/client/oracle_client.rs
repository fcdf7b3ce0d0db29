use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use bitcoin::hashes::Hash;
use bitcoin::hex::FromHex;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Amount, BlockHash, ScriptBuf};
use serde::Deserialize;
use url::Url;

use spr_core::oracle::{FilterData, OracleCapabilities, OracleInfo, OracleUtxo, SpentIndexData};
use spr_core::types::{array_from_hex, reverse_bytes, Txid};

use super::http_trait::HttpClient;

/// The two per-block filters the oracle serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Spent,
    NewUtxos,
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterType::Spent => write!(f, "spent"),
            FilterType::NewUtxos => write!(f, "new-utxos"),
        }
    }
}

#[derive(Deserialize)]
struct BlockHeightRaw {
    block_height: u64,
}

#[derive(Deserialize)]
struct InfoRaw {
    network: String,
    height: u64,
    #[serde(default)]
    tweaks_only: bool,
    #[serde(default)]
    tweaks_full_basic: bool,
    #[serde(default)]
    tweaks_full_with_dust_filter: bool,
    #[serde(default)]
    tweaks_cut_through_with_dust_filter: bool,
}

#[derive(Deserialize)]
struct FilterRaw {
    #[serde(default)]
    #[allow(dead_code)]
    filter_type: u8,
    #[serde(default)]
    #[allow(dead_code)]
    block_height: u64,
    #[serde(default)]
    block_hash: String,
    #[serde(default)]
    data: String,
}

#[derive(Deserialize)]
struct UtxoRaw {
    txid: String,
    vout: u32,
    value: u64,
    scriptpubkey: String,
    block_height: u64,
    block_hash: String,
    timestamp: u64,
    spent: bool,
}

#[derive(Deserialize)]
struct SpentIndexRaw {
    block_hash: String,
    data: Vec<String>,
}

/// All hashes on the wire are reversed; internal form is their byte-reverse.
fn block_hash_from_wire(field: &'static str, hex: &str) -> Result<BlockHash> {
    let wire = array_from_hex::<32>(field, hex)?;
    Ok(BlockHash::from_byte_array(reverse_bytes(&wire)))
}

/// Client for the legacy HTTP+JSON oracle, generic over the HTTP library.
#[derive(Clone)]
pub struct OracleHttpClient<H: HttpClient> {
    http_client: H,
    host_url: Url,
}

impl<H: HttpClient> OracleHttpClient<H> {
    pub fn new(host_url: String, http_client: H) -> Result<Self> {
        let mut host_url = Url::parse(&host_url)?;

        // joins need a trailing slash, append one if absent
        if !host_url.path().ends_with('/') {
            host_url.set_path(&format!("{}/", host_url.path()));
        }

        Ok(OracleHttpClient {
            http_client,
            host_url,
        })
    }

    pub async fn block_height(&self) -> Result<u64> {
        let url = self.host_url.join("block-height")?;
        let body = self.http_client.get(url.as_str(), &[]).await?;
        let response: BlockHeightRaw = serde_json::from_str(&body)?;
        Ok(response.block_height)
    }

    pub async fn info(&self) -> Result<OracleInfo> {
        let url = self.host_url.join("info")?;
        let body = self.http_client.get(url.as_str(), &[]).await?;
        let raw: InfoRaw = serde_json::from_str(&body)?;
        Ok(OracleInfo {
            network: raw.network,
            height: raw.height,
            capabilities: OracleCapabilities {
                tweaks_only: raw.tweaks_only,
                tweaks_full_basic: raw.tweaks_full_basic,
                tweaks_full_with_dust_filter: raw.tweaks_full_with_dust_filter,
                tweaks_cut_through_with_dust_filter: raw.tweaks_cut_through_with_dust_filter,
            },
        })
    }

    /// The 33-byte public tweak components of a block's eligible transactions.
    pub async fn tweaks(&self, height: u32, dust_limit: Option<Amount>) -> Result<Vec<PublicKey>> {
        let url = self.host_url.join(&format!("tweaks/{height}"))?;
        let mut query = Vec::new();
        if let Some(dust_limit) = dust_limit {
            query.push(("dustLimit", dust_limit.to_sat().to_string()));
        }
        let body = self.http_client.get(url.as_str(), &query).await?;

        let raw: Vec<String> = serde_json::from_str(&body)?;
        let mut tweaks = Vec::with_capacity(raw.len());
        for hex in raw {
            // 33 bytes compressed, nothing else is acceptable
            if hex.len() != 66 {
                bail!("invalid tweak hex length: {}", hex.len());
            }
            tweaks.push(PublicKey::from_str(&hex)?);
        }
        Ok(tweaks)
    }

    pub async fn filter(&self, filter_type: FilterType, height: u32) -> Result<FilterData> {
        let url = self
            .host_url
            .join(&format!("filter/{filter_type}/{height}"))?;
        let body = self.http_client.get(url.as_str(), &[]).await?;

        let raw: FilterRaw = serde_json::from_str(&body)?;
        if raw.block_hash.is_empty() {
            // the oracle answers with an empty hash for blocks it misses
            bail!("no filter for block {height}: {body}");
        }

        Ok(FilterData {
            block_hash: block_hash_from_wire("block_hash", &raw.block_hash)?,
            data: Vec::<u8>::from_hex(&raw.data)?,
        })
    }

    pub async fn utxos(&self, height: u32) -> Result<Vec<OracleUtxo>> {
        let url = self.host_url.join(&format!("utxos/{height}"))?;
        let body = self.http_client.get(url.as_str(), &[]).await?;

        let raw: Vec<UtxoRaw> = serde_json::from_str(&body)?;
        let mut utxos = Vec::with_capacity(raw.len());
        for entry in raw {
            let script = array_from_hex::<34>("scriptpubkey", &entry.scriptpubkey)?;
            utxos.push(OracleUtxo {
                txid: Txid::from_str(&entry.txid)?,
                vout: entry.vout,
                amount: Amount::from_sat(entry.value),
                script_pubkey: ScriptBuf::from_bytes(script.to_vec()),
                block_height: u32::try_from(entry.block_height)?,
                block_hash: reverse_bytes(&array_from_hex::<32>(
                    "block_hash",
                    &entry.block_hash,
                )?),
                timestamp: entry.timestamp,
                spent: entry.spent,
            });
        }
        Ok(utxos)
    }

    pub async fn spent_index(&self, height: u32) -> Result<SpentIndexData> {
        let url = self.host_url.join(&format!("spent-index/{height}"))?;
        let body = self.http_client.get(url.as_str(), &[]).await?;

        let raw: SpentIndexRaw = serde_json::from_str(&body)?;
        let mut data = Vec::with_capacity(raw.data.len());
        for hex in raw.data {
            // 8-byte hashed outpoints, 16 hex chars each
            data.push(array_from_hex::<8>("spent-index entry", &hex)?);
        }

        Ok(SpentIndexData {
            block_hash: block_hash_from_wire("block_hash", &raw.block_hash)?,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_hash_wire_decoding_reverses() {
        let wire = "000000000000000000024bead8df69990852c202db0e0097c1a12ea637d7e96d";
        let hash = block_hash_from_wire("block_hash", wire).unwrap();
        // internal form is the reverse, BlockHash displays big-endian again
        assert_eq!(hash.to_byte_array()[31], 0x00);
        assert_eq!(hash.to_byte_array()[0], 0x6d);
    }

    #[test]
    fn filter_without_block_hash_is_an_error() {
        let raw: FilterRaw =
            serde_json::from_str(r#"{"filter_type":4,"block_height":1,"block_hash":"","data":""}"#)
                .unwrap();
        assert!(raw.block_hash.is_empty());
    }

    #[test]
    fn spent_index_rejects_wrong_entry_length() {
        assert!(array_from_hex::<8>("spent-index entry", "aabbccddeeff0011").is_ok());
        assert!(array_from_hex::<8>("spent-index entry", "aabb").is_err());
        // the 66-char form documented by an old comment is wrong, 16 is the
        // only valid length
        assert!(array_from_hex::<8>(
            "spent-index entry",
            "02e0a1b8b4f9c1f2e3d4c5b6a79881726354453627181900aabbccddeeff00112233"
        )
        .is_err());
    }

    #[test]
    fn utxo_raw_decodes_into_internal_forms() {
        let json = r#"{
            "txid": "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b",
            "vout": 1,
            "value": 54321,
            "scriptpubkey": "51201111111111111111111111111111111111111111111111111111111111111111",
            "block_height": 800000,
            "block_hash": "000000000000000000024bead8df69990852c202db0e0097c1a12ea637d7e96d",
            "timestamp": 1690168629,
            "spent": false
        }"#;
        let raw: UtxoRaw = serde_json::from_str(json).unwrap();
        let script = array_from_hex::<34>("scriptpubkey", &raw.scriptpubkey).unwrap();
        let script = ScriptBuf::from_bytes(script.to_vec());
        assert!(script.is_p2tr());

        let txid = Txid::from_str(&raw.txid).unwrap();
        assert_eq!(
            txid.to_string(),
            "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b"
        );
        // internal form starts with the last wire byte
        assert_eq!(txid.as_bytes()[0], 0x3b);
    }
}
