use std::ops::RangeInclusive;

use async_trait::async_trait;
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Amount, BlockHash};

use super::{OracleStream, OracleUtxo};
use crate::error::Result;

/// A BIP-158 filter payload for one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterData {
    pub block_hash: BlockHash,
    pub data: Vec<u8>,
}

/// The block's spent-outpoint index: 8-byte hashed outpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpentIndexData {
    pub block_hash: BlockHash,
    pub data: Vec<[u8; 8]>,
}

/// Everything the per-block filter scanner needs up front for one block.
#[derive(Debug, Clone)]
pub struct FilterBlockData {
    pub height: u32,
    pub block_hash: BlockHash,
    pub tweaks: Vec<PublicKey>,
    pub new_utxo_filter: FilterData,
    pub spent_filter: FilterData,
}

/// Data source for the legacy per-block scan variant: tweak lists and GCS
/// filters per height, with UTXOs and the spent index fetched lazily only
/// for blocks the filters match.
#[async_trait]
pub trait FilterBackend: Send + Sync {
    /// Stream tweaks and filters for an inclusive height range.
    fn block_data_stream(
        &self,
        range: RangeInclusive<u32>,
        dust_limit: Option<Amount>,
    ) -> OracleStream<FilterBlockData>;

    /// UTXOs created at `height`.
    async fn utxos(&self, height: u32) -> Result<Vec<OracleUtxo>>;

    /// Hashed spent outpoints for `height`.
    async fn spent_index(&self, height: u32) -> Result<SpentIndexData>;

    /// Current chain tip as seen by the oracle.
    async fn block_height(&self) -> Result<u32>;
}
