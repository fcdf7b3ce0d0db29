//! Oracle data source abstraction.
//!
//! The scan engine consumes a remote "compute index" oracle through the
//! [`Oracle`] trait; the legacy per-block variant uses the narrower
//! [`FilterBackend`]. Transports (HTTP+JSON, streaming RPC) live in their own
//! crates and normalize everything into the records defined here: txids and
//! block hashes arrive in internal (little-endian) byte order, amounts in
//! satoshis.

mod filter_backend;

use std::ops::RangeInclusive;
use std::pin::Pin;

use async_trait::async_trait;
use bitcoin::secp256k1::PublicKey;
use bitcoin::Amount;
use futures::Stream;

use crate::error::Result;
use crate::types::Txid;

pub use filter_backend::{FilterBackend, FilterBlockData, FilterData, SpentIndexData};

/// Stream of oracle records, pinned and `Send` for the worker pool.
pub type OracleStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Identifies the block a record belongs to. The hash is in internal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockIdentifier {
    pub height: u32,
    pub hash: [u8; 32],
}

/// Per-transaction compute-index entry: the 8-byte prefixes of every
/// eligible output plus the transaction's public tweak component.
#[derive(Debug, Clone)]
pub struct ComputeIndexTxItem {
    pub txid: Txid,
    /// Concatenated N x 8-byte x-only output prefixes.
    pub outputs_short: Vec<u8>,
    pub tweak: PublicKey,
}

/// One block of compute-index data (the short-output fast path).
#[derive(Debug, Clone)]
pub struct ComputeIndexBlock {
    pub identifier: BlockIdentifier,
    pub tx_items: Vec<ComputeIndexTxItem>,
}

/// Compute-index data plus the block's spent-output prefixes, used when the
/// caller also tracks spends.
#[derive(Debug, Clone)]
pub struct BlockScanDataShort {
    pub identifier: BlockIdentifier,
    pub tx_items: Vec<ComputeIndexTxItem>,
    /// Concatenated M x 8-byte spent output pubkey prefixes.
    pub spent_outputs: Vec<u8>,
}

/// A taproot UTXO as served by the oracle's full-block endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleUtxo {
    pub txid: Txid,
    pub vout: u32,
    pub amount: Amount,
    /// 34 bytes, `OP_PUSHNUM_1 OP_PUSHBYTES_32 <x-only>`.
    pub script_pubkey: bitcoin::ScriptBuf,
    pub block_height: u32,
    pub block_hash: [u8; 32],
    pub timestamp: u64,
    pub spent: bool,
}

/// All UTXOs created in one block.
#[derive(Debug, Clone)]
pub struct FullBlock {
    pub identifier: BlockIdentifier,
    pub utxos: Vec<OracleUtxo>,
}

/// Which index variants the oracle can serve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OracleCapabilities {
    pub tweaks_only: bool,
    pub tweaks_full_basic: bool,
    pub tweaks_full_with_dust_filter: bool,
    pub tweaks_cut_through_with_dust_filter: bool,
}

#[derive(Debug, Clone)]
pub struct OracleInfo {
    pub network: String,
    pub height: u64,
    pub capabilities: OracleCapabilities,
}

/// A streaming compute-index oracle.
///
/// Implementations are transport-specific but semantically identical; the
/// engine never sees wire formats. The oracle is trusted to advance
/// monotonically, reorg handling is out of scope.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Current tip and capabilities.
    async fn get_info(&self) -> Result<OracleInfo>;

    /// Stream per-block compute-index data for an inclusive height range.
    async fn stream_compute_index(
        &self,
        range: RangeInclusive<u32>,
        dust_limit: Option<Amount>,
    ) -> Result<OracleStream<ComputeIndexBlock>>;

    /// Like [`Oracle::stream_compute_index`] but with each block's spent
    /// output prefixes attached.
    async fn stream_block_scan_data_short(
        &self,
        range: RangeInclusive<u32>,
        dust_limit: Option<Amount>,
    ) -> Result<OracleStream<BlockScanDataShort>>;

    /// Fetch a single block's full UTXO data.
    async fn get_full_block(&self, height: u32) -> Result<FullBlock>;

    /// Stream full UTXO data for a range of blocks.
    async fn stream_block_batch_full(
        &self,
        range: RangeInclusive<u32>,
    ) -> Result<OracleStream<FullBlock>>;
}
