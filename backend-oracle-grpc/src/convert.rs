//! Wire-to-core conversions with validation.
//!
//! Txids and block hashes arrive in reversed (wire) order and are flipped
//! into internal form here; short-output payloads must be whole multiples
//! of 8 bytes, tweaks valid 33-byte compressed points.

use bitcoin::secp256k1::PublicKey;
use bitcoin::{Amount, ScriptBuf};

use spr_core::oracle::{
    BlockIdentifier, BlockScanDataShort, ComputeIndexBlock, ComputeIndexTxItem, FullBlock,
    OracleCapabilities, OracleInfo, OracleUtxo,
};
use spr_core::types::{reverse_bytes, Txid};
use spr_core::{Error, Result};

use crate::pb;

fn fixed<const N: usize>(field: &'static str, bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| Error::InvalidLength {
        field,
        expected: N,
        got: bytes.len(),
    })
}

fn height(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::HeightOutOfRange(value))
}

pub(crate) fn info(pb: pb::InfoResponse) -> OracleInfo {
    OracleInfo {
        network: pb.network,
        height: pb.height,
        capabilities: OracleCapabilities {
            tweaks_only: pb.tweaks_only,
            tweaks_full_basic: pb.tweaks_full_basic,
            tweaks_full_with_dust_filter: pb.tweaks_full_with_dust_filter,
            tweaks_cut_through_with_dust_filter: pb.tweaks_cut_through_with_dust_filter,
        },
    }
}

pub(crate) fn block_identifier(pb: Option<pb::BlockIdentifier>) -> Result<BlockIdentifier> {
    let pb = pb.ok_or(Error::MissingField("block_identifier"))?;
    Ok(BlockIdentifier {
        height: height(pb.block_height)?,
        hash: reverse_bytes(&fixed::<32>("block_hash", &pb.block_hash)?),
    })
}

pub(crate) fn tx_item(pb: pb::ComputeIndexTxItem) -> Result<ComputeIndexTxItem> {
    if pb.outputs_short.len() % 8 != 0 {
        return Err(Error::InvalidLength {
            field: "outputs_short",
            expected: 8,
            got: pb.outputs_short.len(),
        });
    }
    Ok(ComputeIndexTxItem {
        txid: Txid::from_wire_bytes(fixed::<32>("txid", &pb.txid)?),
        outputs_short: pb.outputs_short,
        tweak: PublicKey::from_slice(&pb.tweak)?,
    })
}

pub(crate) fn compute_index_block(pb: pb::ComputeIndexBlock) -> Result<ComputeIndexBlock> {
    Ok(ComputeIndexBlock {
        identifier: block_identifier(pb.block_identifier)?,
        tx_items: pb
            .tx_items
            .into_iter()
            .map(tx_item)
            .collect::<Result<Vec<_>>>()?,
    })
}

pub(crate) fn block_scan_data_short(pb: pb::BlockScanDataShort) -> Result<BlockScanDataShort> {
    if pb.spent_outputs.len() % 8 != 0 {
        return Err(Error::InvalidLength {
            field: "spent_outputs",
            expected: 8,
            got: pb.spent_outputs.len(),
        });
    }
    Ok(BlockScanDataShort {
        identifier: block_identifier(pb.block_identifier)?,
        tx_items: pb
            .tx_items
            .into_iter()
            .map(tx_item)
            .collect::<Result<Vec<_>>>()?,
        spent_outputs: pb.spent_outputs,
    })
}

pub(crate) fn utxo(pb: pb::Utxo) -> Result<OracleUtxo> {
    let script = fixed::<34>("script_pub_key", &pb.script_pub_key)?;
    Ok(OracleUtxo {
        txid: Txid::from_wire_bytes(fixed::<32>("txid", &pb.txid)?),
        vout: pb.vout,
        amount: Amount::from_sat(pb.value),
        script_pubkey: ScriptBuf::from_bytes(script.to_vec()),
        block_height: height(pb.block_height)?,
        block_hash: reverse_bytes(&fixed::<32>("block_hash", &pb.block_hash)?),
        timestamp: pb.timestamp,
        spent: pb.spent,
    })
}

pub(crate) fn full_block(pb: pb::FullBlockResponse) -> Result<FullBlock> {
    Ok(FullBlock {
        identifier: block_identifier(pb.block_identifier)?,
        utxos: pb
            .utxos
            .into_iter()
            .map(utxo)
            .collect::<Result<Vec<_>>>()?,
    })
}
