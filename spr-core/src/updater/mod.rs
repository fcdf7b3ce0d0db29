//! Persistence hooks for scan results and progress.
//!
//! The core never writes storage itself; embedders implement [`Updater`]
//! against their database or file format. [`DummyUpdater`] discards
//! everything and suits tests and stateless scans.

use bitcoin::BlockHash;

use crate::error::Result;
use crate::types::Outpoint;
use crate::wallet::OwnedUtxo;

pub trait Updater: Send {
    /// Record the scanning progress.
    fn record_scan_progress(&mut self, start: u32, current: u32, end: u32) -> Result<()>;

    /// Record the outputs found in a block.
    fn record_block_outputs(
        &mut self,
        height: u32,
        block_hash: BlockHash,
        found_outputs: Vec<OwnedUtxo>,
    ) -> Result<()>;

    /// Record the owned outpoints a block spent.
    fn record_block_inputs(
        &mut self,
        height: u32,
        block_hash: BlockHash,
        found_inputs: Vec<Outpoint>,
    ) -> Result<()>;

    /// Flush all recorded changes to persistent storage.
    fn save_to_persistent_storage(&mut self) -> Result<()>;
}

#[derive(Default)]
pub struct DummyUpdater;

impl DummyUpdater {
    pub fn new() -> Self {
        Self
    }
}

impl Updater for DummyUpdater {
    fn record_scan_progress(&mut self, _start: u32, _current: u32, _end: u32) -> Result<()> {
        Ok(())
    }

    fn record_block_outputs(
        &mut self,
        _height: u32,
        _block_hash: BlockHash,
        _found_outputs: Vec<OwnedUtxo>,
    ) -> Result<()> {
        Ok(())
    }

    fn record_block_inputs(
        &mut self,
        _height: u32,
        _block_hash: BlockHash,
        _found_inputs: Vec<Outpoint>,
    ) -> Result<()> {
        Ok(())
    }

    fn save_to_persistent_storage(&mut self) -> Result<()> {
        Ok(())
    }
}
