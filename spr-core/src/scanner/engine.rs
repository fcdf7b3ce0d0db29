//! Streaming parallel scan engine.
//!
//! One producer consumes the oracle stream and feeds normalized block
//! records into a bounded work queue; a fixed pool of workers runs the
//! per-transaction short scan, completes matches into owned UTXOs, applies
//! spent matching against the attached wallet and reports progress.
//!
//! Subscribers observe the scan through single-consumer rendezvous
//! channels; a subscriber that does not drain stalls the workers, which is
//! intentional. Blocks are handed to workers in ascending height but may
//! complete out of order, so `last_scan_height` advances by max-assign.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use bitcoin::secp256k1::{PublicKey, SecretKey};
use bitcoin::Amount;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::completer::complete_found_short_outputs;
use super::spent::match_spent_utxos;
use super::txscan::{scan_transaction_short, FoundOutputShort};
use crate::constants::{SCAN_WORKERS, WORK_QUEUE_CAPACITY};
use crate::error::{Error, Result};
use crate::oracle::{
    BlockIdentifier, BlockScanDataShort, ComputeIndexBlock, ComputeIndexTxItem, Oracle,
};
use crate::protocol::Label;
use crate::wallet::{OwnedUtxo, UtxoState, Wallet};

/// A block record normalized from either oracle stream.
struct BlockWork {
    identifier: BlockIdentifier,
    tx_items: Vec<ComputeIndexTxItem>,
    spent_outputs: Vec<[u8; 8]>,
}

impl From<ComputeIndexBlock> for BlockWork {
    fn from(block: ComputeIndexBlock) -> Self {
        BlockWork {
            identifier: block.identifier,
            tx_items: block.tx_items,
            spent_outputs: Vec::new(),
        }
    }
}

impl From<BlockScanDataShort> for BlockWork {
    fn from(block: BlockScanDataShort) -> Self {
        let spent_outputs = block
            .spent_outputs
            .chunks_exact(8)
            .map(|chunk| {
                let mut prefix = [0u8; 8];
                prefix.copy_from_slice(chunk);
                prefix
            })
            .collect();
        BlockWork {
            identifier: block.identifier,
            tx_items: block.tx_items,
            spent_outputs,
        }
    }
}

struct Slot<T> {
    bound: bool,
    sender: Option<mpsc::Sender<T>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Slot {
            bound: false,
            sender: None,
        }
    }
}

impl<T> Slot<T> {
    /// Bind the single consumer. Binding twice is a programmer error.
    fn bind(&mut self, name: &str) -> mpsc::Receiver<T> {
        if self.bound {
            panic!("{name} subscription can only be bound once");
        }
        self.bound = true;
        // rendezvous-style: the smallest buffer tokio offers
        let (tx, rx) = mpsc::channel(1);
        self.sender = Some(tx);
        rx
    }
}

#[derive(Default)]
struct Subscriptions {
    probable: Slot<FoundOutputShort>,
    owned: Slot<OwnedUtxo>,
    spent: Slot<OwnedUtxo>,
    progress: Slot<u32>,
}

struct ScannerInner {
    oracle: Arc<dyn Oracle>,
    scan_key: SecretKey,
    spend_pub: PublicKey,
    labels: Vec<Label>,
    dust_limit: Option<Amount>,
    last_scan_height: AtomicU32,
    scanning: AtomicBool,
    stop: CancellationToken,
    wallet: Mutex<Option<Arc<Mutex<Wallet>>>>,
    subs: Mutex<Subscriptions>,
}

/// The streaming scanner over a compute-index oracle.
pub struct SpScanner {
    inner: Arc<ScannerInner>,
}

impl SpScanner {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        scan_key: SecretKey,
        spend_pub: PublicKey,
        labels: Vec<Label>,
        dust_limit: Option<Amount>,
    ) -> Self {
        SpScanner {
            inner: Arc::new(ScannerInner {
                oracle,
                scan_key,
                spend_pub,
                labels,
                dust_limit,
                last_scan_height: AtomicU32::new(0),
                scanning: AtomicBool::new(false),
                stop: CancellationToken::new(),
                wallet: Mutex::new(None),
                subs: Mutex::new(Subscriptions::default()),
            }),
        }
    }

    /// Attach a wallet. Scans then pull spent-output data, insert found
    /// UTXOs and apply spent matching. The wallet holds no reference back.
    pub fn attach_wallet(&self, wallet: Arc<Mutex<Wallet>>) -> Result<()> {
        let mut slot = self.inner.wallet.lock().expect("wallet lock");
        if slot.is_some() {
            return Err(Error::WalletAlreadyAttached);
        }
        *slot = Some(wallet);
        Ok(())
    }

    /// Probable (prefix-matched, unverified) outputs.
    ///
    /// Panics when bound a second time.
    pub fn subscribe_probable(&self) -> mpsc::Receiver<FoundOutputShort> {
        self.inner.subs.lock().expect("subs lock").probable.bind("probable")
    }

    /// Fully verified owned UTXOs. Panics when bound a second time.
    pub fn subscribe_owned(&self) -> mpsc::Receiver<OwnedUtxo> {
        self.inner.subs.lock().expect("subs lock").owned.bind("owned")
    }

    /// UTXOs observed as spent on chain. Panics when bound a second time.
    pub fn subscribe_spent(&self) -> mpsc::Receiver<OwnedUtxo> {
        self.inner.subs.lock().expect("subs lock").spent.bind("spent")
    }

    /// Per-block progress (the current max scanned height).
    /// Panics when bound a second time.
    pub fn progress_updates(&self) -> mpsc::Receiver<u32> {
        self.inner.subs.lock().expect("subs lock").progress.bind("progress")
    }

    pub fn last_scan_height(&self) -> u32 {
        self.inner.last_scan_height.load(Ordering::SeqCst)
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.scanning.load(Ordering::SeqCst)
    }

    pub(crate) fn stop_token(&self) -> &CancellationToken {
        &self.inner.stop
    }

    pub(crate) fn oracle(&self) -> &Arc<dyn Oracle> {
        &self.inner.oracle
    }

    /// Reset the scan cursor. Panics if called during an active scan.
    pub fn set_height(&self, height: u32) {
        if self.inner.scanning.load(Ordering::SeqCst) {
            panic!("cannot set height while the scanner is scanning");
        }
        self.inner.last_scan_height.store(height, Ordering::SeqCst);
    }

    /// Signal every in-flight scan and watch loop to wind down.
    /// Idempotent; a stopped scanner stays stopped.
    pub fn stop(&self) {
        self.inner.stop.cancel();
    }

    /// Stop and release the oracle handle.
    pub fn close(self) {
        self.stop();
        drop(self);
    }

    /// Scan the inclusive height range, blocking until the stream is
    /// exhausted, an error occurs, `ctx` is cancelled or the scanner is
    /// stopped. Stop yields `Ok`, cancellation an error. Only one scan may
    /// run per scanner at a time.
    pub async fn scan(&self, ctx: CancellationToken, start: u32, end: u32) -> Result<()> {
        if start > end {
            return Err(Error::InvalidRange(start, end));
        }
        if self.inner.scanning.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyScanning);
        }
        log::info!("starting scan: start_height {start} end_height {end}");
        let result = self.run(ctx, start, end).await;
        self.inner.scanning.store(false, Ordering::SeqCst);
        result
    }

    async fn run(&self, ctx: CancellationToken, start: u32, end: u32) -> Result<()> {
        // trips when the first worker fails so the rest wind down
        let fail = CancellationToken::new();
        let (work_tx, work_rx) = mpsc::channel::<BlockWork>(WORK_QUEUE_CAPACITY);
        let work_rx = Arc::new(AsyncMutex::new(work_rx));

        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        {
            let inner = self.inner.clone();
            let ctx = ctx.clone();
            let fail = fail.clone();
            tasks.spawn(async move { inner.produce(ctx, fail, start, end, work_tx).await });
        }
        for _ in 0..SCAN_WORKERS {
            let inner = self.inner.clone();
            let ctx = ctx.clone();
            let fail = fail.clone();
            let work_rx = work_rx.clone();
            tasks.spawn(async move { inner.work(ctx, fail, work_rx).await });
        }

        let mut first_err = None;
        while let Some(joined) = tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_err) => Err(Error::Backend(Box::new(join_err))),
            };
            if let Err(err) = result {
                if first_err.is_none() {
                    log::error!("scan failed: {err}");
                    first_err = Some(err);
                    fail.cancel();
                }
            }
        }

        if let Some(err) = first_err {
            return Err(err);
        }
        if self.inner.stop.is_cancelled() {
            log::info!("scanner stopped");
            return Ok(());
        }
        if ctx.is_cancelled() {
            log::error!("context done");
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

impl ScannerInner {
    fn wallet_handle(&self) -> Option<Arc<Mutex<Wallet>>> {
        self.wallet.lock().expect("wallet lock").clone()
    }

    fn probable_sender(&self) -> Option<mpsc::Sender<FoundOutputShort>> {
        self.subs.lock().expect("subs lock").probable.sender.clone()
    }

    fn owned_sender(&self) -> Option<mpsc::Sender<OwnedUtxo>> {
        self.subs.lock().expect("subs lock").owned.sender.clone()
    }

    fn spent_sender(&self) -> Option<mpsc::Sender<OwnedUtxo>> {
        self.subs.lock().expect("subs lock").spent.sender.clone()
    }

    fn progress_sender(&self) -> Option<mpsc::Sender<u32>> {
        self.subs.lock().expect("subs lock").progress.sender.clone()
    }

    /// Resolves when the scan should wind down for any reason.
    async fn interrupted(&self, ctx: &CancellationToken, fail: &CancellationToken) {
        tokio::select! {
            _ = ctx.cancelled() => {}
            _ = self.stop.cancelled() => {}
            _ = fail.cancelled() => {}
        }
    }

    /// Send to a subscriber, bailing out if the scan winds down first.
    /// Returns false when interrupted. A dropped receiver is not an error,
    /// the event is simply discarded.
    async fn emit<T: Send>(
        &self,
        ctx: &CancellationToken,
        fail: &CancellationToken,
        sender: &mpsc::Sender<T>,
        value: T,
    ) -> bool {
        tokio::select! {
            _ = self.interrupted(ctx, fail) => false,
            result = sender.send(value) => {
                let _ = result;
                true
            }
        }
    }

    async fn produce(
        self: Arc<Self>,
        ctx: CancellationToken,
        fail: CancellationToken,
        start: u32,
        end: u32,
        work_tx: mpsc::Sender<BlockWork>,
    ) -> Result<()> {
        // spent tracking requires the fuller stream
        let want_spent =
            self.wallet_handle().is_some() || self.subs.lock().expect("subs lock").spent.bound;

        let mut stream = if want_spent {
            log::info!("streaming block scan data: start_height {start} end_height {end}");
            self.oracle
                .stream_block_scan_data_short(start..=end, self.dust_limit)
                .await?
                .map(|result| result.map(BlockWork::from))
                .boxed()
        } else {
            log::info!("streaming compute index: start_height {start} end_height {end}");
            self.oracle
                .stream_compute_index(start..=end, self.dust_limit)
                .await?
                .map(|result| result.map(BlockWork::from))
                .boxed()
        };

        loop {
            let item = tokio::select! {
                _ = self.interrupted(&ctx, &fail) => return Ok(()),
                item = stream.next() => item,
            };
            let block = match item {
                // end of stream: dropping the sender drains the workers
                None => return Ok(()),
                Some(block) => block?,
            };
            tokio::select! {
                _ = self.interrupted(&ctx, &fail) => return Ok(()),
                sent = work_tx.send(block) => {
                    if sent.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn work(
        self: Arc<Self>,
        ctx: CancellationToken,
        fail: CancellationToken,
        work_rx: Arc<AsyncMutex<mpsc::Receiver<BlockWork>>>,
    ) -> Result<()> {
        loop {
            let block = tokio::select! {
                _ = self.interrupted(&ctx, &fail) => return Ok(()),
                block = async { work_rx.lock().await.recv().await } => match block {
                    None => return Ok(()),
                    Some(block) => block,
                },
            };
            if !self.process_block(&ctx, &fail, block).await? {
                return Ok(());
            }
        }
    }

    /// Returns Ok(false) when the scan wound down mid-block.
    async fn process_block(
        &self,
        ctx: &CancellationToken,
        fail: &CancellationToken,
        block: BlockWork,
    ) -> Result<bool> {
        let height = block.identifier.height;

        for item in &block.tx_items {
            let outputs: Vec<[u8; 8]> = item
                .outputs_short
                .chunks_exact(8)
                .map(|chunk| {
                    let mut prefix = [0u8; 8];
                    prefix.copy_from_slice(chunk);
                    prefix
                })
                .collect();
            if outputs.is_empty() {
                continue;
            }

            let mut founds = match scan_transaction_short(
                &self.scan_key,
                &self.spend_pub,
                &self.labels,
                outputs,
                &item.tweak,
                None,
            ) {
                Ok(founds) => founds,
                Err(err) => {
                    // per-transaction crypto failure: log and move on
                    log::error!("failed to scan transaction {}: {err}", item.txid);
                    continue;
                }
            };
            if founds.is_empty() {
                continue;
            }
            for found in &mut founds {
                found.txid = item.txid;
                found.height = height;
            }

            if let Some(sender) = self.probable_sender() {
                for found in &founds {
                    if !self.emit(ctx, fail, &sender, found.clone()).await {
                        return Ok(false);
                    }
                }
            }

            let owned = complete_found_short_outputs(
                self.oracle.as_ref(),
                &self.scan_key,
                &self.spend_pub,
                &self.labels,
                &founds,
            )
            .await?;
            if owned.is_empty() {
                continue;
            }

            if let Some(wallet) = self.wallet_handle() {
                wallet
                    .lock()
                    .expect("wallet lock")
                    .add_utxos(owned.iter().cloned());
            }
            if let Some(sender) = self.owned_sender() {
                for utxo in owned {
                    if !self.emit(ctx, fail, &sender, utxo).await {
                        return Ok(false);
                    }
                }
            }
        }

        if !block.spent_outputs.is_empty() {
            if let Some(wallet) = self.wallet_handle() {
                let transitioned = {
                    let mut wallet = wallet.lock().expect("wallet lock");
                    let candidates = wallet.get_utxos(&[
                        UtxoState::Unconfirmed,
                        UtxoState::Unspent,
                        UtxoState::UnconfirmedSpent,
                    ]);
                    let matched = match_spent_utxos(&candidates, &block.spent_outputs);
                    wallet.mark_spent(&matched)
                };
                if let Some(sender) = self.spent_sender() {
                    for utxo in transitioned {
                        if !self.emit(ctx, fail, &sender, utxo).await {
                            return Ok(false);
                        }
                    }
                }
            }
        }

        // workers complete blocks out of order, progress is the running max
        let prev = self.last_scan_height.fetch_max(height, Ordering::AcqRel);
        let current = prev.max(height);
        if let Some(sender) = self.progress_sender() {
            if !self.emit(ctx, fail, &sender, current).await {
                return Ok(false);
            }
        }
        log::debug!("finished block {height}");
        Ok(true)
    }
}
