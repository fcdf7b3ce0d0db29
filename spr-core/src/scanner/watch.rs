//! Tip-following incremental scans.

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::engine::SpScanner;
use crate::constants::WATCH_POLL_INTERVAL;
use crate::error::{Error, Result};

impl SpScanner {
    /// Poll the oracle tip and scan whatever is new, starting from
    /// `last_height`. Blocks until `ctx` is cancelled or [`SpScanner::stop`]
    /// is called, both of which return cleanly; a failing scan propagates
    /// its error. Oracle polling failures are logged and retried on the
    /// next tick.
    pub async fn watch(&self, ctx: CancellationToken, last_height: u32) -> Result<()> {
        if self.is_scanning() {
            return Err(Error::AlreadyScanning);
        }
        self.set_height(last_height);
        log::info!("started watching from height {last_height}");

        let mut ticker = tokio::time::interval(WATCH_POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    log::info!("context ended, watch returning");
                    return Ok(());
                }
                _ = self.stop_token().cancelled() => {
                    log::info!("stop signal triggered");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    let info = match self.oracle().get_info().await {
                        Ok(info) => info,
                        Err(err) => {
                            // transient, the next tick retries
                            log::error!("error pulling new tip: {err}");
                            continue;
                        }
                    };
                    let last = self.last_scan_height();
                    if u64::from(last) < info.height {
                        match self.scan(ctx.clone(), last, info.height as u32).await {
                            Ok(()) => {}
                            Err(Error::Cancelled) => return Ok(()),
                            Err(err) => {
                                log::error!(
                                    "error scanning to tip: last_scan_height {last} oracle_height {}: {err}",
                                    info.height
                                );
                                return Err(err);
                            }
                        }
                    }
                }
            }
        }
    }
}
