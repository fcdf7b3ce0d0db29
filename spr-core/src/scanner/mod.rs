//! Scanning: per-transaction matching, the streaming engine and the legacy
//! per-block filter variant.

mod completer;
mod engine;
mod filter_scan;
mod spent;
mod txscan;
mod watch;

pub use engine::SpScanner;
pub use filter_scan::FilterScanner;
pub use spent::match_spent_utxos;
pub use txscan::{
    scan_transaction, scan_transaction_short, scan_transaction_with_shared_secret, FoundOutput,
    FoundOutputShort,
};
