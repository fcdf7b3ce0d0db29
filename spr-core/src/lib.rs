//! Client-side receiver for Silent Payments (BIP-352).
//!
//! Identifies which on-chain outputs belong to a wallet by streaming
//! per-block compute-index data from a remote oracle, deriving candidate
//! outputs for every transaction tweak, pruning on 8-byte output prefixes
//! and completing matches into fully owned UTXOs.
//!
//! ## Core Types
//!
//! - [`SpScanner`] - streaming parallel scanner with owned/probable/spent
//!   subscriptions and a watch loop
//! - [`FilterScanner`] - legacy per-block variant using BIP-158 filters to
//!   skip blocks without candidates
//! - [`Wallet`] - owned-UTXO set, labels, addresses and history
//! - [`oracle::Oracle`] / [`oracle::FilterBackend`] - transport traits,
//!   implemented by the backend crates

pub mod constants;
mod error;
pub mod oracle;
pub mod protocol;
pub mod scanner;
pub mod types;
pub mod updater;
pub mod wallet;

pub use bitcoin;

pub use error::{Error, Result};
pub use protocol::Label;
pub use scanner::{FilterScanner, FoundOutput, FoundOutputShort, SpScanner};
pub use types::{Network, Outpoint, Txid};
pub use updater::{DummyUpdater, Updater};
pub use wallet::{OwnedUtxo, TxHistory, UtxoState, Wallet};
