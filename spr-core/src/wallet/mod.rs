//! Wallet state: owned UTXOs, labels, addresses and transaction history.

pub mod address;
mod keys;
mod txhistory;
mod utxo;
#[allow(clippy::module_inception)]
mod wallet;

pub use txhistory::{InflowMode, TxHistory, TxIn, TxItem, TxOut, TX_PENDING};
pub use utxo::{OwnedUtxo, UtxoState};
pub use wallet::Wallet;
