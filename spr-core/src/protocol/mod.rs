//! BIP-352 receiver-side protocol primitives.
//!
//! Shared-secret negotiation, per-index output derivation and label
//! generation according to
//! [BIP352](https://github.com/bitcoin/bips/blob/master/bip-0352.mediawiki).
//! The transaction-level matching built on top of these lives in
//! [`crate::scanner`].

mod hash;
mod receiving;

pub use receiving::{calculate_p_k, calculate_shared_secret, calculate_t_k, Label};
