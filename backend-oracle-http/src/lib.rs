//! Legacy HTTP+JSON transport for the compute-index oracle.
//!
//! Speaks the original REST surface (`/block-height`, `/tweaks/{h}`,
//! `/filter/{type}/{h}`, `/utxos/{h}`, `/spent-index/{h}`, `/info`) and
//! exposes it as a [`spr_core::oracle::FilterBackend`] for the per-block
//! filter scanner. Bring your own HTTP library by implementing
//! [`HttpClient`], or use the bundled `reqwest`/`ureq` clients.

mod backend;
mod client;

pub use backend::HttpFilterBackend;
pub use client::{FilterType, HttpClient, OracleHttpClient};

#[cfg(feature = "reqwest-client")]
pub use client::ReqwestClient;

#[cfg(feature = "ureq-client")]
pub use client::UreqClient;
