mod http_trait;
mod oracle_client;
#[cfg(feature = "reqwest-client")]
mod reqwest_impl;
#[cfg(feature = "ureq-client")]
mod ureq_impl;

pub use http_trait::HttpClient;
pub use oracle_client::{FilterType, OracleHttpClient};

#[cfg(feature = "reqwest-client")]
pub use reqwest_impl::ReqwestClient;

#[cfg(feature = "ureq-client")]
pub use ureq_impl::UreqClient;
