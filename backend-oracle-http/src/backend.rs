use std::ops::RangeInclusive;
use std::sync::Arc;

use async_trait::async_trait;
use bitcoin::Amount;
use futures::{stream, StreamExt};

use spr_core::oracle::{
    FilterBackend, FilterBlockData, OracleStream, OracleUtxo, SpentIndexData,
};

use crate::client::{FilterType, HttpClient, OracleHttpClient};

/// How many per-height fetches run concurrently while streaming a range.
const CONCURRENT_FILTER_REQUESTS: usize = 200;

fn backend_err(err: anyhow::Error) -> spr_core::Error {
    spr_core::Error::Backend(err.into())
}

/// [`FilterBackend`] over the legacy HTTP oracle.
///
/// Each streamed height costs three requests (tweaks plus both filters);
/// they are issued concurrently and delivered in ascending height order.
pub struct HttpFilterBackend<H: HttpClient + 'static> {
    client: Arc<OracleHttpClient<H>>,
}

impl<H: HttpClient + 'static> HttpFilterBackend<H> {
    pub fn new(oracle_url: String, http_client: H) -> anyhow::Result<Self> {
        Ok(Self {
            client: Arc::new(OracleHttpClient::new(oracle_url, http_client)?),
        })
    }

    pub fn client(&self) -> &OracleHttpClient<H> {
        &self.client
    }
}

#[async_trait]
impl<H: HttpClient + 'static> FilterBackend for HttpFilterBackend<H> {
    fn block_data_stream(
        &self,
        range: RangeInclusive<u32>,
        dust_limit: Option<Amount>,
    ) -> OracleStream<FilterBlockData> {
        let client = self.client.clone();

        let blocks = stream::iter(range)
            .map(move |height| {
                let client = client.clone();
                async move {
                    let tweaks = client
                        .tweaks(height, dust_limit)
                        .await
                        .map_err(backend_err)?;
                    let new_utxo_filter = client
                        .filter(FilterType::NewUtxos, height)
                        .await
                        .map_err(backend_err)?;
                    let spent_filter = client
                        .filter(FilterType::Spent, height)
                        .await
                        .map_err(backend_err)?;
                    Ok(FilterBlockData {
                        height,
                        block_hash: new_utxo_filter.block_hash,
                        tweaks,
                        new_utxo_filter,
                        spent_filter,
                    })
                }
            })
            .buffered(CONCURRENT_FILTER_REQUESTS);

        Box::pin(blocks)
    }

    async fn utxos(&self, height: u32) -> spr_core::Result<Vec<OracleUtxo>> {
        self.client.utxos(height).await.map_err(backend_err)
    }

    async fn spent_index(&self, height: u32) -> spr_core::Result<SpentIndexData> {
        self.client.spent_index(height).await.map_err(backend_err)
    }

    async fn block_height(&self) -> spr_core::Result<u32> {
        let height = self.client.block_height().await.map_err(backend_err)?;
        u32::try_from(height).map_err(|e| spr_core::Error::Backend(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use std::collections::HashMap;

    /// Serves canned JSON bodies keyed by URL path.
    #[derive(Clone, Default)]
    struct CannedHttp {
        responses: Arc<HashMap<String, String>>,
    }

    #[async_trait]
    impl HttpClient for CannedHttp {
        async fn get(&self, url: &str, _query_params: &[(&str, String)]) -> Result<String> {
            let path = url::Url::parse(url).unwrap().path().to_string();
            self.responses
                .get(&path)
                .cloned()
                .ok_or_else(|| anyhow!("no canned response for {path}"))
        }
    }

    fn backend(responses: HashMap<String, String>) -> HttpFilterBackend<CannedHttp> {
        HttpFilterBackend::new(
            "http://oracle.test".to_string(),
            CannedHttp {
                responses: Arc::new(responses),
            },
        )
        .unwrap()
    }

    const HASH: &str = "000000000000000000024bead8df69990852c202db0e0097c1a12ea637d7e96d";

    fn valid_tweak_hex() -> String {
        use bitcoin::hex::DisplayHex;
        use bitcoin::secp256k1::{Secp256k1, SecretKey};
        let secp = Secp256k1::new();
        SecretKey::from_slice(&[0x11; 32])
            .unwrap()
            .public_key(&secp)
            .serialize()
            .as_hex()
            .to_string()
    }

    #[tokio::test]
    async fn streams_normalized_block_data() {
        let tweak = valid_tweak_hex();
        let responses = HashMap::from([
            (
                "/tweaks/5".to_string(),
                format!("[\"{tweak}\"]"),
            ),
            (
                "/filter/new-utxos/5".to_string(),
                format!(
                    r#"{{"filter_type":4,"block_height":5,"block_hash":"{HASH}","data":"0abc"}}"#
                ),
            ),
            (
                "/filter/spent/5".to_string(),
                format!(
                    r#"{{"filter_type":16,"block_height":5,"block_hash":"{HASH}","data":""}}"#
                ),
            ),
        ]);

        let backend = backend(responses);
        let mut stream = backend.block_data_stream(5..=5, None);
        let block = stream.next().await.unwrap().unwrap();
        assert_eq!(block.height, 5);
        assert_eq!(block.tweaks.len(), 1);
        assert_eq!(block.new_utxo_filter.data, vec![0x0a, 0xbc]);
        assert!(block.spent_filter.data.is_empty());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn missing_block_surfaces_as_error() {
        let responses = HashMap::from([
            ("/tweaks/9".to_string(), "[]".to_string()),
            (
                "/filter/new-utxos/9".to_string(),
                r#"{"filter_type":4,"block_height":9,"block_hash":"","data":""}"#.to_string(),
            ),
            (
                "/filter/spent/9".to_string(),
                r#"{"filter_type":16,"block_height":9,"block_hash":"","data":""}"#.to_string(),
            ),
        ]);

        let backend = backend(responses);
        let mut stream = backend.block_data_stream(9..=9, None);
        assert!(stream.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn rejects_malformed_tweak_length() {
        let responses = HashMap::from([(
            "/tweaks/2".to_string(),
            // 64 chars, not the 66 of a compressed key
            format!("[\"{}\"]", "11".repeat(32)),
        )]);

        let backend = backend(responses);
        assert!(backend.client().tweaks(2, None).await.is_err());
    }

    #[tokio::test]
    async fn spent_index_roundtrip() {
        let responses = HashMap::from([(
            "/spent-index/3".to_string(),
            format!(r#"{{"block_hash":"{HASH}","data":["aabbccddeeff0011","0102030405060708"]}}"#),
        )]);

        let backend = backend(responses);
        let spent = backend.spent_index(3).await.unwrap();
        assert_eq!(spent.data.len(), 2);
        assert_eq!(spent.data[0], [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff, 0x00, 0x11]);
    }
}
