use tonic::codec::Streaming;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Response, Status};

use crate::pb::oracle_service_client::OracleServiceClient;
use crate::pb::{
    BlockHeightRequest, BlockScanDataShort, ComputeIndexBlock, FullBlockResponse, GetInfoRequest,
    InfoResponse, RangedBlockHeightRequest, RangedBlockHeightRequestFiltered,
};

/// Connection to a gRPC compute-index oracle.
///
/// Cheap to clone; all clones share one HTTP/2 channel. Dropping the last
/// clone closes the connection.
#[derive(Clone)]
pub struct OracleGrpcClient {
    client: OracleServiceClient<Channel>,
}

impl OracleGrpcClient {
    /// Connect to `address` (e.g. `https://oracle.example.org:443`),
    /// negotiating TLS with system roots when `use_tls` is set.
    pub async fn connect(
        address: String,
        use_tls: bool,
    ) -> Result<Self, tonic::transport::Error> {
        let mut endpoint = Endpoint::from_shared(address)?;
        if use_tls {
            endpoint = endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?;
        }
        let channel = endpoint.connect().await?;
        Ok(OracleGrpcClient {
            client: OracleServiceClient::new(channel),
        })
    }

    pub async fn get_info(&self) -> Result<Response<InfoResponse>, Status> {
        self.client.clone().get_info(GetInfoRequest {}).await
    }

    pub async fn get_full_block(
        &self,
        request: BlockHeightRequest,
    ) -> Result<Response<FullBlockResponse>, Status> {
        self.client.clone().get_full_block(request).await
    }

    pub async fn stream_compute_index(
        &self,
        request: RangedBlockHeightRequestFiltered,
    ) -> Result<Response<Streaming<ComputeIndexBlock>>, Status> {
        self.client.clone().stream_compute_index(request).await
    }

    /// The dust-filtered short-output index; same shape as
    /// [`OracleGrpcClient::stream_compute_index`].
    pub async fn stream_index_short_outs(
        &self,
        request: RangedBlockHeightRequestFiltered,
    ) -> Result<Response<Streaming<ComputeIndexBlock>>, Status> {
        self.client.clone().stream_index_short_outs(request).await
    }

    pub async fn stream_block_scan_data_short(
        &self,
        request: RangedBlockHeightRequestFiltered,
    ) -> Result<Response<Streaming<BlockScanDataShort>>, Status> {
        self.client
            .clone()
            .stream_block_scan_data_short(request)
            .await
    }

    pub async fn stream_block_batch_full(
        &self,
        request: RangedBlockHeightRequest,
    ) -> Result<Response<Streaming<FullBlockResponse>>, Status> {
        self.client.clone().stream_block_batch_full(request).await
    }
}
