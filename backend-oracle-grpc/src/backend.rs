use std::ops::RangeInclusive;

use async_trait::async_trait;
use bitcoin::Amount;
use futures::StreamExt;
use tonic::Status;

use spr_core::oracle::{
    BlockScanDataShort, ComputeIndexBlock, FullBlock, Oracle, OracleInfo, OracleStream,
};
use spr_core::{Error, Result};

use crate::client::OracleGrpcClient;
use crate::convert;
use crate::pb;

fn status_err(status: Status) -> Error {
    Error::Backend(Box::new(status))
}

fn filtered_request(
    range: &RangeInclusive<u32>,
    dust_limit: Option<Amount>,
) -> pb::RangedBlockHeightRequestFiltered {
    pb::RangedBlockHeightRequestFiltered {
        start: u64::from(*range.start()),
        end: u64::from(*range.end()),
        dust_limit: dust_limit.map(|d| d.to_sat()).unwrap_or(0),
    }
}

#[async_trait]
impl Oracle for OracleGrpcClient {
    async fn get_info(&self) -> Result<OracleInfo> {
        let response = OracleGrpcClient::get_info(self).await.map_err(status_err)?;
        Ok(convert::info(response.into_inner()))
    }

    async fn stream_compute_index(
        &self,
        range: RangeInclusive<u32>,
        dust_limit: Option<Amount>,
    ) -> Result<OracleStream<ComputeIndexBlock>> {
        let stream = OracleGrpcClient::stream_compute_index(
            self,
            filtered_request(&range, dust_limit),
        )
        .await
        .map_err(status_err)?
        .into_inner();

        Ok(stream
            .map(|item| {
                item.map_err(status_err)
                    .and_then(convert::compute_index_block)
            })
            .boxed())
    }

    async fn stream_block_scan_data_short(
        &self,
        range: RangeInclusive<u32>,
        dust_limit: Option<Amount>,
    ) -> Result<OracleStream<BlockScanDataShort>> {
        let stream = OracleGrpcClient::stream_block_scan_data_short(
            self,
            filtered_request(&range, dust_limit),
        )
        .await
        .map_err(status_err)?
        .into_inner();

        Ok(stream
            .map(|item| {
                item.map_err(status_err)
                    .and_then(convert::block_scan_data_short)
            })
            .boxed())
    }

    async fn get_full_block(&self, height: u32) -> Result<FullBlock> {
        let response = OracleGrpcClient::get_full_block(
            self,
            pb::BlockHeightRequest {
                block_height: u64::from(height),
            },
        )
        .await
        .map_err(status_err)?;
        convert::full_block(response.into_inner())
    }

    async fn stream_block_batch_full(
        &self,
        range: RangeInclusive<u32>,
    ) -> Result<OracleStream<FullBlock>> {
        let stream = OracleGrpcClient::stream_block_batch_full(
            self,
            pb::RangedBlockHeightRequest {
                start: u64::from(*range.start()),
                end: u64::from(*range.end()),
            },
        )
        .await
        .map_err(status_err)?
        .into_inner();

        Ok(stream
            .map(|item| item.map_err(status_err).and_then(convert::full_block))
            .boxed())
    }
}
