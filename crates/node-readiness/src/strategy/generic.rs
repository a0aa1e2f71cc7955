use super::{SyncStrategy, SyncSignal};
use crate::rpc::{NodeClient, RpcError};
use async_trait::async_trait;

/// Used for clients without a structured sync endpoint (Erigon, Reth and
/// anything unrecognised). They are judged on block lag and peers alone.
pub struct GenericStrategy;

#[async_trait]
impl SyncStrategy for GenericStrategy {
    async fn determine(&self, _node: &NodeClient) -> Result<SyncSignal, RpcError> {
        Ok(SyncSignal::Unknown)
    }
}
