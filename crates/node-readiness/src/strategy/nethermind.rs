use super::{SyncSignal, SyncStrategy};
use crate::rpc::{NodeClient, RpcError};
use async_trait::async_trait;
use serde::Deserialize;

const HEALTHY: &str = "Healthy";

/// Reads Nethermind's `/health` document.
pub struct NethermindStrategy;

/// Document served by Nethermind's health checks module.
#[derive(Debug, Clone, Deserialize)]
pub struct NethermindHealth {
    pub status: String,
    pub entries: Entries,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entries {
    #[serde(rename = "node-health")]
    pub node_health: NodeHealthEntry,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeHealthEntry {
    pub data: NodeHealthData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeHealthData {
    #[serde(rename = "IsSyncing")]
    pub is_syncing: bool,
    #[serde(rename = "Errors", default)]
    pub errors: Vec<String>,
}

impl NethermindHealth {
    /// Any reported error blocks readiness even when the node is not
    /// syncing, and so does any overall status other than `Healthy`.
    pub fn sync_signal(&self) -> SyncSignal {
        let data = &self.entries.node_health.data;

        if data.is_syncing {
            return SyncSignal::Syncing;
        }
        if !data.errors.is_empty() {
            return SyncSignal::Errored(data.errors.clone());
        }
        if self.status != HEALTHY {
            return SyncSignal::Errored(vec![format!("node reports status {}", self.status)]);
        }

        SyncSignal::NotSyncing
    }
}

#[async_trait]
impl SyncStrategy for NethermindStrategy {
    async fn determine(&self, node: &NodeClient) -> Result<SyncSignal, RpcError> {
        let health: NethermindHealth = node.get_json("health").await?;
        Ok(health.sync_signal())
    }
}
