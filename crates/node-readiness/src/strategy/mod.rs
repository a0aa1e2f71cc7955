use crate::client::ClientKind;
use crate::rpc::{NodeClient, RpcError};
use async_trait::async_trait;

mod generic;
mod nethermind;

pub use generic::GenericStrategy;
pub use nethermind::{NethermindHealth, NethermindStrategy};

/// Client reported sync state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncSignal {
    NotSyncing,
    Syncing,
    /// No client specific check exists; does not block readiness.
    Unknown,
    /// The client answered but reported internal errors.
    Errored(Vec<String>),
}

impl SyncSignal {
    pub fn is_blocking(&self) -> bool {
        matches!(self, SyncSignal::Syncing | SyncSignal::Errored(_))
    }
}

/// Client specific way of finding out whether the node is still syncing.
#[async_trait]
pub trait SyncStrategy: Send + Sync {
    async fn determine(&self, node: &NodeClient) -> Result<SyncSignal, RpcError>;
}

impl ClientKind {
    pub fn strategy(&self) -> &'static dyn SyncStrategy {
        match self {
            ClientKind::Nethermind => &NethermindStrategy,
            ClientKind::Erigon | ClientKind::Reth | ClientKind::Unknown => &GenericStrategy,
        }
    }
}
