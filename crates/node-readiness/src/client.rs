use crate::rpc::NodeClient;
use std::fmt;

/// Execution client implementation behind the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Nethermind,
    Erigon,
    Reth,
    Unknown,
}

/// Markers looked up in `web3_clientVersion`, first match wins.
const VERSION_MARKERS: &[(&str, ClientKind)] = &[
    ("Nethermind", ClientKind::Nethermind),
    ("erigon", ClientKind::Erigon),
    ("reth", ClientKind::Reth),
];

impl ClientKind {
    /// Classifies a version string. Matching is case sensitive.
    pub fn from_version(version: &str) -> Self {
        VERSION_MARKERS
            .iter()
            .find(|(marker, _)| version.contains(marker))
            .map(|(_, kind)| *kind)
            .unwrap_or(ClientKind::Unknown)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientKind::Nethermind => "nethermind",
            ClientKind::Erigon => "erigon",
            ClientKind::Reth => "reth",
            ClientKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asks the node for its version and classifies it.
///
/// Detection never fails: an unreachable or confused node is reported as
/// [`ClientKind::Unknown`] so the generic checks still apply.
pub async fn detect(node: &NodeClient) -> ClientKind {
    match node.client_version().await {
        Ok(version) => {
            let kind = ClientKind::from_version(&version);
            tracing::debug!(%version, client = %kind, "Detected execution client");
            kind
        }
        Err(e) => {
            tracing::warn!(error = %e, "Client detection failed, falling back to generic checks");
            ClientKind::Unknown
        }
    }
}
