use crate::client::{detect, ClientKind};
use crate::rpc::{NodeClient, RpcError};
use crate::strategy::SyncSignal;
use crate::Readiness;
use async_trait::async_trait;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Limits a node has to stay within to be considered ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub max_seconds_behind: u64,
    pub min_peers: u64,
}

impl Thresholds {
    pub fn check_lag(&self, lag_secs: i64) -> Result<(), Failure> {
        let max = i64::try_from(self.max_seconds_behind).unwrap_or(i64::MAX);
        if lag_secs > max {
            return Err(Failure::BlockLag {
                lag_secs,
                max: self.max_seconds_behind,
            });
        }
        Ok(())
    }

    pub fn check_peers(&self, peers: u64) -> Result<(), Failure> {
        if peers < self.min_peers {
            return Err(Failure::TooFewPeers {
                peers,
                min: self.min_peers,
            });
        }
        Ok(())
    }
}

/// Timestamp of the latest block and the wall clock time it was seen at.
#[derive(Debug, Clone, Copy)]
pub struct BlockSnapshot {
    pub block_timestamp: u64,
    pub observed_at: SystemTime,
}

impl BlockSnapshot {
    /// Seconds the node is behind the wall clock. Negative when the block
    /// timestamp is ahead of the local clock.
    pub fn lag_secs(&self) -> i64 {
        let observed = self
            .observed_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let block = i64::try_from(self.block_timestamp).unwrap_or(i64::MAX);

        observed.saturating_sub(block)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    LatestBlock,
    PeerCount,
    SyncStatus,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Check::LatestBlock => "latest block",
            Check::PeerCount => "peer count",
            Check::SyncStatus => "sync status",
        })
    }
}

/// Why a node is not ready.
#[derive(Debug, thiserror::Error)]
pub enum Failure {
    #[error("node is {lag_secs}s behind, allowed {max}s")]
    BlockLag { lag_secs: i64, max: u64 },

    #[error("node has {peers} peers, needs {min}")]
    TooFewPeers { peers: u64, min: u64 },

    #[error("{client} node is syncing")]
    Syncing { client: ClientKind },

    #[error("{client} node reports errors: {}", .errors.join(", "))]
    ReportedErrors {
        client: ClientKind,
        errors: Vec<String>,
    },

    #[error("{check} check failed: {error}")]
    Check {
        check: Check,
        #[source]
        error: RpcError,
    },
}

/// Outcome of one evaluation together with what was observed on the way.
#[derive(Debug)]
pub struct Evaluation {
    pub client: Option<ClientKind>,
    pub lag_secs: Option<i64>,
    pub peers: Option<u64>,
    pub failure: Option<Failure>,
    pub evaluated_at: SystemTime,
}

impl Evaluation {
    fn new() -> Self {
        Self {
            client: None,
            lag_secs: None,
            peers: None,
            failure: None,
            evaluated_at: SystemTime::now(),
        }
    }

    fn fail(mut self, failure: Failure) -> Self {
        self.failure = Some(failure);
        self
    }

    pub fn is_healthy(&self) -> bool {
        self.failure.is_none()
    }

    fn report(&self) {
        match &self.failure {
            None => tracing::debug!(
                client = ?self.client,
                lag_secs = ?self.lag_secs,
                peers = ?self.peers,
                "Node is ready"
            ),
            Some(Failure::Check { check, error }) if error.is_transport() => tracing::warn!(
                %check,
                %error,
                "Node unreachable, reporting not ready"
            ),
            Some(Failure::Check { check, error }) => tracing::warn!(
                %check,
                %error,
                "Unexpected response from node, reporting not ready"
            ),
            Some(failure) => tracing::info!(
                reason = %failure,
                client = ?self.client,
                lag_secs = ?self.lag_secs,
                peers = ?self.peers,
                "Node is not ready"
            ),
        }
    }
}

/// Combines block lag, peer count and the client's own sync signal into
/// a single verdict. Anything that cannot be confirmed counts as not ready.
pub struct HealthEvaluator {
    node: NodeClient,
    thresholds: Thresholds,
}

impl HealthEvaluator {
    pub fn new(node: NodeClient, thresholds: Thresholds) -> Self {
        Self { node, thresholds }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    async fn run(&self) -> Evaluation {
        let mut evaluation = Evaluation::new();

        let (block, peers) = tokio::join!(self.node.latest_block(), self.node.peer_count());

        let block = match block {
            Ok(block) => block,
            Err(error) => {
                return evaluation.fail(Failure::Check {
                    check: Check::LatestBlock,
                    error,
                })
            }
        };
        let lag_secs = BlockSnapshot {
            block_timestamp: block.timestamp,
            observed_at: SystemTime::now(),
        }
        .lag_secs();
        evaluation.lag_secs = Some(lag_secs);
        if let Err(failure) = self.thresholds.check_lag(lag_secs) {
            return evaluation.fail(failure);
        }

        let peers = match peers {
            Ok(peers) => peers,
            Err(error) => {
                return evaluation.fail(Failure::Check {
                    check: Check::PeerCount,
                    error,
                })
            }
        };
        evaluation.peers = Some(peers);
        if let Err(failure) = self.thresholds.check_peers(peers) {
            return evaluation.fail(failure);
        }

        // Re-detected every time so a swapped client is never judged by the
        // previous client's strategy.
        let client = detect(&self.node).await;
        evaluation.client = Some(client);

        match client.strategy().determine(&self.node).await {
            Ok(SyncSignal::NotSyncing | SyncSignal::Unknown) => evaluation,
            Ok(SyncSignal::Syncing) => evaluation.fail(Failure::Syncing { client }),
            Ok(SyncSignal::Errored(errors)) => {
                evaluation.fail(Failure::ReportedErrors { client, errors })
            }
            Err(error) => evaluation.fail(Failure::Check {
                check: Check::SyncStatus,
                error,
            }),
        }
    }
}

#[async_trait]
impl Readiness for HealthEvaluator {
    async fn evaluate(&self) -> Evaluation {
        let evaluation = self.run().await;
        evaluation.report();
        evaluation
    }
}
