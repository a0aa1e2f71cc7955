use async_trait::async_trait;

pub use evaluator::Evaluation;

/// Decides whether the node behind the probe can serve traffic.
#[async_trait]
pub trait Readiness: Send + Sync {
    /// Evaluate the node from scratch. Never fails: any error is folded
    /// into a not ready [`Evaluation`].
    async fn evaluate(&self) -> Evaluation;
}

pub mod client;
pub mod evaluator;
pub mod metrics;
pub mod rpc;
pub mod server;
pub mod settings;
pub mod strategy;
mod utils;

pub use client::ClientKind;
pub use evaluator::{HealthEvaluator, Thresholds};
pub use rpc::{NodeClient, RpcError};
pub use server::{Mode, ReadinessServer};
pub use settings::{Overrides, Settings};
pub use strategy::{SyncSignal, SyncStrategy};
