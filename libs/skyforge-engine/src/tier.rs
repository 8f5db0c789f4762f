use crate::error::ExecutionError;
use async_trait::async_trait;
use skyforge_common::types::{ExecutionRequest, Tier};

/// Raw output of one tier attempt, before normalization
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub timed_out: bool,
}

/// One execution backend in the orchestrator's ordered list
#[async_trait]
pub trait ExecutionTier: Send + Sync {
    fn tier(&self) -> Tier;

    /// Run the request once. No retries happen inside a tier.
    async fn attempt(&self, request: &ExecutionRequest) -> Result<TierOutput, ExecutionError>;
}
