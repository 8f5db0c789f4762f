/// Execution Orchestrator - the single entry point for running code
///
/// **Cascade rules:**
/// - Tiers are tried in list order (Primary → Fallback A → Fallback B)
/// - Each tier gets at most one attempt per request
/// - An escalating failure (sandbox unreachable, provider error) moves on
/// - A non-escalating failure (bug inside the sandbox lifecycle) ends the
///   request immediately with a terminal error result
/// - When every tier fails, one combined diagnostic is returned
///
/// Exactly one `ExecutionResult` is produced per request, and no tier runs
/// after a result exists.

use crate::error::ExecutionError;
use crate::providers::{self, Judge0Provider, PistonProvider};
use crate::sandbox::Sandbox;
use crate::tier::{ExecutionTier, TierOutput};
use skyforge_common::config::Config;
use skyforge_common::types::{ExecutionRequest, ExecutionResult, Tier};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

const GUIDANCE: &str = "Start the local Docker daemon (e.g. Docker Desktop) to run code in the \
local sandbox, or configure JUDGE0_API_KEY / JUDGE0_URL for cloud execution.";

pub struct Orchestrator {
    tiers: Vec<Arc<dyn ExecutionTier>>,
}

impl Orchestrator {
    pub fn new(tiers: Vec<Arc<dyn ExecutionTier>>) -> Self {
        Self { tiers }
    }

    /// Production cascade: local sandbox, then Piston, then Judge0
    pub fn from_config(config: &Config, sandbox: Arc<Sandbox>) -> reqwest::Result<Self> {
        let client = providers::http_client()?;
        Ok(Self::new(vec![
            sandbox as Arc<dyn ExecutionTier>,
            Arc::new(PistonProvider::from_config(client.clone(), config)) as Arc<dyn ExecutionTier>,
            Arc::new(Judge0Provider::from_config(client, config)) as Arc<dyn ExecutionTier>,
        ]))
    }

    pub fn tiers(&self) -> Vec<Tier> {
        self.tiers.iter().map(|t| t.tier()).collect()
    }

    #[instrument(skip(self, request), fields(language = %request.language, source_size = request.source_code.len()))]
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        let mut failures: Vec<(Tier, ExecutionError)> = Vec::new();

        for tier in &self.tiers {
            let tier_id = tier.tier();
            let started = Instant::now();

            match tier.attempt(request).await {
                Ok(output) => {
                    let result = normalize(output, tier_id, started);
                    info!(
                        tier = %tier_id,
                        exit_code = result.exit_code,
                        duration_ms = result.duration_ms,
                        timed_out = result.timed_out,
                        "Execution completed"
                    );
                    return result;
                }
                Err(err) if err.escalates() => {
                    warn!(tier = %tier_id, error = %err, "Tier unavailable, escalating");
                    failures.push((tier_id, err));
                }
                Err(err) => {
                    error!(tier = %tier_id, error = %err, "Execution failed inside tier");
                    return ExecutionResult {
                        stdout: String::new(),
                        stderr: format!("Execution Logic Error: {}", err),
                        exit_code: 1,
                        duration_ms: started.elapsed().as_millis() as u64,
                        tier_used: tier_id,
                        timed_out: false,
                    };
                }
            }
        }

        error!(attempts = failures.len(), "All execution tiers failed");
        exhausted(&failures)
    }
}

fn normalize(output: TierOutput, tier: Tier, started: Instant) -> ExecutionResult {
    ExecutionResult {
        stdout: output.stdout.trim().to_string(),
        stderr: output.stderr.trim().to_string(),
        exit_code: output.exit_code,
        duration_ms: started.elapsed().as_millis() as u64,
        tier_used: tier,
        timed_out: output.timed_out,
    }
}

fn describe(tier: Tier) -> &'static str {
    match tier {
        Tier::Primary => "Local sandbox (Docker)",
        Tier::FallbackA => "Cloud fallback A (Piston)",
        Tier::FallbackB => "Cloud fallback B (Judge0)",
    }
}

fn exhausted(failures: &[(Tier, ExecutionError)]) -> ExecutionResult {
    let mut message = String::from("All execution backends failed.\n");
    for (idx, (tier, err)) in failures.iter().enumerate() {
        message.push_str(&format!("{}. {}: {}\n", idx + 1, describe(*tier), err));
    }
    message.push('\n');
    message.push_str(GUIDANCE);

    ExecutionResult {
        stdout: String::new(),
        stderr: message,
        exit_code: 1,
        duration_ms: 0,
        tier_used: failures.last().map(|(tier, _)| *tier).unwrap_or(Tier::Primary),
        timed_out: false,
    }
}
