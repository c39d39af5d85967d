//! Orchestrator domain services
//!
//! Trait seams towards the external collaborators the scheduling engine
//! depends on: the subprocess runner, the per-tool output parsers and the
//! downstream findings pipeline (enrichment, notifications, reporting).

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use scanforge_core::domain::{Finding, Tool};

use super::entities::Execution;

/// Result of running a tool subprocess
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// The run was interrupted by a stop signal
    pub cancelled: bool,
}

/// Service running a tool invocation as a subprocess
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run the tool with the given CLI tokens. `cancel` carries the
    /// cooperative stop signal for the job owning this run.
    async fn run(
        &self,
        tool: &Tool,
        arguments: &[String],
        cancel: &CancellationToken,
    ) -> std::io::Result<RunOutcome>;
}

/// Service extracting findings from raw tool output.
///
/// The concrete per-tool parsers (regex/XML/JSON) live outside the
/// scheduling engine; the engine only needs the extraction seam.
pub trait OutputParser: Send + Sync {
    fn parse(&self, tool: &Tool, output: &str) -> Vec<Finding>;
}

/// Downstream findings pipeline (deduplication, enrichment, notifications).
#[async_trait]
pub trait FindingsPipeline: Send + Sync {
    async fn enqueue(&self, execution: &Execution, findings: &[Finding]);
}

/// Parser that extracts nothing; used when a tool has no parser registered.
pub struct NoopParser;

impl OutputParser for NoopParser {
    fn parse(&self, _tool: &Tool, _output: &str) -> Vec<Finding> {
        Vec::new()
    }
}

/// Pipeline that only records what it receives.
pub struct LoggingFindingsPipeline;

#[async_trait]
impl FindingsPipeline for LoggingFindingsPipeline {
    async fn enqueue(&self, execution: &Execution, findings: &[Finding]) {
        tracing::info!(
            execution_id = %execution.id,
            count = findings.len(),
            "Findings handed to the downstream pipeline"
        );
    }
}
