//! The four-step replay pipeline.
//!
//! Every replay runs `clear -> replay -> list -> explain` strictly in
//! sequence, streaming each tool's output to the caller's [`OutputSink`] and
//! finishing with the framed [`ReplayResult`] plus exactly one terminal exit
//! event.
//!
//! The engine's alert store is shared by every session. Two pipelines in
//! flight at once interleave their clear/list steps at the tool's
//! granularity, so one session may list (or clear) alerts raised by the
//! other. Nothing here serializes across sessions.

use std::sync::Arc;

use logreplay_protocol::Alert;
use logreplay_protocol::MAX_EXPLAIN_LINES;
use logreplay_protocol::OutputEvent;
use logreplay_protocol::ReplayRequest;
use logreplay_protocol::ReplayResult;
use logreplay_protocol::frame_result;
use tracing::debug;
use tracing::info;

use crate::artifact::ArtifactKind;
use crate::artifact::TempArtifact;
use crate::artifact::TempArtifactManager;
use crate::command::LogicalCommand;
use crate::config::ReplayConfig;
use crate::error::ReplayError;
use crate::error::Result;
use crate::error::ValidationError;
use crate::exec::ExecOutput;
use crate::exec::OutputSink;
use crate::exec::run_command;

const EXIT_TEXT_COMPLETE: &str = "Replay complete";
const EXIT_TEXT_FAILED: &str = "Replay failed";
const EXIT_TEXT_INVALID: &str = "Validation failed";
const ALERTS_PARSE_WARNING: &str = "Warning: Could not parse alerts JSON.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    ClearingPriorResults,
    Replaying,
    ListingResults,
    Explaining,
    Completed,
    Failed,
}

/// How a single step ended.
#[derive(Debug)]
pub enum StepOutcome {
    Ok(ExecOutput),
    /// The tool ran but exited non-zero. The pipeline carries on.
    SoftFail { exit_code: i32, output: ExecOutput },
    /// The tool could not be run at all. The pipeline aborts.
    HardFail(ReplayError),
}

impl StepOutcome {
    fn from_run(result: Result<ExecOutput>) -> Self {
        match result {
            Ok(output) if output.exit_code == 0 => StepOutcome::Ok(output),
            Ok(output) => StepOutcome::SoftFail {
                exit_code: output.exit_code,
                output,
            },
            Err(err) => StepOutcome::HardFail(err),
        }
    }

    /// The captured output, whatever the exit code.
    pub fn into_output(self) -> Result<ExecOutput> {
        match self {
            StepOutcome::Ok(output) | StepOutcome::SoftFail { output, .. } => Ok(output),
            StepOutcome::HardFail(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayOrchestrator {
    config: Arc<ReplayConfig>,
    artifacts: TempArtifactManager,
}

impl ReplayOrchestrator {
    pub fn new(config: Arc<ReplayConfig>) -> Self {
        let artifacts = TempArtifactManager::new(&config);
        Self { config, artifacts }
    }

    /// Run one replay, streaming progress to `sink`.
    ///
    /// Whatever happens, `sink` receives exactly one terminal exit event and
    /// every artifact written along the way is removed. Validation failures
    /// and pipeline aborts are also returned as `Err` so the caller can log
    /// them; by then they have already been reported on the stream.
    pub async fn replay(&self, request: &ReplayRequest, sink: &OutputSink) -> Result<ReplayResult> {
        if let Err(err) = validate(request) {
            sink.send(OutputEvent::error(err.to_string())).await;
            sink.send(OutputEvent::exit(1, EXIT_TEXT_INVALID)).await;
            return Err(err.into());
        }

        let log_type = request.log_type.trim();
        let mut run = PipelineRun {
            orchestrator: self,
            sink,
            state: PipelineState::Idle,
        };

        let artifact = match self
            .artifacts
            .allocate(&request.log_content, ArtifactKind::Full)
            .await
        {
            Ok(artifact) => artifact,
            Err(err) => {
                run.fail(&err).await;
                return Err(err);
            }
        };

        let outcome = run.execute(&artifact, &request.log_content, log_type).await;
        if let Err(err) = &outcome {
            run.fail(err).await;
        }
        self.artifacts.release(artifact).await;
        outcome
    }
}

fn validate(request: &ReplayRequest) -> std::result::Result<(), ValidationError> {
    if request.log_content.trim().is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    if request.log_type.trim().is_empty() {
        return Err(ValidationError::EmptyLogType);
    }
    Ok(())
}

struct PipelineRun<'a> {
    orchestrator: &'a ReplayOrchestrator,
    sink: &'a OutputSink,
    state: PipelineState,
}

impl PipelineRun<'_> {
    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "pipeline transition");
        self.state = next;
    }

    async fn emit(&self, event: OutputEvent) {
        self.sink.send(event).await;
    }

    async fn execute(
        &mut self,
        artifact: &TempArtifact,
        content: &str,
        log_type: &str,
    ) -> Result<ReplayResult> {
        let orchestrator = self.orchestrator;
        let artifacts = &orchestrator.artifacts;
        self.emit(OutputEvent::stdout(format!(
            "Wrote log to {}\n",
            artifact.host_path().display()
        )))
        .await;

        self.transition(PipelineState::ClearingPriorResults);
        let clear = LogicalCommand::ClearResults;
        // Clearing is advisory: only the streamed output matters.
        self.run_step(&clear).await.into_output()?;

        self.transition(PipelineState::Replaying);
        let replay = LogicalCommand::ReplayFile {
            path: artifact.execution_path().display().to_string(),
            log_type: log_type.to_string(),
        };
        match self.run_step(&replay).await {
            StepOutcome::Ok(_) => {
                self.emit(OutputEvent::stdout("Replay completed successfully.\n"))
                    .await;
            }
            StepOutcome::SoftFail { exit_code, .. } => {
                self.emit(OutputEvent::error(format!(
                    "CrowdSec replay exited with code {exit_code}\n"
                )))
                .await;
            }
            StepOutcome::HardFail(err) => return Err(err),
        }

        self.transition(PipelineState::ListingResults);
        let list = LogicalCommand::ListResults;
        let listed = self.run_step(&list).await.into_output()?;
        let alerts = match parse_alerts(&listed.stdout) {
            Some(alerts) => alerts,
            None => {
                self.emit(OutputEvent::stderr(ALERTS_PARSE_WARNING)).await;
                Vec::new()
            }
        };

        self.transition(PipelineState::Explaining);
        let subset = ExplainSubset::new(content);
        if subset.is_truncated() {
            self.emit(OutputEvent::stdout(format!(
                "\nExplain output is limited to the first {} of {} lines.\n",
                subset.explained_lines(),
                subset.total_lines
            )))
            .await;
        }
        let explain_artifact = artifacts
            .allocate(&subset.contents(), ArtifactKind::Explain)
            .await?;
        let explain = LogicalCommand::ExplainFile {
            path: explain_artifact.execution_path().display().to_string(),
            log_type: log_type.to_string(),
        };
        let explained_lines = explain_artifact.content_lines();
        let explained = self.run_step(&explain).await;
        artifacts.release(explain_artifact).await;
        let explained = explained.into_output()?;

        let mode = &orchestrator.config.mode;
        let result = ReplayResult {
            alerts,
            replay_command: replay.resolve(mode).command_line(),
            alerts_command: list.resolve(mode).command_line(),
            explain_output: explained.stdout,
            explain_command: explain.resolve(mode).command_line(),
            total_lines: artifact.content_lines(),
            explained_lines,
        };

        let framed = frame_result(&result)?;
        self.emit(OutputEvent::stdout(framed)).await;
        self.emit(OutputEvent::exit(0, EXIT_TEXT_COMPLETE)).await;
        self.transition(PipelineState::Completed);
        info!(
            alerts = result.alerts.len(),
            total_lines = result.total_lines,
            "replay completed"
        );
        Ok(result)
    }

    async fn run_step(&self, command: &LogicalCommand) -> StepOutcome {
        let config = &self.orchestrator.config;
        let resolved = command.resolve(&config.mode);
        self.emit(OutputEvent::stdout(format!("\nRunning: {resolved}\n")))
            .await;
        let outcome = StepOutcome::from_run(
            run_command(&resolved, self.sink, config.step_timeout).await,
        );
        debug!(step = ?self.state, ?outcome, "step finished");
        outcome
    }

    async fn fail(&mut self, err: &ReplayError) {
        self.transition(PipelineState::Failed);
        self.emit(OutputEvent::error(format!("Error: {err}\n"))).await;
        self.emit(OutputEvent::exit(1, EXIT_TEXT_FAILED)).await;
    }
}

/// Decode the list step's stdout. Empty output and `null` mean "no alerts";
/// `None` means the output could not be understood.
fn parse_alerts(stdout: &str) -> Option<Vec<Alert>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Some(Vec::new());
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Array(items)) => Some(items.into_iter().map(Alert).collect()),
        Ok(serde_json::Value::Null) => Some(Vec::new()),
        Ok(_) | Err(_) => None,
    }
}

/// The non-blank lines handed to the explain step.
struct ExplainSubset<'a> {
    lines: Vec<&'a str>,
    total_lines: usize,
}

impl<'a> ExplainSubset<'a> {
    fn new(content: &'a str) -> Self {
        let non_blank = content.lines().filter(|line| !line.trim().is_empty());
        let mut lines = Vec::with_capacity(MAX_EXPLAIN_LINES);
        let mut total_lines = 0;
        for line in non_blank {
            if lines.len() < MAX_EXPLAIN_LINES {
                lines.push(line);
            }
            total_lines += 1;
        }
        Self { lines, total_lines }
    }

    fn explained_lines(&self) -> usize {
        self.lines.len()
    }

    fn is_truncated(&self) -> bool {
        self.total_lines > MAX_EXPLAIN_LINES
    }

    fn contents(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}
