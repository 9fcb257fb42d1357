//! Root of the `logreplay-core` library.
//!
//! Replays pasted log lines through the detection engine's command-line
//! tools and streams everything the tools print back to the caller as
//! [`OutputEvent`](logreplay_protocol::OutputEvent)s.

mod artifact;
mod command;
pub mod config;
mod error;
mod exec;
mod orchestrator;
mod session;

pub use artifact::ArtifactKind;
pub use artifact::TempArtifact;
pub use artifact::TempArtifactManager;
pub use command::LogicalCommand;
pub use command::ResolvedCommand;
pub use command::Tool;
pub use command::resolve;
pub use config::ConfigError;
pub use config::ExecutionMode;
pub use config::ReplayConfig;
pub use error::ReplayError;
pub use error::Result;
pub use error::ValidationError;
pub use exec::ExecOutput;
pub use exec::OutputSink;
pub use exec::run_command;
pub use orchestrator::PipelineState;
pub use orchestrator::ReplayOrchestrator;
pub use orchestrator::StepOutcome;
pub use session::ConnectionId;
pub use session::SessionState;
