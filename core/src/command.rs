use std::fmt;

use crate::config::ExecutionMode;

/// Engine binaries the pipeline drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// The detection engine itself, used in one-shot replay mode.
    Engine,
    /// The engine's management CLI.
    Cli,
}

impl Tool {
    pub fn binary(self) -> &'static str {
        match self {
            Tool::Engine => "crowdsec",
            Tool::Cli => "cscli",
        }
    }
}

/// The four invocations the replay pipeline knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogicalCommand {
    ClearResults,
    ReplayFile { path: String, log_type: String },
    ListResults,
    ExplainFile { path: String, log_type: String },
}

impl LogicalCommand {
    pub fn tool(&self) -> Tool {
        match self {
            LogicalCommand::ReplayFile { .. } => Tool::Engine,
            LogicalCommand::ClearResults
            | LogicalCommand::ListResults
            | LogicalCommand::ExplainFile { .. } => Tool::Cli,
        }
    }

    pub fn args(&self) -> Vec<String> {
        let args: Vec<&str> = match self {
            LogicalCommand::ClearResults => vec!["alerts", "delete", "--all"],
            LogicalCommand::ReplayFile { path, log_type } => {
                return vec![
                    "--dsn".to_string(),
                    format!("file://{path}"),
                    "--type".to_string(),
                    log_type.clone(),
                    "--no-api".to_string(),
                ];
            }
            LogicalCommand::ListResults => vec!["alerts", "list", "-o", "json"],
            LogicalCommand::ExplainFile { path, log_type } => {
                vec!["explain", "-f", path.as_str(), "-t", log_type.as_str()]
            }
        };
        args.into_iter().map(str::to_string).collect()
    }

    pub fn resolve(&self, mode: &ExecutionMode) -> ResolvedCommand {
        resolve(mode, self.tool().binary(), &self.args())
    }
}

/// A concrete program plus argv, ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ResolvedCommand {
    /// Space-joined command line, for display and audit.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ResolvedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Map a tool invocation onto the program that actually runs it.
///
/// Direct: `<elevation> tool args...`.
/// Contained: `<runtime> exec <container> tool args...`.
pub fn resolve(mode: &ExecutionMode, tool: &str, args: &[String]) -> ResolvedCommand {
    match mode {
        ExecutionMode::Direct { elevation } => ResolvedCommand {
            program: elevation.clone(),
            args: std::iter::once(tool.to_string())
                .chain(args.iter().cloned())
                .collect(),
        },
        ExecutionMode::Contained { runtime, container } => ResolvedCommand {
            program: runtime.clone(),
            args: ["exec", container.as_str(), tool]
                .into_iter()
                .map(str::to_string)
                .chain(args.iter().cloned())
                .collect(),
        },
    }
}
