use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Only the first `MAX_EXPLAIN_LINES` non-blank lines are fed to the
/// engine's explain mode.
pub const MAX_EXPLAIN_LINES: usize = 10;

/// A detection record as emitted by the engine's `alerts list -o json`.
///
/// The shape is owned by the engine, so the record is carried verbatim.
/// The accessors cover the handful of fields observers render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Alert(pub Value);

impl Alert {
    pub fn scenario(&self) -> Option<&str> {
        self.0.get("scenario").and_then(Value::as_str)
    }

    pub fn message(&self) -> Option<&str> {
        self.0.get("message").and_then(Value::as_str)
    }

    pub fn events_count(&self) -> Option<u64> {
        self.0.get("events_count").and_then(Value::as_u64)
    }

    pub fn source_ip(&self) -> Option<&str> {
        self.source_field("ip")
    }

    pub fn source_scope(&self) -> Option<&str> {
        self.source_field("scope")
    }

    /// Human-readable decisions, e.g. `ban 4h (Ip:1.2.3.4)`.
    pub fn decisions(&self) -> Vec<String> {
        let Some(decisions) = self.0.get("decisions").and_then(Value::as_array) else {
            return Vec::new();
        };
        decisions
            .iter()
            .map(|decision| {
                let field = |name: &str| decision.get(name).and_then(Value::as_str).unwrap_or("");
                format!(
                    "{} {} ({}:{})",
                    field("type"),
                    field("duration"),
                    field("scope"),
                    field("value")
                )
            })
            .collect()
    }

    fn source_field(&self, name: &str) -> Option<&str> {
        self.0
            .get("source")
            .and_then(|source| source.get(name))
            .and_then(Value::as_str)
    }
}

/// Aggregated outcome of one replay, embedded in the output stream between
/// the framing markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResult {
    pub alerts: Vec<Alert>,
    #[serde(default)]
    pub replay_command: String,
    #[serde(default)]
    pub alerts_command: String,
    pub explain_output: String,
    #[serde(default)]
    pub explain_command: String,
    #[serde(default)]
    pub total_lines: usize,
    #[serde(default)]
    pub explained_lines: usize,
}

impl ReplayResult {
    pub fn was_truncated(&self) -> bool {
        self.total_lines > self.explained_lines
    }
}
