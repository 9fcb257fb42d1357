use serde::Deserialize;
use serde::Serialize;

/// Which stream (or terminal condition) an [`OutputEvent`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    Stdout,
    Stderr,
    Exit,
    Error,
}

/// One emission on the `output` channel.
///
/// The serialized field names (`type`, `data`, `code`) match what the web
/// client already consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    #[serde(rename = "type")]
    pub kind: OutputKind,
    #[serde(rename = "data")]
    pub text: String,
    #[serde(rename = "code", default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl OutputEvent {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self::new(OutputKind::Stdout, text)
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self::new(OutputKind::Stderr, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(OutputKind::Error, text)
    }

    pub fn exit(code: i32, text: impl Into<String>) -> Self {
        Self {
            kind: OutputKind::Exit,
            text: text.into(),
            exit_code: Some(code),
        }
    }

    fn new(kind: OutputKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            exit_code: None,
        }
    }
}

/// Inbound `replay` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRequest {
    #[serde(default)]
    pub log_content: String,
    #[serde(default)]
    pub log_type: String,
}

impl ReplayRequest {
    pub fn new(log_content: impl Into<String>, log_type: impl Into<String>) -> Self {
        Self {
            log_content: log_content.into(),
            log_type: log_type.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn exit_event_uses_web_client_field_names() {
        let json = serde_json::to_value(OutputEvent::exit(0, "Replay complete")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "exit", "data": "Replay complete", "code": 0})
        );
    }

    #[test]
    fn stream_events_omit_exit_code() {
        let json = serde_json::to_value(OutputEvent::stderr("warn\n")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "stderr", "data": "warn\n"}));
    }

    #[test]
    fn request_missing_fields_default_to_empty() {
        let request: ReplayRequest = serde_json::from_str(r#"{"logType":"nginx"}"#).unwrap();
        assert_eq!(request, ReplayRequest::new("", "nginx"));
    }
}
