use std::fmt::Write as _;

use logreplay_protocol::Alert;
use logreplay_protocol::END_MARKER;
use logreplay_protocol::OutputEvent;
use logreplay_protocol::OutputKind;
use logreplay_protocol::ReplayResult;
use logreplay_protocol::START_MARKER;
use owo_colors::OwoColorize;
use owo_colors::Style;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Colour only when stdout is a terminal that supports it.
    pub fn detect() -> Self {
        Self::new(supports_color::on(supports_color::Stream::Stdout).is_some())
    }

    fn paint(&self, text: &str, style: Style) -> String {
        if self.color {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }

    /// How a streamed event should be shown, if at all. The framed result
    /// payload is machine data and is never echoed.
    pub fn event(&self, event: &OutputEvent) -> Option<(Target, String)> {
        if is_result_frame(event) {
            return None;
        }
        match event.kind {
            OutputKind::Stdout => Some((Target::Stdout, event.text.clone())),
            OutputKind::Stderr => Some((
                Target::Stderr,
                self.paint(&event.text, Style::new().yellow()),
            )),
            OutputKind::Error => Some((
                Target::Stderr,
                self.paint(&with_newline(&event.text), Style::new().red().bold()),
            )),
            OutputKind::Exit => {
                let code = event.exit_code.unwrap_or(0);
                let style = if code == 0 {
                    Style::new().green()
                } else {
                    Style::new().red()
                };
                let line = format!("[exit {code}] {}", event.text);
                Some((Target::Stderr, self.paint(&with_newline(&line), style)))
            }
        }
    }

    pub fn summary(&self, result: &ReplayResult) -> String {
        let heading = Style::new().bold();
        let mut out = String::new();

        let _ = writeln!(
            out,
            "\n{}",
            self.paint(&format!("Alerts ({})", result.alerts.len()), heading)
        );
        if result.alerts.is_empty() {
            out.push_str("  No alerts were generated from these log lines.\n");
        }
        for alert in &result.alerts {
            self.write_alert(&mut out, alert);
        }

        let explain_heading = if result.was_truncated() {
            format!(
                "Explain output (first {} of {} lines)",
                result.explained_lines, result.total_lines
            )
        } else {
            "Explain output".to_string()
        };
        let _ = writeln!(out, "\n{}", self.paint(&explain_heading, heading));
        if result.explain_output.trim().is_empty() {
            out.push_str("  No explain output available.\n");
        } else {
            out.push_str(&with_newline(&result.explain_output));
        }
        out
    }

    fn write_alert(&self, out: &mut String, alert: &Alert) {
        let events = alert.events_count().unwrap_or(0);
        let plural = if events == 1 { "" } else { "s" };
        let _ = writeln!(
            out,
            "  {}  {events} event{plural}",
            self.paint(alert.scenario().unwrap_or("unknown scenario"), Style::new().cyan())
        );
        let _ = writeln!(
            out,
            "    Source IP: {}  Scope: {}",
            alert.source_ip().unwrap_or("N/A"),
            alert.source_scope().unwrap_or("N/A")
        );
        let decisions = alert.decisions();
        if !decisions.is_empty() {
            let _ = writeln!(out, "    Decisions: {}", decisions.join(", "));
        }
        if let Some(message) = alert.message() {
            let _ = writeln!(out, "    {message}");
        }
    }
}

fn is_result_frame(event: &OutputEvent) -> bool {
    event.kind == OutputKind::Stdout
        && event.text.starts_with(START_MARKER)
        && event.text.trim_end().ends_with(END_MARKER)
}

fn with_newline(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}
