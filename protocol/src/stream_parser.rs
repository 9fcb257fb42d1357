use tracing::warn;

use crate::events::OutputEvent;
use crate::events::OutputKind;
use crate::framing::END_MARKER;
use crate::framing::START_MARKER;
use crate::framing::decode_payload;
use crate::result::ReplayResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParserState {
    #[default]
    Searching,
    StartFound,
    Done,
}

/// Delivered once per replay, when the terminal `exit` event arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayCompletion {
    pub exit_code: i32,
    pub result: Option<ReplayResult>,
}

/// Receiver-side reassembly of the framed [`ReplayResult`].
///
/// Stdout fragments may split a marker (or the payload) at any byte
/// position, so the parser accumulates them and rescans only the tail that
/// could still complete a marker.
#[derive(Debug, Default)]
pub struct ResultStreamParser {
    buffer: String,
    state: ParserState,
    /// Byte offset just past the start marker once one has been seen.
    payload_start: usize,
    /// Scanning resumes here; everything before it has been ruled out.
    cursor: usize,
    result: Option<ReplayResult>,
    active: bool,
}

impl ResultStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all buffered state. The parser is inactive afterwards.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ParserState::Searching;
        self.payload_start = 0;
        self.cursor = 0;
        self.result = None;
        self.active = false;
    }

    /// Reset and arm the parser for a new replay. Call before sending the
    /// request so nothing from a previous run can leak into this one.
    pub fn begin(&mut self) {
        self.reset();
        self.active = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn result(&self) -> Option<&ReplayResult> {
        self.result.as_ref()
    }

    /// Feed one event in arrival order.
    ///
    /// Returns the completion exactly once, for the first `exit` event after
    /// [`begin`](Self::begin). Events arriving while inactive are ignored.
    pub fn feed(&mut self, event: &OutputEvent) -> Option<ReplayCompletion> {
        if !self.active {
            return None;
        }
        match event.kind {
            OutputKind::Stdout => {
                if self.state != ParserState::Done {
                    self.buffer.push_str(&event.text);
                    self.scan();
                }
                None
            }
            OutputKind::Exit => {
                self.active = false;
                Some(ReplayCompletion {
                    exit_code: event.exit_code.unwrap_or(0),
                    result: self.result.take(),
                })
            }
            OutputKind::Stderr | OutputKind::Error => None,
        }
    }

    fn scan(&mut self) {
        loop {
            match self.state {
                ParserState::Searching => {
                    let Some(offset) = self.buffer[self.cursor..].find(START_MARKER) else {
                        self.cursor = resume_point(&self.buffer, START_MARKER.len()).max(self.cursor);
                        return;
                    };
                    self.payload_start = self.cursor + offset + START_MARKER.len();
                    self.cursor = self.payload_start;
                    self.state = ParserState::StartFound;
                }
                ParserState::StartFound => {
                    let Some(offset) = self.buffer[self.cursor..].find(END_MARKER) else {
                        self.cursor = resume_point(&self.buffer, END_MARKER.len()).max(self.cursor);
                        return;
                    };
                    let end = self.cursor + offset;
                    // A stray start marker echoed earlier in the stream is
                    // superseded by the last one before the end marker.
                    if let Some(restart) = self.buffer[self.payload_start..end].rfind(START_MARKER)
                    {
                        self.payload_start += restart + START_MARKER.len();
                    }
                    match decode_payload(&self.buffer[self.payload_start..end]) {
                        Ok(result) => {
                            self.result = Some(result);
                            self.state = ParserState::Done;
                            return;
                        }
                        Err(err) => {
                            warn!(error = %err, "failed to parse replay result payload");
                            self.cursor = end + END_MARKER.len();
                            self.state = ParserState::Searching;
                        }
                    }
                }
                ParserState::Done => return,
            }
        }
    }
}

/// Earliest offset at which a marker of `marker_len` bytes could still
/// begin once more text is appended.
fn resume_point(buffer: &str, marker_len: usize) -> usize {
    let mut point = buffer.len().saturating_sub(marker_len.saturating_sub(1));
    while !buffer.is_char_boundary(point) {
        point -= 1;
    }
    point
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::frame_result;
    use crate::result::Alert;
    use pretty_assertions::assert_eq;

    fn sample_result() -> ReplayResult {
        ReplayResult {
            alerts: vec![Alert(serde_json::json!({
                "scenario": "crowdsecurity/ssh-bf",
                "source": {"ip": "10.0.0.7"}
            }))],
            replay_command: "sudo crowdsec --dsn file:///tmp/r.log --type syslog --no-api"
                .to_string(),
            alerts_command: "sudo cscli alerts list -o json".to_string(),
            explain_output: "line 1 ✓\nline 2 ✗\n".to_string(),
            explain_command: "sudo cscli explain -f /tmp/e.log -t syslog".to_string(),
            total_lines: 12,
            explained_lines: 10,
        }
    }

    fn framed() -> String {
        frame_result(&sample_result()).unwrap()
    }

    #[test]
    fn inactive_parser_ignores_events() {
        let mut parser = ResultStreamParser::new();
        assert_eq!(parser.feed(&OutputEvent::stdout(framed())), None);
        assert_eq!(parser.feed(&OutputEvent::exit(0, "Replay complete")), None);
        assert_eq!(parser.state(), ParserState::Searching);
    }

    #[test]
    fn single_chunk_payload_is_decoded() {
        let mut parser = ResultStreamParser::new();
        parser.begin();
        parser.feed(&OutputEvent::stdout("Replay completed successfully.\n"));
        parser.feed(&OutputEvent::stdout(framed()));
        assert_eq!(parser.state(), ParserState::Done);

        let completion = parser.feed(&OutputEvent::exit(0, "Replay complete"));
        assert_eq!(
            completion,
            Some(ReplayCompletion {
                exit_code: 0,
                result: Some(sample_result()),
            })
        );
        assert!(!parser.is_active());
    }

    #[test]
    fn payload_split_at_every_character_is_reassembled() {
        let mut parser = ResultStreamParser::new();
        parser.begin();
        let stream = format!("noise before\n{}", framed());
        for ch in stream.chars() {
            parser.feed(&OutputEvent::stdout(ch.to_string()));
        }
        assert_eq!(parser.result(), Some(&sample_result()));
    }

    #[test]
    fn start_marker_alone_waits_for_end() {
        let mut parser = ResultStreamParser::new();
        parser.begin();
        let framed = framed();
        let (head, tail) = framed.split_at(START_MARKER.len() + 5);
        parser.feed(&OutputEvent::stdout(head));
        assert_eq!(parser.state(), ParserState::StartFound);
        assert_eq!(parser.result(), None);
        parser.feed(&OutputEvent::stdout(tail));
        assert_eq!(parser.state(), ParserState::Done);
    }

    #[test]
    fn stderr_and_error_events_do_not_feed_the_buffer() {
        let mut parser = ResultStreamParser::new();
        parser.begin();
        parser.feed(&OutputEvent::stderr(framed()));
        parser.feed(&OutputEvent::error(framed()));
        assert_eq!(parser.state(), ParserState::Searching);
    }

    #[test]
    fn stray_start_marker_is_superseded() {
        let mut parser = ResultStreamParser::new();
        parser.begin();
        parser.feed(&OutputEvent::stdout(format!(
            "echoed log line: {START_MARKER} garbage\n"
        )));
        parser.feed(&OutputEvent::stdout(framed()));
        assert_eq!(parser.result(), Some(&sample_result()));
    }

    #[test]
    fn undecodable_payload_yields_no_result() {
        let mut parser = ResultStreamParser::new();
        parser.begin();
        parser.feed(&OutputEvent::stdout(format!(
            "{START_MARKER}{{not json{END_MARKER}"
        )));
        let completion = parser.feed(&OutputEvent::exit(0, "Replay complete"));
        assert_eq!(
            completion,
            Some(ReplayCompletion {
                exit_code: 0,
                result: None,
            })
        );
    }

    #[test]
    fn later_frame_recovers_after_undecodable_one() {
        let mut parser = ResultStreamParser::new();
        parser.begin();
        parser.feed(&OutputEvent::stdout(format!(
            "{START_MARKER}oops{END_MARKER}\n"
        )));
        assert_eq!(parser.state(), ParserState::Searching);
        parser.feed(&OutputEvent::stdout(framed()));
        assert_eq!(parser.result(), Some(&sample_result()));
    }

    #[test]
    fn completion_fires_once() {
        let mut parser = ResultStreamParser::new();
        parser.begin();
        parser.feed(&OutputEvent::stdout(framed()));
        assert!(parser.feed(&OutputEvent::exit(0, "Replay complete")).is_some());
        assert_eq!(parser.feed(&OutputEvent::exit(1, "again")), None);
        assert_eq!(parser.feed(&OutputEvent::stdout("late output")), None);
    }

    #[test]
    fn missing_exit_code_defaults_to_zero() {
        let mut parser = ResultStreamParser::new();
        parser.begin();
        let mut exit = OutputEvent::exit(0, "Replay complete");
        exit.exit_code = None;
        let completion = parser.feed(&exit).unwrap();
        assert_eq!(completion.exit_code, 0);
    }

    #[test]
    fn begin_discards_previous_run() {
        let mut parser = ResultStreamParser::new();
        parser.begin();
        let framed = framed();
        parser.feed(&OutputEvent::stdout(&framed[..framed.len() - 3]));
        assert_eq!(parser.state(), ParserState::StartFound);

        parser.begin();
        assert_eq!(parser.state(), ParserState::Searching);
        assert_eq!(parser.result(), None);
        // The dangling tail of the old frame must not complete anything.
        parser.feed(&OutputEvent::stdout("LTS---"));
        let completion = parser.feed(&OutputEvent::exit(1, "Replay failed")).unwrap();
        assert_eq!(
            completion,
            ReplayCompletion {
                exit_code: 1,
                result: None,
            }
        );
    }
}
