#![cfg(unix)]

//! A scripted stand-in for the detection engine.
//!
//! [`FakeEngine::install`] writes a shell script that is configured as the
//! elevation wrapper (direct mode) or container runtime (contained mode).
//! It receives `[tool, ...args]` (optionally behind `exec <container>`) and
//! emulates the four engine commands against a private state directory:
//!
//! * `crowdsec --dsn file://P ...` records the replayed file.
//! * `cscli alerts delete --all` forgets it.
//! * `cscli alerts list -o json` prints one CVE-2017-9841 alert when the
//!   replayed file contains a request for `eval-stdin.php`, otherwise `null`.
//! * `cscli explain -f P -t T` records the explained file and echoes it.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use async_channel::Receiver;
use logreplay_core::ExecutionMode;
use logreplay_core::OutputSink;
use logreplay_core::ReplayConfig;
use logreplay_core::ReplayOrchestrator;
use logreplay_protocol::OutputEvent;
use logreplay_protocol::ReplayRequest;
use logreplay_protocol::ReplayResult;
use tempfile::TempDir;

pub const KNOWN_SCENARIO: &str = "crowdsecurity/CVE-2017-9841";

pub const EXPLOIT_LINE: &str = r#"1.2.3.4 - - [10/Oct/2025:13:55:36 +0000] "POST /vendor/phpunit/phpunit/src/Util/PHP/eval-stdin.php HTTP/1.1" 404 153 "-" "Mozilla/5.0""#;

const SCRIPT: &str = r##"#!/bin/sh
STATE='@STATE@'
echo "$*" >> "$STATE/invocations.log"
if [ "$1" = "exec" ]; then
  shift 2
fi
tool="$1"
shift
case "$tool" in
  crowdsec)
    path="${2#file://}"
    if [ -f "$STATE/replay_sleep" ]; then
      exec sleep "$(cat "$STATE/replay_sleep")"
    fi
    cp "$path" "$STATE/replayed.log"
    echo "level=info msg=\"reading $path\"" >&2
    code=0
    if [ -f "$STATE/replay_exit_code" ]; then
      code=$(cat "$STATE/replay_exit_code")
    fi
    exit "$code"
    ;;
  cscli)
    case "$1 $2" in
      "alerts delete")
        rm -f "$STATE/replayed.log"
        echo "alert(s) deleted"
        ;;
      "alerts list")
        if [ -f "$STATE/alerts_override" ]; then
          cat "$STATE/alerts_override"
        elif [ -f "$STATE/replayed.log" ] && grep -q "eval-stdin.php" "$STATE/replayed.log"; then
          ip=$(grep "eval-stdin.php" "$STATE/replayed.log" | head -n 1 | awk '{print $1}')
          cat <<JSON
[{"id":1,"scenario":"crowdsecurity/CVE-2017-9841","events_count":1,"message":"Ip $ip performed 'crowdsecurity/CVE-2017-9841' (1 events over 0s)","source":{"ip":"$ip","scope":"Ip","value":"$ip"},"decisions":[{"type":"ban","duration":"4h","scope":"Ip","value":"$ip"}]}]
JSON
        else
          echo "null"
        fi
        ;;
      "explain -f")
        cp "$3" "$STATE/explained.log"
        if [ -f "$STATE/explain_sleep" ]; then
          exec sleep "$(cat "$STATE/explain_sleep")"
        fi
        while IFS= read -r line; do
          echo "line: $line"
          echo "  ├ s00-raw"
        done < "$3"
        ;;
      *)
        echo "unknown cscli command: $*" >&2
        exit 2
        ;;
    esac
    ;;
  *)
    echo "unknown tool: $tool" >&2
    exit 127
    ;;
esac
"##;

pub struct FakeEngine {
    _root: TempDir,
    script: PathBuf,
    state_dir: PathBuf,
    artifact_dir: PathBuf,
}

impl FakeEngine {
    pub fn install() -> anyhow::Result<Self> {
        let root = TempDir::new().context("fake engine root")?;
        let state_dir = root.path().join("state");
        let artifact_dir = root.path().join("artifacts");
        fs::create_dir_all(&state_dir)?;
        fs::create_dir_all(&artifact_dir)?;

        let script = root.path().join("fake-engine");
        let body = SCRIPT.replace("@STATE@", &state_dir.display().to_string());
        fs::write(&script, body).context("write fake engine script")?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;

        Ok(Self {
            _root: root,
            script,
            state_dir,
            artifact_dir,
        })
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    pub fn artifact_dir(&self) -> &Path {
        &self.artifact_dir
    }

    pub fn direct_config(&self) -> ReplayConfig {
        ReplayConfig {
            mode: ExecutionMode::Direct {
                elevation: self.script.display().to_string(),
            },
            host_tmp_dir: self.artifact_dir.clone(),
            ..ReplayConfig::direct()
        }
    }

    /// The shared directory is visible at the same path on both sides so
    /// the script can read what the tools are pointed at.
    pub fn contained_config(&self, container: &str) -> ReplayConfig {
        let shared = self.artifact_dir.join("shared");
        ReplayConfig {
            mode: ExecutionMode::Contained {
                runtime: self.script.display().to_string(),
                container: container.to_string(),
            },
            host_tmp_dir: shared.clone(),
            container_tmp_dir: shared,
            step_timeout: None,
        }
    }

    pub fn orchestrator(&self, config: ReplayConfig) -> ReplayOrchestrator {
        ReplayOrchestrator::new(Arc::new(config))
    }

    pub fn set_alerts_output(&self, output: &str) -> anyhow::Result<()> {
        fs::write(self.state_dir.join("alerts_override"), output)?;
        Ok(())
    }

    pub fn fail_replay_with(&self, exit_code: i32) -> anyhow::Result<()> {
        fs::write(
            self.state_dir.join("replay_exit_code"),
            exit_code.to_string(),
        )?;
        Ok(())
    }

    pub fn hang_replay_for(&self, secs: u32) -> anyhow::Result<()> {
        fs::write(self.state_dir.join("replay_sleep"), secs.to_string())?;
        Ok(())
    }

    pub fn hang_explain_for(&self, secs: u32) -> anyhow::Result<()> {
        fs::write(self.state_dir.join("explain_sleep"), secs.to_string())?;
        Ok(())
    }

    /// Lines of the file the explain command was pointed at.
    pub fn explained_lines(&self) -> anyhow::Result<Vec<String>> {
        let contents = fs::read_to_string(self.state_dir.join("explained.log"))
            .context("explain was never invoked")?;
        Ok(contents.lines().map(str::to_string).collect())
    }

    /// Every argv the wrapper received, space-joined, in order.
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(self.state_dir.join("invocations.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Files still present anywhere under the artifact directory.
    pub fn leftover_artifacts(&self) -> Vec<PathBuf> {
        let mut leftovers = Vec::new();
        let mut pending = vec![self.artifact_dir.clone()];
        while let Some(dir) = pending.pop() {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    pending.push(path);
                } else {
                    leftovers.push(path);
                }
            }
        }
        leftovers
    }
}

/// Collect events from `rx` until every sender is gone.
pub async fn collect_events(rx: Receiver<OutputEvent>) -> Vec<OutputEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Run one replay to completion and return its outcome plus every event it
/// emitted.
pub async fn run_replay(
    orchestrator: &ReplayOrchestrator,
    request: ReplayRequest,
) -> (logreplay_core::Result<ReplayResult>, Vec<OutputEvent>) {
    let (sink, rx) = OutputSink::channel();
    let outcome = orchestrator.replay(&request, &sink).await;
    drop(sink);
    (outcome, collect_events(rx).await)
}

/// Concatenated text of every stdout event.
pub fn stdout_text(events: &[OutputEvent]) -> String {
    events
        .iter()
        .filter(|event| event.kind == logreplay_protocol::OutputKind::Stdout)
        .map(|event| event.text.as_str())
        .collect()
}

pub fn exploit_request() -> ReplayRequest {
    ReplayRequest::new(format!("{EXPLOIT_LINE}\n"), "nginx")
}

pub fn numbered_lines(count: usize) -> String {
    (1..=count)
        .map(|n| format!("Oct 10 13:55:{n:02} host sshd[{n}]: Failed password for root from 10.0.0.{n} port 22 ssh2\n"))
        .collect()
}

pub fn must_install() -> FakeEngine {
    FakeEngine::install().expect("install fake engine")
}
