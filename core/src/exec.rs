#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

use std::io;
use std::process::ExitStatus;
use std::process::Stdio;
use std::time::Duration;
use std::time::Instant;

use async_channel::Receiver;
use async_channel::Sender;
use logreplay_protocol::OutputEvent;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::Command;
use tracing::debug;
use tracing::warn;

use crate::command::ResolvedCommand;
use crate::error::ReplayError;
use crate::error::Result;

const EXIT_CODE_SIGNAL_BASE: i32 = 128; // conventional shell: 128 + signal

// I/O buffer sizing
const READ_CHUNK_SIZE: usize = 8192; // bytes per read
const AGGREGATE_BUFFER_INITIAL_CAPACITY: usize = 8 * 1024; // 8 KiB

/// Ordered sink for [`OutputEvent`]s bound for one observer.
///
/// Sending never fails from the caller's point of view: once the observer
/// has gone away events are silently dropped and the pipeline keeps going.
#[derive(Debug, Clone)]
pub struct OutputSink {
    tx_event: Sender<OutputEvent>,
}

impl OutputSink {
    pub fn new(tx_event: Sender<OutputEvent>) -> Self {
        Self { tx_event }
    }

    pub fn channel() -> (Self, Receiver<OutputEvent>) {
        let (tx_event, rx_event) = async_channel::unbounded();
        (Self::new(tx_event), rx_event)
    }

    pub async fn send(&self, event: OutputEvent) {
        let _ = self.tx_event.send(event).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx_event.is_closed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Spawn `command`, streaming every stdout/stderr chunk to `sink` as it
/// arrives, and resolve once the process has exited and both pipes are
/// drained.
///
/// A non-zero exit code is returned as data. Only a failure to start the
/// process (or an expired `timeout`) is an error.
pub async fn run_command(
    command: &ResolvedCommand,
    sink: &OutputSink,
    timeout: Option<Duration>,
) -> Result<ExecOutput> {
    let start = Instant::now();
    debug!(command = %command, "spawning");

    let child = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| ReplayError::spawn(&command.program, err))?;

    let (exit_status, stdout, stderr) = consume_output(child, command, timeout, sink).await?;

    let exit_code = exit_status.code().unwrap_or_else(|| {
        #[cfg(target_family = "unix")]
        {
            if let Some(signal) = exit_status.signal() {
                return EXIT_CODE_SIGNAL_BASE + signal;
            }
        }
        -1
    });

    if exit_code != 0 && !stderr.is_empty() {
        warn!(
            command = %command,
            exit_code,
            stderr = %stderr.trim_end(),
            "command exited with non-zero status"
        );
    }

    Ok(ExecOutput {
        exit_code,
        stdout,
        stderr,
        duration: start.elapsed(),
    })
}

async fn consume_output(
    mut child: Child,
    command: &ResolvedCommand,
    timeout: Option<Duration>,
    sink: &OutputSink,
) -> Result<(ExitStatus, String, String)> {
    // Both stdout and stderr were configured with `Stdio::piped()`
    // above, therefore `take()` should normally return `Some`.  If it doesn't
    // we treat it as an exceptional I/O error
    let stdout_reader = child
        .stdout
        .take()
        .ok_or_else(|| io::Error::other("stdout pipe was unexpectedly not available"))?;
    let stderr_reader = child
        .stderr
        .take()
        .ok_or_else(|| io::Error::other("stderr pipe was unexpectedly not available"))?;

    let stdout_handle = tokio::spawn(read_stream(
        BufReader::new(stdout_reader),
        sink.clone(),
        false,
    ));
    let stderr_handle = tokio::spawn(read_stream(
        BufReader::new(stderr_reader),
        sink.clone(),
        true,
    ));

    let exit_status = match timeout {
        None => child.wait().await?,
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                child.start_kill()?;
                let _ = child.wait().await;
                // Grandchildren may still hold the pipes open.
                stdout_handle.abort();
                stderr_handle.abort();
                return Err(ReplayError::Timeout {
                    command: command.command_line(),
                    timeout: limit,
                });
            }
        },
    };

    let stdout = stdout_handle.await??;
    let stderr = stderr_handle.await??;
    Ok((exit_status, stdout, stderr))
}

async fn read_stream<R: AsyncRead + Unpin + Send + 'static>(
    mut reader: R,
    sink: OutputSink,
    is_stderr: bool,
) -> io::Result<String> {
    let mut aggregated = String::with_capacity(AGGREGATE_BUFFER_INITIAL_CAPACITY);
    let mut decoder = Utf8ChunkDecoder::default();
    let mut tmp = [0u8; READ_CHUNK_SIZE];

    loop {
        let n = reader.read(&mut tmp).await?;
        let text = if n == 0 {
            decoder.finish()
        } else {
            decoder.push(&tmp[..n])
        };

        if !text.is_empty() {
            aggregated.push_str(&text);
            let event = if is_stderr {
                OutputEvent::stderr(text)
            } else {
                OutputEvent::stdout(text)
            };
            sink.send(event).await;
        }

        if n == 0 {
            break;
        }
    }

    Ok(aggregated)
}

/// Turns an arbitrarily split byte stream into text without mangling
/// multi-byte sequences that straddle a read boundary.
#[derive(Debug, Default)]
struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                    }
                }
            }
        }
    }

    fn finish(&mut self) -> String {
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        out
    }
}
