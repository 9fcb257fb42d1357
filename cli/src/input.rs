//! Checks applied to log input before anything is sent to the server.

use std::io;
use std::path::Path;
use std::path::PathBuf;

use logreplay_protocol::MAX_EXPLAIN_LINES;
use thiserror::Error;
use tokio::io::AsyncReadExt;

pub const MAX_INPUT_BYTES: usize = 1024 * 1024;

/// Bytes scanned for NUL when sniffing binary content.
const NUL_SCAN_WINDOW: usize = 1024;

const BINARY_SIGNATURES: &[(&str, &[u8])] = &[
    ("PNG", &[0x89, 0x50, 0x4e, 0x47]),
    ("JPEG", &[0xff, 0xd8, 0xff]),
    ("GIF", &[0x47, 0x49, 0x46, 0x38]),
    ("PDF", &[0x25, 0x50, 0x44, 0x46]),
    ("ZIP", &[0x50, 0x4b, 0x03, 0x04]),
    ("RAR", &[0x52, 0x61, 0x72, 0x21]),
    ("ELF", &[0x7f, 0x45, 0x4c, 0x46]),
    ("EXE", &[0x4d, 0x5a]),
];

#[derive(Debug, Error)]
pub enum InputError {
    #[error("input is {size} bytes; the limit is 1MB")]
    TooLarge { size: usize },
    #[error("input appears to be binary ({kind}), not a text file")]
    Binary { kind: &'static str },
    #[error("log content is empty")]
    Empty,
    #[error("log type is required")]
    MissingType,
    #[error("failed to read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Identify well-known binary formats, or any NUL byte near the start.
pub fn detect_binary(bytes: &[u8]) -> Option<&'static str> {
    for &(kind, signature) in BINARY_SIGNATURES {
        if bytes.starts_with(signature) {
            return Some(kind);
        }
    }
    let window = &bytes[..bytes.len().min(NUL_SCAN_WINDOW)];
    window.contains(&0).then_some("NUL bytes")
}

/// Turn raw input into log text, or explain why it is unusable.
pub fn validate_content(bytes: &[u8]) -> Result<String, InputError> {
    if bytes.len() > MAX_INPUT_BYTES {
        return Err(InputError::TooLarge { size: bytes.len() });
    }
    if let Some(kind) = detect_binary(bytes) {
        return Err(InputError::Binary { kind });
    }
    let content = String::from_utf8_lossy(bytes).into_owned();
    if content.trim().is_empty() {
        return Err(InputError::Empty);
    }
    Ok(content)
}

pub fn validate_log_type(log_type: &str) -> Result<String, InputError> {
    let trimmed = log_type.trim();
    if trimmed.is_empty() {
        return Err(InputError::MissingType);
    }
    Ok(trimmed.to_string())
}

pub fn non_blank_lines(content: &str) -> usize {
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count()
}

/// A heads-up when explain output will not cover the whole input.
pub fn explain_notice(content: &str) -> Option<String> {
    let lines = non_blank_lines(content);
    (lines > MAX_EXPLAIN_LINES).then(|| {
        format!(
            "{lines} lines submitted; all are replayed for alerts, but explain output covers only the first {MAX_EXPLAIN_LINES}."
        )
    })
}

/// Read from `path`, or from stdin when `path` is `None` or `-`.
///
/// Reads at most one byte past the limit so oversized input is rejected
/// without buffering all of it.
pub async fn read_input(path: Option<&Path>) -> Result<Vec<u8>, InputError> {
    let limit = (MAX_INPUT_BYTES + 1) as u64;
    let mut bytes = Vec::new();
    match path {
        Some(path) if path != Path::new("-") => {
            let unreadable = |source| InputError::Unreadable {
                path: path.to_path_buf(),
                source,
            };
            let file = tokio::fs::File::open(path).await.map_err(unreadable)?;
            file.take(limit)
                .read_to_end(&mut bytes)
                .await
                .map_err(unreadable)?;
        }
        _ => {
            tokio::io::stdin()
                .take(limit)
                .read_to_end(&mut bytes)
                .await
                .map_err(|source| InputError::Unreadable {
                    path: PathBuf::from("<stdin>"),
                    source,
                })?;
        }
    }
    Ok(bytes)
}
