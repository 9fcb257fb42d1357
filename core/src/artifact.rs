//! Ephemeral log files handed to the engine tools.

use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use uuid::Uuid;

use crate::config::ReplayConfig;
use crate::error::Result;

const ARTIFACT_PREFIX: &str = "replay-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The complete submitted content, used for the authoritative replay.
    Full,
    /// The truncated subset fed to the explain step.
    Explain,
}

impl ArtifactKind {
    fn suffix(self) -> &'static str {
        match self {
            ArtifactKind::Full => ".log",
            ArtifactKind::Explain => "-explain.log",
        }
    }
}

/// A written artifact. Dropping it without [`TempArtifactManager::release`]
/// still removes the host file.
#[derive(Debug)]
pub struct TempArtifact {
    host_path: PathBuf,
    execution_path: PathBuf,
    content_lines: usize,
    armed: bool,
}

impl TempArtifact {
    /// Where the file physically lives.
    pub fn host_path(&self) -> &Path {
        &self.host_path
    }

    /// The path as the engine tools see it.
    pub fn execution_path(&self) -> &Path {
        &self.execution_path
    }

    /// Non-blank lines written to the file.
    pub fn content_lines(&self) -> usize {
        self.content_lines
    }

    fn disarm(&mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.host_path)
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.host_path);
        }
    }
}

#[derive(Debug, Clone)]
pub struct TempArtifactManager {
    host_dir: PathBuf,
    /// Set in contained mode, where tools see the shared directory under a
    /// different mount point.
    execution_dir: Option<PathBuf>,
}

impl TempArtifactManager {
    pub fn new(config: &ReplayConfig) -> Self {
        let execution_dir = config
            .mode
            .is_contained()
            .then(|| config.container_tmp_dir.clone());
        Self {
            host_dir: config.host_tmp_dir.clone(),
            execution_dir,
        }
    }

    /// Write `content` to a freshly named file. Names carry a v4 UUID so
    /// concurrent sessions sharing the directory never collide.
    pub async fn allocate(&self, content: &str, kind: ArtifactKind) -> Result<TempArtifact> {
        if self.execution_dir.is_some() {
            tokio::fs::create_dir_all(&self.host_dir).await?;
        }

        let file_name = format!("{ARTIFACT_PREFIX}{}{}", Uuid::new_v4(), kind.suffix());
        let host_path = self.host_dir.join(&file_name);
        let execution_path = match &self.execution_dir {
            Some(dir) => dir.join(&file_name),
            None => host_path.clone(),
        };

        tokio::fs::write(&host_path, content).await?;
        debug!(path = %host_path.display(), ?kind, "wrote artifact");

        Ok(TempArtifact {
            host_path,
            execution_path,
            content_lines: content
                .lines()
                .filter(|line| !line.trim().is_empty())
                .count(),
            armed: true,
        })
    }

    /// Delete the host file. Failures are swallowed.
    pub async fn release(&self, mut artifact: TempArtifact) {
        let path = artifact.disarm();
        if let Err(err) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), %err, "artifact cleanup failed");
        }
    }
}
