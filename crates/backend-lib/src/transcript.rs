// ============================
// crates/backend-lib/src/transcript.rs
// ============================
//! On-disk execution transcripts.
//!
//! Three process-wide append-only logs shared by every execution session:
//! detected interactive prompts, user-supplied stdin lines, and plain
//! output. The server writes them and never reads them back. Failures are
//! logged and swallowed; transcript trouble must never affect a run.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::{fs as tokio_fs, io::AsyncWriteExt};
use tracing::warn;

/// Trait for transcript backends
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    /// Record an output chunk classified as an interactive prompt
    async fn append_prompt(&self, chunk: &str);

    /// Record a plain output chunk
    async fn append_output(&self, chunk: &str);

    /// Record a stdin line forwarded to a subprocess
    async fn append_input(&self, line: &str);
}

/// Flat-file implementation of the [`TranscriptSink`] trait
pub struct FlatFileTranscript {
    prompts: PathBuf,
    outputs: PathBuf,
    inputs: PathBuf,
}

impl FlatFileTranscript {
    pub fn new<P: AsRef<Path>>(logs_dir: P) -> anyhow::Result<Self> {
        let logs_dir = logs_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&logs_dir)?;
        Ok(Self {
            prompts: logs_dir.join("prompts.log"),
            outputs: logs_dir.join("outputs.log"),
            inputs: logs_dir.join("inputs.log"),
        })
    }

    async fn append_line(path: &Path, data: &str) {
        let result = async {
            let mut file = tokio_fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(data.as_bytes()).await?;
            file.write_all(b"\n").await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "transcript append failed");
        }
    }
}

#[async_trait]
impl TranscriptSink for FlatFileTranscript {
    async fn append_prompt(&self, chunk: &str) {
        Self::append_line(&self.prompts, chunk).await;
    }

    async fn append_output(&self, chunk: &str) {
        Self::append_line(&self.outputs, chunk).await;
    }

    async fn append_input(&self, line: &str) {
        Self::append_line(&self.inputs, line).await;
    }
}
