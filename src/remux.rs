//! Remux orchestration: persist two source streams to scratch files, hand
//! them to the external muxer for a stream-copy combine, and guarantee the
//! scratch files are gone on every exit path.
//!
//! The muxer sits behind a trait so tests can substitute one; production is
//! ffmpeg as a subprocess. Both inputs are fully materialized before the
//! muxer runs — it needs complete files, and back-pressure goes through
//! disk rather than a pipe.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::DeliveryError;
use crate::scratch::ScratchDir;
use crate::stream::ByteStream;

#[derive(Debug, Error)]
pub enum MuxError {
    #[error("muxer exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("failed to launch muxer")]
    Spawn(#[source] std::io::Error),
}

/// Container-level combiner of one video file and one audio file.
#[async_trait]
pub trait Muxer: Send + Sync {
    /// Combines `video` and `audio` into a single container at `output`
    /// without re-encoding either bitstream.
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), MuxError>;
}

/// Production muxer invoking ffmpeg with stream-copy for both codecs.
pub struct FfmpegMuxer {
    binary: PathBuf,
}

impl FfmpegMuxer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), MuxError> {
        let result = Command::new(&self.binary)
            .args(["-hide_banner", "-nostats", "-loglevel", "error", "-y"])
            .arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(["-c:v", "copy", "-c:a", "copy", "-f", "mp4"])
            .arg(output)
            .output()
            .await
            .map_err(MuxError::Spawn)?;

        if result.status.success() {
            Ok(())
        } else {
            Err(MuxError::Failed {
                status: result.status,
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            })
        }
    }
}

/// One in-flight combine operation. All three paths share a single
/// generation-unique suffix.
struct MergeJob {
    video_path: PathBuf,
    audio_path: PathBuf,
    output_path: PathBuf,
}

impl MergeJob {
    fn new(scratch: &ScratchDir) -> Self {
        let suffix = scratch.unique_suffix();
        Self {
            video_path: scratch.file(&format!("temp_video_{suffix}.mp4")),
            audio_path: scratch.file(&format!("temp_audio_{suffix}.mp4")),
            output_path: scratch.file(&format!("video_{suffix}.mp4")),
        }
    }

    /// Best-effort removal of both scratch files. Runs on every exit path;
    /// removal errors are logged, never escalated past the primary outcome.
    async fn discard_scratch(&self) {
        for path in [&self.video_path, &self.audio_path] {
            remove_quietly(path).await;
        }
    }
}

async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("failed to remove {}: {err}", path.display()),
    }
}

/// Drives merge jobs against a shared scratch directory and muxer.
pub struct RemuxOrchestrator {
    scratch: Arc<ScratchDir>,
    muxer: Arc<dyn Muxer>,
}

impl RemuxOrchestrator {
    pub fn new(scratch: Arc<ScratchDir>, muxer: Arc<dyn Muxer>) -> Self {
        Self { scratch, muxer }
    }

    /// Materializes both streams to scratch files, invokes the muxer, and
    /// returns the combined file's path.
    ///
    /// Whatever the outcome, neither scratch file survives this call. On
    /// failure any partial output is removed too, so a failed merge leaves
    /// nothing behind.
    pub async fn merge(
        &self,
        video: ByteStream,
        audio: ByteStream,
    ) -> Result<PathBuf, DeliveryError> {
        let job = MergeJob::new(&self.scratch);
        let result = self.run(&job, video, audio).await;
        job.discard_scratch().await;

        match result {
            Ok(()) => Ok(job.output_path),
            Err(err) => {
                remove_quietly(&job.output_path).await;
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        job: &MergeJob,
        video: ByteStream,
        audio: ByteStream,
    ) -> Result<(), DeliveryError> {
        persist_stream(video, &job.video_path).await?;
        persist_stream(audio, &job.audio_path).await?;

        debug!(
            "muxing {} + {} -> {}",
            job.video_path.display(),
            job.audio_path.display(),
            job.output_path.display()
        );
        self.muxer
            .mux(&job.video_path, &job.audio_path, &job.output_path)
            .await?;
        Ok(())
    }
}

/// Writes a byte stream to `path` in full, chunk by chunk.
async fn persist_stream(mut stream: ByteStream, path: &Path) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::tempdir;

    /// Stand-in muxer that "combines" by concatenating both inputs.
    struct ConcatMuxer;

    #[async_trait]
    impl Muxer for ConcatMuxer {
        async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), MuxError> {
            let mut combined = std::fs::read(video).map_err(MuxError::Spawn)?;
            combined.extend(std::fs::read(audio).map_err(MuxError::Spawn)?);
            std::fs::write(output, combined).map_err(MuxError::Spawn)?;
            Ok(())
        }
    }

    /// Muxer that leaves a partial output behind and then fails, like
    /// ffmpeg rejecting a broken input mid-run.
    struct BrokenMuxer;

    #[async_trait]
    impl Muxer for BrokenMuxer {
        async fn mux(&self, _video: &Path, _audio: &Path, output: &Path) -> Result<(), MuxError> {
            use std::os::unix::process::ExitStatusExt;

            std::fs::write(output, b"partial garbage").map_err(MuxError::Spawn)?;
            Err(MuxError::Failed {
                status: ExitStatus::from_raw(256),
                stderr: "moov atom not found".to_string(),
            })
        }
    }

    fn chunks(parts: &[&'static [u8]]) -> ByteStream {
        let items: Vec<std::io::Result<Bytes>> = parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part)))
            .collect();
        Box::pin(futures::stream::iter(items))
    }

    fn failing_stream() -> ByteStream {
        Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"head")),
            Err(std::io::Error::other("connection reset")),
        ]))
    }

    fn scratch_file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter(|entry| {
                entry
                    .as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with("temp_")
            })
            .count()
    }

    #[tokio::test]
    async fn merge_produces_output_and_removes_scratch() {
        let dir = tempdir().unwrap();
        let scratch = Arc::new(ScratchDir::create(dir.path()).unwrap());
        let orchestrator = RemuxOrchestrator::new(scratch, Arc::new(ConcatMuxer));

        let output = orchestrator
            .merge(chunks(&[b"vid-a", b"vid-b"]), chunks(&[b"aud"]))
            .await
            .unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), b"vid-avid-baud");
        assert_eq!(scratch_file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn failed_mux_removes_scratch_and_partial_output() {
        let dir = tempdir().unwrap();
        let scratch = Arc::new(ScratchDir::create(dir.path()).unwrap());
        let orchestrator = RemuxOrchestrator::new(scratch, Arc::new(BrokenMuxer));

        let result = orchestrator
            .merge(chunks(&[b"vid"]), chunks(&[b"aud"]))
            .await;

        assert!(matches!(result, Err(DeliveryError::Merge(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_source_stream_removes_scratch() {
        let dir = tempdir().unwrap();
        let scratch = Arc::new(ScratchDir::create(dir.path()).unwrap());
        let orchestrator = RemuxOrchestrator::new(scratch, Arc::new(ConcatMuxer));

        let result = orchestrator.merge(chunks(&[b"vid"]), failing_stream()).await;

        assert!(matches!(result, Err(DeliveryError::Io(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn concurrent_merges_do_not_collide() {
        let dir = tempdir().unwrap();
        let scratch = Arc::new(ScratchDir::create(dir.path()).unwrap());
        let orchestrator =
            Arc::new(RemuxOrchestrator::new(scratch, Arc::new(ConcatMuxer)));

        let a = orchestrator.merge(chunks(&[b"first-v"]), chunks(&[b"first-a"]));
        let b = orchestrator.merge(chunks(&[b"second-v"]), chunks(&[b"second-a"]));
        let (a, b) = tokio::join!(a, b);
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a, b);
        assert_eq!(std::fs::read(&a).unwrap(), b"first-vfirst-a");
        assert_eq!(std::fs::read(&b).unwrap(), b"second-vsecond-a");
    }
}
