//! Scratch directory shared by all in-flight merge jobs.
//!
//! The directory is created at startup and swept of leftover files both at
//! startup and on a coarse interval. Every file placed in it carries a
//! generation-unique suffix, so a sweep colliding with an in-flight job can
//! only touch files from long-dead requests.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Handle to the scratch/output directory with an explicit lifecycle.
#[derive(Debug)]
pub struct ScratchDir {
    root: PathBuf,
}

impl ScratchDir {
    /// Opens the scratch directory, creating it if absent.
    pub fn create(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Collision-resistant suffix for one job's file names: millisecond
    /// timestamp plus a random component, so two concurrent requests can
    /// never derive the same paths.
    pub fn unique_suffix(&self) -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let nonce: u32 = rand::rng().random_range(0..1_000_000_000);
        format!("{millis}-{nonce}")
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Removes every regular file in the directory. Per-file failures are
    /// logged and skipped; the sweep keeps going.
    pub async fn sweep(&self) -> std::io::Result<usize> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(err) => warn!("failed to sweep {}: {err}", path.display()),
            }
        }
        Ok(removed)
    }
}

/// Spawns the periodic sweep task. The first tick fires after one full
/// period; the startup sweep is the caller's responsibility.
pub fn spawn_sweeper(dir: Arc<ScratchDir>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match dir.sweep().await {
                Ok(removed) if removed > 0 => {
                    info!("sweep removed {removed} orphaned scratch file(s)");
                }
                Ok(_) => {}
                Err(err) => warn!("scratch sweep failed: {err}"),
            }
        }
    })
}
