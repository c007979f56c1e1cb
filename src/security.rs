//! Shared security helpers for the tubemux binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Fails fast when a binary is started as root. The service shells out to
/// yt-dlp and ffmpeg against caller-controlled input and is expected to run
/// under a dedicated unprivileged account; guarding the binary itself keeps
/// manual invocations from silently reverting to insecure defaults.
pub fn ensure_not_root(process: &str) -> Result<()> {
    if Uid::current().is_root() {
        bail!("{process} must not be run as root; please use a dedicated service account");
    }
    Ok(())
}
