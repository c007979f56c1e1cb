//! Runtime configuration for the tubemux binaries.
//!
//! Follows the same `KEY="value"` env-file convention as the rest of the
//! deployment; every key is optional and falls back to a default, so a
//! missing config file just means stock settings.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/tubemux-env";
pub const DEFAULT_PORT: u16 = 3007;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_SCRATCH_DIR: &str = "output";
pub const DEFAULT_YTDLP_PATH: &str = "yt-dlp";
pub const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub scratch_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub sweep_interval_secs: Option<u64>,
}

/// Fully-resolved settings the backend runs with.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub scratch_dir: PathBuf,
    pub port: u16,
    pub host: String,
    pub ytdlp_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub sweep_interval: Duration,
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"');
            if value.is_empty() {
                continue;
            }
            match key {
                "SCRATCH_DIR" => cfg.scratch_dir = Some(PathBuf::from(value)),
                "TUBEMUX_PORT" => {
                    let port: u16 = value.parse().with_context(|| {
                        format!("Parsing TUBEMUX_PORT from {}", path.display())
                    })?;
                    cfg.port = Some(port);
                }
                "TUBEMUX_HOST" => cfg.host = Some(value.to_string()),
                "YTDLP_PATH" => cfg.ytdlp_path = Some(PathBuf::from(value)),
                "FFMPEG_PATH" => cfg.ffmpeg_path = Some(PathBuf::from(value)),
                "SWEEP_INTERVAL_SECS" => {
                    let secs: u64 = value.parse().with_context(|| {
                        format!("Parsing SWEEP_INTERVAL_SECS from {}", path.display())
                    })?;
                    cfg.sweep_interval_secs = Some(secs);
                }
                _ => {}
            }
        }
    }
    Ok(Some(cfg))
}

pub fn load_runtime_config() -> Result<RuntimeConfig> {
    load_runtime_config_from(Path::new(DEFAULT_CONFIG_PATH))
}

pub fn load_runtime_config_from(path: impl AsRef<Path>) -> Result<RuntimeConfig> {
    let cfg = read_env_config(path.as_ref())?.unwrap_or_default();

    // The service port can also come from the environment, which wins over
    // the config file.
    let env_port = std::env::var("TUBEMUX_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok());

    Ok(RuntimeConfig {
        scratch_dir: cfg
            .scratch_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCRATCH_DIR)),
        port: env_port.or(cfg.port).unwrap_or(DEFAULT_PORT),
        host: cfg.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
        ytdlp_path: cfg
            .ytdlp_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_YTDLP_PATH)),
        ffmpeg_path: cfg
            .ffmpeg_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG_PATH)),
        sweep_interval: Duration::from_secs(
            cfg.sweep_interval_secs
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        ),
    })
}
