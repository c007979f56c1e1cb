//! Rendition catalog retrieval.
//!
//! Validates caller-supplied locators into a [`VideoId`] and asks yt-dlp for
//! the full format list of that video. The `--dump-single-json` payload is
//! deserialized with everything optional because older videos routinely lack
//! fields, then boiled down into [`Rendition`] descriptors the selector can
//! reason about.

use std::path::PathBuf;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::error::DeliveryError;

/// Validated identifier of one source video. YouTube ids are exactly eleven
/// characters of `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoId(String);

impl VideoId {
    /// Accepts a bare id or any of the common URL shapes (`watch?v=`,
    /// `youtu.be/`, `shorts/`, `embed/`) and extracts the id from it.
    pub fn parse(input: &str) -> Result<Self, DeliveryError> {
        let input = input.trim();
        let invalid = || DeliveryError::InvalidIdentifier(input.to_string());

        if is_raw_id(input) {
            return Ok(Self(input.to_string()));
        }

        let rest = input
            .strip_prefix("https://")
            .or_else(|| input.strip_prefix("http://"))
            .ok_or_else(invalid)?;
        let rest = rest.strip_prefix("www.").unwrap_or(rest);
        let rest = rest.strip_prefix("m.").unwrap_or(rest);

        let candidate = if let Some(tail) = rest.strip_prefix("youtu.be/") {
            tail.split(['?', '&']).next()
        } else if let Some(tail) = rest.strip_prefix("youtube.com/") {
            if let Some(query) = tail.strip_prefix("watch?") {
                query
                    .split('&')
                    .find_map(|pair| pair.strip_prefix("v="))
            } else if let Some(path) = tail
                .strip_prefix("shorts/")
                .or_else(|| tail.strip_prefix("embed/"))
            {
                path.split(['?', '&']).next()
            } else {
                None
            }
        } else {
            None
        };

        match candidate {
            Some(id) if is_raw_id(id) => Ok(Self(id.to_string())),
            _ => Err(invalid()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch URL handed to yt-dlp.
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

fn is_raw_id(value: &str) -> bool {
    value.len() == 11
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Nominal quality class the source assigns to an audio track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioQualityClass {
    Low,
    Medium,
    High,
    Unknown,
}

impl AudioQualityClass {
    fn from_label(label: Option<&str>) -> Self {
        match label {
            Some("AUDIO_QUALITY_LOW") | Some("low") => Self::Low,
            Some("AUDIO_QUALITY_MEDIUM") | Some("medium") => Self::Medium,
            Some("AUDIO_QUALITY_HIGH") | Some("high") => Self::High,
            _ => Self::Unknown,
        }
    }
}

/// One available encoding of the source video. Read-only snapshot; the
/// selector only filters and compares these.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendition {
    pub has_video: bool,
    pub has_audio: bool,
    pub height: Option<i64>,
    pub video_bitrate: Option<f64>,
    pub audio_bitrate: Option<f64>,
    pub audio_quality: AudioQualityClass,
    pub container: String,
    pub content_length: Option<u64>,
    pub source_url: String,
}

/// Minimal slice of yt-dlp's `--dump-single-json` payload.
#[derive(Debug, Deserialize)]
struct VideoInfo {
    #[serde(default)]
    formats: Vec<FormatInfo>,
}

#[derive(Debug, Deserialize)]
struct FormatInfo {
    url: Option<String>,
    height: Option<i64>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    #[serde(rename = "vbr")]
    video_bitrate: Option<f64>,
    #[serde(rename = "abr")]
    audio_bitrate: Option<f64>,
    audio_quality: Option<String>,
    filesize: Option<i64>,
    #[serde(rename = "filesize_approx")]
    filesize_approx: Option<i64>,
}

impl FormatInfo {
    /// Storyboards and other trackless entries are useless downstream, as
    /// are formats yt-dlp could not resolve a URL for; both become `None`.
    fn into_rendition(self) -> Option<Rendition> {
        let source_url = self.url?;
        let has_video = has_codec(self.vcodec.as_deref());
        let has_audio = has_codec(self.acodec.as_deref());
        if !has_video && !has_audio {
            return None;
        }

        let content_length = self
            .filesize
            .or(self.filesize_approx)
            .and_then(|size| u64::try_from(size).ok());

        Some(Rendition {
            has_video,
            has_audio,
            height: self.height,
            video_bitrate: self.video_bitrate,
            audio_bitrate: self.audio_bitrate,
            audio_quality: AudioQualityClass::from_label(self.audio_quality.as_deref()),
            container: self.ext.unwrap_or_default(),
            content_length,
            source_url,
        })
    }
}

fn has_codec(codec: Option<&str>) -> bool {
    matches!(codec, Some(value) if value != "none")
}

/// Fetches rendition catalogs by shelling out to yt-dlp.
pub struct CatalogFetcher {
    binary: PathBuf,
}

impl CatalogFetcher {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Runs `yt-dlp --dump-single-json` for the video and parses the format
    /// list. Subprocess and parse failures both surface as
    /// [`DeliveryError::CatalogFetch`].
    pub async fn fetch(&self, id: &VideoId) -> Result<Vec<Rendition>, DeliveryError> {
        let output = Command::new(&self.binary)
            .args(["--no-progress", "--no-playlist", "--dump-single-json"])
            .arg(id.watch_url())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|err| {
                DeliveryError::CatalogFetch(format!(
                    "failed to run {}: {err}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeliveryError::CatalogFetch(format!(
                "yt-dlp exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_catalog(&output.stdout)
    }
}

fn parse_catalog(payload: &[u8]) -> Result<Vec<Rendition>, DeliveryError> {
    let info: VideoInfo = serde_json::from_slice(payload)
        .map_err(|err| DeliveryError::CatalogFetch(format!("unparseable payload: {err}")))?;

    Ok(info
        .formats
        .into_iter()
        .filter_map(FormatInfo::into_rendition)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_id() {
        let id = VideoId::parse("dQw4w9WgXcQ").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }

    #[test]
    fn parses_watch_url_with_extra_params() {
        let id = VideoId::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }

    #[test]
    fn parses_short_link_and_shorts_path() {
        let id = VideoId::parse("https://youtu.be/dQw4w9WgXcQ?si=abc").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");

        let id = VideoId::parse("https://m.youtube.com/shorts/dQw4w9WgXcQ").unwrap();
        assert_eq!(id.as_str(), "dQw4w9WgXcQ");
    }

    #[test]
    fn rejects_foreign_and_malformed_locators() {
        for input in [
            "",
            "not a url",
            "https://example.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/watch?list=PL123",
            "https://youtu.be/short",
            "dQw4w9WgXc!",
        ] {
            assert!(
                matches!(
                    VideoId::parse(input),
                    Err(DeliveryError::InvalidIdentifier(_))
                ),
                "accepted {input:?}"
            );
        }
    }

    #[test]
    fn watch_url_round_trips() {
        let id = VideoId::parse("abc-DEF_123").unwrap();
        assert_eq!(
            id.watch_url(),
            "https://www.youtube.com/watch?v=abc-DEF_123"
        );
    }

    #[test]
    fn parse_catalog_maps_formats_and_drops_storyboards() {
        let payload = serde_json::json!({
            "id": "abc-DEF_123",
            "title": "sample",
            "formats": [
                {
                    "format_id": "sb0",
                    "vcodec": "none",
                    "acodec": "none",
                    "url": "https://example.test/storyboard"
                },
                {
                    "format_id": "22",
                    "vcodec": "avc1.64001F",
                    "acodec": "mp4a.40.2",
                    "height": 720,
                    "ext": "mp4",
                    "vbr": 1200.5,
                    "abr": 128.0,
                    "filesize": 1048576,
                    "url": "https://example.test/combined"
                },
                {
                    "format_id": "140",
                    "vcodec": "none",
                    "acodec": "mp4a.40.2",
                    "ext": "m4a",
                    "abr": 129.5,
                    "audio_quality": "AUDIO_QUALITY_MEDIUM",
                    "filesize_approx": 2048,
                    "url": "https://example.test/audio"
                },
                {
                    "format_id": "no-url",
                    "vcodec": "avc1.64001F",
                    "acodec": "none"
                }
            ]
        });

        let catalog = parse_catalog(payload.to_string().as_bytes()).unwrap();
        assert_eq!(catalog.len(), 2);

        let combined = &catalog[0];
        assert!(combined.has_video && combined.has_audio);
        assert_eq!(combined.height, Some(720));
        assert_eq!(combined.container, "mp4");
        assert_eq!(combined.content_length, Some(1_048_576));

        let audio = &catalog[1];
        assert!(audio.has_audio && !audio.has_video);
        assert_eq!(audio.audio_quality, AudioQualityClass::Medium);
        assert_eq!(audio.content_length, Some(2048));
    }

    #[test]
    fn parse_catalog_rejects_garbage() {
        assert!(matches!(
            parse_catalog(b"not json"),
            Err(DeliveryError::CatalogFetch(_))
        ));
    }
}
