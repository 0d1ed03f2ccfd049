// Common data models for the download core

use serde::{Deserialize, Serialize};

/// One quality/codec variant of a source, as reported by the provider.
///
/// yt-dlp uses the literal string "none" for an absent codec, so both
/// `None` and `Some("none")` mean the stream is missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    /// Format ID (e.g., "137", "140")
    #[serde(default)]
    pub format_id: String,
    /// Container extension (mp4, webm, m4a)
    #[serde(default)]
    pub ext: String,
    /// Video codec (avc1, vp9, av01, none)
    pub vcodec: Option<String>,
    /// Audio codec (mp4a, opus, none)
    pub acodec: Option<String>,
    /// Video height in pixels
    pub height: Option<u32>,
    /// Video width in pixels
    pub width: Option<u32>,
    /// Audio bitrate in kbps
    pub abr: Option<f64>,
    /// Exact file size in bytes; kept as f64 because the provider emits
    /// fractional values for estimated fields
    pub filesize: Option<f64>,
    /// Approximate file size (when exact is unknown)
    pub filesize_approx: Option<f64>,
    /// Provider quality note (e.g., "1080p", "tiny")
    pub format_note: Option<String>,
}

impl RawFormat {
    /// Whether a video stream is present.
    pub fn has_video(&self) -> bool {
        self.vcodec
            .as_deref()
            .map_or(false, |v| v != "none" && !v.is_empty())
    }

    /// Whether an audio stream is present.
    pub fn has_audio(&self) -> bool {
        self.acodec
            .as_deref()
            .map_or(false, |a| a != "none" && !a.is_empty())
    }

    /// Get reported file size (exact or approximate).
    pub fn reported_size(&self) -> Option<u64> {
        self.filesize
            .or(self.filesize_approx)
            .filter(|s| *s >= 0.0)
            .map(|s| s as u64)
    }
}

/// Everything the provider knows about a source after resolution.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceMetadata {
    #[serde(default)]
    pub title: String,
    /// Total duration in seconds, used for size estimation
    pub duration: Option<f64>,
    /// Pre-rendered duration (e.g., "3:45")
    pub duration_string: Option<String>,
    pub uploader: Option<String>,
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

/// Video metadata response: title plus the normalized quality list.
#[derive(Debug, Clone, Serialize)]
pub struct VideoInfo {
    pub title: String,
    pub duration: String,
    pub uploader: String,
    pub thumbnail: String,
    pub formats: Vec<VideoFormatOption>,
}

/// One selectable video quality
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VideoFormatOption {
    pub format_id: String,
    pub ext: String,
    pub quality: String,
    pub height: u32,
    pub filesize: String,
}

/// Audio metadata response with the normalized bitrate list.
#[derive(Debug, Clone, Serialize)]
pub struct AudioInfo {
    pub title: String,
    pub duration: String,
    pub uploader: String,
    pub thumbnail: String,
    pub audio_formats: Vec<AudioFormatOption>,
}

/// One selectable audio stream
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AudioFormatOption {
    pub format_id: String,
    pub ext: String,
    pub bitrate_kbps: u32,
    pub filesize: String,
}

/// Lifecycle of a tracked job. Completion and failure have no variant:
/// a finished job is removed from the registry entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    NotStarted,
    Starting,
    Downloading,
    Processing,
    Converting,
}

impl JobState {
    /// Caller-facing wording for the progress endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::Starting => "Starting...",
            Self::Downloading => "Downloading...",
            Self::Processing => "Processing...",
            Self::Converting => "Converting to MP3...",
        }
    }
}

/// Point-in-time view of a job handed out to polling callers.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressSnapshot {
    pub percent: f64,
    pub state: String,
    pub size: String,
    pub speed: String,
}

impl Default for ProgressSnapshot {
    /// The "not started" snapshot, returned for unknown job ids.
    fn default() -> Self {
        Self {
            percent: 0.0,
            state: JobState::NotStarted.as_str().to_string(),
            size: "0 B".to_string(),
            speed: "0 B/s".to_string(),
        }
    }
}
