//! Media item lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// File name of the HLS manifest inside a media item's `hls/` directory.
pub const MANIFEST_FILE: &str = "index.m3u8";

/// Build the file name of segment `index`, e.g. `index3.ts`.
pub fn segment_file_name(index: u64) -> String {
    format!("index{index}.ts")
}

/// Parse a segment file name of the form `index<digits>.ts`, returning the
/// numeric index. Anything else (path separators, signs, other extensions)
/// yields `None`.
pub fn parse_segment_name(name: &str) -> Option<u64> {
    let digits = name.strip_prefix("index")?.strip_suffix(".ts")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Transcoding state of a media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaState {
    /// Source persisted, transcode queued or running.
    Pending,
    /// Manifest and segments are published and servable.
    Ready,
    /// The transcoder failed; nothing is servable.
    Failed,
}

impl fmt::Display for MediaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Latest known status of a media item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaStatus {
    pub state: MediaState,
    /// File name of the uploaded source, as stored.
    pub source_file: String,
    pub updated_at: DateTime<Utc>,
    /// Error message of the last failed transcode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MediaStatus {
    /// A freshly uploaded item waiting for its transcode.
    pub fn pending(source_file: impl Into<String>) -> Self {
        Self {
            state: MediaState::Pending,
            source_file: source_file.into(),
            updated_at: Utc::now(),
            error: None,
        }
    }

    /// Move to `ready`.
    pub fn mark_ready(&mut self) {
        self.state = MediaState::Ready;
        self.error = None;
        self.updated_at = Utc::now();
    }

    /// Move to `failed`, recording the error.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.state = MediaState::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }
}
