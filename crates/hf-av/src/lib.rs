//! # hf-av
//!
//! External tool handling and HLS transcoding for hlsforge.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support; children are killed when the future is dropped.
//! - **Transcoding** ([`Transcoder`], [`FfmpegTranscoder`]) -- turn a source
//!   video into an HLS manifest plus numbered `.ts` segments.
//! - **Manifest parsing** ([`Manifest`]) -- read and verify the playlist the
//!   transcoder produced.

pub mod command;
pub mod playlist;
pub mod tools;
pub mod transcoder;

pub use command::{ToolCommand, ToolOutput};
pub use playlist::{Manifest, SegmentRef};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
pub use transcoder::{FfmpegTranscoder, Transcoder};
