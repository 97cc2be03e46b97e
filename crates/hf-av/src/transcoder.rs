//! HLS transcoding.
//!
//! [`Transcoder`] is the seam between the scheduler and whatever produces
//! HLS output. [`FfmpegTranscoder`] shells out to ffmpeg and writes
//! `index.m3u8` plus `index0.ts`, `index1.ts`, … into the output directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use hf_core::config::TranscodeConfig;
use hf_core::MANIFEST_FILE;

use crate::command::ToolCommand;
use crate::playlist::Manifest;
use crate::tools::ToolRegistry;

/// Converts a source video into an HLS manifest and segments.
///
/// Implementations write into `output_dir` (which already exists) and return
/// the verified manifest. Dropping the returned future must stop the work.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, source: &Path, output_dir: &Path) -> hf_core::Result<Manifest>;
}

/// ffmpeg-backed [`Transcoder`].
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    settings: TranscodeConfig,
}

impl FfmpegTranscoder {
    /// Build a transcoder using the ffmpeg found by the registry.
    pub fn new(tools: &ToolRegistry, settings: TranscodeConfig) -> hf_core::Result<Self> {
        let ffmpeg = tools.require("ffmpeg")?.path.clone();
        Ok(Self { ffmpeg, settings })
    }

    /// Build the ffmpeg invocation for one source file.
    ///
    /// Fixed output size, H.264 video, `segment_seconds`-long segments
    /// numbered from 0, and an unbounded playlist (`-hls_list_size 0`).
    pub fn command(&self, source: &Path, output_dir: &Path) -> ToolCommand {
        let s = &self.settings;
        let segment_pattern = output_dir.join("index%d.ts");
        let playlist_path = output_dir.join(MANIFEST_FILE);

        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.timeout(Duration::from_secs(s.timeout_secs));
        cmd.args(["-hide_banner", "-nostdin", "-y", "-i"]);
        cmd.arg(source.to_string_lossy());
        cmd.args(["-c:v", &s.video_codec]);
        cmd.args(["-level", &s.level]);
        cmd.args(["-s", &format!("{}x{}", s.width, s.height)]);
        cmd.args(["-start_number", "0"]);
        cmd.args(["-hls_time", &s.segment_seconds.to_string()]);
        cmd.args(["-hls_list_size", "0"]);
        cmd.args(["-hls_segment_filename", &segment_pattern.to_string_lossy()]);
        cmd.args(["-f", "hls"]);
        cmd.arg(playlist_path.to_string_lossy());
        cmd
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, source: &Path, output_dir: &Path) -> hf_core::Result<Manifest> {
        tracing::info!(
            "HLS transcode: {:?} -> {:?} (segment_duration={}s)",
            source,
            output_dir,
            self.settings.segment_seconds
        );

        self.command(source, output_dir).execute().await?;

        Manifest::load(output_dir).map_err(|e| {
            hf_core::Error::tool("ffmpeg", format!("produced unusable output: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcoder() -> FfmpegTranscoder {
        let tools = ToolRegistry::default().with_tool("ffmpeg", "/usr/bin/ffmpeg");
        FfmpegTranscoder::new(&tools, TranscodeConfig::default()).unwrap()
    }

    fn arg_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn requires_ffmpeg() {
        let err = FfmpegTranscoder::new(&ToolRegistry::default(), TranscodeConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("ffmpeg"));
    }

    #[test]
    fn command_uses_fixed_hls_target() {
        let cmd = transcoder().command(Path::new("/m/7/clip.mp4"), Path::new("/m/7/hls.staging"));
        let args = cmd.get_args();

        assert_eq!(arg_after(args, "-i"), Some("/m/7/clip.mp4"));
        assert_eq!(arg_after(args, "-s"), Some("1072x1920"));
        assert_eq!(arg_after(args, "-level"), Some("3.0"));
        assert_eq!(arg_after(args, "-c:v"), Some("libx264"));
        assert_eq!(arg_after(args, "-hls_time"), Some("2"));
        assert_eq!(arg_after(args, "-start_number"), Some("0"));
        assert_eq!(arg_after(args, "-hls_list_size"), Some("0"));
        assert_eq!(arg_after(args, "-f"), Some("hls"));
        assert_eq!(
            arg_after(args, "-hls_segment_filename"),
            Some("/m/7/hls.staging/index%d.ts")
        );
        assert_eq!(
            args.last().map(String::as_str),
            Some("/m/7/hls.staging/index.m3u8")
        );
    }

    #[test]
    fn command_follows_settings() {
        let tools = ToolRegistry::default().with_tool("ffmpeg", "/usr/bin/ffmpeg");
        let settings = TranscodeConfig {
            width: 640,
            height: 360,
            segment_seconds: 6,
            ..TranscodeConfig::default()
        };
        let t = FfmpegTranscoder::new(&tools, settings).unwrap();
        let cmd = t.command(Path::new("in.mov"), Path::new("out"));
        assert_eq!(arg_after(cmd.get_args(), "-s"), Some("640x360"));
        assert_eq!(arg_after(cmd.get_args(), "-hls_time"), Some("6"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_tool_is_reported_not_fatal() {
        // `false` exits 1 for any arguments.
        let Ok(false_bin) = which::which("false") else {
            return;
        };
        let tools = ToolRegistry::default().with_tool("ffmpeg", false_bin);
        let t = FfmpegTranscoder::new(&tools, TranscodeConfig::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let err = t
            .transcode(&dir.path().join("clip.mp4"), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, hf_core::Error::Tool { .. }));
    }
}
