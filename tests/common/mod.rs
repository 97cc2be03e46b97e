//! Shared test harness for integration tests.
//!
//! [`TestHarness`] builds a full [`AppContext`] over a temporary media root
//! and a scripted [`FakeTranscoder`]. [`TestHarness::with_server`] starts Axum
//! on a random port for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use hf_av::{Manifest, SegmentRef, ToolRegistry, Transcoder};
use hf_core::config::Config;
use hf_core::{segment_file_name, MediaId, MediaState, MediaStatus, MANIFEST_FILE};
use hf_server::context::AppContext;
use hf_server::router::build_router;

pub const INDEX_HTML: &str = "<!DOCTYPE html><title>hlsforge test</title>";

/// Stand-in for ffmpeg: copies the source into `segments` numbered segment
/// files and writes a matching manifest.
pub struct FakeTranscoder {
    segments: usize,
    fail: AtomicBool,
    gate: watch::Sender<bool>,
    runs: AtomicUsize,
}

impl FakeTranscoder {
    pub fn new(segments: usize) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            segments,
            fail: AtomicBool::new(false),
            gate,
            runs: AtomicUsize::new(0),
        }
    }

    /// Make subsequent transcodes fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Block transcodes until [`FakeTranscoder::release`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Number of transcodes that have started.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(&self, source: &Path, output_dir: &Path) -> hf_core::Result<Manifest> {
        self.runs.fetch_add(1, Ordering::SeqCst);

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        if self.fail.load(Ordering::SeqCst) {
            return Err(hf_core::Error::tool("ffmpeg", "Invalid data found when processing input"));
        }

        let data = tokio::fs::read(source).await?;
        let mut manifest = Manifest {
            target_duration: Some(2),
            ended: true,
            ..Manifest::default()
        };
        for i in 0..self.segments as u64 {
            tokio::fs::write(output_dir.join(segment_file_name(i)), &data).await?;
            manifest.segments.push(SegmentRef {
                uri: segment_file_name(i),
                duration: 2.0,
            });
        }
        tokio::fs::write(output_dir.join(MANIFEST_FILE), manifest.to_m3u8()).await?;

        Manifest::load(output_dir)
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub transcoder: Arc<FakeTranscoder>,
    _root: tempfile::TempDir,
}

impl TestHarness {
    /// Default configuration, three segments per transcode.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Custom configuration; storage paths are redirected into a temp dir.
    pub fn with_config(mut config: Config) -> Self {
        let root = tempfile::tempdir().expect("failed to create temp dir");
        config.storage.media_root = root.path().join("media");
        config.server.index_page = root.path().join("index.html");
        std::fs::write(&config.server.index_page, INDEX_HTML).expect("failed to write index");

        let transcoder = Arc::new(FakeTranscoder::new(3));
        let ctx = AppContext::new(config, ToolRegistry::default(), transcoder.clone());

        Self {
            ctx,
            transcoder,
            _root: root,
        }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::with_server_config(Config::default()).await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        let harness = Self::with_config(config);
        let app = build_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    pub fn media_dir(&self, id: u64) -> PathBuf {
        self.ctx.store.resolve_base(media_id(id))
    }

    pub fn status(&self, id: u64) -> Option<MediaStatus> {
        self.ctx.scheduler.status(media_id(id))
    }

    /// Poll until the item reaches `state`.
    pub async fn wait_for_state(&self, id: u64, state: MediaState) -> MediaStatus {
        wait_until(|| self.status(id).is_some_and(|s| s.state == state)).await;
        self.status(id).expect("status vanished")
    }

    /// Poll until no transcode is queued or running.
    pub async fn wait_idle(&self) {
        wait_until(|| self.ctx.scheduler.active_jobs() == 0).await;
    }
}

pub fn media_id(id: u64) -> MediaId {
    MediaId::new(id).expect("media ids in tests are positive")
}

/// Poll `condition` every 10 ms for up to five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

/// Multipart form with a `video` file part.
pub fn video_form(file_name: &str, data: &[u8]) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(data.to_vec())
        .file_name(file_name.to_string())
        .mime_str("video/mp4")
        .expect("valid mime");
    reqwest::multipart::Form::new()
        .percent_encode_noop()
        .part("video", part)
}

/// POST `data` as the `video` field for `id`.
pub async fn upload(addr: SocketAddr, id: &str, data: &[u8]) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{addr}/media/{id}/"))
        .multipart(video_form("clip.mp4", data))
        .send()
        .await
        .expect("upload request failed")
}

pub async fn delete(addr: SocketAddr, id: &str) -> reqwest::Response {
    reqwest::Client::new()
        .delete(format!("http://{addr}/media/{id}/"))
        .send()
        .await
        .expect("delete request failed")
}

pub async fn get(addr: SocketAddr, path: &str) -> reqwest::Response {
    reqwest::get(format!("http://{addr}{path}"))
        .await
        .expect("request failed")
}
