//! Background HLS transcoding.
//!
//! [`TranscodeScheduler`] runs at most one transcode per media ID. Scheduling
//! a new job cancels the previous one; cancellation drops the transcoder
//! future, which kills the ffmpeg child. A job only publishes its output,
//! and only records its outcome, while it is still the current generation
//! for its ID.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use hf_av::Transcoder;
use hf_core::events::{EventBus, EventPayload};
use hf_core::{MediaId, MediaStatus};
use hf_store::{MediaStore, StoredSource};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Debug)]
struct Job {
    generation: u64,
    source: StoredSource,
    cancel: CancellationToken,
}

enum Outcome {
    Published { segments: usize },
    Cancelled,
    Failed(hf_core::Error),
}

pub struct TranscodeScheduler {
    store: Arc<MediaStore>,
    transcoder: Arc<dyn Transcoder>,
    event_bus: Arc<EventBus>,
    jobs: DashMap<MediaId, Job>,
    statuses: DashMap<MediaId, MediaStatus>,
    next_generation: AtomicU64,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl TranscodeScheduler {
    pub fn new(
        store: Arc<MediaStore>,
        transcoder: Arc<dyn Transcoder>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            transcoder,
            event_bus,
            jobs: DashMap::new(),
            statuses: DashMap::new(),
            next_generation: AtomicU64::new(0),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Queue a transcode of `source`, superseding any job for `id`.
    ///
    /// Returns the job's generation.
    pub fn schedule(self: &Arc<Self>, id: MediaId, source: StoredSource) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = self.shutdown.child_token();

        let previous = self.jobs.insert(
            id,
            Job {
                generation,
                source: source.clone(),
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            tracing::debug!(media_id = %id, generation = previous.generation, "Superseding transcode");
            previous.cancel.cancel();
        }

        self.statuses
            .insert(id, MediaStatus::pending(source.file_name.clone()));
        self.event_bus
            .broadcast(EventPayload::TranscodeQueued { media_id: id });
        tracing::info!(media_id = %id, generation, "Transcode queued");

        let this = Arc::clone(self);
        self.tracker.spawn(async move {
            this.run_job(id, generation, source.path, cancel).await;
        });

        generation
    }

    /// Cancel the in-flight job for `id`, if any, and return the source it
    /// was working on so the caller can reschedule it. The last known status
    /// is kept.
    pub fn cancel(&self, id: MediaId) -> Option<StoredSource> {
        let (_, job) = self.jobs.remove(&id)?;
        job.cancel.cancel();
        tracing::info!(media_id = %id, generation = job.generation, "Transcode cancelled");
        Some(job.source)
    }

    /// Cancel any job for `id` and drop its status.
    pub fn forget(&self, id: MediaId) {
        self.cancel(id);
        self.statuses.remove(&id);
    }

    pub fn status(&self, id: MediaId) -> Option<MediaStatus> {
        self.statuses.get(&id).map(|s| s.clone())
    }

    /// Whether a job for `id` is queued or running.
    pub fn is_active(&self, id: MediaId) -> bool {
        self.jobs.contains_key(&id)
    }

    pub fn active_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Cancel everything and wait for running jobs to wind down.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("Transcode scheduler stopped");
    }

    async fn run_job(&self, id: MediaId, generation: u64, source: PathBuf, cancel: CancellationToken) {
        let lock = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            lock = self.store.lock(id) => Some(lock),
        };

        let outcome = match lock {
            Some(_) if cancel.is_cancelled() => Outcome::Cancelled,
            Some(_) => self.transcode_locked(id, &source, &cancel).await,
            None => Outcome::Cancelled,
        };
        drop(lock);

        match outcome {
            Outcome::Published { segments } => {
                if self.update_status(id, generation, |s| s.mark_ready()) {
                    tracing::info!(media_id = %id, segments, "Transcode completed");
                }
                self.event_bus
                    .broadcast(EventPayload::TranscodeCompleted { media_id: id, segments });
            }
            Outcome::Failed(e) => {
                tracing::error!(media_id = %id, error = %e, "Transcode failed");
                let message = e.to_string();
                self.update_status(id, generation, |s| s.mark_failed(message.clone()));
                self.event_bus.broadcast(EventPayload::TranscodeFailed {
                    media_id: id,
                    error: message,
                });
            }
            Outcome::Cancelled => {
                tracing::debug!(media_id = %id, generation, "Transcode stopped after cancellation");
                self.event_bus
                    .broadcast(EventPayload::TranscodeCancelled { media_id: id });
            }
        }

        self.jobs.remove_if(&id, |_, job| job.generation == generation);
        self.store.prune_lock(id);
    }

    /// Runs with the item's lock held.
    async fn transcode_locked(
        &self,
        id: MediaId,
        source: &std::path::Path,
        cancel: &CancellationToken,
    ) -> Outcome {
        self.event_bus
            .broadcast(EventPayload::TranscodeStarted { media_id: id });

        let staging = match self.store.prepare_staging(id).await {
            Ok(dir) => dir,
            Err(e) => return Outcome::Failed(e),
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.transcoder.transcode(source, &staging) => Some(result),
        };

        let outcome = match result {
            Some(Ok(manifest)) if !cancel.is_cancelled() => match self.store.publish_staging(id).await {
                Ok(()) => {
                    return Outcome::Published {
                        segments: manifest.segment_count(),
                    }
                }
                Err(e) => Outcome::Failed(e),
            },
            Some(Err(e)) if !cancel.is_cancelled() => Outcome::Failed(e),
            _ => Outcome::Cancelled,
        };

        if let Err(e) = self.store.discard_staging(id).await {
            tracing::warn!(media_id = %id, error = %e, "Failed to discard staging output");
        }
        outcome
    }

    /// Apply `f` to the stored status if `generation` is still the newest
    /// job for `id`. Returns whether it was applied.
    fn update_status(&self, id: MediaId, generation: u64, f: impl FnOnce(&mut MediaStatus)) -> bool {
        let current = self
            .jobs
            .get(&id)
            .is_some_and(|job| job.generation == generation);
        if !current {
            return false;
        }
        match self.statuses.get_mut(&id) {
            Some(mut status) => {
                f(status.value_mut());
                true
            }
            None => false,
        }
    }
}
