//! Fans a run configuration out into concurrent capture jobs
//!
//! One tokio task per (scene × width) pair, all funneled through the
//! bounded session pool. Jobs race to completion; results are collected
//! in submission order and the completed counter is a plain atomic
//! increment, safe under any interleaving. The first capture error
//! becomes the run's terminal error; in-flight siblings finish but their
//! results are discarded.

use crate::{
    capture, digest, BlobStore, CaptureError, CaptureRequest, CdpSessionFactory, CdpSessionPool,
    EngineConfig, Metrics, RunConfiguration, RunProgress, RunRecord, RunState, SceneResult,
    SessionPool,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Monotonic completed/total counters shared between a run and anything
/// polling its progress
#[derive(Default)]
pub struct ProgressTracker {
    total: AtomicUsize,
    completed: AtomicUsize,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }
}

pub struct RunOrchestrator {
    engine: EngineConfig,
    pool: Arc<CdpSessionPool>,
    blob_store: Arc<dyn BlobStore>,
    metrics: Arc<Metrics>,
}

impl RunOrchestrator {
    pub fn new(engine: EngineConfig, blob_store: Arc<dyn BlobStore>) -> Self {
        Self::with_metrics(engine, blob_store, Arc::new(Metrics::new()))
    }

    pub fn with_metrics(
        engine: EngineConfig,
        blob_store: Arc<dyn BlobStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let factory = CdpSessionFactory::new(&engine);
        let pool = SessionPool::new(factory, engine.max_sessions);
        Self {
            engine,
            pool,
            blob_store,
            metrics,
        }
    }

    pub fn pool(&self) -> &Arc<CdpSessionPool> {
        &self.pool
    }

    /// Expand a configuration into capture requests, scene-major then
    /// width, defining the run's submission order and job count.
    pub fn expand_requests(
        configuration: &RunConfiguration,
        engine: &EngineConfig,
    ) -> Vec<CaptureRequest> {
        let mut requests = Vec::new();
        for scene in &configuration.scenes {
            for &width in &configuration.widths {
                requests.push(CaptureRequest {
                    scene: scene.clone(),
                    url: format!("{}{}", configuration.origin, scene.path),
                    width,
                    header_height: configuration.header,
                    mask: configuration.effective_mask(scene),
                    headless: engine.headless,
                });
            }
        }
        requests
    }

    /// Execute a full run.
    ///
    /// Returns `Err` only for an invalid configuration; capture failures
    /// surface inside the returned record as `state: done` plus an error
    /// message, with partial counters retained and results discarded.
    pub async fn run(&self, configuration: RunConfiguration) -> Result<RunRecord, CaptureError> {
        self.run_with_progress(configuration, Arc::new(ProgressTracker::new()))
            .await
    }

    pub async fn run_with_progress(
        &self,
        configuration: RunConfiguration,
        tracker: Arc<ProgressTracker>,
    ) -> Result<RunRecord, CaptureError> {
        configuration.validate()?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let requests = Self::expand_requests(&configuration, &self.engine);
        let total = requests.len();
        tracker.set_total(total);

        info!("Run {} started: {} capture job(s)", run_id, total);

        let tasks: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let pool = self.pool.clone();
                let blob_store = self.blob_store.clone();
                let engine = self.engine.clone();
                let metrics = self.metrics.clone();
                let tracker = tracker.clone();

                tokio::spawn(async move {
                    let started = Instant::now();
                    let session = pool.acquire().await?;
                    let captured = capture::capture_scene(&session, &request, &engine).await;
                    pool.release(session).await;

                    let image = match captured {
                        Ok(image) => {
                            metrics.record_capture(started.elapsed(), true);
                            image
                        }
                        Err(e) => {
                            metrics.record_capture(started.elapsed(), false);
                            return Err(e);
                        }
                    };

                    let uploaded = digest::store_if_new(blob_store.as_ref(), &image).await?;
                    metrics.record_store(uploaded);
                    tracker.record_completion();

                    debug!(
                        "Captured \"{}\" -> {} ({}x{})",
                        request.result_title(),
                        image.digest,
                        image.width,
                        image.height
                    );

                    Ok(SceneResult {
                        title: request.result_title(),
                        image: image.digest,
                        width: image.width,
                        height: image.height,
                    })
                })
            })
            .collect();

        let joined = futures::future::join_all(tasks).await;

        let mut results = Vec::with_capacity(total);
        let mut first_error: Option<String> = None;
        for outcome in joined {
            match outcome {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e.to_string());
                    }
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(format!("capture task panicked: {e}"));
                    }
                }
            }
        }

        let completed = tracker.completed();
        let record = match first_error {
            Some(message) => {
                error!("Run {} failed: {}", run_id, message);
                RunRecord {
                    id: run_id,
                    // Results from jobs that finished before the failure are
                    // discarded once the run is marked failed.
                    results: Vec::new(),
                    progress: RunProgress {
                        state: RunState::Done,
                        completed,
                        total,
                        error: Some(message),
                    },
                }
            }
            None => {
                info!("Run {} finished: {}/{} captures", run_id, completed, total);
                RunRecord {
                    id: run_id,
                    results,
                    progress: RunProgress {
                        state: RunState::Done,
                        completed,
                        total,
                        error: None,
                    },
                }
            }
        };

        Ok(record)
    }
}
