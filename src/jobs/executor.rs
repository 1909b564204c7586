use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use repair_types::{EngineError, ErrorKind, Job, JobStatus, JobType};
use tokio::sync::{Notify, RwLock, Semaphore};
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use super::id::generate_job_id;

/// Per-status counts, worker capacity, and available workers (§4.C).
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub max_workers: usize,
    pub available_workers: usize,
}

/// Bounded-concurrency worker pool for build/validate/push jobs (§4.C).
///
/// Mirrors `dag/executor.rs`'s `Arc<Semaphore>` + per-task `tokio::spawn`
/// pattern: each started job holds an owned permit for its lifetime, which
/// is how the pool enforces "max concurrent running jobs == worker count"
/// without an explicit queue.
pub struct JobExecutor {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
    semaphore: Arc<Semaphore>,
    max_workers: usize,
    job_deadline: Duration,
    ttl: Duration,
    shutdown_notify: Arc<Notify>,
    stopped: Arc<AtomicBool>,
    cleanup_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl JobExecutor {
    pub fn new(config: &EngineConfig) -> Arc<Self> {
        let executor = Arc::new(Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            semaphore: Arc::new(Semaphore::new(config.worker_count)),
            max_workers: config.worker_count,
            job_deadline: config.job_deadline(),
            ttl: config.job_ttl(),
            shutdown_notify: Arc::new(Notify::new()),
            stopped: Arc::new(AtomicBool::new(false)),
            cleanup_handle: std::sync::Mutex::new(None),
        });
        executor.spawn_cleanup_task(config.cleanup_tick());
        executor
    }

    fn spawn_cleanup_task(self: &Arc<Self>, tick: Duration) {
        let jobs = self.jobs.clone();
        let ttl = self.ttl;
        let shutdown_notify = self.shutdown_notify.clone();
        let stopped = self.stopped.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if stopped.load(Ordering::SeqCst) {
                            break;
                        }
                        let now = Utc::now();
                        let mut table = jobs.write().await;
                        table.retain(|_, job| {
                            match job.completed_at {
                                Some(completed_at) if job.status.is_terminal() => {
                                    (now - completed_at).to_std().map(|age| age < ttl).unwrap_or(true)
                                }
                                _ => true,
                            }
                        });
                    }
                    _ = shutdown_notify.notified() => break,
                }
            }
        });
        *self.cleanup_handle.lock().expect("cleanup handle mutex poisoned") = Some(handle);
    }

    /// Creates a job record in `Pending` status and returns its id.
    pub async fn create(&self, job_type: JobType, session_id: impl Into<String>) -> String {
        let id = generate_job_id();
        let job = Job::new(id.clone(), job_type, session_id);
        self.jobs.write().await.insert(id.clone(), job);
        id
    }

    /// Queues `task` for execution on a worker. Non-blocking: returns as
    /// soon as the job is spawned, not when it completes.
    pub fn start<F, Fut>(self: &Arc<Self>, id: impl Into<String>, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value, String>> + Send + 'static,
    {
        let id = id.into();
        let executor = self.clone();
        tokio::spawn(async move {
            let permit = match executor.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            if executor.stopped.load(Ordering::SeqCst) {
                let _ = executor
                    .cancel(&id)
                    .await;
                return;
            }

            executor
                .update(&id, |job| {
                    job.status = JobStatus::Running;
                    job.started_at = Some(Utc::now());
                })
                .await
                .ok();

            let result = tokio::time::timeout(executor.job_deadline, task()).await;

            let _permit = permit; // held for the full job lifetime

            executor
                .update(&id, |job| {
                    job.completed_at = Some(Utc::now());
                    match result {
                        Ok(Ok(value)) => {
                            job.status = JobStatus::Completed;
                            job.progress = 1.0;
                            job.result = Some(value);
                        }
                        Ok(Err(message)) => {
                            job.status = JobStatus::Failed;
                            job.error = Some(message);
                        }
                        Err(_) => {
                            job.status = JobStatus::Failed;
                            job.error = Some("job exceeded its execution deadline".to_string());
                        }
                    }
                    job.recompute_duration();
                })
                .await
                .ok();
        });
    }

    /// Applies `mutator` to the job under lock, then recomputes duration if
    /// the status became terminal (§4.C).
    pub async fn update(&self, id: &str, mutator: impl FnOnce(&mut Job)) -> Result<(), EngineError> {
        let mut table = self.jobs.write().await;
        let job = table
            .get_mut(id)
            .ok_or_else(|| EngineError::new(ErrorKind::Validation, "unknown_job", format!("no job with id {id}")))?;
        mutator(job);
        if job.status.is_terminal() {
            job.recompute_duration();
        }
        Ok(())
    }

    /// Returns a deep copy; mutations by callers never leak into the table.
    pub async fn get(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Filters by session id; `None` returns all jobs.
    pub async fn list(&self, session_id: Option<&str>) -> Vec<Job> {
        let table = self.jobs.read().await;
        table
            .values()
            .filter(|job| session_id.map(|s| job.session_id == s).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Idempotent: only pending or running jobs move to cancelled; a
    /// completion timestamp and message are stamped (§4.C).
    pub async fn cancel(&self, id: &str) -> Result<(), EngineError> {
        self.update(id, |job| {
            if !job.status.is_terminal() {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(Utc::now());
                job.last_message = "cancelled".to_string();
            }
        })
        .await
    }

    pub async fn stats(&self) -> JobStats {
        let table = self.jobs.read().await;
        let mut stats = JobStats {
            max_workers: self.max_workers,
            available_workers: self.semaphore.available_permits(),
            ..JobStats::default()
        };
        for job in table.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Cooperative shutdown: publishes a shutdown signal (stopping the
    /// cleanup tick and causing not-yet-started jobs to self-cancel once
    /// they acquire a permit), then cancels every currently pending job.
    /// Running jobs complete naturally (§4.C).
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
        let pending_ids: Vec<String> = {
            let table = self.jobs.read().await;
            table
                .values()
                .filter(|job| job.status == JobStatus::Pending)
                .map(|job| job.id.clone())
                .collect()
        };
        for id in pending_ids {
            let _ = self.cancel(&id).await;
        }
    }
}
