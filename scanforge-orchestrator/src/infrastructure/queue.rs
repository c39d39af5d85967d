//! Generic dependency-aware job queue
//!
//! An in-process, multi-worker asynchronous job queue. Ordering between
//! jobs is governed only by explicit dependency edges plus a best-effort
//! FIFO/at-front hint, never by submission time. A job whose dependencies
//! have not all reached a terminal state is *deferred* and does not occupy
//! a worker; it is promoted to the ready queue when the last dependency
//! finishes. Results are cached with a TTL so dependent jobs can read them.
//!
//! The queue is an explicitly constructed client passed by reference into
//! the scheduler components: constructed once per process, torn down via
//! [`JobQueue::shutdown`], no global state.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Identifier of a queued job
pub type JobId = Uuid;

/// State of a job in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Ready to be picked by a worker
    Queued,
    /// Waiting for dependency jobs to finish
    Deferred,
    /// Currently handled by a worker
    Running,
    /// Finished; result cached until the TTL expires
    Finished,
    /// Cancelled before completion
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

/// Consumer executing jobs of a queue
#[async_trait]
pub trait JobHandler<M, R>: Send + Sync {
    async fn handle(&self, job_id: JobId, message: M, cancel: CancellationToken) -> R;
}

/// Continuation invoked by the worker after a successful run
#[async_trait]
pub trait JobCallback<M, R>: Send + Sync {
    async fn on_success(&self, job_id: JobId, message: &M, result: &R);
}

/// A deferred job replaced during dependency rewiring
#[derive(Debug, Clone)]
pub struct RewiredJob<M> {
    pub old_id: JobId,
    pub new_id: JobId,
    pub message: M,
}

struct QueueJob<M, R> {
    message: M,
    depends_on: Vec<JobId>,
    state: JobState,
    at_front: bool,
    with_callback: bool,
    cancel: CancellationToken,
    result: Option<(Instant, R)>,
}

struct QueueState<M, R> {
    jobs: HashMap<JobId, QueueJob<M, R>>,
    ready: VecDeque<JobId>,
}

impl<M, R> QueueState<M, R> {
    /// A dependency that is missing from the registry counts as satisfied:
    /// blocking forever on a deleted job id would wedge the pipeline.
    fn dependencies_satisfied(&self, depends_on: &[JobId]) -> bool {
        depends_on
            .iter()
            .all(|dep| self.jobs.get(dep).map_or(true, |job| job.state.is_terminal()))
    }

    fn push_ready(&mut self, job_id: JobId, at_front: bool) {
        if at_front {
            self.ready.push_front(job_id);
        } else {
            self.ready.push_back(job_id);
        }
    }

    /// Promote every deferred job whose dependencies are now all terminal.
    /// Returns the number of jobs made ready.
    fn promote_deferred(&mut self) -> usize {
        let promotable: Vec<(JobId, bool)> = self
            .jobs
            .iter()
            .filter(|(_, job)| {
                job.state == JobState::Deferred && self.dependencies_satisfied(&job.depends_on)
            })
            .map(|(id, job)| (*id, job.at_front))
            .collect();
        let count = promotable.len();
        for (job_id, at_front) in promotable {
            if let Some(job) = self.jobs.get_mut(&job_id) {
                job.state = JobState::Queued;
            }
            self.push_ready(job_id, at_front);
        }
        count
    }
}

/// Dependency-aware job queue with a TTL-bound result cache
pub struct JobQueue<M, R> {
    name: String,
    state: Mutex<QueueState<M, R>>,
    notify: Notify,
    result_ttl: Duration,
    shutdown: CancellationToken,
}

impl<M, R> JobQueue<M, R>
where
    M: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    pub fn new(name: impl Into<String>, result_ttl: Duration) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                jobs: HashMap::new(),
                ready: VecDeque::new(),
            }),
            notify: Notify::new(),
            result_ttl,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the worker pools consuming this queue.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.notify.notify_waiters();
    }

    /// Enqueue a job under a fresh id. It becomes deferred when any
    /// dependency has not yet reached a terminal state, ready otherwise.
    pub async fn enqueue(
        &self,
        message: M,
        dependencies: Vec<JobId>,
        at_front: bool,
        with_callback: bool,
    ) -> JobId {
        let job_id = Uuid::new_v4();
        self.enqueue_with_id(job_id, message, dependencies, at_front, with_callback)
            .await;
        job_id
    }

    /// Enqueue a job under a caller-chosen id, so the id can be persisted on
    /// the owning record before the job becomes visible to workers.
    pub async fn enqueue_with_id(
        &self,
        job_id: JobId,
        message: M,
        dependencies: Vec<JobId>,
        at_front: bool,
        with_callback: bool,
    ) {
        let mut state = self.state.lock().await;
        let ready = state.dependencies_satisfied(&dependencies);
        state.jobs.insert(
            job_id,
            QueueJob {
                message,
                depends_on: dependencies,
                state: if ready {
                    JobState::Queued
                } else {
                    JobState::Deferred
                },
                at_front,
                with_callback,
                cancel: CancellationToken::new(),
                result: None,
            },
        );
        if ready {
            state.push_ready(job_id, at_front);
            drop(state);
            self.notify.notify_one();
        }
        debug!(queue = %self.name, job_id = %job_id, ready, "Job enqueued");
    }

    /// Spawn a worker pool consuming this queue, in the same shape as a
    /// background worker pool over a broker: a semaphore bounds concurrency
    /// and each job runs in its own task.
    pub fn spawn_worker_pool(
        self: Arc<Self>,
        handler: Arc<dyn JobHandler<M, R>>,
        callback: Option<Arc<dyn JobCallback<M, R>>>,
        concurrency: usize,
    ) -> tokio::task::JoinHandle<()> {
        let queue = self;
        tokio::spawn(async move {
            let concurrency = concurrency.max(1);
            let semaphore = Arc::new(Semaphore::new(concurrency));
            info!(queue = %queue.name, concurrency, "Worker pool started");

            loop {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(err) => {
                        error!(queue = %queue.name, error = %err, "Failed to acquire worker permit");
                        break;
                    }
                };
                if queue.shutdown.is_cancelled() {
                    break;
                }

                match queue.next_ready().await {
                    Some((job_id, message, cancel)) => {
                        let queue = Arc::clone(&queue);
                        let handler = Arc::clone(&handler);
                        let callback = callback.clone();
                        tokio::spawn(async move {
                            let result = handler.handle(job_id, message, cancel).await;
                            queue.finish(job_id, result, callback).await;
                            drop(permit);
                        });
                    }
                    None => {
                        drop(permit);
                        tokio::select! {
                            _ = queue.shutdown.cancelled() => break,
                            // Bounded wait so promotions never go unnoticed.
                            _ = tokio::time::timeout(
                                Duration::from_millis(500),
                                queue.notify.notified(),
                            ) => {}
                        }
                    }
                }
            }

            warn!(queue = %queue.name, "Worker pool exiting");
        })
    }

    async fn next_ready(&self) -> Option<(JobId, M, CancellationToken)> {
        let mut state = self.state.lock().await;
        while let Some(job_id) = state.ready.pop_front() {
            if let Some(job) = state.jobs.get_mut(&job_id) {
                if job.state == JobState::Queued {
                    job.state = JobState::Running;
                    return Some((job_id, job.message.clone(), job.cancel.clone()));
                }
            }
        }
        None
    }

    async fn finish(
        &self,
        job_id: JobId,
        result: R,
        callback: Option<Arc<dyn JobCallback<M, R>>>,
    ) {
        let callback_message = {
            let mut state = self.state.lock().await;
            let Some(job) = state.jobs.get_mut(&job_id) else {
                warn!(queue = %self.name, job_id = %job_id, "Finished job missing from registry");
                return;
            };
            // A stop signal may have landed mid-run; the job still caches
            // its (possibly empty) result so dependents are never blocked.
            job.state = JobState::Finished;
            job.result = Some((Instant::now(), result.clone()));
            let callback_message = job.with_callback.then(|| job.message.clone());
            let promoted = state.promote_deferred();
            for _ in 0..promoted {
                self.notify.notify_one();
            }
            callback_message
        };
        debug!(queue = %self.name, job_id = %job_id, "Job finished");
        if let (Some(message), Some(callback)) = (callback_message, callback) {
            callback.on_success(job_id, &message, &result).await;
        }
    }

    /// Cached result of a finished job, unless the TTL expired.
    pub async fn fetch_result(&self, job_id: JobId) -> Option<R> {
        let state = self.state.lock().await;
        let job = state.jobs.get(&job_id)?;
        let (stored_at, result) = job.result.as_ref()?;
        if stored_at.elapsed() > self.result_ttl {
            return None;
        }
        Some(result.clone())
    }

    pub async fn job_state(&self, job_id: JobId) -> Option<JobState> {
        self.state.lock().await.jobs.get(&job_id).map(|job| job.state)
    }

    pub async fn job_message(&self, job_id: JobId) -> Option<M> {
        self.state
            .lock()
            .await
            .jobs
            .get(&job_id)
            .map(|job| job.message.clone())
    }

    pub async fn job_dependencies(&self, job_id: JobId) -> Vec<JobId> {
        self.state
            .lock()
            .await
            .jobs
            .get(&job_id)
            .map(|job| job.depends_on.clone())
            .unwrap_or_default()
    }

    /// Ids of every job currently waiting on dependencies.
    pub async fn deferred_job_ids(&self) -> Vec<JobId> {
        self.state
            .lock()
            .await
            .jobs
            .iter()
            .filter(|(_, job)| job.state == JobState::Deferred)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Cancel a job that has not started yet. Dependents of a cancelled job
    /// are promoted: cancelled is a terminal state.
    pub async fn cancel_job(&self, job_id: JobId) -> bool {
        let cancelled = {
            let mut state = self.state.lock().await;
            let Some(job) = state.jobs.get_mut(&job_id) else {
                return false;
            };
            match job.state {
                JobState::Queued | JobState::Deferred => {
                    job.state = JobState::Cancelled;
                    state.ready.retain(|id| *id != job_id);
                    let promoted = state.promote_deferred();
                    for _ in 0..promoted {
                        self.notify.notify_one();
                    }
                    true
                }
                _ => false,
            }
        };
        if cancelled {
            info!(queue = %self.name, job_id = %job_id, "Job has been cancelled");
        }
        cancelled
    }

    /// Send the cooperative stop signal to a running job.
    pub async fn stop_job(&self, job_id: JobId) -> bool {
        let state = self.state.lock().await;
        let Some(job) = state.jobs.get(&job_id) else {
            return false;
        };
        if job.state == JobState::Running {
            info!(queue = %self.name, job_id = %job_id, "Stop signal sent to running job");
            job.cancel.cancel();
            true
        } else {
            false
        }
    }

    /// Remove a job from the registry entirely.
    pub async fn delete_job(&self, job_id: JobId) -> bool {
        let mut state = self.state.lock().await;
        state.ready.retain(|id| *id != job_id);
        let removed = state.jobs.remove(&job_id).is_some();
        if removed {
            info!(queue = %self.name, job_id = %job_id, "Job has been deleted");
            let promoted = state.promote_deferred();
            for _ in 0..promoted {
                self.notify.notify_one();
            }
        }
        removed
    }

    /// Rewrite the dependency edges of every deferred job waiting on
    /// `parent`: each is replaced by a fresh job whose dependency set is the
    /// original set plus `new_jobs`, with its message passed through
    /// `remap`. The replacement is enqueued before the old job is dropped,
    /// and the whole operation runs under one registry lock, so a
    /// half-rewired job is never observable. Jobs depending on a replaced
    /// job are repointed at its replacement so transitive chains stay
    /// intact. Idempotent under concurrent fan-outs: dependency ids are
    /// deduplicated and already-rewired jobs are simply rewired again.
    pub async fn rewire_dependents(
        &self,
        parent: JobId,
        new_jobs: &[JobId],
        remap: impl Fn(&M) -> M,
    ) -> Vec<RewiredJob<M>> {
        let mut rewired = Vec::new();
        let mut state = self.state.lock().await;

        let waiting: Vec<JobId> = state
            .jobs
            .iter()
            .filter(|(_, job)| {
                job.state == JobState::Deferred && job.depends_on.contains(&parent)
            })
            .map(|(id, _)| *id)
            .collect();

        for old_id in waiting {
            let Some(old_job) = state.jobs.get(&old_id) else {
                continue;
            };
            let mut dependencies = old_job.depends_on.clone();
            for new_job in new_jobs {
                if !dependencies.contains(new_job) {
                    dependencies.push(*new_job);
                }
            }
            let message = remap(&old_job.message);
            let at_front = old_job.at_front;
            let with_callback = old_job.with_callback;

            // Enqueue the replacement first, then drop the old job: a crash
            // in between leaves a duplicate deferred job, never a lost
            // dependency edge.
            let new_id = Uuid::new_v4();
            state.jobs.insert(
                new_id,
                QueueJob {
                    message: message.clone(),
                    depends_on: dependencies,
                    state: JobState::Deferred,
                    at_front,
                    with_callback,
                    cancel: CancellationToken::new(),
                    result: None,
                },
            );
            state.jobs.remove(&old_id);

            // Repoint transitive dependents at the replacement.
            for job in state.jobs.values_mut() {
                for dependency in job.depends_on.iter_mut() {
                    if *dependency == old_id {
                        *dependency = new_id;
                    }
                }
            }

            info!(
                queue = %self.name,
                old_job_id = %old_id,
                new_job_id = %new_id,
                "Deferred job re-enqueued with extended dependencies"
            );
            rewired.push(RewiredJob {
                old_id,
                new_id,
                message,
            });
        }
        rewired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler<u32, u32> for Recorder {
        async fn handle(&self, _job_id: JobId, message: u32, _cancel: CancellationToken) -> u32 {
            self.runs.fetch_add(1, Ordering::SeqCst);
            message * 2
        }
    }

    #[tokio::test]
    async fn dependents_wait_for_dependencies() {
        let queue = Arc::new(JobQueue::<u32, u32>::new("test", Duration::from_secs(60)));
        let first = queue.enqueue(1, vec![], false, false).await;
        let second = queue.enqueue(2, vec![first], false, false).await;

        assert_eq!(queue.job_state(second).await, Some(JobState::Deferred));
        assert_eq!(queue.deferred_job_ids().await, vec![second]);

        let handler = Arc::new(Recorder {
            runs: AtomicUsize::new(0),
        });
        Arc::clone(&queue).spawn_worker_pool(handler.clone(), None, 2);

        for _ in 0..100 {
            if queue.job_state(second).await == Some(JobState::Finished) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(queue.job_state(first).await, Some(JobState::Finished));
        assert_eq!(queue.job_state(second).await, Some(JobState::Finished));
        assert_eq!(queue.fetch_result(second).await, Some(4));
        assert_eq!(handler.runs.load(Ordering::SeqCst), 2);
        queue.shutdown();
    }

    #[tokio::test]
    async fn cancelled_dependency_unblocks_dependents() {
        let queue = Arc::new(JobQueue::<u32, u32>::new("test", Duration::from_secs(60)));
        let first = queue.enqueue(1, vec![], false, false).await;
        let second = queue.enqueue(2, vec![first], false, false).await;

        assert!(queue.cancel_job(first).await);
        assert_eq!(queue.job_state(second).await, Some(JobState::Queued));
    }

    #[tokio::test]
    async fn rewire_extends_dependencies_and_repoints_chains() {
        let queue = Arc::new(JobQueue::<u32, u32>::new("test", Duration::from_secs(60)));
        let parent = queue.enqueue(1, vec![], false, false).await;
        let waiting = queue.enqueue(2, vec![parent], false, false).await;
        let downstream = queue.enqueue(3, vec![waiting], false, false).await;
        let sibling = queue.enqueue(4, vec![], false, false).await;

        let rewired = queue
            .rewire_dependents(parent, &[sibling], |message| *message)
            .await;
        assert_eq!(rewired.len(), 1);
        let replacement = rewired[0].new_id;

        assert_eq!(queue.job_state(rewired[0].old_id).await, None);
        let deps = queue.job_dependencies(replacement).await;
        assert!(deps.contains(&parent) && deps.contains(&sibling));
        // The downstream job must now wait on the replacement, not the
        // deleted original.
        assert_eq!(queue.job_dependencies(downstream).await, vec![replacement]);
    }
}
