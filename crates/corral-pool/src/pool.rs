// SPDX-FileCopyrightText: 2026 Corral Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission-control execution pool.
//!
//! Two levels: each project gets a FIFO queue drained by a single worker
//! task (per-project concurrency 1), and every worker must hold a permit on
//! a global semaphore before running a job (global concurrency
//! `max_concurrent`). Admission is refused under memory pressure before any
//! queue state is touched, then on per-project depth. Empty queues are
//! evicted after an idle period.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use corral_config::model::PoolConfig;
use corral_core::CorralError;

use crate::memory::current_rss_mb;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Future resolving to a pooled job's output. Resolves to `Err` if the pool
/// shut down before the job started.
pub type PoolResult<T> = oneshot::Receiver<T>;

struct ProjectQueue {
    tx: mpsc::UnboundedSender<Job>,
    pending: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    deadline: Arc<Mutex<Instant>>,
    worker: JoinHandle<()>,
}

/// The admission-control pool. Cheap to clone via `Arc` at call sites; the
/// relay holds exactly one.
pub struct AgentPool {
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    queues: Arc<Mutex<HashMap<String, ProjectQueue>>>,
    global_active: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl AgentPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            queues: Arc::new(Mutex::new(HashMap::new())),
            global_active: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// Submit a job for a project. Returns a future for the job's output and
    /// the position it was queued at (0 = next to run).
    ///
    /// Rejection order: shutdown, memory pressure, per-project queue depth.
    /// The memory probe runs before any queue state is touched.
    pub fn enqueue<F, T>(
        &self,
        project: &str,
        fut: F,
    ) -> Result<(PoolResult<T>, usize), CorralError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.shutdown.is_cancelled() {
            return Err(CorralError::ShuttingDown);
        }

        if let Some(rss_mb) = current_rss_mb()
            && rss_mb > self.config.max_rss_mb
        {
            warn!(
                project = %project,
                rss_mb,
                limit_mb = self.config.max_rss_mb,
                "rejecting enqueue under memory pressure"
            );
            return Err(CorralError::MemoryPressure {
                rss_mb,
                limit_mb: self.config.max_rss_mb,
            });
        }

        let mut queues = self
            .queues
            .lock()
            .map_err(|_| CorralError::Internal("pool queue map poisoned".to_string()))?;

        if !queues.contains_key(project) {
            let queue = self.spawn_worker(project);
            queues.insert(project.to_string(), queue);
        }
        let queue = queues
            .get(project)
            .ok_or_else(|| CorralError::Internal("pool queue vanished".to_string()))?;

        let depth = queue.pending.load(Ordering::SeqCst) + queue.active.load(Ordering::SeqCst);
        if depth >= self.config.max_queue_depth {
            return Err(CorralError::QueueFull {
                project: project.to_string(),
                depth,
            });
        }

        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let out = fut.await;
            // Receiver may have gone away; nothing to do about it.
            let _ = result_tx.send(out);
        });

        queue.pending.fetch_add(1, Ordering::SeqCst);
        if queue.tx.send(job).is_err() {
            queue.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(CorralError::ShuttingDown);
        }
        if let Ok(mut deadline) = queue.deadline.lock() {
            *deadline = Instant::now() + self.idle_period();
        }

        debug!(project = %project, position = depth, "job enqueued");
        Ok((result_rx, depth))
    }

    fn idle_period(&self) -> Duration {
        Duration::from_secs(self.config.idle_evict_minutes * 60)
    }

    fn spawn_worker(&self, project: &str) -> ProjectQueue {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let pending = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let deadline = Arc::new(Mutex::new(Instant::now() + self.idle_period()));

        let ctx = WorkerCtx {
            project: project.to_string(),
            pending: pending.clone(),
            active: active.clone(),
            deadline: deadline.clone(),
            global_active: self.global_active.clone(),
            semaphore: self.semaphore.clone(),
            queues: self.queues.clone(),
            shutdown: self.shutdown.clone(),
            idle_period: self.idle_period(),
        };
        let worker = tokio::spawn(async move {
            run_worker(ctx, &mut rx).await;
        });

        ProjectQueue {
            tx,
            pending,
            active,
            deadline,
            worker,
        }
    }

    /// `pending + active` for one project; 0 if no queue exists.
    pub fn queue_depth(&self, project: &str) -> usize {
        self.queues
            .lock()
            .ok()
            .and_then(|queues| {
                queues.get(project).map(|q| {
                    q.pending.load(Ordering::SeqCst) + q.active.load(Ordering::SeqCst)
                })
            })
            .unwrap_or(0)
    }

    /// Jobs currently executing across all projects.
    pub fn active_count(&self) -> usize {
        self.global_active.load(Ordering::SeqCst)
    }

    /// Number of live project queues.
    pub fn project_count(&self) -> usize {
        self.queues.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Stop accepting work, drop unstarted backlog, and wait for in-flight
    /// jobs to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let workers: Vec<JoinHandle<()>> = match self.queues.lock() {
            Ok(mut queues) => queues.drain().map(|(_, q)| q.worker).collect(),
            Err(_) => Vec::new(),
        };
        for worker in workers {
            let _ = worker.await;
        }
        info!("pool shut down");
    }
}

struct WorkerCtx {
    project: String,
    pending: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    deadline: Arc<Mutex<Instant>>,
    global_active: Arc<AtomicUsize>,
    semaphore: Arc<Semaphore>,
    queues: Arc<Mutex<HashMap<String, ProjectQueue>>>,
    shutdown: CancellationToken,
    idle_period: Duration,
}

async fn run_worker(ctx: WorkerCtx, rx: &mut mpsc::UnboundedReceiver<Job>) {
    loop {
        let wake_at = ctx
            .deadline
            .lock()
            .map(|d| *d)
            .unwrap_or_else(|_| Instant::now() + ctx.idle_period);

        let job = tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
            _ = tokio::time::sleep_until(wake_at) => {
                if try_evict(&ctx) {
                    break;
                }
                continue;
            }
        };

        // Wait for a global slot; an unstarted job is dropped on shutdown.
        let permit = tokio::select! {
            _ = ctx.shutdown.cancelled() => {
                ctx.pending.fetch_sub(1, Ordering::SeqCst);
                break;
            }
            permit = ctx.semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        ctx.pending.fetch_sub(1, Ordering::SeqCst);
        ctx.active.fetch_add(1, Ordering::SeqCst);
        ctx.global_active.fetch_add(1, Ordering::SeqCst);

        // In-flight jobs always run to completion; cancellation of the run
        // itself travels inside the job via its own token.
        job.await;

        ctx.active.fetch_sub(1, Ordering::SeqCst);
        ctx.global_active.fetch_sub(1, Ordering::SeqCst);
        drop(permit);

        if let Ok(mut deadline) = ctx.deadline.lock() {
            *deadline = Instant::now() + ctx.idle_period;
        }
    }
    debug!(project = %ctx.project, "pool worker exited");
}

/// Remove this project's queue if it is fully idle. Returns whether the
/// worker should exit. Runs under the map lock so no enqueue can slip a job
/// into a queue being removed.
fn try_evict(ctx: &WorkerCtx) -> bool {
    let Ok(mut queues) = ctx.queues.lock() else {
        return false;
    };
    if ctx.pending.load(Ordering::SeqCst) == 0 && ctx.active.load(Ordering::SeqCst) == 0 {
        queues.remove(&ctx.project);
        info!(project = %ctx.project, "idle project queue evicted");
        true
    } else {
        if let Ok(mut deadline) = ctx.deadline.lock() {
            *deadline = Instant::now() + ctx.idle_period;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PoolConfig {
        PoolConfig {
            max_concurrent: 2,
            max_queue_depth: 3,
            max_rss_mb: u64::MAX,
            idle_evict_minutes: 30,
        }
    }

    #[tokio::test]
    async fn jobs_run_and_return_output() {
        let pool = AgentPool::new(test_config());
        let (rx, pos) = pool.enqueue("demo", async { 41 + 1 }).unwrap();
        assert_eq!(pos, 0);
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn per_project_jobs_run_in_order() {
        let pool = AgentPool::new(test_config());
        let (order_tx, mut order_rx) = mpsc::unbounded_channel();

        let tx1 = order_tx.clone();
        let (rx1, _) = pool
            .enqueue("demo", async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let _ = tx1.send(1);
            })
            .unwrap();
        let tx2 = order_tx.clone();
        let (rx2, pos2) = pool
            .enqueue("demo", async move {
                let _ = tx2.send(2);
            })
            .unwrap();
        assert_eq!(pos2, 1);

        rx1.await.unwrap();
        rx2.await.unwrap();
        assert_eq!(order_rx.recv().await, Some(1));
        assert_eq!(order_rx.recv().await, Some(2));
    }

    #[tokio::test]
    async fn queue_depth_limit_rejects() {
        let config = PoolConfig {
            max_concurrent: 1,
            max_queue_depth: 2,
            ..test_config()
        };
        let pool = AgentPool::new(config);

        let (gate_tx, gate_rx) = oneshot::channel::<()>();
        let (rx1, _) = pool
            .enqueue("demo", async move {
                let _ = gate_rx.await;
            })
            .unwrap();
        let (_rx2, _) = pool.enqueue("demo", async {}).unwrap();

        let rejected = pool.enqueue("demo", async {});
        assert!(matches!(
            rejected,
            Err(CorralError::QueueFull { depth: 2, .. })
        ));

        // Another project is unaffected by the full queue.
        let (rx_other, _) = pool.enqueue("other", async { 7 }).unwrap();
        assert_eq!(rx_other.await.unwrap(), 7);

        let _ = gate_tx.send(());
        rx1.await.unwrap();
    }

    #[tokio::test]
    async fn memory_pressure_rejects_before_queueing() {
        let config = PoolConfig {
            max_rss_mb: 0,
            ..test_config()
        };
        let pool = AgentPool::new(config);

        let rejected = pool.enqueue("demo", async {});
        assert!(matches!(
            rejected,
            Err(CorralError::MemoryPressure { limit_mb: 0, .. })
        ));
        // No queue was created for the rejected project.
        assert_eq!(pool.project_count(), 0);
    }

    #[tokio::test]
    async fn global_limit_bounds_concurrency() {
        let config = PoolConfig {
            max_concurrent: 1,
            max_queue_depth: 5,
            ..test_config()
        };
        let pool = AgentPool::new(config);

        let (gate_tx, gate_rx) = oneshot::channel::<()>();
        let (rx_a, _) = pool
            .enqueue("a", async move {
                let _ = gate_rx.await;
            })
            .unwrap();
        let (rx_b, _) = pool.enqueue("b", async { 5 }).unwrap();

        // Give the workers a chance to start.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.active_count(), 1);

        let _ = gate_tx.send(());
        rx_a.await.unwrap();
        assert_eq!(rx_b.await.unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_queue_is_evicted() {
        let pool = AgentPool::new(test_config());
        let (rx, _) = pool.enqueue("demo", async { 1 }).unwrap();
        rx.await.unwrap();
        assert_eq!(pool.project_count(), 1);

        // Past the idle deadline the empty queue disappears.
        tokio::time::sleep(Duration::from_secs(31 * 60)).await;
        for _ in 0..50 {
            if pool.project_count() == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(pool.project_count(), 0);

        // A new enqueue after eviction recreates the queue.
        let (rx, pos) = pool.enqueue("demo", async { 2 }).unwrap();
        assert_eq!(pos, 0);
        assert_eq!(rx.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_work_and_waits_for_in_flight() {
        let pool = AgentPool::new(test_config());
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let (rx, _) = pool
            .enqueue("demo", async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                let _ = done_tx.send(());
            })
            .unwrap();
        // Let the job start before shutting down.
        tokio::time::sleep(Duration::from_millis(10)).await;

        pool.shutdown().await;
        assert!(matches!(
            pool.enqueue("demo", async {}),
            Err(CorralError::ShuttingDown)
        ));
        // The in-flight job finished rather than being dropped.
        done_rx.await.unwrap();
        rx.await.unwrap();
    }
}
