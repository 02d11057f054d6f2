//! Fixed-capacity worker pool.
//!
//! Every job goes to the back of one queue. Workers are spawned lazily, one
//! per free slot, and keep taking jobs from the front of the queue until it
//! is empty, then exit and release their slot. So at most `capacity` jobs run
//! at any instant, and jobs start strictly in submission order.
//!
//! If a worker cannot be spawned, its job stays queued for the workers that
//! are still running. When none are left, the queue is dropped and the
//! submitter gets the spawn error.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::ExecutorError;

type Job = Box<dyn FnOnce() + Send + 'static>;

const DEFAULT_NAME: &str = "bounded-executor";

struct State {
    queue: VecDeque<Job>,
    active: usize,
    shutdown: bool,
    next_worker_id: u64,
}

struct Shared {
    state: Mutex<State>,
    idle: Condvar,
    capacity: usize,
    name: String,
    #[cfg(test)]
    refused_spawns: std::sync::atomic::AtomicUsize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs submitted closures on at most `capacity` threads at once.
///
/// Dropping the executor shuts it down without waiting: queued and running
/// jobs still complete on their worker threads.
pub struct BoundedExecutor {
    shared: Arc<Shared>,
}

impl BoundedExecutor {
    /// Create an executor that runs at most `capacity` jobs concurrently.
    pub fn new(capacity: usize) -> Result<Self, ExecutorError> {
        Self::with_name(capacity, DEFAULT_NAME)
    }

    /// Create an executor whose worker threads are named `{name}-{n}`.
    pub fn with_name(capacity: usize, name: impl Into<String>) -> Result<Self, ExecutorError> {
        if capacity == 0 {
            return Err(ExecutorError::ZeroCapacity);
        }

        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    active: 0,
                    shutdown: false,
                    next_worker_id: 0,
                }),
                idle: Condvar::new(),
                capacity,
                name: name.into(),
                #[cfg(test)]
                refused_spawns: std::sync::atomic::AtomicUsize::new(0),
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Number of jobs currently running.
    pub fn active_count(&self) -> usize {
        self.shared.lock().active
    }

    /// Number of jobs waiting for a free worker.
    pub fn queued_count(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.lock().shutdown
    }

    /// Submit a job.
    ///
    /// Queues it and starts a new worker if a slot is free. Fails with
    /// [`ExecutorError::Shutdown`] once [`shutdown`](Self::shutdown) has been
    /// called, and with [`ExecutorError::Spawn`] if no worker could be started
    /// and none is running to take the job.
    pub fn submit<F>(&self, job: F) -> Result<(), ExecutorError>
    where
        F: FnOnce() + Send + 'static,
    {
        let worker_id = {
            let mut state = self.shared.lock();
            if state.shutdown {
                return Err(ExecutorError::Shutdown);
            }
            state.queue.push_back(Box::new(job));
            if state.active >= self.shared.capacity {
                return Ok(());
            }
            state.active += 1;
            state.next_worker_id += 1;
            state.next_worker_id
        };

        match self.spawn_worker(worker_id) {
            Ok(()) => Ok(()),
            Err(err) => self.release_failed_slot(err),
        }
    }

    fn spawn_worker(&self, worker_id: u64) -> io::Result<()> {
        #[cfg(test)]
        if self
            .shared
            .refused_spawns
            .fetch_update(
                std::sync::atomic::Ordering::SeqCst,
                std::sync::atomic::Ordering::SeqCst,
                |n| n.checked_sub(1),
            )
            .is_ok()
        {
            return Err(io::Error::other("worker spawn refused"));
        }

        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name(format!("{}-{}", self.shared.name, worker_id))
            .spawn(move || run_worker(&shared))
            .map(drop)
    }

    /// Give back the slot reserved for a worker that failed to start.
    fn release_failed_slot(&self, err: io::Error) -> Result<(), ExecutorError> {
        let stranded = {
            let mut state = self.shared.lock();
            state.active -= 1;
            self.shared.idle.notify_all();
            if state.active > 0 {
                tracing::warn!(executor = %self.shared.name, error = %err, "failed to spawn worker, job left for running workers");
                return Ok(());
            }
            std::mem::take(&mut state.queue)
        };

        tracing::error!(
            executor = %self.shared.name,
            dropped = stranded.len(),
            error = %err,
            "failed to spawn worker, dropping queued jobs"
        );
        drop(stranded);
        Err(ExecutorError::Spawn(err))
    }

    /// Stop accepting jobs. Queued and running jobs still complete.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock();
        if !state.shutdown {
            state.shutdown = true;
            tracing::debug!(executor = %self.shared.name, queued = state.queue.len(), "executor shutting down");
        }
        self.shared.idle.notify_all();
    }

    /// Block until the executor is shut down and every job has finished.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if state.shutdown && state.active == 0 && state.queue.is_empty() {
                return true;
            }
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            state = self
                .shared
                .idle
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl Drop for BoundedExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for BoundedExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("BoundedExecutor")
            .field("name", &self.shared.name)
            .field("capacity", &self.shared.capacity)
            .field("active", &state.active)
            .field("queued", &state.queue.len())
            .field("shutdown", &state.shutdown)
            .finish()
    }
}

fn run_worker(shared: &Shared) {
    tracing::trace!(worker = ?thread::current().name(), "worker starting");

    loop {
        let job = {
            let mut state = shared.lock();
            match state.queue.pop_front() {
                Some(job) => job,
                None => {
                    state.active -= 1;
                    shared.idle.notify_all();
                    break;
                }
            }
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            tracing::error!(
                worker = ?thread::current().name(),
                panic = panic_message(payload.as_ref()),
                "job panicked"
            );
        }
    }

    tracing::trace!(worker = ?thread::current().name(), "worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            BoundedExecutor::new(0),
            Err(ExecutorError::ZeroCapacity)
        ));
    }

    #[test]
    fn runs_every_job_exactly_once_within_capacity() {
        let executor = BoundedExecutor::new(3).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let completed = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            let completed = Arc::clone(&completed);
            executor
                .submit(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                    completed.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        executor.shutdown();
        assert!(executor.await_termination(WAIT));
        assert_eq!(completed.load(Ordering::SeqCst), 10);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn queued_jobs_start_in_submission_order() {
        let executor = BoundedExecutor::new(1).unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for id in 0..5 {
            let order = Arc::clone(&order);
            executor
                .submit(move || order.lock().unwrap().push(id))
                .unwrap();
        }

        executor.shutdown();
        assert!(executor.await_termination(WAIT));
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn excess_jobs_wait_in_queue() {
        let executor = BoundedExecutor::new(1).unwrap();
        let (release, gate) = mpsc::channel::<()>();
        let (started, started_rx) = mpsc::channel::<()>();

        executor
            .submit(move || {
                started.send(()).unwrap();
                gate.recv().unwrap();
            })
            .unwrap();
        started_rx.recv_timeout(WAIT).unwrap();

        executor.submit(|| {}).unwrap();
        executor.submit(|| {}).unwrap();

        assert_eq!(executor.active_count(), 1);
        assert_eq!(executor.queued_count(), 2);

        release.send(()).unwrap();
        executor.shutdown();
        assert!(executor.await_termination(WAIT));
        assert_eq!(executor.active_count(), 0);
        assert_eq!(executor.queued_count(), 0);
    }

    #[test]
    fn panicking_job_does_not_stop_the_worker() {
        let executor = BoundedExecutor::new(1).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        executor.submit(|| panic!("job failure")).unwrap();
        let after = Arc::clone(&ran);
        executor
            .submit(move || {
                after.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        executor.shutdown();
        assert!(executor.await_termination(WAIT));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn shutdown_rejects_new_jobs_but_drains_queue() {
        let executor = BoundedExecutor::new(1).unwrap();
        let completed = Arc::new(AtomicUsize::new(0));
        let (release, gate) = mpsc::channel::<()>();

        executor
            .submit(move || {
                gate.recv().unwrap();
            })
            .unwrap();
        for _ in 0..3 {
            let completed = Arc::clone(&completed);
            executor
                .submit(move || {
                    completed.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        executor.shutdown();
        assert!(executor.is_shutdown());
        assert!(matches!(
            executor.submit(|| {}),
            Err(ExecutorError::Shutdown)
        ));

        release.send(()).unwrap();
        assert!(executor.await_termination(WAIT));
        assert_eq!(completed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn await_termination_times_out_while_running() {
        let executor = BoundedExecutor::new(1).unwrap();
        let (release, gate) = mpsc::channel::<()>();
        executor
            .submit(move || {
                gate.recv().unwrap();
            })
            .unwrap();

        executor.shutdown();
        assert!(!executor.await_termination(Duration::from_millis(20)));

        release.send(()).unwrap();
        assert!(executor.await_termination(WAIT));
    }

    fn refuse_next_spawns(executor: &BoundedExecutor, count: usize) {
        executor.shared.refused_spawns.store(count, Ordering::SeqCst);
    }

    #[test]
    fn failed_spawn_with_no_workers_returns_error() {
        let executor = BoundedExecutor::new(2).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        refuse_next_spawns(&executor, 1);

        let counter = Arc::clone(&ran);
        let result = executor.submit(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(matches!(result, Err(ExecutorError::Spawn(_))));
        assert_eq!(executor.active_count(), 0);
        assert_eq!(executor.queued_count(), 0);

        executor.shutdown();
        assert!(executor.await_termination(WAIT));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_spawn_leaves_job_to_running_worker() {
        let executor = BoundedExecutor::new(2).unwrap();
        let (release, gate) = mpsc::channel::<()>();
        let (started, started_rx) = mpsc::channel::<()>();
        let ran = Arc::new(AtomicUsize::new(0));

        executor
            .submit(move || {
                started.send(()).unwrap();
                gate.recv().unwrap();
            })
            .unwrap();
        started_rx.recv_timeout(WAIT).unwrap();

        refuse_next_spawns(&executor, 1);
        let counter = Arc::clone(&ran);
        executor
            .submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(executor.active_count(), 1);
        assert_eq!(executor.queued_count(), 1);

        release.send(()).unwrap();
        executor.shutdown();
        assert!(executor.await_termination(WAIT));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn worker_threads_carry_the_executor_name() {
        let executor = BoundedExecutor::with_name(2, "writer").unwrap();
        let (tx, rx) = mpsc::channel();

        executor
            .submit(move || {
                tx.send(thread::current().name().map(str::to_string)).unwrap();
            })
            .unwrap();

        let name = rx.recv_timeout(WAIT).unwrap().unwrap();
        assert!(name.starts_with("writer-"));
        assert!(format!("{:?}", executor).contains("writer"));
    }
}
