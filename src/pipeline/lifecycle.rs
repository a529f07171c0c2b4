//! # Worker Lifecycle
//!
//! Start/stop contract shared by every pipeline stage: an owned worker
//! thread, a cooperative running flag and a bounded join.
//!
//! A worker that does not finish within the join timeout is abandoned, never
//! killed. Its thread keeps running until its current `poll` returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{GroundlinkError, Result};

/// Sleep between two polls of a worker loop
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on waiting for a worker to finish
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(4);

/// One unit of periodic work
pub trait PollTask: Send + 'static {
    /// One pass of the worker loop
    fn poll(&mut self) -> Result<()>;

    /// Final pass after the running flag is cleared
    fn drain(&mut self) -> Result<()> {
        self.poll()
    }
}

/// Live thread plus the channel its outcome arrives on
struct WorkerThread {
    handle: JoinHandle<()>,
    outcome: Receiver<Result<()>>,
}

/// Owns a [`PollTask`] and the thread that drives it
pub struct Lifecycle<T: PollTask> {
    name: String,
    task: Arc<Mutex<T>>,
    running: Arc<AtomicBool>,
    interval: Duration,
    join_timeout: Duration,
    thread: Option<WorkerThread>,
}

impl<T: PollTask> Lifecycle<T> {
    /// Wrap `task` with the default interval and join timeout
    pub fn new(name: impl Into<String>, task: T) -> Self {
        Self {
            name: name.into(),
            task: Arc::new(Mutex::new(task)),
            running: Arc::new(AtomicBool::new(false)),
            interval: DEFAULT_POLL_INTERVAL,
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            thread: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_join_timeout(mut self, join_timeout: Duration) -> Self {
        self.join_timeout = join_timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the worker thread
    ///
    /// Starting a running worker is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the thread cannot be spawned
    pub fn start(&mut self) -> Result<()> {
        if self.thread.is_some() {
            warn!("{} is already running", self.name);
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel();
        let task = Arc::clone(&self.task);
        let running = Arc::clone(&self.running);
        let interval = self.interval;

        let spawned = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let outcome = run_loop(&task, &running, interval);
                running.store(false, Ordering::SeqCst);
                let _ = tx.send(outcome);
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        self.thread = Some(WorkerThread {
            handle,
            outcome: rx,
        });
        info!("{} started", self.name);
        Ok(())
    }

    /// Clear the running flag and wait for the worker's final drain
    ///
    /// # Errors
    ///
    /// Returns `Worker` if the task failed or panicked. A join timeout is
    /// logged and is not an error.
    pub fn stop(&mut self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);

        let Some(worker) = self.thread.take() else {
            debug!("{} is not running", self.name);
            return Ok(());
        };

        let result = match worker.outcome.recv_timeout(self.join_timeout) {
            Ok(outcome) => {
                let _ = worker.handle.join();
                outcome.map_err(|e| self.failure(e))
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "{} did not stop within {:?}, abandoning its thread",
                    self.name, self.join_timeout
                );
                Ok(())
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = worker.handle.join();
                Err(self.panicked())
            }
        };

        info!("{} stopped", self.name);
        result
    }

    /// Report a worker that ended on its own
    ///
    /// # Errors
    ///
    /// Returns `Worker` if the thread exited with an error or panicked
    pub fn check(&mut self) -> Result<()> {
        let finished = self
            .thread
            .as_ref()
            .is_some_and(|worker| worker.handle.is_finished());
        if !finished {
            return Ok(());
        }
        let Some(worker) = self.thread.take() else {
            return Ok(());
        };
        self.running.store(false, Ordering::SeqCst);

        let outcome = worker.outcome.try_recv();
        let _ = worker.handle.join();
        match outcome {
            Ok(Ok(())) => {
                info!("{} exited", self.name);
                Ok(())
            }
            Ok(Err(e)) => Err(self.failure(e)),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Err(self.panicked()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Lock the task for inspection
    ///
    /// The worker thread takes the same lock for every poll.
    pub fn task(&self) -> MutexGuard<'_, T> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failure(&self, e: GroundlinkError) -> GroundlinkError {
        error!("{} failed: {}", self.name, e);
        GroundlinkError::Worker(format!("{}: {}", self.name, e))
    }

    fn panicked(&self) -> GroundlinkError {
        error!("{} panicked", self.name);
        GroundlinkError::Worker(format!("{} panicked", self.name))
    }
}

impl<T: PollTask> Drop for Lifecycle<T> {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.stop();
        }
    }
}

fn run_loop<T: PollTask>(task: &Mutex<T>, running: &AtomicBool, interval: Duration) -> Result<()> {
    while running.load(Ordering::SeqCst) {
        task.lock().unwrap_or_else(PoisonError::into_inner).poll()?;
        thread::sleep(interval);
    }
    task.lock().unwrap_or_else(PoisonError::into_inner).drain()
}
