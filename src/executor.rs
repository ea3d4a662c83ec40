//! Executor boundary
//!
//! The session does not own worker threads; it submits one unit of work
//! per accepted stream through this interface. Work must run on a thread
//! other than the session's ingress thread, because the bridge read
//! blocks.

use crossbeam::channel::{self, Sender, TrySendError};
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;

/// A unit of stream work: bridge plus downstream handler, boxed up
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Why a task was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// The pending-work queue is full
    QueueFull,
    /// The executor has shut down
    ShutDown,
}

/// Accepts callable units of work for concurrent execution
pub trait Executor: Send + Sync {
    /// Submit a task; rejection is surfaced to the peer as
    /// RST_STREAM REFUSED_STREAM.
    fn submit(&self, task: Task) -> Result<(), Rejected>;
}

/// Executor construction errors
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("executor needs at least one worker thread")]
    NoWorkers,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Fixed-size thread pool backed by a bounded channel
///
/// The pool owns its threads: dropping it closes the queue and joins
/// every worker before returning.
pub struct ThreadPoolExecutor {
    sender: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPoolExecutor {
    /// Create a pool with `threads` workers and a pending queue of twice
    /// that many tasks.
    pub fn new(threads: usize) -> Result<Self, ExecutorError> {
        if threads == 0 {
            return Err(ExecutorError::NoWorkers);
        }

        let (sender, receiver) = channel::bounded::<Task>(threads * 2);
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let receiver = receiver.clone();
            let handle = std::thread::Builder::new()
                .name(format!("spdy-worker-{}", i))
                .spawn(move || {
                    for task in receiver.iter() {
                        if catch_unwind(AssertUnwindSafe(task)).is_err() {
                            tracing::warn!("stream worker panicked");
                        }
                    }
                })?;
            workers.push(handle);
        }

        Ok(ThreadPoolExecutor {
            sender: Some(sender),
            workers,
        })
    }

    /// Number of worker threads
    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

impl Executor for ThreadPoolExecutor {
    fn submit(&self, task: Task) -> Result<(), Rejected> {
        let sender = self.sender.as_ref().ok_or(Rejected::ShutDown)?;
        match sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Rejected::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(Rejected::ShutDown),
        }
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        // Closing the channel lets each worker drain and exit.
        self.sender.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("worker thread terminated abnormally");
            }
        }
    }
}
