//! Single-worker task scheduler.
//!
//! One named thread drains an unbounded FIFO queue. Everything that touches
//! the engine or the render target runs here, so those never need to be
//! thread-safe themselves.

use crossbeam_channel::{unbounded, Sender};
use oep_core::Result;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, error, warn};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// FIFO task queue with exactly one worker thread.
pub struct Scheduler {
    name: String,
    sender: Mutex<Option<Sender<Task>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    pending: Arc<AtomicUsize>,
}

impl Scheduler {
    /// Spawn the worker thread.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let (sender, receiver) = unbounded::<Task>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);
        let worker_name = name.clone();

        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            debug!(worker = %worker_name, "Scheduler worker started");
            for task in receiver.iter() {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                    error!(
                        worker = %worker_name,
                        panic = panic_message(payload.as_ref()),
                        "Scheduled task panicked"
                    );
                }
                worker_pending.fetch_sub(1, Ordering::AcqRel);
            }
            debug!(worker = %worker_name, "Scheduler worker stopped");
        })?;

        Ok(Self {
            name,
            worker_id: handle.thread().id(),
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
            pending,
        })
    }

    /// Queue a task. Returns `false` once the scheduler has shut down.
    pub fn enqueue<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            warn!(worker = %self.name, "Task dropped, scheduler is shut down");
            return false;
        };
        self.pending.fetch_add(1, Ordering::AcqRel);
        if sender.send(Box::new(task)).is_err() {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            warn!(worker = %self.name, "Task dropped, worker has exited");
            return false;
        }
        true
    }

    /// Whether the calling thread is this scheduler's worker.
    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    pub fn worker_thread_id(&self) -> ThreadId {
        self.worker_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tasks queued or running.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Stop accepting tasks, let the worker drain the queue, and join it.
    ///
    /// Called from the worker itself, the thread is detached instead and
    /// finishes the queue on its own.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if self.is_worker_thread() {
            debug!(worker = %self.name, "Shutdown from worker thread, detaching");
            return;
        }
        if handle.join().is_err() {
            error!(worker = %self.name, "Scheduler worker panicked");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}
