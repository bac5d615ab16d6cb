//! The helper thread that runs breakpoint policy off the callback thread.
//!
//! Jobs run one at a time in FIFO order. A failing or panicking job is logged and the worker
//! keeps draining the queue.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    thread::{self, JoinHandle},
};

use crossbeam_channel::{unbounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::{Error, Result};

/// A unit of work for the helper thread.
pub type Job = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// A single worker thread draining a job queue.
pub struct HelperThread {
    sender: Mutex<Option<Sender<Job>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl HelperThread {
    /// Spawn the worker.
    ///
    /// # Errors
    /// Returns [`Error::Io`] if the thread cannot be spawned.
    pub fn spawn(name: &str) -> Result<Self> {
        let (sender, receiver) = unbounded::<Job>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in receiver {
                    match catch_unwind(AssertUnwindSafe(job)) {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => error!(error = %err, "helper thread job failed"),
                        Err(_) => error!("helper thread job panicked"),
                    }
                }
                debug!("helper thread queue closed");
            })?;

        Ok(HelperThread {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue a job.
    ///
    /// # Errors
    /// Returns [`Error::SessionTerminated`] once the queue was closed.
    pub fn enqueue(&self, job: Job) -> Result<()> {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => sender.send(job).map_err(|_| Error::SessionTerminated),
            None => Err(Error::SessionTerminated),
        }
    }

    /// Stop accepting jobs; queued jobs still run.
    pub fn close(&self) {
        self.sender.lock().take();
    }

    /// Close the queue and wait for the worker to drain it.
    ///
    /// Called from a job itself, this only closes the queue.
    pub fn shutdown(&self) {
        self.close();
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            error!("helper thread terminated abnormally");
        }
    }
}

impl Drop for HelperThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
