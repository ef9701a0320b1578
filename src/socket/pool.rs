//! Bounded pool of send threads for the client agent.
//!
//! Each queued job is one connect+write+close. A fixed number of threads
//! pull jobs from a shared channel, so a burst of sends cannot create an
//! unbounded number of OS threads.

// Rust guideline compliant 2025-01

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};

/// Unit of work executed on a pool thread.
pub type SendJob = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of background threads.
///
/// Dropping the pool closes the job channel; threads finish their current
/// job and exit on their own. They are never joined, so a send stuck in a
/// connect timeout does not delay shutdown.
pub struct SendPool {
    /// Sender for jobs; `None` once shut down.
    job_tx: Option<mpsc::Sender<SendJob>>,
    /// Worker thread handles.
    handles: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for SendPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendPool")
            .field("threads", &self.handles.len())
            .field("open", &self.job_tx.is_some())
            .finish()
    }
}

impl SendPool {
    /// Spawn `size` worker threads named `<name>-<n>`.
    pub fn new(name: &str, size: usize) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::channel::<SendJob>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut handles = Vec::with_capacity(size);
        for index in 0..size.max(1) {
            let job_rx = Arc::clone(&job_rx);
            let handle = thread::Builder::new()
                .name(format!("{name}-{index}"))
                .spawn(move || Self::worker_loop(&job_rx))
                .with_context(|| format!("Failed to spawn send worker {index}"))?;
            handles.push(handle);
        }

        log::debug!("[SendPool] Started {} thread(s) for '{}'", handles.len(), name);
        Ok(Self {
            job_tx: Some(job_tx),
            handles,
        })
    }

    /// Worker loop - runs on a pool thread until the channel closes.
    fn worker_loop(job_rx: &Mutex<mpsc::Receiver<SendJob>>) {
        loop {
            // The guard is a temporary: the lock is held only while waiting.
            let job = job_rx.lock().unwrap_or_else(PoisonError::into_inner).recv();
            let Ok(job) = job else {
                break;
            };
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                log::error!("[SendPool] Send job panicked; worker continues");
            }
        }
    }

    /// Queue a job. Returns `false` if the pool has been shut down.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) -> bool {
        match &self.job_tx {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Stop accepting jobs. Already-queued jobs still run.
    pub fn shutdown(&mut self) {
        self.job_tx = None;
    }
}

impl Drop for SendPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn wait_for(counter: &AtomicUsize, expected: usize) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if counter.load(Ordering::SeqCst) == expected {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_runs_every_job() {
        let pool = SendPool::new("test-send", 3).unwrap();
        assert_eq!(pool.size(), 3);

        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let done = Arc::clone(&done);
            assert!(pool.execute(move || {
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert!(wait_for(&done, 20));
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let pool = SendPool::new("test-panic", 1).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        assert!(pool.execute(|| panic!("boom")));
        let after = Arc::clone(&done);
        assert!(pool.execute(move || {
            after.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(wait_for(&done, 1), "single worker should survive the panic");
    }

    #[test]
    fn test_execute_after_shutdown_is_rejected() {
        let mut pool = SendPool::new("test-closed", 1).unwrap();
        pool.shutdown();
        assert!(!pool.execute(|| {}));
    }

    #[test]
    fn test_zero_size_still_gets_one_thread() {
        let pool = SendPool::new("test-min", 0).unwrap();
        assert_eq!(pool.size(), 1);
    }
}
