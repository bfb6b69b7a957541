//! Separation job handle and status tracking
//!
//! A job is owned by the pipeline for its lifetime; callers observe it
//! through a cloneable handle. Status reaches exactly one terminal
//! value (Succeeded, Failed or Cancelled) and never leaves it.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// Lifecycle of a separation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Immutable job description
#[derive(Debug, Clone)]
pub struct SeparationJob {
    pub input: PathBuf,
    pub output_dir: PathBuf,
}

struct JobInner {
    status: Mutex<JobStatus>,
    message: Mutex<Option<String>>,
    completed_chunks: AtomicUsize,
    total_chunks: AtomicUsize,
    /// Caller-requested cancellation; surfaced via `is_cancelled`
    cancelled: AtomicBool,
    /// Coordinator-requested stop after a failure; never visible as a
    /// cancellation to the caller
    aborted: AtomicBool,
}

/// Caller-facing view of a running job
#[derive(Clone)]
pub struct JobHandle {
    job: Arc<SeparationJob>,
    inner: Arc<JobInner>,
}

impl JobHandle {
    pub(crate) fn new(job: SeparationJob) -> Self {
        Self {
            job: Arc::new(job),
            inner: Arc::new(JobInner {
                status: Mutex::new(JobStatus::Queued),
                message: Mutex::new(None),
                completed_chunks: AtomicUsize::new(0),
                total_chunks: AtomicUsize::new(0),
                cancelled: AtomicBool::new(false),
                aborted: AtomicBool::new(false),
            }),
        }
    }

    pub fn job(&self) -> &SeparationJob {
        &self.job
    }

    pub fn status(&self) -> JobStatus {
        *self.inner.status.lock()
    }

    /// Failure message for a Failed job
    pub fn message(&self) -> Option<String> {
        self.inner.message.lock().clone()
    }

    /// Completed chunk fraction in [0, 1]; monotonically non-decreasing
    pub fn progress(&self) -> f32 {
        let total = self.inner.total_chunks.load(Ordering::Acquire);
        if total == 0 {
            return 0.0;
        }
        let done = self.inner.completed_chunks.load(Ordering::Acquire);
        done as f32 / total as f32
    }

    /// Request cooperative cancellation, honored between chunks
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Stop the worker pool without marking the job cancelled
    pub(crate) fn request_stop(&self) {
        self.inner.aborted.store(true, Ordering::Release);
    }

    /// Workers stop on either caller cancellation or a coordinator abort
    pub(crate) fn should_stop(&self) -> bool {
        self.is_cancelled() || self.inner.aborted.load(Ordering::Acquire)
    }

    /// Block until the job reaches a terminal status
    pub fn wait(&self) -> JobStatus {
        loop {
            let status = self.status();
            if status.is_terminal() {
                return status;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    pub(crate) fn set_total_chunks(&self, total: usize) {
        self.inner.total_chunks.store(total, Ordering::Release);
    }

    pub(crate) fn chunk_done(&self) {
        self.inner.completed_chunks.fetch_add(1, Ordering::AcqRel);
    }

    /// Move to a new status unless already terminal
    pub(crate) fn set_status(&self, status: JobStatus) {
        let mut current = self.inner.status.lock();
        if !current.is_terminal() {
            *current = status;
        }
    }

    pub(crate) fn set_failed(&self, message: String) {
        let mut current = self.inner.status.lock();
        if !current.is_terminal() {
            log::error!("Separation job failed: {message}");
            *current = JobStatus::Failed;
            *self.inner.message.lock() = Some(message);
        }
    }
}
