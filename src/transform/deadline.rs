//! Time-bounded transforms

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::Bytes;

use super::FrameTransform;
use crate::error::TransformError;
use crate::media::flv::VideoCodec;

struct Job {
    sample: Bytes,
    codec: VideoCodec,
    nalu_length_size: Option<u8>,
    reply: SyncSender<Result<Bytes, TransformError>>,
}

struct Worker {
    jobs: SyncSender<Job>,
    /// Set while a job runs, including one whose caller already gave up
    busy: Arc<AtomicBool>,
}

/// Runs the inner transform on a worker thread and gives up after `timeout`
///
/// The worker is started on first use and lives as long as the `Deadline`.
/// A transform that overruns keeps the worker busy until it returns; calls
/// made in the meantime fail with [`TransformError::Timeout`] at once, so a
/// hung transform costs one thread, not one per frame.
pub struct Deadline<T: ?Sized> {
    inner: Arc<T>,
    timeout: Duration,
    worker: Mutex<Option<Worker>>,
}

impl<T: FrameTransform + ?Sized + 'static> Deadline<T> {
    pub fn new(inner: Arc<T>, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            worker: Mutex::new(None),
        }
    }

    fn call(
        &self,
        sample: Bytes,
        codec: VideoCodec,
        nalu_length_size: Option<u8>,
    ) -> Result<Bytes, TransformError> {
        let (reply, result) = mpsc::sync_channel(1);
        let job = Job {
            sample,
            codec,
            nalu_length_size,
            reply,
        };
        self.submit(job)?;

        match result.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(TransformError::Timeout(self.timeout)),
            // Worker went away without answering
            Err(RecvTimeoutError::Disconnected) => Err(TransformError::Panicked),
        }
    }

    fn submit(&self, job: Job) -> Result<(), TransformError> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| TransformError::Apply("transform worker lock poisoned".into()))?;

        if worker.is_none() {
            *worker = Some(self.spawn_worker()?);
        }
        let Some(current) = worker.as_ref() else {
            return Err(TransformError::Panicked);
        };

        if current.busy.swap(true, Ordering::AcqRel) {
            return Err(TransformError::Timeout(self.timeout));
        }
        match current.jobs.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                current.busy.store(false, Ordering::Release);
                Err(TransformError::Timeout(self.timeout))
            }
            Err(TrySendError::Disconnected(_)) => {
                *worker = None;
                Err(TransformError::Panicked)
            }
        }
    }

    fn spawn_worker(&self) -> Result<Worker, TransformError> {
        let (jobs, queue) = mpsc::sync_channel::<Job>(1);
        let busy = Arc::new(AtomicBool::new(false));
        let inner = Arc::clone(&self.inner);
        let worker_busy = Arc::clone(&busy);

        thread::Builder::new()
            .name("keyframe-transform".into())
            .spawn(move || {
                for job in queue {
                    let Job {
                        sample,
                        codec,
                        nalu_length_size,
                        reply,
                    } = job;
                    let result = panic::catch_unwind(AssertUnwindSafe(|| match nalu_length_size {
                        Some(size) => inner.transform_framed(sample, codec, size),
                        None => inner.transform(sample, codec),
                    }))
                    .unwrap_or(Err(TransformError::Panicked));
                    worker_busy.store(false, Ordering::Release);
                    let _ = reply.send(result);
                }
            })
            .map_err(|e| TransformError::Apply(format!("failed to spawn transform thread: {}", e)))?;

        Ok(Worker { jobs, busy })
    }
}

impl<T: FrameTransform + ?Sized + 'static> FrameTransform for Deadline<T> {
    fn transform(&self, sample: Bytes, codec: VideoCodec) -> Result<Bytes, TransformError> {
        self.call(sample, codec, None)
    }

    fn transform_framed(
        &self,
        sample: Bytes,
        codec: VideoCodec,
        nalu_length_size: u8,
    ) -> Result<Bytes, TransformError> {
        self.call(sample, codec, Some(nalu_length_size))
    }
}

impl<T: ?Sized> std::fmt::Debug for Deadline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deadline")
            .field("timeout", &self.timeout)
            .finish()
    }
}
