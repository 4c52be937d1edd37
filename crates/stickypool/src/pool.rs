//! Bridge between async callers and blocking engine work.
//!
//! This module defines the [`WorkerPool`] struct, which owns a fixed set of OS
//! threads, one per engine slot, fed from a single FIFO queue. Callers
//! [`submit`](WorkerPool::submit) jobs without blocking and await the returned
//! [`JobHandle`]; whichever worker frees up first takes the next job, runs it
//! synchronously against its sticky engine, and resolves the handle.
//!
//! The queue is unbounded unless [`PoolConfig::max_queue_depth`] is set, in
//! which case submissions beyond that many waiting jobs are refused up front.
//! [`WorkerPool::drain`] stops intake, lets every accepted job finish and waits
//! for all workers to exit.

use crate::{
    Engine, Error, JobDescription, JobProcessor, ResultRecord, Result, SlotToken, StickyPool,
    worker::{Occupancy, WorkRequest, worker_loop},
};
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};
use parking_lot::Mutex;
use portable_atomic::Ordering;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot, watch};

/// Sizing for a [`WorkerPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads, and of engines.
    pub size: usize,
    /// Maximum number of jobs allowed to wait for a free worker. `None` means
    /// unbounded.
    pub max_queue_depth: Option<usize>,
}

impl PoolConfig {
    pub const fn new(size: usize) -> Self {
        Self {
            size,
            max_queue_depth: None,
        }
    }

    #[must_use]
    pub const fn with_max_queue_depth(mut self, depth: usize) -> Self {
        self.max_queue_depth = Some(depth);
        self
    }
}

/// Point-in-time view of a [`WorkerPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub size: usize,
    pub queued: usize,
    pub running: usize,
    pub bound: usize,
}

trait Bindings: Send + Sync {
    fn bound(&self) -> usize;
}

impl<E: Engine> Bindings for StickyPool<E> {
    fn bound(&self) -> usize {
        StickyPool::bound(self)
    }
}

/// A fixed pool of blocking workers, each with its own sticky engine.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::UnboundedSender<WorkRequest>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    occupancy: Arc<Occupancy>,
    bindings: Arc<dyn Bindings>,
    drained: watch::Sender<bool>,
    config: PoolConfig,
}

impl WorkerPool {
    /// Builds `config.size` engines and starts one worker thread per engine.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPoolSize`] if the size is zero.
    /// - [`Error::InvalidQueueDepth`] if a queue depth of zero is configured.
    /// - [`Error::EngineConstruction`] if any engine fails to build.
    /// - [`Error::WorkerSpawn`] if a thread cannot be started.
    pub fn start<E, F>(config: PoolConfig, factory: F) -> Result<Self>
    where
        E: Engine,
        F: FnMut(usize) -> Result<E>,
    {
        if config.max_queue_depth == Some(0) {
            return Err(Error::InvalidQueueDepth);
        }

        let engines = Arc::new(StickyPool::new(config.size, factory)?);
        let processor = JobProcessor::new(Arc::clone(&engines));
        let occupancy = Arc::new(Occupancy::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(config.size);
        for worker_id in 0..config.size {
            let token = SlotToken::issue();
            let queue = Arc::clone(&queue);
            let processor = processor.clone();
            let occupancy = Arc::clone(&occupancy);

            // On failure `tx` is dropped with this frame, which stops the
            // workers already started.
            let handle = thread::Builder::new()
                .name(format!("stickypool-worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, token, queue, processor, occupancy))
                .map_err(|e| Error::WorkerSpawn {
                    worker: worker_id,
                    reason: e.to_string(),
                })?;
            workers.push(handle);
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool started with {} workers", config.size);

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            occupancy,
            bindings: engines,
            drained: watch::Sender::new(false),
            config,
        })
    }

    /// Queues `job` and returns a handle to its eventual result.
    ///
    /// This never blocks on the job itself; the job starts once a worker is
    /// free. Await the handle to get the job's [`ResultRecord`].
    ///
    /// # Errors
    ///
    /// - [`Error::PoolShutdown`] if [`drain`](Self::drain) has been called.
    /// - [`Error::QueueFull`] if the configured queue depth is reached.
    pub fn submit(&self, job: JobDescription) -> Result<JobHandle> {
        let sender = self.sender.lock();
        let Some(tx) = sender.as_ref() else {
            return Err(Error::PoolShutdown);
        };

        // Submitters are serialized by the sender lock and workers only ever
        // decrement, so the depth check cannot be overshot.
        if let Some(depth) = self.config.max_queue_depth {
            if self.occupancy.queued.load(Ordering::Acquire) >= depth {
                #[cfg(feature = "tracing")]
                tracing::warn!("Refusing job: {depth} jobs already waiting");
                return Err(Error::QueueFull { depth });
            }
        }

        let (reply, rx) = oneshot::channel();
        self.occupancy.queued.fetch_add(1, Ordering::AcqRel);
        if tx.send(WorkRequest::Job { job, reply }).is_err() {
            self.occupancy.queued.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::ChannelError {
                context: "Worker queue closed".to_string(),
            });
        }

        Ok(JobHandle { rx })
    }

    /// Gracefully shuts the pool down.
    ///
    /// - Refuses new submissions from this point on.
    /// - Queues one shutdown request per worker behind every accepted
    ///   job, so queued and running jobs all complete.
    /// - Waits for each worker to acknowledge, then joins its thread.
    ///
    /// There is no timeout: a job stuck inside an engine call holds its worker
    /// until it returns. Callers that need a bound should wrap this future in
    /// one. Concurrent and repeated calls all resolve once the first drain has
    /// joined every worker; if that first call is dropped early, later calls
    /// keep waiting. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelError`] if the workers could not be joined.
    pub async fn drain(&self) -> Result<()> {
        let tx = self.sender.lock().take();
        let Some(tx) = tx else {
            return self.wait_drained().await;
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Draining worker pool ({} queued, {} running)",
            self.occupancy.queued.load(Ordering::Acquire),
            self.occupancy.running.load(Ordering::Acquire)
        );

        let mut acks = Vec::with_capacity(self.config.size);
        for _i in 0..self.config.size {
            let (response, ack) = oneshot::channel();
            if tx.send(WorkRequest::Shutdown { response }).is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!("Failed to send shutdown to worker {_i}");
            } else {
                acks.push(ack);
            }
        }
        drop(tx);

        for ack in acks {
            if ack.await.is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!("A worker exited without acknowledging shutdown");
            }
        }

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let joined = tokio::task::spawn_blocking(move || {
            for handle in workers {
                if handle.join().is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("A worker thread panicked");
                }
            }
        })
        .await;

        self.drained.send_replace(true);
        joined.map_err(|e| Error::ChannelError {
            context: format!("Failed to join workers: {e}"),
        })?;

        #[cfg(feature = "tracing")]
        tracing::info!("Worker pool drained");

        Ok(())
    }

    async fn wait_drained(&self) -> Result<()> {
        let mut drained = self.drained.subscribe();
        if drained.wait_for(|done| *done).await.is_err() {
            return Err(Error::ChannelError {
                context: "Drain signal closed".to_string(),
            });
        }
        Ok(())
    }

    /// Whether the pool still accepts submissions.
    pub fn is_accepting(&self) -> bool {
        self.sender.lock().is_some()
    }

    pub const fn size(&self) -> usize {
        self.config.size
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.config.size,
            queued: self.occupancy.queued.load(Ordering::Acquire),
            running: self.occupancy.running.load(Ordering::Acquire),
            bound: self.bindings.bound(),
        }
    }
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Pending result of a submitted job.
///
/// Resolves once a worker has run the job. Dropping the handle does not
/// cancel the job.
#[derive(Debug)]
#[must_use = "the job's result is only observable through its handle"]
pub struct JobHandle {
    rx: oneshot::Receiver<ResultRecord>,
}

impl JobHandle {
    /// Blocks the current thread until the result is available.
    ///
    /// Must not be called from within an async runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelError`] if the worker went away without
    /// answering.
    pub fn wait(self) -> Result<ResultRecord> {
        self.rx.blocking_recv().map_err(|_| lost_reply())
    }
}

impl Future for JobHandle {
    type Output = Result<ResultRecord>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| lost_reply()))
    }
}

fn lost_reply() -> Error {
    Error::ChannelError {
        context: "Worker dropped the job without a result".to_string(),
    }
}
