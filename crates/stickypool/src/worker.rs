use crate::{Engine, JobDescription, JobProcessor, ResultRecord, SlotToken};
use parking_lot::Mutex;
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Messages consumed by worker threads, in FIFO order.
pub(crate) enum WorkRequest {
    /// Run a job and send its record back to the submitter.
    Job {
        job: JobDescription,
        reply: oneshot::Sender<ResultRecord>,
    },
    /// Stop after acknowledging. Sent once per worker, behind all jobs.
    Shutdown { response: oneshot::Sender<()> },
}

/// Queue occupancy shared by the pool and its workers.
#[derive(Debug, Default)]
pub(crate) struct Occupancy {
    pub(crate) queued: AtomicUsize,
    pub(crate) running: AtomicUsize,
}

/// Body of one worker thread.
///
/// Each worker owns a single [`SlotToken`] for its whole life and presents it
/// with every job it runs, so all of its jobs land on the same engine. Idle
/// workers take turns waiting on the shared queue: the one holding the lock
/// blocks in `blocking_recv`, the rest block on the lock. Jobs therefore leave
/// the queue in submission order, and each worker runs its jobs one at a
/// time, to completion.
///
/// The loop ends on [`WorkRequest::Shutdown`] or when every sender is gone.
#[allow(clippy::used_underscore_binding)]
pub(crate) fn worker_loop<E: Engine>(
    _worker_id: usize,
    token: SlotToken,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<WorkRequest>>>,
    processor: JobProcessor<E>,
    occupancy: Arc<Occupancy>,
) {
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} started with token {token}");

    loop {
        let work = queue.lock().blocking_recv();

        match work {
            Some(WorkRequest::Job { job, reply }) => {
                occupancy.queued.fetch_sub(1, Ordering::AcqRel);
                occupancy.running.fetch_add(1, Ordering::AcqRel);

                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {_worker_id} starting job");

                let record = processor.process(&job, token);
                occupancy.running.fetch_sub(1, Ordering::AcqRel);

                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {_worker_id} finished job");

                if reply.send(record).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {_worker_id}: submitter stopped waiting for its result");
                }
            }
            Some(WorkRequest::Shutdown { response }) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {_worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {_worker_id} failed to acknowledge shutdown");
                }
                break;
            }
            None => break,
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {_worker_id} stopped");
}
