use crate::{
    CORRELATION_FIELD, Engine, Error, JobDescription, ResultRecord, Result, SUBMITTED_AT_FIELD,
    SlotToken, StickyPool, job::unix_now,
};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

/// Runs a single job against the engine bound to the calling worker.
///
/// Every call produces exactly one [`ResultRecord`]. Capacity errors, missing
/// fields, engine errors and engine panics are all folded into an
/// error-tagged record so the calling worker can move on to its next job.
pub struct JobProcessor<E> {
    engines: Arc<StickyPool<E>>,
}

impl<E> Clone for JobProcessor<E> {
    fn clone(&self) -> Self {
        Self {
            engines: Arc::clone(&self.engines),
        }
    }
}

impl<E: Engine> JobProcessor<E> {
    pub const fn new(engines: Arc<StickyPool<E>>) -> Self {
        Self { engines }
    }

    /// The pool this processor draws engines from.
    pub fn engines(&self) -> &StickyPool<E> {
        &self.engines
    }

    /// Processes `job` on behalf of the worker identified by `token`.
    ///
    /// The reported duration runs from the job's submission timestamp. If the
    /// job has no readable timestamp it runs from the start of this call.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all, fields(worker = %token)))]
    pub fn process(&self, job: &JobDescription, token: SlotToken) -> ResultRecord {
        let started = Instant::now();
        let submitted = job.get_f64(SUBMITTED_AT_FIELD);
        let elapsed = || match &submitted {
            Ok(at) => (unix_now() - at).max(started.elapsed().as_secs_f64()),
            Err(_) => started.elapsed().as_secs_f64(),
        };

        match self.run(job, token, submitted.as_ref().err()) {
            Ok(output) => ResultRecord::success(job, elapsed(), token, output),
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Job failed on worker {token}: {e}");

                ResultRecord::failure(job, elapsed(), token, &e)
            }
        }
    }

    fn run(
        &self,
        job: &JobDescription,
        token: SlotToken,
        bad_timestamp: Option<&Error>,
    ) -> Result<serde_json::Value> {
        let mut engine = self.engines.acquire(token)?;

        if let Some(e) = bad_timestamp {
            return Err(e.clone());
        }
        job.get(CORRELATION_FIELD)?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Worker {token} running job on engine slot {}", engine.slot());

        // parking_lot locks do not poison: a panicked engine stays bound to
        // this worker and serves its next job.
        catch_unwind(AssertUnwindSafe(|| engine.run(job))).unwrap_or_else(|panic| {
            Err(Error::Engine {
                reason: panic_message(panic.as_ref()),
            })
        })
    }
}

impl<E> core::fmt::Debug for JobProcessor<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobProcessor")
            .field("engines", &self.engines)
            .finish()
    }
}

fn panic_message(panic: &(dyn core::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("engine panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("engine panicked: {s}")
    } else {
        "engine panicked".to_string()
    }
}
