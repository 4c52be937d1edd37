use crate::{JobDescription, Result};

/// A stateful processing engine, such as a loaded model.
///
/// Engines are expensive to construct, cheap to reuse, and not safe to call
/// from two places at once. The [`StickyPool`](crate::StickyPool) builds a
/// fixed number of them up front and guarantees that each is only ever lent
/// to the one worker bound to it, so implementations need `Send` but not
/// `Sync`.
pub trait Engine: Send + 'static {
    /// Runs one job to completion.
    ///
    /// This is a blocking call and is expected to dominate the cost of a job.
    /// Payload lookups should go through the [`JobDescription`] accessors so
    /// that a missing field surfaces as
    /// [`Error::MissingField`](crate::Error::MissingField).
    ///
    /// # Errors
    ///
    /// Any error is reported in the job's result record; the worker slot stays
    /// healthy. A panic is caught and reported the same way.
    fn run(&mut self, job: &JobDescription) -> Result<serde_json::Value>;
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn run(&mut self, job: &JobDescription) -> Result<serde_json::Value> {
        (**self).run(job)
    }
}
