//! Synchronous record, submit and wait on the shared queue.

use crate::{
    backend::{Backend, CommandQueue},
    Result,
};
use anyhow::Context;
use std::fmt;

/// Owns the single shared queue. Every submission goes through [`Submitter::run_and_wait`],
/// which holds `&mut self` from recording until the GPU is idle, so at most one recording or
/// submission is in flight and the allocator is always safe to reset on the next call.
pub(crate) struct Submitter<B: Backend> {
    queue: B::Queue,
    submissions: u64,
}

impl<B: Backend> Submitter<B> {
    pub(crate) fn new(queue: B::Queue) -> Self {
        Self {
            queue,
            submissions: 0,
        }
    }

    #[inline]
    pub(crate) fn queue(&self) -> &B::Queue {
        &self.queue
    }

    /// Record commands with `record`, submit them and block until the GPU has finished.
    pub(crate) fn run_and_wait<F>(&mut self, label: &str, record: F) -> Result<()>
    where
        F: FnOnce(&mut B::CommandList),
    {
        tracing::trace!("recording `{label}`");

        let list = self
            .queue
            .begin()
            .with_context(|| format!("failed to begin `{label}` command list"))?;
        record(list);
        self.queue
            .submit()
            .with_context(|| format!("failed to submit `{label}` command list"))?;
        self.submissions += 1;
        self.wait_idle()
    }

    /// Block until all submitted work has completed.
    pub(crate) fn wait_idle(&mut self) -> Result<()> {
        self.queue.wait_idle()
    }

    #[inline]
    pub(crate) fn submissions(&self) -> u64 {
        self.submissions
    }
}

impl<B: Backend> fmt::Debug for Submitter<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submitter")
            .field("submissions", &self.submissions)
            .finish_non_exhaustive()
    }
}
