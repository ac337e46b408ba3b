//! Submission queue.
//!
//! A thread-safe unbounded FIFO for jobs submitted to a context from any
//! thread. Only the context's own thread pops.

use crate::runtime::stored_task::Job;
use crossbeam_queue::SegQueue;

/// A context's submission queue.
#[derive(Debug, Default)]
pub struct JobQueue {
    inner: SegQueue<Job>,
}

impl JobQueue {
    /// Creates a new, empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: SegQueue::new(),
        }
    }

    /// Pushes a job to the back of the queue.
    pub fn push(&self, job: Job) {
        self.inner.push(job);
    }

    /// Pops the oldest job.
    pub fn pop(&self) -> Option<Job> {
        self.inner.pop()
    }

    /// Returns the number of queued jobs.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drops every queued job, returning how many were discarded.
    pub fn discard_all(&self) -> usize {
        let mut discarded = 0;
        while self.inner.pop().is_some() {
            discarded += 1;
        }
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn pops_in_submission_order() {
        let queue = JobQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = Arc::clone(&order);
            queue.push(Job::new(move || order.lock().push(i)));
        }
        assert_eq!(queue.len(), 3);
        while let Some(job) = queue.pop() {
            job.run();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn discard_all_empties_queue() {
        let queue = JobQueue::new();
        queue.push(Job::new(|| {}));
        queue.push(Job::new(|| {}));
        assert_eq!(queue.discard_all(), 2);
        assert!(queue.is_empty());
    }
}
