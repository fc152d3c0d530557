// src/engine/queue.rs

use std::collections::VecDeque;

use tracing::trace;

use crate::dag::Job;
use crate::types::QueueKind;

/// Ready queues, one FIFO per worker category.
///
/// Lives behind the scheduler's queue mutex; all refills happen under that
/// one lock.
#[derive(Debug, Default)]
pub struct JobQueues {
    general: VecDeque<Job>,
    network: VecDeque<Job>,
}

impl JobQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: QueueKind, job: Job) {
        trace!(task = %job.id, label = %job.label(), queue = %kind, "queued job");
        self.queue_mut(kind).push_back(job);
    }

    pub fn pop(&mut self, kind: QueueKind) -> Option<Job> {
        self.queue_mut(kind).pop_front()
    }

    pub fn is_empty(&self, kind: QueueKind) -> bool {
        self.queue(kind).is_empty()
    }

    pub fn len(&self, kind: QueueKind) -> usize {
        self.queue(kind).len()
    }

    fn queue(&self, kind: QueueKind) -> &VecDeque<Job> {
        match kind {
            QueueKind::General => &self.general,
            QueueKind::Network => &self.network,
        }
    }

    fn queue_mut(&mut self, kind: QueueKind) -> &mut VecDeque<Job> {
        match kind {
            QueueKind::General => &mut self.general,
            QueueKind::Network => &mut self.network,
        }
    }
}
