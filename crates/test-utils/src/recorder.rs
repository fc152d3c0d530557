use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use depflow::engine::TaskContext;
use depflow::errors::Result;
use depflow::types::{QueueKind, WorkerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Started {
        label: String,
        worker: WorkerId,
        queue: QueueKind,
    },
    Finished {
        label: String,
    },
}

/// Shared, ordered log of task starts and finishes.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Body that records its start, sleeps for `hold`, records its finish.
    pub fn body(
        &self,
        label: &str,
        hold: Duration,
    ) -> impl FnOnce(&TaskContext<'_>) -> Result<()> + Send + 'static {
        let recorder = self.clone();
        let label = label.to_string();
        move |ctx| {
            recorder.push(Event::Started {
                label: label.clone(),
                worker: ctx.worker(),
                queue: ctx.queue(),
            });
            if !hold.is_zero() {
                thread::sleep(hold);
            }
            recorder.push(Event::Finished { label });
            Ok(())
        }
    }

    pub fn started_at(&self, label: &str) -> Option<usize> {
        self.events()
            .iter()
            .position(|e| matches!(e, Event::Started { label: l, .. } if l == label))
    }

    pub fn finished_at(&self, label: &str) -> Option<usize> {
        self.events()
            .iter()
            .position(|e| matches!(e, Event::Finished { label: l } if l == label))
    }

    /// Whether `first` finished before `second` started.
    pub fn finished_before_started(&self, first: &str, second: &str) -> bool {
        match (self.finished_at(first), self.started_at(second)) {
            (Some(f), Some(s)) => f < s,
            _ => false,
        }
    }

    /// Whether the two bodies were running at the same time.
    pub fn overlapped(&self, a: &str, b: &str) -> bool {
        match (
            self.started_at(a),
            self.finished_at(a),
            self.started_at(b),
            self.finished_at(b),
        ) {
            (Some(sa), Some(fa), Some(sb), Some(fb)) => sa < fb && sb < fa,
            _ => false,
        }
    }

    /// Queue the labelled task was taken from.
    pub fn queue_of(&self, label: &str) -> Option<QueueKind> {
        self.events().iter().find_map(|e| match e {
            Event::Started { label: l, queue, .. } if l == label => Some(*queue),
            _ => None,
        })
    }

    pub fn started_labels(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| match e {
                Event::Started { label, .. } => Some(label.clone()),
                _ => None,
            })
            .collect()
    }
}
