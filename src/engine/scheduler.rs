// src/engine/scheduler.rs

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, Thread};
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use crate::dag::{Job, StateManager, TaskBody, TaskProperties, dot};
use crate::engine::context::{Completion, TaskContext};
use crate::engine::queue::JobQueues;
use crate::errors::{Result, SchedError};
use crate::resource::ResourceRegistry;
use crate::types::{QueueKind, TaskId, TaskState, WorkerId};

/// Knobs that do not affect correctness.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Dump the precedence graph after every refresh.
    pub write_graph: bool,
    /// Directory receiving `step_<n>.dot` files.
    pub graph_dir: PathBuf,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            write_graph: false,
            graph_dir: PathBuf::from("graphs"),
        }
    }
}

/// A worker thread's registration: which queue it serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerHandle {
    pub id: WorkerId,
    pub queue: QueueKind,
}

#[derive(Debug)]
struct WorkerSlot {
    handle: WorkerHandle,
    thread: Thread,
}

/// Snapshot of scheduler counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerStats {
    pub created: u64,
    pub done: u64,
    pub active: usize,
    pub queued_general: usize,
    pub queued_network: usize,
    pub edges: usize,
}

/// The resource-dependency task scheduler.
///
/// One explicitly constructed instance per run, shared as
/// `Arc<Scheduler>` between the submitting code and the worker threads.
/// It owns:
/// - the task table and precedence graph (behind the space lock)
/// - the ready queues (behind the queue lock; lock order is queues → space)
/// - the freshness flag that lets concurrent refills skip redundant work
/// - the registered workers, so they can be woken on new work
pub struct Scheduler {
    space: Mutex<StateManager>,
    queues: Mutex<JobQueues>,
    /// `true` while the queues reflect the graph. Cleared on every creation
    /// and completion, checked-and-set by the refill path.
    uptodate: AtomicBool,
    workers: Mutex<Vec<WorkerSlot>>,
    network_workers: AtomicUsize,
    resources: ResourceRegistry,
    options: SchedulerOptions,
    dump_step: AtomicU64,
    aborted: AtomicBool,
    failure: Mutex<Option<SchedError>>,
    /// Signalled (with the space lock) whenever tasks finish or the run aborts.
    idle: Condvar,
}

impl Scheduler {
    pub fn new(options: SchedulerOptions) -> Self {
        Self {
            space: Mutex::new(StateManager::new()),
            queues: Mutex::new(JobQueues::new()),
            uptodate: AtomicBool::new(true),
            workers: Mutex::new(Vec::new()),
            network_workers: AtomicUsize::new(0),
            resources: ResourceRegistry::new(),
            options,
            dump_step: AtomicU64::new(0),
            aborted: AtomicBool::new(false),
            failure: Mutex::new(None),
            idle: Condvar::new(),
        }
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Submit a top-level task. Returns as soon as it is registered.
    pub fn create<F>(&self, props: TaskProperties, body: F) -> Result<TaskId>
    where
        F: FnOnce(&TaskContext<'_>) -> Result<()> + Send + 'static,
    {
        self.insert(props, Box::new(body), None)
    }

    pub(crate) fn insert(
        &self,
        props: TaskProperties,
        body: TaskBody,
        parent: Option<TaskId>,
    ) -> Result<TaskId> {
        if self.is_aborted() {
            return Err(SchedError::Aborted(format!(
                "cannot create '{}' after the run was aborted",
                props.label
            )));
        }

        let id = lock(&self.space).insert(props, body, parent)?;
        self.mark_stale();
        self.wake_workers();
        Ok(id)
    }

    /// Bind the calling thread to `queue`.
    ///
    /// The scheduler never creates threads; whoever runs the worker loop
    /// registers here first.
    pub fn register_worker(&self, queue: QueueKind) -> WorkerHandle {
        let mut workers = lock(&self.workers);
        let handle = WorkerHandle {
            id: WorkerId(workers.len()),
            queue,
        };
        workers.push(WorkerSlot {
            handle,
            thread: thread::current(),
        });
        if queue == QueueKind::Network {
            self.network_workers.fetch_add(1, Ordering::AcqRel);
        }
        info!(worker = %handle.id, queue = %queue, "worker registered");
        handle
    }

    /// Number of registered scheduling threads.
    pub fn thread_count(&self) -> usize {
        lock(&self.workers).len()
    }

    /// Network-tagged work only gets its own queue when a dedicated worker
    /// serves it and there is at least one other thread for the rest.
    fn routes_to_network_queue(&self) -> bool {
        self.network_workers.load(Ordering::Acquire) > 0 && self.thread_count() > 1
    }

    /// Hand one ready job to `worker`, or `None` if there is nothing to do
    /// right now. Never blocks waiting for work.
    pub fn get_job(&self, worker: &WorkerHandle) -> Option<Job> {
        if self.is_aborted() {
            return None;
        }

        let mut queues = lock(&self.queues);

        self.poll_deferred();

        if queues.is_empty(worker.queue) {
            self.update_queues(&mut queues);
        }

        let job = queues.pop(worker.queue);
        if let Some(ref job) = job {
            trace!(worker = %worker.id, task = %job.id, label = %job.label(), "handing out job");
        }
        job
    }

    /// Refresh the queues from the graph if anything changed since the last
    /// refresh. Caller holds the queue lock.
    fn update_queues(&self, queues: &mut JobQueues) {
        if self.is_aborted() {
            return;
        }
        let was_current = self.uptodate.swap(true, Ordering::AcqRel);
        if was_current {
            return;
        }

        let network_queue = self.routes_to_network_queue();
        let mut space = lock(&self.space);
        let mut update = space.update_graph();

        for id in &update.newly_ready {
            let Some(job) = space.take_job(*id) else {
                continue;
            };
            let queue = if job.props.is_network_task() && network_queue {
                QueueKind::Network
            } else {
                QueueKind::General
            };
            debug!(task = %id, label = %job.label(), queue = %queue, "task ready");
            queues.push(queue, job);
        }

        if self.options.write_graph {
            let step = self.dump_step.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = dot::write_step(&space, &self.options.graph_dir, step) {
                warn!(error = %e, step, "failed to write precedence graph");
            }
        }

        space.prune_done(&mut update);
        if !update.is_empty() {
            trace!(
                ready = update.newly_ready.len(),
                pruned = update.pruned.len(),
                "graph updated"
            );
        }
    }

    /// Run a job on the calling worker thread.
    ///
    /// Returns `Err` only when the run has been aborted by this job; the
    /// original error is kept for [`wait_idle`](Self::wait_idle). A job that
    /// fails stays running, so its dependents are never released.
    pub fn run_job(&self, worker: &WorkerHandle, job: Job) -> Result<()> {
        let Job { id, props, body } = job;

        let marked = lock(&self.space).mark_running(id);
        if let Err(e) = marked {
            return Err(self.abort(e));
        }

        debug!(worker = %worker.id, task = %id, label = %props.label, "running task");

        let ctx = TaskContext {
            scheduler: self,
            id,
            props: &props,
            worker: worker.id,
            queue: worker.queue,
        };

        let result = match catch_unwind(AssertUnwindSafe(|| body(&ctx))) {
            Ok(result) => result,
            Err(payload) => Err(SchedError::TaskPanicked {
                task: id,
                label: props.label.clone(),
                message: panic_message(payload.as_ref()),
            }),
        };

        // A failed task never becomes done, so nothing that depends on it
        // can be released while the abort spreads.
        if let Err(e) = result {
            error!(task = %id, label = %props.label, error = %e, "task failed; aborting run");
            return Err(self.abort(e));
        }

        let finished = lock(&self.space).body_returned(id);
        match finished {
            Ok(finished) => {
                self.on_finished(&finished);
                Ok(())
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    pub(crate) fn defer(&self, id: TaskId, completion: Box<dyn Completion>) -> Result<()> {
        lock(&self.space).defer(id, completion)
    }

    /// Poll deferred completions; tasks they unblock become done.
    fn poll_deferred(&self) {
        let polled = lock(&self.space).poll_deferred();
        match polled {
            Ok(finished) => self.on_finished(&finished),
            Err(e) => {
                self.abort(e);
            }
        }
    }

    fn on_finished(&self, finished: &[TaskId]) {
        if finished.is_empty() {
            return;
        }
        self.mark_stale();
        self.wake_workers();
        self.idle.notify_all();
    }

    fn mark_stale(&self) {
        self.uptodate.store(false, Ordering::Release);
    }

    fn wake_workers(&self) {
        for slot in lock(&self.workers).iter() {
            slot.thread.unpark();
        }
    }

    /// Record the first fatal error and stop handing out work. Returns a
    /// short error for the caller that triggered the abort.
    fn abort(&self, err: SchedError) -> SchedError {
        let summary = err.to_string();
        {
            let mut failure = lock(&self.failure);
            if failure.is_none() {
                *failure = Some(err);
            }
        }
        self.aborted.store(true, Ordering::Release);
        self.wake_workers();
        // Take the space lock so a waiter between its check and its wait
        // cannot miss the notification.
        drop(lock(&self.space));
        self.idle.notify_all();
        SchedError::Aborted(summary)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Block until every created task is done.
    ///
    /// Returns the error that aborted the run, if any. Workers keep polling
    /// deferred completions; this only waits.
    pub fn wait_idle(&self) -> Result<()> {
        let mut space = lock(&self.space);
        loop {
            if self.is_aborted() {
                drop(space);
                return Err(self.take_failure());
            }
            if space.all_done() {
                return Ok(());
            }
            space = self
                .idle
                .wait_timeout(space, Duration::from_millis(10))
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    /// Block until task `id` is done.
    ///
    /// Returns the error that aborted the run, if any.
    pub fn wait_task(&self, id: TaskId) -> Result<()> {
        let mut space = lock(&self.space);
        loop {
            if self.is_aborted() {
                drop(space);
                return Err(self.take_failure());
            }
            match space.state_of(id) {
                Some(TaskState::Done) => return Ok(()),
                Some(_) => {}
                None => {
                    return Err(SchedError::Invariant(format!(
                        "waiting on task {id}, which was never created"
                    )));
                }
            }
            space = self
                .idle
                .wait_timeout(space, Duration::from_millis(10))
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    fn take_failure(&self) -> SchedError {
        lock(&self.failure)
            .take()
            .unwrap_or_else(|| SchedError::Aborted("run was aborted".to_string()))
    }

    /// Tasks not yet done, with their labels and states.
    pub fn active_tasks(&self) -> Vec<(TaskId, String, TaskState)> {
        lock(&self.space).active_tasks()
    }

    /// Current state of a task; pruned tasks report `Done`.
    pub fn state_of(&self, id: TaskId) -> Option<TaskState> {
        lock(&self.space).state_of(id)
    }

    pub fn stats(&self) -> SchedulerStats {
        let queues = lock(&self.queues);
        let space = lock(&self.space);
        SchedulerStats {
            created: space.created_total(),
            done: space.done_total(),
            active: space.active_count(),
            queued_general: queues.len(QueueKind::General),
            queued_network: queues.len(QueueKind::Network),
            edges: space.graph().edge_count(),
        }
    }

    /// Whether `earlier` must finish before `later` may start, i.e. the graph
    /// holds an edge between them. Only meaningful while both are active.
    pub fn has_edge(&self, earlier: TaskId, later: TaskId) -> bool {
        lock(&self.space).graph().edge(earlier, later).is_some()
    }

    /// Render the current precedence graph as DOT.
    pub fn render_graph(&self) -> String {
        dot::render(&lock(&self.space))
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerOptions::default())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("stats", &self.stats())
            .field("options", &self.options)
            .field("aborted", &self.is_aborted())
            .finish_non_exhaustive()
    }
}

/// Lock ignoring poisoning: task panics are caught before they can unwind
/// through a guard, and the protected state stays consistent.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
