mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::{Harness, Recorder, TestResult, init_tracing, props, resources};
use depflow::engine::Completion;
use depflow::errors::{BackendFailure, SchedError};
use depflow::types::TaskState;

/// Completes once a shared flag is raised.
struct Flag(Arc<AtomicBool>);

impl Completion for Flag {
    fn poll(&mut self) -> Result<bool, BackendFailure> {
        Ok(self.0.load(Ordering::Acquire))
    }
}

struct Broken;

impl Completion for Broken {
    fn poll(&mut self) -> Result<bool, BackendFailure> {
        Err(BackendFailure::Transport("peer vanished".into()))
    }
}

#[test]
fn deferred_task_frees_its_worker() -> TestResult {
    init_tracing();
    // One worker: the releasing task can only run if the deferring task's
    // body gave the worker back.
    let h = Harness::start(1);
    let s = &h.scheduler;
    let r = resources(s, &["a", "b", "c"]);
    let rec = Recorder::new();
    let flag = Arc::new(AtomicBool::new(false));

    let waiting = {
        let flag = Arc::clone(&flag);
        s.create(props("waiting", &[], &[&r[0]]), move |ctx| {
            ctx.complete_when(Flag(flag))
        })?
    };
    let release = {
        let flag = Arc::clone(&flag);
        s.create(props("release", &[], &[&r[1]]), move |_| {
            flag.store(true, Ordering::Release);
            Ok(())
        })?
    };
    s.create(props("dependent", &[&r[0]], &[]), rec.body("dependent", Duration::ZERO))?;

    let scheduler = Arc::clone(s);
    let (result, _) = h.finish();
    result?;

    assert_eq!(scheduler.state_of(waiting), Some(TaskState::Done));
    assert_eq!(scheduler.state_of(release), Some(TaskState::Done));
    assert_eq!(rec.started_labels(), vec!["dependent".to_string()]);
    Ok(())
}

#[test]
fn dependents_wait_for_the_deferred_completion() -> TestResult {
    init_tracing();
    let h = Harness::start(3);
    let s = &h.scheduler;
    let r = resources(s, &["a"]);
    let rec = Recorder::new();
    let flag = Arc::new(AtomicBool::new(false));

    let waiting = {
        let flag = Arc::clone(&flag);
        s.create(props("waiting", &[], &[&r[0]]), move |ctx| {
            ctx.complete_when(Flag(flag))
        })?
    };
    s.create(props("reader", &[&r[0]], &[]), rec.body("reader", Duration::ZERO))?;

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(s.state_of(waiting), Some(TaskState::Running));
    assert!(rec.started_at("reader").is_none());

    flag.store(true, Ordering::Release);
    let (result, _) = h.finish();
    result?;
    assert!(rec.started_at("reader").is_some());
    Ok(())
}

#[test]
fn failed_completion_aborts_the_run() {
    init_tracing();
    let h = Harness::start(2);
    let s = &h.scheduler;
    s.create(props("broken", &[], &[]), |ctx| ctx.complete_when(Broken))
        .unwrap();

    let (result, _) = h.finish();
    match result {
        Err(SchedError::Backend(BackendFailure::Transport(msg))) => {
            assert!(msg.contains("peer vanished"))
        }
        other => panic!("expected transport failure, got {other:?}"),
    }
}

#[test]
fn body_may_defer_more_than_once() -> TestResult {
    init_tracing();
    let h = Harness::start(2);
    let s = &h.scheduler;

    let outcome = Arc::new(std::sync::Mutex::new(None));
    let out = Arc::clone(&outcome);
    s.create(props("twice", &[], &[]), move |ctx| {
        ctx.complete_when(Flag(Arc::new(AtomicBool::new(true))))?;
        let second = ctx.complete_when(Flag(Arc::new(AtomicBool::new(true))));
        *out.lock().unwrap() = Some(second.is_ok());
        Ok(())
    })?;

    let (result, _) = h.finish();
    result?;
    // A second deferral while still running is allowed; both must confirm.
    assert_eq!(*outcome.lock().unwrap(), Some(true));
    Ok(())
}

#[test]
fn panicking_body_is_reported() {
    init_tracing();
    let h = Harness::start(2);
    let s = &h.scheduler;
    s.create(props("boom", &[], &[]), |_| panic!("kaboom"))
        .unwrap();

    let (result, _) = h.finish();
    match result {
        Err(SchedError::TaskPanicked { label, message, .. }) => {
            assert_eq!(label, "boom");
            assert_eq!(message, "kaboom");
        }
        other => panic!("expected TaskPanicked, got {other:?}"),
    }
}
