mod common;

use std::time::Duration;

use common::{Harness, Recorder, TestResult, init_tracing, props, resources};
use depflow::dag::{StateManager, TaskBody, TaskProperties};
use depflow::engine::{Scheduler, TaskContext};
use depflow::errors::SchedError;
use depflow::resource::{Conflict, ResourceRegistry};
use depflow::types::{QueueKind, TaskId, TaskState};

fn noop() -> TaskBody {
    Box::new(|_: &TaskContext<'_>| Ok(()))
}

#[test]
fn write_then_read_is_ordered_and_unrelated_write_is_not() -> TestResult {
    init_tracing();
    let h = Harness::start(3);
    let s = &h.scheduler;
    let r = resources(s, &["R1", "R2"]);
    let rec = Recorder::new();

    let t1 = s.create(props("T1", &[], &[&r[0]]), rec.body("T1", Duration::from_millis(40)))?;
    let t2 = s.create(props("T2", &[&r[0]], &[]), rec.body("T2", Duration::ZERO))?;
    let t3 = s.create(props("T3", &[], &[&r[1]]), rec.body("T3", Duration::ZERO))?;

    assert!(s.has_edge(t1, t2));
    assert!(!s.has_edge(t1, t3));
    assert!(!s.has_edge(t2, t3));

    let (result, _) = h.finish();
    result?;

    assert!(rec.finished_before_started("T1", "T2"));
    // T3 does not wait for T1.
    assert!(rec.started_at("T3").unwrap() < rec.finished_at("T1").unwrap());
    Ok(())
}

#[test]
fn conflicting_tasks_run_in_declaration_order() -> TestResult {
    init_tracing();
    let h = Harness::start(4);
    let s = &h.scheduler;
    let r = resources(s, &["counter"]);
    let rec = Recorder::new();

    let labels: Vec<String> = (0..20).map(|i| format!("w{i}")).collect();
    for label in &labels {
        s.create(props(label, &[], &[&r[0]]), rec.body(label, Duration::from_millis(1)))?;
    }

    let (result, _) = h.finish();
    result?;

    assert_eq!(rec.started_labels(), labels);
    for pair in labels.windows(2) {
        assert!(rec.finished_before_started(&pair[0], &pair[1]));
    }
    Ok(())
}

#[test]
fn readers_of_one_resource_share_it() -> TestResult {
    init_tracing();
    let h = Harness::start(3);
    let s = &h.scheduler;
    let r = resources(s, &["field"]);
    let rec = Recorder::new();

    let a = s.create(props("A", &[&r[0]], &[]), rec.body("A", Duration::from_millis(80)))?;
    let b = s.create(props("B", &[&r[0]], &[]), rec.body("B", Duration::from_millis(80)))?;
    assert!(!s.has_edge(a, b));

    let (result, _) = h.finish();
    result?;
    assert!(rec.overlapped("A", "B"));
    Ok(())
}

#[test]
fn graph_update_is_idempotent() -> TestResult {
    let registry = ResourceRegistry::new();
    let r1 = registry.register("R1");
    let r2 = registry.register("R2");

    let mut space = StateManager::new();
    let t1 = space.insert(props("T1", &[], &[&r1]), noop(), None)?;
    let t2 = space.insert(props("T2", &[&r1], &[]), noop(), None)?;
    let t3 = space.insert(props("T3", &[], &[&r2]), noop(), None)?;

    assert_eq!(space.graph().edge(t1, t2), Some(Conflict::ReadAfterWrite));
    assert_eq!(space.graph().edge_count(), 1);

    let first = space.update_graph();
    assert_eq!(first.newly_ready, vec![t1, t3]);

    let again = space.update_graph();
    assert!(again.is_empty());
    assert_eq!(space.graph().edge_count(), 1);
    assert_eq!(space.state_of(t2), Some(TaskState::Pending));

    space.mark_running(t1)?;
    let done = space.body_returned(t1)?;
    assert_eq!(done, vec![t1]);

    let next = space.update_graph();
    assert_eq!(next.newly_ready, vec![t2]);
    Ok(())
}

#[test]
fn done_tasks_are_pruned_and_stop_creating_edges() -> TestResult {
    let registry = ResourceRegistry::new();
    let r = registry.register("R");

    let mut space = StateManager::new();
    let t1 = space.insert(props("T1", &[], &[&r]), noop(), None)?;
    space.update_graph();
    space.mark_running(t1)?;
    space.body_returned(t1)?;

    let mut update = space.update_graph();
    space.prune_done(&mut update);
    assert_eq!(update.pruned, vec![t1]);
    assert!(!space.graph().contains(t1));
    assert_eq!(space.state_of(t1), Some(TaskState::Done));

    let t2 = space.insert(props("T2", &[], &[&r]), noop(), None)?;
    assert_eq!(space.graph().edge_count(), 0);
    assert_eq!(space.update_graph().newly_ready, vec![t2]);
    assert_eq!(space.state_of(TaskId(99)), None);
    Ok(())
}

#[test]
fn state_never_moves_backwards() -> TestResult {
    let registry = ResourceRegistry::new();
    let r = registry.register("R");

    let mut space = StateManager::new();
    let t = space.insert(TaskProperties::builder().label("T").write(&r).build(), noop(), None)?;
    space.update_graph();
    space.mark_running(t)?;

    let err = space.mark_running(t).unwrap_err();
    assert!(matches!(err, SchedError::Invariant(_)));
    Ok(())
}

#[test]
fn failed_task_never_releases_its_dependents() -> TestResult {
    let s = Scheduler::default();
    let r = resources(&s, &["R"]);
    let worker = s.register_worker(QueueKind::General);

    let producer = s.create(props("producer", &[], &[&r[0]]), |_| {
        Err(SchedError::Invariant("bad input".into()))
    })?;
    let consumer = s.create(props("consumer", &[&r[0]], &[]), |_| Ok(()))?;

    let job = s.get_job(&worker).expect("producer should be ready");
    assert_eq!(job.id, producer);
    assert!(matches!(s.run_job(&worker, job), Err(SchedError::Aborted(_))));

    assert_eq!(s.state_of(producer), Some(TaskState::Running));
    assert_eq!(s.state_of(consumer), Some(TaskState::Pending));
    assert!(s.get_job(&worker).is_none());
    assert!(matches!(s.wait_idle(), Err(SchedError::Invariant(_))));
    Ok(())
}

#[test]
fn failed_task_dependents_stay_unrun_on_a_pool() -> TestResult {
    init_tracing();
    for _ in 0..20 {
        let h = Harness::start(4);
        let s = &h.scheduler;
        let r = resources(s, &["R"]);
        let rec = Recorder::new();

        s.create(props("producer", &[], &[&r[0]]), |_| {
            Err(SchedError::Invariant("bad input".into()))
        })?;
        s.create(props("consumer", &[&r[0]], &[]), rec.body("consumer", Duration::ZERO))?;

        let (result, _) = h.finish();
        assert!(result.is_err());
        assert_eq!(rec.started_at("consumer"), None);
    }
    Ok(())
}
