mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{Harness, Recorder, TestResult, init_tracing, props, resources};
use depflow::dag::TaskProperties;
use depflow::errors::SchedError;
use depflow::resource::{AccessSet, ResourceRegistry, assert_superset, is_superset};

#[test]
fn child_asking_for_more_than_parent_is_rejected_immediately() -> TestResult {
    init_tracing();
    let h = Harness::start(2);
    let s = &h.scheduler;
    let r = resources(s, &["R1", "R2"]);

    let seen: Arc<Mutex<Option<SchedError>>> = Arc::new(Mutex::new(None));
    let out = Arc::clone(&seen);
    let r2 = r[1].clone();
    s.create(props("outer", &[&r[0]], &[]), move |ctx| {
        let attempt = ctx.create(
            TaskProperties::builder().label("inner").write(&r2).build(),
            |_| Ok(()),
        );
        *out.lock().unwrap() = attempt.err();
        Ok(())
    })?;

    let (result, _) = h.finish();
    result?;

    let err = seen.lock().unwrap().take().expect("child creation should fail");
    match err {
        SchedError::ScopingViolation {
            parent,
            child,
            trace,
            ..
        } => {
            assert_eq!(parent, "outer");
            assert_eq!(child, "inner");
            assert!(trace[0].ends_with("outer"));
        }
        other => panic!("expected ScopingViolation, got {other:?}"),
    }
    Ok(())
}

#[test]
fn propagated_violation_aborts_the_run() {
    init_tracing();
    let h = Harness::start(2);
    let s = &h.scheduler;
    let r = resources(s, &["R"]);

    let r0 = r[0].clone();
    s.create(props("reader", &[&r[0]], &[]), move |ctx| {
        ctx.create(props("writer", &[], &[&r0]), |_| Ok(()))?;
        Ok(())
    })
    .unwrap();

    let scheduler = h.scheduler.clone();
    let (result, _) = h.finish();
    assert!(scheduler.is_aborted());
    assert!(matches!(
        scheduler.create(props("late", &[], &[]), |_| Ok(())),
        Err(SchedError::Aborted(_))
    ));
    match result {
        Err(SchedError::ScopingViolation { parent, child, .. }) => {
            assert_eq!(parent, "reader");
            assert_eq!(child, "writer");
        }
        other => panic!("expected ScopingViolation, got {other:?}"),
    }
}

#[test]
fn trace_lists_enclosing_tasks_innermost_first() -> TestResult {
    init_tracing();
    let h = Harness::start(2);
    let s = &h.scheduler;
    let r = resources(s, &["R", "other"]);

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let out = Arc::clone(&seen);
    let (r0, r1) = (r[0].clone(), r[1].clone());
    s.create(props("level0", &[], &[&r[0]]), move |ctx| {
        let r0_inner = r0.clone();
        ctx.create(props("level1", &[], &[&r0]), move |ctx| {
            if let Err(SchedError::ScopingViolation { trace, .. }) =
                ctx.create(props("level2", &[&r0_inner, &r1], &[]), |_| Ok(()))
            {
                *out.lock().unwrap() = trace;
            }
            Ok(())
        })?;
        Ok(())
    })?;

    let (result, _) = h.finish();
    result?;

    let trace = seen.lock().unwrap().clone();
    assert_eq!(trace.len(), 2);
    assert!(trace[0].ends_with("level1"));
    assert!(trace[1].ends_with("level0"));
    Ok(())
}

#[test]
fn parent_is_done_only_after_its_children() -> TestResult {
    init_tracing();
    let h = Harness::start(3);
    let s = &h.scheduler;
    let r = resources(s, &["R"]);
    let rec = Recorder::new();

    let (r0, child_rec) = (r[0].clone(), rec.clone());
    s.create(props("parent", &[], &[&r[0]]), move |ctx| {
        ctx.create(
            props("child", &[], &[&r0]),
            child_rec.body("child", Duration::from_millis(50)),
        )?;
        Ok(())
    })?;
    s.create(props("after", &[&r[0]], &[]), rec.body("after", Duration::ZERO))?;

    let (result, _) = h.finish();
    result?;
    assert!(rec.finished_before_started("child", "after"));
    Ok(())
}

#[test]
fn superset_rules() {
    let registry = ResourceRegistry::new();
    let a = registry.register("a");
    let b = registry.register("b");

    let write_a: AccessSet = props("p", &[], &[&a]).access;
    let read_a: AccessSet = props("c", &[&a], &[]).access;
    let read_ab: AccessSet = props("c", &[&a, &b], &[]).access;
    let slice: AccessSet = props("c", &[], &[&a.slice(2..4)]).access;

    assert!(is_superset(&write_a, &read_a));
    assert!(is_superset(&write_a, &slice));
    assert!(!is_superset(&read_a, &write_a));
    assert!(!is_superset(&write_a, &read_ab));
    assert!(is_superset(&write_a, &AccessSet::new()));

    let err = assert_superset("p", &read_a, "c", &write_a, vec!["[0] p".into()]).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("Not allowed: p is no superset of c"));
    assert!(msg.contains("[0] p"));
}
