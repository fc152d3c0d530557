mod common;

use std::time::Duration;

use common::{Harness, Recorder, TestResult, init_tracing, props, resources};
use depflow::dag::TaskProperties;
use depflow::types::QueueKind;

fn network_props(label: &str) -> TaskProperties {
    TaskProperties::builder().label(label).network_task().build()
}

#[test]
fn network_task_bypasses_general_backlog_with_two_threads() -> TestResult {
    init_tracing();
    let h = Harness::start(2);
    let s = &h.scheduler;
    let r = resources(s, &["g0", "g1", "g2", "g3", "g4", "g5", "g6", "g7"]);
    let rec = Recorder::new();

    for (i, res) in r.iter().enumerate() {
        let label = format!("g{i}");
        s.create(props(&label, &[], &[res]), rec.body(&label, Duration::from_millis(40)))?;
    }
    s.create(network_props("send"), rec.body("send", Duration::ZERO))?;

    let (result, reports) = h.finish();
    result?;

    assert_eq!(rec.queue_of("send"), Some(QueueKind::Network));
    assert!(rec.started_at("send").unwrap() < rec.finished_at("g7").unwrap());
    for i in 0..8 {
        assert_eq!(rec.queue_of(&format!("g{i}")), Some(QueueKind::General));
    }

    let network = reports.iter().find(|w| w.queue == QueueKind::Network).unwrap();
    assert_eq!(network.jobs_run, 1);
    Ok(())
}

#[test]
fn network_task_uses_general_queue_with_one_thread() -> TestResult {
    init_tracing();
    let h = Harness::start(1);
    let s = &h.scheduler;
    let r = resources(s, &["g"]);
    let rec = Recorder::new();

    s.create(props("g", &[], &[&r[0]]), rec.body("g", Duration::from_millis(10)))?;
    s.create(network_props("send"), rec.body("send", Duration::ZERO))?;

    let (result, reports) = h.finish();
    result?;

    assert_eq!(rec.queue_of("send"), Some(QueueKind::General));
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].queue, QueueKind::General);
    assert_eq!(reports[0].jobs_run, 2);
    Ok(())
}

#[test]
fn general_work_never_lands_on_the_network_worker() -> TestResult {
    init_tracing();
    let h = Harness::start(3);
    let s = &h.scheduler;
    let rec = Recorder::new();

    for i in 0..10 {
        let label = format!("t{i}");
        s.create(props(&label, &[], &[]), rec.body(&label, Duration::from_millis(2)))?;
    }

    let (result, reports) = h.finish();
    result?;

    for i in 0..10 {
        assert_eq!(rec.queue_of(&format!("t{i}")), Some(QueueKind::General));
    }
    let network = reports.iter().find(|w| w.queue == QueueKind::Network).unwrap();
    assert_eq!(network.jobs_run, 0);
    Ok(())
}
