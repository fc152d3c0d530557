mod common;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use common::{Harness, TestResult, init_tracing, props};
use depflow::comm::{Exchange, LoopbackTransport, SharedTransport, Transport, receive, send};
use depflow::device::{Layout, SharedStream, SimStream, from_bytes, to_bytes};
use depflow::engine::{Scheduler, WorkerHandle};
use depflow::types::{QueueKind, TaskState};

/// One handed-out job: the queue it came from, its label, its network hint.
type Step = (QueueKind, String, bool);

/// Step a scheduler by hand with one general and one network worker, both
/// on the calling thread, until every task is done.
fn drive(s: &Scheduler) -> Vec<Step> {
    let general = s.register_worker(QueueKind::General);
    let network = s.register_worker(QueueKind::Network);
    let workers: [WorkerHandle; 2] = [general, network];
    let deadline = Instant::now() + Duration::from_secs(5);

    let mut log = Vec::new();
    while s.stats().active > 0 {
        assert!(Instant::now() < deadline, "stuck with {:?}", s.active_tasks());
        for w in &workers {
            if let Some(job) = s.get_job(w) {
                log.push((w.queue, job.props.label.clone(), job.props.is_network_task()));
                s.run_job(w, job).unwrap();
            }
        }
        thread::yield_now();
    }
    log
}

fn labels(log: &[Step]) -> Vec<&str> {
    log.iter().map(|(_, label, _)| label.as_str()).collect()
}

fn world(latency: Duration) -> Vec<SharedTransport> {
    LoopbackTransport::world(2, latency)
        .unwrap()
        .into_iter()
        .map(|t| Arc::new(t) as SharedTransport)
        .collect()
}

fn stream() -> SharedStream {
    SimStream::shared("s0", Duration::ZERO).unwrap()
}

#[test]
fn double_buffered_send_stages_through_the_double_buffer() -> TestResult {
    init_tracing();
    let s = Scheduler::default();
    let ranks = world(Duration::ZERO);
    let ex = Arc::new(Exchange::<f64>::new(s.resources(), "halo", 1, 7, Layout::linear(3), true));
    ex.device_buffer().fill_from(&[1.0, 2.0, 3.0])?;

    send(&s, &ex, &ranks[0], &stream())?;
    let log = drive(&s);

    assert_eq!(
        labels(&log),
        vec![
            "copyDeviceToDevice",
            "exchange send",
            "copyDeviceToHost",
            "exchange transmit",
            "exchange wait",
        ]
    );
    for (queue, label, network) in &log {
        let on_network = label == "exchange transmit" || label == "exchange wait";
        assert_eq!(*network, on_network, "{label}");
        let expected = if on_network { QueueKind::Network } else { QueueKind::General };
        assert_eq!(*queue, expected, "{label}");
    }

    let got = ranks[1].irecv(0, 7)?;
    got.wait()?;
    let values: Vec<f64> = from_bytes(&got.take_payload().unwrap()).unwrap();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);
    Ok(())
}

#[test]
fn single_buffered_send_copies_straight_to_host() -> TestResult {
    let s = Scheduler::default();
    let ranks = world(Duration::ZERO);
    let ex = Arc::new(Exchange::<u32>::new(s.resources(), "halo", 1, 0, Layout::linear(2), false));
    ex.device_buffer().fill_from(&[4, 5])?;

    send(&s, &ex, &ranks[0], &stream())?;
    let log = drive(&s);

    assert_eq!(
        labels(&log),
        vec!["exchange send", "copyDeviceToHost", "exchange transmit", "exchange wait"]
    );
    assert!(ex.double_buffer().is_none());
    Ok(())
}

#[test]
fn receive_unpacks_and_uploads_through_the_double_buffer() -> TestResult {
    let s = Scheduler::default();
    let ranks = world(Duration::ZERO);
    let ex = Arc::new(Exchange::<f64>::new(s.resources(), "halo", 0, 3, Layout::linear(4), true));

    ranks[0].isend(1, 3, to_bytes(&[9.0f64, 8.0]))?;
    receive(&s, &ex, &ranks[1], &stream())?;
    let log = drive(&s);

    assert_eq!(
        labels(&log),
        vec![
            "exchange receive",
            "exchange post receive",
            "exchange wait",
            "exchange unpack",
            "copyHostToDevice",
            "copyDeviceToDevice",
        ]
    );
    let network: Vec<&str> = log
        .iter()
        .filter(|(queue, _, hint)| *queue == QueueKind::Network && *hint)
        .map(|(_, label, _)| label.as_str())
        .collect();
    assert_eq!(network, vec!["exchange post receive", "exchange wait"]);

    // Only the received prefix is valid.
    assert_eq!(ex.device_buffer().current_size()?, [2, 1, 1]);
    assert_eq!(&ex.device_buffer().to_vec()?[..2], &[9.0, 8.0]);
    Ok(())
}

/// Start a send with slow delivery, then a task that overwrites the working
/// device buffer. Returns how long the writer waited and whether the send
/// was still in flight when it ran.
fn writer_delay(double_buffer: bool) -> Result<(Duration, bool), Box<dyn std::error::Error>> {
    let latency = Duration::from_millis(300);
    let h = Harness::start(3);
    let s = Arc::clone(&h.scheduler);
    let ranks = world(latency);
    let ex = Arc::new(Exchange::<f64>::new(
        s.resources(),
        "halo",
        1,
        0,
        Layout::linear(4),
        double_buffer,
    ));

    let start = Instant::now();
    let parent = send(s.as_ref(), &ex, &ranks[0], &stream())?;

    let seen = Arc::new(Mutex::new(None));
    let (out, sched) = (Arc::clone(&seen), Arc::clone(&s));
    let writer = s.create(
        props("compute", &[], &[ex.device_buffer().data_resource()]),
        move |_| {
            let in_flight = sched.state_of(parent) != Some(TaskState::Done);
            *out.lock().unwrap() = Some((start.elapsed(), in_flight));
            Ok(())
        },
    )?;

    s.wait_task(writer)?;
    s.wait_task(parent)?;
    assert!(start.elapsed() >= latency, "send finished before delivery");

    let (result, _) = h.finish();
    result?;
    let observed = seen.lock().unwrap().take();
    Ok(observed.expect("writer ran"))
}

#[test]
fn double_buffer_frees_the_working_buffer_during_a_send() -> TestResult {
    init_tracing();
    let (waited, in_flight) = writer_delay(true)?;
    assert!(waited < Duration::from_millis(150), "writer waited {waited:?}");
    assert!(in_flight);
    Ok(())
}

#[test]
fn without_double_buffer_the_writer_waits_for_the_send() -> TestResult {
    let (waited, in_flight) = writer_delay(false)?;
    assert!(waited >= Duration::from_millis(300), "writer waited {waited:?}");
    assert!(!in_flight);
    Ok(())
}
