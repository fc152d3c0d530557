mod common;

use std::time::Duration;

use common::TestResult;
use depflow::comm::{LoopbackTransport, Transport, TransportError};
use depflow::device::{from_bytes, to_bytes};

#[test]
fn messages_with_one_tag_match_in_send_order() -> TestResult {
    let world = LoopbackTransport::world(2, Duration::from_millis(2))?;
    let (a, b) = (&world[0], &world[1]);

    let s1 = a.isend(1, 7, vec![1])?;
    let s2 = a.isend(1, 7, vec![2])?;
    let r1 = b.irecv(0, 7)?;
    let r2 = b.irecv(0, 7)?;

    s1.wait()?;
    s2.wait()?;
    r1.wait()?;
    r2.wait()?;
    assert_eq!(r1.take_payload(), Some(vec![1]));
    assert_eq!(r2.take_payload(), Some(vec![2]));
    assert_eq!(r1.take_payload(), None);
    Ok(())
}

#[test]
fn tags_keep_messages_apart() -> TestResult {
    let world = LoopbackTransport::world(2, Duration::ZERO)?;
    let left = world[1].irecv(0, 0)?;
    let right = world[1].irecv(0, 1)?;

    world[0].isend(1, 1, to_bytes(&[2.5f64]))?.wait()?;
    right.wait()?;
    assert!(!left.test()?);

    world[0].isend(1, 0, to_bytes(&[-1.0f64]))?.wait()?;
    left.wait()?;

    let got: Vec<f64> = from_bytes(&right.take_payload().unwrap_or_default()).unwrap_or_default();
    assert_eq!(got, vec![2.5]);
    Ok(())
}

#[test]
fn receive_posted_before_send_still_matches() -> TestResult {
    let world = LoopbackTransport::world(1, Duration::from_millis(5))?;
    let recv = world[0].irecv(0, 3)?;
    assert!(!recv.test()?);
    world[0].isend(0, 3, vec![9, 9])?;
    recv.wait()?;
    assert_eq!(recv.take_payload(), Some(vec![9, 9]));
    Ok(())
}

#[test]
fn unknown_rank_is_rejected() -> TestResult {
    let world = LoopbackTransport::world(2, Duration::ZERO)?;
    assert_eq!(
        world[0].isend(5, 0, Vec::new()).unwrap_err(),
        TransportError::NoSuchRank { rank: 5, size: 2 }
    );
    assert!(world[1].irecv(2, 0).is_err());
    Ok(())
}

#[test]
fn byte_codec_rejects_partial_elements() {
    assert_eq!(from_bytes::<u32>(&[1, 0, 0, 0, 2, 0, 0, 0]), Some(vec![1, 2]));
    assert_eq!(from_bytes::<u32>(&[1, 0, 0]), None);
}
