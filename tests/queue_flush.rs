//! Overflow behaviour of the input queue.

use bulkio::{InputPort, PortConfig, PrecisionUtcTime, QueueDepth, SriChangeFlags, Wait, sri};
use proptest::prelude::*;

fn port(depth: usize) -> InputPort<Vec<i32>> {
    let config = PortConfig { max_queue_depth: QueueDepth::Limited(depth), ..Default::default() };
    InputPort::with_config("dataLong_in", &config)
}

fn t0() -> PrecisionUtcTime {
    PrecisionUtcTime::new(1.0e9, 0.0)
}

#[test]
fn overflow_keeps_latest_packet() {
    let port = port(1);
    port.push_sri(sri::create("s1", 1.0));
    port.push_packet(vec![1], t0(), false, "s1");
    port.push_packet(vec![2], t0(), false, "s1");

    assert_eq!(port.queue_depth(), 1);
    let packet = port.get_packet(Wait::NonBlocking).unwrap();
    assert_eq!(packet.buffer, vec![2]);
    assert!(packet.input_queue_flushed);
}

#[test]
fn eos_survives_flush_ahead_of_new_packet() {
    let port = port(2);
    port.push_sri(sri::create("a", 1.0));
    port.push_sri(sri::create("b", 1.0));
    port.push_packet(vec![1, 2, 3], t0(), true, "a");
    port.push_packet(vec![4, 5, 6], t0(), false, "b");
    port.push_packet(vec![7, 8, 9], t0(), false, "b");

    let eos = port.get_packet(Wait::NonBlocking).unwrap();
    assert_eq!(eos.stream_id, "a");
    assert!(eos.eos);
    assert!(eos.buffer.is_empty());
    assert!(eos.input_queue_flushed);

    let latest = port.get_packet(Wait::NonBlocking).unwrap();
    assert_eq!(latest.buffer, vec![7, 8, 9]);
    assert!(latest.input_queue_flushed);
}

#[test]
fn flush_leaves_eos_markers_and_newest_packet() {
    let port = port(3);
    port.push_packet(vec![1], t0(), true, "a");
    port.push_packet(vec![2], t0(), false, "b");
    port.push_packet(vec![3], t0(), false, "b");
    port.push_packet(vec![4], t0(), false, "b");

    assert_eq!(port.queue_depth(), 2);
    let marker = port.get_packet(Wait::NonBlocking).unwrap();
    assert!(marker.eos && marker.buffer.is_empty());
    assert_eq!(port.get_packet(Wait::NonBlocking).unwrap().buffer, vec![4]);
}

#[test]
fn sri_change_survives_flush() {
    let port = port(2);
    port.push_sri(sri::create("s1", 1.0));
    port.push_packet(vec![1], t0(), false, "s1");
    port.get_packet(Wait::NonBlocking).unwrap();

    let mut changed = sri::create("s1", 1.0);
    changed.xstart = 5.0;
    port.push_sri(changed);
    port.push_packet(vec![2], t0(), false, "s1");
    port.push_packet(vec![3], t0(), false, "s1");
    port.push_packet(vec![4], t0(), false, "s1");

    let packet = port.get_packet(Wait::NonBlocking).unwrap();
    assert_eq!(packet.buffer, vec![4]);
    assert!(packet.sri_changed);
    assert!(packet.sri_change_flags.contains(SriChangeFlags::XSTART));
    assert_eq!(packet.sri.xstart, 5.0);
}

#[test]
fn stream_reader_reports_flush() {
    let port = port(2);
    port.push_packet(vec![1; 4], t0(), false, "s1");
    port.push_packet(vec![2; 4], t0(), false, "s1");
    port.push_packet(vec![3; 4], t0(), false, "s1");

    let mut stream = port.get_stream("s1").unwrap();
    let block = stream.read().unwrap();
    assert_eq!(block.buffer, vec![3; 4]);
    assert!(block.input_queue_flushed);
    assert!(block.sri_changed);
}

#[test]
fn unlimited_queue_never_flushes() {
    let config = PortConfig { max_queue_depth: QueueDepth::Unlimited, ..Default::default() };
    let port = InputPort::<Vec<i32>>::with_config("dataLong_in", &config);
    for value in 0..1000 {
        port.push_packet(vec![value], t0(), false, "s1");
    }
    assert_eq!(port.queue_depth(), 1000);
    assert!(!port.get_packet(Wait::NonBlocking).unwrap().input_queue_flushed);
}

proptest! {
    #[test]
    fn queue_never_exceeds_depth_without_eos(depth in 1usize..8, pushes in 1usize..40) {
        let port = port(depth);
        for value in 0..pushes {
            port.push_packet(vec![value as i32], t0(), false, "s1");
            prop_assert!(port.queue_depth() <= depth);
        }
        let mut last = None;
        while let Some(packet) = port.get_packet(Wait::NonBlocking) {
            last = Some(packet);
        }
        let last = last.unwrap();
        prop_assert_eq!(last.buffer, vec![pushes as i32 - 1]);
        prop_assert_eq!(last.input_queue_flushed, pushes > depth && (pushes - 1) % depth == 0);
    }

    #[test]
    fn per_stream_order_is_preserved(streams in proptest::collection::vec(0u8..3, 1..60)) {
        let config = PortConfig { max_queue_depth: QueueDepth::Unlimited, ..Default::default() };
        let port = InputPort::<Vec<i32>>::with_config("dataLong_in", &config);
        for (index, stream) in streams.iter().enumerate() {
            port.push_packet(vec![index as i32], t0(), false, &format!("s{stream}"));
        }
        for stream in 0u8..3 {
            let Some(mut cursor) = port.get_stream(&format!("s{stream}")) else { continue };
            let mut seen = Vec::new();
            while let Some(block) = cursor.try_read() {
                seen.extend(block.buffer);
            }
            let expected: Vec<i32> = streams
                .iter()
                .enumerate()
                .filter(|(_, s)| **s == stream)
                .map(|(index, _)| index as i32)
                .collect();
            prop_assert_eq!(seen, expected);
        }
    }
}
