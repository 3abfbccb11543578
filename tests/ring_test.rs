//! Tests for the SPSC packet ring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use smartnic_agent::ring::{DescFlags, PacketDescriptor, PacketRing, RingError, RingSetupError};

fn desc(sequence: u64) -> PacketDescriptor {
    PacketDescriptor::new(0, 0, sequence, DescFlags::empty())
}

#[test]
fn test_dequeue_order_matches_enqueue_order() {
    let (mut tx, mut rx) = PacketRing::new(8, 64).unwrap().split();
    for seq in 0..5 {
        assert!(tx.try_enqueue(desc(seq)));
    }
    let got: Vec<u64> = std::iter::from_fn(|| rx.try_dequeue()).map(|d| d.sequence).collect();
    assert_eq!(got, vec![0, 1, 2, 3, 4]);
    assert!(rx.try_dequeue().is_none());
}

#[test]
fn test_full_ring_rejects_without_overwriting() {
    let (mut tx, mut rx) = PacketRing::new(4, 64).unwrap().split();
    for seq in 0..4 {
        assert!(tx.try_enqueue(desc(seq)));
    }
    assert!(tx.is_full());
    assert!(!tx.try_enqueue(desc(99)));
    assert_eq!(tx.len(), 4);

    assert_eq!(rx.try_dequeue().map(|d| d.sequence), Some(0));
    assert!(tx.try_enqueue(desc(4)));
    let rest: Vec<u64> = std::iter::from_fn(|| rx.try_dequeue()).map(|d| d.sequence).collect();
    assert_eq!(rest, vec![1, 2, 3, 4]);
}

#[test]
fn test_frame_payload_survives_wraparound() {
    let (mut tx, mut rx) = PacketRing::new(4, 128).unwrap().split();
    for round in 0u32..50 {
        let payload = format!("packet-{round}");
        let sent = tx.try_enqueue_frame(payload.as_bytes(), DescFlags::NEEDS_INFERENCE).unwrap();
        assert_eq!(sent.sequence, u64::from(round));

        let slot = rx.peek().unwrap();
        assert_eq!(slot.payload(), payload.as_bytes());
        assert!(slot.descriptor().needs_inference());
    }
    assert!(rx.peek().is_none());
}

#[test]
fn test_frame_errors_are_signals() {
    let (mut tx, mut rx) = PacketRing::new(2, 64).unwrap().split();
    assert_eq!(
        tx.try_enqueue_frame(&[0u8; 65], DescFlags::empty()),
        Err(RingError::FrameTooLarge { len: 65, max: 64 })
    );
    tx.try_enqueue_frame(b"a", DescFlags::empty()).unwrap();
    tx.try_enqueue_frame(b"b", DescFlags::empty()).unwrap();
    assert_eq!(tx.try_enqueue_frame(b"c", DescFlags::empty()), Err(RingError::Full));

    let mut out = Vec::new();
    rx.try_dequeue_frame(&mut out).unwrap();
    assert_eq!(out, b"a");
    rx.try_dequeue_frame(&mut out).unwrap();
    assert_eq!(out, b"b");
    assert_eq!(rx.try_dequeue_frame(&mut out), Err(RingError::Empty));
}

#[test]
fn test_peeked_slot_is_held_until_dropped() {
    let (mut tx, mut rx) = PacketRing::new(2, 64).unwrap().split();
    tx.try_enqueue_frame(b"x", DescFlags::empty()).unwrap();
    tx.try_enqueue_frame(b"y", DescFlags::empty()).unwrap();
    {
        let slot = rx.peek().unwrap();
        assert_eq!(slot.payload(), b"x");
        assert!(!tx.try_enqueue(desc(7)), "slot must stay owned while borrowed");
    }
    assert!(tx.try_enqueue(desc(7)));
}

#[test]
fn test_foreign_descriptor_has_no_payload() {
    let (mut tx, mut rx) = PacketRing::new(4, 64).unwrap().split();
    // Slot 0 lives at offset 0; this descriptor points at slot 2's frame.
    assert!(tx.try_enqueue(PacketDescriptor::new(128, 10, 0, DescFlags::empty())));
    let slot = rx.peek().unwrap();
    assert!(slot.payload().is_empty());
    assert_eq!(slot.descriptor().len, 10);
}

#[test]
fn test_invalid_geometry_is_rejected() {
    assert!(matches!(PacketRing::new(3, 64), Err(RingSetupError::InvalidCapacity(3))));
    assert!(matches!(PacketRing::new(1, 64), Err(RingSetupError::InvalidCapacity(1))));
    assert!(matches!(PacketRing::new(8, 8), Err(RingSetupError::InvalidFrameSize(8))));
}

#[test]
fn test_concurrent_producer_consumer_counts_are_exact() {
    const M: u64 = 200_000;
    let (mut tx, mut rx) = PacketRing::new(64, 64).unwrap().split();
    let done = Arc::new(AtomicBool::new(false));

    let producer = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut accepted = 0u64;
            let mut rejected = 0u64;
            for seq in 0..M {
                if tx.try_enqueue(desc(seq)) {
                    accepted += 1;
                } else {
                    rejected += 1;
                }
            }
            done.store(true, Ordering::Release);
            (accepted, rejected)
        })
    };

    let consumer = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut received = 0u64;
            let mut last: Option<u64> = None;
            loop {
                match rx.try_dequeue() {
                    Some(d) => {
                        if let Some(prev) = last {
                            assert!(d.sequence > prev, "reordered: {} after {}", d.sequence, prev);
                        }
                        last = Some(d.sequence);
                        received += 1;
                    }
                    None if done.load(Ordering::Acquire) => {
                        // Drain whatever landed after the last empty poll.
                        while rx.try_dequeue().is_some() {
                            received += 1;
                        }
                        break;
                    }
                    None => std::hint::spin_loop(),
                }
            }
            received
        })
    };

    let (accepted, rejected) = producer.join().unwrap();
    let received = consumer.join().unwrap();
    assert_eq!(accepted + rejected, M);
    assert_eq!(received, accepted);
}

#[test]
fn test_concurrent_frames_arrive_intact() {
    const M: u32 = 20_000;
    let (mut tx, mut rx) = PacketRing::new(16, 64).unwrap().split();

    let producer = thread::spawn(move || {
        for i in 0..M {
            let bytes = i.to_le_bytes();
            while tx.try_enqueue_frame(&bytes, DescFlags::empty()) == Err(RingError::Full) {
                std::hint::spin_loop();
            }
        }
    });

    let mut out = Vec::new();
    let mut expected = 0u32;
    while expected < M {
        match rx.try_dequeue_frame(&mut out) {
            Ok(_) => {
                assert_eq!(out, expected.to_le_bytes());
                expected += 1;
            }
            Err(RingError::Empty) => std::hint::spin_loop(),
            Err(e) => panic!("unexpected {e:?}"),
        }
    }
    producer.join().unwrap();
}
