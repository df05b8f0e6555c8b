/*!
 * Shared Memory Channel Tests
 * Ring behavior across handles, threads and processes
 */

use ipc_channels::{
    remove_endpoint, Channel, ChannelConfig, ChannelError, Flavor, RingStrategy, Transport,
};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::shm_open;
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

const REGION: usize = 64 * 1024;

fn unique_name(tag: &str) -> String {
    let name = format!("/ipc-test-{}-{}", tag, uuid::Uuid::new_v4().simple());
    let _ = remove_endpoint(&name, Flavor::SharedMemory);
    name
}

fn config(name: &str, unit: usize, ring: RingStrategy) -> ChannelConfig {
    ChannelConfig::new(name, unit, Flavor::SharedMemory)
        .unwrap()
        .with_ring(ring)
        .with_region_size(REGION)
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn open(name: &str, unit: usize, ring: RingStrategy) -> Channel {
    init_logging();
    Channel::open(&config(name, unit, ring)).unwrap()
}

fn object_exists(name: &str) -> bool {
    match shm_open(name, OFlag::O_RDWR, Mode::empty()) {
        Ok(_) => true,
        Err(Errno::ENOENT) => false,
        Err(e) => panic!("shm_open({}) failed: {}", name, e),
    }
}

#[test]
fn test_unit_size_validation() {
    for unit in [0, 3, 6, 100] {
        let name = unique_name("bad-unit");
        let result = ChannelConfig::new(&name, unit, Flavor::SharedMemory);
        assert!(
            matches!(result, Err(ChannelError::InvalidUnitSize(u)) if u == unit),
            "unit size {} should be rejected",
            unit
        );
        assert!(Channel::create(&name, unit, Flavor::SharedMemory).is_err());
        assert!(!object_exists(&name));
    }

    for unit in [1, 2, 4, 8, 4096] {
        let name = unique_name("good-unit");
        let channel = open(&name, unit, RingStrategy::Blocking);
        assert_eq!(channel.unit_size(), unit);
        channel.destroy();
    }
}

#[test]
fn test_region_too_small_leaves_nothing_behind() {
    let name = unique_name("tiny");
    let config = config(&name, 4096, RingStrategy::Blocking).with_region_size(8192);

    assert!(matches!(
        Channel::open(&config),
        Err(ChannelError::RegionTooSmall { .. })
    ));
    assert!(!object_exists(&name));
}

#[test]
fn test_fifo_and_byte_exact() {
    for ring in [RingStrategy::Blocking, RingStrategy::Spsc] {
        let name = unique_name("fifo");
        let mut channel = open(&name, 32, ring);

        let units: Vec<[u8; 32]> = (0..100u8)
            .map(|i| {
                let mut unit = [0u8; 32];
                for (j, byte) in unit.iter_mut().enumerate() {
                    *byte = i.wrapping_mul(31).wrapping_add(j as u8);
                }
                unit
            })
            .collect();

        for unit in &units {
            channel.push(unit).unwrap();
        }
        let mut out = [0u8; 32];
        for unit in &units {
            channel.pop(&mut out).unwrap();
            assert_eq!(&out, unit);
        }
        channel.destroy();
    }
}

#[test]
fn test_multi_attach_shares_ring() {
    let name = unique_name("attach");
    let mut a = open(&name, 8, RingStrategy::Blocking);
    let mut b = open(&name, 8, RingStrategy::Blocking);

    a.push(&42u64.to_le_bytes()).unwrap();
    assert_eq!(b.len(), Some(1));

    let mut unit = [0u8; 8];
    b.pop(&mut unit).unwrap();
    assert_eq!(u64::from_le_bytes(unit), 42);

    // Destroying one handle leaves the other fully usable
    a.destroy();
    b.push(&7u64.to_le_bytes()).unwrap();
    b.pop(&mut unit).unwrap();
    assert_eq!(u64::from_le_bytes(unit), 7);

    b.destroy();
    assert!(!object_exists(&name));
}

#[test]
fn test_reopen_after_destroy_starts_empty() {
    let name = unique_name("reopen");
    let mut channel = open(&name, 8, RingStrategy::Blocking);
    channel.push(&[1; 8]).unwrap();
    channel.destroy();

    let channel = open(&name, 8, RingStrategy::Blocking);
    assert_eq!(channel.is_empty(), Some(true));
}

#[test]
fn test_mismatched_attach_rejected() {
    let name = unique_name("mismatch");
    let _first = open(&name, 8, RingStrategy::Spsc);

    let other_unit = Channel::open(&config(&name, 16, RingStrategy::Spsc));
    assert!(matches!(other_unit, Err(ChannelError::LayoutMismatch { .. })));

    let other_region = Channel::open(&config(&name, 8, RingStrategy::Spsc).with_region_size(REGION * 2));
    assert!(matches!(other_region, Err(ChannelError::LayoutMismatch { .. })));
}

#[test]
fn test_push_blocks_when_full() {
    for ring in [RingStrategy::Blocking, RingStrategy::Spsc] {
        let name = unique_name("full");
        let mut producer = open(&name, 64, ring);
        let mut consumer = open(&name, 64, ring);

        let capacity = producer.capacity_units().unwrap();
        for i in 0..capacity {
            producer.push(&[i as u8; 64]).unwrap();
        }
        assert_eq!(producer.len(), Some(capacity));

        let (done_tx, done_rx) = mpsc::channel();
        let blocked = thread::spawn(move || {
            producer.push(&[0xEE; 64]).unwrap();
            done_tx.send(()).unwrap();
            producer
        });

        assert!(
            done_rx.recv_timeout(Duration::from_millis(200)).is_err(),
            "{} push returned on a full ring",
            ring
        );

        let mut unit = [0u8; 64];
        consumer.pop(&mut unit).unwrap();
        assert_eq!(unit, [0u8; 64]);
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("push should resume after a pop");

        let producer = blocked.join().unwrap();
        assert!(producer.stats().push_waits >= 1);
        assert_eq!(consumer.len(), Some(capacity));

        // Order holds across the wrap
        for i in 1..capacity {
            consumer.pop(&mut unit).unwrap();
            assert_eq!(unit, [i as u8; 64]);
        }
        consumer.pop(&mut unit).unwrap();
        assert_eq!(unit, [0xEE; 64]);
        assert_eq!(consumer.is_empty(), Some(true));

        producer.destroy();
        consumer.destroy();
    }
}

#[test]
fn test_concurrent_first_open() {
    const OPENERS: usize = 8;

    for ring in [RingStrategy::Blocking, RingStrategy::Spsc] {
        for _ in 0..25 {
            let name = unique_name("race");
            let barrier = Arc::new(Barrier::new(OPENERS));

            let openers: Vec<_> = (0..OPENERS)
                .map(|_| {
                    let name = name.clone();
                    let barrier = Arc::clone(&barrier);
                    thread::spawn(move || {
                        barrier.wait();
                        Channel::open(&config(&name, 8, ring))
                    })
                })
                .collect();

            let mut handles: Vec<Channel> = openers
                .into_iter()
                .map(|h| h.join().unwrap().expect("every racing open succeeds"))
                .collect();

            // One ring behind every handle
            handles[0].push(&0xC0FFEEu64.to_le_bytes()).unwrap();
            for handle in &handles {
                assert_eq!(handle.len(), Some(1));
            }
            let mut unit = [0u8; 8];
            handles[OPENERS - 1].pop(&mut unit).unwrap();
            assert_eq!(u64::from_le_bytes(unit), 0xC0FFEE);

            for handle in handles {
                handle.destroy();
            }
            assert!(!object_exists(&name));
        }
    }
}

#[test]
fn test_pop_blocks_when_empty() {
    for ring in [RingStrategy::Blocking, RingStrategy::Spsc] {
        let name = unique_name("empty");
        let mut producer = open(&name, 8, ring);
        let mut consumer = open(&name, 8, ring);

        let (tx, rx) = mpsc::channel();
        let waiter = thread::spawn(move || {
            let mut unit = [0u8; 8];
            consumer.pop(&mut unit).unwrap();
            tx.send(u64::from_le_bytes(unit)).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
        producer.push(&99u64.to_le_bytes()).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 99);
        waiter.join().unwrap();
    }
}

#[test]
fn test_spsc_threads_stream() {
    const COUNT: u64 = 200_000;
    let name = unique_name("spsc");
    let mut producer = open(&name, 8, RingStrategy::Spsc);
    let mut consumer = open(&name, 8, RingStrategy::Spsc);

    let sender = thread::spawn(move || {
        for i in 0..COUNT {
            producer.push(&i.to_le_bytes()).unwrap();
        }
    });

    let mut unit = [0u8; 8];
    for i in 0..COUNT {
        consumer.pop(&mut unit).unwrap();
        assert_eq!(u64::from_le_bytes(unit), i);
    }
    sender.join().unwrap();
}

#[test]
fn test_blocking_many_producers() {
    const PER_PRODUCER: u32 = 5_000;
    const PRODUCERS: u32 = 4;
    let name = unique_name("mpmc");
    let mut consumer = open(&name, 8, RingStrategy::Blocking);

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let mut producer = open(&name, 8, RingStrategy::Blocking);
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    let mut unit = [0u8; 8];
                    unit[..4].copy_from_slice(&p.to_le_bytes());
                    unit[4..].copy_from_slice(&seq.to_le_bytes());
                    producer.push(&unit).unwrap();
                }
            })
        })
        .collect();

    // Each producer's own units arrive in order
    let mut next = vec![0u32; PRODUCERS as usize];
    let mut unit = [0u8; 8];
    for _ in 0..PER_PRODUCER * PRODUCERS {
        consumer.pop(&mut unit).unwrap();
        let p = u32::from_le_bytes(unit[..4].try_into().unwrap()) as usize;
        let seq = u32::from_le_bytes(unit[4..].try_into().unwrap());
        assert_eq!(seq, next[p]);
        next[p] += 1;
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(next.iter().all(|n| *n == PER_PRODUCER));
}

#[test]
#[serial]
fn test_cross_process_transfer() {
    for ring in [RingStrategy::Blocking, RingStrategy::Spsc] {
        let name = unique_name("fork");
        let mut consumer = open(&name, 16, ring);

        match unsafe { fork() }.unwrap() {
            ForkResult::Child => {
                std::mem::forget(consumer);
                let code = std::panic::catch_unwind(|| {
                    let mut producer = open(&name, 16, ring);
                    for i in 0..10_000u64 {
                        let mut unit = [0u8; 16];
                        unit[..8].copy_from_slice(&i.to_le_bytes());
                        producer.push(&unit).unwrap();
                    }
                    producer.destroy();
                })
                .map_or(1, |_| 0);
                std::process::exit(code);
            }
            ForkResult::Parent { child } => {
                let mut unit = [0u8; 16];
                for i in 0..10_000u64 {
                    consumer.pop(&mut unit).unwrap();
                    assert_eq!(u64::from_le_bytes(unit[..8].try_into().unwrap()), i);
                }
                assert_eq!(waitpid(child, None).unwrap(), WaitStatus::Exited(child, 0));
                consumer.destroy();
                assert!(!object_exists(&name));
            }
        }
    }
}
