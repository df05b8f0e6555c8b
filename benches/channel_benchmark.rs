/*!
 * Channel Benchmarks
 *
 * Push/pop round trips through each ring strategy and the socket transport
 */

use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput,
};
use ipc_channels::{
    remove_endpoint, Channel, ChannelConfig, Flavor, RingStrategy, SocketChannel, Transport,
};
use std::thread;
use std::time::Duration;

const UNIT_SIZES: [usize; 4] = [8, 64, 512, 4096];
const REGION: usize = 4 << 20;

fn shm_channel(ring: RingStrategy, unit: usize) -> Channel {
    let name = format!("/ipc-bench-{}-{}-{}", ring, unit, std::process::id());
    let _ = remove_endpoint(&name, Flavor::SharedMemory);
    let config = ChannelConfig::new(name, unit, Flavor::SharedMemory)
        .expect("valid unit size")
        .with_ring(ring)
        .with_region_size(REGION);
    Channel::open(&config).expect("open shared memory channel")
}

fn bench_shm_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("shm_round_trip");

    for ring in [RingStrategy::Blocking, RingStrategy::Spsc] {
        for unit in UNIT_SIZES {
            let mut channel = shm_channel(ring, unit);
            let input = vec![0x5Au8; unit];
            let mut output = vec![0u8; unit];

            group.throughput(Throughput::Bytes(unit as u64));
            group.bench_with_input(
                BenchmarkId::new(ring.to_string(), unit),
                &unit,
                |b, _| {
                    b.iter(|| {
                        channel.push(black_box(&input)).unwrap();
                        channel.pop(black_box(&mut output)).unwrap();
                    });
                },
            );
            channel.destroy();
        }
    }

    group.finish();
}

fn bench_shm_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("shm_batch_fill_drain");

    for ring in [RingStrategy::Blocking, RingStrategy::Spsc] {
        let mut channel = shm_channel(ring, 64);
        let batch = channel.capacity_units().unwrap_or(1).min(1024);
        let input = [7u8; 64];
        let mut output = [0u8; 64];

        group.throughput(Throughput::Elements(batch as u64));
        group.bench_function(BenchmarkId::from_parameter(ring), |b| {
            b.iter(|| {
                for _ in 0..batch {
                    channel.push(&input).unwrap();
                }
                for _ in 0..batch {
                    channel.pop(&mut output).unwrap();
                }
            });
        });
        channel.destroy();
    }

    group.finish();
}

fn socket_pair(unit: usize) -> (SocketChannel, SocketChannel, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("bench.sock").to_string_lossy().into_owned();
    let config = ChannelConfig::new(path, unit, Flavor::Socket)
        .expect("valid unit size")
        .with_connect_retries(100, Duration::from_millis(5));

    let peer = {
        let config = config.clone();
        thread::spawn(move || SocketChannel::open(&config).expect("peer rendezvous"))
    };
    let mine = SocketChannel::open(&config).expect("rendezvous");
    (mine, peer.join().expect("peer thread"), dir)
}

fn bench_socket_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("socket_round_trip");

    for unit in UNIT_SIZES {
        let (mut a, mut b_side, _dir) = socket_pair(unit);
        let input = vec![0xA5u8; unit];
        let mut output = vec![0u8; unit];

        group.throughput(Throughput::Bytes(unit as u64));
        group.bench_with_input(BenchmarkId::from_parameter(unit), &unit, |b, _| {
            b.iter(|| {
                a.push(black_box(&input)).unwrap();
                b_side.pop(black_box(&mut output)).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_shm_round_trip,
    bench_shm_batch,
    bench_socket_round_trip
);
criterion_main!(benches);
