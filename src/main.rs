/*!
 * Channel Benchmark
 *
 * Forks one producer and one consumer that move `iters` units through a
 * channel of the chosen flavor, then prints monotonic timestamps taken when
 * the producer starts and when the consumer has received everything.
 *
 * Environment variables:
 * - CHANNEL_RING: `blocking` (default) or `spsc` for the shared memory flavor
 * - CHANNEL_REGION_SIZE: shared memory region size in bytes
 * - CHANNEL_CONNECT_RETRIES: socket connect attempts
 * - CHANNEL_BENCH_ENDPOINT: override the default endpoint name
 * - RUST_LOG / CHANNEL_TRACE_JSON: log filtering and format
 */

use ipc_channels::{init_tracing, remove_endpoint, Channel, ChannelConfig, Flavor, Transport};
use miette::{IntoDiagnostic, Result};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::time::{clock_gettime, ClockId};
use nix::unistd::{fork, ForkResult, Pid};
use std::process::ExitCode;
use tracing::{error, info};

const SHM_ENDPOINT: &str = "/ipc_shr_open_mmap_78324";
const SOCKET_ENDPOINT: &str = "/tmp/ipc_unix_socket_ex_38310";
const DEFAULT_UNIT_SIZE: usize = 8;
const DEFAULT_ITERS: usize = 1_000_000;
const ENV_ENDPOINT: &str = "CHANNEL_BENCH_ENDPOINT";

#[derive(Debug)]
struct BenchOptions {
    flavor: Flavor,
    unit_size: usize,
    iters: usize,
}

fn print_usage(command: &str) {
    println!("USAGE: {} {{mmap|socket}} [unit-size] [iters]", command);
    println!();
    println!(" - {{mmap|socket}} - channel flavor");
    println!(" - [unit-size]   - size of a message transmitted over channel");
    println!("                   MUST be a power of 2, defaults to {}", DEFAULT_UNIT_SIZE);
    println!(" - [iters]       - number of transmissions over channel");
    println!("                   defaults to {}", DEFAULT_ITERS);
    println!();
    println!("   ex: {} mmap 32", command);
}

/// `None` means the arguments are unusable and usage should be shown
fn parse_args(args: &[String]) -> Option<BenchOptions> {
    if args.len() < 2 || args.len() > 4 {
        return None;
    }

    let flavor = match args[1].as_str() {
        "mmap" => Flavor::SharedMemory,
        "socket" => Flavor::Socket,
        _ => return None,
    };

    let unit_size = match args.get(2) {
        Some(raw) => raw.parse::<usize>().ok().filter(|n| n.is_power_of_two())?,
        None => DEFAULT_UNIT_SIZE,
    };

    let iters = match args.get(3) {
        Some(raw) => raw.parse::<usize>().ok()?,
        None => DEFAULT_ITERS,
    };

    Some(BenchOptions {
        flavor,
        unit_size,
        iters,
    })
}

fn report_time(label: &str) -> Result<()> {
    let ts = clock_gettime(ClockId::CLOCK_MONOTONIC).into_diagnostic()?;
    println!("{}: {} {:09}", label, ts.tv_sec(), ts.tv_nsec());
    Ok(())
}

fn produce(mut channel: Channel, iters: usize) -> Result<()> {
    let mut unit = vec![0u8; channel.unit_size()];
    report_time("[BEGIN]")?;

    for i in 0..iters {
        unit[0] = (i & 0xff) as u8;
        channel.push(&unit)?;
    }

    info!(stats = ?channel.stats(), "Producer finished");
    channel.destroy();
    Ok(())
}

fn open_and_produce(config: &ChannelConfig, iters: usize) -> Result<()> {
    produce(Channel::open(config)?, iters)
}

/// Returns the number of units whose marker byte was wrong
fn consume(channel: &mut Channel, iters: usize) -> Result<usize> {
    let mut unit = vec![0u8; channel.unit_size()];
    let mut mismatches = 0;

    for i in 0..iters {
        channel.pop(&mut unit)?;
        let expected = (i & 0xff) as u8;
        if unit[0] != expected {
            println!("{} != {}", unit[0], expected);
            mismatches += 1;
        }
    }

    report_time("[-END-]")?;
    info!(stats = ?channel.stats(), "Consumer finished");
    Ok(mismatches)
}

fn run(options: &BenchOptions) -> Result<ExitCode> {
    let endpoint = std::env::var(ENV_ENDPOINT).unwrap_or_else(|_| {
        match options.flavor {
            Flavor::SharedMemory => SHM_ENDPOINT,
            Flavor::Socket => SOCKET_ENDPOINT,
        }
        .to_string()
    });

    let config = ChannelConfig::new(endpoint, options.unit_size, options.flavor)?.from_env();
    config.validate()?;
    println!(
        "flavor={} unit_size={} iters={} ring={} endpoint={}",
        config.flavor, options.unit_size, options.iters, config.ring, config.endpoint
    );

    if remove_endpoint(&config.endpoint, config.flavor)? {
        info!(endpoint = %config.endpoint, "Removed stale endpoint");
    }

    // The consumer attaches before forking so the producer can never
    // initialize, fill and tear down a ring nobody else has joined yet
    let early = match config.flavor {
        Flavor::SharedMemory => Some(Channel::open(&config)?),
        Flavor::Socket => None,
    };

    // SAFETY: no other threads have been spawned at this point
    match unsafe { fork() }.into_diagnostic()? {
        ForkResult::Child => {
            // The inherited handle belongs to the parent's attachment
            std::mem::forget(early);

            let status = match open_and_produce(&config, options.iters) {
                Ok(()) => 0,
                Err(e) => {
                    error!(error = ?e, "Producer failed");
                    1
                }
            };
            std::process::exit(status);
        }
        ForkResult::Parent { child } => {
            let consumed = open_and_consume(early, &config, options.iters);
            let (mismatches, child_ok) = reap_producer(child, consumed)?;

            if mismatches > 0 || !child_ok {
                error!(mismatches, child_ok, "Benchmark failed");
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_and_consume(early: Option<Channel>, config: &ChannelConfig, iters: usize) -> Result<usize> {
    let mut channel = match early {
        Some(channel) => channel,
        None => Channel::open(config)?,
    };
    let mismatches = consume(&mut channel, iters)?;
    channel.destroy();
    Ok(mismatches)
}

/// Wait for the producer whatever the consumer's outcome
///
/// A failed consumer no longer drains the channel, so the producer is
/// terminated first instead of being left blocked on a full ring.
fn reap_producer(child: Pid, consumed: Result<usize>) -> Result<(usize, bool)> {
    if consumed.is_err() {
        if let Err(e) = kill(child, Signal::SIGTERM) {
            error!(%child, error = %e, "Failed to stop producer");
        }
    }

    let status = waitpid(child, None).into_diagnostic()?;
    let mismatches = consumed?;
    Ok((mismatches, matches!(status, WaitStatus::Exited(_, 0))))
}

fn main() -> Result<ExitCode> {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let command = args.first().map(String::as_str).unwrap_or("channel-bench");

    let Some(options) = parse_args(&args) else {
        print_usage(command);
        return Ok(ExitCode::SUCCESS);
    };

    run(&options)
}
