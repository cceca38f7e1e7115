mod client;

use std::{
    io::{self, Read},
    net::{SocketAddr, TcpStream},
    thread,
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use relay_protocol::{FrameHeader, MessageKind};
use tracing_subscriber::EnvFilter;

/// Conformance client and load driver for a relay server.
#[derive(Parser)]
#[command(name = "relay-ctl", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one data frame and verify the echo.
    Echo {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
        /// Payload text to send.
        #[arg(long, default_value = "Hello, relay!")]
        message: String,
        /// Sequence number stamped on the request.
        #[arg(long, default_value_t = 1)]
        seq: u32,
    },
    /// Send a header-only heartbeat and confirm the server stays silent.
    Heartbeat {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
    /// Threaded load driver reporting throughput.
    Bench {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
        /// Concurrent connections, one thread each.
        #[arg(long, default_value_t = 10)]
        connections: usize,
        /// Echo round trips per connection.
        #[arg(long, default_value_t = 10_000)]
        requests: usize,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RELAY_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Echo { addr, message, seq } => run_echo(addr, &message, seq),
        Command::Heartbeat { addr } => run_heartbeat(addr),
        Command::Bench { addr, connections, requests } => run_bench(addr, connections, requests),
    };

    if let Err(err) = outcome {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run_echo(addr: SocketAddr, message: &str, seq: u32) -> io::Result<()> {
    let mut stream = TcpStream::connect(addr)?;
    println!("connected to {addr}");

    let (header, payload) = client::echo_round_trip(&mut stream, seq, message.as_bytes())?;

    if header.kind() != Some(MessageKind::Data) || header.sequence != seq {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "response header mismatch (type 0x{:02X}, sequence {})",
                header.message_type, header.sequence
            ),
        ));
    }
    if payload != message.as_bytes() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "echoed payload differs"));
    }

    println!("echo ok: sequence {seq}, {} payload bytes", payload.len());
    Ok(())
}

fn run_heartbeat(addr: SocketAddr) -> io::Result<()> {
    let mut stream = TcpStream::connect(addr)?;
    client::send_frame(&mut stream, &FrameHeader::heartbeat(0), &[])?;

    // The server must not answer; give it a moment to prove it.
    stream.set_read_timeout(Some(Duration::from_millis(500)))?;
    let mut probe = [0u8; 1];
    match stream.read(&mut probe) {
        Ok(0) => {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "server closed the connection on a heartbeat",
            ));
        }
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "server answered a heartbeat",
            ));
        }
        Err(ref e)
            if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {}
        Err(err) => return Err(err),
    }

    // The connection must still be usable afterwards.
    stream.set_read_timeout(None)?;
    client::echo_round_trip(&mut stream, 1, b"post-heartbeat")?;
    println!("heartbeat ok: server stayed silent and the connection survived");
    Ok(())
}

fn run_bench(addr: SocketAddr, connections: usize, requests: usize) -> io::Result<()> {
    println!("benchmarking {addr}: {connections} connections x {requests} requests");

    let started = Instant::now();
    let workers: Vec<_> = (0..connections)
        .map(|_| thread::spawn(move || bench_worker(addr, requests)))
        .collect();

    let mut successes: u64 = 0;
    for worker in workers {
        successes += worker.join().map_err(|_| io::Error::other("bench worker panicked"))?;
    }

    let elapsed = started.elapsed().as_secs_f64();
    let total = (connections * requests) as u64;
    println!("completed {successes}/{total} round trips in {elapsed:.4}s");
    println!("throughput: {:.2} requests/second", successes as f64 / elapsed);

    if successes < total {
        return Err(io::Error::other("some round trips failed"));
    }
    Ok(())
}

/// One bench connection: echo round trips until done or the first failure.
fn bench_worker(addr: SocketAddr, requests: usize) -> u64 {
    let Ok(mut stream) = TcpStream::connect(addr) else {
        return 0;
    };
    let payload = b"BENCHMARK_PAYLOAD";

    let mut successes = 0;
    for seq in 0..requests {
        match client::echo_round_trip(&mut stream, seq as u32, payload) {
            Ok((header, echoed)) if header.sequence == seq as u32 && echoed == payload => {
                successes += 1;
            }
            _ => break,
        }
    }
    successes
}
