use std::{
    io::{Read, Write},
    net::{Ipv4Addr, SocketAddr, TcpStream},
    thread,
    time::Duration,
};

use relay_protocol::{FrameHeader, HEADER_SIZE};
use relay_server::{EchoHandler, Server, ShutdownFlag};

const IDLE_CONNECTIONS: usize = 100;

fn echo_once(client: &mut TcpStream, sequence: u32) {
    client.write_all(&FrameHeader::data(sequence, 4).encode()).unwrap();
    client.write_all(b"ping").unwrap();
    let mut response = [0u8; HEADER_SIZE + 4];
    client.read_exact(&mut response).expect("echo round trip failed");
}

#[test]
fn shutdown_closes_every_connection_and_is_idempotent() {
    let shutdown = ShutdownFlag::new();
    let mut server =
        Server::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)), EchoHandler, shutdown.clone())
            .expect("failed to bind test server");
    let addr = server.local_addr();
    let handle = thread::spawn(move || server.run());

    // Open a population of connections and prove each one was accepted by
    // completing a round trip on it before going idle.
    let mut clients = Vec::with_capacity(IDLE_CONNECTIONS);
    for i in 0..IDLE_CONNECTIONS {
        let mut client = TcpStream::connect(addr).expect("connect failed");
        echo_once(&mut client, i as u32);
        clients.push(client);
    }

    // Delivering the signal more than once must look exactly like once.
    shutdown.raise();
    shutdown.raise();
    shutdown.raise();

    handle
        .join()
        .expect("server thread panicked")
        .expect("server loop returned an error on shutdown");

    // Every client observes an orderly close.
    for mut client in clients {
        client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let mut buf = [0u8; 1];
        match client.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => panic!("unexpected {n} bytes after shutdown"),
            Err(err) => {
                assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset, "{err}");
            }
        }
    }

    // And the listener is gone: new connections are refused.
    assert!(TcpStream::connect(addr).is_err(), "listener still accepting after shutdown");
}

#[test]
fn run_returns_promptly_when_the_flag_is_already_raised() {
    let shutdown = ShutdownFlag::new();
    shutdown.raise();

    let mut server =
        Server::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)), EchoHandler, shutdown)
            .expect("failed to bind test server");

    // The loop must observe the flag before its first wait.
    server.run().expect("server loop failed");
}
