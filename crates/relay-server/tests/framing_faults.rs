use std::{
    io::{Read, Write},
    net::{Ipv4Addr, SocketAddr, TcpStream},
    thread,
    time::Duration,
};

use relay_protocol::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_LEN};
use relay_server::{EchoHandler, Server, ShutdownFlag};

fn start_server() -> (SocketAddr, ShutdownFlag, thread::JoinHandle<()>) {
    let shutdown = ShutdownFlag::new();
    let mut server =
        Server::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)), EchoHandler, shutdown.clone())
            .expect("failed to bind test server");
    let addr = server.local_addr();
    let handle = thread::spawn(move || server.run().expect("server loop failed"));
    (addr, shutdown, handle)
}

fn stop_server(shutdown: &ShutdownFlag, handle: thread::JoinHandle<()>) {
    shutdown.raise();
    handle.join().expect("server thread panicked");
}

/// Blocks until the server closes our end, tolerating a reset from a
/// connection torn down with bytes still in flight.
fn assert_closed(client: &mut TcpStream) {
    client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let mut buf = [0u8; 1];
    match client.read(&mut buf) {
        Ok(0) => {}
        Ok(n) => panic!("expected close, got {n} bytes"),
        Err(err) => assert_eq!(err.kind(), std::io::ErrorKind::ConnectionReset, "{err}"),
    }
}

fn echo_once(client: &mut TcpStream, sequence: u32, payload: &[u8]) {
    client.write_all(&FrameHeader::data(sequence, payload.len() as u32).encode()).unwrap();
    client.write_all(payload).unwrap();

    let mut header_buf = [0u8; HEADER_SIZE];
    client.read_exact(&mut header_buf).expect("failed to read echo header");
    let header = FrameHeader::decode(&header_buf).expect("echo header didn't decode");
    assert_eq!(header.sequence, sequence);
    let mut echoed = vec![0u8; header.payload_len as usize];
    client.read_exact(&mut echoed).expect("failed to read echo payload");
    assert_eq!(echoed, payload);
}

#[test]
fn oversize_payload_length_closes_the_connection() {
    let (addr, shutdown, handle) = start_server();

    let mut client = TcpStream::connect(addr).expect("connect failed");
    let mut header = FrameHeader::data(1, 0).encode();
    header[8..12].copy_from_slice(&(MAX_PAYLOAD_LEN + 1).to_be_bytes());
    client.write_all(&header).unwrap();

    assert_closed(&mut client);

    // The server itself is unharmed.
    let mut probe = TcpStream::connect(addr).expect("reconnect failed");
    echo_once(&mut probe, 2, b"still here");

    stop_server(&shutdown, handle);
}

#[test]
fn wrong_version_closes_the_connection() {
    let (addr, shutdown, handle) = start_server();

    let mut client = TcpStream::connect(addr).expect("connect failed");
    let mut header = FrameHeader::data(1, 5).encode();
    header[1] = 0x03;
    client.write_all(&header).unwrap();

    assert_closed(&mut client);

    stop_server(&shutdown, handle);
}

#[test]
fn disconnect_mid_payload_leaves_the_server_serving() {
    let (addr, shutdown, handle) = start_server();

    {
        let mut client = TcpStream::connect(addr).expect("connect failed");
        client.set_nodelay(true).unwrap();
        client.write_all(&FrameHeader::data(1, 5).encode()).unwrap();
        client.write_all(b"Hel").unwrap();
        // Give the loop a turn to pull the partial payload in.
        thread::sleep(Duration::from_millis(100));
        // Drop: the peer vanishes with 2 payload bytes outstanding.
    }

    let mut survivor = TcpStream::connect(addr).expect("reconnect failed");
    echo_once(&mut survivor, 2, b"Hello");

    stop_server(&shutdown, handle);
}

#[test]
fn unknown_message_type_is_tolerated() {
    let (addr, shutdown, handle) = start_server();

    let mut client = TcpStream::connect(addr).expect("connect failed");
    let unknown = FrameHeader { version: 1, message_type: 0x42, sequence: 9, payload_len: 0 };
    client.write_all(&unknown.encode()).unwrap();

    // Documented policy: no reply, connection stays open.
    echo_once(&mut client, 10, b"after unknown");

    stop_server(&shutdown, handle);
}
