//! Blocking framing helpers shared by the `echo`, `heartbeat` and `bench`
//! subcommands. The server side is non-blocking; the driver deliberately is
//! not, so each round trip is a plain write/read_exact pair.

use std::{
    io::{self, Read, Write},
    net::TcpStream,
};

use relay_protocol::{FrameHeader, HEADER_SIZE, MAX_PAYLOAD_LEN};

pub fn send_frame(stream: &mut TcpStream, header: &FrameHeader, payload: &[u8]) -> io::Result<()> {
    stream.write_all(&header.encode())?;
    if !payload.is_empty() {
        stream.write_all(payload)?;
    }
    Ok(())
}

/// Reads one frame: exactly 12 header bytes, then exactly `payload_len`
/// payload bytes. A header that fails the frame contract maps to
/// `InvalidData`.
pub fn read_frame(stream: &mut TcpStream) -> io::Result<(FrameHeader, Vec<u8>)> {
    let mut header_buf = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header_buf)?;
    let header = FrameHeader::decode(&header_buf)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

    let mut payload = vec![0u8; header.payload_len as usize];
    stream.read_exact(&mut payload)?;
    Ok((header, payload))
}

/// One data round trip: send, then block for the echo.
pub fn echo_round_trip(
    stream: &mut TcpStream,
    sequence: u32,
    payload: &[u8],
) -> io::Result<(FrameHeader, Vec<u8>)> {
    if payload.len() as u32 > MAX_PAYLOAD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes exceeds the {MAX_PAYLOAD_LEN}-byte limit", payload.len()),
        ));
    }

    send_frame(stream, &FrameHeader::data(sequence, payload.len() as u32), payload)?;
    read_frame(stream)
}
