//! Poll attitude telemetry from a (mock) flight controller.
//!
//! Run with: `cargo run --example telemetry-poll`
//!
//! Spawns an in-process firmware double on a loopback socket, then drives
//! it the way a ground station would: one attitude query at a time, each
//! waiting for its response before the next is transmitted.

use std::net::TcpListener;
use std::sync::Arc;

use msplink::client::{connect, ResponseSink};
use msplink::frame::command::MSP_ATTITUDE;
use msplink::frame::{Frame, FrameReader, FrameWriter};

struct AttitudePrinter;

impl ResponseSink for AttitudePrinter {
    fn on_response(&self, command: u8, payload: &bytes::Bytes) {
        if command != MSP_ATTITUDE || payload.len() < 6 {
            return;
        }
        let roll = i16::from_le_bytes([payload[0], payload[1]]) as f32 / 10.0;
        let pitch = i16::from_le_bytes([payload[2], payload[3]]) as f32 / 10.0;
        let heading = i16::from_le_bytes([payload[4], payload[5]]);
        println!("roll={roll:+.1}° pitch={pitch:+.1}° heading={heading}°");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    // Firmware double: answers each attitude query with a slowly rolling
    // craft.
    let fc = std::thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = FrameReader::new(stream.try_clone().expect("clone"));
        let mut writer = FrameWriter::new(stream);

        let mut roll: i16 = -150;
        loop {
            let frame = match reader.read_frame() {
                Ok(frame) => frame,
                Err(_) => return,
            };
            let mut payload = Vec::with_capacity(6);
            payload.extend_from_slice(&roll.to_le_bytes());
            payload.extend_from_slice(&25i16.to_le_bytes());
            payload.extend_from_slice(&270i16.to_le_bytes());
            if writer
                .write_frame(&Frame::response(frame.command, payload))
                .is_err()
            {
                return;
            }
            roll += 50;
        }
    });

    let conn = connect(addr)?;
    conn.set_response_sink(Arc::new(AttitudePrinter));

    for _ in 0..5 {
        conn.request(MSP_ATTITUDE, &b""[..])?;
    }

    drop(conn);
    fc.join().expect("firmware double should exit");
    Ok(())
}
