#![cfg(feature = "cli")]

use std::net::{SocketAddr, TcpListener};
use std::process::Command;
use std::thread;

use msplink_frame::command::{
    MSP_ANALOG, MSP_API_VERSION, MSP_BOARD_INFO, MSP_FC_VARIANT, MSP_FC_VERSION, MSP_STATUS,
};
use msplink_frame::{Frame, FrameReader, FrameWriter};

/// Firmware double: accepts one connection and answers identification and
/// telemetry queries with canned payloads until the client hangs up.
fn spawn_mock_fc() -> (SocketAddr, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("mock fc should bind");
    let addr = listener.local_addr().expect("mock fc should have an address");

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("mock fc should accept");
        let mut reader = FrameReader::new(stream.try_clone().expect("stream should clone"));
        let mut writer = FrameWriter::new(stream);

        loop {
            let frame = match reader.read_frame() {
                Ok(frame) => frame,
                Err(_) => return,
            };

            let payload: Vec<u8> = match frame.command {
                MSP_API_VERSION => vec![0, 1, 46],
                MSP_FC_VARIANT => b"BTFL".to_vec(),
                MSP_FC_VERSION => vec![4, 5, 1],
                MSP_BOARD_INFO => vec![b'S', b'4', b'0', b'5', 0, 0],
                MSP_STATUS => vec![0x7D, 0x00, 0x00, 0x00, 0x03, 0x00, 0, 0, 0, 0, 0],
                MSP_ANALOG => vec![0xA4, 0x00, 0x00, 0x64, 0x00, 0x32, 0x00],
                _ => Vec::new(),
            };

            let response = Frame::response(frame.command, payload);
            if writer.write_frame(&response).is_err() {
                return;
            }
        }
    });

    (addr, handle)
}

#[test]
fn probe_reports_identification() {
    let (addr, fc) = spawn_mock_fc();

    let output = Command::new(env!("CARGO_BIN_EXE_msplink"))
        .args([
            "--format",
            "json",
            "--log-level",
            "error",
            "probe",
            &addr.to_string(),
        ])
        .output()
        .expect("probe command should run");

    assert!(
        output.status.success(),
        "probe failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"api_version\":\"1.46\""), "{stdout}");
    assert!(stdout.contains("\"fc_variant\":\"BTFL\""), "{stdout}");
    assert!(stdout.contains("\"fc_version\":\"4.5.1\""), "{stdout}");
    assert!(stdout.contains("\"board\":\"S405\""), "{stdout}");
    assert!(stdout.contains("\"cycle_time_us\":125"), "{stdout}");

    fc.join().expect("mock fc should exit");
}

#[test]
fn send_prints_response_payload() {
    let (addr, fc) = spawn_mock_fc();

    let output = Command::new(env!("CARGO_BIN_EXE_msplink"))
        .args([
            "--format",
            "json",
            "--log-level",
            "error",
            "send",
            &addr.to_string(),
            "--command",
            "110",
        ])
        .output()
        .expect("send command should run");

    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"command\":110"), "{stdout}");
    assert!(stdout.contains("\"command_name\":\"ANALOG\""), "{stdout}");
    assert!(stdout.contains("a4 00 00 64 00 32 00"), "{stdout}");

    fc.join().expect("mock fc should exit");
}

#[test]
fn send_fire_and_forget_skips_response() {
    let (addr, fc) = spawn_mock_fc();

    let output = Command::new(env!("CARGO_BIN_EXE_msplink"))
        .args([
            "--format",
            "json",
            "--log-level",
            "error",
            "send",
            &addr.to_string(),
            "--command",
            "200",
            "--payload-hex",
            "dc05dc05",
            "--no-response",
            "--flush",
        ])
        .output()
        .expect("send command should run");

    assert!(
        output.status.success(),
        "send failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"command\":200"), "{stdout}");
    assert!(stdout.contains("\"payload_size\":0"), "{stdout}");

    fc.join().expect("mock fc should exit");
}

#[test]
fn probe_fails_when_nothing_listens() {
    // Bind then drop to get a port that refuses connections.
    let listener = TcpListener::bind("127.0.0.1:0").expect("should bind");
    let addr = listener.local_addr().expect("should have an address");
    drop(listener);

    let output = Command::new(env!("CARGO_BIN_EXE_msplink"))
        .args(["--log-level", "error", "probe", &addr.to_string()])
        .output()
        .expect("probe command should run");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connect failed"), "{stderr}");
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_msplink"))
        .arg("version")
        .output()
        .expect("version command should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")), "{stdout}");
}
