use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex};

use bytes::Bytes;
use msplink_client::{connect_with_config, Chain, ConnectConfig, ResponseSink, SendOptions};
use msplink_frame::command::{
    MSP_API_VERSION, MSP_BOARD_INFO, MSP_FC_VARIANT, MSP_FC_VERSION, MSP_STATUS,
};

use crate::cmd::{parse_duration, ProbeArgs};
use crate::exit::{link_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_probe_report, OutputFormat, ProbeReport};

/// Identification queries, in dependency order: the API version gates how
/// later payloads would be interpreted.
const PROBE_SEQUENCE: [u8; 5] = [
    MSP_API_VERSION,
    MSP_FC_VARIANT,
    MSP_FC_VERSION,
    MSP_BOARD_INFO,
    MSP_STATUS,
];

#[derive(Default)]
struct CaptureSink {
    payloads: Mutex<HashMap<u8, Bytes>>,
}

impl ResponseSink for CaptureSink {
    fn on_response(&self, command: u8, payload: &Bytes) {
        self.payloads
            .lock()
            .unwrap()
            .insert(command, payload.clone());
    }
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let config = ConnectConfig {
        send_options: SendOptions {
            retries: args.retries,
            timeout,
            ..SendOptions::default()
        },
        ..ConnectConfig::default()
    };

    let conn = Arc::new(
        connect_with_config(args.addr.as_str(), &config)
            .map_err(|err| link_error("connect failed", err))?,
    );
    let sink = Arc::new(CaptureSink::default());
    conn.set_response_sink(Arc::clone(&sink) as Arc<dyn ResponseSink>);

    let mut chain = Chain::new();
    for &command in &PROBE_SEQUENCE {
        let conn = Arc::clone(&conn);
        let options = config.send_options.clone();
        chain = chain.step(move |handle| {
            conn.send(command, &b""[..], options, move |success| {
                handle.resolve(success)
            });
        });
    }

    let (tx, rx) = mpsc::channel();
    chain.run(move |success| {
        let _ = tx.send(success);
    });

    let succeeded = rx.recv().unwrap_or(false);
    if !succeeded {
        return Err(CliError::new(
            TIMEOUT,
            "probe failed: flight controller did not answer the identification sequence",
        ));
    }

    let payloads = sink.payloads.lock().unwrap();
    let report = build_report(&payloads);
    drop(payloads);

    print_probe_report(&report, format);
    Ok(SUCCESS)
}

fn build_report(payloads: &HashMap<u8, Bytes>) -> ProbeReport {
    let mut report = ProbeReport::default();

    if let Some(p) = payloads.get(&MSP_API_VERSION) {
        if p.len() >= 3 {
            report.api_version = Some(format!("{}.{}", p[1], p[2]));
        }
    }
    if let Some(p) = payloads.get(&MSP_FC_VARIANT) {
        report.fc_variant = Some(ascii_field(p));
    }
    if let Some(p) = payloads.get(&MSP_FC_VERSION) {
        if p.len() >= 3 {
            report.fc_version = Some(format!("{}.{}.{}", p[0], p[1], p[2]));
        }
    }
    if let Some(p) = payloads.get(&MSP_BOARD_INFO) {
        if p.len() >= 4 {
            report.board = Some(ascii_field(&p[..4]));
        }
    }
    if let Some(p) = payloads.get(&MSP_STATUS) {
        if p.len() >= 4 {
            report.cycle_time_us = Some(u16::from_le_bytes([p[0], p[1]]));
            report.i2c_errors = Some(u16::from_le_bytes([p[2], p[3]]));
        }
    }

    report
}

fn ascii_field(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| {
            if b.is_ascii_graphic() {
                b as char
            } else {
                '?'
            }
        })
        .collect()
}
