use std::sync::{Arc, Mutex};

use bytes::Bytes;
use msplink_client::{connect_with_config, ConnectConfig, ResponseSink, SendOptions};

use crate::cmd::{parse_duration, parse_hex, SendArgs};
use crate::exit::{link_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_response, OutputFormat};

#[derive(Default)]
struct LastResponse {
    payload: Mutex<Option<(u8, Bytes)>>,
}

impl ResponseSink for LastResponse {
    fn on_response(&self, command: u8, payload: &Bytes) {
        *self.payload.lock().unwrap() = Some((command, payload.clone()));
    }
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = match &args.payload_hex {
        Some(hex) => parse_hex(hex)?,
        None => Vec::new(),
    };

    let options = SendOptions {
        retries: args.retries,
        timeout,
        flush: args.flush,
        expects_response: !args.no_response,
    };
    let config = ConnectConfig {
        send_options: options.clone(),
        ..ConnectConfig::default()
    };

    let conn = connect_with_config(args.addr.as_str(), &config)
        .map_err(|err| link_error("connect failed", err))?;
    let sink = Arc::new(LastResponse::default());
    conn.set_response_sink(Arc::clone(&sink) as Arc<dyn ResponseSink>);

    let completed = conn
        .dispatcher()
        .send_blocking(args.command, payload, options);
    if !completed {
        return Err(CliError::new(
            TIMEOUT,
            format!("command {} did not complete", args.command),
        ));
    }

    if args.no_response {
        print_response(args.command, &[], format);
        return Ok(SUCCESS);
    }

    let response = sink.payload.lock().unwrap().take();
    match response {
        Some((command, payload)) => print_response(command, &payload, format),
        // Completed without a captured payload should not happen, but the
        // command still succeeded on the wire.
        None => print_response(args.command, &[], format),
    }

    Ok(SUCCESS)
}
