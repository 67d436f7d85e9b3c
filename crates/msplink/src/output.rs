use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use msplink_frame::command::command_name;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct ResponseOutput<'a> {
    command: u8,
    command_name: &'a str,
    payload_size: usize,
    payload_hex: String,
}

/// Print a single command response.
pub fn print_response(command: u8, payload: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                command,
                command_name: command_name(command),
                payload_size: payload.len(),
                payload_hex: hex_string(payload),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "NAME", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    command.to_string(),
                    command_name(command).to_string(),
                    payload.len().to_string(),
                    hex_string(payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command={} ({}) size={} payload={}",
                command,
                command_name(command),
                payload.len(),
                hex_string(payload)
            );
        }
        OutputFormat::Raw => print_raw(payload),
    }
}

/// Identification report assembled by `probe`.
#[derive(Debug, Default, Serialize)]
pub struct ProbeReport {
    pub api_version: Option<String>,
    pub fc_variant: Option<String>,
    pub fc_version: Option<String>,
    pub board: Option<String>,
    pub cycle_time_us: Option<u16>,
    pub i2c_errors: Option<u16>,
}

pub fn print_probe_report(report: &ProbeReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in report_rows(report) {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for (field, value) in report_rows(report) {
                println!("{field}: {value}");
            }
        }
    }
}

fn report_rows(report: &ProbeReport) -> Vec<(&'static str, String)> {
    let unknown = || "unknown".to_string();
    vec![
        ("api_version", report.api_version.clone().unwrap_or_else(unknown)),
        ("fc_variant", report.fc_variant.clone().unwrap_or_else(unknown)),
        ("fc_version", report.fc_version.clone().unwrap_or_else(unknown)),
        ("board", report.board.clone().unwrap_or_else(unknown)),
        (
            "cycle_time_us",
            report
                .cycle_time_us
                .map(|v| v.to_string())
                .unwrap_or_else(unknown),
        ),
        (
            "i2c_errors",
            report
                .i2c_errors
                .map(|v| v.to_string())
                .unwrap_or_else(unknown),
        ),
    ]
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn hex_string(data: &[u8]) -> String {
    if data.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(data.len() * 3 - 1);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_formatting() {
        assert_eq!(hex_string(&[]), "");
        assert_eq!(hex_string(&[0x00]), "00");
        assert_eq!(hex_string(&[0xDE, 0xAD, 0x01]), "de ad 01");
    }

    #[test]
    fn report_rows_fill_unknowns() {
        let report = ProbeReport {
            fc_variant: Some("BTFL".to_string()),
            ..ProbeReport::default()
        };
        let rows = report_rows(&report);
        assert_eq!(rows[0], ("api_version", "unknown".to_string()));
        assert_eq!(rows[1], ("fc_variant", "BTFL".to_string()));
    }
}
