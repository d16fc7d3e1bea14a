use std::fmt::Write as _;
use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use esp3gate_frame::{Frame, PacketType, RadioTelegram};
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
struct FrameOutput {
    packet_type: String,
    data_size: usize,
    optional_size: usize,
    data: String,
    optional: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    telegram: Option<TelegramOutput>,
    timestamp: String,
}

#[derive(Serialize)]
struct TelegramOutput {
    rorg: String,
    sender: String,
    status: String,
    user_data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    dbm: Option<i16>,
    teach_in: bool,
}

impl TelegramOutput {
    fn from_frame(frame: &Frame) -> Option<Self> {
        if frame.packet_type != PacketType::RadioErp1 {
            return None;
        }
        let telegram = RadioTelegram::try_from(frame).ok()?;
        Some(Self {
            rorg: telegram.rorg.to_string(),
            sender: telegram.sender.to_string(),
            status: format!("{:#04x}", telegram.status),
            user_data: hex(&telegram.user_data),
            dbm: telegram.dbm.map(|dbm| -i16::from(dbm)),
            teach_in: telegram.is_teach_in(),
        })
    }

    fn summary(&self) -> String {
        let mut out = format!(
            "rorg={} sender={} status={} data={}",
            self.rorg, self.sender, self.status, self.user_data
        );
        if let Some(dbm) = self.dbm {
            let _ = write!(out, " dbm={dbm}");
        }
        if self.teach_in {
            out.push_str(" teach-in");
        }
        out
    }
}

pub fn print_frame(frame: &Frame, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                packet_type: frame.packet_type.to_string(),
                data_size: frame.data.len(),
                optional_size: frame.optional.len(),
                data: hex(&frame.data),
                optional: hex(&frame.optional),
                telegram: TelegramOutput::from_frame(frame),
                timestamp: now_unix_seconds(),
            };
            print_json_line(&out);
        }
        OutputFormat::Table => {
            let telegram = TelegramOutput::from_frame(frame)
                .map(|t| t.summary())
                .unwrap_or_default();
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "DATA", "OPTIONAL", "TELEGRAM"])
                .add_row(vec![
                    frame.packet_type.to_string(),
                    hex(&frame.data),
                    hex(&frame.optional),
                    telegram,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => match TelegramOutput::from_frame(frame) {
            Some(telegram) => println!("{} {}", frame.packet_type, telegram.summary()),
            None => println!(
                "{} data={} optional={}",
                frame.packet_type,
                hex(&frame.data),
                hex(&frame.optional)
            ),
        },
        OutputFormat::Raw => match frame.to_bytes() {
            Ok(bytes) => print_raw(&bytes),
            Err(err) => eprintln!("cannot encode frame: {err}"),
        },
    }
}

/// Result of `check`: what the gateway would run with.
#[derive(Debug, Serialize)]
pub struct CheckSummary {
    pub config: String,
    pub port: String,
    pub sender_id: String,
    pub rules_file: String,
    pub rules: usize,
    pub devices: Vec<DeviceEntry>,
}

#[derive(Debug, Serialize)]
pub struct DeviceEntry {
    pub address: String,
    pub device_type: String,
    pub name: String,
}

pub fn print_check(summary: &CheckSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json_line(summary),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ADDRESS", "TYPE", "NAME"]);
            for device in &summary.devices {
                table.add_row(vec![
                    device.address.clone(),
                    device.device_type.clone(),
                    device.name.clone(),
                ]);
            }
            println!(
                "port={} sender={} rules={} ({})",
                summary.port, summary.sender_id, summary.rules, summary.rules_file
            );
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("config:  {}", summary.config);
            println!("port:    {}", summary.port);
            println!("sender:  {}", summary.sender_id);
            println!("rules:   {} from {}", summary.rules, summary.rules_file);
            for device in &summary.devices {
                println!(
                    "device:  {} {} ({})",
                    device.address, device.device_type, device.name
                );
            }
        }
    }
}

fn print_json_line<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02X}");
    }
    out
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
