use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use wirecall_envelope::WireError;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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
struct ReplyOutput<'a> {
    cmd: &'a str,
    correlation_id: &'a str,
    outcome: &'a str,
    payload: Option<&'a serde_json::Value>,
    error: Option<&'a WireError>,
    timestamp: String,
}

pub fn print_reply(
    cmd: &str,
    correlation_id: &str,
    outcome: Result<&serde_json::Value, &WireError>,
    format: OutputFormat,
) {
    let (label, payload, error) = match outcome {
        Ok(payload) => ("ok", Some(payload), None),
        Err(error) => ("error", None, Some(error)),
    };

    match format {
        OutputFormat::Json => {
            let out = ReplyOutput {
                cmd,
                correlation_id,
                outcome: label,
                payload,
                error,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let detail = match outcome {
                Ok(payload) => compact_json(payload),
                Err(error) => format!("{} ({})", error.message, error.code),
            };
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["COMMAND", "OUTCOME", "DETAIL"])
                .add_row(vec![cmd.to_string(), label.to_string(), detail]);
            println!("{table}");
        }
        OutputFormat::Pretty => match outcome {
            Ok(payload) => println!(
                "{cmd} -> ok: {}",
                serde_json::to_string_pretty(payload).unwrap_or_else(|_| "<?>".to_string())
            ),
            Err(error) => println!("{cmd} -> error {}: {}", error.code, error.message),
        },
    }
}

fn compact_json(value: &serde_json::Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "<?>".to_string())
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
