use std::fs;
use std::time::Duration;

use wirecall_envelope::WireError;
use wirecall_session::{connect, CallError};

use crate::cmd::CallArgs;
use crate::exit::{call_error, session_error, CliError, CliResult, REMOTE_ERROR, SUCCESS, USAGE};
use crate::output::{print_reply, OutputFormat};

pub async fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let deadline = parse_duration(&args.timeout)?;
    let payload = resolve_payload(&args)?;

    let connection = connect(&args.path)
        .await
        .map_err(|err| session_error("connect failed", err))?;

    let handle = connection
        .invoke_with_deadline(&args.command, payload, Some(deadline))
        .await
        .map_err(|err| session_error("invoke failed", err))?;
    let correlation_id = handle.id().to_string();

    let exit_code = match handle.wait().await {
        Ok(payload) => {
            print_reply(&args.command, &correlation_id, Ok(&payload), format);
            SUCCESS
        }
        Err(CallError::Remote { code, message }) => {
            let error = WireError { code, message };
            print_reply(&args.command, &correlation_id, Err(&error), format);
            REMOTE_ERROR
        }
        Err(err) => return Err(call_error("call failed", err)),
    };

    connection.close();
    Ok(exit_code)
}

fn resolve_payload(args: &CallArgs) -> CliResult<serde_json::Value> {
    if let Some(json) = &args.json {
        return serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")));
    }
    if let Some(path) = &args.file {
        let raw = fs::read_to_string(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        })?;
        return serde_json::from_str(&raw).map_err(|err| {
            CliError::new(USAGE, format!("{} is not valid JSON: {err}", path.display()))
        });
    }
    Ok(serde_json::json!({}))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_args(json: Option<&str>) -> CallArgs {
        CallArgs {
            path: "/tmp/test.sock".into(),
            command: "echo".to_string(),
            json: json.map(str::to_string),
            file: None,
            timeout: "5s".to_string(),
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn payload_defaults_to_empty_object() {
        let payload = resolve_payload(&call_args(None)).expect("default payload");
        assert_eq!(payload, serde_json::json!({}));
    }

    #[test]
    fn payload_rejects_invalid_json() {
        let err = resolve_payload(&call_args(Some("{nope"))).expect_err("invalid json");
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn payload_parses_inline_json() {
        let payload =
            resolve_payload(&call_args(Some(r#"{"text":"hi"}"#))).expect("payload parses");
        assert_eq!(payload, serde_json::json!({"text": "hi"}));
    }
}
