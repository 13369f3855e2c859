//! JSON I/O handling for CLI
//!
//! - Input: one load event per line on stdin
//! - Output: a single JSON object on stdout, except for `export`; log lines
//!   never share stdout with it
//! - UTF-8 only

use std::io::{BufRead, Write};

use serde_json::Value;

use super::errors::{CliError, CliResult};
use crate::loader::LoadEvent;

/// Parses JSON-lines load events; blank lines are skipped
pub fn read_events<R: BufRead>(reader: R) -> impl Iterator<Item = CliResult<LoadEvent>> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(n, line)| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str(&line).map_err(|e| {
                CliError::input_error(format!("line {}: {}", n + 1, e))
            })),
            Err(e) => Some(Err(CliError::from(e))),
        })
}

/// Write a success response
pub fn write_response<W: Write>(out: &mut W, data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });

    serde_json::to_writer(&mut *out, &response)?;
    writeln!(out)?;
    out.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_events() {
        let input = "{\"event\":\"start\",\"name\":\"a\"}\n\n{\"event\":\"end\"}\n";
        let events: Vec<LoadEvent> = read_events(Cursor::new(input))
            .collect::<CliResult<_>>()
            .unwrap();
        assert_eq!(events, vec![LoadEvent::start("a"), LoadEvent::End]);
    }

    #[test]
    fn test_bad_event_line() {
        let input = "{\"event\":\"start\",\"name\":\"a\"}\n{\"event\":\"jump\"}\n";
        let results: Vec<_> = read_events(Cursor::new(input)).collect();
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.code_str(), "XTREE_CLI_INPUT_ERROR");
        assert!(err.message().starts_with("line 2:"));
    }

    #[test]
    fn test_response_is_one_json_value() {
        let mut out = Vec::new();
        write_response(&mut out, serde_json::json!({"records": 3})).unwrap();
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["data"]["records"], 3);
    }
}
