//! Line-oriented I/O for the CLI
//!
//! - Input: one command per stdin line, newline stripped
//! - Output: one JSON object per stdout line
//! - Empty input lines are skipped

use std::io::{self, BufRead, Write};

use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Read commands from stdin until EOF
pub fn read_commands() -> impl Iterator<Item = CliResult<Vec<u8>>> {
    commands_from(io::stdin().lock())
}

/// Read commands from any buffered reader
pub fn commands_from<R: BufRead>(reader: R) -> impl Iterator<Item = CliResult<Vec<u8>>> {
    reader
        .split(b'\n')
        .map(|line| {
            let mut line = line.map_err(CliError::from)?;
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            Ok(line)
        })
        .filter(|line| !matches!(line, Ok(bytes) if bytes.is_empty()))
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "ok",
        "data": data
    });
    write_line(&mut io::stdout().lock(), &response)
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    let response = serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    });
    write_line(&mut io::stdout().lock(), &response)
}

/// Write one JSON value followed by a newline
pub fn write_line<W: Write>(writer: &mut W, value: &Value) -> CliResult<()> {
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    writer.write_all(&line)?;
    writer.flush()?;
    Ok(())
}
