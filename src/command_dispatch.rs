//! Purpose: Hold top-level CLI command dispatch for `strblob`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: `dump` reports undecodable text per record and keeps going; structural errors stop it.
//! Invariants: Exit codes come from the error kind of the first fatal or per-record failure.

use std::fs;
use std::io::Read;
use std::path::Path;

use strblob::api::{StringRegion, encode_field};

use super::*;

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Pack {
            output,
            input,
            offsets,
        } => {
            let text = read_input(input.as_deref())?;
            let packed = pack_lines(&text)?;
            fs::write(&output, &packed.bytes).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to write blob")
                    .with_path(&output)
                    .with_source(err)
            })?;
            tracing::debug!(
                path = %output.display(),
                fields = packed.offsets.len(),
                bytes = packed.bytes.len(),
                "packed string blob"
            );

            let mut summary = json!({
                "path": output.display().to_string(),
                "fields": packed.offsets.len(),
                "bytes": packed.bytes.len(),
            });
            if offsets {
                summary["offsets"] = json!(packed.offsets);
            }
            emit_json(summary);
            Ok(RunOutcome::ok())
        }
        Command::Dump { blob, start, limit } => {
            let region = StringRegion::open(&blob)?;
            let mut invalid = false;
            for field in region.fields_from(start)?.take(limit.unwrap_or(usize::MAX)) {
                let field = field?;
                let record = FieldRecord::from_field(&field);
                invalid |= !record.is_valid();
                emit_json_line(&record);
            }
            if invalid {
                return Ok(RunOutcome::with_code(to_exit_code(ErrorKind::InvalidEncoding)));
            }
            Ok(RunOutcome::ok())
        }
        Command::Get { blob, offset } => {
            let region = StringRegion::open(&blob)?;
            let field = region.field_at(offset)?;
            let record = FieldRecord::from_field(&field);
            let value = serde_json::to_value(&record).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to encode field record")
                    .with_source(err)
            })?;
            emit_json(value);
            if !record.is_valid() {
                return Ok(RunOutcome::with_code(to_exit_code(ErrorKind::InvalidEncoding)));
            }
            Ok(RunOutcome::ok())
        }
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "strblob", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_version_output();
            Ok(RunOutcome::ok())
        }
    }
}

#[derive(Debug, Default)]
struct Packed {
    bytes: Vec<u8>,
    offsets: Vec<u64>,
}

fn pack_lines(text: &str) -> Result<Packed, Error> {
    let mut packed = Packed::default();
    for (index, line) in text.lines().enumerate() {
        packed.offsets.push(packed.bytes.len() as u64);
        encode_field(&mut packed.bytes, line.as_bytes()).map_err(|err| {
            let message = err.message().unwrap_or("string too long").to_string();
            err.with_message(format!("line {}: {message}", index + 1))
        })?;
    }
    Ok(packed)
}

fn read_input(path: Option<&Path>) -> Result<String, Error> {
    match path {
        Some(path) => fs::read_to_string(path).map_err(|err| {
            Error::new(input_error_kind(&err))
                .with_message("failed to read input")
                .with_path(path)
                .with_source(err)
        }),
        None => {
            let mut text = String::new();
            io::stdin().read_to_string(&mut text).map_err(|err| {
                Error::new(input_error_kind(&err))
                    .with_message("failed to read stdin")
                    .with_source(err)
            })?;
            Ok(text)
        }
    }
}

// Non-UTF-8 input is a caller mistake, not an I/O failure.
fn input_error_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::InvalidData => ErrorKind::Usage,
        _ => ErrorKind::Io,
    }
}
