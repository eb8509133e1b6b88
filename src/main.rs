//! Purpose: `strblob` CLI entry point for packing and inspecting string blobs.
//! Role: Binary crate root; parses args, installs logging, runs commands, emits JSON on stdout.
//! Invariants: Commands emit stable stdout formats (JSON objects or JSON Lines).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use strblob::api::{Error, ErrorKind, StringField, to_exit_code};
use tracing_subscriber::EnvFilter;

mod command_dispatch;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run(std::env::args_os()) {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run<I>(args: I) -> Result<RunOutcome, Error>
where
    I: IntoIterator<Item = OsString>,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run `strblob --help` for usage."));
            }
        },
    };

    init_tracing(&cli.log_level);

    command_dispatch::dispatch_command(cli.command)
        .map_err(add_corrupt_hint)
        .map_err(add_internal_hint)
}

#[derive(Parser, Debug)]
#[command(
    name = "strblob",
    version,
    about = "Pack and inspect blobs of length-prefixed UTF-8 strings",
    long_about = None,
    after_help = r#"EXAMPLES
  $ strblob pack names.blob names.txt --offsets
  $ strblob dump names.blob --limit 20
  $ strblob get names.blob 14

LOGGING
  RUST_LOG overrides --log-level (e.g. RUST_LOG=strblob=trace)."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = "warn",
        help = "Log filter used when RUST_LOG is unset"
    )]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Pack newline-separated strings into a blob")]
    Pack {
        #[arg(help = "Blob file to write", value_hint = ValueHint::FilePath)]
        output: PathBuf,
        #[arg(help = "Input text file (default: stdin)", value_hint = ValueHint::FilePath)]
        input: Option<PathBuf>,
        #[arg(long, help = "Include the offset of every packed string in the summary")]
        offsets: bool,
    },
    #[command(about = "Print every field of a blob as JSON Lines")]
    Dump {
        #[arg(help = "Blob file to read", value_hint = ValueHint::FilePath)]
        blob: PathBuf,
        #[arg(long, default_value_t = 0, help = "Offset of the first field to print")]
        start: u64,
        #[arg(long, help = "Stop after this many fields")]
        limit: Option<usize>,
    },
    #[command(about = "Print the field at a byte offset")]
    Get {
        #[arg(help = "Blob file to read", value_hint = ValueHint::FilePath)]
        blob: PathBuf,
        #[arg(help = "Offset of the field's length prefix")]
        offset: u64,
    },
    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version info")]
    Version,
}

#[derive(Debug, Serialize)]
struct FieldRecord<'a> {
    offset: u64,
    declared_len: usize,
    len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    lossy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> FieldRecord<'a> {
    fn from_field(field: &'a StringField) -> Self {
        let mut record = Self {
            offset: field.offset(),
            declared_len: field.len() + 1,
            len: field.len(),
            text: None,
            lossy: None,
            error: None,
        };
        match field.text() {
            Ok(text) => record.text = Some(text),
            Err(err) => {
                record.lossy = Some(field.lossy_text().into_owned());
                record.error = Some(format!("{:?}", err.kind()));
            }
        }
        record
    }

    fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

fn init_tracing(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_json_line(record: &impl Serialize) {
    let json = serde_json::to_string(record)
        .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_version_output() {
    if io::stdout().is_terminal() {
        println!("strblob {}", env!("CARGO_PKG_VERSION"));
    } else {
        emit_json(json!({
            "name": "strblob",
            "version": env!("CARGO_PKG_VERSION"),
        }));
    }
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn add_corrupt_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Truncated | ErrorKind::MalformedLength => err.with_hint(
            "The blob is corrupt or the offset does not point at a field's length prefix.",
        ),
        ErrorKind::InvalidEncoding => {
            err.with_hint("The field bytes are not UTF-8; `strblob dump` shows a lossy rendering.")
        }
        _ => err,
    }
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint(
        "Unexpected internal failure. Retry with RUST_BACKTRACE=1 and share command/context if it persists.",
    )
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Truncated => "stream ended inside a field".to_string(),
        ErrorKind::MalformedLength => "malformed length prefix".to_string(),
        ErrorKind::InvalidEncoding => "invalid UTF-8".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(data_set) = err.data_set() {
        inner.insert("data_set".to_string(), json!(data_set));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(data_set) = err.data_set() {
        lines.push(format!("data set: {data_set}"));
    }
    if let Some(offset) = err.offset() {
        lines.push(format!("offset: {offset}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}
