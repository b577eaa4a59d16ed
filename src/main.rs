//! Purpose: `resumecount` CLI entry point.
//! Role: Binary crate root; parses args, layers config, runs one page load per command.
//! Invariants: Counting failures are notices on stderr, never a non-zero exit.
//! Invariants: Fatal errors are emitted as JSON on stderr when stderr is not a terminal.
//! Invariants: Process exit code is derived from `to_exit_code`.
#![allow(clippy::result_large_err)]
use std::ffi::OsString;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use resumecount::config::{SiteConfig, load_config};
use resumecount::counter::{FirstVisitFailure, RepeatVisit};
use resumecount::notice::{Notice, notice_json};
use resumecount::storage::StorageScope;
use resumecount::storage_paths::default_config_path;
use resumecount::{Error, ErrorKind, to_exit_code};

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
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse_from(std::env::args_os().collect::<Vec<OsString>>()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
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
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Try `resumecount --help`."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let color_mode = cli.color;
    let config = resolve_config(&cli).map_err(|err| (err, color_mode))?;

    command_dispatch::dispatch_command(cli.command, config, color_mode)
        .map_err(add_io_hint)
        .map_err(add_internal_hint)
        .map_err(|err| (err, color_mode))
}

/// Config file first, then env/flags on top.
fn resolve_config(cli: &Cli) -> Result<SiteConfig, Error> {
    let mut config = load_config(cli.config.as_deref(), &default_config_path())?;
    if let Some(endpoint) = &cli.endpoint {
        config.endpoint = Some(endpoint.clone());
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = Some(timeout_ms);
    }
    if let Some(dir) = &cli.storage_dir {
        config.storage.dir = Some(dir.clone());
    }
    if let Some(scope) = cli.scope {
        config.storage.scope = scope;
    }
    if let Some(repeat_visit) = cli.repeat_visit {
        config.counter.repeat_visit = repeat_visit;
    }
    if let Some(policy) = cli.on_first_failure {
        config.counter.first_visit_failure = policy;
    }
    Ok(config)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "resumecount",
    version,
    about = "Résumé page behaviors: typewriter job title and visitor counter",
    long_about = None,
    after_help = r#"EXAMPLES
  $ resumecount --endpoint https://api.example.com/prod/visitor visit
  $ resumecount count --json
  $ resumecount --scope session visit --no-animate
  $ resumecount storage clear

NOTES
  - Counter state lives in ~/.resumecount (override with --storage-dir)
  - Config file: ~/.resumecount/config.json (override with --config)
  - Set RUST_LOG=debug to trace requests and storage writes"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(long, help = "Config file (JSON)", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,
    #[arg(
        long,
        env = "RESUMECOUNT_ENDPOINT",
        help = "Counting endpoint URL (GET reads, POST increments)",
        value_hint = ValueHint::Url
    )]
    endpoint: Option<String>,
    #[arg(long, help = "Request timeout in milliseconds (default: transport default)")]
    timeout_ms: Option<u64>,
    #[arg(
        long,
        help = "Directory for counter state (default: ~/.resumecount)",
        value_hint = ValueHint::DirPath
    )]
    storage_dir: Option<PathBuf>,
    #[arg(long, value_enum, help = "Storage scope: browser|session")]
    scope: Option<StorageScope>,
    #[arg(long, value_enum, help = "Repeat visits: refresh (GET) or cached (no request)")]
    repeat_visit: Option<RepeatVisit>,
    #[arg(
        long,
        value_enum,
        help = "Failed first visit: retry next load, or mark-counted"
    )]
    on_first_failure: Option<FirstVisitFailure>,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Load the page: type the job title and show the visitor count")]
    Visit {
        #[arg(long, help = "Reveal the job title without waiting between characters")]
        no_animate: bool,
        #[arg(long, help = "Emit one JSON object instead of text")]
        json: bool,
    },
    #[command(about = "Run only the visitor counter")]
    Count {
        #[arg(long, help = "Emit one JSON object instead of text")]
        json: bool,
    },
    #[command(about = "Run only the typewriter animation")]
    Type {
        #[arg(long, help = "Reveal the text without waiting between characters")]
        no_animate: bool,
    },
    #[command(arg_required_else_help = true, about = "Inspect or reset counter state")]
    Storage {
        #[command(subcommand)]
        command: StorageCommand,
    },
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version info")]
    Version,
}

#[derive(Subcommand)]
enum StorageCommand {
    #[command(about = "Print stored keys as JSON")]
    Show,
    #[command(about = "Delete the store file holding the counter flag and cached count")]
    Clear,
}

fn add_io_hint(err: Error) -> Error {
    if err.hint().is_some() {
        return err;
    }
    match err.kind() {
        ErrorKind::Busy => err.with_hint("Storage is locked by another process. Retry shortly."),
        ErrorKind::Io => err.with_hint(
            "I/O error. Check the storage directory, permissions, and disk space (--storage-dir).",
        ),
        _ => err,
    }
}

fn add_internal_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Internal || err.hint().is_some() {
        return err;
    }
    err.with_hint("Unexpected internal failure. Retry with RUST_LOG=debug and RUST_BACKTRACE=1.")
}

fn emit_json(value: Value) {
    let encoded = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    let json = encoded.unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn emit_notice(notice: &Notice, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        let label = colorize_label("notice:", color_mode.use_color(is_tty), AnsiColor::Yellow);
        eprintln!("{label} {} (endpoint: {})", notice.message, notice.endpoint);
        return;
    }

    let json = serde_json::to_string(&notice_json(notice)).unwrap_or_else(|_| {
        "{\"notice\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
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
        ErrorKind::Request => "counting request failed".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Busy => "resource is busy".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
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
    inner.insert("kind".to_string(), json!(err.kind().as_str()));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = vec![format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    )];

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
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
