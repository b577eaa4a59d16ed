//! Purpose: Hold top-level CLI command dispatch for `resumecount`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Each command runs on one current-thread runtime (one event loop per load).
//! Invariants: Stdout carries only the rendered page text or the JSON record.

use super::*;
use resumecount::counter::{Visit, VisitorCounter};
use resumecount::notice::fallback_notice;
use resumecount::page::{JOB_ELEMENT, MemorySlot, TerminalSlot, load_page};
use resumecount::storage::Store;
use resumecount::typewriter::{TokioClock, VirtualClock};

pub(super) fn dispatch_command(
    command: Command,
    config: SiteConfig,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "resumecount", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            println!("resumecount {}", env!("CARGO_PKG_VERSION"));
            Ok(RunOutcome::ok())
        }
        Command::Visit { no_animate, json } => {
            let animate = !no_animate && !json && io::stdout().is_terminal();
            let endpoint = config.endpoint()?;
            let endpoint_url = endpoint.url().to_string();
            let typewriter = config.typewriter();
            let mut counter =
                VisitorCounter::new(config.store(), endpoint).with_policy(config.counter);
            let mut visitors = MemorySlot::new();
            let runtime = page_runtime()?;

            let visit = if animate {
                let mut job = TerminalSlot::stdout();
                let visit = runtime.block_on(load_page(
                    &typewriter,
                    &TokioClock,
                    &mut job,
                    &mut counter,
                    &mut visitors,
                ));
                job.finish();
                visit
            } else {
                let mut job = MemorySlot::new();
                let visit = runtime.block_on(load_page(
                    &typewriter,
                    &VirtualClock::new(),
                    &mut job,
                    &mut counter,
                    &mut visitors,
                ));
                if !json {
                    println!("{}", job.text());
                }
                visit
            };

            report_fallback("visit", &endpoint_url, &visit, color_mode);
            if json {
                let mut value = visit_json(&visit);
                value[JOB_ELEMENT] = json!(typewriter.text());
                emit_json(value);
            } else {
                println!("{}", visitors.text());
            }
            Ok(RunOutcome::ok())
        }
        Command::Count { json } => {
            let endpoint = config.endpoint()?;
            let endpoint_url = endpoint.url().to_string();
            let mut counter =
                VisitorCounter::new(config.store(), endpoint).with_policy(config.counter);
            let mut visitors = MemorySlot::new();
            let runtime = page_runtime()?;

            let visit = runtime.block_on(counter.load_into(&mut visitors));

            report_fallback("count", &endpoint_url, &visit, color_mode);
            if json {
                emit_json(visit_json(&visit));
            } else {
                println!("{}", visitors.text());
            }
            Ok(RunOutcome::ok())
        }
        Command::Type { no_animate } => {
            let typewriter = config.typewriter();
            if !no_animate && io::stdout().is_terminal() {
                let runtime = page_runtime()?;
                let mut job = TerminalSlot::stdout();
                runtime.block_on(typewriter.play(&TokioClock, &mut job));
                job.finish();
            } else {
                let mut job = MemorySlot::new();
                page_runtime()?.block_on(typewriter.play(&VirtualClock::new(), &mut job));
                println!("{}", job.text());
            }
            Ok(RunOutcome::ok())
        }
        Command::Storage { command } => {
            let store = config.store();
            match command {
                StorageCommand::Show => {
                    let entries = store.entries()?;
                    emit_json(json!({
                        "path": store.path().display().to_string(),
                        "scope": scope_label(config.storage.scope),
                        "entries": entries,
                    }));
                }
                StorageCommand::Clear => {
                    let path = store.path().display().to_string();
                    store.destroy()?;
                    emit_json(json!({
                        "cleared": path,
                        "scope": scope_label(config.storage.scope),
                    }));
                }
            }
            Ok(RunOutcome::ok())
        }
    }
}

fn page_runtime() -> Result<tokio::runtime::Runtime, Error> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to start event loop")
                .with_source(err)
        })
}

fn report_fallback(cmd: &str, endpoint: &str, visit: &Visit, color_mode: ColorMode) {
    if let Some(notice) = fallback_notice(cmd, endpoint, visit) {
        emit_notice(&notice, color_mode);
    }
}

fn visit_json(visit: &Visit) -> Value {
    json!({
        "visitors": visit.display_text(),
        "count": visit.count,
        "source": visit.source.as_str(),
        "request": visit.request.as_str(),
    })
}

fn scope_label(scope: StorageScope) -> &'static str {
    match scope {
        StorageScope::Browser => "browser",
        StorageScope::Session => "session",
    }
}
