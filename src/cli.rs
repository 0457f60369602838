use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use bizreg::app::{self, Cli};
use bizreg::client::HttpUpstream;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help / --version
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    let _guard = init_tracing(cli.log_dir.as_deref());

    match execute(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "bizreg failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: &Cli) -> bizreg::Result<()> {
    let config = cli.config()?;
    let upstream = HttpUpstream::new(config.api.clone())?;
    let mut stdout = std::io::stdout().lock();
    app::run(cli, &config, Arc::new(upstream), &mut stdout).await
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`), and optionally to
/// a timestamped file under `log_dir`.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let file_writer = log_dir
        .and_then(|dir| {
            let name = format!("bizreg-{}.log", chrono::Local::now().format("%Y-%m-%d-%H-%M-%S"));
            open_log_file(dir, &name)
        })
        .map(tracing_appender::non_blocking);

    match file_writer {
        Some((writer, guard)) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

/// Open `dir/name` for logging. Failures are reported on stderr and leave
/// logging on stderr only.
fn open_log_file(dir: &Path, name: &str) -> Option<RollingFileAppender> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("warning: cannot create log directory {}: {e}", dir.display());
        return None;
    }
    match RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
    {
        Ok(appender) => Some(appender),
        Err(e) => {
            eprintln!("warning: cannot open log file in {}: {e}", dir.display());
            None
        }
    }
}
