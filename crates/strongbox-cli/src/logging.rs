//! Log subscriber setup.
//!
//! Logs go to `~/.strongbox/strongbox.log` so they never interleave with
//! command output. If the file cannot be opened they go to stderr.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use strongbox_core::{paths, LogLevel};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives for `level`. Keeps WebSocket internals quiet below debug.
pub fn filter_directives(level: LogLevel) -> String {
    format!("{level},tungstenite=warn,tokio_tungstenite=warn,rustls=warn")
}

/// Install the global subscriber. Returns the log file path when logging to a file.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(level: LogLevel) -> Option<PathBuf> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));

    let (writer, path) = match open_log_file() {
        Some((file, path)) => (BoxMakeWriter::new(Mutex::new(file)), Some(path)),
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .init();

    path
}

fn open_log_file() -> Option<(std::fs::File, PathBuf)> {
    paths::ensure_base_dir().ok()?;
    let path = paths::log_file().ok()?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .ok()?;
    Some((file, path))
}
