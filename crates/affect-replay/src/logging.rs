//! stderr tracing with an optional daily log file.

use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "affect-replay.log";

/// Installs the global subscriber. Events go to stderr so a report on stdout
/// stays clean JSON. With `log_dir` set they are mirrored to a daily file and
/// the returned guard must be held until exit.
pub fn init_tracing(log_level: &str, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir.map(daily_writer) {
        Some(Ok((writer, guard))) => (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        ),
        Some(Err(err)) => {
            eprintln!("affect-replay: file logging disabled: {err}");
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    guard
}

fn daily_writer(dir: &Path) -> std::io::Result<(NonBlocking, WorkerGuard)> {
    std::fs::create_dir_all(dir)?;
    Ok(tracing_appender::non_blocking(rolling::daily(dir, LOG_FILE_PREFIX)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_writer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs").join("replay");
        let (_writer, _guard) = daily_writer(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
