use std::path::Path;

use anyhow::{anyhow, Result};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Rotated log files kept next to the current one.
const LOG_FILES_KEPT: usize = 10;

/// 0: info, 1: debug, 2 and more: trace.
fn directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn env_filter(verbosity: u8) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(verbosity)))
}

fn stderr_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
}

/// Logs to stderr and, when `log_file` is set, to a daily rotated file
/// named after it (`<log_file>.YYYY-MM-DD`) too.
///
/// The returned guard flushes the file on drop and must outlive every log
/// call.
pub(crate) fn init(verbosity: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let file = match log_file {
        Some(path) => match file_writer(path) {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("persistent-disk: failed to initialize file logging: {e:#}");
                None
            }
        },
        None => None,
    };

    match file {
        Some((writer, guard)) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);

            tracing_subscriber::registry()
                .with(env_filter(verbosity))
                .with(stderr_layer())
                .with(file_layer)
                .try_init()?;

            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter(verbosity))
                .with(stderr_layer())
                .try_init()?;

            Ok(None)
        }
    }
}

/// Console-only logging for failures that happen before the
/// configuration is known. Does nothing once logging is set up.
pub(crate) fn init_console(verbosity: u8) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(verbosity))
        .with(stderr_layer())
        .try_init();
}

fn file_writer(path: &Path) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("invalid log file: {}", path.display()))?;

    let appender = Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(LOG_FILES_KEPT)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .map_err(|e| anyhow!("open log file {} failed: {}", path.display(), e))?;

    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn verbosity_levels() {
        assert_eq!(directive(0), "info");
        assert_eq!(directive(1), "debug");
        assert_eq!(directive(2), "trace");
        assert_eq!(directive(7), "trace");
    }

    #[test]
    fn log_file_is_rotated() -> Result<()> {
        let dir = std::env::temp_dir().join(format!("pdisk-logging-{}", std::process::id()));
        std::fs::create_dir_all(&dir)?;

        let (_writer, _guard) = file_writer(&dir.join("pdisk.log"))?;

        let names = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect::<Vec<String>>();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("pdisk.log."));

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn log_file_without_name() {
        assert!(file_writer(Path::new("/")).is_err());
    }
}
