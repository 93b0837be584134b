// screendiary — your desktop, remembered and searchable
// https://github.com/hermanntoast/screendiary

//! tracing setup. `RUST_LOG` wins over the configured level; with
//! `logging.file` enabled, output additionally rolls daily under
//! `<data_dir>/logs`.

use screendiary_core::config::LoggingConfig;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Keep this alive for the process lifetime — dropping it flushes and
/// stops the background log writer.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

pub fn init(config: &LoggingConfig, data_dir: &Path) -> LogGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    if config.file {
        let appender = tracing_appender::rolling::daily(data_dir.join("logs"), "screendiary.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        LogGuard {
            _file_guard: Some(guard),
        }
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        LogGuard { _file_guard: None }
    }
}
