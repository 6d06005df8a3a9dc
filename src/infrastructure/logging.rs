//! Subscriber setup for applications embedding the link
//!
//! The link itself only emits `tracing` events. A binary that wants them on
//! the console or in rolling files calls [`init_logger`] once at startup.
//! Available with the default `logging` feature.

use crate::domain::settings::LogSettings;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::{prelude::*, EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the file writer alive. Dropping it flushes buffered lines.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_writer: Option<WorkerGuard>,
}

fn rotation_from_name(name: &str) -> Rotation {
    match name.trim().to_lowercase().as_str() {
        "hourly" => Rotation::HOURLY,
        "minutely" => Rotation::MINUTELY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

/// Directives used when `RUST_LOG` is unset: the link at the configured
/// level, every other target at `warn`.
fn default_directives(level: &str) -> String {
    let level = match level.trim().to_lowercase().as_str() {
        l @ ("trace" | "debug" | "info" | "warn" | "error" | "off") => l.to_string(),
        _ => "info".to_string(),
    };
    format!("warn,{}={}", env!("CARGO_CRATE_NAME"), level)
}

fn build_filter(settings: &LogSettings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&settings.level)))
}

fn fmt_layer<W>(settings: &LogSettings, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_file(settings.show_file_line)
        .with_line_number(settings.show_file_line)
        .with_thread_ids(settings.show_thread_ids)
        .with_target(settings.show_target)
        .boxed()
}

/// Install the global subscriber described by `settings`.
///
/// Fails if the log directory cannot be created or a global subscriber is
/// already installed.
pub fn init_logger(settings: &LogSettings) -> anyhow::Result<LoggingGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if settings.console_logging_enabled {
        layers.push(fmt_layer(settings, std::io::stdout, settings.ansi_colors));
    }

    let mut file_writer = None;
    if settings.file_logging_enabled {
        let appender = RollingFileAppender::builder()
            .rotation(rotation_from_name(&settings.rotation))
            .filename_prefix(settings.file_name_prefix.as_str())
            .filename_suffix("log")
            .build(&settings.log_dir)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        layers.push(fmt_layer(settings, writer, false));
        file_writer = Some(guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(build_filter(settings))
        .try_init()?;

    tracing::info!(
        log_level = %settings.level,
        file = settings.file_logging_enabled,
        "Link logging initialized"
    );

    Ok(LoggingGuard {
        _file_writer: file_writer,
    })
}
