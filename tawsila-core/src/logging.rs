use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::Context;
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

type FormatLayer = Box<dyn Layer<Registry> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    fn parse(format: &str) -> anyhow::Result<Self> {
        match format.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err(anyhow::anyhow!("Invalid log format: {format}")),
        }
    }
}

/// Install the global subscriber described by `config`
///
/// `RUST_LOG` overrides the configured level. Output goes to stderr unless a
/// file is configured, so command output on stdout stays clean.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = parse_log_level(&config.level)?;
    let format = LogFormat::parse(&config.format)?;
    let writer = open_writer(config.file_path.as_deref())?;

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(format_layer(format, writer))
        .with(filter)
        .try_init()?;

    Ok(())
}

fn format_layer(format: LogFormat, writer: BoxMakeWriter) -> FormatLayer {
    let layer = fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_line_number(true)
        .with_writer(writer);

    match format {
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_file(true)
            .boxed(),
        LogFormat::Pretty => layer.pretty().with_file(false).boxed(),
    }
}

/// Append to the log file when one is set, stderr otherwise
fn open_writer(file_path: Option<&str>) -> anyhow::Result<BoxMakeWriter> {
    let Some(path) = file_path else {
        return Ok(BoxMakeWriter::new(std::io::stderr));
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {path}"))?;
    Ok(BoxMakeWriter::new(Arc::new(file)))
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}
