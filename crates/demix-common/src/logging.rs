//! Tracing setup shared by the demix binaries
//!
//! Each binary names its [`Component`], which picks the default level, the
//! per-crate filter directives and the log file prefix. Environment
//! variables override those defaults:
//!
//! - `LOG_LEVEL`: trace, debug, info, warn, error
//! - `LOG_FORMAT`: text or json
//! - `LOG_DIR`: also write daily rotated files into this directory
//! - `LOG_FILTER`: extra directives, e.g. `sqlx=debug,tower_http=info`
//! - `LOG_INCLUDE_LOCATION`: true/false
//!
//! Use the structured macros with fields rather than `println!`:
//!
//! ```rust,ignore
//! info!(job_id = %job.job_id, "Job received");
//! error!(job_id = %job.job_id, stage = %stage, error = %err, "Job abandoned");
//! ```
//!
//! # Example
//!
//! ```no_run
//! use demix_common::logging::{init_logging, Component, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::for_component(Component::Worker).with_env()?;
//!     let _guard = init_logging(&config)?;
//!     tracing::info!("Worker started");
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// The demix process doing the logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Server,
    Worker,
    LogTail,
}

impl Component {
    pub fn name(self) -> &'static str {
        match self {
            Component::Server => "demix-server",
            Component::Worker => "demix-worker",
            Component::LogTail => "demix-logs",
        }
    }

    fn default_level(self) -> Level {
        match self {
            Component::Server | Component::Worker => Level::INFO,
            // Its stdout is the log channel itself.
            Component::LogTail => Level::WARN,
        }
    }

    fn default_directives(self) -> &'static [&'static str] {
        match self {
            Component::Server => &["demix_server=debug", "tower_http=debug", "sqlx=warn"],
            Component::Worker => &["demix_server=debug", "sqlx=warn", "aws_smithy_runtime=warn"],
            Component::LogTail => &["sqlx=error"],
        }
    }

    fn console_is_stderr(self) -> bool {
        matches!(self, Component::LogTail)
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub component: Component,
    pub level: Level,
    pub json: bool,
    /// When set, logs are also written to daily files named after the component.
    pub log_dir: Option<PathBuf>,
    pub directives: Vec<String>,
    pub include_location: bool,
}

impl LogConfig {
    pub fn for_component(component: Component) -> Self {
        Self {
            component,
            level: component.default_level(),
            json: false,
            log_dir: None,
            directives: component
                .default_directives()
                .iter()
                .map(|d| d.to_string())
                .collect(),
            include_location: false,
        }
    }

    /// Overlay `LOG_*` environment variables on top of `self`.
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.level = level
                .parse()
                .with_context(|| format!("Invalid LOG_LEVEL '{}'", level))?;
        }

        if let Ok(format) = std::env::var("LOG_FORMAT") {
            self.json = match format.to_lowercase().as_str() {
                "json" => true,
                "text" | "pretty" => false,
                other => anyhow::bail!("Invalid LOG_FORMAT '{}'", other),
            };
        }

        if let Ok(dir) = std::env::var("LOG_DIR") {
            self.log_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }

        if let Ok(filter) = std::env::var("LOG_FILTER") {
            self.directives.extend(split_directives(&filter));
        }

        if let Ok(val) = std::env::var("LOG_INCLUDE_LOCATION") {
            self.include_location = val.parse().unwrap_or(false);
        }

        Ok(self)
    }

    fn filter(&self) -> Result<EnvFilter> {
        let mut filter = EnvFilter::from_default_env().add_directive(self.level.into());
        for directive in &self.directives {
            filter = filter.add_directive(
                directive
                    .parse()
                    .with_context(|| format!("Failed to parse filter directive '{}'", directive))?,
            );
        }
        Ok(filter)
    }
}

fn split_directives(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn fmt_layer<W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'a> fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(ansi);

    if config.json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// Install the global subscriber. Call once at startup.
///
/// When file output is enabled the returned guard flushes the file writer on
/// drop, so keep it alive until the process exits.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.component.console_is_stderr() {
        layers.push(fmt_layer(config, std::io::stderr, true));
    } else {
        layers.push(fmt_layer(config, std::io::stdout, true));
    }

    if let Some(dir) = &config.log_dir {
        std::fs::create_dir_all(dir).context("Failed to create log directory")?;

        let appender = tracing_appender::rolling::daily(dir, config.component.name());
        let (non_blocking, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);

        layers.push(fmt_layer(config, non_blocking, false));
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(config.filter()?)
        .try_init()?;

    Ok(guard)
}
