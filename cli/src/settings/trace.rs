use color_eyre::eyre::Result;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt,
    prelude::*,
    Layer,
};

/// Logging level. A "higher level" means more will be logged.
#[derive(Default, Debug, Clone, Copy, serde::Deserialize, PartialOrd, Ord, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Level {
    /// Off
    Off = 0,
    /// Error
    Error = 1,
    /// Info
    Info = 3,
    /// Debug
    Debug = 4,
    /// Trace
    Trace = 5,
    /// Warn
    #[serde(other)]
    #[default]
    Warn = 2,
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> LevelFilter {
        match level {
            Level::Off => LevelFilter::OFF,
            Level::Error => LevelFilter::ERROR,
            Level::Warn => LevelFilter::WARN,
            Level::Info => LevelFilter::INFO,
            Level::Debug => LevelFilter::DEBUG,
            Level::Trace => LevelFilter::TRACE,
        }
    }
}

/// Basic tracing configuration
#[derive(Debug, Clone, Copy, Default, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Style {
    /// Pretty print
    Pretty,
    /// JSON
    Json,
    /// Compact
    Compact,
    /// Default style
    #[serde(other)]
    #[default]
    Default,
}

/// Configuration for the tracing subscriber of the `hl` binary. Everything
/// is written to stderr so stdout only carries results.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct TracingConfig {
    /// The logging style. json | pretty | compact | default
    #[serde(default)]
    pub style: Style,
    /// The logging level. Defaults to warn
    #[serde(default)]
    pub level: Level,
}

impl TracingConfig {
    /// Per-target filter: the configured level, with HTTP client internals
    /// held at info below trace.
    pub fn targets(&self) -> Targets {
        let mut target_layer = Targets::new().with_default(self.level);
        if self.level < Level::Trace {
            // only show these debug and trace logs at trace level
            target_layer = target_layer.with_target("hyper", Level::Info.min(self.level));
            target_layer = target_layer.with_target("reqwest", Level::Info.min(self.level));
        }
        target_layer
    }

    /// Attempt to instantiate and register a tracing subscriber setup from
    /// settings.
    pub fn start_tracing(&self) -> Result<()> {
        let fmt_layer = fmt::layer().with_writer(std::io::stderr);
        let fmt_layer = match self.style {
            Style::Pretty => fmt_layer.pretty().boxed(),
            Style::Json => fmt_layer.json().boxed(),
            Style::Compact => fmt_layer.compact().boxed(),
            Style::Default => fmt_layer.boxed(),
        };
        let err_layer = tracing_error::ErrorLayer::default();

        tracing_subscriber::Registry::default()
            .with(self.targets())
            .with(fmt_layer)
            .with(err_layer)
            .try_init()?;
        Ok(())
    }
}
