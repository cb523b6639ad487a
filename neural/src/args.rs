use std::{borrow::Cow, fmt, io::IsTerminal, path::PathBuf, str::FromStr};

use clap::{Parser, ValueEnum};
use config::{Config, LimiterConfig};
use logforth::filter::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "Neural", version, long_about = concat!("Neural limiter probe v", env!("CARGO_PKG_VERSION")))]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(long, short, env = "NEURAL_CONFIG_PATH", default_value = "./neural.toml")]
    pub config: PathBuf,
    /// Only probe the limiter with this identity. All configured limiters are probed by default.
    #[arg(long, short)]
    pub identity: Option<String>,
    /// Disciplines to probe, comma separated. All three by default.
    #[arg(long, short, value_enum, value_delimiter = ',')]
    pub discipline: Vec<Discipline>,
    /// How many acquisitions to attempt per discipline.
    #[arg(long, short, default_value_t = 1)]
    pub attempts: u32,
    /// Give back every concurrency slot the probe took before exiting.
    #[arg(long)]
    pub release: bool,
    /// Set the logging level, this applies to all log events.
    #[arg(long = "log", env = "NEURAL_LOG", default_value_t = LogLevel::default())]
    pub log_level: LogLevel,
    /// Set the style of log output
    #[arg(long, env = "NEURAL_LOG_STYLE", default_value_t = LogStyle::default())]
    pub log_style: LogStyle,
}

impl Args {
    pub fn config(&self) -> anyhow::Result<Config> {
        let config = if self.config.exists() {
            Config::load(&self.config)?
        } else {
            Config::default()
        };

        Ok(config)
    }

    /// The configured limiters selected by `--identity`.
    pub fn limiters<'a>(&self, config: &'a Config) -> anyhow::Result<Vec<&'a LimiterConfig>> {
        match &self.identity {
            Some(identity) => match config.limiter(identity) {
                Some(limiter) => Ok(vec![limiter]),
                None => anyhow::bail!("No limiter with identity '{identity}' is configured"),
            },
            None => Ok(config.limiters.iter().collect()),
        }
    }

    pub fn disciplines(&self) -> &[Discipline] {
        if self.discipline.is_empty() {
            &Discipline::ALL
        } else {
            &self.discipline
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub(crate) enum Discipline {
    /// Simultaneous in-flight acquisitions
    Concurrent,
    /// Token bucket
    Rate,
    /// Fixed request window
    Request,
}

impl Discipline {
    const ALL: [Discipline; 3] = [Discipline::Concurrent, Discipline::Rate, Discipline::Request];
}

impl AsRef<str> for Discipline {
    fn as_ref(&self) -> &str {
        match self {
            Discipline::Concurrent => "concurrent",
            Discipline::Rate => "rate",
            Discipline::Request => "request",
        }
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub(crate) enum LogStyle {
    /// Colorized text, used as the default with TTY output
    Color,
    /// Standard text, used as the default with non-TTY output
    Text,
    /// JSON objects
    Json,
}

impl Default for LogStyle {
    fn default() -> Self {
        if std::io::stdout().is_terminal() {
            LogStyle::Color
        } else {
            LogStyle::Text
        }
    }
}

impl AsRef<str> for LogStyle {
    fn as_ref(&self) -> &str {
        match self {
            LogStyle::Color => "color",
            LogStyle::Text => "text",
            LogStyle::Json => "json",
        }
    }
}

impl fmt::Display for LogStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

#[derive(Default, Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub(crate) enum LogLevel {
    /// Disable logging
    Off,
    /// Only log errors
    Error,
    /// Log errors, and warnings
    Warn,
    /// Log errors, warnings, and info messages
    #[default]
    Info,
    /// Log errors, warnings, info, and debug messages
    Debug,
    /// Log errors, warnings, info, debug, and trace messages
    Trace,
}

impl LogLevel {
    pub fn env_filter(self) -> EnvFilter {
        let filter_str = match self {
            LogLevel::Off => Cow::Borrowed("off"),
            // Other crates stay at 'warn', workspace crates use the selected level.
            level => Cow::Owned(format!("warn,neural={level},limiter={level},config={level}")),
        };

        EnvFilter::from_str(&filter_str).expect("These all are valid env filters.")
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl AsRef<str> for LogLevel {
    fn as_ref(&self) -> &str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}
