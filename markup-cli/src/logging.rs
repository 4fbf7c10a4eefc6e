//! `tracing` subscriber setup for the command line tool.
//!
//! Library code only emits events; this module decides where they go.
//! `RUST_LOG` overrides the level picked from `-v` / `-q`.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: LevelFilter,
    pub format: LogFormat,
    pub log_file: Option<PathBuf>,
    pub with_ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::default(),
            log_file: None,
            with_ansi: true,
        }
    }
}

impl LogConfig {
    /// - `-q`: errors only
    /// - default: info
    /// - `-v`: debug
    /// - `-vv` and up: trace
    pub fn from_verbosity(verbose: u8, quiet: bool) -> Self {
        let level = if quiet {
            LevelFilter::ERROR
        } else {
            match verbose {
                0 => LevelFilter::INFO,
                1 => LevelFilter::DEBUG,
                _ => LevelFilter::TRACE,
            }
        };
        Self {
            level,
            ..Self::default()
        }
    }
}

pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    if let Some(path) = &config.log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut config = config.clone();
        config.with_ansi = false;
        init_with_writer(&config, Mutex::new(file));
    } else {
        init_with_writer(config, io::stderr);
    }
    Ok(())
}

fn init_with_writer<W>(config: &LogConfig, writer: W)
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = build_env_filter(config.level);
    match config.format {
        LogFormat::Json => {
            let layer = fmt::layer().json().with_writer(writer).with_target(false);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(false)
                .without_time();
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(config.with_ansi)
                .with_target(false)
                .without_time();
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
}

fn build_env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = level.to_string().to_lowercase();
        // Dependencies stay at warn.
        EnvFilter::new(format!(
            "warn,markup_core={level},{}={level}",
            env!("CARGO_CRATE_NAME")
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(LogConfig::from_verbosity(0, false).level, LevelFilter::INFO);
        assert_eq!(LogConfig::from_verbosity(1, false).level, LevelFilter::DEBUG);
        assert_eq!(LogConfig::from_verbosity(3, false).level, LevelFilter::TRACE);
        assert_eq!(LogConfig::from_verbosity(2, true).level, LevelFilter::ERROR);
    }

    #[test]
    fn log_file_receives_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("markup.log");
        let config = LogConfig {
            log_file: Some(path.clone()),
            format: LogFormat::Compact,
            ..LogConfig::default()
        };
        init_logging(&config).unwrap();
        tracing::warn!(table = "translated_game_markups.json", "table has no offsets");

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("table has no offsets"), "{text}");
        assert!(!text.contains('\x1b'), "{text}");
    }
}
