use std::borrow::Cow;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Layer, Registry};

const LOG_FORMAT_TEXT: &str = "text";
const LOG_FORMAT_JSON: &str = "json";
enum LogFormat {
    Text,
    Json,
}

/// If in debug mode, default level is debug to get maximum logging
#[cfg(debug_assertions)]
const DEFAULT_LOG_LEVEL: &str = "debug";

/// If not in debug mode, default level is error to get important logs
#[cfg(not(debug_assertions))]
const DEFAULT_LOG_LEVEL: &str = "error";

fn detect_log_format(log_format: Option<&str>) -> Result<LogFormat> {
    match log_format {
        None | Some(LOG_FORMAT_TEXT) => Ok(LogFormat::Text),
        Some(LOG_FORMAT_JSON) => Ok(LogFormat::Json),
        Some(unknown) => bail!("unknown log format: {}", unknown),
    }
}

fn detect_log_level(input: Option<String>, is_debug: bool) -> Result<Level> {
    // `--log-level` wins over `--debug` when both are given.
    let log_level: Cow<str> = match input {
        None if is_debug => "debug".into(),
        None => DEFAULT_LOG_LEVEL.into(),
        Some(level) => level.into(),
    };

    Ok(Level::from_str(log_level.as_ref())?)
}

#[derive(Debug, Default)]
pub struct ObservabilityConfig {
    pub log_debug_flag: bool,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub log_format: Option<String>,
}

impl From<&crate::GlobalOpts> for ObservabilityConfig {
    fn from(opts: &crate::GlobalOpts) -> Self {
        Self {
            log_debug_flag: opts.debug,
            log_level: opts.log_level.to_owned(),
            log_file: opts.log.to_owned(),
            log_format: opts.log_format.to_owned(),
        }
    }
}

type Subscriber = Layered<LevelFilter, Registry>;

/// Formatting layer for one output. Terminals get colors and no timestamps,
/// files keep timestamps and stay free of escape codes.
fn fmt_layer<W>(
    format: LogFormat,
    writer: W,
    terminal: bool,
) -> Box<dyn Layer<Subscriber> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer::<Subscriber>()
        .with_ansi(terminal)
        .with_writer(writer);
    match (format, terminal) {
        (LogFormat::Json, _) => layer
            .json()
            .flatten_event(true)
            .with_span_list(false)
            .boxed(),
        (LogFormat::Text, true) => layer.without_time().boxed(),
        (LogFormat::Text, false) => layer.boxed(),
    }
}

pub fn init<T>(config: T) -> Result<()>
where
    T: Into<ObservabilityConfig>,
{
    let config = config.into();
    let level = detect_log_level(config.log_level, config.log_debug_flag)
        .with_context(|| "failed to parse log level")?;
    let log_format = detect_log_format(config.log_format.as_deref())
        .with_context(|| "failed to detect log format")?;

    let layer = match config.log_file.as_ref() {
        None => fmt_layer(log_format, std::io::stderr, true),
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {path:?}"))?;
            fmt_layer(log_format, file, false)
        }
    };

    tracing_subscriber::registry()
        .with(LevelFilter::from(level))
        .with(layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init logger: {}", e))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_log_level() {
        let test = vec![
            ("error", tracing::Level::ERROR),
            ("warn", tracing::Level::WARN),
            ("info", tracing::Level::INFO),
            ("debug", tracing::Level::DEBUG),
            ("trace", tracing::Level::TRACE),
        ];
        for (input, expected) in test {
            assert_eq!(
                detect_log_level(Some(input.to_string()), false)
                    .expect("failed to parse log level"),
                expected
            )
        }
        assert_eq!(
            detect_log_level(None, true).expect("failed to parse log level"),
            tracing::Level::DEBUG
        );
        assert_eq!(
            detect_log_level(Some("warn".to_string()), true).expect("failed to parse log level"),
            tracing::Level::WARN
        );
        assert!(detect_log_level(Some("invalid".to_string()), false).is_err());
    }

    #[test]
    fn test_detect_log_level_default() {
        if cfg!(debug_assertions) {
            assert_eq!(
                detect_log_level(None, false).unwrap(),
                tracing::Level::DEBUG
            )
        } else {
            assert_eq!(
                detect_log_level(None, false).unwrap(),
                tracing::Level::ERROR
            )
        }
    }

    #[test]
    fn test_detect_log_format() {
        assert!(matches!(detect_log_format(None), Ok(LogFormat::Text)));
        assert!(matches!(detect_log_format(Some("text")), Ok(LogFormat::Text)));
        assert!(matches!(detect_log_format(Some("json")), Ok(LogFormat::Json)));
        assert!(detect_log_format(Some("yaml")).is_err());
    }

    // The global subscriber can be set once per process, so this is the only
    // test that calls init.
    #[test]
    fn test_json_logfile() {
        let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
        let log_file = temp_dir.path().join("test.log");
        let config = ObservabilityConfig {
            log_file: Some(log_file.clone()),
            log_level: Some("info".to_owned()),
            log_format: Some(LOG_FORMAT_JSON.to_owned()),
            ..Default::default()
        };
        init(config).expect("failed to init logger");

        tracing::debug!("below the level");
        tracing::info!(controller = "memory", "testing json log");
        let data = std::fs::read_to_string(&log_file).expect("failed to read the logfile");
        let lines: Vec<&str> = data.lines().collect();
        assert_eq!(lines.len(), 1, "unexpected log content: {data}");
        let value: serde_json::Value = serde_json::from_str(lines[0]).expect("log line is json");
        assert_eq!(value["message"], "testing json log");
        assert_eq!(value["controller"], "memory");
    }
}
