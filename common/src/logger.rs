use fern::colors::{Color, ColoredLevelConfig};
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display, Formatter},
    fs,
    path::Path,
    str::FromStr,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Error while creating logs directory {}: {}", _0, _1)]
    LogsDirectory(String, #[source] std::io::Error),
    #[error(transparent)]
    SetLogger(#[from] log::SetLoggerError),
    #[error("Invalid module log config '{}', expected <module>=<level>", _0)]
    InvalidModuleConfig(String),
    #[error("Invalid log level '{}'", _0)]
    InvalidLevel(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Off => Self::Off,
            LogLevel::Error => Self::Error,
            LogLevel::Warn => Self::Warn,
            LogLevel::Info => Self::Info,
            LogLevel::Debug => Self::Debug,
            LogLevel::Trace => Self::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "off" => Self::Off,
            "error" => Self::Error,
            "warn" => Self::Warn,
            "info" => Self::Info,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => return Err(LoggerError::InvalidLevel(s.to_owned())),
        })
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Off => "off",
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(s)
    }
}

// Level override for a single module, written as <module>=<level>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub module: String,
    pub level: LogLevel,
}

impl FromStr for ModuleConfig {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (module, level) = s
            .split_once('=')
            .ok_or_else(|| LoggerError::InvalidModuleConfig(s.to_owned()))?;
        if module.is_empty() {
            return Err(LoggerError::InvalidModuleConfig(s.to_owned()));
        }

        Ok(Self {
            module: module.to_owned(),
            level: level.parse()?,
        })
    }
}

pub fn default_logs_datetime_format() -> String {
    String::from("[%Y-%m-%d] (%H:%M:%S%.3f)")
}

// Everything needed to build the global logger
#[derive(Debug, Clone)]
pub struct LoggerOptions<'a> {
    pub level: LogLevel,
    pub file_level: LogLevel,
    pub logs_path: &'a str,
    pub filename: &'a str,
    pub disable_file_logging: bool,
    pub disable_file_log_date_based: bool,
    pub disable_colors: bool,
    pub modules: &'a [ModuleConfig],
    pub datetime_format: &'a str,
}

// Install the global logger: stdout plus an optional (date based) log file
pub fn setup_logger(options: LoggerOptions<'_>) -> Result<(), LoggerError> {
    let colors = ColoredLevelConfig::new()
        .error(Color::Red)
        .warn(Color::Yellow)
        .info(Color::Green)
        .debug(Color::Cyan)
        .trace(Color::Magenta);

    let max_level = LevelFilter::from(options.level).max(options.file_level.into());
    let mut base = fern::Dispatch::new().level(max_level);
    for module in options.modules {
        base = base.level_for(module.module.clone(), module.level.into());
    }

    let stdout_format = options.datetime_format.to_owned();
    let disable_colors = options.disable_colors;
    let stdout = fern::Dispatch::new()
        .level(options.level.into())
        .format(move |out, message, record| {
            let now = chrono::Local::now().format(&stdout_format);
            if disable_colors {
                out.finish(format_args!(
                    "{} [{}] [{}] {}",
                    now,
                    record.level(),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "{} [{}] [{}] {}",
                    now,
                    colors.color(record.level()),
                    record.target(),
                    message
                ))
            }
        })
        .chain(std::io::stdout());
    base = base.chain(stdout);

    if !options.disable_file_logging {
        let logs_path = Path::new(options.logs_path);
        fs::create_dir_all(logs_path)
            .map_err(|e| LoggerError::LogsDirectory(options.logs_path.to_owned(), e))?;

        let file_format = options.datetime_format.to_owned();
        let file = fern::Dispatch::new()
            .level(options.file_level.into())
            .format(move |out, message, record| {
                out.finish(format_args!(
                    "{} [{}] [{}] {}",
                    chrono::Local::now().format(&file_format),
                    record.level(),
                    record.target(),
                    message
                ))
            });

        let file = if options.disable_file_log_date_based {
            let path = logs_path.join(options.filename);
            let output = fern::log_file(&path)
                .map_err(|e| LoggerError::LogsDirectory(path.display().to_string(), e))?;
            file.chain(output)
        } else {
            let prefix = format!("{}/", options.logs_path.trim_end_matches('/'));
            file.chain(fern::DateBased::new(prefix, format!("%Y-%m-%d.{}", options.filename)))
        };

        base = base.chain(file);
    }

    base.apply()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_config_parse() {
        let config: ModuleConfig = "fabric_client::transaction=trace".parse().unwrap();
        assert_eq!(config.module, "fabric_client::transaction");
        assert_eq!(config.level, LogLevel::Trace);

        assert!("fabric_client".parse::<ModuleConfig>().is_err());
        assert!("=debug".parse::<ModuleConfig>().is_err());
        assert!("fabric_client=loud".parse::<ModuleConfig>().is_err());
    }

    #[test]
    fn test_level_conversion() {
        assert_eq!(LevelFilter::from(LogLevel::default()), LevelFilter::Info);
        assert_eq!(LevelFilter::from(LogLevel::Off), LevelFilter::Off);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::Debug.to_string(), "debug");
    }
}
