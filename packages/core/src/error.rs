use std::error::Error;
use std::fmt;

use crate::config::ConfigError;

/// Unified startup error.
///
/// Only the startup path surfaces these. Failures inside a cycle are logged
/// and recovered where they happen.
#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "Config error: {}", err),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}
