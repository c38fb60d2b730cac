use thiserror::Error;

use crate::settings::SettingsError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
    #[error("failed to load settings: {0}")]
    Settings(#[from] SettingsError),
}
