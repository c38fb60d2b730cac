use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::diff::DiffMode;

pub const DEFAULT_DEBOUNCE_MS: u64 = 1_500;
pub const MIN_DEBOUNCE_MS: u64 = 100;
pub const MAX_DEBOUNCE_MS: u64 = 10_000;
pub const DEFAULT_FORCED_RECHECK_DELAY_MS: u64 = 100;
pub const MAX_FORCED_RECHECK_DELAY_MS: u64 = 2_000;
pub const DEFAULT_MIN_INPUT_CHARS: usize = 3;
pub const DEFAULT_MAX_INPUT_CHARS: usize = 500;
pub const MAX_INPUT_CHARS_LIMIT: usize = 5_000;
pub const DEFAULT_MODEL_LOAD_TIMEOUT_SECS: u64 = 5 * 60;
pub const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 30;
pub const MAX_TIMEOUT_SECS: u64 = 60 * 60;
pub const DEFAULT_PROGRESS_BROADCAST_STEP: u8 = 5;
pub const DEFAULT_LOAD_RETRY_ATTEMPTS: u8 = 3;
pub const MAX_LOAD_RETRY_ATTEMPTS: u8 = 10;
pub const DEFAULT_LOAD_RETRY_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_HOST_STARTUP_DELAY_MS: u64 = 500;
pub const MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_SELF_TEST_TEXT: &str = "My name are Naimur";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to access settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckerSettings {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_forced_recheck_delay_ms")]
    pub forced_recheck_delay_ms: u64,
    #[serde(default = "default_min_input_chars")]
    pub min_input_chars: usize,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_model_load_timeout_secs")]
    pub model_load_timeout_secs: u64,
    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,
    #[serde(default = "default_progress_broadcast_step")]
    pub progress_broadcast_step: u8,
    #[serde(default = "default_load_retry_attempts")]
    pub load_retry_attempts: u8,
    #[serde(default = "default_load_retry_backoff_ms")]
    pub load_retry_backoff_ms: u64,
    #[serde(default = "default_host_startup_delay_ms")]
    pub host_startup_delay_ms: u64,
    #[serde(default)]
    pub diff_mode: DiffMode,
    #[serde(default = "default_self_test_text")]
    pub self_test_text: String,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            forced_recheck_delay_ms: default_forced_recheck_delay_ms(),
            min_input_chars: default_min_input_chars(),
            max_input_chars: default_max_input_chars(),
            model_load_timeout_secs: default_model_load_timeout_secs(),
            inference_timeout_secs: default_inference_timeout_secs(),
            progress_broadcast_step: default_progress_broadcast_step(),
            load_retry_attempts: default_load_retry_attempts(),
            load_retry_backoff_ms: default_load_retry_backoff_ms(),
            host_startup_delay_ms: default_host_startup_delay_ms(),
            diff_mode: DiffMode::default(),
            self_test_text: default_self_test_text(),
        }
    }
}

impl CheckerSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn forced_recheck_delay(&self) -> Duration {
        Duration::from_millis(self.forced_recheck_delay_ms)
    }

    pub fn model_load_timeout(&self) -> Duration {
        Duration::from_secs(self.model_load_timeout_secs)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn load_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.load_retry_backoff_ms)
    }

    pub fn host_startup_delay(&self) -> Duration {
        Duration::from_millis(self.host_startup_delay_ms)
    }
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_forced_recheck_delay_ms() -> u64 {
    DEFAULT_FORCED_RECHECK_DELAY_MS
}

fn default_min_input_chars() -> usize {
    DEFAULT_MIN_INPUT_CHARS
}

fn default_max_input_chars() -> usize {
    DEFAULT_MAX_INPUT_CHARS
}

fn default_model_load_timeout_secs() -> u64 {
    DEFAULT_MODEL_LOAD_TIMEOUT_SECS
}

fn default_inference_timeout_secs() -> u64 {
    DEFAULT_INFERENCE_TIMEOUT_SECS
}

fn default_progress_broadcast_step() -> u8 {
    DEFAULT_PROGRESS_BROADCAST_STEP
}

fn default_load_retry_attempts() -> u8 {
    DEFAULT_LOAD_RETRY_ATTEMPTS
}

fn default_load_retry_backoff_ms() -> u64 {
    DEFAULT_LOAD_RETRY_BACKOFF_MS
}

fn default_host_startup_delay_ms() -> u64 {
    DEFAULT_HOST_STARTUP_DELAY_MS
}

fn default_self_test_text() -> String {
    DEFAULT_SELF_TEST_TEXT.to_string()
}

/// Reads settings from `path`, falling back to defaults when the file is absent.
/// Out-of-range values are reset instead of rejected.
pub fn load_settings(path: &Path) -> Result<CheckerSettings, SettingsError> {
    if !path.exists() {
        return Ok(CheckerSettings::default());
    }

    let content = fs::read_to_string(path)?;
    let parsed = serde_json::from_str::<CheckerSettings>(&content)?;
    Ok(normalize_loaded_settings(parsed))
}

pub fn save_settings(path: &Path, settings: &CheckerSettings) -> Result<(), SettingsError> {
    let validated = validate_settings(settings.clone())?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let serialized = serde_json::to_string_pretty(&validated)?;
    fs::write(path, serialized)?;
    Ok(())
}

fn normalize_loaded_settings(mut settings: CheckerSettings) -> CheckerSettings {
    let defaults = CheckerSettings::default();

    if !(MIN_DEBOUNCE_MS..=MAX_DEBOUNCE_MS).contains(&settings.debounce_ms) {
        warn!(
            debounce_ms = settings.debounce_ms,
            "loaded debounce is out of range; resetting to default"
        );
        settings.debounce_ms = defaults.debounce_ms;
    }

    if settings.forced_recheck_delay_ms > MAX_FORCED_RECHECK_DELAY_MS {
        warn!(
            delay_ms = settings.forced_recheck_delay_ms,
            "loaded forced recheck delay is out of range; resetting to default"
        );
        settings.forced_recheck_delay_ms = defaults.forced_recheck_delay_ms;
    }

    if settings.min_input_chars == 0
        || settings.max_input_chars > MAX_INPUT_CHARS_LIMIT
        || settings.min_input_chars > settings.max_input_chars
    {
        warn!(
            min = settings.min_input_chars,
            max = settings.max_input_chars,
            "loaded input length bounds are invalid; resetting to defaults"
        );
        settings.min_input_chars = defaults.min_input_chars;
        settings.max_input_chars = defaults.max_input_chars;
    }

    if !(1..=MAX_TIMEOUT_SECS).contains(&settings.model_load_timeout_secs) {
        warn!("loaded model load timeout is out of range; resetting to default");
        settings.model_load_timeout_secs = defaults.model_load_timeout_secs;
    }

    if !(1..=MAX_TIMEOUT_SECS).contains(&settings.inference_timeout_secs) {
        warn!("loaded inference timeout is out of range; resetting to default");
        settings.inference_timeout_secs = defaults.inference_timeout_secs;
    }

    if !(1..=100).contains(&settings.progress_broadcast_step) {
        warn!("loaded progress broadcast step is out of range; resetting to default");
        settings.progress_broadcast_step = defaults.progress_broadcast_step;
    }

    if !(1..=MAX_LOAD_RETRY_ATTEMPTS).contains(&settings.load_retry_attempts) {
        warn!("loaded retry attempts are out of range; resetting to default");
        settings.load_retry_attempts = defaults.load_retry_attempts;
    }

    if settings.load_retry_backoff_ms > MAX_DELAY_MS {
        settings.load_retry_backoff_ms = defaults.load_retry_backoff_ms;
    }

    if settings.host_startup_delay_ms > MAX_DELAY_MS {
        settings.host_startup_delay_ms = defaults.host_startup_delay_ms;
    }

    if settings.self_test_text.trim().chars().count() < settings.min_input_chars {
        settings.self_test_text = defaults.self_test_text;
    }

    settings
}

pub fn validate_settings(mut settings: CheckerSettings) -> Result<CheckerSettings, SettingsError> {
    if !(MIN_DEBOUNCE_MS..=MAX_DEBOUNCE_MS).contains(&settings.debounce_ms) {
        return Err(SettingsError::Invalid(format!(
            "debounceMs must be between {MIN_DEBOUNCE_MS} and {MAX_DEBOUNCE_MS}"
        )));
    }

    if settings.forced_recheck_delay_ms > MAX_FORCED_RECHECK_DELAY_MS {
        return Err(SettingsError::Invalid(format!(
            "forcedRecheckDelayMs must not exceed {MAX_FORCED_RECHECK_DELAY_MS}"
        )));
    }

    if settings.min_input_chars == 0 || settings.min_input_chars > settings.max_input_chars {
        return Err(SettingsError::Invalid(
            "minInputChars must be at least 1 and not exceed maxInputChars".to_string(),
        ));
    }

    if settings.max_input_chars > MAX_INPUT_CHARS_LIMIT {
        return Err(SettingsError::Invalid(format!(
            "maxInputChars must not exceed {MAX_INPUT_CHARS_LIMIT}"
        )));
    }

    for (name, value) in [
        ("modelLoadTimeoutSecs", settings.model_load_timeout_secs),
        ("inferenceTimeoutSecs", settings.inference_timeout_secs),
    ] {
        if !(1..=MAX_TIMEOUT_SECS).contains(&value) {
            return Err(SettingsError::Invalid(format!(
                "{name} must be between 1 and {MAX_TIMEOUT_SECS}"
            )));
        }
    }

    if !(1..=100).contains(&settings.progress_broadcast_step) {
        return Err(SettingsError::Invalid(
            "progressBroadcastStep must be between 1 and 100".to_string(),
        ));
    }

    if !(1..=MAX_LOAD_RETRY_ATTEMPTS).contains(&settings.load_retry_attempts) {
        return Err(SettingsError::Invalid(format!(
            "loadRetryAttempts must be between 1 and {MAX_LOAD_RETRY_ATTEMPTS}"
        )));
    }

    if settings.load_retry_backoff_ms > MAX_DELAY_MS || settings.host_startup_delay_ms > MAX_DELAY_MS
    {
        return Err(SettingsError::Invalid(format!(
            "retry backoff and startup delay must not exceed {MAX_DELAY_MS}ms"
        )));
    }

    let trimmed_self_test = settings.self_test_text.trim();
    if trimmed_self_test.chars().count() < settings.min_input_chars {
        return Err(SettingsError::Invalid(
            "selfTestText must be at least minInputChars long".to_string(),
        ));
    }
    settings.self_test_text = trimmed_self_test.to_string();

    Ok(settings)
}
