//! The `~/.tactusrc` startup file.
//!
//! A key-value TOML document applied over the option defaults before any
//! score runs. Recognized keys are the ones [`Options`] exposes
//! (`audio`, `play`, `record`, `clobber`, `print`, `report_clipping`,
//! `check_peaks`, `buffer_frames`, `device`, `indevice`, `outdevice`,
//! `dso_path`); unknown keys log a warning and are skipped, so an rc file
//! written for a newer engine still loads.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::options::Options;

/// File name looked up in the user's home directory.
pub const RC_FILE_NAME: &str = ".tactusrc";

/// Full path of the user's rc file, if a home directory can be determined.
pub fn rc_file_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(RC_FILE_NAME))
}

/// Renders a TOML value the way `set_option` expects its text form.
fn value_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Options {
    /// Loads options from an rc file, applying recognized keys over the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, is not valid
    /// TOML, or a recognized key carries an uninterpretable value. Unknown
    /// keys are skipped with a warning.
    pub fn from_rc_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::read_file(path, source))?;
        let table: toml::Table = text.parse()?;

        let mut options = Options::default();
        for (key, value) in &table {
            match options.set_key_value(key, &value_text(value)) {
                Ok(()) => {}
                Err(ConfigError::UnknownOption(key)) => {
                    tracing::warn!(%key, path = %path.display(), "unknown rc-file key");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(options)
    }

    /// Loads `~/.tactusrc` when present; defaults otherwise.
    pub fn from_user_rc() -> Result<Self, ConfigError> {
        match rc_file_path() {
            Some(path) if path.exists() => Self::from_rc_file(path),
            _ => Ok(Options::default()),
        }
    }

    /// Writes the options as a TOML document, usable as an rc file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|source| ConfigError::write_file(path, source))
    }
}
