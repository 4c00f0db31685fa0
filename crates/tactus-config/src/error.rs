//! Error types for option handling.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from option parsing and rc-file handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the rc file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write the rc file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// `set_option` was handed a key it does not recognize
    #[error("unknown option '{0}'")]
    UnknownOption(String),

    /// An option value could not be interpreted
    #[error("bad value '{value}' for option '{key}'")]
    BadValue {
        /// Option name.
        key: String,
        /// The rejected value text.
        value: String,
    },

    /// Record and full-duplex switches are frozen once audio is set up
    #[error("cannot change '{0}' after audio setup")]
    AfterAudioSetup(String),
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }
}
