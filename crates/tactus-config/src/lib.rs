//! Configuration for the tactus engine.
//!
//! This crate owns the option store consulted by the engine and the score
//! language: transport switches, buffer sizing, device names, print gating.
//! Options come from three layers, later layers winning:
//!
//! 1. Built-in defaults ([`Options::default`])
//! 2. The user's `~/.tactusrc` file ([`Options::from_user_rc`])
//! 3. Score-time `set_option(...)` directives ([`Options::set_option`])
//!
//! # Example
//!
//! ```rust
//! use tactus_config::Options;
//!
//! let mut opts = Options::default();
//! opts.set_option("buffer_frames = 1024", false).unwrap();
//! opts.set_option("AUDIO_OFF", false).unwrap();
//! assert_eq!(opts.buffer_frames, 1024);
//! assert!(!opts.audio);
//! ```

mod error;
mod options;
mod rcfile;

pub use error::ConfigError;
pub use options::{
    DEFAULT_BUFFER_FRAMES, DEFAULT_PRINT_LEVEL, DEFAULT_PRINT_LIST_LIMIT, Options,
};
pub use rcfile::{RC_FILE_NAME, rc_file_path};
