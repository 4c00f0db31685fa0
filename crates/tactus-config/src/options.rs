//! The process-wide option store.
//!
//! [`Options`] collects every knob the engine consults: transport switches,
//! buffer sizing, device names, and print gating. It is owned by the engine
//! (no globals); scores mutate it through [`Options::set_option`], which
//! accepts the classic `"KEY_ON"` / `"KEY_OFF"` switch spellings as well as
//! `"key = value"` pairs.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default audio block length in frames.
pub const DEFAULT_BUFFER_FRAMES: usize = 4096;

/// Default print gate: everything on.
pub const DEFAULT_PRINT_LEVEL: u32 = 5;

/// Default cap on printed list elements.
pub const DEFAULT_PRINT_LIST_LIMIT: usize = 16;

/// Engine options.
///
/// Field defaults match a fresh interactive session: audio and playback on,
/// recording off, full printing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Master audio switch.
    pub audio: bool,
    /// Route rendered output to the device.
    pub play: bool,
    /// Capture device input.
    pub record: bool,
    /// Overwrite existing output files.
    pub clobber: bool,
    /// Print gate for score output and engine chatter; 0 silences.
    pub print: u32,
    /// Report output samples beyond full scale.
    pub report_clipping: bool,
    /// Track peak amplitude per output channel.
    pub check_peaks: bool,
    /// Audio block length in frames.
    pub buffer_frames: usize,
    /// Combined input/output device name.
    pub device: Option<String>,
    /// Input device name, overriding `device`.
    pub indevice: Option<String>,
    /// Output device name, overriding `device`.
    pub outdevice: Option<String>,
    /// Search path for instrument shared objects.
    pub dso_path: Option<String>,
    /// Lists longer than this print with an ellipsis; 0 disables.
    pub print_list_limit: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            audio: true,
            play: true,
            record: false,
            clobber: false,
            print: DEFAULT_PRINT_LEVEL,
            report_clipping: true,
            check_peaks: true,
            buffer_frames: DEFAULT_BUFFER_FRAMES,
            device: None,
            indevice: None,
            outdevice: None,
            dso_path: None,
            print_list_limit: DEFAULT_PRINT_LIST_LIMIT,
        }
    }
}

/// Interprets common boolean spellings.
fn parse_switch(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(ConfigError::BadValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl Options {
    /// Applies one option directive from a score.
    ///
    /// Accepted forms:
    ///
    /// - `"AUDIO_ON"` / `"AUDIO_OFF"` style switches for audio, play,
    ///   record, clobber, print, report_clipping, and check_peaks
    /// - `"FULL_DUPLEX_ON"` / `"FULL_DUPLEX_OFF"`, which decompose into the
    ///   play and record switches
    /// - `"key = value"` for any recognized key
    ///
    /// `audio_configured` freezes the record and full-duplex switches: once
    /// the device is set up, flipping them is an error rather than a silent
    /// no-op.
    pub fn set_option(&mut self, spec: &str, audio_configured: bool) -> Result<(), ConfigError> {
        let spec = spec.trim();
        if let Some((key, value)) = spec.split_once('=') {
            return self.set_key_value(key.trim(), value.trim());
        }

        let upper = spec.to_ascii_uppercase();
        let (key, on) = match upper.strip_suffix("_ON") {
            Some(key) => (key.to_string(), true),
            None => match upper.strip_suffix("_OFF") {
                Some(key) => (key.to_string(), false),
                None => return Err(ConfigError::UnknownOption(spec.to_string())),
            },
        };

        match key.as_str() {
            "AUDIO" => self.audio = on,
            "PLAY" => self.play = on,
            "RECORD" => {
                if audio_configured && on != self.record {
                    return Err(ConfigError::AfterAudioSetup("record".to_string()));
                }
                self.record = on;
            }
            "FULL_DUPLEX" => {
                if audio_configured {
                    return Err(ConfigError::AfterAudioSetup("full_duplex".to_string()));
                }
                self.play = on;
                self.record = on;
            }
            "CLOBBER" => self.clobber = on,
            "PRINT" => self.print = if on { DEFAULT_PRINT_LEVEL } else { 0 },
            "REPORT_CLIPPING" => self.report_clipping = on,
            "CHECK_PEAKS" => self.check_peaks = on,
            _ => return Err(ConfigError::UnknownOption(spec.to_string())),
        }
        Ok(())
    }

    /// Applies one `key = value` pair. Shared by [`set_option`](Self::set_option)
    /// and the rc-file reader.
    pub(crate) fn set_key_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim_matches('"');
        match key {
            "audio" => self.audio = parse_switch(key, value)?,
            "play" => self.play = parse_switch(key, value)?,
            "record" => self.record = parse_switch(key, value)?,
            "clobber" => self.clobber = parse_switch(key, value)?,
            "print" => {
                self.print = value.parse().map_err(|_| ConfigError::BadValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
            }
            "report_clipping" => self.report_clipping = parse_switch(key, value)?,
            "check_peaks" => self.check_peaks = parse_switch(key, value)?,
            "buffer_frames" => {
                self.buffer_frames = value.parse().map_err(|_| ConfigError::BadValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
            }
            "device" => self.device = Some(value.to_string()),
            "indevice" => self.indevice = Some(value.to_string()),
            "outdevice" => self.outdevice = Some(value.to_string()),
            "dso_path" => self.dso_path = Some(value.to_string()),
            "print_list_limit" => {
                self.print_list_limit = value.parse().map_err(|_| ConfigError::BadValue {
                    key: key.to_string(),
                    value: value.to_string(),
                })?;
            }
            _ => return Err(ConfigError::UnknownOption(key.to_string())),
        }
        Ok(())
    }
}
