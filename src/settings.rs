//! Player preferences
//!
//! Stored as XML in `<config dir>/MediaPlayer/settings.xml`.

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::decode::{DecoderOptions, DEFAULT_MAX_CONSECUTIVE_FAILURES};
use crate::player::EndOfStream;

/// Upper bound accepted for `maxDecodeFailures`
pub const MAX_DECODE_FAILURES_LIMIT: u32 = 10_000;

/// Persisted player preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "MediaPlayerSettings", default)]
pub struct PlayerSettings {
    /// Title of the playback window
    #[serde(rename = "windowTitle")]
    pub window_title: String,

    /// Whether presentation waits for the display refresh
    #[serde(rename = "vsyncEnabled")]
    pub vsync_enabled: bool,

    /// Replay from the start at end of stream instead of stopping
    #[serde(rename = "loopPlayback")]
    pub loop_playback: bool,

    /// Send decoded audio to the default output device
    #[serde(rename = "audioEnabled")]
    pub audio_enabled: bool,

    /// Packets in a row that may fail before playback aborts (1-10000)
    #[serde(rename = "maxDecodeFailures")]
    pub max_decode_failures: u32,

    /// Default log filter when no environment override is set
    #[serde(rename = "logLevel")]
    pub log_level: String,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            window_title: "Media Player".to_string(),
            vsync_enabled: false,
            loop_playback: false,
            audio_enabled: false,
            max_decode_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            log_level: "info".to_string(),
        }
    }
}

impl PlayerSettings {
    /// Get the settings file path
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("MediaPlayer");
            p.push("settings.xml");
            p
        })
    }

    /// Clamp numeric fields to their valid ranges
    pub fn clamp(&mut self) {
        self.max_decode_failures = self.max_decode_failures.clamp(1, MAX_DECODE_FAILURES_LIMIT);
    }

    pub fn end_of_stream(&self) -> EndOfStream {
        if self.loop_playback {
            EndOfStream::Loop
        } else {
            EndOfStream::Stop
        }
    }

    pub fn decoder_options(&self) -> DecoderOptions {
        DecoderOptions {
            max_consecutive_failures: self.max_decode_failures,
        }
    }

    /// Load settings from the config directory, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring unreadable settings at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Load settings from an XML file
    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(SettingsError::Io)?;
        let mut settings: Self = from_str(&contents).map_err(SettingsError::XmlParse)?;
        settings.clamp();
        Ok(settings)
    }

    /// Save settings to an XML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        let xml = to_string(self).map_err(SettingsError::XmlWrite)?;
        let formatted = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml);

        fs::write(path, formatted).map_err(SettingsError::Io)?;
        Ok(())
    }

    /// Save settings to the config directory
    pub fn save(&self) -> Result<(), SettingsError> {
        let Some(path) = Self::settings_path() else {
            return Err(SettingsError::NoConfigDir);
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SettingsError::Io)?;
        }

        self.save_to_file(&path)
    }
}

/// Settings load/save errors
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[source] std::io::Error),
    #[error("XML parse error: {0}")]
    XmlParse(#[source] quick_xml::DeError),
    #[error("XML write error: {0}")]
    XmlWrite(#[source] quick_xml::SeError),
    #[error("Could not find config directory")]
    NoConfigDir,
}
