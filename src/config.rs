//! Operator-supplied configuration.
//!
//! Two JSON documents feed a run:
//! - the structure data (`spotify_playlists`, `playlist_genres`, `users`,
//!   `bad_files`, `ignore`) describing the target layout and corrections
//! - the settings (`USB_PATH`, Spotify credentials, ...) shared with the rest
//!   of the DJ tooling
//!
//! Both are validated up front; nothing here touches the network or mutates
//! the filesystem.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Error, Result};

/// Suffix every `bad_files` key and value must carry.
pub const EXPECTED_SUFFIX: &str = ".mp3";

/// Subdirectory of `USB_PATH` holding the music library.
pub const MUSIC_DIR: &str = "DJ Music";

/// Default remote location listed by the inventory source.
pub const DEFAULT_BEATCLOUD_URL: &str = "s3://dj.beatcloud.com/dj/music/";

/// Default minimum similarity for a fuzzy match.
pub const DEFAULT_FUZZ_RATIO: f64 = 80.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructureData {
    /// Playlist name → Spotify playlist id
    pub spotify_playlists: BTreeMap<String, String>,
    /// Playlist name → genre folder
    pub playlist_genres: FxHashMap<String, String>,
    /// Spotify user id → user folder name
    pub users: FxHashMap<String, String>,
    /// Misnamed local file → corrected file name (both basenames)
    #[serde(default)]
    pub bad_files: BTreeMap<String, String>,
    /// File keys confirmed as not attributable to any playlist
    #[serde(default)]
    pub ignore: FxHashSet<String>,
}

impl StructureData {
    /// Load and validate the structure data. A missing file is a configuration
    /// error, not an I/O error, so the run fails before anything else happens.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::MissingInput(path.to_path_buf()).into());
        }
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let data: StructureData =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        data.validate()?;
        Ok(data)
    }

    /// Every rename entry must carry the expected suffix on both sides.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (key, value) in &self.bad_files {
            if !key.ends_with(EXPECTED_SUFFIX) || !value.ends_with(EXPECTED_SUFFIX) {
                return Err(ConfigError::BadSuffix {
                    key: key.clone(),
                    value: value.clone(),
                    suffix: EXPECTED_SUFFIX.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Directory prefixes (`"<user>/"`) of files that are already placed.
    pub fn user_prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self
            .users
            .values()
            .map(|name| format!("{}/", name.trim_end_matches('/')))
            .collect();
        prefixes.sort();
        prefixes
    }
}

/// Settings shared with the rest of the DJ tooling (`config.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "USB_PATH")]
    pub usb_path: PathBuf,

    #[serde(rename = "SPOTIFY_CLIENT_ID", default, skip_serializing_if = "Option::is_none")]
    pub spotify_client_id: Option<String>,

    #[serde(rename = "SPOTIFY_CLIENT_SECRET", default, skip_serializing_if = "Option::is_none")]
    pub spotify_client_secret: Option<String>,

    #[serde(rename = "AWS_PROFILE", default, skip_serializing_if = "Option::is_none")]
    pub aws_profile: Option<String>,

    #[serde(rename = "BEATCLOUD_URL", default = "default_beatcloud_url")]
    pub beatcloud_url: String,
}

fn default_beatcloud_url() -> String {
    DEFAULT_BEATCLOUD_URL.to_string()
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::MissingInput(path.to_path_buf()).into());
        }
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let settings: Settings =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if settings.usb_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptySetting("USB_PATH").into());
        }
        Ok(settings)
    }

    /// `<USB_PATH>/DJ Music`, the root every inventory path is relative to.
    pub fn music_root(&self) -> PathBuf {
        self.usb_path.join(MUSIC_DIR)
    }

    /// Spotify credentials, required only when the response cache is cold.
    pub fn spotify_credentials(&self) -> std::result::Result<(&str, &str), ConfigError> {
        let id = self
            .spotify_client_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::EmptySetting("SPOTIFY_CLIENT_ID"))?;
        let secret = self
            .spotify_client_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::EmptySetting("SPOTIFY_CLIENT_SECRET"))?;
        Ok((id, secret))
    }
}

/// Per-invocation knobs.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Minimum similarity (0-100) to accept a fuzzy candidate
    pub fuzz_ratio: f64,
    /// Diagnostic detail only; never changes matching results
    pub verbosity: u8,
    /// Actually rename and move files
    pub commit: bool,
    /// Persist new fuzzy acceptances to the decision cache
    pub cache_fuzz_results: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            fuzz_ratio: DEFAULT_FUZZ_RATIO,
            verbosity: 0,
            commit: false,
            cache_fuzz_results: false,
        }
    }
}
