//! Error types for the reconciliation run.
//!
//! Configuration and upstream failures abort the run before any side effect.
//! Unmatched files and failed moves are not errors; they are carried as data
//! in the run report.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Pre-flight configuration problems.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required structure data '{}' doesn't exist", .0.display())]
    MissingInput(PathBuf),

    #[error("failed to parse '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("bad_files entry \"{key}\" -> \"{value}\" must end with \"{suffix}\"")]
    BadSuffix {
        key: String,
        value: String,
        suffix: String,
    },

    #[error("settings key {0} must not be empty")]
    EmptySetting(&'static str),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A configured playlist id did not resolve upstream.
    #[error("failed to get playlist \"{playlist}\" with ID {id}: {reason}")]
    PlaylistLookup {
        playlist: String,
        id: String,
        reason: String,
    },

    /// The remote inventory listing could not be produced.
    #[error("failed to list remote inventory: {0}")]
    Inventory(String),

    /// A bad_files key is not among the known local files.
    #[error("bad file \"{name}\" not found among local files")]
    CorrectionLookup { name: String },

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error on '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to build worker pool: {0}")]
    Pool(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Error::Json {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_suffix_message_names_entry() {
        let err: Error = ConfigError::BadSuffix {
            key: "typo.m4a".to_string(),
            value: "fixed.mp3".to_string(),
            suffix: ".mp3".to_string(),
        }
        .into();
        let msg = err.to_string();
        assert!(msg.contains("typo.m4a"));
        assert!(msg.contains(".mp3"));
        assert!(matches!(err, Error::Config(ConfigError::BadSuffix { .. })));
    }

    #[test]
    fn test_playlist_lookup_carries_id() {
        let err = Error::PlaylistLookup {
            playlist: "House".to_string(),
            id: "37i9dQZF1DX".to_string(),
            reason: "404".to_string(),
        };
        assert!(err.to_string().contains("37i9dQZF1DX"));
    }

    #[test]
    fn test_correction_lookup_names_file() {
        let err = Error::CorrectionLookup {
            name: "typo.mp3".to_string(),
        };
        assert_eq!(err.to_string(), "bad file \"typo.mp3\" not found among local files");
    }
}
