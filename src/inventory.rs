//! Remote inventory: every music file path known to the shared store.
//!
//! Paths are returned relative to the music prefix, e.g. `House/Song - Artist.mp3`,
//! which is also their path relative to the local music root.

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub trait InventorySource {
    fn list(&self) -> Result<Vec<String>>;
}

/// `2021-03-04 05:06:07    8123456 dj/music/House/Song - Artist.mp3`
static LS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\s+\d+\s+(.+?)\s*$").expect("Invalid regex"));

/// Object-key prefix of an `s3://bucket/prefix/` URL (`prefix/`).
pub fn key_prefix(url: &str) -> &str {
    let rest = url.strip_prefix("s3://").unwrap_or(url);
    rest.split_once('/').map(|(_, prefix)| prefix).unwrap_or("")
}

/// Parse `aws s3 ls --recursive` output into paths relative to `prefix`.
/// Directory markers and unparseable lines are dropped.
pub fn parse_listing(output: &str, prefix: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let Some(caps) = LS_LINE.captures(line) else {
                if !line.trim().is_empty() {
                    debug!("Skipping listing line: {}", line);
                }
                return None;
            };
            let key = caps.get(1)?.as_str();
            let relative = key.strip_prefix(prefix).unwrap_or(key);
            (!relative.is_empty() && !relative.ends_with('/')).then(|| relative.to_string())
        })
        .collect()
}

/// Lists the bucket with the AWS CLI.
pub struct S3Inventory {
    url: String,
    profile: Option<String>,
}

impl S3Inventory {
    pub fn new(url: &str, profile: Option<&str>) -> Self {
        Self {
            url: url.to_string(),
            profile: profile.map(str::to_string),
        }
    }
}

impl InventorySource for S3Inventory {
    fn list(&self) -> Result<Vec<String>> {
        info!("Getting tracks from the beatcloud...");
        let mut cmd = Command::new("aws");
        cmd.args(["s3", "ls", "--recursive", &self.url]);
        if let Some(profile) = &self.profile {
            cmd.env("AWS_PROFILE", profile);
        }
        let output = cmd
            .output()
            .map_err(|e| Error::Inventory(format!("failed to run aws: {}", e)))?;
        if !output.status.success() {
            return Err(Error::Inventory(format!(
                "aws s3 ls exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_listing(&stdout, key_prefix(&self.url)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_prefix() {
        assert_eq!(key_prefix("s3://dj.beatcloud.com/dj/music/"), "dj/music/");
        assert_eq!(key_prefix("s3://bucket"), "");
    }

    #[test]
    fn test_parse_listing() {
        let output = "\
2021-03-04 05:06:07    8123456 dj/music/House/Song A - Artist X.mp3
2021-03-04 05:06:08          0 dj/music/House/
2021-03-04 05:06:09    7000000 dj/music/Techno/Deep/Track  -  Spaced Name.mp3

garbage line
";
        let files = parse_listing(output, "dj/music/");
        assert_eq!(
            files,
            vec![
                "House/Song A - Artist X.mp3".to_string(),
                "Techno/Deep/Track  -  Spaced Name.mp3".to_string(),
            ]
        );
    }
}
