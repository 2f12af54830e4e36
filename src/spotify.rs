//! Playlist service client.
//!
//! [`TrackSource`] is the seam the rest of the crate depends on: one page of
//! playlist entries at a time. [`SpotifyClient`] implements it against the
//! Spotify Web API with the client-credentials flow.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::PlaylistEntry;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";

/// Largest page the playlist endpoint serves.
pub const PAGE_LIMIT: usize = 100;

/// One page of a playlist listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub entries: Vec<PlaylistEntry>,
    /// Offset of the next page, if there is one
    pub next: Option<usize>,
}

pub trait TrackSource: Sync {
    /// Entries of `playlist_id` starting at `offset`.
    fn playlist_page(&self, playlist_id: &str, offset: usize) -> std::result::Result<Page, String>;
}

/// Follow pagination until the playlist is exhausted.
pub fn collect_playlist(source: &dyn TrackSource, playlist: &str, playlist_id: &str) -> Result<Vec<PlaylistEntry>> {
    let mut entries = Vec::new();
    let mut offset = 0;
    loop {
        let page = source
            .playlist_page(playlist_id, offset)
            .map_err(|reason| Error::PlaylistLookup {
                playlist: playlist.to_string(),
                id: playlist_id.to_string(),
                reason,
            })?;
        entries.extend(page.entries);
        match page.next {
            Some(next) if next > offset => offset = next,
            _ => break,
        }
    }
    Ok(entries)
}

// ============================================================================
// Wire Format
// ============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct TracksResponse {
    items: Vec<Item>,
    next: Option<String>,
}

#[derive(Deserialize)]
struct Item {
    #[serde(default)]
    added_at: Option<String>,
    #[serde(default)]
    added_by: Option<User>,
    /// Null for removed and local tracks
    track: Option<Track>,
}

#[derive(Deserialize)]
struct User {
    id: String,
}

#[derive(Deserialize)]
struct Track {
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
}

#[derive(Deserialize)]
struct Artist {
    name: String,
}

fn page_from_response(response: TracksResponse, offset: usize) -> Page {
    let fetched = response.items.len();
    let entries = response
        .items
        .into_iter()
        .filter_map(|item| {
            let track = item.track?;
            Some(PlaylistEntry {
                title: track.name,
                artists: track.artists.into_iter().map(|a| a.name).collect(),
                added_at: item.added_at.unwrap_or_default(),
                added_by: item.added_by.map(|u| u.id).unwrap_or_default(),
            })
        })
        .collect();
    Page {
        entries,
        next: response.next.map(|_| offset + fetched),
    }
}

// ============================================================================
// Client
// ============================================================================

pub struct SpotifyClient {
    agent: ureq::Agent,
    client_id: String,
    client_secret: String,
    token: OnceCell<String>,
}

impl SpotifyClient {
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(30))
                .build(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: OnceCell::new(),
        }
    }

    fn token(&self) -> std::result::Result<&str, String> {
        self.token
            .get_or_try_init(|| {
                let basic = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
                let response: TokenResponse = self
                    .agent
                    .post(TOKEN_URL)
                    .set("Authorization", &format!("Basic {}", basic))
                    .send_form(&[("grant_type", "client_credentials")])
                    .map_err(|e| format!("token request failed: {}", e))?
                    .into_json()
                    .map_err(|e| format!("bad token response: {}", e))?;
                debug!("Obtained Spotify access token");
                Ok(response.access_token)
            })
            .map(String::as_str)
    }
}

impl TrackSource for SpotifyClient {
    fn playlist_page(&self, playlist_id: &str, offset: usize) -> std::result::Result<Page, String> {
        let token = self.token()?;
        let url = format!("{}/playlists/{}/tracks", API_URL, playlist_id);
        let response: TracksResponse = self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bearer {}", token))
            .query("offset", &offset.to_string())
            .query("limit", &PAGE_LIMIT.to_string())
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => format!("HTTP {}", code),
                other => other.to_string(),
            })?
            .into_json()
            .map_err(|e| format!("bad playlist response: {}", e))?;
        debug!("Fetched {} items of {} at offset {}", response.items.len(), playlist_id, offset);
        Ok(page_from_response(response, offset))
    }
}
