//! Key normalization shared by the record store and the local inventory.
//!
//! Canonical records are keyed by `"{title} - {artist, artist}"` and local
//! files by their basename without extension. Both sides are NFC-composed so
//! that filenames stored in decomposed form (macOS) compare equal to the
//! composed strings the playlist API returns.
//!
//! CRITICAL: exact matching relies on both sides going through these
//! functions. Keep them in lockstep.

use unicode_normalization::{is_nfc, UnicodeNormalization};

/// Separator between title and artists in a track identifier.
pub const TITLE_ARTIST_SEPARATOR: &str = " - ";

/// Separator between artist names in a track identifier.
pub const ARTIST_SEPARATOR: &str = ", ";

/// Compose to NFC, skipping the allocation when the input already is.
pub fn compose(s: &str) -> String {
    if is_nfc(s) {
        s.to_string()
    } else {
        s.nfc().collect()
    }
}

/// Build the track identifier for a canonical record.
/// e.g., ("Song A", ["Artist X", "Artist Y"]) → "Song A - Artist X, Artist Y"
pub fn track_id(title: &str, artists: &[String]) -> String {
    compose(&format!(
        "{}{}{}",
        title,
        TITLE_ARTIST_SEPARATOR,
        artists.join(ARTIST_SEPARATOR)
    ))
}

/// Last path component of a `/`-separated inventory path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Directory part of a `/`-separated inventory path ("" for top-level files).
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Join a directory and a file name with `/`, tolerating an empty directory.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name)
    }
}

/// Strip the final extension. A leading dot does not start an extension
/// (".hidden" stays ".hidden").
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

/// Matching key for a local file: basename without extension, NFC-composed.
/// e.g., "user/House/Song A - Artist X.mp3" → "Song A - Artist X"
pub fn file_key(path: &str) -> String {
    compose(strip_extension(file_name(path)))
}

/// Case folding applied before similarity scoring.
pub fn fold_case(s: &str) -> String {
    s.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_id_joins_artists() {
        let artists = vec!["Artist X".to_string(), "Artist Y".to_string()];
        assert_eq!(track_id("Song A", &artists), "Song A - Artist X, Artist Y");
        assert_eq!(track_id("Solo", &["Only".to_string()]), "Solo - Only");
    }

    #[test]
    fn test_file_key() {
        assert_eq!(file_key("Song A - Artist X.mp3"), "Song A - Artist X");
        assert_eq!(file_key("dir/sub/Song A - Artist X.mp3"), "Song A - Artist X");
        // Only the final extension is stripped
        assert_eq!(file_key("dir/Mr. Brightside - The Killers.mp3"), "Mr. Brightside - The Killers");
        assert_eq!(file_key("dir/.hidden"), ".hidden");
        assert_eq!(file_key("no_extension"), "no_extension");
    }

    #[test]
    fn test_file_key_composes_decomposed_names() {
        // "é" as 'e' + COMBINING ACUTE ACCENT
        let decomposed = "Beyonce\u{0301} - Halo.mp3";
        assert_eq!(file_key(decomposed), "Beyoncé - Halo");
        assert_eq!(track_id("Beyonce\u{0301}", &["Halo".to_string()]), "Beyoncé - Halo");
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(file_name("a/b/c.mp3"), "c.mp3");
        assert_eq!(file_name("c.mp3"), "c.mp3");
        assert_eq!(parent_dir("a/b/c.mp3"), "a/b");
        assert_eq!(parent_dir("c.mp3"), "");
        assert_eq!(join("a/b", "d.mp3"), "a/b/d.mp3");
        assert_eq!(join("a/b/", "d.mp3"), "a/b/d.mp3");
        assert_eq!(join("", "d.mp3"), "d.mp3");
    }

    #[test]
    fn test_fold_case() {
        assert_eq!(fold_case("Song - ARTIST"), "song - artist");
    }
}
