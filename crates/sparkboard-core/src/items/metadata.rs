//! Presentation metadata embedded in an item's generic text field.
//!
//! Music cards are persisted as `audio` items and file cards as `image`
//! items; the refinement lives in a JSON payload stored next to the URL.
//! Payloads are parsed once when a record is ingested. Anything that fails
//! to parse simply means "no refinement".

use serde::{Deserialize, Serialize};

/// Display mode used when a music card has none recorded.
pub const DEFAULT_DISPLAY_MODE: &str = "card";

fn default_display_mode() -> String {
    DEFAULT_DISPLAY_MODE.to_string()
}

/// Metadata that turns an `audio` item into a music card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicMetadata {
    /// Artist names, in display order.
    #[serde(default)]
    pub artists: Vec<String>,
    /// Album cover URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_image: Option<String>,
    /// How the card is drawn (e.g. `"card"`, `"compact"`).
    #[serde(default = "default_display_mode")]
    pub display_mode: String,
    /// Spotify track URI. Required: its presence is what marks the payload as music.
    pub spotify_uri: String,
    /// Public Spotify link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spotify_url: Option<String>,
}

impl MusicMetadata {
    /// Create metadata for a track with the default display mode.
    pub fn new(spotify_uri: impl Into<String>) -> Self {
        Self {
            artists: Vec::new(),
            album_image: None,
            display_mode: default_display_mode(),
            spotify_uri: spotify_uri.into(),
            spotify_url: None,
        }
    }

    /// Parse a payload, returning `None` for anything that is not a music payload.
    pub fn parse(payload: &str) -> Option<Self> {
        match serde_json::from_str::<Self>(payload) {
            Ok(meta) => Some(meta),
            Err(e) => {
                log::debug!("Metadata is not a music payload: {}", e);
                None
            }
        }
    }

    /// Serialize to the JSON payload stored alongside the audio URL.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Artist names joined for display.
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }
}

/// Metadata that turns an `image` item into a generic file card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Original file name. Required: its presence marks the payload as a file.
    pub file_name: String,
    /// MIME type reported at upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Size in bytes, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl FileMetadata {
    /// Create metadata for a named file.
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: None,
            size_bytes: None,
        }
    }

    /// Parse a payload, returning `None` for anything that is not a file payload.
    pub fn parse(payload: &str) -> Option<Self> {
        match serde_json::from_str::<Self>(payload) {
            Ok(meta) => Some(meta),
            Err(e) => {
                log::debug!("Metadata is not a file payload: {}", e);
                None
            }
        }
    }

    /// Serialize to the JSON payload stored alongside the file URL.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_music_payload_roundtrip() {
        let meta = MusicMetadata {
            artists: vec!["Nina Simone".to_string(), "Hal Mooney".to_string()],
            album_image: Some("https://i.scdn.co/image/abc".to_string()),
            display_mode: "compact".to_string(),
            spotify_uri: "spotify:track:123".to_string(),
            spotify_url: Some("https://open.spotify.com/track/123".to_string()),
        };

        let payload = meta.to_payload().unwrap();
        assert!(payload.contains("\"albumImage\""));
        assert!(payload.contains("\"spotifyUri\""));
        assert_eq!(MusicMetadata::parse(&payload), Some(meta));
    }

    #[test]
    fn test_music_payload_defaults() {
        let meta = MusicMetadata::parse(r#"{"spotifyUri":"spotify:track:9"}"#).unwrap();
        assert!(meta.artists.is_empty());
        assert_eq!(meta.display_mode, DEFAULT_DISPLAY_MODE);
        assert_eq!(meta.album_image, None);
    }

    #[test]
    fn test_music_payload_rejects_garbage() {
        assert_eq!(MusicMetadata::parse("voice memo"), None);
        assert_eq!(MusicMetadata::parse("{\"artists\": [\"x\"]"), None);
        // Valid JSON but not a music payload.
        assert_eq!(MusicMetadata::parse(r#"{"artists":["x"]}"#), None);
        assert_eq!(MusicMetadata::parse("42"), None);
    }

    #[test]
    fn test_artist_line() {
        let mut meta = MusicMetadata::new("spotify:track:1");
        meta.artists = vec!["A".to_string(), "B".to_string()];
        assert_eq!(meta.artist_line(), "A, B");
    }

    #[test]
    fn test_file_payload() {
        let meta = FileMetadata::parse(r#"{"fileName":"Brief.PDF","mimeType":"application/pdf"}"#).unwrap();
        assert_eq!(meta.file_name, "Brief.PDF");
        assert_eq!(meta.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(FileMetadata::parse(&meta.to_payload().unwrap()), Some(meta));
    }
}
