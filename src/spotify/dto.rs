//! Spotify Web API Data Transfer Objects
//!
//! These types match EXACTLY what the Spotify API returns.
//! DO NOT add fields that aren't in the API response.
//! DO NOT use these types outside the spotify module - convert to catalog
//! items via the materializer.
//!
//! API Reference: https://developer.spotify.com/documentation/web-api
//!
//! Responses come in a closed set of envelopes selected by which endpoint
//! was called: the search envelope (optional per-type sub-envelopes), paged
//! lists (artist albums, album tracks, saved tracks), and the bare
//! `top-tracks` array wrapper.

use std::collections::HashMap;

use serde::Deserialize;

/// Response from the accounts token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    /// Present when exchanging an authorization code; sometimes rotated on
    /// refresh.
    pub refresh_token: Option<String>,
}

/// One page of a paged list.
#[derive(Debug, Clone, Deserialize)]
pub struct Paging<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub total: Option<u32>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// `GET /search` envelope; only the requested types are present.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub artists: Option<Paging<Artist>>,
    pub albums: Option<Paging<Album>>,
    pub tracks: Option<Paging<Track>>,
}

/// `GET /artists/{id}/top-tracks` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct TopTracksResponse {
    #[serde(default)]
    pub tracks: Vec<Track>,
}

/// One saved-track entry from `GET /me/tracks`.
#[derive(Debug, Clone, Deserialize)]
pub struct SavedTrack {
    pub track: Option<Track>,
    pub added_at: Option<String>,
}

/// Artwork image. Width/height are absent for some uploads.
#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Artist object. Simplified artist references (inside albums/tracks) omit
/// genres, images, and followers; serde defaults cover both shapes.
#[derive(Debug, Clone, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub external_urls: HashMap<String, String>,
}

/// Album object (full or simplified).
#[derive(Debug, Clone, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub album_type: Option<String>,
    /// `YYYY`, `YYYY-MM`, or `YYYY-MM-DD` depending on release_date_precision.
    pub release_date: Option<String>,
    pub total_tracks: Option<u32>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub external_urls: HashMap<String, String>,
}

/// Track object (full or simplified; simplified tracks omit the album).
#[derive(Debug, Clone, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub artists: Vec<Artist>,
    pub album: Option<Album>,
    #[serde(default)]
    pub external_urls: HashMap<String, String>,
    /// Object type; `"track"` for audio. Mixed lists can carry episodes.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl Track {
    /// Whether this entry is playable audio (as opposed to an episode or an
    /// untyped placeholder row, which some mixed endpoints emit).
    pub fn is_audio(&self) -> bool {
        self.kind.as_deref().map(|k| k == "track").unwrap_or(true)
    }
}

/// `GET /me` profile; only the fields the federation layer consumes.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub id: Option<String>,
    /// Two-letter market/region code.
    pub country: Option<String>,
}

/// Error envelope: `{"error": {"status": 401, "message": "..."}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub status: Option<u16>,
    pub message: Option<String>,
}

// ============================================================================
// CONTRACT TESTS
// These verify our DTOs match what the real API returns.
// If these fail, the API has changed and we need to update our DTOs.
// ============================================================================

#[cfg(test)]
mod contract_tests {
    use super::*;

    #[test]
    fn test_parse_token_response() {
        let json = r#"{
            "access_token": "NgCXRK...MzYjw",
            "token_type": "Bearer",
            "expires_in": 3600
        }"#;

        let token: TokenResponse = serde_json::from_str(json).expect("Should parse token");
        assert_eq!(token.access_token, "NgCXRK...MzYjw");
        assert_eq!(token.expires_in, Some(3600));
        assert!(token.refresh_token.is_none());
    }

    #[test]
    fn test_parse_token_response_with_refresh() {
        let json = r#"{
            "access_token": "BQDf...xyz",
            "token_type": "Bearer",
            "scope": "user-library-read",
            "expires_in": 3600,
            "refresh_token": "AQD...abc"
        }"#;

        let token: TokenResponse = serde_json::from_str(json).expect("Should parse token");
        assert_eq!(token.refresh_token.as_deref(), Some("AQD...abc"));
    }

    #[test]
    fn test_parse_search_response_artists_only() {
        let json = r#"{
            "artists": {
                "href": "https://api.spotify.com/v1/search?query=daft+punk",
                "items": [{
                    "id": "4tZwfgrHOc3mvqYlEYSvVi",
                    "name": "Daft Punk",
                    "type": "artist",
                    "genres": ["electro", "french house"],
                    "images": [
                        {"url": "https://i.scdn.co/image/big", "width": 640, "height": 640},
                        {"url": "https://i.scdn.co/image/small", "width": 160, "height": 160}
                    ],
                    "external_urls": {"spotify": "https://open.spotify.com/artist/4tZwfgrHOc3mvqYlEYSvVi"},
                    "popularity": 82
                }],
                "limit": 20,
                "offset": 0,
                "total": 93
            }
        }"#;

        let search: SearchResponse = serde_json::from_str(json).expect("Should parse search");
        let artists = search.artists.expect("artists sub-envelope");
        assert_eq!(artists.total, Some(93));
        assert_eq!(artists.items.len(), 1);
        assert_eq!(artists.items[0].name, "Daft Punk");
        assert_eq!(artists.items[0].genres.len(), 2);
        assert_eq!(artists.items[0].images[1].width, Some(160));
        assert!(search.albums.is_none());
        assert!(search.tracks.is_none());
    }

    #[test]
    fn test_parse_full_track() {
        let json = r#"{
            "id": "69kOkLUCkxIZYexIgSG8rq",
            "name": "Get Lucky",
            "type": "track",
            "disc_number": 1,
            "track_number": 8,
            "duration_ms": 369626,
            "artists": [
                {"id": "4tZwfgrHOc3mvqYlEYSvVi", "name": "Daft Punk"},
                {"id": "2RdwBSPQiwcmiDo9kixcl8", "name": "Pharrell Williams"}
            ],
            "album": {
                "id": "4m2880jivSbbyEGAKfITCa",
                "name": "Random Access Memories",
                "album_type": "album",
                "release_date": "2013-05-17",
                "total_tracks": 13,
                "images": [{"url": "https://i.scdn.co/image/cover", "width": 640, "height": 640}],
                "artists": [{"id": "4tZwfgrHOc3mvqYlEYSvVi", "name": "Daft Punk"}]
            },
            "external_urls": {"spotify": "https://open.spotify.com/track/69kOkLUCkxIZYexIgSG8rq"}
        }"#;

        let track: Track = serde_json::from_str(json).expect("Should parse track");
        assert_eq!(track.name, "Get Lucky");
        assert_eq!(track.disc_number, Some(1));
        assert_eq!(track.track_number, Some(8));
        assert_eq!(track.duration_ms, Some(369626));
        assert_eq!(track.artists.len(), 2);
        assert!(track.is_audio());

        let album = track.album.expect("album");
        assert_eq!(album.release_date.as_deref(), Some("2013-05-17"));
        // Simplified artists inside an album have no genres or images.
        assert!(album.artists[0].genres.is_empty());
        assert!(album.artists[0].images.is_empty());
    }

    #[test]
    fn test_parse_simplified_track_page() {
        // /albums/{id}/tracks returns simplified tracks: no album field.
        let json = r#"{
            "items": [
                {"id": "a1", "name": "One", "disc_number": 1, "track_number": 1, "duration_ms": 1000},
                {"id": "a2", "name": "Two", "disc_number": 1, "track_number": 2, "duration_ms": 2000}
            ],
            "limit": 50,
            "offset": 0,
            "total": 2
        }"#;

        let page: Paging<Track> = serde_json::from_str(json).expect("Should parse page");
        assert_eq!(page.items.len(), 2);
        assert!(page.items[0].album.is_none());
        assert!(page.items[0].is_audio());
    }

    #[test]
    fn test_parse_saved_tracks_page() {
        let json = r#"{
            "items": [
                {"added_at": "2024-11-02T10:21:00Z", "track": {"id": "t1", "name": "Fav", "type": "track"}},
                {"added_at": "2024-11-01T09:00:00Z", "track": null}
            ],
            "limit": 50,
            "offset": 0,
            "total": 117
        }"#;

        let page: Paging<SavedTrack> = serde_json::from_str(json).expect("Should parse saved");
        assert_eq!(page.total, Some(117));
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].track.as_ref().unwrap().id, "t1");
        // Removed-from-catalog entries come back with a null track.
        assert!(page.items[1].track.is_none());
    }

    #[test]
    fn test_parse_top_tracks_envelope() {
        let json = r#"{"tracks": [{"id": "t9", "name": "Around the World", "type": "track"}]}"#;

        let top: TopTracksResponse = serde_json::from_str(json).expect("Should parse top tracks");
        assert_eq!(top.tracks.len(), 1);
    }

    #[test]
    fn test_episode_is_not_audio() {
        let json = r#"{"id": "e1", "name": "Some Podcast", "type": "episode"}"#;
        let track: Track = serde_json::from_str(json).expect("Should parse");
        assert!(!track.is_audio());
    }

    #[test]
    fn test_parse_profile() {
        let json = r#"{"id": "wizzler", "display_name": "Wizzler", "country": "SE"}"#;
        let profile: Profile = serde_json::from_str(json).expect("Should parse profile");
        assert_eq!(profile.country.as_deref(), Some("SE"));
    }

    #[test]
    fn test_parse_error_envelope() {
        let json = r#"{"error": {"status": 401, "message": "The access token expired"}}"#;
        let err: ApiError = serde_json::from_str(json).expect("Should parse error");
        assert_eq!(err.error.status, Some(401));
        assert_eq!(err.error.message.as_deref(), Some("The access token expired"));
    }
}
