//! Spotify Web API HTTP client - the remote query executor.
//!
//! Each call resolves a token, issues one authenticated GET, and classifies
//! the outcome. An auth failure invalidates the credential that was used and
//! retries exactly once with the next preferred token; every other failure
//! (transport, non-success status, malformed body) is logged and degrades to
//! an empty result. Remote unavailability must never fail a catalog query.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::auth::TokenManager;
use super::dto;
use super::traits::SpotifyApi;

/// User agent sent on every API call.
const USER_AGENT: &str = concat!(
    "MusicBridge/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/music-bridge)"
);

/// Search and listing page size cap imposed by the service.
const MAX_PAGE: u32 = 50;

/// Market used for region-scoped endpoints when the user has none on file.
const DEFAULT_MARKET: &str = "US";

/// Spotify Web API client.
pub struct SpotifyClient {
    http: reqwest::Client,
    api_url: String,
    tokens: Arc<TokenManager>,
}

impl SpotifyClient {
    pub fn new(tokens: Arc<TokenManager>, api_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            http,
            api_url: api_url.into(),
            tokens,
        }
    }

    /// Issue one authenticated GET and deserialize the envelope.
    ///
    /// Exactly one retry, and only for an auth failure; no backoff, no
    /// queuing - this is a synchronous fetch scoped to one catalog query.
    async fn get_json<T: DeserializeOwned>(&self, user_id: Uuid, url: &str) -> Option<T> {
        for attempt in 0..2 {
            let Some(token) = self.tokens.select_token(user_id).await else {
                tracing::debug!(%user_id, "no usable credential, skipping remote fetch");
                return None;
            };

            let response = match self.http.get(url).bearer_auth(&token.value).send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(url, "remote query transport failure: {e}");
                    return None;
                }
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                self.tokens.invalidate(user_id, token.mode);
                if attempt == 0 {
                    tracing::debug!(url, "auth failure, retrying with next credential");
                    continue;
                }
                tracing::warn!(url, "auth failure persisted after retry");
                return None;
            }

            if !status.is_success() {
                // Try to surface the service's own message
                match response.json::<dto::ApiError>().await {
                    Ok(err) => tracing::warn!(
                        url,
                        %status,
                        message = err.error.message.as_deref().unwrap_or(""),
                        "remote query rejected"
                    ),
                    Err(_) => tracing::warn!(url, %status, "remote query rejected"),
                }
                return None;
            }

            return match response.json::<T>().await {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(url, "malformed response body: {e}");
                    None
                }
            };
        }
        None
    }

    fn search_url(&self, term: &str, kind: &str, limit: u32) -> String {
        format!(
            "{}/search?q={}&type={}&limit={}",
            self.api_url,
            urlencoding::encode(term),
            kind,
            limit.clamp(1, MAX_PAGE)
        )
    }
}

#[async_trait]
impl SpotifyApi for SpotifyClient {
    async fn search_artists(&self, user_id: Uuid, term: &str, limit: u32) -> Vec<dto::Artist> {
        let url = self.search_url(term, "artist", limit);
        self.get_json::<dto::SearchResponse>(user_id, &url)
            .await
            .and_then(|r| r.artists)
            .map(|page| page.items)
            .unwrap_or_default()
    }

    async fn search_albums(&self, user_id: Uuid, term: &str, limit: u32) -> Vec<dto::Album> {
        let url = self.search_url(term, "album", limit);
        self.get_json::<dto::SearchResponse>(user_id, &url)
            .await
            .and_then(|r| r.albums)
            .map(|page| page.items)
            .unwrap_or_default()
    }

    async fn search_tracks(&self, user_id: Uuid, term: &str, limit: u32) -> Vec<dto::Track> {
        let url = self.search_url(term, "track", limit);
        self.get_json::<dto::SearchResponse>(user_id, &url)
            .await
            .and_then(|r| r.tracks)
            .map(|page| page.items)
            .unwrap_or_default()
    }

    async fn artist_albums(&self, user_id: Uuid, artist_id: &str) -> Vec<dto::Album> {
        let url = format!(
            "{}/artists/{}/albums?include_groups=album&limit={}",
            self.api_url, artist_id, MAX_PAGE
        );
        self.get_json::<dto::Paging<dto::Album>>(user_id, &url)
            .await
            .map(|page| page.items)
            .unwrap_or_default()
    }

    async fn album_tracks(&self, user_id: Uuid, album_id: &str) -> Vec<dto::Track> {
        let url = format!(
            "{}/albums/{}/tracks?limit={}",
            self.api_url, album_id, MAX_PAGE
        );
        self.get_json::<dto::Paging<dto::Track>>(user_id, &url)
            .await
            .map(|page| page.items)
            .unwrap_or_default()
    }

    async fn top_tracks(&self, user_id: Uuid, artist_id: &str) -> Vec<dto::Track> {
        let market = self
            .tokens
            .region(user_id)
            .await
            .unwrap_or_else(|| DEFAULT_MARKET.to_string());
        let url = format!(
            "{}/artists/{}/top-tracks?market={}",
            self.api_url,
            artist_id,
            urlencoding::encode(&market)
        );
        self.get_json::<dto::TopTracksResponse>(user_id, &url)
            .await
            .map(|r| r.tracks)
            .unwrap_or_default()
    }

    async fn saved_tracks(&self, user_id: Uuid, limit: u32, offset: u32) -> Vec<dto::Track> {
        let url = format!(
            "{}/me/tracks?limit={}&offset={}",
            self.api_url,
            limit.clamp(1, MAX_PAGE),
            offset
        );
        self.get_json::<dto::Paging<dto::SavedTrack>>(user_id, &url)
            .await
            .map(|page| page.items.into_iter().filter_map(|s| s.track).collect())
            .unwrap_or_default()
    }
}
