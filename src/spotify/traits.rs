//! Trait definition for the remote catalog API.
//!
//! This trait enables dependency injection and mocking for tests.
//! Production code uses [`super::client::SpotifyClient`]; tests substitute
//! the mock below. The methods are the closed set of read endpoints the
//! federation layer consumes - the envelope shape is decided by which method
//! is called, never by inspecting the payload.
//!
//! Every method returns an empty list on any failure: remote degradation is
//! handled inside the executor and must never surface as an error here.

use async_trait::async_trait;
use uuid::Uuid;

use super::dto;

/// Read access to the remote catalog on behalf of one user.
#[async_trait]
pub trait SpotifyApi: Send + Sync {
    async fn search_artists(&self, user_id: Uuid, term: &str, limit: u32) -> Vec<dto::Artist>;

    async fn search_albums(&self, user_id: Uuid, term: &str, limit: u32) -> Vec<dto::Album>;

    async fn search_tracks(&self, user_id: Uuid, term: &str, limit: u32) -> Vec<dto::Track>;

    /// Albums credited to an artist.
    async fn artist_albums(&self, user_id: Uuid, artist_id: &str) -> Vec<dto::Album>;

    /// The member tracks of an album, in disc/track order.
    async fn album_tracks(&self, user_id: Uuid, album_id: &str) -> Vec<dto::Track>;

    /// An artist's most popular tracks in the user's market.
    async fn top_tracks(&self, user_id: Uuid, artist_id: &str) -> Vec<dto::Track>;

    /// One page of the user's saved tracks.
    async fn saved_tracks(&self, user_id: Uuid, limit: u32, offset: u32) -> Vec<dto::Track>;
}
