//! Catalog materializer: remote entities to local catalog items.
//!
//! This is the ONLY place where wire DTOs become [`CatalogItem`]s. Each
//! conversion is idempotent: the candidate id is derived from the remote id,
//! looked up in cache then store, and reused when the hit carries the origin
//! marker. The marker check guards against a derived-id collision landing on
//! an unrelated native entity - a collision between two remote entities
//! stays undetected and the second one is treated as already known.
//!
//! New items are persisted immediately with single-entity writes; the cache
//! TTL is refreshed on reuse and creation alike.

use std::sync::Arc;

use uuid::Uuid;

use super::dto;
use super::ident::{derive_item_id, IdentError};
use super::{external_ref, ORIGIN_MARKER};
use crate::cache::ItemCache;
use crate::model::{track_sort_name, CatalogItem, ItemKind, LinkedChild};
use crate::store::{CatalogStore, StoreError};

/// Errors from materializing one remote entity.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("unusable remote id: {0}")]
    Ident(#[from] IdentError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Converts remote entities into persisted catalog items.
pub struct Materializer {
    store: Arc<dyn CatalogStore>,
    cache: Arc<ItemCache>,
}

impl Materializer {
    pub fn new(store: Arc<dyn CatalogStore>, cache: Arc<ItemCache>) -> Self {
        Self { store, cache }
    }

    /// Materialize an artist. Artists are parent-less.
    pub async fn artist(
        &self,
        artist: &dto::Artist,
        owner: Option<Uuid>,
    ) -> Result<CatalogItem, MaterializeError> {
        let id = derive_item_id(&artist.id)?;
        if let Some(existing) = self.reusable(id).await? {
            return Ok(existing);
        }

        let mut item = CatalogItem::new(id, ItemKind::Artist, &artist.name);
        item.owner_id = owner;
        item.external_ref = Some(external_ref("artist", &artist.id));
        item.provider_ids
            .insert(ORIGIN_MARKER.to_string(), artist.id.clone());
        item.homepage = artist.external_urls.get(ORIGIN_MARKER).cloned();
        item.genres = artist.genres.clone();
        (item.primary_image, item.thumb_image) = pick_artwork(&artist.images);

        self.persist(item).await
    }

    /// Materialize an album. With no explicit parent the first credited
    /// artist (materialized here, owner-preserving) becomes the parent.
    pub async fn album(
        &self,
        album: &dto::Album,
        parent_id: Option<Uuid>,
        owner: Option<Uuid>,
    ) -> Result<CatalogItem, MaterializeError> {
        let id = derive_item_id(&album.id)?;
        if let Some(existing) = self.reusable(id).await? {
            return Ok(existing);
        }

        let mut parent_id = parent_id;
        for artist in &album.artists {
            match self.artist(artist, owner).await {
                Ok(artist_item) => {
                    if parent_id.is_none() {
                        parent_id = Some(artist_item.id);
                    }
                }
                Err(e) => {
                    tracing::warn!(artist = %artist.id, "skipping album artist: {e}");
                }
            }
        }

        let mut item = CatalogItem::new(id, ItemKind::Album, &album.name);
        item.parent_id = parent_id;
        item.owner_id = owner;
        item.external_ref = Some(external_ref("album", &album.id));
        item.provider_ids
            .insert(ORIGIN_MARKER.to_string(), album.id.clone());
        item.homepage = album.external_urls.get(ORIGIN_MARKER).cloned();
        item.genres = album.genres.clone();
        (item.primary_image, item.thumb_image) = pick_artwork(&album.images);
        item.artist_names = album.artists.iter().map(|a| a.name.clone()).collect();
        // Best-effort year from the leading YYYY; a parse failure leaves it
        // unset rather than guessing.
        item.year = album
            .release_date
            .as_deref()
            .and_then(|d| d.split('-').next())
            .and_then(|y| y.parse().ok());

        self.persist(item).await
    }

    /// Materialize a track.
    ///
    /// An already-known track with no parent link picks up a supplied parent
    /// id (late linking - e.g. a favorite later discovered to belong to a
    /// browsed album).
    pub async fn track(
        &self,
        track: &dto::Track,
        parent_id: Option<Uuid>,
        owner: Option<Uuid>,
    ) -> Result<CatalogItem, MaterializeError> {
        let id = derive_item_id(&track.id)?;
        if let Some(mut existing) = self.reusable(id).await? {
            if existing.parent_id.is_none() && parent_id.is_some() {
                existing.parent_id = parent_id;
                self.store.upsert_item(&existing).await?;
                self.cache.put(existing.clone());
            }
            return Ok(existing);
        }

        for artist in &track.artists {
            if let Err(e) = self.artist(artist, owner).await {
                tracing::warn!(artist = %artist.id, "skipping track artist: {e}");
            }
        }

        let mut item = CatalogItem::new(id, ItemKind::Track, &track.name);
        item.sort_name = track_sort_name(track.disc_number, track.track_number, &track.name);
        item.parent_id = parent_id;
        item.owner_id = owner;
        item.external_ref = Some(external_ref("track", &track.id));
        item.provider_ids
            .insert(ORIGIN_MARKER.to_string(), track.id.clone());
        item.homepage = track.external_urls.get(ORIGIN_MARKER).cloned();
        item.runtime_ms = track.duration_ms;
        item.disc_number = track.disc_number;
        item.track_number = track.track_number;
        item.artist_names = track.artists.iter().map(|a| a.name.clone()).collect();
        // Tracks carry their album's artwork when the full object is present.
        if let Some(album) = &track.album {
            (item.primary_image, item.thumb_image) = pick_artwork(&album.images);
        }

        self.persist(item).await
    }

    /// Replace an album's linked-children set with the given member tracks
    /// and persist the album. Call after a fresh album-tracks fetch.
    pub async fn replace_album_children(
        &self,
        album: &mut CatalogItem,
        tracks: &[CatalogItem],
    ) -> Result<(), StoreError> {
        album.linked_children = tracks
            .iter()
            .filter_map(|t| {
                t.external_ref.as_ref().map(|r| LinkedChild {
                    item_id: t.id,
                    external_ref: r.clone(),
                })
            })
            .collect();

        self.store.upsert_item(album).await?;
        self.cache.put(album.clone());
        Ok(())
    }

    /// Cache-then-store lookup by id, refreshing the cache on either hit.
    pub async fn find_local(&self, id: Uuid) -> Result<Option<CatalogItem>, StoreError> {
        if let Some(item) = self.cache.get(id) {
            return Ok(Some(item));
        }
        let item = self.store.get_item(id).await?;
        if let Some(item) = &item {
            self.cache.put(item.clone());
        }
        Ok(item)
    }

    /// Only an origin-marked hit is reused; a native item under the same id
    /// is a derived-id collision and gets replaced by the remote entity.
    async fn reusable(&self, id: Uuid) -> Result<Option<CatalogItem>, StoreError> {
        match self.find_local(id).await? {
            Some(item) if item.has_origin(ORIGIN_MARKER) => Ok(Some(item)),
            Some(item) => {
                tracing::warn!(
                    id = %item.id,
                    name = %item.name,
                    "derived id collides with a native item; replacing"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn persist(&self, item: CatalogItem) -> Result<CatalogItem, MaterializeError> {
        self.store.upsert_item(&item).await?;
        self.cache.put(item.clone());
        Ok(item)
    }
}

/// Pick artwork from a remote image list: the widest image becomes the
/// primary, and with at least two images the narrowest becomes the
/// thumbnail.
fn pick_artwork(images: &[dto::Image]) -> (Option<String>, Option<String>) {
    if images.is_empty() {
        return (None, None);
    }

    let primary = images
        .iter()
        .max_by_key(|i| i.width.unwrap_or(0))
        .map(|i| i.url.clone());
    let thumb = if images.len() >= 2 {
        images
            .iter()
            .min_by_key(|i| i.width.unwrap_or(0))
            .map(|i| i.url.clone())
    } else {
        None
    };
    (primary, thumb)
}
