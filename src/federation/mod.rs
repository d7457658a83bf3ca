//! Federated query engine.
//!
//! [`FederatedCatalog`] wraps the backing store under the same
//! [`CatalogStore`] contract and augments the query operation with remote
//! results; every other operation passes straight through. Composition, not
//! inheritance: the engine holds the store, the remote API, and the
//! materializer, and callers can't tell it apart from a plain store.
//!
//! All remote sub-fetches complete before `query` returns, so callers see
//! definite results. Remote failure of any flavor degrades to local-only -
//! the store result is always valid on its own.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::cache::ItemCache;
use crate::model::{CatalogItem, ItemKind};
use crate::spotify::materialize::{MaterializeError, Materializer};
use crate::spotify::traits::SpotifyApi;
use crate::store::{CatalogStore, ItemQuery, QueryResult, StoreError};

/// Page size when the caller doesn't specify one.
pub const DEFAULT_LIMIT: u32 = 100;

/// Fixed page size for the favorites fetch loop.
pub const FAVORITES_PAGE_SIZE: u32 = 50;

/// Safety cap on favorites pages per query; the natural exits are the
/// requested limit and an empty page, but a misbehaving remote must not be
/// able to spin the loop forever.
pub const MAX_FAVORITE_PAGES: u32 = 20;

/// The backing store decorated with remote catalog federation.
pub struct FederatedCatalog {
    store: Arc<dyn CatalogStore>,
    remote: Arc<dyn SpotifyApi>,
    materializer: Materializer,
}

impl FederatedCatalog {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        remote: Arc<dyn SpotifyApi>,
        cache: Arc<ItemCache>,
    ) -> Self {
        let materializer = Materializer::new(store.clone(), cache);
        Self {
            store,
            remote,
            materializer,
        }
    }

    /// Resolve the user on whose behalf remote calls may be made: the
    /// querying user, or the owner of an item the query is scoped to.
    /// `None` silently degrades the query to local-only.
    async fn resolve_user(&self, query: &ItemQuery) -> Result<Option<Uuid>, StoreError> {
        if let Some(user_id) = query.user_id {
            return Ok(Some(user_id));
        }

        let scope_ids = query
            .parent_id
            .iter()
            .chain(query.artist_ids.iter())
            .chain(query.album_ids.iter());
        for &id in scope_ids {
            if let Some(item) = self.store.get_item(id).await? {
                if let Some(owner) = item.owner_id {
                    return Ok(Some(owner));
                }
            }
        }
        Ok(None)
    }

    /// A locally known, origin-marked item plus its remote id.
    async fn remote_ref(&self, id: Uuid) -> Result<Option<(CatalogItem, String)>, StoreError> {
        let Some(item) = self.materializer.find_local(id).await? else {
            return Ok(None);
        };
        if !item.has_origin(crate::spotify::ORIGIN_MARKER) {
            return Ok(None);
        }
        let Some(remote_id) = item.remote_id().map(str::to_string) else {
            return Ok(None);
        };
        Ok(Some((item, remote_id)))
    }

    /// Swallow ident failures (log and skip the entity), propagate store
    /// faults.
    fn keep(
        result: Result<CatalogItem, MaterializeError>,
    ) -> Result<Option<CatalogItem>, StoreError> {
        match result {
            Ok(item) => Ok(Some(item)),
            Err(MaterializeError::Ident(e)) => {
                tracing::warn!("skipping remote entity: {e}");
                Ok(None)
            }
            Err(MaterializeError::Store(e)) => Err(e),
        }
    }

    /// Artist search augmentation: only when a term is present and the
    /// store came up short of the requested page.
    async fn augment_artists(
        &self,
        query: &ItemQuery,
        local_count: usize,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CatalogItem>, StoreError> {
        let Some(term) = query.search_term.as_deref() else {
            return Ok(Vec::new());
        };
        if local_count >= limit {
            return Ok(Vec::new());
        }

        let shortfall = (limit - local_count) as u32;
        let artists = self.remote.search_artists(user_id, term, shortfall).await;

        let mut out = Vec::new();
        for artist in &artists {
            if let Some(item) = Self::keep(self.materializer.artist(artist, Some(user_id)).await)? {
                out.push(item);
            }
        }
        Ok(out)
    }

    /// Album augmentation: listings for each scoped artist plus free-text
    /// search.
    async fn augment_albums(
        &self,
        query: &ItemQuery,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CatalogItem>, StoreError> {
        let mut out = Vec::new();

        for &artist_id in &query.artist_ids {
            let Some((artist, remote_id)) = self.remote_ref(artist_id).await? else {
                continue;
            };
            let albums = self.remote.artist_albums(user_id, &remote_id).await;
            for album in &albums {
                let owner = artist.owner_id.or(Some(user_id));
                if let Some(item) =
                    Self::keep(self.materializer.album(album, Some(artist.id), owner).await)?
                {
                    out.push(item);
                }
            }
        }

        if let Some(term) = query.search_term.as_deref() {
            let albums = self.remote.search_albums(user_id, term, limit as u32).await;
            for album in &albums {
                if let Some(item) =
                    Self::keep(self.materializer.album(album, None, Some(user_id)).await)?
                {
                    out.push(item);
                }
            }
        }

        Ok(out)
    }

    /// Track augmentation: artist top tracks, album tracks, free-text
    /// search, and the favorites loop.
    async fn augment_tracks(
        &self,
        query: &ItemQuery,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CatalogItem>, StoreError> {
        let mut out = Vec::new();

        for &artist_id in &query.artist_ids {
            let Some((artist, remote_id)) = self.remote_ref(artist_id).await? else {
                continue;
            };
            let tracks = self.remote.top_tracks(user_id, &remote_id).await;
            for track in tracks.iter().filter(|t| t.is_audio()) {
                let owner = artist.owner_id.or(Some(user_id));
                if let Some(item) =
                    Self::keep(self.materializer.track(track, None, owner).await)?
                {
                    out.push(item);
                }
            }
        }

        for &album_id in &query.album_ids {
            if let Some((album, _)) = self.remote_ref(album_id).await? {
                out.extend(self.album_tracks_of(&album, user_id).await?);
            }
        }

        if let Some(term) = query.search_term.as_deref() {
            let tracks = self.remote.search_tracks(user_id, term, limit as u32).await;
            for track in tracks.iter().filter(|t| t.is_audio()) {
                if let Some(item) =
                    Self::keep(self.materializer.track(track, None, Some(user_id)).await)?
                {
                    out.push(item);
                }
            }
        }

        if query.favorites_only {
            out.extend(self.fetch_favorites(user_id, limit).await?);
        }

        Ok(out)
    }

    /// A query with no item-type filter but a parent id is an album-tracks
    /// browse; anything else passes through untouched.
    async fn augment_album_browse(
        &self,
        parent_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<CatalogItem>, StoreError> {
        let Some((album, _)) = self.remote_ref(parent_id).await? else {
            return Ok(Vec::new());
        };
        if album.kind != ItemKind::Album {
            return Ok(Vec::new());
        }
        self.album_tracks_of(&album, user_id).await
    }

    /// Member tracks of a remote album, short-circuited by the album's
    /// linked-children set when every child is still resolvable locally.
    async fn album_tracks_of(
        &self,
        album: &CatalogItem,
        user_id: Uuid,
    ) -> Result<Vec<CatalogItem>, StoreError> {
        if !album.linked_children.is_empty() {
            let mut known = Vec::with_capacity(album.linked_children.len());
            for child in &album.linked_children {
                match self.materializer.find_local(child.item_id).await? {
                    Some(item) => known.push(item),
                    None => {
                        known.clear();
                        break;
                    }
                }
            }
            if !known.is_empty() {
                return Ok(known);
            }
        }

        let Some(remote_id) = album.remote_id() else {
            return Ok(Vec::new());
        };
        let fetched = self.remote.album_tracks(user_id, remote_id).await;
        let audio: Vec<_> = fetched.into_iter().filter(|t| t.is_audio()).collect();
        if audio.is_empty() {
            return Ok(Vec::new());
        }

        let owner = album.owner_id.or(Some(user_id));
        let mut tracks = Vec::new();
        for track in &audio {
            if let Some(item) =
                Self::keep(self.materializer.track(track, Some(album.id), owner).await)?
            {
                tracks.push(item);
            }
        }

        let mut album = album.clone();
        self.materializer
            .replace_album_children(&mut album, &tracks)
            .await?;

        Ok(tracks)
    }

    /// Page through the user's remote favorites, marking each for the
    /// querying user, until the requested count is met, a page comes back
    /// empty, or the safety cap trips.
    async fn fetch_favorites(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<CatalogItem>, StoreError> {
        let mut gathered = Vec::new();
        let mut offset = 0u32;

        for _ in 0..MAX_FAVORITE_PAGES {
            let page = self
                .remote
                .saved_tracks(user_id, FAVORITES_PAGE_SIZE, offset)
                .await;
            if page.is_empty() {
                break;
            }
            offset += page.len() as u32;

            for track in page.iter().filter(|t| t.is_audio()) {
                if let Some(item) =
                    Self::keep(self.materializer.track(track, None, Some(user_id)).await)?
                {
                    self.store.set_favorite(user_id, item.id, true).await?;
                    gathered.push(item);
                }
            }

            if gathered.len() >= limit {
                break;
            }
        }

        Ok(gathered)
    }
}

#[async_trait]
impl CatalogStore for FederatedCatalog {
    async fn upsert_item(&self, item: &CatalogItem) -> Result<(), StoreError> {
        self.store.upsert_item(item).await
    }

    async fn upsert_items(&self, items: &[CatalogItem]) -> Result<(), StoreError> {
        self.store.upsert_items(items).await
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<CatalogItem>, StoreError> {
        self.store.get_item(id).await
    }

    async fn set_favorite(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        favorite: bool,
    ) -> Result<(), StoreError> {
        self.store.set_favorite(user_id, item_id, favorite).await
    }

    async fn query(&self, query: &ItemQuery) -> Result<QueryResult, StoreError> {
        let local = self.store.query(query).await?;
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT) as usize;

        let Some(user_id) = self.resolve_user(query).await? else {
            return Ok(local);
        };

        let album_browse = query.kind.is_none() && query.parent_id.is_some();
        let remote_items = match query.kind {
            Some(ItemKind::Artist) => {
                self.augment_artists(query, local.items.len(), user_id, limit)
                    .await?
            }
            Some(ItemKind::Album) => self.augment_albums(query, user_id, limit).await?,
            Some(ItemKind::Track) => self.augment_tracks(query, user_id, limit).await?,
            Some(ItemKind::Folder) => Vec::new(),
            None => match query.parent_id {
                Some(parent_id) => self.augment_album_browse(parent_id, user_id).await?,
                None => Vec::new(),
            },
        };

        if remote_items.is_empty() {
            return Ok(local);
        }

        // Merge with dedup by local id; a store hit wins over its remote
        // duplicate, which is counted but excluded.
        let mut seen: HashSet<Uuid> = local.items.iter().map(|i| i.id).collect();
        let mut items = local.items;
        let mut duplicates = 0u32;
        for item in remote_items {
            if seen.insert(item.id) {
                items.push(item);
            } else {
                duplicates += 1;
            }
        }

        if album_browse {
            // Album browses come back in play order.
            items.sort_by(|a, b| {
                let ka = (a.disc_number.unwrap_or(1), a.track_number.unwrap_or(0));
                let kb = (b.disc_number.unwrap_or(1), b.track_number.unwrap_or(0));
                ka.cmp(&kb).then_with(|| a.sort_name.cmp(&b.sort_name))
            });
        }

        let mut total = local.total.max(query.offset as u64 + items.len() as u64);
        if items.len() > limit {
            items.truncate(limit);
        }
        if items.len() >= limit {
            // The page is full and more remote results may exist: report one
            // extra page window so a forward-paging caller keeps going. A
            // heuristic estimate, not exact arithmetic.
            total += limit as u64;
        }

        Ok(QueryResult {
            items,
            total,
            duplicates,
        })
    }
}
