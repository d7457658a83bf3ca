//! Contracts consumed by the federation layer.
//!
//! These traits enable dependency injection and mocking for tests: the
//! federation engine holds `Arc<dyn CatalogStore>` / `Arc<dyn UserStore>`
//! and never sees SQLite directly. Production code uses the `db` module's
//! implementations.

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{CatalogItem, ItemKind};

/// Errors from the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt row for {context}: {message}")]
    Corrupt { context: String, message: String },
}

impl StoreError {
    pub fn corrupt(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            context: context.into(),
            message: message.into(),
        }
    }
}

/// A catalog query. All filters are conjunctive; empty vectors mean
/// "no constraint".
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
    /// Item-type filter. `None` with a parent id set means "children of the
    /// parent", which the federation layer reads as an album-tracks browse.
    pub kind: Option<ItemKind>,
    /// Direct parent scope.
    pub parent_id: Option<Uuid>,
    /// Artist scope: matches direct children and grandchildren, so it finds
    /// both an artist's albums and an artist's tracks.
    pub artist_ids: Vec<Uuid>,
    /// Album scope: matches direct children (tracks).
    pub album_ids: Vec<Uuid>,
    /// Case-insensitive substring match on the display name.
    pub search_term: Option<String>,
    /// Restrict to items the querying user has favorited.
    pub favorites_only: bool,
    /// The querying user; required for favorites and used as remote-call
    /// context by the federation layer.
    pub user_id: Option<Uuid>,
    pub offset: u32,
    /// Page size; `None` means the engine default.
    pub limit: Option<u32>,
}

/// Query outcome: one page of items plus the reported total across all
/// pages. `duplicates` counts merged-away remote results (always 0 for a
/// plain store query).
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub items: Vec<CatalogItem>,
    pub total: u64,
    pub duplicates: u32,
}

/// The backing catalog store contract.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or update a single item by id.
    async fn upsert_item(&self, item: &CatalogItem) -> Result<(), StoreError>;

    /// Insert or update many items.
    async fn upsert_items(&self, items: &[CatalogItem]) -> Result<(), StoreError>;

    /// Point lookup by id.
    async fn get_item(&self, id: Uuid) -> Result<Option<CatalogItem>, StoreError>;

    /// Filtered, paginated catalog query.
    async fn query(&self, query: &ItemQuery) -> Result<QueryResult, StoreError>;

    /// Set or clear a user's favorite flag on an item.
    async fn set_favorite(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        favorite: bool,
    ) -> Result<(), StoreError>;
}

/// A user record as consumed by the federation layer: identity plus the
/// remote-service credential and token fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Application credential for the remote service.
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Last acquired client-credentials token.
    pub client_token: Option<String>,
    /// Interactive ("web") token with user-level privileges.
    pub web_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Two-letter market/region code.
    pub region: Option<String>,
}

impl User {
    /// Whether an application credential is on file.
    pub fn has_credential(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }
}

/// User record persistence contract.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, name: &str) -> Result<User, StoreError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, StoreError>;
    async fn update_user(&self, user: &User) -> Result<(), StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
}
