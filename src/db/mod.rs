//! Database module for catalog item and user persistence.
//!
//! Uses SQLx with SQLite for lightweight, embedded database storage.
//! Provides async operations for:
//! - Item upserts and point lookups
//! - The filtered catalog query consumed by the federation layer
//! - Per-user favorite flags
//! - User records (see `users` submodule)
//!
//! # Example
//!
//! ```ignore
//! use music_bridge::db::{db_url, Database};
//!
//! let db = Database::connect(&db_url(None)).await?;
//! let item = db.get_item(id).await?;
//! ```

pub mod users;

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use uuid::Uuid;

use crate::model::{CatalogItem, ItemKind, LinkedChild};
use crate::store::{CatalogStore, ItemQuery, QueryResult, StoreError};

/// Default database filename.
pub const DEFAULT_DB_NAME: &str = "music_bridge.db";

/// Build a SQLite database URL from an optional path.
///
/// If no path is provided, uses [`DEFAULT_DB_NAME`] in the current directory.
pub fn db_url(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("sqlite:{}", p.display()),
        None => format!("sqlite:{}", DEFAULT_DB_NAME),
    }
}

/// SQLite-backed catalog and user store.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Initialize the connection pool and run migrations.
    ///
    /// Creates the database file if it doesn't exist, establishes a
    /// connection pool with up to 5 connections, and runs all pending
    /// migrations.
    pub async fn connect(db_url: &str) -> Result<Self, sqlx::Error> {
        if !sqlx::Sqlite::database_exists(db_url).await.unwrap_or(false) {
            sqlx::Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const ITEM_COLUMNS: &str = "i.id, i.kind, i.name, i.sort_name, i.parent_id, i.owner_id, \
     i.external_ref, i.provider_ids, i.homepage, i.genres, i.primary_image, i.thumb_image, \
     i.year, i.runtime_ms, i.disc_number, i.track_number, i.artist_names, i.linked_children";

/// Raw item row; JSON columns and uuids are decoded in `into_item`.
#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: String,
    kind: String,
    name: String,
    sort_name: String,
    parent_id: Option<String>,
    owner_id: Option<String>,
    external_ref: Option<String>,
    provider_ids: String,
    homepage: Option<String>,
    genres: String,
    primary_image: Option<String>,
    thumb_image: Option<String>,
    year: Option<i64>,
    runtime_ms: Option<i64>,
    disc_number: Option<i64>,
    track_number: Option<i64>,
    artist_names: String,
    linked_children: String,
}

impl ItemRow {
    fn into_item(self) -> Result<CatalogItem, StoreError> {
        let id = parse_uuid(&self.id, "items.id")?;
        let kind = ItemKind::from_str_opt(&self.kind)
            .ok_or_else(|| StoreError::corrupt("items.kind", self.kind.clone()))?;

        let provider_ids: BTreeMap<String, String> = serde_json::from_str(&self.provider_ids)
            .map_err(|e| StoreError::corrupt("items.provider_ids", e.to_string()))?;
        let genres: Vec<String> = serde_json::from_str(&self.genres)
            .map_err(|e| StoreError::corrupt("items.genres", e.to_string()))?;
        let artist_names: Vec<String> = serde_json::from_str(&self.artist_names)
            .map_err(|e| StoreError::corrupt("items.artist_names", e.to_string()))?;
        let linked_children: Vec<LinkedChild> = serde_json::from_str(&self.linked_children)
            .map_err(|e| StoreError::corrupt("items.linked_children", e.to_string()))?;

        Ok(CatalogItem {
            id,
            kind,
            name: self.name,
            sort_name: self.sort_name,
            parent_id: self.parent_id.as_deref().map(|s| parse_uuid(s, "items.parent_id")).transpose()?,
            owner_id: self.owner_id.as_deref().map(|s| parse_uuid(s, "items.owner_id")).transpose()?,
            external_ref: self.external_ref,
            provider_ids,
            homepage: self.homepage,
            genres,
            primary_image: self.primary_image,
            thumb_image: self.thumb_image,
            year: self.year.map(|y| y as i32),
            runtime_ms: self.runtime_ms.map(|r| r as u64),
            disc_number: self.disc_number.map(|d| d as u32),
            track_number: self.track_number.map(|t| t as u32),
            artist_names,
            linked_children,
        })
    }
}

fn parse_uuid(s: &str, context: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::corrupt(context, e.to_string()))
}

/// Escape `%` and `_` for a LIKE pattern.
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(", ")
}

/// Build the WHERE clause and its bind values for a catalog query.
/// All binds are TEXT.
fn build_filters(query: &ItemQuery) -> (String, Vec<String>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    if let Some(kind) = query.kind {
        clauses.push("i.kind = ?".to_string());
        binds.push(kind.as_str().to_string());
    }

    if let Some(parent) = query.parent_id {
        clauses.push("i.parent_id = ?".to_string());
        binds.push(parent.to_string());
    }

    if !query.artist_ids.is_empty() {
        // An artist scopes both its albums (children) and its tracks
        // (grandchildren through an album).
        let ph = placeholders(query.artist_ids.len());
        clauses.push(format!(
            "(i.parent_id IN ({ph}) OR i.parent_id IN (SELECT id FROM items WHERE parent_id IN ({ph})))"
        ));
        let ids: Vec<String> = query.artist_ids.iter().map(Uuid::to_string).collect();
        binds.extend(ids.iter().cloned());
        binds.extend(ids);
    }

    if !query.album_ids.is_empty() {
        let ph = placeholders(query.album_ids.len());
        clauses.push(format!("i.parent_id IN ({ph})"));
        binds.extend(query.album_ids.iter().map(Uuid::to_string));
    }

    if let Some(term) = &query.search_term {
        clauses.push("i.name LIKE ? ESCAPE '\\'".to_string());
        binds.push(format!("%{}%", escape_like(term)));
    }

    if query.favorites_only {
        clauses.push("i.id IN (SELECT item_id FROM favorites WHERE user_id = ?)".to_string());
        // Favorites without a user match nothing.
        binds.push(
            query
                .user_id
                .map(|u| u.to_string())
                .unwrap_or_default(),
        );
    }

    (clauses.join(" AND "), binds)
}

#[async_trait]
impl CatalogStore for Database {
    async fn upsert_item(&self, item: &CatalogItem) -> Result<(), StoreError> {
        let provider_ids = serde_json::to_string(&item.provider_ids)
            .map_err(|e| StoreError::corrupt("items.provider_ids", e.to_string()))?;
        let genres = serde_json::to_string(&item.genres)
            .map_err(|e| StoreError::corrupt("items.genres", e.to_string()))?;
        let artist_names = serde_json::to_string(&item.artist_names)
            .map_err(|e| StoreError::corrupt("items.artist_names", e.to_string()))?;
        let linked_children = serde_json::to_string(&item.linked_children)
            .map_err(|e| StoreError::corrupt("items.linked_children", e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO items (
                id, kind, name, sort_name, parent_id, owner_id, external_ref,
                provider_ids, homepage, genres, primary_image, thumb_image,
                year, runtime_ms, disc_number, track_number, artist_names,
                linked_children, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                name = excluded.name,
                sort_name = excluded.sort_name,
                parent_id = excluded.parent_id,
                owner_id = excluded.owner_id,
                external_ref = excluded.external_ref,
                provider_ids = excluded.provider_ids,
                homepage = excluded.homepage,
                genres = excluded.genres,
                primary_image = excluded.primary_image,
                thumb_image = excluded.thumb_image,
                year = excluded.year,
                runtime_ms = excluded.runtime_ms,
                disc_number = excluded.disc_number,
                track_number = excluded.track_number,
                artist_names = excluded.artist_names,
                linked_children = excluded.linked_children,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.kind.as_str())
        .bind(&item.name)
        .bind(&item.sort_name)
        .bind(item.parent_id.map(|p| p.to_string()))
        .bind(item.owner_id.map(|o| o.to_string()))
        .bind(&item.external_ref)
        .bind(provider_ids)
        .bind(&item.homepage)
        .bind(genres)
        .bind(&item.primary_image)
        .bind(&item.thumb_image)
        .bind(item.year.map(|y| y as i64))
        .bind(item.runtime_ms.map(|r| r as i64))
        .bind(item.disc_number.map(|d| d as i64))
        .bind(item.track_number.map(|t| t as i64))
        .bind(artist_names)
        .bind(linked_children)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_items(&self, items: &[CatalogItem]) -> Result<(), StoreError> {
        for item in items {
            self.upsert_item(item).await?;
        }
        Ok(())
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<CatalogItem>, StoreError> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items i WHERE i.id = ?");
        let row: Option<ItemRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(ItemRow::into_item).transpose()
    }

    async fn query(&self, query: &ItemQuery) -> Result<QueryResult, StoreError> {
        let (where_sql, binds) = build_filters(query);
        let where_clause = if where_sql.is_empty() {
            String::new()
        } else {
            format!(" WHERE {where_sql}")
        };

        let count_sql = format!("SELECT COUNT(*) FROM items i{where_clause}");
        let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
        for bind in &binds {
            count_query = count_query.bind(bind.as_str());
        }
        let total = count_query.fetch_one(&self.pool).await?;

        // LIMIT -1 means unlimited in SQLite.
        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);
        let select_sql = format!(
            "SELECT {ITEM_COLUMNS} FROM items i{where_clause} ORDER BY i.sort_name, i.id LIMIT ? OFFSET ?"
        );
        let mut select_query = sqlx::query_as::<_, ItemRow>(&select_sql);
        for bind in &binds {
            select_query = select_query.bind(bind.as_str());
        }
        let rows = select_query
            .bind(limit)
            .bind(query.offset as i64)
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .into_iter()
            .map(ItemRow::into_item)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(QueryResult {
            items,
            total: total as u64,
            duplicates: 0,
        })
    }

    async fn set_favorite(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        favorite: bool,
    ) -> Result<(), StoreError> {
        if favorite {
            sqlx::query(
                "INSERT INTO favorites (user_id, item_id) VALUES (?, ?) \
                 ON CONFLICT(user_id, item_id) DO NOTHING",
            )
            .bind(user_id.to_string())
            .bind(item_id.to_string())
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query("DELETE FROM favorites WHERE user_id = ? AND item_id = ?")
                .bind(user_id.to_string())
                .bind(item_id.to_string())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }
}
