//! Federated catalog query commands.

use std::path::PathBuf;

use tokio::runtime::Runtime;
use uuid::Uuid;

use super::{open_context, resolve_user};
use crate::error::{Error, Result};
use crate::model::{CatalogItem, ItemKind};
use crate::store::{CatalogStore, ItemQuery};

/// Search the federated catalog.
pub fn cmd_search(
    rt: &Runtime,
    db: Option<&PathBuf>,
    term: &str,
    kind: &str,
    user: Option<&str>,
    limit: u32,
) -> Result<()> {
    let kind = ItemKind::from_str_opt(kind)
        .ok_or_else(|| Error::InvalidFormat(format!("unknown item kind: {kind}")))?;

    rt.block_on(async {
        let ctx = open_context(db).await?;
        let user_id = match user {
            Some(name) => Some(resolve_user(&ctx.db, name).await?.id),
            None => None,
        };

        let result = ctx
            .engine
            .query(&ItemQuery {
                kind: Some(kind),
                search_term: Some(term.to_string()),
                user_id,
                limit: Some(limit),
                ..Default::default()
            })
            .await?;

        print_items(&result.items);
        println!(
            "{} of {} results ({} duplicates merged)",
            result.items.len(),
            result.total,
            result.duplicates
        );
        Ok(())
    })
}

/// List the children of an item (e.g. an album's tracks).
pub fn cmd_browse(
    rt: &Runtime,
    db: Option<&PathBuf>,
    item_id: &str,
    user: Option<&str>,
) -> Result<()> {
    let item_id = Uuid::parse_str(item_id)
        .map_err(|e| Error::InvalidFormat(format!("invalid item id: {e}")))?;

    rt.block_on(async {
        let ctx = open_context(db).await?;
        let user_id = match user {
            Some(name) => Some(resolve_user(&ctx.db, name).await?.id),
            None => None,
        };

        let parent = ctx
            .engine
            .get_item(item_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("item {item_id}")))?;
        println!("{}:", parent.name);

        let result = ctx
            .engine
            .query(&ItemQuery {
                parent_id: Some(item_id),
                user_id,
                ..Default::default()
            })
            .await?;

        print_items(&result.items);
        Ok(())
    })
}

/// List a user's favorite tracks, including remote ones.
pub fn cmd_favorites(rt: &Runtime, db: Option<&PathBuf>, user: &str, limit: u32) -> Result<()> {
    rt.block_on(async {
        let ctx = open_context(db).await?;
        let user = resolve_user(&ctx.db, user).await?;

        let result = ctx
            .engine
            .query(&ItemQuery {
                kind: Some(ItemKind::Track),
                favorites_only: true,
                user_id: Some(user.id),
                limit: Some(limit),
                ..Default::default()
            })
            .await?;

        print_items(&result.items);
        println!("{} favorites", result.items.len());
        Ok(())
    })
}

/// Print one line per item.
fn print_items(items: &[CatalogItem]) {
    for item in items {
        let mut line = format!("[{}] {}", item.kind.as_str(), item.name);
        if !item.artist_names.is_empty() {
            line.push_str(&format!(" - {}", item.artist_names.join(", ")));
        }
        if let Some(year) = item.year {
            line.push_str(&format!(" ({year})"));
        }
        if let Some(runtime_ms) = item.runtime_ms {
            let secs = runtime_ms / 1000;
            line.push_str(&format!(" [{}:{:02}]", secs / 60, secs % 60));
        }
        if let Some(external_ref) = &item.external_ref {
            line.push_str(&format!("  <{external_ref}>"));
        }
        println!("  {line}");
    }
}
