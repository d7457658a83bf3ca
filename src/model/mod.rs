//! Core data models for the federated catalog.
//!
//! Defines the primary entity, [`CatalogItem`], which represents artists,
//! albums, tracks, and folders uniformly. Items sourced from the remote
//! service carry an external reference string; local items don't.
//!
//! # Identity
//!
//! Every item has a 128-bit id. For remote-origin items the id is derived
//! from the remote id (see `spotify::ident`), which is deterministic but not
//! always invertible - the external reference is the lossless record of where
//! an item came from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of a catalog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Artist,
    Album,
    Track,
    /// Root container for browsing; never produced by federation.
    Folder,
}

impl ItemKind {
    /// Stable string form used in the database and in queries.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Artist => "artist",
            ItemKind::Album => "album",
            ItemKind::Track => "track",
            ItemKind::Folder => "folder",
        }
    }

    /// Parse the stable string form.
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "artist" => Some(ItemKind::Artist),
            "album" => Some(ItemKind::Album),
            "track" => Some(ItemKind::Track),
            "folder" => Some(ItemKind::Folder),
            _ => None,
        }
    }
}

/// A known member track of an album, recorded so that a browse of the album
/// can skip a remote re-fetch. The pair keeps both the local id and the
/// remote reference because the local id alone is lossy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedChild {
    pub item_id: Uuid,
    pub external_ref: String,
}

/// A single entry in the music catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    /// 128-bit identifier (primary key).
    pub id: Uuid,
    pub kind: ItemKind,
    /// Display name.
    pub name: String,
    /// Sort name. For tracks this embeds a zero-padded disc/track prefix so
    /// lexicographic order matches playback order.
    pub sort_name: String,
    /// Containing item (album for tracks, artist for albums).
    pub parent_id: Option<Uuid>,
    /// User that caused this item to exist (favorites, browsing).
    pub owner_id: Option<Uuid>,
    /// Remote-native reference, e.g. `spotify:track:6jPPWvp74YGsboZjvxfvVe`.
    /// Always present and origin-prefixed for remote items.
    pub external_ref: Option<String>,
    /// Provider name -> provider-native id.
    pub provider_ids: BTreeMap<String, String>,
    /// Home page URL for the entity, if the provider exposes one.
    pub homepage: Option<String>,
    pub genres: Vec<String>,
    /// URL of the primary (largest) artwork image.
    pub primary_image: Option<String>,
    /// URL of the thumbnail (smallest) artwork image.
    pub thumb_image: Option<String>,
    /// Production year.
    pub year: Option<i32>,
    /// Run length in milliseconds.
    pub runtime_ms: Option<u64>,
    pub disc_number: Option<u32>,
    pub track_number: Option<u32>,
    /// Display names of the credited artists (tracks and albums).
    pub artist_names: Vec<String>,
    /// Known member tracks (albums only). Replaced wholesale when the
    /// album's tracks are re-fetched.
    pub linked_children: Vec<LinkedChild>,
}

impl CatalogItem {
    /// Create an item with the given id, kind, and name. Sort name defaults
    /// to the display name; everything else starts empty.
    pub fn new(id: Uuid, kind: ItemKind, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            kind,
            sort_name: name.clone(),
            name,
            parent_id: None,
            owner_id: None,
            external_ref: None,
            provider_ids: BTreeMap::new(),
            homepage: None,
            genres: Vec::new(),
            primary_image: None,
            thumb_image: None,
            year: None,
            runtime_ms: None,
            disc_number: None,
            track_number: None,
            artist_names: Vec::new(),
            linked_children: Vec::new(),
        }
    }

    /// Whether this item's external reference carries the given origin
    /// marker (e.g. `"spotify"`). This is the only reliable remote test;
    /// the derived id is not always invertible.
    pub fn has_origin(&self, marker: &str) -> bool {
        self.external_ref
            .as_deref()
            .map(|r| {
                r.strip_prefix(marker)
                    .map(|rest| rest.starts_with(':'))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// The remote-native id embedded in the external reference, if any.
    pub fn remote_id(&self) -> Option<&str> {
        self.external_ref.as_deref().and_then(|r| r.rsplit(':').next())
    }
}

/// Build the sort name for a track: a zero-padded `disc-track` prefix
/// followed by the display name, so lexicographic order is playback order.
pub fn track_sort_name(disc: Option<u32>, track: Option<u32>, name: &str) -> String {
    format!(
        "{:04}-{:04} - {}",
        disc.unwrap_or(1),
        track.unwrap_or(0),
        name
    )
}
