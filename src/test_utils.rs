//! Test utilities and fixtures for music-bridge tests.
//!
//! This module provides common test helpers: a temporary database, catalog
//! item and wire DTO factories, and a minimal stub HTTP endpoint for
//! exercising the token and executor paths against real requests.
//!
//! # Example
//!
//! ```ignore
//! use music_bridge::test_utils::{temp_db, remote_artist};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (db, _dir) = temp_db().await;
//!     let artist = remote_artist("4tZwfgrHOc3mvqYlEYSvVi", "Daft Punk");
//!     // ... test logic
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

use crate::db::Database;
use crate::model::{track_sort_name, CatalogItem, ItemKind};
use crate::spotify::{derive_item_id, dto, external_ref};

/// Creates a temporary database for testing.
///
/// The database lives in a temporary directory that is cleaned up when the
/// returned `TempDir` is dropped. Migrations run automatically; keep the
/// TempDir alive for the duration of your test.
pub async fn temp_db() -> (Database, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_path = dir.path().join("test.db");
    let db_url = format!("sqlite:{}", db_path.display());

    let db = Database::connect(&db_url)
        .await
        .expect("Failed to initialize test database");

    (db, dir)
}

/// A local (non-federated) artist with a random id.
pub fn local_artist(name: &str) -> CatalogItem {
    CatalogItem::new(Uuid::new_v4(), ItemKind::Artist, name)
}

/// A local album, optionally parented to an artist.
pub fn local_album(name: &str, parent_id: Option<Uuid>) -> CatalogItem {
    let mut item = CatalogItem::new(Uuid::new_v4(), ItemKind::Album, name);
    item.parent_id = parent_id;
    item
}

/// A local track with its positional sort key filled in.
pub fn local_track(name: &str, parent_id: Option<Uuid>, disc: u32, number: u32) -> CatalogItem {
    let mut item = CatalogItem::new(Uuid::new_v4(), ItemKind::Track, name);
    item.sort_name = track_sort_name(Some(disc), Some(number), name);
    item.parent_id = parent_id;
    item.disc_number = Some(disc);
    item.track_number = Some(number);
    item
}

/// A catalog item as the materializer would have produced it for the given
/// remote artist id: derived id plus origin-marked external reference.
pub fn remote_artist_item(remote_id: &str, name: &str) -> CatalogItem {
    let id = derive_item_id(remote_id).expect("valid remote id");
    let mut item = CatalogItem::new(id, ItemKind::Artist, name);
    item.external_ref = Some(external_ref("artist", remote_id));
    item.provider_ids
        .insert(crate::spotify::ORIGIN_MARKER.to_string(), remote_id.to_string());
    item
}

/// A wire artist with sensible defaults.
pub fn remote_artist(id: &str, name: &str) -> dto::Artist {
    dto::Artist {
        id: id.to_string(),
        name: name.to_string(),
        genres: Vec::new(),
        images: Vec::new(),
        external_urls: HashMap::from([(
            "spotify".to_string(),
            format!("https://open.spotify.com/artist/{id}"),
        )]),
    }
}

/// A wire album with sensible defaults and no credited artists.
pub fn remote_album(id: &str, name: &str) -> dto::Album {
    dto::Album {
        id: id.to_string(),
        name: name.to_string(),
        album_type: Some("album".to_string()),
        release_date: None,
        total_tracks: None,
        genres: Vec::new(),
        images: Vec::new(),
        artists: Vec::new(),
        external_urls: HashMap::from([(
            "spotify".to_string(),
            format!("https://open.spotify.com/album/{id}"),
        )]),
    }
}

/// A wire track with sensible defaults (disc 1, track 1, 200s).
pub fn remote_track(id: &str, name: &str) -> dto::Track {
    dto::Track {
        id: id.to_string(),
        name: name.to_string(),
        disc_number: Some(1),
        track_number: Some(1),
        duration_ms: Some(200_000),
        artists: Vec::new(),
        album: None,
        external_urls: HashMap::from([(
            "spotify".to_string(),
            format!("https://open.spotify.com/track/{id}"),
        )]),
        kind: Some("track".to_string()),
    }
}

/// A wire image; height mirrors width.
pub fn image(url: &str, width: Option<u32>) -> dto::Image {
    dto::Image {
        url: url.to_string(),
        width,
        height: width,
    }
}

// ============================================================================
// Stub HTTP endpoint
// ============================================================================

/// One canned response. Routes match on a path prefix; `times` bounds how
/// often a route may answer, letting a test serve a 401 first and a 200 on
/// the retry.
pub struct StubRoute {
    path: String,
    status: u16,
    body: String,
    remaining: Option<u32>,
}

impl StubRoute {
    pub fn new(path: &str, status: u16, body: &str) -> Self {
        Self {
            path: path.to_string(),
            status,
            body: body.to_string(),
            remaining: None,
        }
    }

    /// Limit the route to `n` answers; exhausted routes stop matching.
    pub fn times(mut self, n: u32) -> Self {
        self.remaining = Some(n);
        self
    }
}

/// A minimal HTTP/1.1 endpoint serving canned JSON on a random local port.
/// Records every request as `"METHOD target"`.
pub struct StubServer {
    pub url: String,
    hits: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    pub async fn start(routes: Vec<StubRoute>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub endpoint");
        let addr = listener.local_addr().expect("stub endpoint address");
        let hits: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let routes = Arc::new(Mutex::new(routes));

        let accept_hits = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let hits = accept_hits.clone();
                let routes = routes.clone();
                tokio::spawn(async move {
                    let _ = serve_one(socket, hits, routes).await;
                });
            }
        });

        Self {
            url: format!("http://{addr}"),
            hits,
        }
    }

    /// Requests received so far, in order.
    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().clone()
    }
}

async fn serve_one(
    mut socket: TcpStream,
    hits: Arc<Mutex<Vec<String>>>,
    routes: Arc<Mutex<Vec<StubRoute>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > 64 * 1024 {
            return Ok(());
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut parts = head.lines().next().unwrap_or_default().split_whitespace();
    let method = parts.next().unwrap_or("").to_string();
    let target = parts.next().unwrap_or("").to_string();

    // Drain the request body so the client never sees a reset mid-write.
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);
    let mut body_read = buf.len() - header_end;
    while body_read < content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        body_read += n;
    }

    hits.lock().push(format!("{method} {target}"));

    let path = target.split('?').next().unwrap_or("");
    let (status, body) = {
        let mut routes = routes.lock();
        match routes
            .iter_mut()
            .find(|r| path.starts_with(&r.path) && r.remaining.map(|n| n > 0).unwrap_or(true))
        {
            Some(route) => {
                if let Some(n) = route.remaining.as_mut() {
                    *n -= 1;
                }
                (route.status, route.body.clone())
            }
            None => (404, r#"{"error": "no stub route"}"#.to_string()),
        }
    };

    let reply = format!(
        "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        reason(status),
        body.len(),
    );
    socket.write_all(reply.as_bytes()).await?;
    socket.shutdown().await?;
    Ok(())
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|p| p + 4)
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        _ => "Status",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        use crate::store::{CatalogStore, ItemQuery};

        let (db, _dir) = temp_db().await;
        let result = db.query(&ItemQuery::default()).await.unwrap();
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn test_stub_server_serves_routes_and_records_hits() {
        let stub = StubServer::start(vec![
            StubRoute::new("/limited", 200, r#"{"first": true}"#).times(1),
            StubRoute::new("/limited", 500, r#"{"second": true}"#),
        ])
        .await;

        let client = reqwest::Client::new();

        let first = client
            .get(format!("{}/limited?x=1", stub.url))
            .send()
            .await
            .unwrap();
        assert_eq!(first.status().as_u16(), 200);
        assert_eq!(first.text().await.unwrap(), r#"{"first": true}"#);

        // The bounded route is exhausted; the fallback answers now.
        let second = client
            .get(format!("{}/limited", stub.url))
            .send()
            .await
            .unwrap();
        assert_eq!(second.status().as_u16(), 500);

        let missing = client.get(format!("{}/other", stub.url)).send().await.unwrap();
        assert_eq!(missing.status().as_u16(), 404);

        assert_eq!(
            stub.hits(),
            vec![
                "GET /limited?x=1".to_string(),
                "GET /limited".to_string(),
                "GET /other".to_string(),
            ]
        );
    }

    #[test]
    fn test_remote_track_defaults() {
        let track = remote_track("6jPPWvp74YGsboZjvxfvVe", "Harder Better");
        assert!(track.is_audio());
        assert_eq!(track.disc_number, Some(1));
        assert_eq!(track.duration_ms, Some(200_000));
    }

    #[test]
    fn test_remote_artist_item_matches_derived_id() {
        let item = remote_artist_item("4tZwfgrHOc3mvqYlEYSvVi", "Daft Punk");
        assert_eq!(item.id, derive_item_id("4tZwfgrHOc3mvqYlEYSvVi").unwrap());
        assert!(item.has_origin("spotify"));
    }
}
