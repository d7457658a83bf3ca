//! Spotify federation: identifier bridge, token lifecycle, remote query
//! executor, and catalog materializer.
//!
//! The submodules layer the same way the enrichment side of a catalog app
//! does: `dto` mirrors the wire format, `client` owns transport and outcome
//! classification, `materialize` converts wire objects into catalog items,
//! and `auth`/`login` manage per-user credentials. `traits` is the seam the
//! federation engine consumes, so tests can substitute mocks.

pub mod auth;
pub mod client;
pub mod dto;
pub mod ident;
pub mod login;
pub mod materialize;
pub mod traits;

pub use auth::{AccessToken, TokenManager, TokenMode};
pub use client::SpotifyClient;
pub use ident::{derive_item_id, IdentError};
pub use login::{LoginManager, LoginStart};
pub use materialize::Materializer;
pub use traits::SpotifyApi;

/// Origin marker prefixed onto every remote item's external reference.
pub const ORIGIN_MARKER: &str = "spotify";

/// Default accounts (token/authorize) endpoint.
pub const DEFAULT_ACCOUNTS_URL: &str = "https://accounts.spotify.com";

/// Default Web API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";

/// Build the external reference for a remote entity, e.g.
/// `spotify:track:6jPPWvp74YGsboZjvxfvVe`. The reference preserves the
/// remote id losslessly even where the derived 128-bit id can't.
pub fn external_ref(kind: &str, remote_id: &str) -> String {
    format!("{ORIGIN_MARKER}:{kind}:{remote_id}")
}
