//! Per-user token lifecycle.
//!
//! Each user has an in-memory token slot holding up to two credentials: the
//! interactive ("web") token obtained through the login flow, and a
//! client-credentials token exchanged from the user's stored application
//! credential. Selection always prefers the web token - it carries broader
//! privileges (favorites, profile) - and falls back to exchanging the app
//! credential synchronously when neither is present.
//!
//! Slots are populated lazily from the user record on first use and
//! invalidated to empty on an authentication failure, so the next call
//! re-acquires. Two concurrent queries may race into one extra exchange;
//! that is harmless and accepted.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use uuid::Uuid;

use super::dto;
use crate::store::{User, UserStore};

/// Which credential mode a token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMode {
    /// Interactive token from the authorization-code flow.
    Web,
    /// Application token from the client-credentials flow.
    Client,
}

/// A bearer token plus the mode it was issued under, so an auth failure can
/// invalidate the right slot entry.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub value: String,
    pub mode: TokenMode,
}

#[derive(Debug, Clone, Default)]
struct TokenSlot {
    web: Option<String>,
    client: Option<String>,
    /// Whether the stored user record has been consulted yet. Guards
    /// against re-adopting an invalidated web token from the record.
    loaded: bool,
}

/// Process-wide token state for all users.
pub struct TokenManager {
    http: reqwest::Client,
    accounts_url: String,
    users: Arc<dyn UserStore>,
    slots: RwLock<HashMap<Uuid, TokenSlot>>,
}

impl TokenManager {
    pub fn new(users: Arc<dyn UserStore>, accounts_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            accounts_url: accounts_url.into(),
            users,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Pick the token to use for a remote call, acquiring one if needed.
    ///
    /// Order: web token, then client-credentials token, then a synchronous
    /// client-credentials exchange. `None` means the user has no usable
    /// credential and the caller should degrade to local-only behavior.
    pub async fn select_token(&self, user_id: Uuid) -> Option<AccessToken> {
        if let Some(token) = self.from_slot(user_id) {
            return Some(token);
        }

        let user = match self.users.get_user(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::debug!(%user_id, "token requested for unknown user");
                return None;
            }
            Err(e) => {
                tracing::warn!(%user_id, "failed to load user record: {e}");
                return None;
            }
        };

        {
            let mut slots = self.slots.write();
            let slot = slots.entry(user_id).or_default();
            if !slot.loaded {
                slot.loaded = true;
                if slot.web.is_none() {
                    slot.web = user.web_token.clone();
                }
            }
        }
        if let Some(token) = self.from_slot(user_id) {
            return Some(token);
        }

        let value = self.client_credentials_login(&user).await?;
        self.slots.write().entry(user_id).or_default().client = Some(value.clone());
        Some(AccessToken {
            value,
            mode: TokenMode::Client,
        })
    }

    /// Exchange the user's application credential for a short-lived token.
    /// Returns `None` on a missing credential or any non-success response.
    pub async fn client_credentials_login(&self, user: &User) -> Option<String> {
        let (client_id, client_secret) = match (&user.client_id, &user.client_secret) {
            (Some(id), Some(secret)) => (id, secret),
            _ => {
                tracing::debug!(user = %user.id, "no application credential on file");
                return None;
            }
        };

        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_url))
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(user = %user.id, "token exchange failed: {e}");
                return None;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(
                user = %user.id,
                status = %response.status(),
                "token exchange rejected"
            );
            return None;
        }

        let token = match response.json::<dto::TokenResponse>().await {
            Ok(t) => t.access_token,
            Err(e) => {
                tracing::warn!(user = %user.id, "malformed token response: {e}");
                return None;
            }
        };

        // Keep the user record in step; the slot remains the working copy.
        let mut updated = user.clone();
        updated.client_token = Some(token.clone());
        if let Err(e) = self.users.update_user(&updated).await {
            tracing::warn!(user = %user.id, "failed to persist client token: {e}");
        }

        Some(token)
    }

    /// Drop a failed credential so the next call re-acquires.
    pub fn invalidate(&self, user_id: Uuid, mode: TokenMode) {
        let mut slots = self.slots.write();
        if let Some(slot) = slots.get_mut(&user_id) {
            match mode {
                TokenMode::Web => slot.web = None,
                TokenMode::Client => slot.client = None,
            }
        }
    }

    /// Install a freshly acquired interactive token (login flow).
    pub fn adopt_web_token(&self, user_id: Uuid, token: impl Into<String>) {
        let mut slots = self.slots.write();
        let slot = slots.entry(user_id).or_default();
        slot.loaded = true;
        slot.web = Some(token.into());
    }

    /// The user's market/region code, part of the token record.
    pub async fn region(&self, user_id: Uuid) -> Option<String> {
        self.users
            .get_user(user_id)
            .await
            .ok()
            .flatten()
            .and_then(|u| u.region)
    }

    fn from_slot(&self, user_id: Uuid) -> Option<AccessToken> {
        let slots = self.slots.read();
        let slot = slots.get(&user_id)?;
        if let Some(web) = &slot.web {
            return Some(AccessToken {
                value: web.clone(),
                mode: TokenMode::Web,
            });
        }
        slot.client.as_ref().map(|client| AccessToken {
            value: client.clone(),
            mode: TokenMode::Client,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::UserStore;
    use crate::test_utils::{temp_db, StubRoute, StubServer};

    const TOKEN_JSON: &str = r#"{"access_token": "client-tok", "token_type": "Bearer"}"#;

    async fn setup(
        routes: Vec<StubRoute>,
    ) -> (Arc<crate::db::Database>, StubServer, TokenManager, tempfile::TempDir) {
        let (db, dir) = temp_db().await;
        let db = Arc::new(db);
        let stub = StubServer::start(routes).await;
        let manager = TokenManager::new(db.clone(), stub.url.clone());
        (db, stub, manager, dir)
    }

    #[tokio::test]
    async fn test_prefers_web_token_over_client() {
        let (db, stub, manager, _dir) = setup(vec![]).await;

        let mut user = db.create_user("alice").await.unwrap();
        user.web_token = Some("web-tok".to_string());
        db.update_user(&user).await.unwrap();
        manager.adopt_web_token(user.id, "web-tok");

        let token = manager.select_token(user.id).await.expect("token");
        assert_eq!(token.mode, TokenMode::Web);
        assert_eq!(token.value, "web-tok");
        assert!(stub.hits().is_empty());
    }

    #[tokio::test]
    async fn test_stored_web_token_loaded_lazily() {
        let (db, stub, manager, _dir) = setup(vec![]).await;

        let mut user = db.create_user("alice").await.unwrap();
        user.web_token = Some("stored-web".to_string());
        db.update_user(&user).await.unwrap();

        let token = manager.select_token(user.id).await.expect("token");
        assert_eq!(token.mode, TokenMode::Web);
        assert_eq!(token.value, "stored-web");
        assert!(stub.hits().is_empty());
    }

    #[tokio::test]
    async fn test_exchange_invoked_exactly_once() {
        let (db, stub, manager, _dir) =
            setup(vec![StubRoute::new("/api/token", 200, TOKEN_JSON)]).await;

        let mut user = db.create_user("alice").await.unwrap();
        user.client_id = Some("app-id".to_string());
        user.client_secret = Some("app-secret".to_string());
        db.update_user(&user).await.unwrap();

        let first = manager.select_token(user.id).await.expect("token");
        assert_eq!(first.mode, TokenMode::Client);
        assert_eq!(first.value, "client-tok");

        let second = manager.select_token(user.id).await.expect("token");
        assert_eq!(second.value, "client-tok");

        // The second call must come from the slot, not a fresh exchange.
        assert_eq!(stub.hits().len(), 1);
        assert_eq!(stub.hits()[0], "POST /api/token");

        // The acquired token is written back to the user record.
        let stored = db.get_user(user.id).await.unwrap().unwrap();
        assert_eq!(stored.client_token.as_deref(), Some("client-tok"));
    }

    #[tokio::test]
    async fn test_invalidate_forces_reacquire() {
        let (db, stub, manager, _dir) =
            setup(vec![StubRoute::new("/api/token", 200, TOKEN_JSON)]).await;

        let mut user = db.create_user("alice").await.unwrap();
        user.client_id = Some("app-id".to_string());
        user.client_secret = Some("app-secret".to_string());
        db.update_user(&user).await.unwrap();

        manager.select_token(user.id).await.expect("token");
        manager.invalidate(user.id, TokenMode::Client);
        manager.select_token(user.id).await.expect("token");

        assert_eq!(stub.hits().len(), 2);
    }

    #[tokio::test]
    async fn test_no_credential_yields_none() {
        let (db, stub, manager, _dir) = setup(vec![]).await;
        let user = db.create_user("alice").await.unwrap();

        assert!(manager.select_token(user.id).await.is_none());
        assert!(manager.select_token(Uuid::new_v4()).await.is_none());
        assert!(stub.hits().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_exchange_yields_none() {
        let (db, stub, manager, _dir) = setup(vec![StubRoute::new(
            "/api/token",
            400,
            r#"{"error": "invalid_client"}"#,
        )])
        .await;

        let mut user = db.create_user("alice").await.unwrap();
        user.client_id = Some("bad-id".to_string());
        user.client_secret = Some("bad-secret".to_string());
        db.update_user(&user).await.unwrap();

        assert!(manager.select_token(user.id).await.is_none());
        assert_eq!(stub.hits().len(), 1);
    }
}
