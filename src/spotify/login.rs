//! Interactive login surface.
//!
//! Everything here sits outside the query path: registering an application
//! credential (validated by a probe token exchange before storage), handing
//! out the authorization redirect URL with a server-side CSRF state cache,
//! exchanging the callback code for tokens, and refreshing the interactive
//! token with a redirect fallback when the refresh token is rejected.
//!
//! Unlike the executor, this surface reports failures explicitly - a user
//! staring at a login page needs to know why it failed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::distr::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

use super::auth::TokenManager;
use super::dto;
use crate::store::{StoreError, UserStore};

/// How long an issued login state stays valid.
const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Scopes requested for the interactive token.
const AUTH_SCOPES: &str = "user-library-read user-read-private";

/// Errors from the login surface.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("user {0} not found")]
    UnknownUser(Uuid),

    #[error("no application credential on file")]
    MissingCredential,

    #[error("application credential rejected by the remote service")]
    CredentialRejected,

    #[error("login state is unknown or expired")]
    StateMismatch,

    #[error("token exchange failed with status {0}")]
    Exchange(reqwest::StatusCode),

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of starting (or refreshing) an interactive login.
#[derive(Debug, Clone)]
pub enum LoginStart {
    /// A usable interactive token already exists.
    Authorized(String),
    /// The user must visit this authorization URL.
    Redirect(String),
}

struct PendingLogin {
    user_id: Uuid,
    created: Instant,
}

/// Orchestrates the authorization-code flow for all users.
pub struct LoginManager {
    http: reqwest::Client,
    accounts_url: String,
    api_url: String,
    redirect_uri: String,
    users: Arc<dyn UserStore>,
    tokens: Arc<TokenManager>,
    pending: Mutex<HashMap<String, PendingLogin>>,
}

impl LoginManager {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: Arc<TokenManager>,
        accounts_url: impl Into<String>,
        api_url: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            accounts_url: accounts_url.into(),
            api_url: api_url.into(),
            redirect_uri: redirect_uri.into(),
            users,
            tokens,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Validate and store an application credential for a user.
    ///
    /// The credential is probed with a client-credentials exchange before
    /// anything is written; a rejected credential is never persisted.
    pub async fn register_credential(
        &self,
        user_id: Uuid,
        client_id: &str,
        client_secret: &str,
    ) -> Result<(), AuthError> {
        let mut user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UnknownUser(user_id))?;

        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_url))
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::CredentialRejected);
        }
        let probe = response.json::<dto::TokenResponse>().await?;

        user.client_id = Some(client_id.to_string());
        user.client_secret = Some(client_secret.to_string());
        user.client_token = Some(probe.access_token);
        self.users.update_user(&user).await?;
        Ok(())
    }

    /// Start an interactive login: return the cached interactive token if
    /// one exists, otherwise an authorization redirect URL with a cached
    /// CSRF state.
    pub async fn begin(&self, user_id: Uuid) -> Result<LoginStart, AuthError> {
        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UnknownUser(user_id))?;

        if let Some(token) = user.web_token {
            return Ok(LoginStart::Authorized(token));
        }

        let client_id = user.client_id.ok_or(AuthError::MissingCredential)?;

        let state: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        {
            let mut pending = self.pending.lock();
            pending.retain(|_, p| p.created.elapsed() < STATE_TTL);
            pending.insert(
                state.clone(),
                PendingLogin {
                    user_id,
                    created: Instant::now(),
                },
            );
        }

        let url = format!(
            "{}/authorize?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}",
            self.accounts_url,
            urlencoding::encode(&client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(AUTH_SCOPES),
            state,
        );
        Ok(LoginStart::Redirect(url))
    }

    /// Complete the authorization callback: verify the state, exchange the
    /// code for tokens, and persist them to the user record. Returns the id
    /// of the user the login belongs to.
    pub async fn complete(&self, state: &str, code: &str) -> Result<Uuid, AuthError> {
        let user_id = {
            let mut pending = self.pending.lock();
            pending.retain(|_, p| p.created.elapsed() < STATE_TTL);
            pending
                .remove(state)
                .map(|p| p.user_id)
                .ok_or(AuthError::StateMismatch)?
        };

        let mut user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UnknownUser(user_id))?;
        let client_id = user.client_id.clone().ok_or(AuthError::MissingCredential)?;
        let client_secret = user
            .client_secret
            .clone()
            .ok_or(AuthError::MissingCredential)?;

        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_url))
            .basic_auth(&client_id, Some(&client_secret))
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Exchange(response.status()));
        }
        let tokens = response.json::<dto::TokenResponse>().await?;

        user.web_token = Some(tokens.access_token.clone());
        if tokens.refresh_token.is_some() {
            user.refresh_token = tokens.refresh_token;
        }
        self.users.update_user(&user).await?;
        self.tokens.adopt_web_token(user_id, tokens.access_token.clone());

        // Fire-and-forget: pick up the user's market for region-scoped
        // requests. Must never block or fail the login response.
        self.spawn_region_refresh(user_id, tokens.access_token);

        Ok(user_id)
    }

    /// Refresh the interactive token. A rejected refresh token falls back
    /// to a fresh redirect; transport failures are reported as-is.
    pub async fn refresh(&self, user_id: Uuid) -> Result<LoginStart, AuthError> {
        let mut user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UnknownUser(user_id))?;

        let (client_id, client_secret, refresh_token) = match (
            user.client_id.clone(),
            user.client_secret.clone(),
            user.refresh_token.clone(),
        ) {
            (Some(id), Some(secret), Some(refresh)) => (id, secret, refresh),
            _ => {
                user.web_token = None;
                self.users.update_user(&user).await?;
                return self.begin(user_id).await;
            }
        };

        let response = self
            .http
            .post(format!("{}/api/token", self.accounts_url))
            .basic_auth(&client_id, Some(&client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::info!(
                user = %user_id,
                status = %response.status(),
                "refresh token rejected, falling back to redirect"
            );
            user.web_token = None;
            user.refresh_token = None;
            self.users.update_user(&user).await?;
            return self.begin(user_id).await;
        }

        let tokens = response.json::<dto::TokenResponse>().await?;
        user.web_token = Some(tokens.access_token.clone());
        if tokens.refresh_token.is_some() {
            // The service may rotate the refresh token.
            user.refresh_token = tokens.refresh_token;
        }
        self.users.update_user(&user).await?;
        self.tokens.adopt_web_token(user_id, tokens.access_token.clone());

        Ok(LoginStart::Authorized(tokens.access_token))
    }

    fn spawn_region_refresh(&self, user_id: Uuid, token: String) {
        let http = self.http.clone();
        let api_url = self.api_url.clone();
        let users = self.users.clone();

        tokio::spawn(async move {
            let response = match http
                .get(format!("{api_url}/me"))
                .bearer_auth(&token)
                .send()
                .await
            {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    tracing::debug!(user = %user_id, status = %r.status(), "region lookup failed");
                    return;
                }
                Err(e) => {
                    tracing::debug!(user = %user_id, "region lookup failed: {e}");
                    return;
                }
            };

            let profile = match response.json::<dto::Profile>().await {
                Ok(p) => p,
                Err(e) => {
                    tracing::debug!(user = %user_id, "malformed profile response: {e}");
                    return;
                }
            };

            let Some(country) = profile.country else { return };
            if let Ok(Some(mut user)) = users.get_user(user_id).await {
                user.region = Some(country);
                if let Err(e) = users.update_user(&user).await {
                    tracing::debug!(user = %user_id, "failed to persist region: {e}");
                }
            }
        });
    }
}
