//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `account`: user management, credential registration, login flow
//! - `catalog`: federated search, browse, and favorites queries

mod account;
mod catalog;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;

use crate::cache::ItemCache;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::federation::FederatedCatalog;
use crate::spotify::{LoginManager, SpotifyClient, TokenManager};
use crate::store::{User, UserStore};

pub use account::{
    cmd_link, cmd_login, cmd_login_complete, cmd_refresh, cmd_user_add, cmd_user_list,
};
pub use catalog::{cmd_browse, cmd_favorites, cmd_search};

/// Music Bridge CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database path (overrides the configured one)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Create a user
    UserAdd {
        /// User name (unique)
        name: String,
    },
    /// List users
    UserList,
    /// Register an application credential for a user
    Link {
        /// User name
        user: String,
        /// Application client id
        #[arg(long, env = "MUSIC_BRIDGE_CLIENT_ID")]
        client_id: String,
        /// Application client secret
        #[arg(long, env = "MUSIC_BRIDGE_CLIENT_SECRET")]
        client_secret: String,
    },
    /// Start an interactive login (prints the authorization URL)
    Login {
        /// User name
        user: String,
    },
    /// Complete an interactive login callback
    LoginComplete {
        /// State parameter from the callback
        #[arg(long)]
        state: String,
        /// Authorization code from the callback
        #[arg(long)]
        code: String,
    },
    /// Refresh a user's interactive token
    Refresh {
        /// User name
        user: String,
    },
    /// Search the federated catalog
    Search {
        /// Search term
        term: String,
        /// Item kind: artist, album, or track
        #[arg(short, long, default_value = "artist")]
        kind: String,
        /// User to query as (enables remote results)
        #[arg(short, long)]
        user: Option<String>,
        /// Maximum results
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// List the children of an item (e.g. an album's tracks)
    Browse {
        /// Item id
        item_id: String,
        /// User to query as
        #[arg(short, long)]
        user: Option<String>,
    },
    /// List a user's favorite tracks
    Favorites {
        /// User name
        user: String,
        /// Maximum results
        #[arg(short, long, default_value = "100")]
        limit: u32,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> Result<()> {
    let rt = Runtime::new()?;
    let db = cli.db.as_ref();

    match &cli.command {
        Commands::UserAdd { name } => cmd_user_add(&rt, db, name),
        Commands::UserList => cmd_user_list(&rt, db),
        Commands::Link {
            user,
            client_id,
            client_secret,
        } => cmd_link(&rt, db, user, client_id, client_secret),
        Commands::Login { user } => cmd_login(&rt, db, user),
        Commands::LoginComplete { state, code } => cmd_login_complete(&rt, db, state, code),
        Commands::Refresh { user } => cmd_refresh(&rt, db, user),
        Commands::Search {
            term,
            kind,
            user,
            limit,
        } => cmd_search(&rt, db, term, kind, user.as_deref(), *limit),
        Commands::Browse { item_id, user } => cmd_browse(&rt, db, item_id, user.as_deref()),
        Commands::Favorites { user, limit } => cmd_favorites(&rt, db, user, *limit),
    }
}

// ============================================================================
// Shared helper functions
// ============================================================================

/// Everything a command needs: the store, the federated engine, and the
/// login surface, wired from the loaded config.
pub(crate) struct AppContext {
    pub db: Arc<Database>,
    pub engine: FederatedCatalog,
    pub login: LoginManager,
}

/// Build the application context from config plus an optional database
/// override.
pub(crate) async fn open_context(db_override: Option<&PathBuf>) -> Result<AppContext> {
    let config = crate::config::load();

    let path = db_override.cloned().or_else(|| config.database.path.clone());
    let url = crate::db::db_url(path.as_deref());
    let db = Arc::new(Database::connect(&url).await?);

    let cache = Arc::new(ItemCache::new(Duration::from_secs(
        config.cache.entity_ttl_secs,
    )));
    let tokens = Arc::new(TokenManager::new(
        db.clone(),
        config.remote.accounts_url.clone(),
    ));
    let client = Arc::new(SpotifyClient::new(
        tokens.clone(),
        config.remote.api_url.clone(),
    ));
    let engine = FederatedCatalog::new(db.clone(), client, cache);
    let login = LoginManager::new(
        db.clone(),
        tokens,
        config.remote.accounts_url,
        config.remote.api_url,
        config.remote.redirect_uri,
    );

    Ok(AppContext { db, engine, login })
}

/// Look up a user by name or fail with a readable error.
pub(crate) async fn resolve_user(db: &Database, name: &str) -> Result<User> {
    db.get_user_by_name(name)
        .await?
        .ok_or_else(|| Error::not_found(format!("user {name}")))
}
