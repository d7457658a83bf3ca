//! User and credential commands.

use std::path::PathBuf;

use tokio::runtime::Runtime;

use super::{open_context, resolve_user};
use crate::error::Result;
use crate::spotify::LoginStart;
use crate::store::UserStore;

/// Create a user.
pub fn cmd_user_add(rt: &Runtime, db: Option<&PathBuf>, name: &str) -> Result<()> {
    rt.block_on(async {
        let ctx = open_context(db).await?;
        let user = ctx.db.create_user(name).await?;
        println!("Created user {} ({})", user.name, user.id);
        Ok(())
    })
}

/// List users and their credential state.
pub fn cmd_user_list(rt: &Runtime, db: Option<&PathBuf>) -> Result<()> {
    rt.block_on(async {
        let ctx = open_context(db).await?;
        let users = ctx.db.list_users().await?;
        if users.is_empty() {
            println!("No users. Create one with `music-bridge user-add <name>`.");
            return Ok(());
        }
        for user in users {
            let credential = if user.has_credential() { "linked" } else { "unlinked" };
            let session = if user.web_token.is_some() {
                ", logged in"
            } else {
                ""
            };
            println!("{}  {}  [{credential}{session}]", user.id, user.name);
        }
        Ok(())
    })
}

/// Register an application credential, validating it first.
pub fn cmd_link(
    rt: &Runtime,
    db: Option<&PathBuf>,
    user: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<()> {
    rt.block_on(async {
        let ctx = open_context(db).await?;
        let user = resolve_user(&ctx.db, user).await?;
        ctx.login
            .register_credential(user.id, client_id, client_secret)
            .await?;
        println!("Credential verified and stored for {}", user.name);
        Ok(())
    })
}

/// Start an interactive login.
pub fn cmd_login(rt: &Runtime, db: Option<&PathBuf>, user: &str) -> Result<()> {
    rt.block_on(async {
        let ctx = open_context(db).await?;
        let user = resolve_user(&ctx.db, user).await?;
        match ctx.login.begin(user.id).await? {
            LoginStart::Authorized(_) => {
                println!("{} is already logged in.", user.name);
            }
            LoginStart::Redirect(url) => {
                println!("Visit the following URL to authorize {}:", user.name);
                println!("  {url}");
                println!("Then run `music-bridge login-complete --state <state> --code <code>`.");
            }
        }
        Ok(())
    })
}

/// Complete an interactive login callback.
pub fn cmd_login_complete(
    rt: &Runtime,
    db: Option<&PathBuf>,
    state: &str,
    code: &str,
) -> Result<()> {
    rt.block_on(async {
        let ctx = open_context(db).await?;
        let user_id = ctx.login.complete(state, code).await?;
        println!("Login complete for user {user_id}");
        Ok(())
    })
}

/// Refresh a user's interactive token.
pub fn cmd_refresh(rt: &Runtime, db: Option<&PathBuf>, user: &str) -> Result<()> {
    rt.block_on(async {
        let ctx = open_context(db).await?;
        let user = resolve_user(&ctx.db, user).await?;
        match ctx.login.refresh(user.id).await? {
            LoginStart::Authorized(_) => {
                println!("Token refreshed for {}.", user.name);
            }
            LoginStart::Redirect(url) => {
                println!("The refresh token was rejected; re-authorize at:");
                println!("  {url}");
            }
        }
        Ok(())
    })
}
