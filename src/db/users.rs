//! User record persistence.
//!
//! Users carry the remote-service application credential and token fields
//! consumed by the token lifecycle manager. Tokens are stored here and
//! nowhere else; in-memory token slots are rebuilt from these rows.

use async_trait::async_trait;
use uuid::Uuid;

use super::Database;
use crate::store::{StoreError, User, UserStore};

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    name: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    client_token: Option<String>,
    web_token: Option<String>,
    refresh_token: Option<String>,
    region: Option<String>,
}

impl UserRow {
    fn into_user(self) -> Result<User, StoreError> {
        Ok(User {
            id: Uuid::parse_str(&self.id)
                .map_err(|e| StoreError::corrupt("users.id", e.to_string()))?,
            name: self.name,
            client_id: self.client_id,
            client_secret: self.client_secret,
            client_token: self.client_token,
            web_token: self.web_token,
            refresh_token: self.refresh_token,
            region: self.region,
        })
    }
}

const USER_COLUMNS: &str =
    "id, name, client_id, client_secret, client_token, web_token, refresh_token, region";

#[async_trait]
impl UserStore for Database {
    async fn create_user(&self, name: &str) -> Result<User, StoreError> {
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            ..Default::default()
        };

        sqlx::query("INSERT INTO users (id, name) VALUES (?, ?)")
            .bind(user.id.to_string())
            .bind(&user.name)
            .execute(self.pool())
            .await?;

        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE name = ?");
        let row: Option<UserRow> = sqlx::query_as(&sql)
            .bind(name)
            .fetch_optional(self.pool())
            .await?;

        row.map(UserRow::into_user).transpose()
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users SET
                name = ?,
                client_id = ?,
                client_secret = ?,
                client_token = ?,
                web_token = ?,
                refresh_token = ?,
                region = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.name)
        .bind(&user.client_id)
        .bind(&user.client_secret)
        .bind(&user.client_token)
        .bind(&user.web_token)
        .bind(&user.refresh_token)
        .bind(&user.region)
        .bind(user.id.to_string())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY name");
        let rows: Vec<UserRow> = sqlx::query_as(&sql).fetch_all(self.pool()).await?;
        rows.into_iter().map(UserRow::into_user).collect()
    }
}
