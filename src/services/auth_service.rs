use sqlx::PgPool;

use crate::config::get_config;
use crate::error::{Error, Result};
use crate::models::user::{Role, User};
use crate::utils::crypto::{hash_password, verify_password};
use crate::utils::token::issue_token;

const USER_COLUMNS: &str = "id, username, password_hash, role, is_active, created_at";

#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
}

impl AuthService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Returns the signed token and the authenticated user.
    pub async fn login(&self, username: &str, password: &str) -> Result<(String, User)> {
        let user = self
            .find_by_username(username)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| Error::Unauthorized("Invalid username or password".to_string()))?;
        if !verify_password(password, &user.password_hash) {
            tracing::info!(username = %user.username, "login refused");
            return Err(Error::Unauthorized("Invalid username or password".to_string()));
        }
        let role = user
            .role()
            .ok_or_else(|| Error::Internal(format!("User {} has unknown role", user.id)))?;
        let config = get_config();
        let token = issue_token(user.id, role, &config.jwt_secret, config.token_ttl_hours)?;
        tracing::info!(user_id = user.id, role = %role, "login");
        Ok((token, user))
    }

    pub async fn create_user<'e, E>(executor: E, username: &str, password: &str, role: Role) -> Result<User>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let username = username.trim();
        if username.is_empty() || password.len() < 6 {
            return Err(Error::BadRequest(
                "Username is required and password must be at least 6 characters".to_string(),
            ));
        }
        let hash = hash_password(password)?;
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, password_hash, role) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(username)
        .bind(hash)
        .bind(role.as_str())
        .fetch_one(executor)
        .await?;
        Ok(user)
    }

    pub async fn create_admin(&self, username: &str, password: &str, role: Role) -> Result<User> {
        if !role.is_admin() {
            return Err(Error::BadRequest("Admin role must be OIC_ADMIN or PO_ADMIN".to_string()));
        }
        let user = Self::create_user(&self.pool, username, password, role).await?;
        tracing::info!(user_id = user.id, role = %role, "admin account created");
        Ok(user)
    }
}
