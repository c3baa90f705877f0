use crate::error::Result;
use crate::models::audit_log::AuditLog;
use serde_json::Value as JsonValue;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AuditService {
    pool: PgPool,
}

impl AuditService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Records an admin action. Failures are logged and swallowed so an audit
    /// write never aborts the action itself.
    pub async fn record(
        &self,
        user_id: Option<i64>,
        action: &str,
        entity_type: &str,
        entity_id: Option<i64>,
        changes: Option<JsonValue>,
    ) {
        if let Err(e) = self.log(user_id, action, entity_type, entity_id, changes).await {
            tracing::warn!(error = %e, action, entity_type, "failed to write audit log");
        }
    }

    pub async fn log(
        &self,
        user_id: Option<i64>,
        action: &str,
        entity_type: &str,
        entity_id: Option<i64>,
        changes: Option<JsonValue>,
    ) -> Result<AuditLog> {
        let row = sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (user_id, action, entity_type, entity_id, changes)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, user_id, action, entity_type, entity_id, changes, created_at
            "#,
        )
        .bind(user_id)
        .bind(action)
        .bind(entity_type)
        .bind(entity_id)
        .bind(changes)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditLog>> {
        let rows = sqlx::query_as::<_, AuditLog>(
            "SELECT id, user_id, action, entity_type, entity_id, changes, created_at FROM audit_logs ORDER BY id DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
