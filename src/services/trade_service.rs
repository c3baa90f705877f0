use sqlx::PgPool;
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::models::trade::{normalize_trade_name, Trade};

#[derive(Clone)]
pub struct TradeService {
    pool: PgPool,
}

impl TradeService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Trade>> {
        let trades = sqlx::query_as::<_, Trade>("SELECT id, code, name, created_at FROM trades ORDER BY code")
            .fetch_all(&self.pool)
            .await?;
        Ok(trades)
    }

    pub async fn get(&self, id: i64) -> Result<Trade> {
        sqlx::query_as::<_, Trade>("SELECT id, code, name, created_at FROM trades WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Trade {} not found", id)))
    }

    pub async fn find(&self, id: Option<i64>) -> Result<Option<Trade>> {
        match id {
            Some(id) => Ok(Some(self.get(id).await?)),
            None => Ok(None),
        }
    }

    pub async fn by_code(&self, code: &str) -> Result<Trade> {
        sqlx::query_as::<_, Trade>("SELECT id, code, name, created_at FROM trades WHERE code = $1")
            .bind(code.trim())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Trade '{}' not found", code.trim())))
    }

    pub async fn create(&self, code: &str, name: &str) -> Result<Trade> {
        let code = code.trim();
        let name = name.trim();
        if code.is_empty() || name.is_empty() {
            return Err(Error::BadRequest("Trade code and name are required".to_string()));
        }
        let trade = sqlx::query_as::<_, Trade>(
            "INSERT INTO trades (code, name) VALUES ($1, $2) RETURNING id, code, name, created_at",
        )
        .bind(code)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(trade_id = trade.id, code = %trade.code, "trade created");
        Ok(trade)
    }

    /// Exact code to id, as used by the strict CSV upload.
    pub async fn code_map(&self) -> Result<HashMap<String, i64>> {
        Ok(self.list().await?.into_iter().map(|t| (t.code, t.id)).collect())
    }

    /// Normalised name and code to id, as used by the lenient workbook import.
    pub async fn lookup_map(&self) -> Result<HashMap<String, i64>> {
        let mut map = HashMap::new();
        for t in self.list().await? {
            map.insert(normalize_trade_name(&t.name), t.id);
            map.insert(normalize_trade_name(&t.code), t.id);
        }
        Ok(map)
    }
}
