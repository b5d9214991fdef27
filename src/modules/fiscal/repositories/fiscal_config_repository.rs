use async_trait::async_trait;
use sqlx::MySqlPool;

use crate::config::StoredFiscalConfig;
use crate::core::Result;

/// Source of the fiscal configuration kept in the database
#[async_trait]
pub trait FiscalConfigRepository: Send + Sync {
    /// The active configuration row, if any
    async fn find_active(&self) -> Result<Option<StoredFiscalConfig>>;
}

pub struct MySqlFiscalConfigRepository {
    pool: MySqlPool,
}

impl MySqlFiscalConfigRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FiscalConfigRepository for MySqlFiscalConfigRepository {
    async fn find_active(&self) -> Result<Option<StoredFiscalConfig>> {
        let row = sqlx::query_as::<_, StoredFiscalConfig>(
            r#"
            SELECT certificate, private_key, cuit, environment
            FROM afip_config
            WHERE is_active = TRUE
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }
}
