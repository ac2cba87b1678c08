use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::db;
use crate::storage::{self, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let db = db::connect(&config.database_url).await?;
        let storage = storage::from_config(&config.storage).await?;

        Ok(Self {
            db,
            config,
            storage,
        })
    }

    pub fn from_parts(
        db: SqlitePool,
        config: Arc<AppConfig>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self {
            db,
            config,
            storage,
        }
    }
}
