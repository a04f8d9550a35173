use crate::activities::Activity;
use crate::config::AppConfig;
use crate::properties::Property;
use crate::storage::{Collection, FileBackend, Store};
use crate::users::User;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<Store>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let backend = FileBackend::new(&config.data_dir)
            .await
            .with_context(|| format!("create data dir {}", config.data_dir.display()))?;
        tokio::fs::create_dir_all(&config.uploads_dir)
            .await
            .with_context(|| format!("create uploads dir {}", config.uploads_dir.display()))?;

        let state = Self::from_parts(config, Arc::new(Store::new(Arc::new(backend))));
        state.verify_collections().await?;
        Ok(state)
    }

    pub fn from_parts(config: Arc<AppConfig>, store: Arc<Store>) -> Self {
        Self { config, store }
    }

    /// Refuse to start on a corrupt document instead of serving it as empty.
    pub async fn verify_collections(&self) -> anyhow::Result<()> {
        let properties = self
            .store
            .load::<Property>(Collection::Properties)
            .await
            .context("load properties document")?;
        let users = self
            .store
            .load::<User>(Collection::Users)
            .await
            .context("load users document")?;
        let activities = self
            .store
            .load::<Activity>(Collection::Activities)
            .await
            .context("load activities document")?;
        info!(
            properties = properties.len(),
            users = users.len(),
            activities = activities.len(),
            "collections loaded"
        );
        Ok(())
    }

    /// State over an in-memory store, for tests.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            Arc::new(Store::in_memory()),
        )
    }
}
