use std::sync::Arc;

use anyhow::Context;

use super::{
    config::Config,
    database::{RedisStore, init_redis},
    search::{SearchIndex, init_meilisearch},
    store::PostStore,
};

pub struct State {
    pub config: Config,
    pub store: Arc<dyn PostStore>,
    pub search: Arc<dyn SearchIndex>,
}

impl State {
    pub async fn new() -> anyhow::Result<Arc<Self>> {
        let config = Config::load()?;

        let redis_connection = init_redis(&config.redis_url)
            .await
            .context("Failed to connect to Redis")?;
        let meili_index = init_meilisearch(&config.meili_url, &config.meili_key)
            .await
            .context("Failed to configure Meilisearch")?;

        Ok(Self::with_parts(
            config,
            Arc::new(RedisStore::new(redis_connection)),
            Arc::new(meili_index),
        ))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<dyn PostStore>,
        search: Arc<dyn SearchIndex>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            search,
        })
    }
}
