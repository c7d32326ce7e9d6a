use anyhow::Context;
use product_search::observability::init_tracing;
use product_search::{Config, HttpEmbeddingProvider, PostgresProductStore, SearchServer};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    init_tracing()?;

    info!("Starting product search server");

    let store = PostgresProductStore::new(&config.database)
        .await
        .context("failed to connect to the product database")?;
    if config.database.initialize_schema {
        store.initialize_schema(config.embedding.dimension).await?;
    }

    let embedder = HttpEmbeddingProvider::new(&config.embedding)?;

    let server = SearchServer::new(config, Arc::new(store), Arc::new(embedder))?;
    server.run().await?;

    Ok(())
}
