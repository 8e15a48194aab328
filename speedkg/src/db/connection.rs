use neo4rs::{ConfigBuilder, Graph};

use crate::config::GraphConfig;
use crate::error::{KgError, Result};

/// Open the driver's connection pool.
pub async fn connect(config: &GraphConfig) -> Result<Graph> {
    let mut builder = ConfigBuilder::default()
        .uri(config.uri.as_str())
        .user(config.user.as_str())
        .password(config.password.as_str())
        .max_connections(config.max_connections)
        .fetch_size(config.fetch_size);

    if let Some(database) = config.database.as_deref().filter(|db| !db.is_empty()) {
        builder = builder.db(database);
    }

    let neo_config = builder
        .build()
        .map_err(|e| KgError::GraphUnavailable(format!("Invalid graph configuration: {e}")))?;

    let graph = Graph::connect(neo_config)
        .await
        .map_err(|e| KgError::GraphUnavailable(format!("Failed to connect to {}: {e}", config.uri)))?;

    tracing::info!(
        uri = %config.uri,
        max_connections = config.max_connections,
        "Connected to graph store"
    );

    Ok(graph)
}
