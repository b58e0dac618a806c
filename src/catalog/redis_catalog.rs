use async_trait::async_trait;
use crate::catalog::{ApiCatalog, ApiDefinition, CatalogError};
use redis::AsyncCommands;

/// Catalog backed by a Redis hash: field = api id, value = definition JSON.
pub struct RedisCatalog {
    client: redis::Client,
    hash_key: String,
}

impl RedisCatalog {
    pub fn new(client: redis::Client, hash_key: String) -> Self {
        Self { client, hash_key }
    }

    /// Used by the import side; the compiler itself never writes.
    pub async fn put(&self, definition: &ApiDefinition) -> Result<(), CatalogError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(definition).map_err(|source| CatalogError::Decode {
            id: definition.id.clone(),
            source,
        })?;
        let _: () = conn.hset(&self.hash_key, &definition.id, serialized).await?;
        Ok(())
    }
}

#[async_trait]
impl ApiCatalog for RedisCatalog {
    async fn get(&self, id: &str) -> Result<Option<ApiDefinition>, CatalogError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.hget(&self.hash_key, id).await?;

        match raw {
            Some(s) => {
                let def = serde_json::from_str(&s).map_err(|source| CatalogError::Decode {
                    id: id.to_string(),
                    source,
                })?;
                Ok(Some(def))
            }
            None => Ok(None),
        }
    }
}
