// src/search.rs

use async_trait::async_trait;
use meilisearch_sdk::{client::Client as MeilisearchClient, indexes::Index};
use tokio::sync::Mutex;

use crate::{config::MeilisearchConfig, error::Result, grocery::GroceryStore};

pub const MAX_SEARCH_LIMIT: usize = 50;

/// Lookup of grocery stores members can register against.
#[async_trait]
pub trait StoreDirectory: Send + Sync {
    async fn index(&self, store: &GroceryStore) -> Result<()>;
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<GroceryStore>>;
}

pub fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(10).clamp(1, MAX_SEARCH_LIMIT)
}

pub struct Meilisearch {
    pub client: MeilisearchClient,
    pub index: Index,
}

impl Meilisearch {
    pub fn new(config: &MeilisearchConfig) -> Self {
        let client = MeilisearchClient::new(config.url.as_str(), config.key.as_str());
        let index = client.index("grocery_stores");
        Self { client, index }
    }
}

#[async_trait]
impl StoreDirectory for Meilisearch {
    async fn index(&self, store: &GroceryStore) -> Result<()> {
        self.index
            .add_documents(std::slice::from_ref(store), Some("id"))
            .await?;
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<GroceryStore>> {
        let results = self
            .index
            .search()
            .with_query(query)
            .with_limit(limit)
            .execute::<GroceryStore>()
            .await?;

        Ok(results.hits.into_iter().map(|hit| hit.result).collect())
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    stores: Mutex<Vec<GroceryStore>>,
}

#[async_trait]
impl StoreDirectory for MemoryDirectory {
    async fn index(&self, store: &GroceryStore) -> Result<()> {
        let mut stores = self.stores.lock().await;
        stores.retain(|s| s.id != store.id);
        stores.push(store.clone());
        Ok(())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<GroceryStore>> {
        let tokens: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();

        let stores = self.stores.lock().await;
        let mut hits: Vec<GroceryStore> = stores
            .iter()
            .filter(|s| {
                let text = s.search_text().to_lowercase();
                tokens.iter().all(|t| text.contains(t.as_str()))
            })
            .cloned()
            .collect();

        hits.sort_by(|a, b| a.name.cmp(&b.name));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn store(name: &str, city: &str) -> GroceryStore {
        GroceryStore {
            id: Uuid::new_v4(),
            name: name.to_string(),
            address: "1 Main St".to_string(),
            city: city.to_string(),
            state: "OH".to_string(),
            postal: "43004".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_search_matches_all_tokens() {
        let dir = MemoryDirectory::default();
        dir.index(&store("Kroger", "Columbus")).await.unwrap();
        dir.index(&store("Giant Eagle", "Columbus")).await.unwrap();
        dir.index(&store("Kroger", "Dayton")).await.unwrap();

        let hits = dir.search("kroger columbus", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].city, "Columbus");

        assert_eq!(dir.search("", 10).await.unwrap().len(), 3);
        assert_eq!(dir.search("", 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_memory_reindex_replaces() {
        let dir = MemoryDirectory::default();
        let mut s = store("Aldi", "Akron");
        dir.index(&s).await.unwrap();
        s.name = "Aldi Express".to_string();
        dir.index(&s).await.unwrap();

        let hits = dir.search("aldi", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Aldi Express");
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 10);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(500)), MAX_SEARCH_LIMIT);
    }
}
