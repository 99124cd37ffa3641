use std::collections::HashMap;
use std::sync::Arc;
use sync_types::brand::{Brand, BrandRepository, ByName};
use sync_types::StoreError;
use tokio::sync::RwLock;
use typesafe_repository::async_ops::{Get, Select};
use uuid::Uuid;

/// Process-wide brand lookup that creates unknown brands lazily.
pub struct BrandCache {
    repo: Arc<dyn BrandRepository>,
    brands: RwLock<HashMap<String, Brand>>,
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl BrandCache {
    pub fn new(repo: Arc<dyn BrandRepository>) -> Self {
        Self {
            repo,
            brands: RwLock::new(HashMap::new()),
        }
    }

    async fn lookup(&self, name: &str) -> Result<Option<Brand>, anyhow::Error> {
        Ok(self
            .repo
            .select(&ByName(name.to_string()))
            .await?
            .into_iter()
            .next())
    }

    pub async fn by_id(&self, id: &Uuid) -> Result<Option<Brand>, anyhow::Error> {
        if let Some(b) = self.brands.read().await.values().find(|b| &b.id == id) {
            return Ok(Some(b.clone()));
        }
        self.repo.get_one(id).await
    }

    /// Brand with the given name, `None` for a blank name.
    pub async fn resolve(&self, name: &str) -> Result<Option<Brand>, anyhow::Error> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(None);
        }
        if let Some(b) = self.brands.read().await.get(&key(name)) {
            return Ok(Some(b.clone()));
        }
        let brand = match self.lookup(name).await? {
            Some(b) => b,
            None => match self.repo.create(Brand::new(name)).await {
                Ok(b) => {
                    log::info!("Created brand {name}");
                    b
                }
                Err(err) if err.downcast_ref::<StoreError>().is_some() => {
                    log::debug!("Brand {name} created concurrently: {err}");
                    self.lookup(name)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("Brand {name} vanished after {err}"))?
                }
                Err(err) => return Err(err),
            },
        };
        self.brands.write().await.insert(key(name), brand.clone());
        Ok(Some(brand))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryBrandRepository;
    use async_trait::async_trait;
    use typesafe_repository::async_ops::{Get, Select};
    use typesafe_repository::prelude::*;
    use typesafe_repository::IdentityOf;

    #[tokio::test]
    async fn creates_once_and_caches() {
        let repo = Arc::new(InMemoryBrandRepository::default());
        let cache = BrandCache::new(repo.clone());
        let a = cache.resolve("Hikvision").await.unwrap().unwrap();
        let b = cache.resolve(" hikvision ").await.unwrap().unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(repo.writes(), 1);
        assert!(cache.resolve("  ").await.unwrap().is_none());
    }

    /// Store whose first lookup misses although the brand was created by someone else.
    struct Racing {
        inner: InMemoryBrandRepository,
        missed: std::sync::atomic::AtomicBool,
    }

    impl Repository<Brand> for Racing {
        type Error = anyhow::Error;
    }

    #[async_trait]
    impl Get<Brand> for Racing {
        async fn get_one(&self, id: &IdentityOf<Brand>) -> Result<Option<Brand>, anyhow::Error> {
            self.inner.get_one(id).await
        }
    }

    #[async_trait]
    impl Select<Brand, ByName> for Racing {
        async fn select(&self, by: &ByName) -> Result<Vec<Brand>, anyhow::Error> {
            if !self.missed.swap(true, std::sync::atomic::Ordering::SeqCst) {
                return Ok(vec![]);
            }
            self.inner.select(by).await
        }
    }

    #[async_trait]
    impl BrandRepository for Racing {
        async fn create(&self, brand: Brand) -> Result<Brand, anyhow::Error> {
            self.inner.create(brand).await
        }
    }

    #[tokio::test]
    async fn requeries_after_unique_violation() {
        let inner = InMemoryBrandRepository::default();
        let existing = inner.create(Brand::new("Ubiquiti")).await.unwrap();
        let repo = Arc::new(Racing {
            inner,
            missed: Default::default(),
        });
        let cache = BrandCache::new(repo);
        let b = cache.resolve("UBIQUITI").await.unwrap().unwrap();
        assert_eq!(b.id, existing.id);
    }
}
