use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use sync_types::brand::{Brand, BrandRepository, ByName};
use sync_types::category::{BySlug, Category, CategoryRepository};
use sync_types::product::{ByIdentity, BySupplier, Orphaned, Product, ProductRepository};
use sync_types::StoreError;
use tokio::sync::RwLock;
use typesafe_repository::async_ops::{Get, List, Remove, Save, Select};
use typesafe_repository::prelude::*;
use typesafe_repository::IdentityOf;
use uuid::Uuid;

/// Product store kept in memory, for tests and dry runs.
#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<Uuid, Product>>,
    writes: AtomicUsize,
}

impl InMemoryProductRepository {
    /// Number of saves and removals performed so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn filtered(&self, f: impl Fn(&Product) -> bool) -> Vec<Product> {
        let mut res: Vec<_> = self
            .products
            .read()
            .await
            .values()
            .filter(|p| f(p))
            .cloned()
            .collect();
        res.sort_by(|a, b| a.name.cmp(&b.name));
        res
    }
}

impl Repository<Product> for InMemoryProductRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Save<Product> for InMemoryProductRepository {
    async fn save(&self, product: Product) -> Result<(), anyhow::Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.products.write().await.insert(product.id, product);
        Ok(())
    }
}

#[async_trait]
impl Get<Product> for InMemoryProductRepository {
    async fn get_one(&self, id: &IdentityOf<Product>) -> Result<Option<Product>, anyhow::Error> {
        Ok(self.products.read().await.get(id).cloned())
    }
}

#[async_trait]
impl List<Product> for InMemoryProductRepository {
    async fn list(&self) -> Result<Vec<Product>, anyhow::Error> {
        Ok(self.filtered(|_| true).await)
    }
}

#[async_trait]
impl Select<Product, ByIdentity> for InMemoryProductRepository {
    async fn select(&self, by: &ByIdentity) -> Result<Vec<Product>, anyhow::Error> {
        Ok(self.filtered(|p| by.matches(p)).await)
    }
}

#[async_trait]
impl Select<Product, BySupplier> for InMemoryProductRepository {
    async fn select(&self, BySupplier(name): &BySupplier) -> Result<Vec<Product>, anyhow::Error> {
        Ok(self.filtered(|p| p.references_supplier(name)).await)
    }
}

#[async_trait]
impl Select<Product, Orphaned> for InMemoryProductRepository {
    async fn select(&self, _: &Orphaned) -> Result<Vec<Product>, anyhow::Error> {
        Ok(self
            .filtered(|p| p.related_import.is_empty() && p.supplier_info.is_empty())
            .await)
    }
}

#[async_trait]
impl Remove<Product> for InMemoryProductRepository {
    async fn remove(&self, id: &IdentityOf<Product>) -> Result<(), anyhow::Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.products.write().await.remove(id);
        Ok(())
    }
}

impl ProductRepository for InMemoryProductRepository {}

#[derive(Default)]
pub struct InMemoryCategoryRepository {
    categories: RwLock<HashMap<Uuid, Category>>,
}

impl Repository<Category> for InMemoryCategoryRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Save<Category> for InMemoryCategoryRepository {
    async fn save(&self, category: Category) -> Result<(), anyhow::Error> {
        let mut categories = self.categories.write().await;
        if categories
            .values()
            .any(|c| c.slug == category.slug && c.id != category.id)
        {
            return Err(StoreError::UniqueViolation {
                entity: "category",
                key: category.slug,
            }
            .into());
        }
        categories.insert(category.id, category);
        Ok(())
    }
}

#[async_trait]
impl Get<Category> for InMemoryCategoryRepository {
    async fn get_one(&self, id: &IdentityOf<Category>) -> Result<Option<Category>, anyhow::Error> {
        Ok(self.categories.read().await.get(id).cloned())
    }
}

#[async_trait]
impl List<Category> for InMemoryCategoryRepository {
    async fn list(&self) -> Result<Vec<Category>, anyhow::Error> {
        Ok(self.categories.read().await.values().cloned().collect())
    }
}

#[async_trait]
impl Select<Category, BySlug> for InMemoryCategoryRepository {
    async fn select(&self, BySlug(slug): &BySlug) -> Result<Vec<Category>, anyhow::Error> {
        Ok(self
            .categories
            .read()
            .await
            .values()
            .filter(|c| &c.slug == slug)
            .cloned()
            .collect())
    }
}

impl CategoryRepository for InMemoryCategoryRepository {}

#[derive(Default)]
pub struct InMemoryBrandRepository {
    brands: RwLock<HashMap<Uuid, Brand>>,
    writes: AtomicUsize,
}

impl InMemoryBrandRepository {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Repository<Brand> for InMemoryBrandRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Get<Brand> for InMemoryBrandRepository {
    async fn get_one(&self, id: &IdentityOf<Brand>) -> Result<Option<Brand>, anyhow::Error> {
        Ok(self.brands.read().await.get(id).cloned())
    }
}

#[async_trait]
impl Select<Brand, ByName> for InMemoryBrandRepository {
    async fn select(&self, ByName(name): &ByName) -> Result<Vec<Brand>, anyhow::Error> {
        let name = name.trim().to_lowercase();
        Ok(self
            .brands
            .read()
            .await
            .values()
            .filter(|b| b.name.to_lowercase() == name)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BrandRepository for InMemoryBrandRepository {
    async fn create(&self, brand: Brand) -> Result<Brand, anyhow::Error> {
        let mut brands = self.brands.write().await;
        if brands
            .values()
            .any(|b| b.name.to_lowercase() == brand.name.to_lowercase())
        {
            return Err(StoreError::UniqueViolation {
                entity: "brand",
                key: brand.name,
            }
            .into());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        brands.insert(brand.id, brand.clone());
        Ok(brand)
    }
}
