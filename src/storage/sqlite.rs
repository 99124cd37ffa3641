use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use sync_types::brand::{Brand, BrandRepository, ByName};
use sync_types::category::{BySlug, Category, CategoryRepository};
use sync_types::product::{ByIdentity, BySupplier, Orphaned, Product, ProductRepository};
use sync_types::StoreError;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::{Get, List, Remove, Save, Select};
use typesafe_repository::prelude::*;
use typesafe_repository::IdentityOf;

fn decode<T: DeserializeOwned>(payloads: Vec<String>) -> Result<Vec<T>, anyhow::Error> {
    payloads
        .iter()
        .map(|p| serde_json::from_str(p).map_err(anyhow::Error::from))
        .collect()
}

fn unique_violation(err: tokio_rusqlite::Error, entity: &'static str, key: String) -> anyhow::Error {
    match err {
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::UniqueViolation { entity, key }.into()
        }
        err => err.into(),
    }
}

fn blank_to_none(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

async fn init_pragmas(conn: &Connection) -> Result<(), tokio_rusqlite::Error> {
    conn.call(|conn| {
        let _ = conn.pragma_update(None, "journal_mode", &"WAL");
        let _ = conn.pragma_update(None, "synchronous", &"NORMAL");
        let _ = conn.pragma_update(None, "busy_timeout", &5000i64);
        Ok(())
    })
    .await
}

/// Products stored as JSON payloads with indexed identity columns and a
/// product to supplier reference table.
pub struct SqliteProductRepository {
    conn: Connection,
}

impl SqliteProductRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        init_pragmas(&conn).await?;
        conn.call(|conn| {
            let conn = Transaction::new(conn, TransactionBehavior::Deferred)?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS product (
                    id BLOB PRIMARY KEY,
                    name TEXT NOT NULL,
                    mpn TEXT COLLATE NOCASE,
                    barcode TEXT,
                    model TEXT COLLATE NOCASE,
                    payload TEXT NOT NULL
                )",
                [],
            )?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS product_supplier (
                    product_id BLOB NOT NULL REFERENCES product(id) ON DELETE CASCADE,
                    supplier TEXT NOT NULL,
                    PRIMARY KEY (product_id, supplier)
                )",
                [],
            )?;
            conn.execute("CREATE INDEX IF NOT EXISTS product_mpn ON product(mpn)", [])?;
            conn.execute("CREATE INDEX IF NOT EXISTS product_barcode ON product(barcode)", [])?;
            conn.execute("CREATE INDEX IF NOT EXISTS product_model ON product(model)", [])?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS product_supplier_name ON product_supplier(supplier)",
                [],
            )?;
            conn.commit()?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    async fn query(
        &self,
        sql: &'static str,
        args: Vec<Option<String>>,
    ) -> Result<Vec<Product>, anyhow::Error> {
        let payloads = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(sql)?;
                let payloads = stmt
                    .query_map(rusqlite::params_from_iter(args.iter()), |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(payloads)
            })
            .await?;
        decode(payloads)
    }
}

impl Repository<Product> for SqliteProductRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Save<Product> for SqliteProductRepository {
    async fn save(&self, product: Product) -> Result<(), anyhow::Error> {
        let payload = serde_json::to_string(&product)?;
        let mut suppliers: Vec<String> = product
            .related_import
            .iter()
            .chain(product.supplier_info.iter().map(|s| &s.name))
            .cloned()
            .collect();
        suppliers.sort();
        suppliers.dedup();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO product (id, name, mpn, barcode, model, payload)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                        name = excluded.name,
                        mpn = excluded.mpn,
                        barcode = excluded.barcode,
                        model = excluded.model,
                        payload = excluded.payload",
                    params![
                        product.id,
                        product.name,
                        blank_to_none(&product.mpn),
                        blank_to_none(&product.barcode),
                        blank_to_none(&product.model),
                        payload
                    ],
                )?;
                tx.execute(
                    "DELETE FROM product_supplier WHERE product_id = ?1",
                    [product.id],
                )?;
                for s in suppliers.iter() {
                    tx.execute(
                        "INSERT INTO product_supplier (product_id, supplier) VALUES (?1, ?2)",
                        params![product.id, s],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Get<Product> for SqliteProductRepository {
    async fn get_one(&self, id: &IdentityOf<Product>) -> Result<Option<Product>, anyhow::Error> {
        let id = *id;
        let payload: Option<String> = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row("SELECT payload FROM product WHERE id = ?1", [id], |row| {
                        row.get(0)
                    })
                    .optional()?)
            })
            .await?;
        Ok(payload.map(|p| serde_json::from_str(&p)).transpose()?)
    }
}

#[async_trait]
impl List<Product> for SqliteProductRepository {
    async fn list(&self) -> Result<Vec<Product>, anyhow::Error> {
        self.query("SELECT payload FROM product ORDER BY name", vec![])
            .await
    }
}

#[async_trait]
impl Select<Product, ByIdentity> for SqliteProductRepository {
    async fn select(&self, by: &ByIdentity) -> Result<Vec<Product>, anyhow::Error> {
        if by.is_empty() {
            return Ok(vec![]);
        }
        let candidates = self
            .query(
                "SELECT payload FROM product
                 WHERE (?1 IS NOT NULL AND mpn = ?1)
                    OR (?2 IS NOT NULL AND barcode = ?2)
                    OR (?3 IS NOT NULL AND model = ?3)
                 ORDER BY name",
                vec![
                    blank_to_none(&by.mpn),
                    blank_to_none(&by.barcode),
                    blank_to_none(&by.model),
                ],
            )
            .await?;
        Ok(candidates.into_iter().filter(|p| by.matches(p)).collect())
    }
}

#[async_trait]
impl Select<Product, BySupplier> for SqliteProductRepository {
    async fn select(&self, BySupplier(name): &BySupplier) -> Result<Vec<Product>, anyhow::Error> {
        self.query(
            "SELECT p.payload FROM product p
             JOIN product_supplier s ON s.product_id = p.id
             WHERE s.supplier = ?1
             ORDER BY p.name",
            vec![Some(name.clone())],
        )
        .await
    }
}

#[async_trait]
impl Select<Product, Orphaned> for SqliteProductRepository {
    async fn select(&self, _: &Orphaned) -> Result<Vec<Product>, anyhow::Error> {
        self.query(
            "SELECT payload FROM product p
             WHERE NOT EXISTS (SELECT 1 FROM product_supplier s WHERE s.product_id = p.id)
             ORDER BY name",
            vec![],
        )
        .await
    }
}

#[async_trait]
impl Remove<Product> for SqliteProductRepository {
    async fn remove(&self, id: &IdentityOf<Product>) -> Result<(), anyhow::Error> {
        let id = *id;
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM product_supplier WHERE product_id = ?1", [id])?;
                tx.execute("DELETE FROM product WHERE id = ?1", [id])?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

impl ProductRepository for SqliteProductRepository {}

pub struct SqliteCategoryRepository {
    conn: Connection,
}

impl SqliteCategoryRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS category (
                    id BLOB PRIMARY KEY,
                    slug TEXT NOT NULL UNIQUE,
                    payload TEXT NOT NULL
                )",
                [],
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    async fn query(
        &self,
        sql: &'static str,
        args: Vec<String>,
    ) -> Result<Vec<Category>, anyhow::Error> {
        let payloads = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(sql)?;
                let payloads = stmt
                    .query_map(rusqlite::params_from_iter(args.iter()), |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(payloads)
            })
            .await?;
        decode(payloads)
    }
}

impl Repository<Category> for SqliteCategoryRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Save<Category> for SqliteCategoryRepository {
    async fn save(&self, category: Category) -> Result<(), anyhow::Error> {
        let payload = serde_json::to_string(&category)?;
        let slug = category.slug.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO category (id, slug, payload) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET slug = excluded.slug, payload = excluded.payload",
                    params![category.id, category.slug, payload],
                )?;
                Ok(())
            })
            .await
            .map_err(|err| unique_violation(err, "category", slug))
    }
}

#[async_trait]
impl Get<Category> for SqliteCategoryRepository {
    async fn get_one(&self, id: &IdentityOf<Category>) -> Result<Option<Category>, anyhow::Error> {
        let id = *id;
        let payload: Option<String> = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row("SELECT payload FROM category WHERE id = ?1", [id], |row| {
                        row.get(0)
                    })
                    .optional()?)
            })
            .await?;
        Ok(payload.map(|p| serde_json::from_str(&p)).transpose()?)
    }
}

#[async_trait]
impl List<Category> for SqliteCategoryRepository {
    async fn list(&self) -> Result<Vec<Category>, anyhow::Error> {
        self.query("SELECT payload FROM category ORDER BY slug", vec![])
            .await
    }
}

#[async_trait]
impl Select<Category, BySlug> for SqliteCategoryRepository {
    async fn select(&self, BySlug(slug): &BySlug) -> Result<Vec<Category>, anyhow::Error> {
        self.query("SELECT payload FROM category WHERE slug = ?1", vec![slug.clone()])
            .await
    }
}

impl CategoryRepository for SqliteCategoryRepository {}

pub struct SqliteBrandRepository {
    conn: Connection,
}

impl SqliteBrandRepository {
    pub async fn init(conn: Connection) -> Result<Self, tokio_rusqlite::Error> {
        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS brand (
                    id BLOB PRIMARY KEY,
                    name TEXT NOT NULL UNIQUE COLLATE NOCASE,
                    payload TEXT NOT NULL
                )",
                [],
            )?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

impl Repository<Brand> for SqliteBrandRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Get<Brand> for SqliteBrandRepository {
    async fn get_one(&self, id: &IdentityOf<Brand>) -> Result<Option<Brand>, anyhow::Error> {
        let id = *id;
        let payload: Option<String> = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row("SELECT payload FROM brand WHERE id = ?1", [id], |row| {
                        row.get(0)
                    })
                    .optional()?)
            })
            .await?;
        Ok(payload.map(|p| serde_json::from_str(&p)).transpose()?)
    }
}

#[async_trait]
impl Select<Brand, ByName> for SqliteBrandRepository {
    async fn select(&self, ByName(name): &ByName) -> Result<Vec<Brand>, anyhow::Error> {
        let name = name.trim().to_string();
        let payloads = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT payload FROM brand WHERE name = ?1")?;
                let payloads = stmt
                    .query_map([name], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(payloads)
            })
            .await?;
        decode(payloads)
    }
}

#[async_trait]
impl BrandRepository for SqliteBrandRepository {
    async fn create(&self, brand: Brand) -> Result<Brand, anyhow::Error> {
        let payload = serde_json::to_string(&brand)?;
        let (id, name) = (brand.id, brand.name.clone());
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO brand (id, name, payload) VALUES (?1, ?2, ?3)",
                    params![id, name, payload],
                )?;
                Ok(())
            })
            .await
            .map_err(|err| unique_violation(err, "brand", brand.name.clone()))?;
        Ok(brand)
    }
}
