use crate::brand_cache::BrandCache;
use crate::category_resolver::CategoryResolver;
use crate::characteristics::CharacteristicNormalizer;
use crate::config::NotifySettings;
use crate::error::ImportError;
use crate::field_map::{fields, CanonicalRecord};
use crate::filter::{category_path, ProductFilter};
use crate::images::{resolve_images, ImageFetcher};
use crate::import_throttle::ProductLocks;
use crate::notify::{availability_notice, Notifier};
use crate::price::{PriceEngine, PriceInput};
use crate::run::ImportRunContext;
use crate::status::{apply_status, derive_status};
use crate::supplier_info::{reconcile, SupplierSnapshot};
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use supplier_feeds::SupplierAdapter;
use sync_types::brand::Brand;
use sync_types::category::{Category, CategoryRepository, UNCATEGORIZED};
use sync_types::product::{
    make_slug, ByIdentity, BySupplier, Orphaned, ProdChar, Product, ProductRepository,
};
use time::OffsetDateTime;
use typesafe_repository::async_ops::{Get, Remove, Save, Select};
use uuid::Uuid;

/// Canonical view of one feed record, ready to be merged into a product.
#[derive(Debug, Clone)]
struct Draft {
    name: String,
    mpn: Option<String>,
    barcode: Option<String>,
    model: Option<String>,
    brand: Option<String>,
    path: [Option<String>; 3],
    recycle_tax: Decimal,
    snapshot: SupplierSnapshot,
    chars: Vec<ProdChar>,
    images: Vec<String>,
    weight: Option<Decimal>,
    length: Option<Decimal>,
    width: Option<Decimal>,
    height: Option<Decimal>,
}

impl Draft {
    fn new(
        supplier: &str,
        rec: &CanonicalRecord,
        raw: &Value,
        adapter: &dyn SupplierAdapter,
        normalizer: &CharacteristicNormalizer,
    ) -> Result<Self, ImportError> {
        let name = rec
            .text(fields::NAME)
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ImportError::validation("record has no name"))?;
        let mpn = rec.text(fields::MPN).filter(|s| !s.trim().is_empty());
        let barcode = rec.text(fields::BARCODE).filter(|s| !s.trim().is_empty());
        if mpn.is_none() && barcode.is_none() {
            return Err(ImportError::validation(format!("{name} has neither mpn nor barcode")));
        }
        let wholesale = rec
            .decimal(fields::WHOLESALE)
            .ok_or_else(|| ImportError::validation(format!("{name} has no wholesale price")))?;
        let mut images = rec.list(fields::IMAGE);
        images.extend(adapter.images(raw));
        Ok(Self {
            snapshot: SupplierSnapshot {
                supplier: supplier.to_string(),
                wholesale,
                retail_price: rec.decimal(fields::RETAIL_PRICE),
                quantity: rec.integer(fields::QUANTITY),
                stock_level: rec.text(fields::STOCK_LEVEL),
                supplier_product_id: rec.text(fields::SUPPLIER_PRODUCT_ID),
                supplier_product_url: rec.text(fields::SUPPLIER_PRODUCT_URL),
                discount: rec.decimal(fields::DISCOUNT),
            },
            mpn: mpn.map(|s| s.trim().to_string()),
            barcode: barcode.map(|s| s.trim().to_string()),
            model: rec.text(fields::MODEL).filter(|s| !s.trim().is_empty()),
            brand: rec.text(fields::BRAND).filter(|s| !s.trim().is_empty()),
            path: category_path(rec),
            recycle_tax: rec.decimal(fields::RECYCLE_TAX).unwrap_or_default(),
            chars: normalizer.normalize(adapter.characteristics(raw)),
            images,
            weight: rec.decimal(fields::WEIGHT).or_else(|| adapter.weight(raw)),
            length: rec.decimal(fields::LENGTH),
            width: rec.decimal(fields::WIDTH),
            height: rec.decimal(fields::HEIGHT),
            name,
        })
    }

    fn identity(&self) -> ByIdentity {
        ByIdentity {
            mpn: self.mpn.clone(),
            barcode: self.barcode.clone(),
            model: self.model.clone(),
        }
    }
}

fn fill<T: PartialEq>(target: &mut Option<T>, value: Option<T>) {
    if value.is_some() && *target != value {
        *target = value;
    }
}

/// Create, update and sweep of products for one supplier run.
pub struct Reconciler {
    products: Arc<dyn ProductRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    categories: CategoryResolver,
    brands: Arc<BrandCache>,
    prices: PriceEngine,
    images: Arc<dyn ImageFetcher>,
    notifier: Arc<dyn Notifier>,
    locks: ProductLocks,
    notify: NotifySettings,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        products: Arc<dyn ProductRepository>,
        categories: Arc<dyn CategoryRepository>,
        brands: Arc<BrandCache>,
        prices: PriceEngine,
        images: Arc<dyn ImageFetcher>,
        notifier: Arc<dyn Notifier>,
        locks: ProductLocks,
        notify: NotifySettings,
    ) -> Self {
        Self {
            products,
            categories: CategoryResolver::new(categories.clone()),
            category_repo: categories,
            brands,
            prices,
            images,
            notifier,
            locks,
            notify,
        }
    }

    /// Reconciles a fetched batch and sweeps products the batch no longer lists.
    /// Returns the run report.
    pub async fn run(
        &self,
        ctx: &mut ImportRunContext,
        batch: Vec<Value>,
        adapter: &dyn SupplierAdapter,
    ) -> Result<String, anyhow::Error> {
        let total = batch.len();
        let batch = ProductFilter::new(&ctx.supplier.filter, &ctx.supplier.stock_map)
            .apply(batch, &ctx.mapping);
        log::info!(
            "{}: {} of {total} records passed the filter",
            ctx.name(),
            batch.len()
        );
        let normalizer =
            CharacteristicNormalizer::new(&ctx.supplier.char_names, &ctx.supplier.char_values);
        for raw in batch.iter() {
            match self.process(ctx, raw, adapter, &normalizer).await {
                Ok(()) => (),
                Err(err) if err.is_skip() => {
                    log::debug!("{}: {err}", ctx.name());
                    ctx.counters.skipped += 1;
                }
                Err(err) => {
                    log::error!("{}: {err}", ctx.name());
                    ctx.counters.failed += 1;
                }
            }
        }
        self.sweep(ctx).await?;
        let report = ctx.report();
        log::info!("{}: {report}", ctx.name());
        Ok(report)
    }

    async fn process(
        &self,
        ctx: &mut ImportRunContext,
        raw: &Value,
        adapter: &dyn SupplierAdapter,
        normalizer: &CharacteristicNormalizer,
    ) -> Result<(), ImportError> {
        let rec = ctx.mapping.map(raw);
        let draft = Draft::new(ctx.name(), &rec, raw, adapter, normalizer)?;
        let identity = draft.identity();
        let _identity = self.locks.lock_all(identity.lock_keys()).await;
        let found = self
            .products
            .select(&identity)
            .await
            .map_err(|err| ImportError::update(&draft.name, err))?;
        if found.len() > 1 {
            log::warn!(
                "{}: {} products match {}, updating the first one",
                ctx.name(),
                found.len(),
                draft.name
            );
        }
        let Some(found) = found.into_iter().next() else {
            return self.create(ctx, draft).await;
        };
        // Another lookup may reach the same product through a different identifier.
        let _product = self.locks.lock_product(&found.id).await;
        let product = self
            .products
            .get_one(&found.id)
            .await
            .map_err(|err| ImportError::update(&found.name, err))?
            .ok_or_else(|| ImportError::update(&found.name, "removed during the run"))?;
        self.update(ctx, product, draft).await
    }

    async fn brand_of(&self, draft: &Draft, current: Option<Uuid>) -> Result<Option<Brand>, anyhow::Error> {
        match (&draft.brand, current) {
            (Some(name), _) => self.brands.resolve(name).await,
            (None, Some(id)) => self.brands.by_id(&id).await,
            (None, None) => Ok(None),
        }
    }

    async fn create(&self, ctx: &mut ImportRunContext, draft: Draft) -> Result<(), ImportError> {
        let err = |e: anyhow::Error| ImportError::creation(&draft.name, e);
        let category = self
            .categories
            .resolve(
                &ctx.supplier.category_map,
                ctx.supplier.contains_policy,
                &draft.name,
                &draft.path,
            )
            .await
            .map_err(err)?;
        let brand = self.brand_of(&draft, None).await.map_err(err)?;
        let brand_name = brand.as_ref().map(|b| b.name.as_str());
        let outcome = reconcile(&[], &draft.snapshot, ctx);
        let prices = self.prices.compute_price(
            None,
            &outcome.supplier_info,
            Some(&category),
            brand.as_ref(),
            &PriceInput {
                name: &draft.name,
                category_slug: &category.slug,
                brand_name,
                recycle_tax: draft.recycle_tax,
                suppliers: &ctx.active_suppliers,
            },
        )?;
        let images = resolve_images(self.images.as_ref(), &draft.images).await;
        if images.is_empty() {
            return Err(ImportError::creation(&draft.name, "no_images"));
        }
        let status = derive_status(
            0,
            &outcome.supplier_info,
            brand_name,
            &ctx.supplier.brand_exclusions,
        );
        let mut product = Product {
            id: Uuid::new_v4(),
            slug: make_slug(&draft.name, draft.mpn.as_deref()),
            name: draft.name.clone(),
            mpn: draft.mpn.clone(),
            barcode: draft.barcode.clone(),
            model: draft.model.clone(),
            category: Some(category.id),
            price: Decimal::ZERO,
            is_fixed_price: false,
            weight: draft.weight,
            length: draft.length,
            width: draft.width,
            height: draft.height,
            status,
            deleted_at: None,
            brand: brand.as_ref().map(|b| b.id),
            prod_chars: draft.chars.clone(),
            platforms: vec![],
            supplier_info: outcome.supplier_info,
            related_import: vec![ctx.name().to_string()],
            inventory: 0,
            notice_if_available: false,
            images,
        };
        prices.apply_to(&mut product);
        apply_status(&mut product, status, OffsetDateTime::now_utc());
        let id = product.id;
        self.products.save(product).await.map_err(err)?;
        log::debug!("{}: created {}", ctx.name(), draft.name);
        ctx.counters.created += 1;
        ctx.touch(id);
        Ok(())
    }

    async fn update(
        &self,
        ctx: &mut ImportRunContext,
        mut product: Product,
        draft: Draft,
    ) -> Result<(), ImportError> {
        let name = product.name.clone();
        let err = |e: anyhow::Error| ImportError::update(&name, e);
        let before = product.clone();
        ctx.touch(product.id);

        if !product.related_import.iter().any(|s| s == ctx.name()) {
            product.related_import.push(ctx.name().to_string());
        }
        if product.prod_chars.is_empty() && !draft.chars.is_empty() {
            product.prod_chars = draft.chars.clone();
        }
        let outcome = reconcile(&product.supplier_info, &draft.snapshot, ctx);
        product.supplier_info = outcome.supplier_info;

        let resolved = self
            .categories
            .resolve(
                &ctx.supplier.category_map,
                ctx.supplier.contains_policy,
                &draft.name,
                &draft.path,
            )
            .await
            .map_err(err)?;
        let current = product.category;
        let category = match current {
            Some(current) if resolved.slug == UNCATEGORIZED && current != resolved.id => {
                self.category_repo.get_one(&current).await.map_err(err)?
            }
            _ => {
                product.category = Some(resolved.id);
                Some(resolved)
            }
        };
        let brand = self.brand_of(&draft, product.brand).await.map_err(err)?;
        fill(&mut product.brand, brand.as_ref().map(|b| b.id));
        fill(&mut product.weight, draft.weight);
        fill(&mut product.length, draft.length);
        fill(&mut product.width, draft.width);
        fill(&mut product.height, draft.height);
        if product.mpn.is_none() {
            product.mpn = draft.mpn.clone();
        }
        if product.barcode.is_none() {
            product.barcode = draft.barcode.clone();
        }
        if product.model.is_none() {
            product.model = draft.model.clone();
        }

        let brand_name = brand.as_ref().map(|b| b.name.as_str());
        let prices = self.prices.compute_price(
            Some(&product),
            &product.supplier_info,
            category.as_ref(),
            brand.as_ref(),
            &PriceInput {
                name: &product.name,
                category_slug: category.as_ref().map_or(UNCATEGORIZED, |c| c.slug.as_str()),
                brand_name,
                recycle_tax: draft.recycle_tax,
                suppliers: &ctx.active_suppliers,
            },
        )?;
        prices.apply_to(&mut product);

        if let Some(supplier) = outcome.became_available.filter(|_| product.notice_if_available) {
            if let Some(message) = availability_notice(&self.notify, &product, &supplier) {
                match self.notifier.send(message).await {
                    Ok(()) => product.notice_if_available = false,
                    Err(e) => log::warn!("{name}: unable to send availability notice: {e}"),
                }
            }
        }

        let status = derive_status(
            product.inventory,
            &product.supplier_info,
            brand_name,
            &ctx.supplier.brand_exclusions,
        );
        apply_status(&mut product, status, OffsetDateTime::now_utc());

        if product == before {
            ctx.counters.skipped += 1;
            return Ok(());
        }
        let republished = before.status.is_deleted() && !product.status.is_deleted();
        self.products.save(product).await.map_err(err)?;
        if republished {
            log::info!("{}: republished {name}", ctx.name());
            ctx.counters.republished += 1;
        } else {
            ctx.counters.updated += 1;
        }
        Ok(())
    }

    /// Marks this supplier out of stock on every product it used to list but
    /// did not list this run. Writes only products that actually change.
    pub async fn sweep(&self, ctx: &mut ImportRunContext) -> Result<(), anyhow::Error> {
        let listed = self
            .products
            .select(&BySupplier(ctx.name().to_string()))
            .await?;
        let stale: Vec<_> = listed.into_iter().filter(|p| !ctx.touched(&p.id)).collect();
        for stale in stale {
            let _guard = self.locks.lock_product(&stale.id).await;
            let Some(mut product) = self.products.get_one(&stale.id).await? else {
                continue;
            };
            let before = product.clone();
            match product.supplier_info.iter_mut().find(|r| r.name == ctx.name()) {
                Some(r) => r.in_stock = false,
                None => product.related_import.retain(|s| s != ctx.name()),
            }
            for r in product.supplier_info.iter_mut() {
                if r.in_stock && !ctx.is_active(&r.name) {
                    r.in_stock = false;
                }
            }
            let brand = match product.brand {
                Some(id) => self.brands.by_id(&id).await?,
                None => None,
            };
            let status = derive_status(
                product.inventory,
                &product.supplier_info,
                brand.as_ref().map(|b| b.name.as_str()),
                &ctx.supplier.brand_exclusions,
            );
            apply_status(&mut product, status, OffsetDateTime::now_utc());
            if product == before {
                continue;
            }
            let deleted = !before.status.is_deleted() && product.status.is_deleted();
            let name = product.name.clone();
            match self.products.save(product).await {
                Ok(()) if deleted => {
                    log::info!("{}: {name} is no longer available", ctx.name());
                    ctx.counters.deleted += 1;
                }
                Ok(()) => (),
                Err(e) => {
                    log::error!("{}: {}", ctx.name(), ImportError::update(&name, e));
                    ctx.counters.failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Hard-deletes products no supplier references any more.
    pub async fn purge_orphans(&self) -> Result<usize, anyhow::Error> {
        let orphans = self.products.select(&Orphaned).await?;
        for p in orphans.iter() {
            self.products.remove(&p.id).await?;
            log::info!("Removed orphaned product {}", p.name);
        }
        Ok(orphans.len())
    }
}
