use actix::prelude::*;
use anyhow::anyhow;
use log_error::LogError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use supplier_feeds::Fetcher;
use sync_types::supplier::{SupplierConfig, SupplierRepository};
use time::OffsetDateTime;
use tokio::sync::{Notify, RwLock};
use tokio::time::sleep;
use typesafe_repository::async_ops::{Get, List, Save};

use crate::error::ImportError;
use crate::field_map::FieldMapping;
use crate::import_throttle;
use crate::reconcile::Reconciler;
use crate::run::ImportRunContext;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub enum ImportStatus {
    Enqueued,
    InProgress,
    Success,
    Failure(String),
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Enqueued => write!(f, "Enqueued"),
            Self::InProgress => write!(f, "In progress"),
            Self::Success => write!(f, "Import finished"),
            Self::Failure(msg) => write!(f, "Import failed: {msg}"),
        }
    }
}

impl ImportStatus {
    /// A feed that could not be fetched is reported as a bare `Error`.
    fn from_result(res: &Result<String, anyhow::Error>) -> Self {
        match res {
            Ok(_) => Self::Success,
            Err(err) => match err.downcast_ref::<ImportError>() {
                Some(ImportError::FeedFetch { .. }) => Self::Failure("Error".to_string()),
                _ => Self::Failure(err.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SupplierImport {
    pub supplier: String,
    pub status: ImportStatus,
    pub report: Option<String>,
    pub last_run: Option<OffsetDateTime>,
    start: Arc<Notify>,
}

impl SupplierImport {
    fn new(supplier: String) -> Self {
        Self {
            supplier,
            status: ImportStatus::Enqueued,
            report: None,
            last_run: None,
            start: Arc::new(Notify::new()),
        }
    }

    pub fn status(&self) -> &ImportStatus {
        &self.status
    }
}

/// Runs one import cycle per registered supplier.
pub struct ImportService {
    fetcher: Fetcher,
    suppliers: Vec<SupplierConfig>,
    registry: Arc<dyn SupplierRepository>,
    reconciler: Arc<Reconciler>,
    import: HashMap<String, Arc<RwLock<SupplierImport>>>,
}

impl ImportService {
    pub fn new(
        fetcher: Fetcher,
        suppliers: Vec<SupplierConfig>,
        registry: Arc<dyn SupplierRepository>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            fetcher,
            suppliers,
            registry,
            reconciler,
            import: HashMap::new(),
        }
    }

    /// Active suppliers whose field map is valid.
    fn registrable(suppliers: &[SupplierConfig]) -> Vec<&SupplierConfig> {
        suppliers
            .iter()
            .filter(|s| s.active)
            .filter(|s| {
                FieldMapping::try_from(&s.field_map)
                    .map_err(|err| anyhow!("Supplier {} not registered: {err}", s.name))
                    .log_error("Invalid supplier configuration")
                    .is_some()
            })
            .collect()
    }

    pub async fn start_import_cycle(
        import: Arc<RwLock<SupplierImport>>,
        fetcher: Fetcher,
        registry: Arc<dyn SupplierRepository>,
        reconciler: Arc<Reconciler>,
    ) {
        let (supplier, start_notify) = {
            let e = import.read().await;
            (e.supplier.clone(), e.start.clone())
        };
        loop {
            import.write().await.status = ImportStatus::Enqueued;
            let res = {
                let Some(_permit) = import_throttle::acquire_import_permit()
                    .await
                    .log_error("Import cycle stopped")
                else {
                    return;
                };
                import.write().await.status = ImportStatus::InProgress;
                do_import(&supplier, &fetcher, registry.as_ref(), reconciler.as_ref()).await
            };
            if let Err(err) = &res {
                log::error!("Import of {supplier} failed: {err}");
            }
            {
                let mut state = import.write().await;
                state.status = ImportStatus::from_result(&res);
                state.last_run = Some(OffsetDateTime::now_utc());
                if let Ok(report) = res {
                    state.report = Some(report);
                }
            }
            let update_rate = registry
                .get_one(&supplier)
                .await
                .log_error("Unable to read supplier configuration")
                .flatten()
                .map(|s| s.update_rate);
            let Some(update_rate) = update_rate else {
                log::warn!("Supplier {supplier} is gone, stopping its import cycle");
                return;
            };

            tokio::select! {
                _ = sleep(update_rate) => (),
                _ = start_notify.notified() => log::info!("Import of {supplier} requested"),
            }
        }
    }
}

/// One full run of a supplier: fetch, reconcile, sweep, store the report.
pub async fn do_import(
    supplier: &str,
    fetcher: &Fetcher,
    registry: &dyn SupplierRepository,
    reconciler: &Reconciler,
) -> Result<String, anyhow::Error> {
    let mut config = registry
        .get_one(&supplier.to_string())
        .await?
        .ok_or_else(|| anyhow!("Supplier {supplier} not found"))?;
    let mapping = FieldMapping::try_from(&config.field_map)?;
    let active = registry
        .list()
        .await?
        .into_iter()
        .filter(|s| s.active)
        .map(|s| (s.name.clone(), s))
        .collect();
    let adapter = supplier_feeds::adapter_for(&config);
    log::info!("Fetching {supplier} feed with {} adapter", adapter.name());
    let batch = adapter
        .fetch(fetcher)
        .await
        .map_err(|err| ImportError::FeedFetch {
            supplier: supplier.to_string(),
            reason: format!("{err:#}"),
        })?;
    let mut ctx = ImportRunContext::new(config.clone(), mapping, active);
    let report = reconciler.run(&mut ctx, batch, adapter.as_ref()).await?;
    config.report = Some(report.clone());
    registry.save(config).await?;
    Ok(report)
}

impl Actor for ImportService {
    type Context = Context<Self>;

    fn start(mut self) -> Addr<Self>
    where
        Self: Actor<Context = Context<Self>>,
    {
        let names: Vec<_> = Self::registrable(&self.suppliers)
            .into_iter()
            .map(|s| s.name.clone())
            .collect();
        for name in names {
            self.import.insert(
                name.clone(),
                Arc::new(RwLock::new(SupplierImport::new(name))),
            );
        }
        log::info!("Registered {} supplier imports", self.import.len());
        for i in self.import.values() {
            tokio::task::spawn_local(ImportService::start_import_cycle(
                i.clone(),
                self.fetcher.clone(),
                self.registry.clone(),
                self.reconciler.clone(),
            ));
        }
        Context::new().run(self)
    }

    fn started(&mut self, _ctx: &mut Context<Self>) {}
}

#[derive(Message)]
#[rtype(result = "Option<SupplierImport>")]
pub struct GetStatus(pub String);

#[derive(Message)]
#[rtype(result = "HashMap<String, SupplierImport>")]
pub struct GetAllStatus;

/// Runs the import of a supplier now instead of waiting for its update rate.
/// Resolves to `false` for an unknown supplier.
#[derive(Message)]
#[rtype(result = "bool")]
pub struct Start(pub String);

impl Handler<GetStatus> for ImportService {
    type Result = ResponseActFuture<Self, Option<SupplierImport>>;

    fn handle(&mut self, GetStatus(name): GetStatus, _ctx: &mut Self::Context) -> Self::Result {
        let import = self.import.get(&name).cloned();
        let fut = async move {
            match import {
                Some(import) => Some(import.read().await.clone()),
                None => None,
            }
        };
        Box::pin(fut.into_actor(self))
    }
}

impl Handler<GetAllStatus> for ImportService {
    type Result = ResponseActFuture<Self, HashMap<String, SupplierImport>>;

    fn handle(&mut self, _: GetAllStatus, _ctx: &mut Self::Context) -> Self::Result {
        let import = self.import.clone();
        let fut = async move {
            let mut res = HashMap::new();
            for (name, e) in import.iter() {
                res.insert(name.clone(), e.read().await.clone());
            }
            res
        };
        Box::pin(fut.into_actor(self))
    }
}

impl Handler<Start> for ImportService {
    type Result = bool;

    fn handle(&mut self, Start(name): Start, _ctx: &mut Self::Context) -> Self::Result {
        let Some(import) = self.import.get(&name).cloned() else {
            return false;
        };
        actix::spawn(async move {
            import.read().await.start.notify_one();
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brand_cache::BrandCache;
    use crate::config::{FileSystemSupplierRepository, NotifySettings, PricingDefaults};
    use crate::fixtures::{product, supplier};
    use crate::images::HttpImageFetcher;
    use crate::import_throttle::ProductLocks;
    use crate::notify::LogNotifier;
    use crate::price::PriceEngine;
    use crate::storage::memory::{
        InMemoryBrandRepository, InMemoryCategoryRepository, InMemoryProductRepository,
    };
    use rust_decimal_macros::dec;
    use std::path::Path;
    use std::time::Duration;
    use sync_types::supplier::FeedSource;

    fn unreachable_supplier(name: &str) -> SupplierConfig {
        let mut cfg = supplier(name);
        cfg.source = FeedSource::Xml {
            url: "http://127.0.0.1:9/feed.xml".to_string(),
            items_path: "products.product".to_string(),
        };
        cfg.update_rate = Duration::from_secs(60 * 60);
        cfg
    }

    fn reconciler(products: Arc<InMemoryProductRepository>, images: &Path) -> Reconciler {
        Reconciler::new(
            products,
            Arc::new(InMemoryCategoryRepository::default()),
            Arc::new(BrandCache::new(Arc::new(InMemoryBrandRepository::default()))),
            PriceEngine::new(PricingDefaults::new(dec!(24))),
            Arc::new(HttpImageFetcher::new(reqwest::Client::new(), images)),
            Arc::new(LogNotifier),
            ProductLocks::default(),
            NotifySettings::default(),
        )
    }

    #[tokio::test]
    async fn feed_failure_leaves_products_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileSystemSupplierRepository::new(dir.path());
        registry.save(unreachable_supplier("a")).await.unwrap();

        let products = Arc::new(InMemoryProductRepository::default());
        let mut p = product("Router", "AX1");
        p.related_import.push("a".to_string());
        products.save(p.clone()).await.unwrap();
        let reconciler = reconciler(products.clone(), &dir.path().join("images"));

        let fetcher = Fetcher::new(reqwest::Client::new(), 1);
        let res = do_import("a", &fetcher, &registry, &reconciler).await;
        assert_eq!(
            ImportStatus::from_result(&res),
            ImportStatus::Failure("Error".to_string())
        );
        assert_eq!(products.writes(), 1);
        let stored = registry.get_one(&"a".to_string()).await.unwrap().unwrap();
        assert_eq!(stored.report, None);
    }

    async fn next_run(addr: &Addr<ImportService>, after: Option<OffsetDateTime>) -> SupplierImport {
        for _ in 0..500 {
            let import = addr.send(GetStatus("a".to_string())).await.unwrap().unwrap();
            if import.last_run.is_some() && import.last_run != after {
                return import;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("import of a did not run");
    }

    #[actix_rt::test]
    async fn start_runs_a_waiting_import_again() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(FileSystemSupplierRepository::new(dir.path()));
        let cfg = unreachable_supplier("a");
        registry.save(cfg.clone()).await.unwrap();
        let products = Arc::new(InMemoryProductRepository::default());
        let addr = ImportService::new(
            Fetcher::new(reqwest::Client::new(), 1),
            vec![cfg],
            registry,
            Arc::new(reconciler(products, &dir.path().join("images"))),
        )
        .start();

        let first = next_run(&addr, None).await;
        assert_eq!(first.status, ImportStatus::Failure("Error".to_string()));
        assert_eq!(addr.send(GetAllStatus).await.unwrap().len(), 1);

        assert!(addr.send(Start("a".to_string())).await.unwrap());
        let second = next_run(&addr, first.last_run).await;
        assert!(second.last_run > first.last_run);

        assert!(!addr.send(Start("missing".to_string())).await.unwrap());
        assert!(addr.send(GetStatus("missing".to_string())).await.unwrap().is_none());
    }

    #[test]
    fn invalid_field_maps_are_not_registered() {
        let mut broken = supplier("broken");
        broken.field_map.insert("mpn".to_string(), "a..b".to_string());
        let mut inactive = supplier("inactive");
        inactive.active = false;
        let suppliers = vec![supplier("a"), broken, inactive];
        let names: Vec<_> = ImportService::registrable(&suppliers)
            .into_iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["a"]);
    }
}
