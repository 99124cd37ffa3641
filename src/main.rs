use actix::prelude::*;
use anyhow::Context as AnyhowContext;
use log_error::LogError;
use reqwest::header::{HeaderMap, HeaderValue};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use supplier_feeds::Fetcher;
use supplier_sync::brand_cache::BrandCache;
use supplier_sync::config::{
    FileSystemSupplierRepository, NotifySettings, PricingDefaults, FETCH_RETRIES, IMAGES_DIR,
    STORAGE_PATH, SUPPLIERS_DIR,
};
use supplier_sync::images::HttpImageFetcher;
use supplier_sync::import_service::{
    self, GetAllStatus, GetStatus, ImportService, Start, SupplierImport,
};
use supplier_sync::import_throttle::ProductLocks;
use supplier_sync::notify::LogNotifier;
use supplier_sync::price::PriceEngine;
use supplier_sync::reconcile::Reconciler;
use supplier_sync::storage::sqlite::{
    SqliteBrandRepository, SqliteCategoryRepository, SqliteProductRepository,
};
use sync_types::supplier::SupplierRepository;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_rusqlite::Connection;
use typesafe_repository::async_ops::List;

static DEFAULT_ACCEPT_ENCODING: &str = "br;q=1.0, gzip;q=0.6, deflate;q=0.4, *;q=0.2";

#[actix_rt::main]
async fn main() -> Result<(), anyhow::Error> {
    if let Err(env::VarError::NotPresent) = env::var("RUST_LOG") {
        env::set_var("RUST_LOG", "INFO,html5ever=error");
    }
    pretty_env_logger::formatted_timed_builder()
        .parse_default_env()
        .init();

    match std::fs::File::open(".env") {
        Ok(_) => envmnt::load_file(".env")?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            std::fs::File::create(".env")?;
            envmnt::load_file(".env")?;
        }
        Err(err) => {
            return Err(anyhow::anyhow!("Unable to open .env file: {err}"));
        }
    }

    if let Some(dir) = std::path::Path::new(STORAGE_PATH.as_str()).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).context("Unable to create storage directory")?;
        }
    }
    let conn = Connection::open(STORAGE_PATH.as_str()).await?;
    let products = Arc::new(SqliteProductRepository::init(conn.clone()).await?);
    let categories = Arc::new(SqliteCategoryRepository::init(conn.clone()).await?);
    let brands = Arc::new(SqliteBrandRepository::init(conn).await?);
    let registry: Arc<dyn SupplierRepository> =
        Arc::new(FileSystemSupplierRepository::new(SUPPLIERS_DIR.as_str()));

    let mut map = HeaderMap::new();
    map.insert(
        reqwest::header::ACCEPT_ENCODING,
        HeaderValue::from_static(DEFAULT_ACCEPT_ENCODING),
    );
    let client = reqwest::ClientBuilder::new()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .use_rustls_tls()
        .cookie_store(true)
        .default_headers(map)
        .build()?;

    let reconciler = Arc::new(Reconciler::new(
        products,
        categories,
        Arc::new(BrandCache::new(brands)),
        PriceEngine::new(PricingDefaults::from_env()),
        Arc::new(HttpImageFetcher::new(client.clone(), IMAGES_DIR.as_str())),
        Arc::new(LogNotifier),
        ProductLocks::default(),
        NotifySettings::from_env(),
    ));
    let fetcher = Fetcher::new(client, *FETCH_RETRIES);

    let args: Vec<String> = env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["purge-orphans"] => {
            let removed = reconciler.purge_orphans().await?;
            log::info!("Removed {removed} orphaned products");
            return Ok(());
        }
        ["import", supplier] => {
            let report =
                import_service::do_import(supplier, &fetcher, registry.as_ref(), &reconciler)
                    .await?;
            log::info!("{supplier}: {report}");
            return Ok(());
        }
        [] => (),
        other => return Err(anyhow::anyhow!("Unknown arguments: {other:?}")),
    }

    let suppliers = registry.list().await?;
    let import_service = ImportService::new(fetcher, suppliers, registry, reconciler).start();
    let console_service = import_service.clone();
    actix::spawn(async move {
        console(console_service)
            .await
            .log_error("Console closed");
    });

    signal::ctrl_c()
        .await
        .context("Unable to listen to shutdown")?;
    log::info!("Shutting down");
    drop(import_service);
    Ok(())
}

fn describe(import: &SupplierImport) -> String {
    let last_run = import
        .last_run
        .map(|t| t.to_string())
        .unwrap_or_else(|| "never".to_string());
    match &import.report {
        Some(report) => format!("{} (last run {last_run}): {report}", import.status),
        None => format!("{} (last run {last_run})", import.status),
    }
}

/// Reads `start <supplier>`, `status` and `status <supplier>` commands from stdin.
async fn console(service: Addr<ImportService>) -> Result<(), anyhow::Error> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.split_whitespace().collect::<Vec<_>>().as_slice() {
            ["start", supplier] => {
                if !service.send(Start(supplier.to_string())).await? {
                    log::warn!("Unknown supplier {supplier}");
                }
            }
            ["status"] => {
                for (name, import) in service.send(GetAllStatus).await? {
                    log::info!("{name}: {}", describe(&import));
                }
            }
            ["status", supplier] => match service.send(GetStatus(supplier.to_string())).await? {
                Some(import) => log::info!("{supplier}: {}", describe(&import)),
                None => log::warn!("Unknown supplier {supplier}"),
            },
            [] => (),
            _ => log::warn!("Unknown command: {line}"),
        }
    }
    Ok(())
}
