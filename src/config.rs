use anyhow::Context;
use async_trait::async_trait;
use log_error::LogError;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use sync_types::supplier::{SupplierConfig, SupplierRepository};
use sync_types::Platform;
use typesafe_repository::async_ops::{Get, List, Save};
use typesafe_repository::prelude::*;
use typesafe_repository::IdentityOf;

pub static SUPPLIERS_DIR: Lazy<String> =
    Lazy::new(|| envmnt::get_or("SUPPLIERS_DIR", "suppliers.d"));

pub static STORAGE_PATH: Lazy<String> = Lazy::new(|| envmnt::get_or("STORAGE_PATH", "storage.db"));

pub static IMAGES_DIR: Lazy<String> = Lazy::new(|| envmnt::get_or("IMAGES_DIR", "images"));

pub static FETCH_RETRIES: Lazy<usize> = Lazy::new(|| {
    envmnt::get_parse("FETCH_RETRIES")
        .ok()
        .filter(|v| *v > 0)
        .unwrap_or(supplier_feeds::fetch::DEFAULT_RETRIES)
});

fn decimal_var(key: &str, default: Decimal) -> Decimal {
    match envmnt::get_parse::<_, Decimal, _>(key) {
        Ok(v) => v,
        Err(envmnt::errors::EnvmntError::Missing(_)) => default,
        Err(err) => {
            log::warn!("Invalid value of {key}: {err}, using {default}");
            default
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlatformDefaults {
    pub percentage: Decimal,
    pub addon: Decimal,
}

/// Pricing fallbacks used when a category carries no percentage or addon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingDefaults {
    pub tax_rate: Decimal,
    pub platforms: HashMap<Platform, PlatformDefaults>,
}

impl PricingDefaults {
    pub fn new(tax_rate: Decimal) -> Self {
        Self {
            tax_rate,
            platforms: HashMap::new(),
        }
    }

    pub fn from_env() -> Self {
        let platforms = Platform::ALL
            .into_iter()
            .map(|p| {
                let prefix = p.to_string().to_uppercase();
                let defaults = PlatformDefaults {
                    percentage: decimal_var(&format!("DEFAULT_{prefix}_PERCENTAGE"), Decimal::ZERO),
                    addon: decimal_var(&format!("DEFAULT_{prefix}_ADDON"), Decimal::ZERO),
                };
                (p, defaults)
            })
            .collect();
        Self {
            tax_rate: decimal_var("TAX_RATE", Decimal::from(24)),
            platforms,
        }
    }

    pub fn platform(&self, platform: Platform) -> PlatformDefaults {
        self.platforms
            .get(&platform)
            .or_else(|| self.platforms.get(&Platform::General))
            .copied()
            .unwrap_or_default()
    }
}

/// Recipient and template of back-in-stock notices.
#[derive(Debug, Clone, Default)]
pub struct NotifySettings {
    pub template_id: Option<String>,
    pub email: Option<String>,
}

impl NotifySettings {
    pub fn from_env() -> Self {
        Self {
            template_id: envmnt::get_parse("NOTIFY_TEMPLATE_ID").ok(),
            email: envmnt::get_parse("NOTIFY_EMAIL").ok(),
        }
    }
}

/// Supplier configurations kept as `<name>.yml` files in one directory.
pub struct FileSystemSupplierRepository {
    dir: PathBuf,
}

impl FileSystemSupplierRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.yml"))
    }
}

fn read_supplier(path: &std::path::Path) -> Result<SupplierConfig, anyhow::Error> {
    let input = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&input).with_context(|| format!("Unable to parse {}", path.display()))
}

impl Repository<SupplierConfig> for FileSystemSupplierRepository {
    type Error = anyhow::Error;
}

#[async_trait]
impl Get<SupplierConfig> for FileSystemSupplierRepository {
    async fn get_one(
        &self,
        id: &IdentityOf<SupplierConfig>,
    ) -> Result<Option<SupplierConfig>, anyhow::Error> {
        match read_supplier(&self.path(id)) {
            Ok(cfg) => Ok(Some(cfg)),
            Err(err) => {
                if let Some(io_err) = err.downcast_ref::<std::io::Error>() {
                    if io_err.kind() == std::io::ErrorKind::NotFound {
                        return Ok(None);
                    }
                }
                Err(err)
            }
        }
    }
}

#[async_trait]
impl Save<SupplierConfig> for FileSystemSupplierRepository {
    async fn save(&self, cfg: SupplierConfig) -> Result<(), anyhow::Error> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path(&cfg.name), serde_yaml::to_string(&cfg)?).await?;
        Ok(())
    }
}

#[async_trait]
impl List<SupplierConfig> for FileSystemSupplierRepository {
    async fn list(&self) -> Result<Vec<SupplierConfig>, anyhow::Error> {
        let mut suppliers = vec![];
        let res = match std::fs::read_dir(&self.dir) {
            Ok(r) => r,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(err.into()),
        };
        for f in res {
            let path = f?.path();
            if !matches!(path.extension().and_then(|s| s.to_str()), Some("yml" | "yaml")) {
                continue;
            }
            if let Some(cfg) = read_supplier(&path).log_error("Skipping supplier configuration") {
                suppliers.push(cfg);
            }
        }
        suppliers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(suppliers)
    }
}

impl SupplierRepository for FileSystemSupplierRepository {}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sync_types::supplier::FeedSource;

    #[test]
    fn platform_defaults_fall_back_to_general() {
        let mut defaults = PricingDefaults::new(dec!(24));
        defaults.platforms.insert(
            Platform::General,
            PlatformDefaults {
                percentage: dec!(15),
                addon: dec!(1),
            },
        );
        assert_eq!(defaults.platform(Platform::Skroutz).percentage, dec!(15));
        assert_eq!(PricingDefaults::new(dec!(24)).platform(Platform::Shopflix), PlatformDefaults::default());
    }

    #[tokio::test]
    async fn stores_and_lists_yaml_configs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.yml"), "name: [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let repo = FileSystemSupplierRepository::new(dir.path());
        let cfg: SupplierConfig = serde_yaml::from_str(
            "name: oktabit\nsource:\n  type: xml\n  url: https://example.com/feed.xml\nfield_map:\n  name: title\n",
        )
        .unwrap();
        repo.save(cfg.clone()).await.unwrap();

        let listed = repo.list().await.unwrap();
        assert_eq!(listed, vec![cfg.clone()]);
        let loaded = repo.get_one(&"oktabit".to_string()).await.unwrap().unwrap();
        assert!(matches!(loaded.source, FeedSource::Xml { .. }));
        assert!(repo.get_one(&"missing".to_string()).await.unwrap().is_none());
    }
}
