use crate::field_map::FieldMapping;
use crate::run::ImportRunContext;
use rust_decimal::Decimal;
use std::collections::HashMap;
use sync_types::supplier::SupplierConfig;
use sync_types::product::{make_slug, Product, SupplierRecord};
use sync_types::ProductStatus;
use uuid::Uuid;

pub fn record(name: &str, wholesale: Decimal, in_stock: bool) -> SupplierRecord {
    SupplierRecord {
        name: name.to_string(),
        in_stock,
        quantity: None,
        stock_level: None,
        translated_status: None,
        wholesale,
        retail_price: None,
        initial_retail_price: None,
        supplier_product_id: None,
        supplier_product_url: None,
        discount: None,
        price_progress: vec![],
    }
}

pub fn product(name: &str, mpn: &str) -> Product {
    Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        slug: make_slug(name, Some(mpn)),
        mpn: Some(mpn.to_string()),
        barcode: None,
        model: None,
        category: None,
        price: Decimal::ZERO,
        is_fixed_price: false,
        weight: None,
        length: None,
        width: None,
        height: None,
        status: ProductStatus::InStock,
        deleted_at: None,
        brand: None,
        prod_chars: vec![],
        platforms: vec![],
        supplier_info: vec![],
        related_import: vec![],
        inventory: 0,
        notice_if_available: false,
        images: vec![],
    }
}

pub fn supplier(name: &str) -> SupplierConfig {
    let mut cfg: SupplierConfig = serde_yaml::from_str(&format!(
        "name: {name}\nsource:\n  type: xml\n  url: https://example.com/{name}.xml\n  items_path: products.product\nfield_map:\n  name: title\n"
    ))
    .expect("valid supplier yaml");
    cfg.field_map = HashMap::from([
        ("name".to_string(), "title".to_string()),
        ("mpn".to_string(), "mpn".to_string()),
        ("barcode".to_string(), "ean".to_string()),
        ("wholesale".to_string(), "price".to_string()),
        ("retail_price".to_string(), "retail".to_string()),
        ("quantity".to_string(), "qty".to_string()),
        ("stock_level".to_string(), "availability".to_string()),
        ("category".to_string(), "cat".to_string()),
        ("subcategory".to_string(), "subcat".to_string()),
        ("sub2category".to_string(), "sub2cat".to_string()),
        ("brand".to_string(), "brand".to_string()),
        ("image".to_string(), "images.image".to_string()),
        ("weight".to_string(), "weight".to_string()),
        ("recycle_tax".to_string(), "rtax".to_string()),
    ]);
    cfg
}

/// Run context of `cfg` with `others` registered as active as well.
pub fn context(cfg: SupplierConfig, others: &[&str]) -> ImportRunContext {
    let mapping = FieldMapping::try_from(&cfg.field_map).expect("valid field map");
    let active = others.iter().map(|n| (n.to_string(), supplier(n))).collect();
    ImportRunContext::new(cfg, mapping, active)
}
