use sync_types::product::{Product, SupplierRecord};
use sync_types::{ProductStatus, StockStatus};
use time::OffsetDateTime;

pub fn is_brand_excluded(brand: Option<&str>, exclusions: &[String]) -> bool {
    brand.is_some_and(|b| exclusions.iter().any(|e| e.trim().eq_ignore_ascii_case(b.trim())))
}

pub fn derive_status(
    inventory: i64,
    supplier_info: &[SupplierRecord],
    brand: Option<&str>,
    brand_exclusions: &[String],
) -> ProductStatus {
    if inventory > 0 {
        return ProductStatus::InStock;
    }
    if supplier_info.is_empty() || is_brand_excluded(brand, brand_exclusions) {
        return ProductStatus::Discontinued;
    }
    let mut in_stock = supplier_info.iter().filter(|r| r.in_stock).peekable();
    if in_stock.peek().is_none() {
        return ProductStatus::OutOfStock;
    }
    let full = in_stock.any(|r| {
        matches!(
            r.translated_status,
            None | Some(StockStatus::InStock) | Some(StockStatus::MediumStock)
        )
    });
    if full {
        ProductStatus::InStock
    } else {
        ProductStatus::LowStock
    }
}

/// Sets the status and derives `deleted_at` from it. Must run after every
/// other change to the product so the timestamp follows the final status.
pub fn apply_status(product: &mut Product, status: ProductStatus, now: OffsetDateTime) {
    product.status = status;
    product.deleted_at = if status.is_deleted() {
        product.deleted_at.or(Some(now))
    } else {
        None
    };
}
