use crate::price::same_amount;
use crate::run::ImportRunContext;
use rust_decimal::Decimal;
use sync_types::product::{PricePoint, SupplierRecord};
use sync_types::StockStatus;
use time::OffsetDateTime;

/// What the reporting supplier sent for one product this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupplierSnapshot {
    pub supplier: String,
    pub wholesale: Decimal,
    pub retail_price: Option<Decimal>,
    pub quantity: Option<i64>,
    pub stock_level: Option<String>,
    pub supplier_product_id: Option<String>,
    pub supplier_product_url: Option<String>,
    pub discount: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub supplier_info: Vec<SupplierRecord>,
    pub change: Change,
    /// First supplier that made the product available again after every
    /// supplier had been unavailable.
    pub became_available: Option<String>,
}

fn is_available(r: &SupplierRecord) -> bool {
    r.in_stock && r.translated_status.map_or(true, |s| s.is_available())
}

/// Translated status wins over quantity, which wins over `false`.
pub fn derive_in_stock(translated: Option<StockStatus>, quantity: Option<i64>) -> bool {
    match translated {
        Some(s) => s.is_orderable(),
        None => quantity.is_some_and(|q| q > 0),
    }
}

fn price_point(s: &SupplierSnapshot, date: OffsetDateTime) -> PricePoint {
    PricePoint {
        date,
        wholesale: s.wholesale,
        retail_price: s.retail_price,
        discount: s.discount,
    }
}

fn same_optional(a: Option<Decimal>, b: Option<Decimal>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => same_amount(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Merges the reporting supplier's snapshot into a product's supplier records.
pub fn reconcile(
    existing: &[SupplierRecord],
    snapshot: &SupplierSnapshot,
    ctx: &ImportRunContext,
) -> ReconcileOutcome {
    let now = OffsetDateTime::now_utc();
    let was_available = existing.iter().any(is_available);
    let translated = snapshot
        .stock_level
        .as_deref()
        .and_then(|l| ctx.supplier.stock_map.translate(l));
    let mut supplier_info = existing.to_vec();

    let change = match supplier_info.iter_mut().find(|r| r.name == snapshot.supplier) {
        None => {
            let in_stock = snapshot.wholesale > Decimal::ZERO
                && derive_in_stock(translated, snapshot.quantity);
            supplier_info.push(SupplierRecord {
                name: snapshot.supplier.clone(),
                in_stock,
                quantity: snapshot.quantity,
                stock_level: snapshot.stock_level.clone(),
                translated_status: translated,
                wholesale: snapshot.wholesale,
                retail_price: snapshot.retail_price,
                initial_retail_price: snapshot.retail_price,
                supplier_product_id: snapshot.supplier_product_id.clone(),
                supplier_product_url: snapshot.supplier_product_url.clone(),
                discount: snapshot.discount,
                price_progress: vec![price_point(snapshot, now)],
            });
            Change::Created
        }
        Some(record) => {
            let before = record.clone();
            let restocked = record.wholesale <= Decimal::ZERO
                && snapshot.wholesale > Decimal::ZERO
                && translated.is_none()
                && snapshot.quantity.is_none();
            if !same_amount(record.wholesale, snapshot.wholesale)
                || !same_optional(record.retail_price, snapshot.retail_price)
            {
                record.price_progress.push(price_point(snapshot, now));
                record.wholesale = snapshot.wholesale;
                record.retail_price = snapshot.retail_price;
                record.discount = snapshot.discount;
                if record.initial_retail_price.is_none() {
                    record.initial_retail_price = snapshot.retail_price;
                }
            }
            if snapshot.supplier_product_url.is_some() {
                record.supplier_product_url = snapshot.supplier_product_url.clone();
            }
            if snapshot.supplier_product_id.is_some() {
                record.supplier_product_id = snapshot.supplier_product_id.clone();
            }
            record.quantity = snapshot.quantity;
            record.stock_level = snapshot.stock_level.clone();
            record.translated_status = translated;
            record.in_stock = if snapshot.wholesale <= Decimal::ZERO {
                false
            } else {
                restocked || derive_in_stock(translated, snapshot.quantity)
            };
            if *record == before {
                Change::Unchanged
            } else {
                Change::Updated
            }
        }
    };

    for r in supplier_info.iter_mut() {
        if r.in_stock && !ctx.is_active(&r.name) {
            log::info!("{}: supplier is no longer active, marking out of stock", r.name);
            r.in_stock = false;
        }
    }

    let became_available = if was_available {
        None
    } else {
        supplier_info
            .iter()
            .find(|r| is_available(r))
            .map(|r| r.name.clone())
    };

    ReconcileOutcome {
        supplier_info,
        change,
        became_available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{context, record, supplier};
    use rust_decimal_macros::dec;
    use sync_types::stock::{StockMap, StockMapEntry};

    fn snapshot(wholesale: Decimal) -> SupplierSnapshot {
        SupplierSnapshot {
            supplier: "a".to_string(),
            wholesale,
            retail_price: None,
            quantity: Some(3),
            stock_level: None,
            supplier_product_id: Some("A-1".to_string()),
            supplier_product_url: None,
            discount: None,
        }
    }

    fn ctx(others: &[&str]) -> ImportRunContext {
        let mut cfg = supplier("a");
        cfg.stock_map = StockMap::new([
            (
                "Διαθέσιμο",
                StockMapEntry {
                    translated_status: StockStatus::InStock,
                    allow_import: true,
                },
            ),
            (
                "Αναμένεται",
                StockMapEntry {
                    translated_status: StockStatus::IsExpected,
                    allow_import: true,
                },
            ),
            (
                "Μη διαθέσιμο",
                StockMapEntry {
                    translated_status: StockStatus::OutOfStock,
                    allow_import: false,
                },
            ),
        ]);
        context(cfg, others)
    }

    #[test]
    fn appends_new_supplier_record() {
        let out = reconcile(&[record("b", dec!(90), true)], &snapshot(dec!(100)), &ctx(&["b"]));
        assert_eq!(out.change, Change::Created);
        assert_eq!(out.supplier_info.len(), 2);
        let a = &out.supplier_info[1];
        assert!(a.in_stock);
        assert_eq!(a.price_progress.len(), 1);
        assert_eq!(out.became_available, None);
    }

    #[test]
    fn price_change_appends_history_once() {
        let ctx = ctx(&[]);
        let first = reconcile(&[], &snapshot(dec!(100)), &ctx).supplier_info;
        let same = reconcile(&first, &snapshot(dec!(100.001)), &ctx);
        assert_eq!(same.change, Change::Unchanged);
        assert_eq!(same.supplier_info[0].price_progress.len(), 1);

        let cheaper = reconcile(&first, &snapshot(dec!(50)), &ctx);
        assert_eq!(cheaper.change, Change::Updated);
        let rec = &cheaper.supplier_info[0];
        assert_eq!(rec.wholesale, dec!(50));
        assert_eq!(rec.price_progress.len(), 2);
        assert_eq!(rec.price_progress[0].wholesale, dec!(100));
        assert_eq!(cheaper.supplier_info.len(), 1);
    }

    #[test]
    fn translated_status_takes_precedence_over_quantity() {
        let ctx = ctx(&[]);
        let mut s = snapshot(dec!(10));
        s.stock_level = Some("μη διαθέσιμο".to_string());
        s.quantity = Some(7);
        assert!(!reconcile(&[], &s, &ctx).supplier_info[0].in_stock);

        s.stock_level = Some("Αναμένεται".to_string());
        s.quantity = Some(0);
        let out = reconcile(&[], &s, &ctx);
        assert!(out.supplier_info[0].in_stock);
        assert_eq!(out.supplier_info[0].translated_status, Some(StockStatus::IsExpected));

        s.stock_level = None;
        s.quantity = None;
        assert!(!reconcile(&[], &s, &ctx).supplier_info[0].in_stock);
    }

    #[test]
    fn zero_wholesale_transitions() {
        let ctx = ctx(&[]);
        let mut s = snapshot(dec!(0));
        let out = reconcile(&[record("a", dec!(40), true)], &s, &ctx);
        assert!(!out.supplier_info[0].in_stock);

        s.wholesale = dec!(40);
        s.quantity = None;
        let out = reconcile(&out.supplier_info, &s, &ctx);
        assert!(out.supplier_info[0].in_stock);
    }

    #[test]
    fn inactive_suppliers_are_forced_out_of_stock() {
        let existing = [record("gone", dec!(80), true)];
        let out = reconcile(&existing, &snapshot(dec!(100)), &ctx(&[]));
        assert!(!out.supplier_info[0].in_stock);
        assert!(out.supplier_info[1].in_stock);
    }

    #[test]
    fn availability_edge_fires_once() {
        let ctx = ctx(&["b"]);
        let existing = [record("b", dec!(80), false)];
        let out = reconcile(&existing, &snapshot(dec!(100)), &ctx);
        assert_eq!(out.became_available.as_deref(), Some("a"));
        let again = reconcile(&out.supplier_info, &snapshot(dec!(100)), &ctx);
        assert_eq!(again.became_available, None);
    }
}
