use crate::field_map::{fields, CanonicalRecord, FieldMapping, FieldPath};
use log_error::LogError;
use serde_json::Value;
use std::collections::HashMap;
use sync_types::category::Polarity;
use sync_types::stock::StockMap;
use sync_types::supplier::{CategoryFilter, FilterOptions};

/// Predicate pipeline applied to a raw supplier batch before reconciliation.
pub struct ProductFilter<'a> {
    options: &'a FilterOptions,
    stock_map: &'a StockMap,
    image_fields: Vec<FieldPath>,
}

impl<'a> ProductFilter<'a> {
    pub fn new(options: &'a FilterOptions, stock_map: &'a StockMap) -> Self {
        let image_fields = options
            .custom_image_fields
            .iter()
            .filter_map(|f| FieldPath::parse(f).log_error("Invalid custom image field"))
            .collect();
        Self {
            options,
            stock_map,
            image_fields,
        }
    }

    pub fn apply(&self, batch: Vec<Value>, mapping: &FieldMapping) -> Vec<Value> {
        let records: Vec<_> = batch.into_iter().map(|raw| (mapping.map(&raw), raw)).collect();
        let mut mpn_count: HashMap<String, usize> = HashMap::new();
        if self.options.unique {
            for mpn in records.iter().filter_map(|(r, _)| mpn_key(r)) {
                *mpn_count.entry(mpn).or_default() += 1;
            }
        }
        records
            .into_iter()
            .filter(|(rec, raw)| {
                self.stock_eligible(rec)
                    && self.price_in_range(rec)
                    && self.category_admitted(rec)
                    && self.has_image(rec, raw)
                    && mpn_key(rec).map_or(true, |m| mpn_count.get(&m).map_or(true, |c| *c < 2))
            })
            .map(|(_, raw)| raw)
            .collect()
    }

    /// Quantity and stock-level signals are combined with AND when both are
    /// present. Orderable-later statuses allowed for import skip the quantity check.
    pub fn stock_eligible(&self, rec: &CanonicalRecord) -> bool {
        let entry = rec
            .text(fields::STOCK_LEVEL)
            .filter(|_| !self.stock_map.is_empty())
            .map(|l| self.stock_map.get(&l));
        if let Some(Some(e)) = entry {
            if e.allow_import && e.translated_status.bypasses_quantity() {
                return true;
            }
        }
        let by_level = entry.map(|e| e.is_some_and(|e| e.allow_import));
        let by_quantity = rec
            .integer(fields::QUANTITY)
            .filter(|_| self.options.has_quantity)
            .map(|q| q >= self.options.min_quantity);
        match (by_quantity, by_level) {
            (None, None) => true,
            (Some(q), None) => q,
            (None, Some(l)) => l,
            (Some(q), Some(l)) => q && l,
        }
    }

    pub fn price_in_range(&self, rec: &CanonicalRecord) -> bool {
        rec.decimal(fields::WHOLESALE)
            .or_else(|| rec.decimal(fields::RETAIL_PRICE))
            .is_some_and(|p| p >= self.options.minimum_price && p <= self.options.maximum_price)
    }

    pub fn category_admitted(&self, rec: &CanonicalRecord) -> bool {
        let (tree, polarity) = match &self.options.category_filter {
            CategoryFilter::None => return true,
            CategoryFilter::Whitelist(t) => (t, Polarity::Admit),
            CategoryFilter::Blacklist(t) => (t, Polarity::Reject),
        };
        tree.passes(&category_path(rec), polarity)
    }

    pub fn has_image(&self, rec: &CanonicalRecord, raw: &Value) -> bool {
        if !self.options.require_image {
            return true;
        }
        if self.image_fields.is_empty() {
            return !rec.list(fields::IMAGE).is_empty();
        }
        self.image_fields
            .iter()
            .filter_map(|f| f.resolve(raw))
            .any(|v| match v {
                Value::Array(items) => !items.is_empty(),
                v => supplier_feeds::text_of(v).is_some(),
            })
    }
}

pub fn category_path(rec: &CanonicalRecord) -> [Option<String>; 3] {
    [
        rec.text(fields::CATEGORY),
        rec.text(fields::SUBCATEGORY),
        rec.text(fields::SUB2CATEGORY),
    ]
}

fn mpn_key(rec: &CanonicalRecord) -> Option<String> {
    rec.text(fields::MPN).map(|m| m.trim().to_lowercase())
}
