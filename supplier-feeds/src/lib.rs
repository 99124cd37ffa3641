#![deny(clippy::unwrap_used)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use sync_types::supplier::{AdapterKind, SupplierConfig};

pub mod csv;
pub mod fetch;
pub mod generic;
pub mod html;
pub mod oktabit;
pub mod telehermes;
pub mod xlsx;
pub mod xml;

pub use fetch::Fetcher;

/// Supplier specific access to a feed.
///
/// Fetching produces raw nested records; the declarative field map covers the
/// regular fields, while the extraction hooks cover shapes too irregular to map.
#[async_trait]
pub trait SupplierAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, fetcher: &Fetcher) -> Result<Vec<Value>, anyhow::Error>;

    fn characteristics(&self, _raw: &Value) -> Vec<(String, String)> {
        vec![]
    }

    fn images(&self, _raw: &Value) -> Vec<String> {
        vec![]
    }

    fn weight(&self, _raw: &Value) -> Option<Decimal> {
        None
    }
}

pub fn adapter_for(config: &SupplierConfig) -> Box<dyn SupplierAdapter> {
    let generic = generic::GenericAdapter::new(config.name.clone(), config.source.clone());
    match config.adapter {
        AdapterKind::Generic => Box::new(generic),
        AdapterKind::Oktabit => Box::new(oktabit::Oktabit::new(generic)),
        AdapterKind::Telehermes => Box::new(telehermes::Telehermes::new(generic)),
    }
}

/// Collects the records found under a dotted path, flattening arrays met on the way.
pub fn items_at(root: &Value, path: &str) -> Vec<Value> {
    let mut current = vec![root];
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = current
            .into_iter()
            .flat_map(|v| children(v, segment))
            .collect();
    }
    current
        .into_iter()
        .flat_map(|v| match v {
            Value::Array(items) => items.clone(),
            Value::Null => vec![],
            other => vec![other.clone()],
        })
        .collect()
}

fn children<'a>(v: &'a Value, segment: &str) -> Vec<&'a Value> {
    match v {
        Value::Array(items) => items.iter().flat_map(|i| children(i, segment)).collect(),
        Value::Object(map) => match map.get(segment) {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(other) => vec![other],
            None => vec![],
        },
        _ => vec![],
    }
}

/// Text of a scalar, or of the `$text` of an XML element object.
pub fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) if items.len() == 1 => text_of(&items[0]),
        Value::Object(map) => map.get("$text").and_then(text_of),
        _ => None,
    }
}

pub(crate) fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(&s.trim().replace(',', ".")).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collects_items_through_wrapped_arrays() {
        let root = json!({
            "products": [{
                "product": [
                    { "mpn": ["A1"] },
                    { "mpn": ["B2"] }
                ]
            }]
        });
        let items = items_at(&root, "products.product");
        assert_eq!(items.len(), 2);
        assert_eq!(text_of(&items[1]["mpn"]), Some("B2".to_string()));
    }

    #[test]
    fn empty_path_returns_top_level_array() {
        let root = json!([{ "a": 1 }, { "a": 2 }]);
        assert_eq!(items_at(&root, "").len(), 2);
        assert!(items_at(&json!({ "data": null }), "data").is_empty());
    }
}
