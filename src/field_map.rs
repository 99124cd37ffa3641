use crate::price::format_price;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use supplier_feeds::text_of;

/// Canonical field names a supplier's `field_map` may target.
pub mod fields {
    pub const NAME: &str = "name";
    pub const MPN: &str = "mpn";
    pub const BARCODE: &str = "barcode";
    pub const MODEL: &str = "model";
    pub const BRAND: &str = "brand";
    pub const CATEGORY: &str = "category";
    pub const SUBCATEGORY: &str = "subcategory";
    pub const SUB2CATEGORY: &str = "sub2category";
    pub const WHOLESALE: &str = "wholesale";
    pub const RETAIL_PRICE: &str = "retail_price";
    pub const RECYCLE_TAX: &str = "recycle_tax";
    pub const DISCOUNT: &str = "discount";
    pub const QUANTITY: &str = "quantity";
    pub const STOCK_LEVEL: &str = "stock_level";
    pub const IMAGE: &str = "image";
    pub const WEIGHT: &str = "weight";
    pub const LENGTH: &str = "length";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const SUPPLIER_PRODUCT_ID: &str = "supplier_product_id";
    pub const SUPPLIER_PRODUCT_URL: &str = "supplier_product_url";
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Index(usize),
    Key(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(Vec<Segment>);

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, anyhow::Error> {
        if path.trim().is_empty() {
            return Err(anyhow::anyhow!("Empty field path"));
        }
        path.split('.')
            .map(|s| match s.trim() {
                "" => Err(anyhow::anyhow!("Empty segment in field path {path:?}")),
                s => Ok(s
                    .parse::<usize>()
                    .map(Segment::Index)
                    .unwrap_or_else(|_| Segment::Key(s.to_string()))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(FieldPath)
    }

    pub fn resolve<'a>(&self, raw: &'a Value) -> Option<&'a Value> {
        let mut current = raw;
        for segment in self.0.iter() {
            current = match (segment, current) {
                (Segment::Index(i), Value::Array(items)) => items.get(*i)?,
                (Segment::Index(i), Value::Object(map)) => map.get(&i.to_string())?,
                (Segment::Key(k), v) => match unwrap_single(v) {
                    Value::Object(map) => map.get(k)?,
                    _ => return None,
                },
                _ => return None,
            };
        }
        match unwrap_single(current) {
            Value::Null => None,
            Value::Array(items) if items.is_empty() => None,
            v => Some(v),
        }
    }
}

fn unwrap_single(v: &Value) -> &Value {
    match v {
        Value::Array(items) if items.len() == 1 => &items[0],
        v => v,
    }
}

/// Validated `canonical name → path` map of one supplier.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldMapping {
    paths: HashMap<String, FieldPath>,
}

impl TryFrom<&HashMap<String, String>> for FieldMapping {
    type Error = anyhow::Error;

    fn try_from(map: &HashMap<String, String>) -> Result<Self, Self::Error> {
        let paths = map
            .iter()
            .map(|(k, v)| {
                FieldPath::parse(v)
                    .map(|p| (k.trim().to_string(), p))
                    .map_err(|err| anyhow::anyhow!("Invalid mapping of {k}: {err}"))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        if !paths.contains_key(fields::NAME) {
            return Err(anyhow::anyhow!("Field map has no `{}` entry", fields::NAME));
        }
        Ok(Self { paths })
    }
}

impl FieldMapping {
    pub fn map(&self, raw: &Value) -> CanonicalRecord {
        CanonicalRecord {
            fields: self
                .paths
                .iter()
                .filter_map(|(k, p)| Some((k.clone(), p.resolve(raw)?.clone())))
                .collect(),
        }
    }
}

/// A raw record seen through a [`FieldMapping`]. Values are not coerced until read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanonicalRecord {
    fields: HashMap<String, Value>,
}

impl CanonicalRecord {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::Bool(b) => Some(b.to_string()),
            v => text_of(v),
        }
    }

    pub fn decimal(&self, name: &str) -> Option<Decimal> {
        self.text(name).and_then(|s| format_price(&s))
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        let s = self.text(name)?;
        s.trim()
            .parse::<i64>()
            .ok()
            .or_else(|| format_price(&s).and_then(|d| d.trunc().to_i64()))
    }

    pub fn list(&self, name: &str) -> Vec<String> {
        match self.get(name) {
            Some(Value::Array(items)) => items.iter().filter_map(text_of).collect(),
            Some(v) => text_of(v).into_iter().collect(),
            None => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn mapping(pairs: &[(&str, &str)]) -> FieldMapping {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FieldMapping::try_from(&map).unwrap()
    }

    #[test]
    fn resolves_xml_shaped_record() {
        let raw = json!({
            "title": ["Router AX3000"],
            "prices": [{ "wholesale": ["1.234,56"] }],
            "stock": [{ "@qty": "12" }],
            "images": [{ "image": ["https://cdn/1.jpg", "https://cdn/2.jpg"] }],
            "ean": [null]
        });
        let rec = mapping(&[
            ("name", "title"),
            ("wholesale", "prices.wholesale"),
            ("quantity", "stock.@qty"),
            ("image", "images.image"),
            ("barcode", "ean"),
            ("mpn", "codes.mpn"),
        ])
        .map(&raw);
        assert_eq!(rec.text(fields::NAME), Some("Router AX3000".to_string()));
        assert_eq!(rec.decimal(fields::WHOLESALE), Some(dec!(1234.56)));
        assert_eq!(rec.integer(fields::QUANTITY), Some(12));
        assert_eq!(rec.list(fields::IMAGE).len(), 2);
        assert_eq!(rec.text(fields::BARCODE), None);
        assert_eq!(rec.text(fields::MPN), None);
    }

    #[test]
    fn numeric_segment_indexes_arrays() {
        let raw = json!({ "images": ["a.jpg", "b.jpg"], "tags": [["x", "y"]], "n": 5 });
        let rec = mapping(&[("name", "n"), ("image", "images.1"), ("model", "tags.name")]).map(&raw);
        assert_eq!(rec.text(fields::IMAGE), Some("b.jpg".to_string()));
        assert_eq!(rec.text(fields::NAME), Some("5".to_string()));
        assert_eq!(rec.get(fields::MODEL), None);
    }

    #[test]
    fn rejects_invalid_paths() {
        let bad = HashMap::from([("name".to_string(), "title..x".to_string())]);
        assert!(FieldMapping::try_from(&bad).is_err());
        let empty = HashMap::from([("name".to_string(), " ".to_string())]);
        assert!(FieldMapping::try_from(&empty).is_err());
        let no_name = HashMap::from([("mpn".to_string(), "code".to_string())]);
        assert!(FieldMapping::try_from(&no_name).is_err());
    }
}
