use crate::generic::GenericAdapter;
use crate::{items_at, parse_decimal, text_of, Fetcher, SupplierAdapter};
use async_trait::async_trait;
use lazy_regex::regex_captures;
use rust_decimal::Decimal;
use serde_json::Value;

/// Telehermes JSON catalogue. Specs come as `{name, value}` pairs and the
/// weight is only stated inside the description text.
pub struct Telehermes {
    inner: GenericAdapter,
}

impl Telehermes {
    pub fn new(inner: GenericAdapter) -> Self {
        Self { inner }
    }
}

/// Finds a weight like `Βάρος: 350 g` or `Weight 1.2kg`, converted to kilograms.
pub fn weight_from_text(text: &str) -> Option<Decimal> {
    let (_, value, unit) = regex_captures!(
        r"(?:βάρος|weight)\s*[:=]?\s*(\d+(?:[.,]\d+)?)\s*(kg|gr|g|γρ|κιλ)"i,
        text
    )?;
    let value = parse_decimal(value)?;
    match unit.to_lowercase().as_str() {
        "g" | "gr" | "γρ" => Some(value / Decimal::ONE_THOUSAND),
        _ => Some(value),
    }
}

#[async_trait]
impl SupplierAdapter for Telehermes {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self, fetcher: &Fetcher) -> Result<Vec<Value>, anyhow::Error> {
        self.inner.fetch(fetcher).await
    }

    fn characteristics(&self, raw: &Value) -> Vec<(String, String)> {
        items_at(raw, "specs")
            .iter()
            .filter_map(|s| Some((s.get("name").and_then(text_of)?, s.get("value").and_then(text_of)?)))
            .collect()
    }

    fn images(&self, raw: &Value) -> Vec<String> {
        items_at(raw, "images")
            .iter()
            .filter_map(|i| i.get("url").and_then(text_of).or_else(|| text_of(i)))
            .collect()
    }

    fn weight(&self, raw: &Value) -> Option<Decimal> {
        raw.get("description")
            .and_then(Value::as_str)
            .and_then(weight_from_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use sync_types::supplier::FeedSource;

    #[test]
    fn mines_weight_from_description() {
        assert_eq!(weight_from_text("Router AX3000. Βάρος: 350 g, λευκό"), Some(dec!(0.35)));
        assert_eq!(weight_from_text("Weight 1,2kg"), Some(dec!(1.2)));
        assert_eq!(weight_from_text("Διαστάσεις 10x20cm"), None);
    }

    #[test]
    fn reads_specs_and_images() {
        let a = Telehermes::new(GenericAdapter::new(
            "telehermes".to_string(),
            FeedSource::Json {
                url: "https://example.com/api".to_string(),
                items_path: "items".to_string(),
                method: Default::default(),
                body: None,
            },
        ));
        let raw = json!({
            "sku": "TH-1",
            "description": "Switch 8 ports, weight: 800gr",
            "specs": [{"name": "Ports", "value": "8"}, {"name": "PoE", "value": ""}],
            "images": ["https://cdn/1.jpg", {"url": "https://cdn/2.jpg"}]
        });
        assert_eq!(a.characteristics(&raw), vec![("Ports".to_string(), "8".to_string())]);
        assert_eq!(a.images(&raw).len(), 2);
        assert_eq!(a.weight(&raw), Some(dec!(0.8)));
    }
}
