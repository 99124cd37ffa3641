use crate::generic::GenericAdapter;
use crate::{items_at, parse_decimal, text_of, Fetcher, SupplierAdapter};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;

/// Oktabit XML feed. Characteristics live under `<attributes>` either as
/// `<attribute name="..">value</attribute>` or with nested `<name>`/`<value>`.
pub struct Oktabit {
    inner: GenericAdapter,
}

impl Oktabit {
    pub fn new(inner: GenericAdapter) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl SupplierAdapter for Oktabit {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self, fetcher: &Fetcher) -> Result<Vec<Value>, anyhow::Error> {
        self.inner.fetch(fetcher).await
    }

    fn characteristics(&self, raw: &Value) -> Vec<(String, String)> {
        items_at(raw, "attributes.attribute")
            .iter()
            .filter_map(|a| {
                let name = a
                    .get("@name")
                    .and_then(text_of)
                    .or_else(|| a.get("name").and_then(text_of))?;
                let value = a.get("value").and_then(text_of).or_else(|| text_of(a))?;
                Some((name, value))
            })
            .collect()
    }

    fn images(&self, raw: &Value) -> Vec<String> {
        items_at(raw, "images.image")
            .iter()
            .filter_map(|i| i.get("@url").and_then(text_of).or_else(|| text_of(i)))
            .collect()
    }

    fn weight(&self, raw: &Value) -> Option<Decimal> {
        raw.get("weight").and_then(text_of).and_then(|w| parse_decimal(&w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sync_types::supplier::FeedSource;

    fn adapter() -> Oktabit {
        Oktabit::new(GenericAdapter::new(
            "oktabit".to_string(),
            FeedSource::Xml {
                url: "https://example.com/oktabit.xml".to_string(),
                items_path: "products.product".to_string(),
            },
        ))
    }

    #[test]
    fn extracts_attributes_images_and_weight() {
        let feed = r#"<products><product>
            <code>1001</code>
            <weight>1,25</weight>
            <attributes>
                <attribute name="Χρώμα">Μαύρο</attribute>
                <attribute><name>Θύρες</name><value>8</value></attribute>
                <attribute name="Κενό"></attribute>
            </attributes>
            <images><image url="https://cdn/a.jpg"/><image>https://cdn/b.jpg</image></images>
        </product></products>"#;
        let a = adapter();
        let rows = a.inner.parse(feed).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(
            a.characteristics(&rows[0]),
            vec![
                ("Χρώμα".to_string(), "Μαύρο".to_string()),
                ("Θύρες".to_string(), "8".to_string())
            ]
        );
        assert_eq!(a.images(&rows[0]), vec!["https://cdn/a.jpg", "https://cdn/b.jpg"]);
        assert_eq!(a.weight(&rows[0]), Some(dec!(1.25)));
    }
}
