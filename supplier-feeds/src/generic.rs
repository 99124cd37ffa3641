use crate::{csv, html, items_at, xlsx, xml, Fetcher, SupplierAdapter};
use async_trait::async_trait;
use serde_json::Value;
use sync_types::supplier::{CrossReference, FeedSource};

/// Adapter driven entirely by the configured [`FeedSource`].
#[derive(Clone, Debug)]
pub struct GenericAdapter {
    name: String,
    source: FeedSource,
}

impl GenericAdapter {
    pub fn new(name: String, source: FeedSource) -> Self {
        Self { name, source }
    }

    pub fn source(&self) -> &FeedSource {
        &self.source
    }

    /// Turns an already downloaded document into raw records.
    pub fn parse(&self, body: &str) -> Result<Vec<Value>, anyhow::Error> {
        match &self.source {
            FeedSource::Xml { items_path, .. } => Ok(items_at(&xml::to_value(body)?, items_path)),
            FeedSource::Json { items_path, .. } => {
                Ok(items_at(&serde_json::from_str(body)?, items_path))
            }
            FeedSource::Csv { delimiter, .. } => csv::to_records(body, *delimiter),
            FeedSource::Html {
                item_selector,
                fields,
                ..
            } => html::scrape(body, item_selector, fields),
            FeedSource::Excel { .. } => Err(anyhow::anyhow!("Excel feeds are read from files")),
        }
    }
}

async fn read_excel(
    path: String,
    sheet: Option<String>,
    xref: Option<CrossReference>,
) -> Result<Vec<Value>, anyhow::Error> {
    tokio::task::spawn_blocking(move || {
        let primary = xlsx::read_sheet(&path, sheet.as_deref())?;
        match xref {
            Some(xref) => {
                let secondary = xlsx::read_sheet(&xref.path, xref.sheet.as_deref())?;
                Ok(xlsx::cross_reference(primary, secondary, &xref))
            }
            None => Ok(primary),
        }
    })
    .await?
}

#[async_trait]
impl SupplierAdapter for GenericAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, fetcher: &Fetcher) -> Result<Vec<Value>, anyhow::Error> {
        let body = match &self.source {
            FeedSource::Excel {
                path,
                sheet,
                cross_reference,
            } => return read_excel(path.clone(), sheet.clone(), cross_reference.clone()).await,
            FeedSource::Json {
                url, method, body, ..
            } => fetcher.request(url, *method, body.as_ref()).await?,
            FeedSource::Xml { url, .. } | FeedSource::Csv { url, .. } | FeedSource::Html { url, .. } => {
                fetcher.text(url).await?
            }
        };
        let records = self.parse(&body)?;
        log::info!("{}: fetched {} raw records", self.name, records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::supplier::HttpMethod;

    #[test]
    fn parses_json_items() {
        let adapter = GenericAdapter::new(
            "telehermes".to_string(),
            FeedSource::Json {
                url: "https://example.com/api".to_string(),
                items_path: "data.items".to_string(),
                method: HttpMethod::Post,
                body: None,
            },
        );
        let rows = adapter
            .parse(r#"{"data":{"items":[{"sku":"1"},{"sku":"2"},{"sku":"3"}]}}"#)
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2]["sku"], "3");
    }

    #[test]
    fn malformed_feed_is_an_error() {
        let adapter = GenericAdapter::new(
            "x".to_string(),
            FeedSource::Xml {
                url: "https://example.com/feed.xml".to_string(),
                items_path: "products.product".to_string(),
            },
        );
        assert!(adapter.parse("<products><product></products>").is_err());
    }
}
