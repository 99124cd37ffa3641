use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};
use std::collections::HashMap;
use sync_types::supplier::HtmlField;

fn selector(s: &str) -> Result<Selector, anyhow::Error> {
    Selector::parse(s).map_err(|err| anyhow::anyhow!("Invalid selector {s:?}: {err}"))
}

fn extract(e: ElementRef, attr: Option<&str>) -> Option<String> {
    let v = match attr {
        Some(a) => e.attr(a)?.trim().to_string(),
        None => e.text().collect::<Vec<_>>().join(" ").trim().to_string(),
    };
    (!v.is_empty()).then_some(v)
}

/// Scrapes one record per `item_selector` match from a listing page.
pub fn scrape(
    page: &str,
    item_selector: &str,
    fields: &HashMap<String, HtmlField>,
) -> Result<Vec<Value>, anyhow::Error> {
    let document = Html::parse_document(page);
    let item = selector(item_selector)?;
    let fields = fields
        .iter()
        .map(|(name, f)| Ok((name, f, selector(&f.selector)?)))
        .collect::<Result<Vec<_>, anyhow::Error>>()?;
    let mut res = vec![];
    for e in document.select(&item) {
        let mut record = Map::new();
        for (name, field, sel) in fields.iter() {
            let mut values = e.select(sel).filter_map(|x| extract(x, field.attr.as_deref()));
            let value = if field.multiple {
                Value::Array(values.map(Value::String).collect())
            } else {
                match values.next() {
                    Some(v) => Value::String(v),
                    None => continue,
                }
            };
            record.insert(name.to_string(), value);
        }
        if !record.is_empty() {
            res.push(Value::Object(record));
        }
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrapes_listing() {
        let page = r#"<html><body><ul>
            <li class="item"><a class="title" href="/p/1">Router AX3000</a>
                <span class="price">89,90</span>
                <img src="/img/1a.jpg"><img src="/img/1b.jpg"></li>
            <li class="item"><a class="title" href="/p/2">Switch 8p</a></li>
        </ul></body></html>"#;
        let fields = HashMap::from([
            (
                "name".to_string(),
                HtmlField { selector: ".title".to_string(), attr: None, multiple: false },
            ),
            (
                "url".to_string(),
                HtmlField { selector: ".title".to_string(), attr: Some("href".to_string()), multiple: false },
            ),
            (
                "price".to_string(),
                HtmlField { selector: ".price".to_string(), attr: None, multiple: false },
            ),
            (
                "images".to_string(),
                HtmlField { selector: "img".to_string(), attr: Some("src".to_string()), multiple: true },
            ),
        ]);
        let rows = scrape(page, "li.item", &fields).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Router AX3000");
        assert_eq!(rows[0]["url"], "/p/1");
        assert_eq!(rows[0]["images"].as_array().map(Vec::len), Some(2));
        assert!(rows[1].get("price").is_none());
    }

    #[test]
    fn invalid_selector_is_an_error() {
        assert!(scrape("<html></html>", "li[", &HashMap::new()).is_err());
    }
}
