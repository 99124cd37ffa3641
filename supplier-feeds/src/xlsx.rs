use calamine::{open_workbook_auto, Reader};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use sync_types::supplier::CrossReference;

/// Reads a sheet (the first one when `sheet` is `None`) into one object per row,
/// keyed by the header row.
pub fn read_sheet<P: AsRef<Path>>(path: P, sheet: Option<&str>) -> Result<Vec<Value>, anyhow::Error> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path)
        .map_err(|err| anyhow::anyhow!("Unable to open {}: {err}", path.display()))?;
    let sheet_name = match sheet {
        Some(s) => s.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{} has no sheets", path.display()))?,
    };
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|err| anyhow::anyhow!("Unable to read sheet {sheet_name}: {err}"))?;
    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(r) => r.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => return Ok(vec![]),
    };
    let mut res = vec![];
    for row in rows {
        let record: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, c)| (h.clone(), Value::String(c.to_string().trim().to_string())))
            .collect();
        if record.values().all(|v| v.as_str().is_some_and(str::is_empty)) {
            continue;
        }
        res.push(Value::Object(record));
    }
    Ok(res)
}

/// Joins the rows of a secondary sheet onto the primary rows.
/// Fields already present and non-empty in a primary row are kept.
pub fn cross_reference(mut primary: Vec<Value>, secondary: Vec<Value>, xref: &CrossReference) -> Vec<Value> {
    let index: HashMap<String, Map<String, Value>> = secondary
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(m) => Some(m),
            _ => None,
        })
        .filter_map(|m| {
            let key = m.get(&xref.key_column)?.as_str()?.trim().to_string();
            (!key.is_empty()).then_some((key, m))
        })
        .collect();
    for row in primary.iter_mut() {
        let Value::Object(row) = row else { continue };
        let Some(extra) = row
            .get(&xref.foreign_column)
            .and_then(Value::as_str)
            .and_then(|k| index.get(k.trim()))
        else {
            continue;
        };
        for (k, v) in extra {
            let empty = row
                .get(k)
                .map(|v| v.as_str().is_some_and(str::is_empty))
                .unwrap_or(true);
            if empty {
                row.insert(k.clone(), v.clone());
            }
        }
    }
    primary
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn write_book(path: &Path) {
        let mut workbook = Workbook::new();
        let products = workbook.add_worksheet();
        products.set_name("Products").unwrap();
        products.write_string(0, 0, "Code").unwrap();
        products.write_string(0, 1, "Name").unwrap();
        products.write_string(0, 2, "Price").unwrap();
        products.write_string(1, 0, "K-100").unwrap();
        products.write_string(1, 1, "Keyboard").unwrap();
        products.write_number(1, 2, 12.5).unwrap();
        products.write_string(2, 0, "M-200").unwrap();
        products.write_string(2, 1, "Mouse").unwrap();
        products.write_number(2, 2, 7.0).unwrap();
        let stock = workbook.add_worksheet();
        stock.set_name("Stock").unwrap();
        stock.write_string(0, 0, "Item").unwrap();
        stock.write_string(0, 1, "Qty").unwrap();
        stock.write_string(1, 0, "M-200").unwrap();
        stock.write_number(1, 1, 4.0).unwrap();
        workbook.save(path).unwrap();
    }

    #[test]
    fn reads_and_joins_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.xlsx");
        write_book(&path);

        let primary = read_sheet(&path, None).unwrap();
        assert_eq!(primary.len(), 2);
        assert_eq!(primary[0]["Name"], "Keyboard");
        assert_eq!(primary[0]["Price"], "12.5");

        let secondary = read_sheet(&path, Some("Stock")).unwrap();
        let xref = CrossReference {
            path: path.display().to_string(),
            sheet: Some("Stock".to_string()),
            key_column: "Item".to_string(),
            foreign_column: "Code".to_string(),
        };
        let joined = cross_reference(primary, secondary, &xref);
        assert_eq!(joined[1]["Qty"], "4");
        assert!(joined[0].get("Qty").is_none());
    }
}
