use serde_json::{Map, Value};

/// Guesses the delimiter from the header line.
pub fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    [b',', b';', b'\t', b'|']
        .into_iter()
        .max_by_key(|d| header.bytes().filter(|b| b == d).count())
        .unwrap_or(b',')
}

/// Parses a CSV document with a header row into one object per row.
pub fn to_records(text: &str, delimiter: Option<char>) -> Result<Vec<Value>, anyhow::Error> {
    let text = text.trim_start_matches('\u{feff}');
    let delimiter = match delimiter {
        Some(d) if d.is_ascii() => d as u8,
        Some(d) => return Err(anyhow::anyhow!("Unsupported delimiter {d:?}")),
        None => sniff_delimiter(text),
    };
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(::csv::Trim::All)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();
    let mut res = vec![];
    for record in reader.records() {
        let record = record?;
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
            .collect();
        if row.values().any(|v| v.as_str().is_some_and(|s| !s.is_empty())) {
            res.push(Value::Object(row));
        }
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_semicolon_feed() {
        let text = "\u{feff}mpn;name;price\nA1; Router ;12,50\n;;\nB2;Switch;7\n";
        assert_eq!(sniff_delimiter(text.trim_start_matches('\u{feff}')), b';');
        let rows = to_records(text, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Router");
        assert_eq!(rows[1]["price"], "7");
    }

    #[test]
    fn explicit_delimiter_wins() {
        let rows = to_records("a|b\n1|2\n", Some('|')).unwrap();
        assert_eq!(rows[0]["b"], "2");
    }
}
