use std::collections::{HashMap, HashSet};
use sync_types::product::ProdChar;

/// Key of the value table applied to every characteristic.
pub const GLOBAL_VALUES: &str = "*";

fn lowercase_keys(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect()
}

/// Rewrites supplier characteristic names and values through the supplier's
/// translation tables.
pub struct CharacteristicNormalizer {
    names: HashMap<String, String>,
    values: HashMap<String, HashMap<String, String>>,
    global: HashMap<String, String>,
}

impl CharacteristicNormalizer {
    pub fn new(
        names: &HashMap<String, String>,
        values: &HashMap<String, HashMap<String, String>>,
    ) -> Self {
        Self {
            names: lowercase_keys(names),
            values: values
                .iter()
                .filter(|(k, _)| k.as_str() != GLOBAL_VALUES)
                .map(|(k, v)| (k.trim().to_lowercase(), lowercase_keys(v)))
                .collect(),
            global: values.get(GLOBAL_VALUES).map(lowercase_keys).unwrap_or_default(),
        }
    }

    pub fn normalize<I>(&self, raw: I) -> Vec<ProdChar>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut seen = HashSet::new();
        raw.into_iter()
            .filter_map(|(name, value)| {
                let name = name.trim();
                let name = self
                    .names
                    .get(&name.to_lowercase())
                    .cloned()
                    .unwrap_or_else(|| name.to_string());
                let value = value.trim();
                let key = value.to_lowercase();
                let value = self
                    .values
                    .get(&name.to_lowercase())
                    .and_then(|t| t.get(&key))
                    .or_else(|| self.global.get(&key))
                    .cloned()
                    .unwrap_or_else(|| value.to_string());
                if name.is_empty() || value.is_empty() || !seen.insert(name.to_lowercase()) {
                    return None;
                }
                Some(ProdChar { name, value })
            })
            .collect()
    }
}
