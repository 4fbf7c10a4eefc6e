//! On-disk JSON forms of a [`MarkupTable`].
//!
//! The extraction artifact maps `city -> item id -> markup`, the translated
//! artifact maps `city -> display name -> [markup, offset]`. Both are read
//! leniently: a per-item entry of the wrong shape is skipped, while a file
//! that is not a JSON object of objects fails the whole load.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::table::{MarkupEntry, MarkupTable};
use crate::{MarkupError, Result};

pub const EXTRACTED_MARKUPS_FILE: &str = "extracted_game_markups.json";
pub const TRANSLATED_MARKUPS_FILE: &str = "translated_game_markups.json";

/// Parses a table from JSON text, skipping malformed entries.
/// Returns the table and the number of skipped entries.
pub fn parse_table(text: &str, source: &Path) -> Result<(MarkupTable, usize)> {
    let root: Value = serde_json::from_str(text).map_err(|e| MarkupError::Json {
        path: source.to_path_buf(),
        source: e,
    })?;
    let Value::Object(cities) = root else {
        return Err(MarkupError::Config(format!(
            "{}: expected a JSON object keyed by city name",
            source.display()
        )));
    };

    let mut table = MarkupTable::new();
    let mut skipped = 0usize;
    for (city, items) in cities {
        let Value::Object(items) = items else {
            tracing::warn!(city = %city, "city entry is not an object, skipping");
            skipped += 1;
            continue;
        };
        let mut parsed = BTreeMap::new();
        for (item, raw) in items {
            match serde_json::from_value::<MarkupEntry>(raw) {
                Ok(entry) => {
                    parsed.insert(item, entry);
                }
                Err(_) => {
                    tracing::warn!(city = %city, item = %item, "malformed markup entry, skipping");
                    skipped += 1;
                }
            }
        }
        for (item, entry) in parsed {
            table.insert(&city, &item, entry);
        }
    }
    Ok((table, skipped))
}

pub fn load_table(path: &Path) -> Result<MarkupTable> {
    let text = fs::read_to_string(path).map_err(|source| MarkupError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let (table, skipped) = parse_table(&text, path)?;
    if skipped > 0 {
        tracing::warn!(path = %path.display(), skipped, "ignored malformed entries");
    }
    Ok(table)
}

pub fn save_table(table: &MarkupTable, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(table).map_err(|e| MarkupError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, json).map_err(|source| MarkupError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_entries_of_the_wrong_shape() {
        let text = r#"{
            "Hub": {"Apple": [15.0, 62], "Pear": "cheap", "Plum": [1, 2, 3], "Fig": 3.5},
            "Rot": 12
        }"#;
        let (table, skipped) = parse_table(text, Path::new("t.json")).unwrap();
        assert_eq!(skipped, 3);
        assert_eq!(table.get("Hub", "Apple"), Some(&MarkupEntry::Located(15.0, 62)));
        assert_eq!(table.get("Hub", "Fig"), Some(&MarkupEntry::Bare(3.5)));
        assert!(table.city("Rot").is_none());
    }

    #[test]
    fn non_object_root_is_an_error() {
        assert!(parse_table("[1, 2]", Path::new("t.json")).is_err());
        assert!(parse_table("{not json", Path::new("t.json")).is_err());
    }

    #[test]
    fn save_then_load_keeps_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join(TRANSLATED_MARKUPS_FILE);
        let mut table = MarkupTable::new();
        table.insert("Squin", "Iron Plate", MarkupEntry::Located(112.5, 4096));
        save_table(&table, &path).unwrap();
        assert_eq!(load_table(&path).unwrap(), table);
    }
}
