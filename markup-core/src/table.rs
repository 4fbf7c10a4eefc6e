use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A markup value, optionally carrying the save-file offset of its field.
///
/// Serialises as a bare number or as a `[value, offset]` pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MarkupEntry {
    Located(f64, u64),
    Bare(f64),
}

impl MarkupEntry {
    pub fn value(&self) -> f64 {
        match *self {
            MarkupEntry::Located(value, _) | MarkupEntry::Bare(value) => value,
        }
    }

    pub fn offset(&self) -> Option<u64> {
        match *self {
            MarkupEntry::Located(_, offset) => Some(offset),
            MarkupEntry::Bare(_) => None,
        }
    }

    pub fn bare(self) -> Self {
        MarkupEntry::Bare(self.value())
    }
}

/// City name -> item key -> markup. Item keys are raw identifiers until the
/// names are resolved.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarkupTable {
    cities: BTreeMap<String, BTreeMap<String, MarkupEntry>>,
}

impl MarkupTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for `(city, item)`.
    pub fn insert(&mut self, city: &str, item: &str, entry: MarkupEntry) -> Option<MarkupEntry> {
        self.cities
            .entry(city.to_string())
            .or_default()
            .insert(item.to_string(), entry)
    }

    pub fn get(&self, city: &str, item: &str) -> Option<&MarkupEntry> {
        self.cities.get(city)?.get(item)
    }

    pub fn city(&self, city: &str) -> Option<&BTreeMap<String, MarkupEntry>> {
        self.cities.get(city)
    }

    pub fn cities(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, MarkupEntry>)> {
        self.cities.iter()
    }

    pub fn city_names(&self) -> impl Iterator<Item = &String> {
        self.cities.keys()
    }

    pub fn city_count(&self) -> usize {
        self.cities.len()
    }

    pub fn entry_count(&self) -> usize {
        self.cities.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.values().all(BTreeMap::is_empty)
    }

    pub fn item_keys(&self) -> BTreeSet<String> {
        self.cities
            .values()
            .flat_map(|items| items.keys().cloned())
            .collect()
    }

    /// Number of distinct cities each item key appears in.
    pub fn city_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for items in self.cities.values() {
            for item in items.keys() {
                *counts.entry(item.as_str()).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Drops the given item keys everywhere and removes cities left empty.
    pub fn without_items(self, drop: &BTreeSet<String>) -> Self {
        let cities = self
            .cities
            .into_iter()
            .filter_map(|(city, items)| {
                let kept: BTreeMap<_, _> = items
                    .into_iter()
                    .filter(|(item, _)| !drop.contains(item))
                    .collect();
                (!kept.is_empty()).then_some((city, kept))
            })
            .collect();
        Self { cities }
    }

    /// Same table with every entry reduced to its bare value.
    pub fn values_only(&self) -> Self {
        let cities = self
            .cities
            .iter()
            .map(|(city, items)| {
                let items = items
                    .iter()
                    .map(|(item, entry)| (item.clone(), entry.bare()))
                    .collect();
                (city.clone(), items)
            })
            .collect();
        Self { cities }
    }
}

impl FromIterator<(String, BTreeMap<String, MarkupEntry>)> for MarkupTable {
    fn from_iter<T: IntoIterator<Item = (String, BTreeMap<String, MarkupEntry>)>>(iter: T) -> Self {
        Self {
            cities: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_serialise_in_both_shapes() {
        let mut table = MarkupTable::new();
        table.insert("Hub", "5-apple.base", MarkupEntry::Located(15.0, 62));
        table.insert("Hub", "6-pear.mod", MarkupEntry::Bare(2.5));
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"{"Hub":{"5-apple.base":[15.0,62],"6-pear.mod":2.5}}"#);

        let back: MarkupTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn dropping_items_prunes_empty_cities() {
        let mut table = MarkupTable::new();
        table.insert("Hub", "a", MarkupEntry::Bare(1.0));
        table.insert("Hub", "b", MarkupEntry::Bare(2.0));
        table.insert("Rot", "a", MarkupEntry::Bare(3.0));

        let drop: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        let table = table.without_items(&drop);
        assert_eq!(table.city_count(), 1);
        assert_eq!(table.get("Hub", "b"), Some(&MarkupEntry::Bare(2.0)));
    }

    #[test]
    fn city_counts_are_per_city() {
        let mut table = MarkupTable::new();
        table.insert("Hub", "a", MarkupEntry::Bare(1.0));
        table.insert("Rot", "a", MarkupEntry::Bare(1.0));
        table.insert("Rot", "b", MarkupEntry::Bare(1.0));
        let counts = table.city_counts();
        assert_eq!(counts["a"], 2);
        assert_eq!(counts["b"], 1);
    }
}
