use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::associate::MarkupRecord;
use crate::table::{MarkupEntry, MarkupTable};

pub const DEFAULT_LOWER_BOUND: f64 = 1.0;
pub const DEFAULT_UPPER_BOUND: f64 = 175.0;
pub const DEFAULT_FREQUENCY_RATIO: f64 = 0.10;

/// Inclusive percentage range a decoded markup must fall in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkupBounds {
    pub lower: f64,
    pub upper: f64,
}

impl Default for MarkupBounds {
    fn default() -> Self {
        Self {
            lower: DEFAULT_LOWER_BOUND,
            upper: DEFAULT_UPPER_BOUND,
        }
    }
}

impl MarkupBounds {
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FilterOutcome {
    pub table: MarkupTable,
    pub range_rejected: usize,
    /// Cities with at least one record after the range pass.
    pub cities_with_data: usize,
    pub threshold: f64,
    pub dropped_items: BTreeSet<String>,
}

/// Folds in-range records into a table. Records are applied in order, so a
/// later occurrence of the same city name overwrites an earlier value.
/// Out-of-range records never reach the table and never overwrite.
pub fn range_pass<I>(records: I, bounds: MarkupBounds) -> (MarkupTable, usize)
where
    I: IntoIterator<Item = MarkupRecord>,
{
    let mut table = MarkupTable::new();
    let mut rejected = 0usize;
    for record in records {
        if !bounds.contains(record.value) {
            tracing::trace!(
                city = %record.city,
                item = %record.item,
                value = record.value,
                "markup outside plausible range"
            );
            rejected += 1;
            continue;
        }
        table.insert(
            &record.city,
            &record.item,
            MarkupEntry::Located(record.value, record.offset as u64),
        );
    }
    (table, rejected)
}

/// Item keys seen in fewer than `ratio * cities_with_data` cities.
pub fn rare_items(table: &MarkupTable, ratio: f64) -> (BTreeSet<String>, usize, f64) {
    let cities_with_data = table.cities().filter(|(_, items)| !items.is_empty()).count();
    let threshold = ratio * cities_with_data as f64;
    let rare = table
        .city_counts()
        .into_iter()
        .filter(|&(_, count)| (count as f64) < threshold)
        .map(|(item, _)| item.to_string())
        .collect();
    (rare, cities_with_data, threshold)
}

/// Range pass followed by the cross-city frequency pass.
pub fn apply<I>(records: I, bounds: MarkupBounds, ratio: f64) -> FilterOutcome
where
    I: IntoIterator<Item = MarkupRecord>,
{
    let (table, range_rejected) = range_pass(records, bounds);
    if table.is_empty() {
        return FilterOutcome {
            range_rejected,
            ..FilterOutcome::default()
        };
    }

    let (dropped_items, cities_with_data, threshold) = rare_items(&table, ratio);
    if dropped_items.is_empty() {
        tracing::debug!(threshold, "no items below the city frequency threshold");
    } else {
        tracing::info!(
            dropped = dropped_items.len(),
            threshold,
            cities_with_data,
            "dropping items seen in too few cities"
        );
    }

    let table = table.without_items(&dropped_items);
    if table.is_empty() {
        tracing::warn!("every item was removed by the city frequency filter");
    }

    FilterOutcome {
        table,
        range_rejected,
        cities_with_data,
        threshold,
        dropped_items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(city: &str, item: &str, value: f64, offset: usize) -> MarkupRecord {
        MarkupRecord {
            city: city.to_string(),
            item: item.to_string(),
            value,
            offset,
        }
    }

    #[test]
    fn below_lower_bound_never_survives() {
        let records: Vec<_> = (0..10)
            .map(|i| rec(&format!("City{i}"), "1-cheap.base", 0.5, i))
            .collect();
        let out = apply(records, MarkupBounds::default(), DEFAULT_FREQUENCY_RATIO);
        assert!(out.table.is_empty());
        assert_eq!(out.range_rejected, 10);
    }

    #[test]
    fn bounds_are_inclusive() {
        let bounds = MarkupBounds::default();
        assert!(bounds.contains(1.0));
        assert!(bounds.contains(175.0));
        assert!(!bounds.contains(175.01));
        assert!(!bounds.contains(-1.0));
    }

    #[test]
    fn one_city_in_ten_is_kept() {
        let mut records: Vec<_> = (0..10)
            .map(|i| rec(&format!("City{i}"), "1-common.base", 50.0, i * 10))
            .collect();
        records.push(rec("City3", "2-rare.mod", 80.0, 500));

        let out = apply(records, MarkupBounds::default(), DEFAULT_FREQUENCY_RATIO);
        assert_eq!(out.cities_with_data, 10);
        assert!((out.threshold - 1.0).abs() < 1e-12);
        assert!(out.dropped_items.is_empty());
        assert!(out.table.get("City3", "2-rare.mod").is_some());
    }

    #[test]
    fn rare_item_is_dropped_and_empty_city_removed() {
        let mut records: Vec<_> = (0..20)
            .map(|i| rec(&format!("City{i}"), "1-common.base", 50.0, i * 10))
            .collect();
        records.push(rec("Lonely", "2-rare.mod", 80.0, 900));

        let out = apply(records, MarkupBounds::default(), DEFAULT_FREQUENCY_RATIO);
        // 21 cities with data -> threshold 2.1
        assert!(out.dropped_items.contains("2-rare.mod"));
        assert!(out.table.city("Lonely").is_none());
        assert_eq!(out.table.city_count(), 20);
    }

    #[test]
    fn later_occurrence_overwrites_but_out_of_range_does_not() {
        let records = vec![
            rec("Hub", "1-a.base", 40.0, 10),
            rec("Hub", "1-a.base", 60.0, 110),
            rec("Hub", "1-a.base", 900.0, 210),
        ];
        let out = apply(records, MarkupBounds::default(), DEFAULT_FREQUENCY_RATIO);
        assert_eq!(
            out.table.get("Hub", "1-a.base"),
            Some(&MarkupEntry::Located(60.0, 110))
        );
    }
}
