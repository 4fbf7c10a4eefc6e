use memchr::memmem;
use std::collections::BTreeMap;

use crate::scanner::CityOccurrence;

/// Width of the little-endian `i16` that trails every item identifier.
pub const VALUE_FIELD_LEN: usize = 2;

/// One (city, item) association before any plausibility filtering.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkupRecord {
    pub city: String,
    pub item: String,
    pub value: f64,
    /// Byte offset of the value field, not of the identifier.
    pub offset: usize,
}

/// Sorted start offsets of every occurrence of each identifier, overlapping
/// occurrences included. Answers "first occurrence at or after `pos`" with a
/// binary search instead of rescanning the buffer per city.
pub(crate) struct OccurrenceIndex<'a> {
    offsets: BTreeMap<&'a str, Vec<usize>>,
}

impl<'a> OccurrenceIndex<'a> {
    pub(crate) fn build<I>(buffer: &[u8], items: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut offsets = BTreeMap::new();
        for item in items {
            if item.is_empty() {
                continue;
            }
            let finder = memmem::Finder::new(item.as_bytes());
            let mut hits = Vec::new();
            let mut start = 0usize;
            while start < buffer.len() {
                match finder.find(&buffer[start..]) {
                    Some(rel) => {
                        hits.push(start + rel);
                        start += rel + 1;
                    }
                    None => break,
                }
            }
            offsets.insert(item, hits);
        }
        Self { offsets }
    }

    pub(crate) fn first_at_or_after(&self, item: &str, pos: usize) -> Option<usize> {
        let hits = self.offsets.get(item)?;
        let idx = hits.partition_point(|&off| off < pos);
        hits.get(idx).copied()
    }
}

/// Decodes the markup field at `offset` as a percentage.
pub fn read_markup(buffer: &[u8], offset: usize) -> Option<f64> {
    let end = offset.checked_add(VALUE_FIELD_LEN)?;
    let bytes = buffer.get(offset..end)?;
    let raw = i16::from_le_bytes([bytes[0], bytes[1]]);
    Some(f64::from(raw) / 100.0)
}

/// End of the window opened by `cities[i]`: the next occurrence's offset, or
/// the end of the buffer for the last one.
pub(crate) fn window_end(cities: &[CityOccurrence], i: usize, buffer_len: usize) -> usize {
    cities.get(i + 1).map_or(buffer_len, |next| next.offset)
}

/// Associates each city occurrence with the markups of items that follow it
/// before the next city occurrence.
///
/// `cities` must be sorted by offset. Items are visited in the iteration
/// order of `items`; pass them sorted for reproducible output. Records come
/// back in (city occurrence, item) order and carry no range checking.
pub fn associate<'a, I>(buffer: &[u8], cities: &[CityOccurrence], items: I) -> Vec<MarkupRecord>
where
    I: IntoIterator<Item = &'a String>,
{
    let items: Vec<&str> = items.into_iter().map(String::as_str).collect();
    let index = OccurrenceIndex::build(buffer, items.iter().copied());
    let mut records = Vec::new();

    for (i, city) in cities.iter().enumerate() {
        let upper = window_end(cities, i, buffer.len());
        let before = records.len();

        for item in &items {
            // The search starts at the city itself and is only bounded by
            // the next city after the fact.
            let Some(found) = index.first_at_or_after(item, city.offset) else {
                continue;
            };
            if found >= upper {
                continue;
            }
            let value_offset = found + item.len();
            let Some(value) = read_markup(buffer, value_offset) else {
                tracing::trace!(
                    city = %city.name,
                    item = *item,
                    value_offset,
                    "value field past end of buffer"
                );
                continue;
            };
            records.push(MarkupRecord {
                city: city.name.clone(),
                item: (*item).to_string(),
                value,
                offset: value_offset,
            });
        }

        tracing::debug!(
            city = %city.name,
            offset = city.offset,
            window_end = upper,
            records = records.len() - before,
            "processed city occurrence"
        );
    }

    records
}
