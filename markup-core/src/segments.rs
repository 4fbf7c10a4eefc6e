use std::fmt::Write;

use crate::associate::{window_end, MarkupRecord};
use crate::scanner::CityOccurrence;

/// Human-readable dump of every city window and how many raw records fell
/// inside it. Diagnostic only.
pub fn debug_dump_city_segments(
    buffer_len: usize,
    cities: &[CityOccurrence],
    records: &[MarkupRecord],
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "buffer: {buffer_len} bytes, {} city occurrences", cities.len());
    for (i, city) in cities.iter().enumerate() {
        let end = window_end(cities, i, buffer_len);
        let hits: Vec<&MarkupRecord> = records
            .iter()
            .filter(|r| {
                // Records carry the value offset; the identifier sits right before it.
                let id_start = r.offset.saturating_sub(r.item.len());
                r.city == city.name && id_start >= city.offset && id_start < end
            })
            .collect();
        let _ = writeln!(
            out,
            "[{i:>4}] {:<20} 0x{:08X}..0x{:08X} ({:>8} bytes) records: {}",
            city.name,
            city.offset,
            end,
            end - city.offset,
            hits.len()
        );
        for rec in hits {
            let _ = writeln!(
                out,
                "         {:<40} {:>8.2}% @ 0x{:08X}",
                rec.item, rec.value, rec.offset
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_each_window() {
        let cities = vec![
            CityOccurrence {
                name: "Hub".to_string(),
                offset: 0,
            },
            CityOccurrence {
                name: "Squin".to_string(),
                offset: 0x40,
            },
        ];
        let records = vec![MarkupRecord {
            city: "Hub".to_string(),
            item: "5-apple.base".to_string(),
            value: 15.0,
            offset: 0x10,
        }];
        let report = debug_dump_city_segments(0x80, &cities, &records);
        assert!(report.contains("0x00000000..0x00000040"));
        assert!(report.contains("0x00000040..0x00000080"));
        assert!(report.contains("5-apple.base"));
        assert_eq!(report.lines().count(), 4);
    }
}
