use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::table::MarkupTable;
use crate::{MarkupError, Result};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CsvLayout {
    /// One row per item, one column per city.
    CitiesAsColumns,
    /// One row per city, one column per item.
    #[default]
    CitiesAsRows,
}

/// `15.0` stays `15.0` rather than `15`.
fn cell(table: &MarkupTable, city: &str, item: &str) -> String {
    table
        .get(city, item)
        .map(|entry| format!("{:?}", entry.value()))
        .unwrap_or_default()
}

/// Writes the table as a spreadsheet. Both axes are sorted; cells for
/// items a city does not list are left empty. Returns the number of data rows.
pub fn write_csv<W: Write>(table: &MarkupTable, layout: CsvLayout, out: W) -> csv::Result<usize> {
    let cities: Vec<&String> = table.city_names().collect();
    let items: Vec<String> = table.item_keys().into_iter().collect();
    let mut writer = csv::Writer::from_writer(out);

    let rows = match layout {
        CsvLayout::CitiesAsColumns => {
            writer.write_record(std::iter::once("").chain(cities.iter().map(|c| c.as_str())))?;
            for item in &items {
                let mut record = vec![item.clone()];
                record.extend(cities.iter().map(|city| cell(table, city, item)));
                writer.write_record(&record)?;
            }
            items.len()
        }
        CsvLayout::CitiesAsRows => {
            writer.write_record(std::iter::once("").chain(items.iter().map(String::as_str)))?;
            for city in &cities {
                let mut record = vec![(*city).clone()];
                record.extend(items.iter().map(|item| cell(table, city, item)));
                writer.write_record(&record)?;
            }
            cities.len()
        }
    };
    writer.flush()?;
    Ok(rows)
}

pub fn export_csv(table: &MarkupTable, layout: CsvLayout, path: &Path) -> Result<usize> {
    let file = File::create(path).map_err(|source| MarkupError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    write_csv(table, layout, file).map_err(|e| MarkupError::Csv {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::MarkupEntry;

    fn table() -> MarkupTable {
        let mut table = MarkupTable::new();
        table.insert("Squin", "Apple", MarkupEntry::Located(30.5, 10));
        table.insert("Hub", "Apple", MarkupEntry::Located(15.0, 20));
        table.insert("Hub", "Hashish", MarkupEntry::Bare(120.0));
        table
    }

    #[test]
    fn cities_as_columns() {
        let mut out = Vec::new();
        let rows = write_csv(&table(), CsvLayout::CitiesAsColumns, &mut out).unwrap();
        assert_eq!(rows, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            ",Hub,Squin\nApple,15.0,30.5\nHashish,120.0,\n"
        );
    }

    #[test]
    fn default_layout_lists_cities_as_rows() {
        assert_eq!(CsvLayout::default(), CsvLayout::CitiesAsRows);
    }

    #[test]
    fn cities_as_rows() {
        let mut out = Vec::new();
        let rows = write_csv(&table(), CsvLayout::CitiesAsRows, &mut out).unwrap();
        assert_eq!(rows, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            ",Apple,Hashish\nHub,15.0,120.0\nSquin,30.5,\n"
        );
    }
}
