use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

mod cities;
pub mod artifact;
pub mod associate;
pub mod buffer;
pub mod discovery;
pub mod edit;
pub mod export;
pub mod filter;
pub mod names;
pub mod scanner;
pub mod segments;
pub mod table;
pub mod writeback;

pub use cities::DEFAULT_CITY_NAMES;
pub use edit::{Distribution, EditError, EditSession, EncodeError, RandomizeSettings};
pub use export::CsvLayout;
pub use filter::MarkupBounds;
pub use names::NameMapping;
pub use table::{MarkupEntry, MarkupTable};
pub use writeback::{Patch, SaveMode};

use associate::{associate, MarkupRecord};
use scanner::CityOccurrence;

#[derive(Debug, Error)]
pub enum MarkupError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("CSV error for {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("invalid scan pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MarkupError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkupSettings {
    pub city_names: Vec<String>,
    pub bounds: MarkupBounds,
    pub frequency_ratio: f64,
    /// Save file to scan. Detected automatically when unset.
    pub save_path: Option<PathBuf>,
    /// Dictionary files, searched in order. Detected automatically when empty.
    pub dictionary_paths: Vec<PathBuf>,
    /// Extra roots to search for a game installation besides drive roots.
    pub install_roots: Vec<PathBuf>,
    pub output_path: PathBuf,
    pub debug: bool,
}

impl Default for MarkupSettings {
    fn default() -> Self {
        Self {
            city_names: cities::default_city_names(),
            bounds: MarkupBounds::default(),
            frequency_ratio: filter::DEFAULT_FREQUENCY_RATIO,
            save_path: None,
            dictionary_paths: Vec::new(),
            install_roots: Vec::new(),
            output_path: PathBuf::from("."),
            debug: false,
        }
    }
}

impl MarkupSettings {
    /// Reads settings from a JSON file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| MarkupError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| MarkupError::Json {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn validate(&self) -> Result<()> {
        if !(self.bounds.lower <= self.bounds.upper) {
            return Err(MarkupError::Config(format!(
                "markup lower bound {} is above upper bound {}",
                self.bounds.lower, self.bounds.upper
            )));
        }
        if !(0.0..=1.0).contains(&self.frequency_ratio) {
            return Err(MarkupError::Config(format!(
                "frequency ratio {} must be between 0 and 1",
                self.frequency_ratio
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractionSummary {
    pub unique_items: usize,
    pub city_occurrences: usize,
    pub raw_records: usize,
    pub range_rejected: usize,
    pub cities_with_data: usize,
    pub frequency_threshold: f64,
    pub dropped_items: BTreeSet<String>,
    pub surviving_cities: usize,
    pub surviving_entries: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Extraction {
    /// Filtered table; every entry carries its value offset.
    pub table: MarkupTable,
    pub cities: Vec<CityOccurrence>,
    pub records: Vec<MarkupRecord>,
    pub summary: ExtractionSummary,
}

/// Scanner, associator and plausibility filter over one save buffer.
pub fn extract_markups(buffer: &[u8], settings: &MarkupSettings) -> Result<Extraction> {
    settings.validate()?;

    let item_regex = scanner::item_id_regex()?;
    let items = scanner::unique_item_ids(buffer, &item_regex);
    if items.is_empty() {
        tracing::warn!("no item identifiers ending in .base or .mod found");
        return Ok(Extraction::default());
    }
    tracing::info!(count = items.len(), "found unique item identifiers");

    let cities = scanner::scan_cities(buffer, &settings.city_names)?;
    if cities.is_empty() {
        tracing::warn!("none of the configured city names occur in the buffer");
        return Ok(Extraction {
            summary: ExtractionSummary {
                unique_items: items.len(),
                ..ExtractionSummary::default()
            },
            ..Extraction::default()
        });
    }
    tracing::info!(count = cities.len(), "found city occurrences");

    let records = associate(buffer, &cities, &items);
    let outcome = filter::apply(records.iter().cloned(), settings.bounds, settings.frequency_ratio);

    let summary = ExtractionSummary {
        unique_items: items.len(),
        city_occurrences: cities.len(),
        raw_records: records.len(),
        range_rejected: outcome.range_rejected,
        cities_with_data: outcome.cities_with_data,
        frequency_threshold: outcome.threshold,
        dropped_items: outcome.dropped_items,
        surviving_cities: outcome.table.city_count(),
        surviving_entries: outcome.table.entry_count(),
    };
    tracing::info!(
        cities = summary.surviving_cities,
        entries = summary.surviving_entries,
        "extraction complete"
    );

    Ok(Extraction {
        table: outcome.table,
        cities,
        records,
        summary,
    })
}

pub fn extract_from_file(path: &Path, settings: &MarkupSettings) -> Result<Extraction> {
    let buffer = buffer::load_buffer(path)?;
    tracing::info!(path = %path.display(), bytes = buffer.len(), "loaded save file");
    extract_markups(&buffer, settings)
}

#[derive(Clone, Debug, Default)]
pub struct Translation {
    pub table: MarkupTable,
    pub names: NameMapping,
    pub unresolved: Vec<String>,
}

/// Renames item keys through `names`; unresolved keys stay as they are.
/// Entries are carried over unchanged.
pub fn rename_items(table: &MarkupTable, names: &NameMapping) -> MarkupTable {
    let mut renamed = MarkupTable::new();
    for (city, items) in table.cities() {
        for (id, entry) in items {
            let name = names.display_name(id);
            if renamed.insert(city, name, *entry).is_some() {
                tracing::warn!(city = %city, name, id = %id, "several items share a name, keeping the last");
            }
        }
    }
    renamed
}

fn finish_translation(table: &MarkupTable, ids: &BTreeSet<String>, names: NameMapping) -> Translation {
    let unresolved: Vec<String> = names.unresolved(ids).into_iter().cloned().collect();
    tracing::info!(
        mapped = names.len(),
        total = ids.len(),
        unresolved = unresolved.len(),
        "item name translation complete"
    );
    Translation {
        table: rename_items(table, &names),
        names,
        unresolved,
    }
}

/// Fails when any entry lacks its save offset. A translated table without
/// offsets cannot be written back, so `source` is rejected up front.
pub fn ensure_offsets(table: &MarkupTable, source: &Path) -> Result<()> {
    let bare = table
        .cities()
        .flat_map(|(_, items)| items.values())
        .filter(|entry| entry.offset().is_none())
        .count();
    if bare == 0 {
        return Ok(());
    }
    Err(MarkupError::Config(format!(
        "{} has {bare} entries without save offsets; re-extract with `extract --offsets` or use `run`",
        source.display()
    )))
}

/// Name resolution over in-memory dictionaries.
pub fn translate_table<I, B>(table: &MarkupTable, dictionaries: I) -> Translation
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let ids = table.item_keys();
    let names = names::resolve_names(&ids, dictionaries);
    finish_translation(table, &ids, names)
}

/// Name resolution over dictionary files, read one at a time.
pub fn translate_from_files<P: AsRef<Path>>(table: &MarkupTable, paths: &[P]) -> Translation {
    let ids = table.item_keys();
    if ids.is_empty() {
        tracing::info!("no item identifiers to translate");
        return Translation {
            table: table.clone(),
            ..Translation::default()
        };
    }
    let names = names::resolve_names_from_files(&ids, paths);
    finish_translation(table, &ids, names)
}

#[derive(Clone, Debug)]
pub struct RunReport {
    pub save_path: PathBuf,
    pub extracted_path: PathBuf,
    pub translated_path: Option<PathBuf>,
    pub summary: ExtractionSummary,
    pub dictionaries: usize,
    pub unresolved: Vec<String>,
}

impl RunReport {
    pub fn has_data(&self) -> bool {
        self.translated_path.is_some()
    }
}

pub fn resolve_save_path(settings: &MarkupSettings) -> Result<PathBuf> {
    match &settings.save_path {
        Some(path) => Ok(path.clone()),
        None => discovery::detect_save_file(Path::new(".")).ok_or_else(|| {
            MarkupError::Config(
                "no save file found; place a .save file in ./save or pass one explicitly"
                    .to_string(),
            )
        }),
    }
}

pub fn resolve_dictionary_paths(settings: &MarkupSettings) -> Vec<PathBuf> {
    if !settings.dictionary_paths.is_empty() {
        return settings.dictionary_paths.clone();
    }
    let mut roots = settings.install_roots.clone();
    roots.extend(discovery::drive_roots());
    discovery::detect_dictionary_files(Path::new("."), &roots)
}

/// Full pipeline: extract from the save file, write the extraction
/// artifact, resolve names and write the translated artifact.
///
/// A run that finds nothing still succeeds; the report says so.
pub fn run(settings: &MarkupSettings) -> Result<RunReport> {
    let save_path = resolve_save_path(settings)?;
    let buffer = buffer::load_buffer(&save_path)?;
    tracing::info!(path = %save_path.display(), bytes = buffer.len(), "loaded save file");

    if !settings.output_path.exists() {
        fs::create_dir_all(&settings.output_path)?;
    }

    let extraction = extract_markups(&buffer, settings)?;
    let extracted_path = settings.output_path.join(artifact::EXTRACTED_MARKUPS_FILE);
    artifact::save_table(&extraction.table.values_only(), &extracted_path)?;

    if settings.debug {
        let report = segments::debug_dump_city_segments(
            buffer.len(),
            &extraction.cities,
            &extraction.records,
        );
        let report_path = settings.output_path.join("city_segments.txt");
        match fs::write(&report_path, report) {
            Ok(()) => tracing::debug!(path = %report_path.display(), "wrote city segment report"),
            Err(err) => tracing::warn!(
                path = %report_path.display(),
                error = %err,
                "failed to write city segment report"
            ),
        }
    }

    let mut report = RunReport {
        save_path,
        extracted_path,
        translated_path: None,
        summary: extraction.summary.clone(),
        dictionaries: 0,
        unresolved: Vec::new(),
    };

    if extraction.table.is_empty() {
        tracing::warn!("no markups survived extraction");
        return Ok(report);
    }

    let dictionaries = resolve_dictionary_paths(settings);
    if dictionaries.is_empty() {
        tracing::warn!("no dictionary files found; item identifiers will be kept");
    }
    let translation = translate_from_files(&extraction.table, &dictionaries);

    let translated_path = settings.output_path.join(artifact::TRANSLATED_MARKUPS_FILE);
    artifact::save_table(&translation.table, &translated_path)?;

    report.translated_path = Some(translated_path);
    report.dictionaries = dictionaries.len();
    report.unresolved = translation.unresolved;
    Ok(report)
}

/// Outcome of writing edits back to a save file.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub target: PathBuf,
    pub written: usize,
    pub rejected: Vec<EditError>,
}

/// Writes every modified row of `session` into the save file chosen by
/// `mode`. Rows that cannot be encoded are reported and skipped.
pub fn apply_session(
    session: &EditSession,
    original: &Path,
    mode: SaveMode,
    out_dir: &Path,
) -> Result<ApplyReport> {
    let (patches, rejected) = session.pending_patches();
    for err in &rejected {
        tracing::warn!(error = %err, "skipping edit");
    }
    if patches.is_empty() {
        tracing::info!("no modified markups to write");
        return Ok(ApplyReport {
            target: original.to_path_buf(),
            written: 0,
            rejected,
        });
    }

    let target = writeback::prepare_target(original, mode, out_dir)?;
    let written = writeback::apply_patches(&target, &patches)?;
    tracing::info!(target = %target.display(), written, "applied markup changes");
    Ok(ApplyReport {
        target,
        written,
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_fill_missing_fields_from_defaults() {
        let settings: MarkupSettings =
            serde_json::from_str(r#"{"frequency_ratio": 0.2, "debug": true}"#).unwrap();
        assert_eq!(settings.frequency_ratio, 0.2);
        assert!(settings.debug);
        assert_eq!(settings.city_names.len(), 40);
        assert_eq!(settings.bounds, MarkupBounds::default());
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let settings = MarkupSettings {
            bounds: MarkupBounds {
                lower: 10.0,
                upper: 5.0,
            },
            ..MarkupSettings::default()
        };
        assert!(matches!(
            extract_markups(b"1-a.base", &settings),
            Err(MarkupError::Config(_))
        ));
    }

    #[test]
    fn buffer_without_items_yields_empty_table() {
        let extraction = extract_markups(b"Hub Squin Stack", &MarkupSettings::default()).unwrap();
        assert!(extraction.table.is_empty());
        assert_eq!(extraction.summary.unique_items, 0);
    }

    #[test]
    fn bare_values_cannot_be_translated() {
        let mut table = MarkupTable::new();
        table.insert("Hub", "5-apple.base", MarkupEntry::Located(15.0, 62));
        assert!(ensure_offsets(&table, Path::new("located.json")).is_ok());

        let err = ensure_offsets(&table.values_only(), Path::new("bare.json")).unwrap_err();
        assert!(matches!(err, MarkupError::Config(_)));
        let message = err.to_string();
        assert!(message.contains("bare.json"), "{message}");
        assert!(message.contains("--offsets"), "{message}");
    }

    #[test]
    fn rename_keeps_unresolved_ids() {
        let mut table = MarkupTable::new();
        table.insert("Hub", "5-apple.base", MarkupEntry::Located(15.0, 62));
        table.insert("Hub", "9-odd.mod", MarkupEntry::Located(40.0, 90));
        let translation = translate_table(&table, [b"\x00Apple\x01\x00\x00\x005-apple.base".as_slice()]);
        assert_eq!(
            translation.table.get("Hub", "Apple"),
            Some(&MarkupEntry::Located(15.0, 62))
        );
        assert_eq!(
            translation.table.get("Hub", "9-odd.mod"),
            Some(&MarkupEntry::Located(40.0, 90))
        );
        assert_eq!(translation.unresolved, vec!["9-odd.mod".to_string()]);
    }
}
