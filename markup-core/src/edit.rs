use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::str::FromStr;
use thiserror::Error;

use crate::table::MarkupTable;
use crate::writeback::Patch;
use crate::{MarkupError, Result};

/// Values closer than this to the original are treated as unchanged.
pub const EDIT_EPSILON: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum EditError {
    #[error("markup {value}% for '{item}' in {city} scales to {raw}, outside the 16-bit signed range")]
    OutOfRange {
        city: String,
        item: String,
        value: f64,
        raw: i64,
    },

    #[error("markup for '{item}' in {city} is not a finite number")]
    NotFinite { city: String, item: String },

    #[error("no row for '{item}' in {city}")]
    UnknownRow { city: String, item: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct EditRow {
    pub city: String,
    pub item: String,
    pub original: f64,
    pub value: f64,
    pub offset: u64,
}

impl EditRow {
    pub fn is_modified(&self) -> bool {
        (self.value - self.original).abs() > EDIT_EPSILON
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distribution {
    #[default]
    Uniform,
    Normal,
    Triangular,
    /// Beta(0.5, 0.5): values pile up near both caps.
    TwoPeak,
}

impl FromStr for Distribution {
    type Err = MarkupError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "uniform" => Ok(Distribution::Uniform),
            "normal" => Ok(Distribution::Normal),
            "triangular" => Ok(Distribution::Triangular),
            "two-peak" | "twopeak" | "beta" => Ok(Distribution::TwoPeak),
            other => Err(MarkupError::Config(format!("unknown distribution '{other}'"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomizeSettings {
    pub lower: f64,
    pub upper: f64,
    pub distribution: Distribution,
    pub seed: Option<u64>,
}

impl Default for RandomizeSettings {
    fn default() -> Self {
        Self {
            lower: 70.0,
            upper: 140.5,
            distribution: Distribution::Uniform,
            seed: None,
        }
    }
}

fn sample_normal<R: Rng>(rng: &mut R, mean: f64, sigma: f64) -> f64 {
    // Box-Muller; 1 - u keeps the log argument in (0, 1].
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    mean + sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

fn sample_triangular<R: Rng>(rng: &mut R, low: f64, high: f64, mode: f64) -> f64 {
    let u: f64 = rng.gen();
    let split = (mode - low) / (high - low);
    if u < split {
        low + (u * (high - low) * (mode - low)).sqrt()
    } else {
        high - ((1.0 - u) * (high - low) * (high - mode)).sqrt()
    }
}

pub(crate) fn sample<R: Rng>(rng: &mut R, settings: &RandomizeSettings) -> f64 {
    let (low, high) = (settings.lower, settings.upper);
    match settings.distribution {
        Distribution::Uniform => rng.gen_range(low..=high),
        Distribution::Normal => {
            let mean = (low + high) / 2.0;
            let sigma = (high - low) / 4.0;
            if sigma <= 0.0 {
                mean
            } else {
                sample_normal(rng, mean, sigma).clamp(low, high)
            }
        }
        Distribution::Triangular => sample_triangular(rng, low, high, (low + high) / 2.0),
        Distribution::TwoPeak => {
            // Arcsine law: sin^2 of a uniform angle is Beta(0.5, 0.5).
            let x = (rng.gen::<f64>() * PI / 2.0).sin().powi(2);
            low + x * (high - low)
        }
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodeError {
    NotFinite,
    /// Scaled value that does not fit in an `i16`.
    OutOfRange(i64),
}

/// Encodes a markup percentage as the little-endian `i16` stored on disk.
/// Halves round to even.
pub fn encode_markup(value: f64) -> std::result::Result<[u8; 2], EncodeError> {
    let raw = (value * 100.0).round_ties_even();
    if !raw.is_finite() {
        return Err(EncodeError::NotFinite);
    }
    if raw < f64::from(i16::MIN) || raw > f64::from(i16::MAX) {
        return Err(EncodeError::OutOfRange(raw as i64));
    }
    Ok((raw as i16).to_le_bytes())
}

/// Flat, editable view of a translated table.
#[derive(Clone, Debug, Default)]
pub struct EditSession {
    rows: Vec<EditRow>,
    city_filter: String,
    item_filter: String,
}

impl EditSession {
    /// Rows are produced in table order. Entries without an offset cannot be
    /// written back and are skipped.
    pub fn from_table(table: &MarkupTable) -> Self {
        let mut rows = Vec::new();
        for (city, items) in table.cities() {
            for (item, entry) in items {
                let Some(offset) = entry.offset() else {
                    tracing::warn!(city = %city, item = %item, "entry has no offset, skipping");
                    continue;
                };
                rows.push(EditRow {
                    city: city.clone(),
                    item: item.clone(),
                    original: entry.value(),
                    value: entry.value(),
                    offset,
                });
            }
        }
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn rows(&self) -> &[EditRow] {
        &self.rows
    }

    /// Case-insensitive substring filters; empty strings match everything.
    pub fn set_filters(&mut self, city: &str, item: &str) {
        self.city_filter = city.to_lowercase();
        self.item_filter = item.to_lowercase();
    }

    fn row_visible(&self, row: &EditRow) -> bool {
        row.city.to_lowercase().contains(&self.city_filter)
            && row.item.to_lowercase().contains(&self.item_filter)
    }

    pub fn visible_rows(&self) -> impl Iterator<Item = &EditRow> {
        self.rows.iter().filter(move |row| self.row_visible(row))
    }

    pub fn set_value(&mut self, city: &str, item: &str, value: f64) -> std::result::Result<(), EditError> {
        let row = self
            .rows
            .iter_mut()
            .find(|row| row.city == city && row.item == item)
            .ok_or_else(|| EditError::UnknownRow {
                city: city.to_string(),
                item: item.to_string(),
            })?;
        row.value = value;
        Ok(())
    }

    /// Replaces every visible value with a random draw between the caps,
    /// rounded to two decimals. Returns the number of rows changed.
    pub fn randomize(&mut self, settings: &RandomizeSettings) -> Result<usize> {
        if !(settings.lower < settings.upper) {
            return Err(MarkupError::Config(
                "lower cap must be less than upper cap".to_string(),
            ));
        }
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let visible: Vec<bool> = self.rows.iter().map(|row| self.row_visible(row)).collect();
        let mut changed = 0usize;
        for (row, visible) in self.rows.iter_mut().zip(visible) {
            if !visible {
                continue;
            }
            row.value = round_cents(sample(&mut rng, settings));
            changed += 1;
        }
        tracing::info!(
            changed,
            distribution = ?settings.distribution,
            lower = settings.lower,
            upper = settings.upper,
            "randomized markups"
        );
        Ok(changed)
    }

    /// Writeback list for every modified row, plus the rows that could not
    /// be encoded.
    pub fn pending_patches(&self) -> (Vec<Patch>, Vec<EditError>) {
        let mut patches = Vec::new();
        let mut errors = Vec::new();
        for row in self.rows.iter().filter(|row| row.is_modified() || !row.value.is_finite()) {
            match encode_markup(row.value) {
                Ok(bytes) => patches.push(Patch {
                    offset: row.offset,
                    bytes,
                }),
                Err(EncodeError::NotFinite) => errors.push(EditError::NotFinite {
                    city: row.city.clone(),
                    item: row.item.clone(),
                }),
                Err(EncodeError::OutOfRange(raw)) => errors.push(EditError::OutOfRange {
                    city: row.city.clone(),
                    item: row.item.clone(),
                    value: row.value,
                    raw,
                }),
            }
        }
        (patches, errors)
    }
}
