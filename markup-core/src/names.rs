use memchr::memmem;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::buffer::load_buffer;

/// Length of the marker between a display name and its identifier:
/// one non-zero byte followed by three zero bytes.
pub const SEPARATOR_LEN: usize = 4;

/// Whether `window` is a name/identifier separator.
pub fn is_separator(window: &[u8]) -> bool {
    window.len() == SEPARATOR_LEN && window[0] != 0 && window[1..].iter().all(|&b| b == 0)
}

/// Display name stored in front of the separator that ends at `id_pos`.
///
/// The name runs back from the separator to the previous null byte, or to
/// the start of the buffer when there is none.
fn name_before(buffer: &[u8], id_pos: usize) -> Option<String> {
    let name_end = id_pos.checked_sub(SEPARATOR_LEN)?;
    let name_start = memchr::memrchr(0, &buffer[..name_end]).map_or(0, |null| null + 1);
    let name = String::from_utf8_lossy(&buffer[name_start..name_end]);
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// First human-readable name recorded for `item_id` in `buffer`.
///
/// Occurrences without a valid separator, or whose name is blank, are
/// skipped in favour of later ones.
pub fn find_item_name(item_id: &[u8], buffer: &[u8]) -> Option<String> {
    if item_id.is_empty() {
        return None;
    }
    for pos in memmem::find_iter(buffer, item_id) {
        if pos < SEPARATOR_LEN {
            tracing::trace!(pos, "no room for a separator before identifier");
            continue;
        }
        if !is_separator(&buffer[pos - SEPARATOR_LEN..pos]) {
            continue;
        }
        if let Some(name) = name_before(buffer, pos) {
            return Some(name);
        }
    }
    None
}

/// Identifier -> display name, built from dictionaries tried in order.
///
/// Once an identifier is resolved it is not searched for again, so the
/// first dictionary that knows it wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameMapping {
    names: BTreeMap<String, String>,
}

impl NameMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// Display name for `id`, falling back to the identifier itself.
    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.get(id).unwrap_or(id)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.names.iter()
    }

    /// Searches one dictionary for every identifier not yet resolved.
    /// Returns how many new names were found.
    pub fn absorb(&mut self, ids: &BTreeSet<String>, dictionary: &[u8]) -> usize {
        let mut found = 0usize;
        for id in ids {
            if self.names.contains_key(id) {
                continue;
            }
            if let Some(name) = find_item_name(id.as_bytes(), dictionary) {
                tracing::trace!(id = %id, name = %name, "resolved item name");
                self.names.insert(id.clone(), name);
                found += 1;
            }
        }
        found
    }

    pub fn unresolved<'a>(&self, ids: &'a BTreeSet<String>) -> Vec<&'a String> {
        ids.iter().filter(|id| !self.names.contains_key(*id)).collect()
    }
}

/// Resolves names across in-memory dictionary buffers.
pub fn resolve_names<I, B>(ids: &BTreeSet<String>, dictionaries: I) -> NameMapping
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut mapping = NameMapping::new();
    for dictionary in dictionaries {
        if mapping.len() == ids.len() {
            break;
        }
        mapping.absorb(ids, dictionary.as_ref());
    }
    mapping
}

/// Resolves names across dictionary files, loading one file at a time.
/// Unreadable files are reported and skipped.
pub fn resolve_names_from_files<P: AsRef<Path>>(ids: &BTreeSet<String>, paths: &[P]) -> NameMapping {
    let mut mapping = NameMapping::new();
    for path in paths {
        let path = path.as_ref();
        if mapping.len() == ids.len() {
            tracing::debug!("all identifiers resolved, skipping remaining dictionaries");
            break;
        }
        let bytes = match load_buffer(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping dictionary file");
                continue;
            }
        };
        let found = mapping.absorb(ids, &bytes);
        tracing::debug!(
            path = %path.display(),
            bytes = bytes.len(),
            found,
            "searched dictionary file"
        );
    }
    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn name_precedes_separator() {
        let dict = b"junk\x00Apple\x01\x00\x00\x005-apple.base\x00more";
        assert_eq!(find_item_name(b"5-apple.base", dict), Some("Apple".to_string()));
    }

    #[test]
    fn zero_first_byte_rejects_occurrence() {
        let dict = b"\x00Wrong\x00\x00\x00\x005-apple.base\x00Right\x07\x00\x00\x005-apple.base";
        assert_eq!(find_item_name(b"5-apple.base", dict), Some("Right".to_string()));
    }

    #[test]
    fn nonzero_tail_byte_rejects_occurrence() {
        let dict = b"\x00Nope\x01\x00\x01\x005-apple.base";
        assert_eq!(find_item_name(b"5-apple.base", dict), None);
    }

    #[test]
    fn name_runs_to_start_of_buffer() {
        let dict = b"Iron Plate\x0a\x00\x00\x0012-plate.base";
        assert_eq!(
            find_item_name(b"12-plate.base", dict),
            Some("Iron Plate".to_string())
        );
    }

    #[test]
    fn blank_name_continues_search() {
        let dict = b"\x00  \x02\x00\x00\x001-x.mod\x00Hashish\x02\x00\x00\x001-x.mod";
        assert_eq!(find_item_name(b"1-x.mod", dict), Some("Hashish".to_string()));
    }

    #[test]
    fn identifier_at_start_has_no_separator() {
        assert_eq!(find_item_name(b"1-x.mod", b"1-x.mod\x00"), None);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let dict = b"\x00Caf\xff\x01\x00\x00\x001-x.mod";
        assert_eq!(find_item_name(b"1-x.mod", dict), Some("Caf\u{fffd}".to_string()));
    }

    #[test]
    fn first_dictionary_wins() {
        let first = b"\x00Apple\x01\x00\x00\x005-apple.base".to_vec();
        let second = b"\x00Pomme\x01\x00\x00\x005-apple.base\x00Pear\x01\x00\x00\x006-pear.mod".to_vec();
        let wanted = ids(&["5-apple.base", "6-pear.mod", "7-missing.base"]);

        let mapping = resolve_names(&wanted, [first, second]);
        assert_eq!(mapping.get("5-apple.base"), Some("Apple"));
        assert_eq!(mapping.get("6-pear.mod"), Some("Pear"));
        assert_eq!(mapping.display_name("7-missing.base"), "7-missing.base");
        assert_eq!(mapping.unresolved(&wanted), vec!["7-missing.base"]);
    }
}
