use regex::bytes::Regex;
use std::collections::BTreeSet;

use crate::Result;

/// Raw-byte grammar for item identifiers such as `1234-iron_plate.base`.
///
/// `(?-u)` keeps `[^.\x00]` byte-oriented so the pattern can walk over
/// arbitrary binary data; UTF-8 validity is checked per match afterwards.
pub const ITEM_ID_PATTERN: &str = r"(?-u)\d+-[^.\x00]+\.(?:base|mod)";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenMatch {
    pub text: String,
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CityOccurrence {
    pub name: String,
    pub offset: usize,
}

pub fn item_id_regex() -> Result<Regex> {
    Ok(Regex::new(ITEM_ID_PATTERN)?)
}

/// Every non-overlapping match of `grammar` in discovery order. Spans that
/// are not valid UTF-8 are dropped.
pub fn scan_tokens(buffer: &[u8], grammar: &Regex) -> Vec<TokenMatch> {
    let mut out = Vec::new();
    for m in grammar.find_iter(buffer) {
        match std::str::from_utf8(m.as_bytes()) {
            Ok(text) => out.push(TokenMatch {
                text: text.to_string(),
                offset: m.start(),
            }),
            Err(_) => {
                tracing::warn!(
                    offset = m.start(),
                    "could not decode item identifier as UTF-8, skipping"
                );
            }
        }
    }
    out
}

/// Distinct item identifiers, sorted lexicographically.
pub fn unique_item_ids(buffer: &[u8], grammar: &Regex) -> BTreeSet<String> {
    scan_tokens(buffer, grammar)
        .into_iter()
        .map(|t| t.text)
        .collect()
}

/// Builds a leftmost-first alternation over the literal names. Returns
/// `None` for an empty list, which would otherwise match everywhere.
pub fn literal_regex<S: AsRef<str>>(literals: &[S]) -> Result<Option<Regex>> {
    let alternatives: Vec<String> = literals
        .iter()
        .map(|s| s.as_ref())
        .filter(|s| !s.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    Ok(Some(Regex::new(&alternatives.join("|"))?))
}

pub fn scan_literals(buffer: &[u8], literals: &Regex) -> Vec<TokenMatch> {
    scan_tokens(buffer, literals)
}

/// City matches sorted ascending by offset.
pub fn scan_cities<S: AsRef<str>>(buffer: &[u8], names: &[S]) -> Result<Vec<CityOccurrence>> {
    let Some(regex) = literal_regex(names)? else {
        return Ok(Vec::new());
    };
    let mut cities: Vec<CityOccurrence> = scan_literals(buffer, &regex)
        .into_iter()
        .map(|t| CityOccurrence {
            name: t.text,
            offset: t.offset,
        })
        .collect();
    cities.sort_by_key(|c| c.offset);
    Ok(cities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn finds_base_and_mod_identifiers() {
        let buf = b"\x00\x0112-iron plate.base\xff\xff\x0077-hashish.mod\x00";
        let re = item_id_regex().unwrap();
        let found = scan_tokens(buf, &re);
        assert_eq!(
            found,
            vec![
                TokenMatch {
                    text: "12-iron plate.base".to_string(),
                    offset: 2,
                },
                TokenMatch {
                    text: "77-hashish.mod".to_string(),
                    offset: 23,
                },
            ]
        );
    }

    #[test]
    fn drops_invalid_utf8_spans() {
        let buf = b"5-bad\xc3\x28name.base 6-good.mod";
        let re = item_id_regex().unwrap();
        let ids = unique_item_ids(buf, &re);
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["6-good.mod"]);
    }

    #[test]
    fn null_byte_breaks_identifier() {
        let buf = b"5-ap\x00ple.base";
        let re = item_id_regex().unwrap();
        assert!(scan_tokens(buf, &re).is_empty());
    }

    #[test]
    fn duplicates_collapse() {
        let buf = b"1-a.base..1-a.base..0-b.mod";
        let re = item_id_regex().unwrap();
        let ids: Vec<_> = unique_item_ids(buf, &re).into_iter().collect();
        assert_eq!(ids, vec!["0-b.mod", "1-a.base"]);
    }

    #[test]
    fn cities_are_sorted_by_offset() {
        let buf = b"..Hub....Squin..Hub..";
        let cities = scan_cities(buf, &["Squin", "Hub"]).unwrap();
        let got: Vec<_> = cities.iter().map(|c| (c.name.as_str(), c.offset)).collect();
        assert_eq!(got, vec![("Hub", 2), ("Squin", 9), ("Hub", 16)]);
    }

    #[test]
    fn city_names_with_regex_metacharacters_match_literally() {
        let buf = b"Okran's Fist|Sho-Battai";
        let cities = scan_cities(buf, &["Okran's Fist", "Sho-Battai"]).unwrap();
        assert_eq!(cities.len(), 2);
        assert_eq!(cities[1].offset, 13);
    }

    #[test]
    fn empty_city_list_matches_nothing() {
        let names: [&str; 0] = [];
        assert!(scan_cities(b"anything", &names).unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn every_match_satisfies_grammar(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let re = item_id_regex().unwrap();
            let mut last_end = 0usize;
            for tok in scan_tokens(&bytes, &re) {
                let span = &bytes[tok.offset..tok.offset + tok.text.len()];
                prop_assert_eq!(span, tok.text.as_bytes());
                prop_assert!(tok.offset >= last_end);
                last_end = tok.offset + tok.text.len();

                let (head, rest) = tok.text.split_once('-').unwrap();
                prop_assert!(!head.is_empty() && head.bytes().all(|b| b.is_ascii_digit()));
                let (name, suffix) = rest.rsplit_once('.').unwrap();
                prop_assert!(suffix == "base" || suffix == "mod");
                prop_assert!(!name.is_empty());
                prop_assert!(!name.bytes().any(|b| b == b'.' || b == 0));
            }
        }
    }
}
