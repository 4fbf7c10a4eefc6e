/// Town names whose occurrences in a save file open a markup segment.
///
/// Matching is exact and case-sensitive. The list is not exhaustive; it is
/// the set of settlements the heuristics were tuned against.
pub const DEFAULT_CITY_NAMES: &[&str] = &[
    "Admag",
    "Bark",
    "Black Desert City",
    "Black Scratch",
    "Blister Hill",
    "Brink",
    "Catun",
    "Clownsteady",
    "Crab Town",
    "Drifter's Last",
    "Eyesocket",
    "Flats Lagoon",
    "Floodlands",
    "Free Settlement",
    "Grayflayer Village",
    "Heft",
    "Heng",
    "Hub",
    "Kral's Chosen",
    "Last Stand",
    "Mongrel",
    "Mourn",
    "Okran's Fist",
    "Okran's Gulf",
    "Okran's Pride",
    "Okran's Shield",
    "Rebirth",
    "Rot",
    "Shark",
    "Sho-Battai",
    "Squin",
    "Stack",
    "Stoat",
    "The Great Fortress",
    "The Hook",
    "Tinfist's Hideout",
    "Trader's Edge",
    "Treg's Tower",
    "Waystation",
    "World's End",
];

pub(crate) fn default_city_names() -> Vec<String> {
    DEFAULT_CITY_NAMES.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::DEFAULT_CITY_NAMES;
    use std::collections::HashSet;

    #[test]
    fn forty_distinct_names() {
        let set: HashSet<_> = DEFAULT_CITY_NAMES.iter().collect();
        assert_eq!(DEFAULT_CITY_NAMES.len(), 40);
        assert_eq!(set.len(), 40);
    }
}
