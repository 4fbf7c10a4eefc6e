use std::fs;
use std::path::Path;

use crate::{MarkupError, Result};

/// Reads a whole file into memory. All offsets reported downstream are
/// relative to the returned buffer.
pub fn load_buffer(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| MarkupError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_whole_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x00\x01Hub\x02").unwrap();
        assert_eq!(load_buffer(file.path()).unwrap(), b"\x00\x01Hub\x02");
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.save");
        let err = load_buffer(&missing).unwrap_err();
        assert!(err.to_string().contains("nope.save"));
    }
}
