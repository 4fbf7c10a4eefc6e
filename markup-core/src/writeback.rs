use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::{MarkupError, Result};

/// Two bytes to overwrite at `offset`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Patch {
    pub offset: u64,
    pub bytes: [u8; 2],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveMode {
    /// Patch `edited_<name>` next to the outputs, leaving the original alone.
    #[default]
    LocalCopy,
    /// Patch the original save file in place.
    DirectWrite,
}

/// Overwrites each patch location in order. There is no rollback: if a
/// write fails, earlier patches stay applied.
pub fn apply_patches(path: &Path, patches: &[Patch]) -> Result<usize> {
    let write_err = |source| MarkupError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(write_err)?;
    for patch in patches {
        file.seek(SeekFrom::Start(patch.offset)).map_err(write_err)?;
        file.write_all(&patch.bytes).map_err(write_err)?;
    }
    file.flush().map_err(write_err)?;
    Ok(patches.len())
}

/// Path of the local working copy for `original` inside `out_dir`.
pub fn local_copy_path(original: &Path, out_dir: &Path) -> Result<PathBuf> {
    let name = original.file_name().ok_or_else(|| {
        MarkupError::Config(format!("save path has no file name: {}", original.display()))
    })?;
    Ok(out_dir.join(format!("edited_{}", name.to_string_lossy())))
}

/// Resolves the file to patch for `mode`, copying the original first when
/// working on a local copy.
pub fn prepare_target(original: &Path, mode: SaveMode, out_dir: &Path) -> Result<PathBuf> {
    match mode {
        SaveMode::DirectWrite => Ok(original.to_path_buf()),
        SaveMode::LocalCopy => {
            let target = local_copy_path(original, out_dir)?;
            fs::create_dir_all(out_dir)?;
            fs::copy(original, &target).map_err(|source| MarkupError::Read {
                path: original.to_path_buf(),
                source,
            })?;
            tracing::info!(copy = %target.display(), "created local copy of save file");
            Ok(target)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_two_bytes_at_each_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.save");
        fs::write(&path, [0u8; 16]).unwrap();

        let patches = [
            Patch {
                offset: 2,
                bytes: [0xd0, 0x07],
            },
            Patch {
                offset: 10,
                bytes: [0xff, 0xff],
            },
        ];
        assert_eq!(apply_patches(&path, &patches).unwrap(), 2);

        let data = fs::read(&path).unwrap();
        assert_eq!(&data[2..4], &[0xd0, 0x07]);
        assert_eq!(&data[10..12], &[0xff, 0xff]);
        assert_eq!(data.len(), 16);
        assert!(data[4..10].iter().all(|&b| b == 0));
    }

    #[test]
    fn local_copy_leaves_original_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let original = dir.path().join("quick.save");
        fs::write(&original, [1u8; 8]).unwrap();
        let out = dir.path().join("out");

        let target = prepare_target(&original, SaveMode::LocalCopy, &out).unwrap();
        assert_eq!(target, out.join("edited_quick.save"));
        apply_patches(
            &target,
            &[Patch {
                offset: 0,
                bytes: [9, 9],
            }],
        )
        .unwrap();

        assert_eq!(fs::read(&original).unwrap(), vec![1u8; 8]);
        assert_eq!(&fs::read(&target).unwrap()[..2], &[9, 9]);
    }

    #[test]
    fn direct_write_targets_original() {
        let original = Path::new("/saves/quick.save");
        let target = prepare_target(original, SaveMode::DirectWrite, Path::new("out")).unwrap();
        assert_eq!(target, original);
    }

    #[test]
    fn missing_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(apply_patches(&dir.path().join("gone.save"), &[]).is_err());
    }
}
