use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

pub const LOCAL_SAVE_DIR: &str = "save";
pub const LOCAL_DATAFILES_DIR: &str = "datafiles";
pub const SAVE_EXTENSION: &str = "save";

const GAME_DATA_DIR: &str = "kenshi";
const STEAM_LIBRARY: &str = "SteamLibrary";
const INSTALL_SUBPATH: &[&str] = &["steamapps", "common", "Kenshi"];

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Regular files directly inside `dir`, sorted by path.
fn files_in(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    files
}

/// `*.save` file in a local `save/` directory, first by name.
pub fn find_local_save(base: &Path) -> Option<PathBuf> {
    let dir = base.join(LOCAL_SAVE_DIR);
    let saves: Vec<PathBuf> = files_in(&dir)
        .into_iter()
        .filter(|p| has_extension(p, SAVE_EXTENSION))
        .collect();
    if saves.len() > 1 {
        tracing::warn!(
            dir = %dir.display(),
            count = saves.len(),
            using = %saves[0].display(),
            "several save files found, using the first"
        );
    }
    saves.into_iter().next()
}

/// Most recently modified `*.save` anywhere below the given roots.
pub fn find_latest_save(roots: &[PathBuf]) -> Option<PathBuf> {
    let mut best: Option<(SystemTime, PathBuf)> = None;
    for root in roots {
        if !root.is_dir() {
            tracing::debug!(dir = %root.display(), "save directory not found");
            continue;
        }
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file() || !has_extension(path, SAVE_EXTENSION) {
                continue;
            }
            let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
                continue;
            };
            if best.as_ref().map_or(true, |(t, _)| modified > *t) {
                best = Some((modified, path.to_path_buf()));
            }
        }
    }
    best.map(|(_, path)| path)
}

/// `<local data dir>/kenshi/save` and `<local data dir>/kenshi`.
pub fn default_save_roots() -> Vec<PathBuf> {
    let Some(base) = dirs::data_local_dir() else {
        return Vec::new();
    };
    let game = base.join(GAME_DATA_DIR);
    vec![game.join("save"), game]
}

/// Local `save/` directory first, then the game's data directory.
pub fn detect_save_file(base: &Path) -> Option<PathBuf> {
    if let Some(path) = find_local_save(base) {
        tracing::info!(path = %path.display(), "using save file from local directory");
        return Some(path);
    }
    let found = find_latest_save(&default_save_roots());
    if let Some(path) = &found {
        tracing::info!(path = %path.display(), "using latest save file from game data directory");
    }
    found
}

/// Drive roots on Windows; nothing elsewhere.
pub fn drive_roots() -> Vec<PathBuf> {
    if cfg!(windows) {
        ('A'..='Z')
            .map(|letter| PathBuf::from(format!("{letter}:\\")))
            .filter(|p| p.is_dir())
            .collect()
    } else {
        Vec::new()
    }
}

fn install_under(dir: &Path) -> Option<PathBuf> {
    let mut path = dir.join(STEAM_LIBRARY);
    for part in INSTALL_SUBPATH {
        path.push(part);
    }
    path.is_dir().then_some(path)
}

fn subdirs(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        tracing::debug!(dir = %dir.display(), "cannot list directory, skipping");
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    dirs
}

/// Looks for `SteamLibrary/steamapps/common/Kenshi` directly under each
/// root, then one and two directory levels down.
pub fn find_install_dir(roots: &[PathBuf]) -> Option<PathBuf> {
    for root in roots {
        tracing::debug!(root = %root.display(), "scanning for game installation");
        if let Some(found) = install_under(root) {
            return Some(found);
        }
        for level1 in subdirs(root) {
            if let Some(found) = install_under(&level1) {
                return Some(found);
            }
            for level2 in subdirs(&level1) {
                if let Some(found) = install_under(&level2) {
                    return Some(found);
                }
            }
        }
    }
    None
}

/// Every `.mod` / `.base` file below `dir`, in path order.
pub fn collect_dictionary_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| has_extension(p, "mod") || has_extension(p, "base"))
        .collect();
    files.sort();
    files
}

/// Local `datafiles/` directory if it has any files, otherwise the game
/// installation found under `roots`.
pub fn detect_dictionary_files(base: &Path, roots: &[PathBuf]) -> Vec<PathBuf> {
    let local = files_in(&base.join(LOCAL_DATAFILES_DIR));
    if !local.is_empty() {
        tracing::info!(count = local.len(), "using dictionary files from local directory");
        return local;
    }
    match find_install_dir(roots) {
        Some(install) => {
            let files = collect_dictionary_files(&install);
            tracing::info!(
                install = %install.display(),
                count = files.len(),
                "using dictionary files from game installation"
            );
            files
        }
        None => {
            tracing::warn!("game installation not found");
            Vec::new()
        }
    }
}
