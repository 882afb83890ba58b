//! Filesystem utilities for Stitch.

use std::path::{Component, Path, PathBuf};

use crate::error::UtilError;

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    std::fs::create_dir_all(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Write `contents` to `path`, creating parent directories as needed.
///
/// # Errors
/// Returns an error if a parent directory cannot be created or the file cannot be written.
pub fn write_file(path: &Path, contents: &[u8]) -> Result<(), UtilError> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    std::fs::write(path, contents).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Remove a directory and all its contents. No error if the directory is absent.
///
/// # Errors
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Move the directory `src` to `dest`, replacing whatever was at `dest`.
///
/// # Errors
/// Returns an error if the old destination cannot be removed or the rename fails.
pub fn replace_dir(src: &Path, dest: &Path) -> Result<(), UtilError> {
    remove_dir_all_if_exists(dest)?;
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }
    std::fs::rename(src, dest).map_err(|source| UtilError::Io {
        path: dest.display().to_string(),
        source,
    })
}

/// Copy `src` to `dest`, creating parent directories as needed.
///
/// # Errors
/// Returns an error if a parent directory cannot be created or the copy fails.
pub fn copy_file(src: &Path, dest: &Path) -> Result<(), UtilError> {
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }
    std::fs::copy(src, dest).map_err(|source| UtilError::Io {
        path: src.display().to_string(),
        source,
    })?;
    Ok(())
}

/// Collect all files with the given `extension` under `dir`, recursively, sorted by path.
///
/// # Errors
/// Returns an error if `dir` or one of its subdirectories cannot be read.
pub fn collect_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, UtilError> {
    collect_files_where(dir, &|path| has_extension(path, extension))
}

/// Collect all files under `dir` that lack the given `extension`, sorted by path.
///
/// # Errors
/// Returns an error if `dir` or one of its subdirectories cannot be read.
pub fn collect_files_except(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, UtilError> {
    collect_files_where(dir, &|path| !has_extension(path, extension))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e == extension)
}

fn collect_files_where(
    dir: &Path,
    keep: &dyn Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, UtilError> {
    let mut files = Vec::new();
    collect_files_recursive(dir, keep, &mut files)?;
    files.sort();
    Ok(files)
}

fn collect_files_recursive(
    dir: &Path,
    keep: &dyn Fn(&Path) -> bool,
    out: &mut Vec<PathBuf>,
) -> Result<(), UtilError> {
    let entries = std::fs::read_dir(dir).map_err(|source| UtilError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| UtilError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();

        if path.is_dir() {
            collect_files_recursive(&path, keep, out)?;
        } else if keep(&path) {
            out.push(path);
        }
    }

    Ok(())
}

/// Resolve `.` and `..` components without touching the filesystem.
///
/// `..` removes the preceding normal component. Leading `..` on a relative
/// path is kept, and `..` directly under the root is dropped.
pub fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

/// Render `path` relative to `root` with `/` separators, as used in class names and globs.
///
/// Returns `None` if `path` is not under `root` or is not valid UTF-8.
pub fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}
