//! Filesystem utilities shared by the folder tree and the collector.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use walkdir::WalkDir;

use crate::error::{Error, IoContext, Result};

/// Remove `path` if it exists, then create it empty.
pub fn recreate_dir(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path)
            .with_context(|| format!("removing existing directory '{}'", path.display()))?;
    }
    fs::create_dir_all(path)
        .with_context(|| format!("creating directory '{}'", path.display()))
}

/// Recursively copy a directory, preserving symlinks.
///
/// `dst` is created if it doesn't exist.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    copy_dir_filtered(src, dst, None)
}

/// Like [`copy_dir_recursive`], leaving out `exclude` (relative to `src`)
/// and everything below it.
pub fn copy_dir_excluding(src: &Path, dst: &Path, exclude: &Path) -> Result<()> {
    copy_dir_filtered(src, dst, Some(exclude))
}

fn copy_dir_filtered(src: &Path, dst: &Path, exclude: Option<&Path>) -> Result<()> {
    let walker = WalkDir::new(src)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| match (exclude, entry.path().strip_prefix(src)) {
            (Some(exclude), Ok(relative)) => relative != exclude,
            _ => true,
        });
    for entry in walker {
        let entry = entry.map_err(|e| Error::Io {
            context: format!("walking '{}'", src.display()),
            source: e.into(),
        })?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let dst_path = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let target = fs::read_link(entry.path())
                .with_context(|| format!("reading symlink '{}'", entry.path().display()))?;
            std::os::unix::fs::symlink(&target, &dst_path)
                .with_context(|| format!("creating symlink '{}'", dst_path.display()))?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&dst_path)
                .with_context(|| format!("creating directory '{}'", dst_path.display()))?;
        } else {
            fs::copy(entry.path(), &dst_path).with_context(|| {
                format!(
                    "copying '{}' to '{}'",
                    entry.path().display(),
                    dst_path.display()
                )
            })?;
        }
    }
    Ok(())
}

/// Write `content` to `path` and make it executable by everyone.
pub fn write_executable(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("writing '{}'", path.display()))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o777))
        .with_context(|| format!("setting permissions '{}'", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_recreate_dir_empties_existing() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("build");
        fs::create_dir_all(dir.join("old/nested")).unwrap();
        fs::write(dir.join("old/file.txt"), "stale").unwrap();

        recreate_dir(&dir).unwrap();

        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_copy_dir_recursive() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");

        fs::create_dir_all(src.join("subdir")).unwrap();
        fs::write(src.join("file.txt"), "hello").unwrap();
        fs::write(src.join("subdir/nested.txt"), "world").unwrap();
        std::os::unix::fs::symlink("file.txt", src.join("link")).unwrap();

        copy_dir_recursive(&src, &dst).unwrap();

        assert_eq!(fs::read_to_string(dst.join("file.txt")).unwrap(), "hello");
        assert_eq!(
            fs::read_to_string(dst.join("subdir/nested.txt")).unwrap(),
            "world"
        );
        assert!(dst.join("link").is_symlink());
        assert_eq!(
            fs::read_link(dst.join("link")).unwrap().to_str().unwrap(),
            "file.txt"
        );
    }

    #[test]
    fn test_copy_dir_excluding_skips_subtree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");

        fs::create_dir_all(src.join("state/dist/old")).unwrap();
        fs::create_dir_all(src.join("state/profiles")).unwrap();
        fs::write(src.join("file.txt"), "hello").unwrap();
        fs::write(src.join("state/dist/old/pkg.deb"), "deb").unwrap();

        copy_dir_excluding(&src, &dst, Path::new("state/dist")).unwrap();

        assert_eq!(fs::read_to_string(dst.join("file.txt")).unwrap(), "hello");
        assert!(dst.join("state/profiles").is_dir());
        assert!(!dst.join("state/dist").exists());
    }

    #[test]
    fn test_write_executable_sets_mode() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("buildscript.sh");

        write_executable(&script, "#!/bin/sh\n").unwrap();

        let mode = fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
        assert_eq!(fs::read_to_string(&script).unwrap(), "#!/bin/sh\n");
    }
}
