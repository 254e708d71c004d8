//! Artifact collection.
//!
//! An artifact is any regular file directly inside the per-build directory
//! whose name carries an extension. Nothing stronger identifies a package,
//! so the script never leaves stray files with extensions there.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoContext, Result};
use crate::settings::{SCRATCH_BUILDSCRIPT_NAME, SCRIPT_EXTENSION};
use crate::spec::BuildSpecification;

/// Copy the produced packages into `output_folder`, creating it if needed.
///
/// Returns the destination paths in name order.
pub fn collect_artifacts(spec: &BuildSpecification, output_folder: &Path) -> Result<Vec<PathBuf>> {
    let build_dir = spec.build_tmp_dir.as_deref().ok_or_else(|| Error::Io {
        context: format!("collecting artifacts of '{}'", spec.name),
        source: std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "build folders were not created",
        ),
    })?;

    fs::create_dir_all(output_folder)
        .with_context(|| format!("creating output folder '{}'", output_folder.display()))?;

    let mut artifacts = Vec::new();
    for entry in fs::read_dir(build_dir)
        .with_context(|| format!("listing build directory '{}'", build_dir.display()))?
    {
        let entry = entry
            .with_context(|| format!("listing build directory '{}'", build_dir.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("inspecting '{}'", entry.path().display()))?;
        if !file_type.is_file() || Path::new(&entry.file_name()).extension().is_none() {
            continue;
        }
        artifacts.push(entry.path());
    }
    artifacts.sort();

    let mut collected = Vec::with_capacity(artifacts.len());
    for source in artifacts {
        let Some(file_name) = source.file_name() else {
            continue;
        };
        let destination = output_folder.join(file_name);
        fs::copy(&source, &destination).with_context(|| {
            format!(
                "copying artifact '{}' to '{}'",
                source.display(),
                destination.display()
            )
        })?;
        tracing::info!("collected {}", destination.display());
        collected.push(destination);
    }

    if collected.is_empty() {
        tracing::warn!("build '{}' produced no artifacts", spec.name);
    }
    Ok(collected)
}

/// Copy the rendered script into `output_folder` as `<build name>.sh`.
pub fn collect_script(spec: &BuildSpecification, output_folder: &Path) -> Result<PathBuf> {
    let scratch_dir = spec.scratch_dir.as_deref().ok_or_else(|| Error::Io {
        context: format!("collecting script of '{}'", spec.name),
        source: std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "build folders were not created",
        ),
    })?;
    let source = scratch_dir.join(SCRATCH_BUILDSCRIPT_NAME);

    fs::create_dir_all(output_folder)
        .with_context(|| format!("creating output folder '{}'", output_folder.display()))?;
    let destination =
        output_folder.join(format!("{}.{}", spec.build_name(), SCRIPT_EXTENSION));
    fs::copy(&source, &destination).with_context(|| {
        format!(
            "copying script '{}' to '{}'",
            source.display(),
            destination.display()
        )
    })?;
    tracing::info!("wrote build script copy {}", destination.display());
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::interpolate::EnvSnapshot;
    use crate::source::SourceReference;
    use crate::spec::SpecInput;
    use crate::tree::BuildFolderTree;
    use tempfile::TempDir;

    fn created_spec(base: &Path) -> BuildSpecification {
        let mut spec = BuildSpecification::new(
            SpecInput::new(
                "demo",
                "1.0",
                SourceReference::Git {
                    uri: "https://github.com/example/demo".to_string(),
                    branch: "master".to_string(),
                },
                "centos7",
            ),
            &EnvSnapshot::default(),
        )
        .unwrap();
        BuildFolderTree::new(base).create(&mut spec).unwrap();
        spec
    }

    #[test]
    fn test_collects_only_files_with_extension() {
        let temp = TempDir::new().unwrap();
        let spec = created_spec(&temp.path().join("dist"));
        let build_dir = spec.build_tmp_dir.clone().unwrap();
        fs::write(build_dir.join("demo-1.0-1.x86_64.rpm"), "rpm").unwrap();
        fs::write(build_dir.join("README"), "no extension").unwrap();
        fs::write(build_dir.join(".hidden"), "dotfile").unwrap();
        fs::create_dir(build_dir.join("demo-src.d")).unwrap();
        let output = temp.path().join("out/nested");

        let collected = collect_artifacts(&spec, &output).unwrap();

        assert_eq!(collected, vec![output.join("demo-1.0-1.x86_64.rpm")]);
        let names: Vec<_> = fs::read_dir(&output)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("demo-1.0-1.x86_64.rpm")]);
    }

    #[test]
    fn test_collect_with_no_artifacts_still_creates_folder() {
        let temp = TempDir::new().unwrap();
        let spec = created_spec(&temp.path().join("dist"));
        let output = temp.path().join("out");

        let collected = collect_artifacts(&spec, &output).unwrap();

        assert!(collected.is_empty());
        assert!(output.is_dir());
    }

    #[test]
    fn test_collect_script_uses_build_name() {
        let temp = TempDir::new().unwrap();
        let spec = created_spec(&temp.path().join("dist"));
        let script = spec.scratch_dir.clone().unwrap().join(SCRATCH_BUILDSCRIPT_NAME);
        fs::write(&script, "#!/bin/bash\nfpm\n").unwrap();
        let output = temp.path().join("out");

        let copied = collect_script(&spec, &output).unwrap();

        assert_eq!(copied, output.join("demo-1.0-centos7.sh"));
        assert_eq!(fs::read(&copied).unwrap(), fs::read(&script).unwrap());
    }

    #[test]
    fn test_collect_before_create_fails() {
        let temp = TempDir::new().unwrap();
        let spec = BuildSpecification::new(
            SpecInput::new(
                "demo",
                "1.0",
                SourceReference::Directory {
                    path: PathBuf::from("/tmp/demo"),
                },
                "centos7",
            ),
            &EnvSnapshot::default(),
        )
        .unwrap();

        assert!(collect_artifacts(&spec, temp.path()).is_err());
        assert!(collect_script(&spec, temp.path()).is_err());
    }
}
