//! On-disk working area of a build.
//!
//! ```text
//! <base>/                         recreated at the start of every run
//!   <app>-<version>-<profile>/    mounted into the build machine
//!     scratch/
//!       buildscript.sh
//!       .pip/                     only when local credentials are reused
//!       <source basename>/        only for local sources
//!     *.deb | *.rpm               produced by the build script
//! ```
//!
//! The base path is shared by every build of the process and nothing guards
//! it against concurrent runs; callers serialize invocations.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoContext, Result};
use crate::filesystem::{copy_dir_excluding, copy_dir_recursive, recreate_dir, write_executable};
use crate::settings::{CREDENTIALS_DIR, SCRATCH_BUILDSCRIPT_NAME, SCRATCH_DIR};
use crate::spec::BuildSpecification;

/// Directories of one build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFolders {
    pub build_dir: PathBuf,
    pub scratch_dir: PathBuf,
}

impl BuildFolders {
    pub fn script_path(&self) -> PathBuf {
        self.scratch_dir.join(SCRATCH_BUILDSCRIPT_NAME)
    }
}

/// Manages the base directory and the per-build directories below it.
#[derive(Debug, Clone)]
pub struct BuildFolderTree {
    base: PathBuf,
}

impl BuildFolderTree {
    pub fn new(base: &Path) -> Self {
        Self {
            base: base.to_path_buf(),
        }
    }

    /// Compute the build's directories and record them onto `spec`.
    ///
    /// Nothing is created on disk.
    pub fn plan(&self, spec: &mut BuildSpecification) -> BuildFolders {
        let build_dir = self.base.join(spec.build_name());
        let scratch_dir = build_dir.join(SCRATCH_DIR);
        spec.record_folders(build_dir.clone(), scratch_dir.clone());
        BuildFolders {
            build_dir,
            scratch_dir,
        }
    }

    /// Delete the base directory with every previous build, then recreate it.
    pub fn reset_base(&self) -> Result<()> {
        tracing::info!("resetting build base directory {}", self.base.display());
        recreate_dir(&self.base)
    }

    /// Create the build directory and its scratch directory from scratch.
    pub fn create(&self, spec: &mut BuildSpecification) -> Result<BuildFolders> {
        let folders = self.plan(spec);
        recreate_dir(&folders.build_dir)?;
        fs::create_dir(&folders.scratch_dir).with_context(|| {
            format!(
                "creating scratch directory '{}'",
                folders.scratch_dir.display()
            )
        })?;
        tracing::debug!("created build directory {}", folders.build_dir.display());
        Ok(folders)
    }

    /// Fill the scratch directory: script, optional credentials, local source.
    ///
    /// Git sources are left to the script, which clones inside the machine.
    pub fn populate(
        &self,
        spec: &BuildSpecification,
        script: &str,
        credentials_dir: &Path,
    ) -> Result<PathBuf> {
        let scratch_dir = spec.scratch_dir.as_deref().ok_or_else(|| Error::Io {
            context: format!("populating build '{}'", spec.name),
            source: io::Error::new(io::ErrorKind::NotFound, "build folders were not created"),
        })?;

        let script_path = scratch_dir.join(SCRATCH_BUILDSCRIPT_NAME);
        write_executable(&script_path, script)?;
        tracing::debug!("wrote build script {}", script_path.display());

        if spec.use_local_pip_conf {
            if !credentials_dir.is_dir() {
                return Err(Error::Io {
                    context: format!(
                        "copying credentials '{}'",
                        credentials_dir.display()
                    ),
                    source: io::Error::new(io::ErrorKind::NotFound, "directory does not exist"),
                });
            }
            copy_dir_recursive(credentials_dir, &scratch_dir.join(CREDENTIALS_DIR))?;
        }

        if let Some(source_path) = spec.source.local_path() {
            if !source_path.exists() {
                return Err(Error::SourcePathMissing {
                    path: source_path.to_path_buf(),
                });
            }
            let destination = scratch_dir.join(spec.source.project_root());
            tracing::info!(
                "copying local source {} to {}",
                source_path.display(),
                destination.display()
            );
            match nested_base(source_path, &self.base) {
                Some(relative) => {
                    tracing::warn!(
                        "build base {} lies inside source {}; leaving it out of the copy",
                        self.base.display(),
                        source_path.display()
                    );
                    copy_dir_excluding(source_path, &destination, &relative)?;
                }
                None => copy_dir_recursive(source_path, &destination)?,
            }
        }

        Ok(script_path)
    }
}

/// Location of `base` relative to `source` when the base is inside it.
fn nested_base(source: &Path, base: &Path) -> Option<PathBuf> {
    let source = source.canonicalize().ok()?;
    let base = base.canonicalize().ok()?;
    base.strip_prefix(&source).ok().map(Path::to_path_buf)
}
