//! Where the source of a build comes from.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Source reference of a build.
///
/// Serialized with a `type` tag so templates can branch on `source.type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceReference {
    /// Remote repository, cloned by the build script inside the machine.
    Git { uri: String, branch: String },
    /// Local clone, copied into the scratch directory and checked out there.
    GitDirectory { path: PathBuf, branch: String },
    /// Plain local directory, copied into the scratch directory.
    Directory { path: PathBuf },
}

impl SourceReference {
    /// Name of the project directory as seen by the build script.
    ///
    /// Basename of the URI or local path, ignoring trailing separators.
    pub fn project_root(&self) -> String {
        match self {
            SourceReference::Git { uri, .. } => basename(uri.trim_end_matches('/')),
            SourceReference::GitDirectory { path, .. } | SourceReference::Directory { path } => {
                basename(path.to_string_lossy().trim_end_matches('/'))
            }
        }
    }

    /// Host path that has to be copied before the build, if any.
    pub fn local_path(&self) -> Option<&Path> {
        match self {
            SourceReference::Git { .. } => None,
            SourceReference::GitDirectory { path, .. } | SourceReference::Directory { path } => {
                Some(path)
            }
        }
    }
}

fn basename(value: &str) -> String {
    value.rsplit('/').next().unwrap_or_default().to_string()
}
