//! Build script rendering.
//!
//! Templates are looked up first among the built-in templates compiled into
//! the binary, then in the local profiles directory. The template sees every
//! field of the build specification plus:
//!
//! - `local_uid` / `local_gid` - owner for files produced inside the machine
//! - `project_root` - directory name of the checked out or copied source
//! - `shared_dir` - mount point of the build directory inside the machine
//! - `scratch_folder_name` - name of the scratch directory

use minijinja::{Environment, ErrorKind};
use nix::unistd::{getgid, getuid};
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::profile::BuildProfile;
use crate::settings::{SCRATCH_DIR, SHARED_DIR};
use crate::spec::BuildSpecification;

/// Script templates shipped with the built-in profiles.
pub const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("debian.sh", include_str!("../profiles/debian.sh")),
    ("centos.sh", include_str!("../profiles/centos.sh")),
];

/// User and group that should own the produced artifacts on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostIdentity {
    pub uid: u32,
    pub gid: u32,
}

impl HostIdentity {
    /// Identity of the invoking process.
    pub fn current() -> Self {
        Self {
            uid: getuid().as_raw(),
            gid: getgid().as_raw(),
        }
    }
}

/// Renders profile templates against build specifications.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    local_dir: PathBuf,
    host: HostIdentity,
}

impl TemplateRenderer {
    pub fn new(local_dir: &Path, host: HostIdentity) -> Self {
        Self {
            local_dir: local_dir.to_path_buf(),
            host,
        }
    }

    /// Render the profile's script for `spec`.
    ///
    /// Identical inputs always produce identical text.
    pub fn render(&self, spec: &BuildSpecification, profile: &BuildProfile) -> Result<String> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);
        let local_dir = self.local_dir.clone();
        env.set_loader(move |name| load_template(&local_dir, name));

        let template = env.get_template(&profile.script).map_err(|e| {
            if e.kind() == ErrorKind::TemplateNotFound {
                Error::TemplateNotFound {
                    template: profile.script.clone(),
                }
            } else {
                Error::Template(e)
            }
        })?;

        let mut context = match serde_json::to_value(spec) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => serde_json::Map::new(),
            Err(e) => {
                return Err(Error::Template(minijinja::Error::new(
                    ErrorKind::BadSerialization,
                    e.to_string(),
                )))
            }
        };
        context.insert("local_uid".into(), self.host.uid.into());
        context.insert("local_gid".into(), self.host.gid.into());
        context.insert("project_root".into(), spec.source.project_root().into());
        context.insert("shared_dir".into(), SHARED_DIR.into());
        context.insert("scratch_folder_name".into(), SCRATCH_DIR.into());

        Ok(template.render(&context)?)
    }
}

fn load_template(
    local_dir: &Path,
    name: &str,
) -> std::result::Result<Option<String>, minijinja::Error> {
    if let Some((_, source)) = BUILTIN_TEMPLATES.iter().find(|(builtin, _)| *builtin == name) {
        return Ok(Some((*source).to_string()));
    }

    let relative = Path::new(name);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Ok(None);
    }

    let path = local_dir.join(relative);
    if !path.is_file() {
        return Ok(None);
    }
    fs::read_to_string(&path).map(Some).map_err(|e| {
        minijinja::Error::new(
            ErrorKind::InvalidOperation,
            format!("reading template '{}'", path.display()),
        )
        .with_source(e)
    })
}
