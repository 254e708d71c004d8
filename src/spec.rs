//! Fully resolved description of one package build.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::interpolate::{interpolate, EnvSnapshot};
use crate::error::ConfigError;
use crate::settings;
use crate::source::SourceReference;

/// Paths of the maintainer scripts run by the package manager.
///
/// Relative paths are resolved against `<package_tmp_root>/<app>` inside the
/// build machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleScripts {
    pub before_install: Option<String>,
    pub after_install: Option<String>,
    pub before_remove: Option<String>,
    pub after_remove: Option<String>,
    pub before_upgrade: Option<String>,
    pub after_upgrade: Option<String>,
}

impl LifecycleScripts {
    /// Configured scripts as `(fpm flag name, path)` in a fixed order.
    pub fn flags(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("before-install", &self.before_install),
            ("after-install", &self.after_install),
            ("before-remove", &self.before_remove),
            ("after-remove", &self.after_remove),
            ("before-upgrade", &self.before_upgrade),
            ("after-upgrade", &self.after_upgrade),
        ]
        .into_iter()
        .filter_map(|(flag, path)| path.as_deref().map(|p| (flag, p)))
    }
}

/// Typed build input before defaults and environment interpolation.
#[derive(Debug, Clone)]
pub struct SpecInput {
    pub app: String,
    pub version: String,
    pub source: SourceReference,
    pub profile: String,
    pub name: Option<String>,
    pub use_local_pip_conf: bool,
    pub build_deps: Vec<String>,
    pub runtime_deps: Vec<String>,
    pub custom_filename: Option<String>,
    pub fpm_args: String,
    pub pip_args: String,
    pub package_install_root: Option<String>,
    pub package_tmp_root: Option<String>,
    pub working_dir: String,
    pub python_basedir: Option<String>,
    pub compile_python: bool,
    pub python_version: Option<String>,
    pub requirements_path: Option<String>,
    pub scripts: LifecycleScripts,
}

impl SpecInput {
    /// Minimal input; everything optional takes its default.
    pub fn new(app: &str, version: &str, source: SourceReference, profile: &str) -> Self {
        Self {
            app: app.to_string(),
            version: version.to_string(),
            source,
            profile: profile.to_string(),
            name: None,
            use_local_pip_conf: false,
            build_deps: Vec::new(),
            runtime_deps: Vec::new(),
            custom_filename: None,
            fpm_args: String::new(),
            pip_args: String::new(),
            package_install_root: None,
            package_tmp_root: None,
            working_dir: String::new(),
            python_basedir: None,
            compile_python: true,
            python_version: None,
            requirements_path: None,
            scripts: LifecycleScripts::default(),
        }
    }
}

/// Resolved build specification.
///
/// Every field is handed to the script template by name. Only
/// `build_tmp_dir` and `scratch_dir` change after construction; they are
/// recorded by the build folder tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSpecification {
    pub app: String,
    pub version: String,
    pub source: SourceReference,
    pub profile: String,
    pub name: String,
    pub use_local_pip_conf: bool,
    pub build_deps: Vec<String>,
    pub runtime_deps: Vec<String>,
    pub custom_filename: Option<String>,
    pub fpm_args: String,
    pub pip_args: String,
    pub package_install_root: String,
    pub package_tmp_root: String,
    pub working_dir: String,
    pub python_basedir: String,
    pub compile_python: bool,
    pub python_version: String,
    pub requirements_path: String,
    #[serde(flatten)]
    pub scripts: LifecycleScripts,
    pub build_tmp_dir: Option<PathBuf>,
    pub scratch_dir: Option<PathBuf>,
}

impl BuildSpecification {
    /// Apply defaults and interpolate environment placeholders, exactly once.
    pub fn new(input: SpecInput, env: &EnvSnapshot) -> Result<Self, ConfigError> {
        let expand = |field: &'static str, value: &str| interpolate(field, value, env);
        let expand_or = |field: &'static str, value: Option<String>, default: String| {
            interpolate(field, value.as_deref().unwrap_or(&default), env)
        };

        let version = expand("version", &input.version)?;
        let package_install_root = expand_or(
            "package_install_root",
            input.package_install_root,
            settings::PACKAGE_INSTALL_ROOT.to_string(),
        )?;
        let package_tmp_root = expand_or(
            "package_tmp_root",
            input.package_tmp_root,
            settings::PACKAGE_TMP_ROOT.to_string(),
        )?;
        let python_basedir = expand_or(
            "python_basedir",
            input.python_basedir,
            format!("{}/{}", settings::PYTHON_BASEDIR, input.app),
        )?;
        let python_version = expand_or(
            "python_version",
            input.python_version,
            settings::PYTHON_VERSION.to_string(),
        )?;
        let requirements_path = expand_or(
            "requirements_path",
            input.requirements_path,
            settings::REQUIREMENTS_PATH.to_string(),
        )?;
        let working_dir = expand("working_dir", &input.working_dir)?;
        let pip_args = expand("pip_args", &input.pip_args)?;
        let custom_filename = input
            .custom_filename
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(|name| expand("custom_filename", name))
            .transpose()?;

        let fpm_args = script_flags(&input.scripts, &package_tmp_root, &input.app) + &input.fpm_args;
        let name = input
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| safe_build_name(&input.app, &version, &input.profile));

        Ok(Self {
            app: input.app,
            version,
            source: input.source,
            profile: input.profile,
            name,
            use_local_pip_conf: input.use_local_pip_conf,
            build_deps: input.build_deps,
            runtime_deps: input.runtime_deps,
            custom_filename,
            fpm_args,
            pip_args,
            package_install_root,
            package_tmp_root,
            working_dir,
            python_basedir,
            compile_python: input.compile_python,
            python_version,
            requirements_path,
            scripts: input.scripts,
            build_tmp_dir: None,
            scratch_dir: None,
        })
    }

    /// Filesystem-safe name of this build, used for its directory and script.
    pub fn build_name(&self) -> String {
        safe_build_name(&self.app, &self.version, &self.profile)
    }

    pub(crate) fn record_folders(&mut self, build_dir: PathBuf, scratch_dir: PathBuf) {
        self.build_tmp_dir = Some(build_dir);
        self.scratch_dir = Some(scratch_dir);
    }
}

/// `app-version-profile` with every character outside `[A-Za-z0-9.-]`
/// replaced by `_`.
pub fn safe_build_name(app: &str, version: &str, profile: &str) -> String {
    [app, version, profile]
        .join("-")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn script_flags(scripts: &LifecycleScripts, tmp_root: &str, app: &str) -> String {
    scripts
        .flags()
        .map(|(flag, script)| {
            let path = Path::new(tmp_root).join(app).join(script);
            format!("--{flag} {} ", path.display())
        })
        .collect()
}
