//! Configuration resolution.
//!
//! Raw key/value input (command-line flags or one batch file section) is
//! checked against the known keys, decoded into [`BuildParameters`] and then
//! resolved into a [`BuildSpecification`] plus the output settings that live
//! outside the specification.
//!
//! - [`batch`] - Batch files with `[DEFAULT]` inheritance
//! - [`interpolate`] - `{NAME}` environment placeholders

pub mod batch;
pub mod interpolate;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::settings;
use crate::source::SourceReference;
use crate::spec::{BuildSpecification, LifecycleScripts, SpecInput};
use interpolate::EnvSnapshot;

/// Untyped configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Flag(bool),
    Text(String),
    List(Vec<String>),
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Flag(value)
    }
}

/// Raw parameter name to value mapping.
pub type RawParameters = BTreeMap<String, RawValue>;

/// Every key accepted in raw input.
pub const KNOWN_KEYS: &[&str] = &[
    "app",
    "version",
    "profile",
    "name",
    "source_git",
    "source_git_directory",
    "source_directory",
    "use_local_pip_conf",
    "build_deps",
    "runtime_deps",
    "custom_filename",
    "fpm_args",
    "pip_args",
    "package_install_root",
    "package_tmp_root",
    "working_dir",
    "python_basedir",
    "compile_python",
    "python_version",
    "requirements_path",
    "before_install",
    "after_install",
    "before_remove",
    "after_remove",
    "before_upgrade",
    "after_upgrade",
    "output_folder",
    "output_script",
];

/// Typed, still unresolved build parameters.
///
/// List-like fields accept either a comma-separated string or a list; flag
/// fields accept a boolean or a boolean-ish string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildParameters {
    pub app: Option<String>,
    pub version: Option<String>,
    pub profile: Option<String>,
    pub name: Option<String>,
    pub source_git: Option<RawValue>,
    pub source_git_directory: Option<RawValue>,
    pub source_directory: Option<String>,
    pub use_local_pip_conf: Option<RawValue>,
    pub build_deps: Option<RawValue>,
    pub runtime_deps: Option<RawValue>,
    pub custom_filename: Option<String>,
    pub fpm_args: Option<String>,
    pub pip_args: Option<String>,
    pub package_install_root: Option<String>,
    pub package_tmp_root: Option<String>,
    pub working_dir: Option<String>,
    pub python_basedir: Option<String>,
    pub compile_python: Option<RawValue>,
    pub python_version: Option<String>,
    pub requirements_path: Option<String>,
    pub before_install: Option<String>,
    pub after_install: Option<String>,
    pub before_remove: Option<String>,
    pub after_remove: Option<String>,
    pub before_upgrade: Option<String>,
    pub after_upgrade: Option<String>,
    pub output_folder: Option<String>,
    pub output_script: Option<RawValue>,
}

impl BuildParameters {
    /// Decode raw input, rejecting keys that are not in [`KNOWN_KEYS`].
    pub fn from_raw(raw: &RawParameters) -> Result<Self, ConfigError> {
        if let Some(unknown) = raw.keys().find(|key| !KNOWN_KEYS.contains(&key.as_str())) {
            return Err(ConfigError::UnknownKey(unknown.clone()));
        }
        let value = serde_json::to_value(raw).map_err(|e| ConfigError::InvalidValue {
            field: "parameters".to_string(),
            message: e.to_string(),
        })?;
        serde_json::from_value(value).map_err(|e| ConfigError::InvalidValue {
            field: "parameters".to_string(),
            message: e.to_string(),
        })
    }
}

/// Outcome of resolving one configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfiguration {
    pub spec: BuildSpecification,
    pub output_folder: PathBuf,
    pub output_script: bool,
}

/// Resolve raw key/value input.
pub fn resolve_raw(
    raw: &RawParameters,
    env: &EnvSnapshot,
) -> Result<ResolvedConfiguration, ConfigError> {
    resolve(BuildParameters::from_raw(raw)?, env)
}

/// Resolve typed parameters into a build specification.
pub fn resolve(
    params: BuildParameters,
    env: &EnvSnapshot,
) -> Result<ResolvedConfiguration, ConfigError> {
    let source = resolve_source(&params)?;
    let app = required("app", params.app)?;
    let version = required("version", params.version)?;
    let profile = required("profile", params.profile)?;

    let mut input = SpecInput::new(&app, &version, source, &profile);
    input.name = params.name;
    input.use_local_pip_conf = flag("use_local_pip_conf", params.use_local_pip_conf, false)?;
    input.build_deps = list("build_deps", params.build_deps)?;
    input.runtime_deps = list("runtime_deps", params.runtime_deps)?;
    input.custom_filename = params.custom_filename;
    input.fpm_args = params.fpm_args.as_deref().map(collapse_lines).unwrap_or_default();
    input.pip_args = params.pip_args.as_deref().map(collapse_lines).unwrap_or_default();
    input.package_install_root = params.package_install_root;
    input.package_tmp_root = params.package_tmp_root;
    input.working_dir = params.working_dir.unwrap_or_default();
    input.python_basedir = params.python_basedir;
    input.compile_python = flag("compile_python", params.compile_python, true)?;
    input.python_version = params.python_version;
    input.requirements_path = params.requirements_path;
    input.scripts = LifecycleScripts {
        before_install: params.before_install,
        after_install: params.after_install,
        before_remove: params.before_remove,
        after_remove: params.after_remove,
        before_upgrade: params.before_upgrade,
        after_upgrade: params.after_upgrade,
    };

    let output_script = flag("output_script", params.output_script, false)?;
    let output_folder = params
        .output_folder
        .map(|folder| folder.trim().to_string())
        .filter(|folder| !folder.is_empty())
        .unwrap_or_else(|| settings::OUTPUT_FOLDER.to_string());

    Ok(ResolvedConfiguration {
        spec: BuildSpecification::new(input, env)?,
        output_folder: PathBuf::from(output_folder),
        output_script,
    })
}

fn resolve_source(params: &BuildParameters) -> Result<SourceReference, ConfigError> {
    let present: Vec<&'static str> = [
        ("source_git", params.source_git.is_some()),
        ("source_git_directory", params.source_git_directory.is_some()),
        ("source_directory", params.source_directory.is_some()),
    ]
    .into_iter()
    .filter_map(|(key, set)| set.then_some(key))
    .collect();

    if let [first, second, ..] = present.as_slice() {
        return Err(ConfigError::ConflictingSources {
            first: *first,
            second: *second,
        });
    }

    if let Some(value) = &params.source_git {
        let (uri, branch) = location_and_branch("source_git", value)?;
        return Ok(SourceReference::Git { uri, branch });
    }
    if let Some(value) = &params.source_git_directory {
        let (path, branch) = location_and_branch("source_git_directory", value)?;
        return Ok(SourceReference::GitDirectory {
            path: PathBuf::from(path),
            branch,
        });
    }
    if let Some(directory) = &params.source_directory {
        let directory = directory.trim();
        if directory.is_empty() {
            return Err(ConfigError::MissingField("source_directory"));
        }
        return Ok(SourceReference::Directory {
            path: PathBuf::from(directory),
        });
    }
    Err(ConfigError::MissingField("source"))
}

fn location_and_branch(
    field: &'static str,
    value: &RawValue,
) -> Result<(String, String), ConfigError> {
    match list(field, Some(value.clone()))?.as_slice() {
        [location, branch] if !location.is_empty() && !branch.is_empty() => {
            Ok((location.clone(), branch.clone()))
        }
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected '<location>, <branch>'".to_string(),
        }),
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingField(field))
}

/// Split a comma-separated string; lists pass through unchanged.
fn list(field: &str, value: Option<RawValue>) -> Result<Vec<String>, ConfigError> {
    match value {
        None => Ok(Vec::new()),
        Some(RawValue::List(items)) => Ok(items),
        Some(RawValue::Text(text)) => Ok(text
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()),
        Some(RawValue::Flag(_)) => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: "expected a list or a comma-separated string".to_string(),
        }),
    }
}

fn flag(field: &str, value: Option<RawValue>, default: bool) -> Result<bool, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        field: field.to_string(),
        message,
    };
    match value {
        None => Ok(default),
        Some(RawValue::Flag(flag)) => Ok(flag),
        Some(RawValue::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" | "" => Ok(false),
            other => Err(invalid(format!("'{other}' is not a boolean"))),
        },
        Some(RawValue::List(_)) => Err(invalid("expected a boolean".to_string())),
    }
}

fn collapse_lines(text: &str) -> String {
    text.replace("\r\n", " ").replace('\n', " ")
}
