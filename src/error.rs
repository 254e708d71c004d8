//! Error types for package builds.
//!
//! Every failure of an orchestration run surfaces as one of these variants.
//! Nothing is retried and partially created directories are left in place.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for build orchestration.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or contradictory configuration input.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The requested profile id is not in the registry.
    #[error("profile not found: {profile}")]
    ProfileNotFound { profile: String },

    /// A profile file could not be parsed.
    #[error("invalid profile definitions in {origin}: {message}")]
    ProfileDefinition { origin: String, message: String },

    /// The profile references a template that exists in neither location.
    #[error("template not found: {template}")]
    TemplateNotFound { template: String },

    /// The template exists but failed to parse or render.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),

    /// A local source path is absent at population time.
    #[error("path does not exist: {}", path.display())]
    SourcePathMissing { path: PathBuf },

    /// The isolated build environment could not be launched or torn down.
    #[error("build machine failure: {message}")]
    BuildMachine { message: String },

    /// The build script ran but exited unsuccessfully.
    #[error("build script for '{build}' exited with {}", describe_exit(*code))]
    BuildFailed { build: String, code: Option<i32> },

    /// Filesystem failure with a description of what was being done.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn machine(message: impl Into<String>) -> Self {
        Error::BuildMachine {
            message: message.into(),
        }
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "no status (terminated by signal)".to_string(),
    }
}

/// Configuration resolution errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("conflicting source fields: {first} and {second} are mutually exclusive")]
    ConflictingSources {
        first: &'static str,
        second: &'static str,
    },

    #[error("unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("environment variable '{variable}' referenced by '{field}' is not set")]
    UnknownEnvironmentVariable { field: &'static str, variable: String },

    #[error("unbalanced brace in '{field}': {value}")]
    UnbalancedPlaceholder { field: &'static str, value: String },

    #[error("batch file error: {0}")]
    Batch(String),
}

/// Attach a human-readable context to `std::io` failures.
pub(crate) trait IoContext<T> {
    fn with_context<F, S>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::result::Result<T, std::io::Error> {
    fn with_context<F, S>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::Io {
            context: context().into(),
            source,
        })
    }
}
