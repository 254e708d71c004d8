//! Builds native OS packages inside disposable containers.
//!
//! A build specification (application, version, source, target profile,
//! dependencies, lifecycle scripts) is rendered through the profile's script
//! template, written into a per-build directory and run by a build machine
//! that mounts that directory. Whatever package files the script leaves
//! behind are collected into the output folder.
//!
//! - **Configuration** - raw key/value input resolved into a typed specification
//! - **Profiles** - profile id to container image and script template
//! - **Rendering** - script templates filled from the specification
//! - **Folder tree** - per-build working directories below a shared base
//! - **Build machines** - Docker containers that run the script
//! - **Collection** - package files copied to the output folder
//!
//! # Architecture
//!
//! ```text
//! config::resolve ──► BuildSpecification
//!                          │
//! ProfileRegistry::lookup ─┤
//!                          ▼
//!               TemplateRenderer::render
//!                          │
//!                          ▼
//!   BuildFolderTree::{reset_base, create, populate}
//!                          │
//!                          ▼
//!        BuildMachine::{launch, shutdown}
//!                          │
//!                          ▼
//!                  collect_artifacts
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use package_builder::{config, Builder, DockerProvider, EnvSnapshot, Settings};
//!
//! let settings = Settings::from_env();
//! let provider = DockerProvider::new(settings.machine_logs);
//! let mut builder = Builder::new(settings)?;
//! let params = config::BuildParameters {
//!     app: Some("demo".into()),
//!     version: Some("1.0".into()),
//!     profile: Some("ubuntu-trusty".into()),
//!     source_directory: Some("/src/demo".into()),
//!     ..Default::default()
//! };
//! let resolved = config::resolve(params, &EnvSnapshot::capture())?;
//! let report = builder.build_package(resolved, &provider)?;
//! ```

pub mod collect;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod machine;
pub mod orchestrator;
pub mod preflight;
pub mod profile;
pub mod render;
pub mod settings;
pub mod source;
pub mod spec;
pub mod tree;

pub use config::interpolate::EnvSnapshot;
pub use config::{BuildParameters, ResolvedConfiguration};
pub use error::{ConfigError, Error, Result};
pub use machine::{BuildMachine, DockerProvider, MachineProvider, ScriptExit};
pub use orchestrator::{BatchSummary, BuildReport, Builder, ExitPolicy};
pub use profile::{BuildProfile, ProfileRegistry};
pub use settings::Settings;
pub use source::SourceReference;
pub use spec::BuildSpecification;
