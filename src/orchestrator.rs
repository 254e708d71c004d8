//! Build orchestration.
//!
//! One run takes a resolved configuration through a fixed sequence of
//! states:
//!
//! ```text
//! Created -> Resolved -> Rendered -> TreeReady -> Executing -> Finished -> Collected
//! ```
//!
//! There are no backward transitions. A failure aborts the run where it is
//! and leaves any directories it created for inspection; the next run's
//! base reset removes them. Profile lookup, rendering and the host preflight
//! happen before the base directory is touched, so an unknown profile, a
//! missing template or a host without docker never destroys earlier output.

use std::fmt;
use std::path::PathBuf;

use crate::collect::{collect_artifacts, collect_script};
use crate::config::batch::BatchEntry;
use crate::config::interpolate::EnvSnapshot;
use crate::config::{resolve_raw, ResolvedConfiguration};
use crate::error::{Error, Result};
use crate::machine::{MachineProvider, ScriptExit};
use crate::profile::ProfileRegistry;
use crate::render::{HostIdentity, TemplateRenderer};
use crate::settings::Settings;
use crate::tree::BuildFolderTree;

/// What to do when the build script exits unsuccessfully.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExitPolicy {
    /// Fail the build after the machine is shut down.
    #[default]
    Fail,
    /// Log a warning and collect whatever was produced.
    Ignore,
}

/// Progress of a single orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BuildState {
    Created,
    Resolved,
    Rendered,
    TreeReady,
    Executing,
    Finished,
    Collected,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildState::Created => "created",
            BuildState::Resolved => "resolved",
            BuildState::Rendered => "rendered",
            BuildState::TreeReady => "tree-ready",
            BuildState::Executing => "executing",
            BuildState::Finished => "finished",
            BuildState::Collected => "collected",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub build: String,
    pub exit: ScriptExit,
    /// Packages copied into the output folder.
    pub artifacts: Vec<PathBuf>,
    /// Copy of the rendered script, when requested.
    pub script: Option<PathBuf>,
}

/// Results of a batch, in file order.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub succeeded: Vec<BuildReport>,
    pub failed: Vec<(String, Error)>,
    /// Sections never attempted because an earlier build failed.
    pub skipped: Vec<String>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Tracks and logs the state of one run.
struct Run {
    build: String,
    state: BuildState,
}

impl Run {
    fn new(build: String) -> Self {
        tracing::debug!("[{}] {}", build, BuildState::Created);
        Self {
            build,
            state: BuildState::Created,
        }
    }

    fn advance(&mut self, next: BuildState) {
        debug_assert!(next > self.state);
        tracing::debug!("[{}] {} -> {}", self.build, self.state, next);
        self.state = next;
    }
}

/// Drives builds from resolved configuration to collected packages.
pub struct Builder {
    settings: Settings,
    registry: ProfileRegistry,
    renderer: TemplateRenderer,
    tree: BuildFolderTree,
    exit_policy: ExitPolicy,
}

impl Builder {
    /// Builder over the embedded profiles plus the user's profile directory.
    pub fn new(settings: Settings) -> Result<Self> {
        let registry = ProfileRegistry::open(&settings)?;
        Ok(Self::with_registry(settings, registry))
    }

    pub fn with_registry(settings: Settings, registry: ProfileRegistry) -> Self {
        let renderer = TemplateRenderer::new(&settings.profiles_dir, HostIdentity::current());
        let tree = BuildFolderTree::new(&settings.build_basedir);
        Self {
            settings,
            registry,
            renderer,
            tree,
            exit_policy: ExitPolicy::default(),
        }
    }

    pub fn exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.exit_policy = policy;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&mut self) -> Result<&ProfileRegistry> {
        self.registry.refresh()?;
        Ok(&self.registry)
    }

    /// Run one build to completion.
    ///
    /// The machine is always shut down once launched, whether the script
    /// succeeded, failed or the launch itself errored.
    pub fn build_package(
        &mut self,
        resolved: ResolvedConfiguration,
        provider: &dyn MachineProvider,
    ) -> Result<BuildReport> {
        let ResolvedConfiguration {
            mut spec,
            output_folder,
            output_script,
        } = resolved;
        let build = spec.build_name();
        let mut run = Run::new(build.clone());

        self.registry.refresh()?;
        let profile = self.registry.lookup(&spec.profile)?.clone();
        run.advance(BuildState::Resolved);

        let folders = self.tree.plan(&mut spec);
        let script = self.renderer.render(&spec, &profile)?;
        run.advance(BuildState::Rendered);

        provider.preflight()?;
        self.tree.reset_base()?;
        self.tree.create(&mut spec)?;
        self.tree
            .populate(&spec, &script, &self.settings.credentials_dir())?;
        run.advance(BuildState::TreeReady);

        let script_copy = if output_script {
            Some(collect_script(&spec, &output_folder)?)
        } else {
            None
        };

        tracing::info!(
            "building {} with profile {} ({})",
            build,
            profile.profile_id,
            profile.docker_image
        );
        let mut machine = provider.provision(&profile)?;
        run.advance(BuildState::Executing);
        let exit = match machine.launch(&folders.build_dir) {
            Ok(exit) => {
                machine.shutdown()?;
                exit
            }
            Err(e) => {
                if let Err(shutdown) = machine.shutdown() {
                    tracing::warn!("[{}] shutdown after failed launch: {}", build, shutdown);
                }
                return Err(e);
            }
        };
        run.advance(BuildState::Finished);

        if !exit.success() {
            match self.exit_policy {
                ExitPolicy::Fail => {
                    return Err(Error::BuildFailed {
                        build,
                        code: exit.code,
                    })
                }
                ExitPolicy::Ignore => {
                    tracing::warn!(
                        "[{}] build script exited with {:?}; collecting anyway",
                        build,
                        exit.code
                    );
                }
            }
        }

        let artifacts = collect_artifacts(&spec, &output_folder)?;
        run.advance(BuildState::Collected);

        Ok(BuildReport {
            build,
            exit,
            artifacts,
            script: script_copy,
        })
    }

    /// Run every section of a batch in file order.
    ///
    /// Without `keep_going` the first failure stops the batch and the
    /// remaining sections are reported as skipped.
    pub fn run_batch(
        &mut self,
        entries: &[BatchEntry],
        env: &EnvSnapshot,
        provider: &dyn MachineProvider,
        keep_going: bool,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for (index, entry) in entries.iter().enumerate() {
            tracing::info!("[{}] starting build", entry.section);
            let outcome = resolve_raw(&entry.parameters, env)
                .map_err(Error::from)
                .and_then(|resolved| self.build_package(resolved, provider));
            match outcome {
                Ok(report) => summary.succeeded.push(report),
                Err(e) => {
                    tracing::error!("[{}] {}", entry.section, e);
                    summary.failed.push((entry.section.clone(), e));
                    if !keep_going {
                        summary.skipped = entries[index + 1..]
                            .iter()
                            .map(|e| e.section.clone())
                            .collect();
                        break;
                    }
                }
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::batch;
    use crate::config::{resolve, BuildParameters, RawValue};
    use crate::machine::BuildMachine;
    use crate::profile::BuildProfile;
    use crate::settings::{SCRATCH_BUILDSCRIPT_NAME, SCRATCH_DIR};
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;
    use tempfile::TempDir;

    /// Stands in for a container: checks the script is in place and drops a
    /// package next to it.
    #[derive(Clone, Default)]
    struct FakeProvider {
        exit_code: i32,
        fail_launch: bool,
        missing_tools: bool,
        events: Rc<RefCell<Vec<String>>>,
    }

    struct FakeMachine {
        provider: FakeProvider,
        image: String,
    }

    impl MachineProvider for FakeProvider {
        fn preflight(&self) -> Result<()> {
            if self.missing_tools {
                return Err(Error::machine("missing required host tools:\n  docker"));
            }
            Ok(())
        }

        fn provision(&self, profile: &BuildProfile) -> Result<Box<dyn BuildMachine>> {
            Ok(Box::new(FakeMachine {
                provider: self.clone(),
                image: profile.docker_image.clone(),
            }))
        }
    }

    impl BuildMachine for FakeMachine {
        fn launch(&mut self, build_dir: &Path) -> Result<ScriptExit> {
            self.provider
                .events
                .borrow_mut()
                .push(format!("launch {}", self.image));
            if self.provider.fail_launch {
                return Err(Error::machine("docker daemon unavailable"));
            }
            let script = build_dir.join(SCRATCH_DIR).join(SCRATCH_BUILDSCRIPT_NAME);
            assert!(script.is_file(), "script missing at launch");
            fs::write(build_dir.join("demo_1.0_amd64.deb"), "package").unwrap();
            Ok(ScriptExit {
                code: Some(self.provider.exit_code),
            })
        }

        fn shutdown(&mut self) -> Result<()> {
            self.provider.events.borrow_mut().push("shutdown".to_string());
            Ok(())
        }
    }

    struct Fixture {
        temp: TempDir,
        builder: Builder,
        source: PathBuf,
        output: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("demo-src");
        fs::create_dir_all(source.join("demo")).unwrap();
        fs::write(source.join("setup.py"), "from setuptools import setup\n").unwrap();
        fs::write(source.join("demo/__init__.py"), "").unwrap();
        let settings = Settings::rooted_at(&temp.path().join("state"), &temp.path().join("home"));
        let builder = Builder::new(settings).unwrap();
        let output = temp.path().join("out");
        Fixture {
            temp,
            builder,
            source,
            output,
        }
    }

    fn params(fx: &Fixture, profile: &str) -> BuildParameters {
        BuildParameters {
            app: Some("demo".to_string()),
            version: Some("1.0".to_string()),
            profile: Some(profile.to_string()),
            source_directory: Some(fx.source.display().to_string()),
            output_folder: Some(fx.output.display().to_string()),
            ..Default::default()
        }
    }

    fn resolved(params: BuildParameters) -> ResolvedConfiguration {
        resolve(params, &EnvSnapshot::default()).unwrap()
    }

    fn output_names(fx: &Fixture) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&fx.output)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn scratch_script(fx: &Fixture) -> PathBuf {
        fx.builder
            .settings()
            .build_basedir
            .join("demo-1.0-ubuntu-trusty")
            .join(SCRATCH_DIR)
            .join(SCRATCH_BUILDSCRIPT_NAME)
    }

    #[test]
    fn test_local_directory_build_collects_one_package() {
        let mut fx = fixture();
        let provider = FakeProvider::default();

        let report = fx
            .builder
            .build_package(resolved(params(&fx, "ubuntu-trusty")), &provider)
            .unwrap();

        assert_eq!(report.build, "demo-1.0-ubuntu-trusty");
        assert_eq!(output_names(&fx), vec!["demo_1.0_amd64.deb"]);
        assert!(!fx.output.join("demo-src").exists());
        assert!(report.script.is_none());
        assert_eq!(
            *provider.events.borrow(),
            vec!["launch ubuntu:trusty".to_string(), "shutdown".to_string()]
        );
    }

    #[test]
    fn test_python_version_reaches_script() {
        let mut fx = fixture();
        let mut input = params(&fx, "ubuntu-trusty");
        input.compile_python = Some(RawValue::Flag(true));
        input.python_version = Some("3.9.0".to_string());

        fx.builder
            .build_package(resolved(input), &FakeProvider::default())
            .unwrap();

        let script = fs::read_to_string(scratch_script(&fx)).unwrap();
        assert!(script.contains("3.9.0"));
    }

    #[test]
    fn test_unknown_profile_touches_nothing() {
        let mut fx = fixture();
        let base = fx.builder.settings().build_basedir.clone();
        let provider = FakeProvider::default();

        let err = fx
            .builder
            .build_package(resolved(params(&fx, "plan9")), &provider)
            .unwrap_err();

        assert!(matches!(err, Error::ProfileNotFound { profile } if profile == "plan9"));
        assert!(!base.exists());
        assert!(provider.events.borrow().is_empty());
    }

    #[test]
    fn test_unknown_profile_keeps_previous_builds() {
        let mut fx = fixture();
        let base = fx.builder.settings().build_basedir.clone();
        fs::create_dir_all(base.join("earlier-1.0-centos7")).unwrap();

        let result = fx
            .builder
            .build_package(resolved(params(&fx, "plan9")), &FakeProvider::default());

        assert!(result.is_err());
        assert!(base.join("earlier-1.0-centos7").is_dir());
    }

    #[test]
    fn test_missing_host_tools_keep_previous_builds() {
        let mut fx = fixture();
        let base = fx.builder.settings().build_basedir.clone();
        fs::create_dir_all(base.join("earlier-1.0-centos7")).unwrap();
        let provider = FakeProvider {
            missing_tools: true,
            ..Default::default()
        };

        let err = fx
            .builder
            .build_package(resolved(params(&fx, "ubuntu-trusty")), &provider)
            .unwrap_err();

        assert!(matches!(err, Error::BuildMachine { .. }));
        assert!(base.join("earlier-1.0-centos7").is_dir());
        assert!(!base.join("demo-1.0-ubuntu-trusty").exists());
        assert!(provider.events.borrow().is_empty());
    }

    #[test]
    fn test_output_script_is_copy_of_scratch_script() {
        let mut fx = fixture();
        let mut input = params(&fx, "ubuntu-trusty");
        input.output_script = Some(RawValue::Flag(true));

        let report = fx
            .builder
            .build_package(resolved(input), &FakeProvider::default())
            .unwrap();

        let copy = fx.output.join("demo-1.0-ubuntu-trusty.sh");
        assert_eq!(report.script.as_ref(), Some(&copy));
        assert_eq!(
            fs::read(&copy).unwrap(),
            fs::read(scratch_script(&fx)).unwrap()
        );
    }

    #[test]
    fn test_failed_script_shuts_down_and_fails() {
        let mut fx = fixture();
        let provider = FakeProvider {
            exit_code: 2,
            ..Default::default()
        };

        let err = fx
            .builder
            .build_package(resolved(params(&fx, "ubuntu-trusty")), &provider)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::BuildFailed { ref build, code: Some(2) } if build == "demo-1.0-ubuntu-trusty"
        ));
        assert_eq!(provider.events.borrow().last().unwrap(), "shutdown");
        assert!(!fx.output.join("demo_1.0_amd64.deb").exists());
    }

    #[test]
    fn test_ignore_policy_collects_after_failure() {
        let fx = fixture();
        let Fixture {
            temp: _temp,
            builder,
            source,
            output,
        } = fx;
        let mut builder = builder.exit_policy(ExitPolicy::Ignore);
        let provider = FakeProvider {
            exit_code: 1,
            ..Default::default()
        };
        let input = BuildParameters {
            app: Some("demo".to_string()),
            version: Some("1.0".to_string()),
            profile: Some("ubuntu-trusty".to_string()),
            source_directory: Some(source.display().to_string()),
            output_folder: Some(output.display().to_string()),
            ..Default::default()
        };

        let report = builder.build_package(resolved(input), &provider).unwrap();

        assert_eq!(report.exit.code, Some(1));
        assert_eq!(report.artifacts, vec![output.join("demo_1.0_amd64.deb")]);
    }

    #[test]
    fn test_launch_error_still_shuts_down() {
        let mut fx = fixture();
        let provider = FakeProvider {
            fail_launch: true,
            ..Default::default()
        };

        let err = fx
            .builder
            .build_package(resolved(params(&fx, "centos7")), &provider)
            .unwrap_err();

        assert!(matches!(err, Error::BuildMachine { .. }));
        assert_eq!(
            *provider.events.borrow(),
            vec!["launch centos:7".to_string(), "shutdown".to_string()]
        );
    }

    #[test]
    fn test_missing_local_source_fails_before_launch() {
        let mut fx = fixture();
        fs::remove_dir_all(&fx.source).unwrap();
        let provider = FakeProvider::default();

        let err = fx
            .builder
            .build_package(resolved(params(&fx, "ubuntu-trusty")), &provider)
            .unwrap_err();

        assert!(matches!(err, Error::SourcePathMissing { .. }));
        assert!(provider.events.borrow().is_empty());
    }

    #[test]
    fn test_batch_runs_sections_in_order() {
        let mut fx = fixture();
        let text = format!(
            r#"
[DEFAULT]
app = "demo"
version = "1.0"
source_directory = "{source}"
output_folder = "{output}"

[trusty]
profile = "ubuntu-trusty"

[plan9]
profile = "plan9"

[centos]
profile = "centos7"
"#,
            source = fx.source.display(),
            output = fx.output.display(),
        );
        let entries = batch::parse(&text).unwrap();
        let provider = FakeProvider::default();

        let summary = fx
            .builder
            .run_batch(&entries, &EnvSnapshot::default(), &provider, false);
        assert!(!summary.is_success());
        assert_eq!(summary.succeeded.len(), 1);
        assert_eq!(summary.failed[0].0, "plan9");
        assert_eq!(summary.skipped, vec!["centos".to_string()]);

        let summary = fx
            .builder
            .run_batch(&entries, &EnvSnapshot::default(), &provider, true);
        let built: Vec<_> = summary.succeeded.iter().map(|r| r.build.as_str()).collect();
        assert_eq!(built, vec!["demo-1.0-ubuntu-trusty", "demo-1.0-centos7"]);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.skipped.is_empty());
        assert!(fx.temp.path().join("state/dist/demo-1.0-centos7").is_dir());
    }

    #[test]
    fn test_profiles_added_between_builds_are_seen() {
        let mut fx = fixture();
        let profiles_dir = fx.builder.settings().profiles_dir.clone();
        fs::create_dir_all(&profiles_dir).unwrap();
        fs::write(
            profiles_dir.join("profiles.json"),
            r#"{"plan9": {"docker_image": "plan9:latest", "script": "plan9.sh"}}"#,
        )
        .unwrap();
        fs::write(profiles_dir.join("plan9.sh"), "#!/bin/rc\necho {{ app }}\n").unwrap();
        let provider = FakeProvider::default();

        fx.builder
            .build_package(resolved(params(&fx, "plan9")), &provider)
            .unwrap();

        assert_eq!(provider.events.borrow()[0], "launch plan9:latest");
        assert!(fx.builder.registry().unwrap().lookup("plan9").is_ok());
    }
}
