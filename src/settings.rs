//! Process-level settings threaded through every orchestration run.
//!
//! Resolution order for the state root:
//! 1. `PACKAGE_BUILDER_HOME` env var
//! 2. `~/.package-builder`
//!
//! The local profiles directory can be moved with `PACKAGE_BUILDER_PROFILES`.

use std::env;
use std::path::{Path, PathBuf};

/// Directory name of the per-build scratch area.
pub const SCRATCH_DIR: &str = "scratch";
/// File name of the rendered build script inside the scratch area.
pub const SCRATCH_BUILDSCRIPT_NAME: &str = "buildscript.sh";
/// Extension of scripts copied to the output folder.
pub const SCRIPT_EXTENSION: &str = "sh";
/// Mount point of the per-build directory inside the build machine.
pub const SHARED_DIR: &str = "/opt/shared";
/// File name of the user profile definitions inside the profiles directory.
pub const LOCAL_PROFILES_FILE: &str = "profiles.json";
/// Credential directory copied into the scratch area on request.
pub const CREDENTIALS_DIR: &str = ".pip";

pub const PYTHON_VERSION: &str = "3.11.9";
pub const PYTHON_BASEDIR: &str = "/opt";
pub const PACKAGE_INSTALL_ROOT: &str = "/opt";
pub const PACKAGE_TMP_ROOT: &str = "/tmp";
pub const REQUIREMENTS_PATH: &str = "/requirements.txt";
pub const OUTPUT_FOLDER: &str = "./dist";

const STATE_DIR_NAME: &str = ".package-builder";

/// Paths and switches shared by the builds of one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base directory holding one directory per build. Destroyed on each run.
    pub build_basedir: PathBuf,
    /// Directory holding `profiles.json` and user script templates.
    pub profiles_dir: PathBuf,
    /// Home directory the credential directory is copied from.
    pub home_dir: PathBuf,
    /// Stream build machine output to the log.
    pub machine_logs: bool,
}

impl Settings {
    /// Settings rooted at an explicit state directory.
    pub fn rooted_at(state_dir: &Path, home_dir: &Path) -> Self {
        Self {
            build_basedir: state_dir.join("dist"),
            profiles_dir: state_dir.join("profiles"),
            home_dir: home_dir.to_path_buf(),
            machine_logs: true,
        }
    }

    /// Settings derived from the user's home directory and env overrides.
    pub fn from_env() -> Self {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        let state_dir = env::var_os("PACKAGE_BUILDER_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home_dir.join(STATE_DIR_NAME));

        let mut settings = Self::rooted_at(&state_dir, &home_dir);
        if let Some(profiles) = env::var_os("PACKAGE_BUILDER_PROFILES") {
            settings.profiles_dir = PathBuf::from(profiles);
        }
        settings
    }

    pub fn with_profiles_dir(mut self, profiles_dir: PathBuf) -> Self {
        self.profiles_dir = profiles_dir;
        self
    }

    pub fn with_machine_logs(mut self, machine_logs: bool) -> Self {
        self.machine_logs = machine_logs;
        self
    }

    pub fn local_profiles_file(&self) -> PathBuf {
        self.profiles_dir.join(LOCAL_PROFILES_FILE)
    }

    pub fn credentials_dir(&self) -> PathBuf {
        self.home_dir.join(CREDENTIALS_DIR)
    }
}
