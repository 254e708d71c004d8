//! Isolated build environments.
//!
//! A [`BuildMachine`] mounts the per-build directory, runs the rendered
//! script from its scratch directory and blocks until the script ends. The
//! orchestrator never looks inside; it only sees the script's exit status.
//!
//! - [`docker`] - Docker CLI backed machine

pub mod docker;

use std::path::Path;

use crate::error::Result;
use crate::profile::BuildProfile;

pub use docker::{DockerMachine, DockerProvider};

/// Exit status of the build script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ScriptExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs one build script in isolation.
pub trait BuildMachine {
    /// Start the environment with `build_dir` mounted and run the script.
    fn launch(&mut self, build_dir: &Path) -> Result<ScriptExit>;

    /// Tear the environment down. Calling it twice is harmless.
    fn shutdown(&mut self) -> Result<()>;
}

/// Creates a machine for a build's profile.
pub trait MachineProvider {
    /// Check the host can run machines. Called before any build directory
    /// is reset.
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    fn provision(&self, profile: &BuildProfile) -> Result<Box<dyn BuildMachine>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_exit_success() {
        assert!(ScriptExit { code: Some(0) }.success());
        assert!(!ScriptExit { code: Some(1) }.success());
        assert!(!ScriptExit { code: None }.success());
    }
}
