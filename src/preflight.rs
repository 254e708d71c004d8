//! Preflight checks for build machines.
//!
//! Validates that the host has the container tooling. The orchestrator runs
//! this through [`MachineProvider::preflight`] before resetting the build
//! base, so a missing tool fails with an install hint and leaves earlier
//! builds in place.
//!
//! [`MachineProvider::preflight`]: crate::machine::MachineProvider::preflight

use crate::error::{Error, Result};

/// Host tools needed to run build machines.
///
/// Each tuple is (command_name, package_name).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[("docker", "docker-ce or docker.io")];

/// Check if a command exists on the host's PATH.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Check that specific tools are available.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<String> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, package)| format!("  {} (install: {})", tool, package))
        .collect();

    if !missing.is_empty() {
        return Err(Error::machine(format!(
            "missing required host tools:\n{}",
            missing.join("\n")
        )));
    }
    Ok(())
}

/// Check that every tool in [`REQUIRED_TOOLS`] is available.
pub fn check_host_tools() -> Result<()> {
    check_required_tools(REQUIRED_TOOLS)
}
