use anyhow::Result;

use super::RunOptions;

pub(crate) fn list_profiles(options: &RunOptions) -> Result<()> {
    let mut builder = options.builder()?;
    let registry = builder.registry()?;

    let width = registry
        .available()
        .map(|p| p.profile_id.len())
        .max()
        .unwrap_or(0);
    for profile in registry.available() {
        let insecure = if profile.insecure_registry {
            " (insecure registry)"
        } else {
            ""
        };
        println!(
            "{:<width$}  {}  {}{}",
            profile.profile_id,
            profile.docker_image,
            profile.script,
            insecure,
            width = width
        );
    }
    Ok(())
}
