use std::path::Path;

use anyhow::{bail, Context, Result};
use package_builder::config::{self, batch};
use package_builder::{BuildReport, DockerProvider, EnvSnapshot};

use super::{ManualArgs, RunOptions};

pub(crate) fn run_batch_file(file: &Path, options: &RunOptions) -> Result<()> {
    let entries =
        batch::read(file).with_context(|| format!("reading batch file '{}'", file.display()))?;
    if entries.is_empty() {
        tracing::warn!("batch file '{}' defines no builds", file.display());
        return Ok(());
    }

    let mut builder = options.builder()?;
    let provider = DockerProvider::new(options.machine_logs);
    let env = EnvSnapshot::capture();
    let summary = builder.run_batch(&entries, &env, &provider, options.keep_going);

    for report in &summary.succeeded {
        print_report(report);
    }
    for section in &summary.skipped {
        tracing::warn!("[{}] skipped", section);
    }
    if !summary.is_success() {
        let failed: Vec<String> = summary
            .failed
            .iter()
            .map(|(section, e)| format!("  {}: {}", section, e))
            .collect();
        bail!(
            "{} of {} builds failed:\n{}",
            summary.failed.len(),
            entries.len(),
            failed.join("\n")
        );
    }
    Ok(())
}

pub(crate) fn run_manual(args: ManualArgs, options: &RunOptions) -> Result<()> {
    let resolved = config::resolve(args.into_parameters(), &EnvSnapshot::capture())
        .context("resolving build configuration")?;
    let build = resolved.spec.build_name();

    let mut builder = options.builder()?;
    let provider = DockerProvider::new(options.machine_logs);
    let report = builder
        .build_package(resolved, &provider)
        .with_context(|| format!("building '{}'", build))?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &BuildReport) {
    println!("{}:", report.build);
    for artifact in &report.artifacts {
        println!("  {}", artifact.display());
    }
    if let Some(script) = &report.script {
        println!("  {} (script)", script.display());
    }
}
