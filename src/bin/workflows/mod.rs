mod build;
mod manual;
mod profiles;

use std::path::PathBuf;

use anyhow::{Context, Result};
use package_builder::{Builder, ExitPolicy, Settings};

pub(crate) use build::{run_batch_file, run_manual};
pub(crate) use manual::ManualArgs;
pub(crate) use profiles::list_profiles;

/// Global switches shared by every subcommand.
pub(crate) struct RunOptions {
    profiles_dir: Option<PathBuf>,
    keep_going: bool,
    exit_policy: ExitPolicy,
    machine_logs: bool,
}

impl RunOptions {
    pub(crate) fn from_cli(cli: &crate::Cli) -> Self {
        Self {
            profiles_dir: cli.profiles_dir.clone(),
            keep_going: cli.keep_going,
            exit_policy: if cli.ignore_script_exit {
                ExitPolicy::Ignore
            } else {
                ExitPolicy::Fail
            },
            machine_logs: !cli.quiet_machine,
        }
    }

    fn settings(&self) -> Settings {
        let settings = Settings::from_env().with_machine_logs(self.machine_logs);
        match &self.profiles_dir {
            Some(dir) => settings.with_profiles_dir(dir.clone()),
            None => settings,
        }
    }

    fn builder(&self) -> Result<Builder> {
        let settings = self.settings();
        let profiles = settings.local_profiles_file();
        let builder = Builder::new(settings)
            .with_context(|| format!("loading build profiles (local file '{}')", profiles.display()))?;
        Ok(builder.exit_policy(self.exit_policy))
    }
}
