use clap::Args;
use package_builder::config::RawValue;
use package_builder::BuildParameters;

/// Flags of a single build. Every configuration key has one.
#[derive(Args, Debug, Default)]
pub(crate) struct ManualArgs {
    /// Application name
    #[arg(long)]
    app: Option<String>,

    /// Application version
    #[arg(long)]
    version: Option<String>,

    /// Build profile id (see `package-builder profiles`)
    #[arg(long)]
    profile: Option<String>,

    /// Package name, defaults to "<app>-<version>-<profile>"
    #[arg(long)]
    name: Option<String>,

    /// Remote git source as "uri, branch"
    #[arg(long, value_name = "URI, BRANCH")]
    source_git: Option<String>,

    /// Local git checkout as "path, branch"
    #[arg(long, value_name = "PATH, BRANCH")]
    source_git_directory: Option<String>,

    /// Local directory copied into the build
    #[arg(long, value_name = "PATH")]
    source_directory: Option<String>,

    /// Copy ~/.pip into the build
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    use_local_pip_conf: Option<String>,

    /// Packages installed before building, comma separated
    #[arg(long)]
    build_deps: Option<String>,

    /// Package dependencies, comma separated
    #[arg(long)]
    runtime_deps: Option<String>,

    /// File name of the produced package
    #[arg(long)]
    custom_filename: Option<String>,

    /// Extra arguments passed to fpm
    #[arg(long, allow_hyphen_values = true)]
    fpm_args: Option<String>,

    /// Extra arguments passed to pip
    #[arg(long, allow_hyphen_values = true)]
    pip_args: Option<String>,

    #[arg(long)]
    package_install_root: Option<String>,

    #[arg(long)]
    package_tmp_root: Option<String>,

    /// Directory inside the source to build from
    #[arg(long)]
    working_dir: Option<String>,

    #[arg(long)]
    python_basedir: Option<String>,

    /// Compile the Python interpreter inside the machine
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    compile_python: Option<String>,

    #[arg(long)]
    python_version: Option<String>,

    #[arg(long)]
    requirements_path: Option<String>,

    #[arg(long)]
    before_install: Option<String>,

    #[arg(long)]
    after_install: Option<String>,

    #[arg(long)]
    before_remove: Option<String>,

    #[arg(long)]
    after_remove: Option<String>,

    #[arg(long)]
    before_upgrade: Option<String>,

    #[arg(long)]
    after_upgrade: Option<String>,

    /// Where packages are collected, defaults to ./dist
    #[arg(long)]
    output_folder: Option<String>,

    /// Also write the rendered script to the output folder
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    output_script: Option<String>,
}

impl ManualArgs {
    pub(crate) fn into_parameters(self) -> BuildParameters {
        let text = |value: Option<String>| value.map(RawValue::Text);
        BuildParameters {
            app: self.app,
            version: self.version,
            profile: self.profile,
            name: self.name,
            source_git: text(self.source_git),
            source_git_directory: text(self.source_git_directory),
            source_directory: self.source_directory,
            use_local_pip_conf: text(self.use_local_pip_conf),
            build_deps: text(self.build_deps),
            runtime_deps: text(self.runtime_deps),
            custom_filename: self.custom_filename,
            fpm_args: self.fpm_args,
            pip_args: self.pip_args,
            package_install_root: self.package_install_root,
            package_tmp_root: self.package_tmp_root,
            working_dir: self.working_dir,
            python_basedir: self.python_basedir,
            compile_python: text(self.compile_python),
            python_version: self.python_version,
            requirements_path: self.requirements_path,
            before_install: self.before_install,
            after_install: self.after_install,
            before_remove: self.before_remove,
            after_remove: self.after_remove,
            before_upgrade: self.before_upgrade,
            after_upgrade: self.after_upgrade,
            output_folder: self.output_folder,
            output_script: text(self.output_script),
        }
    }
}
