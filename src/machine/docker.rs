//! Build machines backed by the Docker CLI.
//!
//! One container per build: the image is pulled, a container is created with
//! the build directory bind-mounted at [`SHARED_DIR`] and the script as its
//! command, then started attached so the call blocks until the script exits.
//! The container is removed on shutdown.

use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use crate::error::{Error, IoContext, Result};
use crate::machine::{BuildMachine, MachineProvider, ScriptExit};
use crate::preflight;
use crate::profile::BuildProfile;
use crate::settings::{SCRATCH_BUILDSCRIPT_NAME, SCRATCH_DIR, SHARED_DIR};

/// Target under which lines printed inside the machine are logged.
pub const MACHINE_LOG_TARGET: &str = "package_builder::machine";

static CONTAINER_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Builder for `docker create` commands.
pub struct CreateBuilder {
    image: String,
    name: String,
    mounts: Vec<(PathBuf, String)>,
    command: Vec<String>,
}

impl CreateBuilder {
    pub fn new(image: &str, name: &str) -> Self {
        Self {
            image: image.to_string(),
            name: name.to_string(),
            mounts: Vec::new(),
            command: Vec::new(),
        }
    }

    pub fn mount(mut self, host: &Path, guest: &str) -> Self {
        self.mounts.push((host.to_path_buf(), guest.to_string()));
        self
    }

    pub fn command(mut self, command: &str) -> Self {
        self.command.push(command.to_string());
        self
    }

    pub fn build(self, docker: &Path) -> Command {
        let mut cmd = Command::new(docker);
        cmd.args(["create", "--name", &self.name]);
        for (host, guest) in &self.mounts {
            let mut volume = OsString::from(host.as_os_str());
            volume.push(":");
            volume.push(guest);
            cmd.arg("-v").arg(volume);
        }
        cmd.arg(&self.image);
        cmd.args(&self.command);
        cmd
    }
}

/// Creates one [`DockerMachine`] per build.
#[derive(Debug, Clone, Copy)]
pub struct DockerProvider {
    machine_logs: bool,
}

impl DockerProvider {
    /// `machine_logs` decides whether script output is forwarded to the log.
    pub fn new(machine_logs: bool) -> Self {
        Self { machine_logs }
    }
}

impl MachineProvider for DockerProvider {
    fn preflight(&self) -> Result<()> {
        preflight::check_host_tools()
    }

    fn provision(&self, profile: &BuildProfile) -> Result<Box<dyn BuildMachine>> {
        Ok(Box::new(DockerMachine::new(profile, self.machine_logs)))
    }
}

/// A disposable container running a single build script.
#[derive(Debug)]
pub struct DockerMachine {
    image: String,
    insecure_registry: bool,
    machine_logs: bool,
    container: Option<String>,
}

impl DockerMachine {
    pub fn new(profile: &BuildProfile, machine_logs: bool) -> Self {
        Self {
            image: profile.docker_image.clone(),
            insecure_registry: profile.insecure_registry,
            machine_logs,
            container: None,
        }
    }

    /// Name of the live container, if one was created.
    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    fn pull(&self, docker: &Path) -> Result<()> {
        if self.insecure_registry {
            tracing::warn!(
                "image {} comes from an insecure registry; the docker daemon must allow it",
                self.image
            );
        }
        tracing::info!("pulling image {}", self.image);
        let mut cmd = Command::new(docker);
        cmd.args(["pull", &self.image]);
        run_checked(&mut cmd, &format!("docker pull {}", self.image))
    }
}

impl BuildMachine for DockerMachine {
    fn launch(&mut self, build_dir: &Path) -> Result<ScriptExit> {
        let docker = which::which("docker")
            .map_err(|e| Error::machine(format!("locating docker: {}", e)))?;

        let build_dir = build_dir
            .canonicalize()
            .with_context(|| format!("resolving build directory '{}'", build_dir.display()))?;

        self.pull(&docker)?;

        let name = container_name(&build_dir);
        let mut create = create_command(&docker, &self.image, &name, &build_dir);
        run_checked(&mut create, &format!("docker create {}", name))?;
        self.container = Some(name.clone());
        tracing::info!("created container {} from {}", name, self.image);

        let mut start = Command::new(&docker);
        start.args(["start", "--attach", &name]).stdin(Stdio::null());
        if self.machine_logs {
            start.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            start.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let mut child = start
            .spawn()
            .map_err(|e| Error::machine(format!("starting container {}: {}", name, e)))?;
        stream_output(&mut child);
        let status = child
            .wait()
            .map_err(|e| Error::machine(format!("waiting for container {}: {}", name, e)))?;

        tracing::info!("build script in {} finished with {}", name, status);
        Ok(ScriptExit {
            code: status.code(),
        })
    }

    fn shutdown(&mut self) -> Result<()> {
        let Some(name) = self.container.take() else {
            return Ok(());
        };
        let docker = which::which("docker")
            .map_err(|e| Error::machine(format!("locating docker: {}", e)))?;
        tracing::debug!("removing container {}", name);
        let mut cmd = Command::new(docker);
        cmd.args(["rm", "--force", &name]);
        run_checked(&mut cmd, &format!("docker rm {}", name))
    }
}

fn create_command(docker: &Path, image: &str, name: &str, build_dir: &Path) -> Command {
    let script = format!("{SHARED_DIR}/{SCRATCH_DIR}/{SCRATCH_BUILDSCRIPT_NAME}");
    CreateBuilder::new(image, name)
        .mount(build_dir, SHARED_DIR)
        .command(&script)
        .build(docker)
}

fn container_name(build_dir: &Path) -> String {
    let build = build_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let build: String = build
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "package-builder-{}-{}-{}",
        build,
        std::process::id(),
        CONTAINER_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

fn run_checked(cmd: &mut Command, what: &str) -> Result<()> {
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::machine(format!("{} could not run: {}", what, e)))?;
    if !output.status.success() {
        return Err(Error::machine(format!(
            "{} failed ({}): {}",
            what,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Forward the child's stdout and stderr line by line until both close.
fn stream_output(child: &mut std::process::Child) {
    let (tx, rx) = mpsc::channel();
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, tx.clone()));
    }
    drop(tx);

    for line in rx {
        tracing::info!(target: MACHINE_LOG_TARGET, "{}", line);
    }
    for reader in readers {
        let _ = reader.join();
    }
}

fn spawn_reader<R: Read + Send + 'static>(stream: R, tx: Sender<String>) -> JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines().map_while(std::result::Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}
