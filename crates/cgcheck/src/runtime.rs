//! Driving an external container runtime through its command line.
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use nix::unistd::Pid;

/// How a container should be started.
#[derive(Debug, Clone, Default)]
pub struct RunOpts {
    pub image: String,
    /// Hard memory limit in bytes.
    pub memory: Option<u64>,
    /// Cgroup the container's cgroup is created under.
    pub cgroup_parent: Option<String>,
    /// Further runtime flags, already rendered as `--flag=value`.
    pub args: Vec<String>,
}

impl RunOpts {
    pub fn new<S: Into<String>>(image: S) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn memory(mut self, bytes: u64) -> Self {
        self.memory = Some(bytes);
        self
    }

    pub fn cgroup_parent<S: Into<String>>(mut self, parent: S) -> Self {
        self.cgroup_parent = Some(parent.into());
        self
    }

    pub fn args<I: IntoIterator<Item = String>>(mut self, args: I) -> Self {
        self.args.extend(args);
        self
    }
}

/// A single container under test.
pub trait ContainerRuntime {
    /// Starts the container detached and returns once the runtime reports it
    /// created.
    fn spawn(&mut self, opts: &RunOpts, command: &[String]) -> Result<()>;
    /// Identifier the runtime names the container's cgroups after.
    fn container_id(&self) -> Result<String>;
    /// Host pid of the process sandboxing the container.
    fn sandbox_pid(&self) -> Result<Pid>;
    /// Removes the container. Safe to call when nothing was spawned.
    fn cleanup(&mut self) -> Result<()>;
}

#[derive(Debug)]
pub struct DockerRuntime {
    docker: PathBuf,
    /// Value for `--runtime`, docker's default when unset.
    runtime: Option<String>,
    name: String,
    spawned: bool,
}

impl DockerRuntime {
    pub fn new<P: Into<PathBuf>>(docker: P, runtime: Option<String>) -> Self {
        Self {
            docker: docker.into(),
            runtime,
            name: format!("cgcheck-{:016x}", rand::random::<u64>()),
            spawned: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn run_args(&self, opts: &RunOpts, command: &[String]) -> Vec<String> {
        let mut args = vec![
            "run".to_owned(),
            "-d".to_owned(),
            format!("--name={}", self.name),
        ];
        if let Some(runtime) = &self.runtime {
            args.push(format!("--runtime={runtime}"));
        }
        if let Some(memory) = opts.memory {
            args.push(format!("--memory={memory}"));
        }
        if let Some(parent) = &opts.cgroup_parent {
            args.push(format!("--cgroup-parent={parent}"));
        }
        args.extend(opts.args.iter().cloned());
        args.push(opts.image.clone());
        args.extend(command.iter().cloned());
        args
    }

    fn inspect(&self, format: &str) -> Result<String> {
        docker_output(&self.docker, &["inspect", "-f", format, &self.name])
    }
}

fn docker_output<S: AsRef<std::ffi::OsStr>>(docker: &Path, args: &[S]) -> Result<String> {
    let output = Command::new(docker)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .with_context(|| format!("failed to execute {docker:?}"))?;

    if !output.status.success() {
        bail!(
            "{:?} exited with {}: {}",
            docker,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

impl ContainerRuntime for DockerRuntime {
    fn spawn(&mut self, opts: &RunOpts, command: &[String]) -> Result<()> {
        let args = self.run_args(opts, command);
        tracing::debug!(?args, "starting container");
        // Marked before running so a half-created container is still removed.
        self.spawned = true;
        docker_output(&self.docker, &args)
            .with_context(|| format!("failed to start container {}", self.name))?;
        tracing::info!(name = %self.name, image = %opts.image, "container started");
        Ok(())
    }

    fn container_id(&self) -> Result<String> {
        let id = self
            .inspect("{{.Id}}")
            .with_context(|| format!("failed to get id of container {}", self.name))?;
        if id.is_empty() {
            bail!("container {} has an empty id", self.name);
        }
        Ok(id)
    }

    fn sandbox_pid(&self) -> Result<Pid> {
        let out = self
            .inspect("{{.State.Pid}}")
            .with_context(|| format!("failed to get pid of container {}", self.name))?;
        let pid: i32 = out
            .parse()
            .with_context(|| format!("could not parse pid {out:?}"))?;
        if pid <= 0 {
            bail!("container {} is not running", self.name);
        }
        Ok(Pid::from_raw(pid))
    }

    fn cleanup(&mut self) -> Result<()> {
        if !self.spawned {
            return Ok(());
        }
        docker_output(&self.docker, &["rm", "-f", &self.name])
            .with_context(|| format!("failed to remove container {}", self.name))?;
        self.spawned = false;
        tracing::debug!(name = %self.name, "container removed");
        Ok(())
    }
}
