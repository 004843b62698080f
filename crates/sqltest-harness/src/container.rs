//! Container provisioning for the system under test.
//!
//! The lifecycle shells out to a container CLI (`docker` by default) through
//! a [`CommandRunner`], so tests can substitute a scripted runner. A started
//! container is stopped by [`ContainerLifecycle::stop`] or, failing that, when
//! the lifecycle is dropped.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use sqltest_error::{Result, SqlTestError};
use tracing::{debug, info, warn};

use crate::config::PortMapping;

const DEFAULT_POLL_INTERVAL_MILLIS: u64 = 50;

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn failure_detail(&self) -> String {
        let code = self
            .exit_code
            .map_or_else(|| "signal".to_owned(), |code| code.to_string());
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit status {code}")
        } else {
            format!("exit status {code}: {stderr}")
        }
    }
}

/// Runs an external program to completion within a deadline.
pub trait CommandRunner {
    fn run(&mut self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput>;
}

impl<R: CommandRunner + ?Sized> CommandRunner for &mut R {
    fn run(&mut self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        (**self).run(program, args, timeout)
    }
}

/// Spawns real processes. Output goes to temporary files so a chatty child
/// can never block on a full pipe while we poll it.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    poll_interval: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MILLIS),
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&mut self, program: &str, args: &[String], timeout: Duration) -> Result<CommandOutput> {
        let command_line = render_command(program, args);
        debug!(command = %command_line, timeout_secs = timeout.as_secs(), "running command");

        let mut stdout_file = tempfile::tempfile()?;
        let mut stderr_file = tempfile::tempfile()?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file.try_clone()?))
            .stderr(Stdio::from(stderr_file.try_clone()?))
            .spawn()
            .map_err(|err| SqlTestError::CommandSpawn {
                command: command_line.clone(),
                detail: err.to_string(),
            })?;

        let Some(status) = wait_for_child(&mut child, timeout, self.poll_interval)? else {
            warn!(command = %command_line, "command timed out and was killed");
            return Err(SqlTestError::CommandTimeout {
                command: command_line,
                timeout_secs: timeout.as_secs(),
            });
        };

        let output = CommandOutput {
            exit_code: status.code(),
            stdout: read_captured(&mut stdout_file)?,
            stderr: read_captured(&mut stderr_file)?,
        };
        debug!(
            command = %command_line,
            exit_code = output.exit_code,
            stdout = %output.stdout.trim_end(),
            stderr = %output.stderr.trim_end(),
            "command finished"
        );
        Ok(output)
    }
}

/// Poll `child` until it exits. Returns `None` if the deadline passed, in
/// which case the child has been killed and reaped.
fn wait_for_child(
    child: &mut Child,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Option<ExitStatus>> {
    let started_at = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if started_at.elapsed() >= timeout {
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(poll_interval);
    }
}

fn read_captured(file: &mut File) -> Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn render_command(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Name of the image built for one system under test. Container image names
/// must be lowercase.
pub fn image_name(system_under_test: &str, system_version: &str, user: &str) -> String {
    format!("sqltest-{system_under_test}-{system_version}-{user}").to_lowercase()
}

/// Login name of the invoking user, for namespacing images.
pub fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|user| !user.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_owned())
}

/// Build, start, and stop one container for the system under test.
pub struct ContainerLifecycle<R: CommandRunner> {
    runner: R,
    cli: String,
    stop_timeout: Duration,
    image: Option<String>,
    container: Option<String>,
    started: bool,
}

impl<R: CommandRunner> ContainerLifecycle<R> {
    pub fn new(runner: R, cli: impl Into<String>, stop_timeout: Duration) -> Self {
        Self {
            runner,
            cli: cli.into(),
            stop_timeout,
            image: None,
            container: None,
            started: false,
        }
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Build the image from the Dockerfile in `dockerfile_dir`.
    pub fn build_image(
        &mut self,
        dockerfile_dir: &Path,
        system_under_test: &str,
        system_version: &str,
        timeout: Duration,
    ) -> Result<String> {
        let image = image_name(system_under_test, system_version, &current_user());
        info!(image = %image, dir = %dockerfile_dir.display(), "building container image");
        let args = vec![
            "build".to_owned(),
            "--tag".to_owned(),
            image.clone(),
            dockerfile_dir.display().to_string(),
        ];
        let output = self.runner.run(&self.cli, &args, timeout)?;
        if !output.success() {
            return Err(SqlTestError::ImageBuild {
                image,
                detail: output.failure_detail(),
            });
        }
        self.image = Some(image.clone());
        Ok(image)
    }

    /// Start a detached container from the built image.
    pub fn run_image(&mut self, port_mapping: &PortMapping, timeout: Duration) -> Result<String> {
        let image = self
            .image
            .clone()
            .ok_or_else(|| SqlTestError::internal("container started before its image was built"))?;
        if self.started {
            return Err(SqlTestError::internal("container is already running"));
        }
        let suffix: u32 = rand::thread_rng().gen_range(0..=i32::MAX.unsigned_abs());
        let container = format!("{image}-{suffix}");
        info!(container = %container, ports = %port_mapping, "starting container");
        let args = vec![
            "run".to_owned(),
            "--name".to_owned(),
            container.clone(),
            "-p".to_owned(),
            port_mapping.to_string(),
            "-d".to_owned(),
            image.clone(),
        ];
        self.container = Some(container.clone());
        let output = self.runner.run(&self.cli, &args, timeout)?;
        if !output.success() {
            return Err(SqlTestError::ContainerRun {
                image,
                container,
                detail: output.failure_detail(),
            });
        }
        self.started = true;
        Ok(container)
    }

    /// Stop the container if it is running. Calling again is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        let Some(container) = self.container.clone() else {
            return Ok(());
        };
        info!(container = %container, "stopping container");
        let args = vec!["stop".to_owned(), container.clone()];
        let output = self.runner.run(&self.cli, &args, self.stop_timeout)?;
        if !output.success() {
            return Err(SqlTestError::ContainerStop {
                container,
                detail: output.failure_detail(),
            });
        }
        Ok(())
    }
}

impl<R: CommandRunner> Drop for ContainerLifecycle<R> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "failed to stop container during teardown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Vec<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl CommandRunner for RecordingRunner {
        fn run(&mut self, program: &str, args: &[String], _timeout: Duration) -> Result<CommandOutput> {
            let mut call = vec![program.to_owned()];
            call.extend(args.iter().cloned());
            self.calls.push(call);
            let failed = self.fail_on.is_some_and(|verb| args.first().is_some_and(|a| a == verb));
            Ok(CommandOutput {
                exit_code: Some(i32::from(failed)),
                stdout: String::new(),
                stderr: if failed { "daemon unreachable".to_owned() } else { String::new() },
            })
        }
    }

    fn mapping() -> PortMapping {
        "5432".parse().unwrap()
    }

    #[test]
    fn image_names_are_lowercase() {
        assert_eq!(image_name("PostgreSQL", "12.1", "Alice"), "sqltest-postgresql-12.1-alice");
    }

    #[test]
    fn run_before_build_is_internal_error() {
        let mut runner = RecordingRunner::default();
        let mut lifecycle = ContainerLifecycle::new(&mut runner, "docker", Duration::from_secs(30));
        let err = lifecycle.run_image(&mapping(), Duration::from_secs(30)).unwrap_err();
        assert!(matches!(err, SqlTestError::Internal(_)));
        drop(lifecycle);
        assert!(runner.calls.is_empty());
    }

    #[test]
    fn commands_follow_cli_shape() {
        let mut runner = RecordingRunner::default();
        {
            let mut lifecycle =
                ContainerLifecycle::new(&mut runner, "podman", Duration::from_secs(30));
            let image = lifecycle
                .build_image(Path::new("dbs/pg/v12_1"), "pg", "12.1", Duration::from_secs(600))
                .unwrap();
            let container = lifecycle.run_image(&mapping(), Duration::from_secs(30)).unwrap();
            assert!(container.starts_with(&format!("{image}-")));
            lifecycle.stop().unwrap();
            lifecycle.stop().unwrap();
        }
        assert_eq!(runner.calls.len(), 3, "second stop and drop are no-ops");
        assert_eq!(runner.calls[0][..3], ["podman", "build", "--tag"]);
        assert_eq!(runner.calls[0][4], "dbs/pg/v12_1");
        assert_eq!(runner.calls[1][1..3], ["run", "--name"]);
        assert_eq!(runner.calls[1][4..6], ["-p", "5432:5432"]);
        assert_eq!(runner.calls[1][6], "-d");
        assert_eq!(runner.calls[2][1], "stop");
        assert_eq!(runner.calls[2][2], runner.calls[1][3]);
    }

    #[test]
    fn drop_stops_started_container() {
        let mut runner = RecordingRunner::default();
        {
            let mut lifecycle = ContainerLifecycle::new(&mut runner, "docker", Duration::from_secs(30));
            lifecycle
                .build_image(Path::new("d"), "mysql", "8", Duration::from_secs(1))
                .unwrap();
            lifecycle.run_image(&mapping(), Duration::from_secs(1)).unwrap();
        }
        assert_eq!(runner.calls.last().map(|c| c[1].as_str()), Some("stop"));
    }

    #[test]
    fn failed_build_maps_to_image_build_error() {
        let mut runner = RecordingRunner {
            fail_on: Some("build"),
            ..RecordingRunner::default()
        };
        let mut lifecycle = ContainerLifecycle::new(&mut runner, "docker", Duration::from_secs(30));
        let err = lifecycle
            .build_image(Path::new("d"), "mysql", "8", Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SqlTestError::ImageBuild { ref detail, .. } if detail.contains("daemon unreachable")));
        assert!(!lifecycle.is_started());
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_captures_output() {
        let output = ProcessRunner::new()
            .run(
                "sh",
                &["-c".to_owned(), "echo out; echo err >&2; exit 3".to_owned()],
                Duration::from_secs(10),
            )
            .unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn process_runner_kills_on_timeout() {
        let err = ProcessRunner::new()
            .run("sleep", &["5".to_owned()], Duration::from_millis(200))
            .unwrap_err();
        assert!(matches!(err, SqlTestError::CommandTimeout { .. }));
    }

    #[test]
    fn missing_program_is_spawn_error() {
        let err = ProcessRunner::new()
            .run("sqltest-no-such-binary", &[], Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SqlTestError::CommandSpawn { .. }));
    }
}
