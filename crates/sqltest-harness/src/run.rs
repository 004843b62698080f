//! End-to-end conformance run: load, provision, execute, report.

use std::path::PathBuf;
use std::thread;

use sqltest_error::Result;
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::container::{CommandRunner, ContainerLifecycle, ProcessRunner};
use crate::engine::run_tests;
use crate::loader::load_tests;
use crate::report::{ConformanceReport, RunInfo, SupportSummary};
use crate::session::{ConnectionSpec, Session};

/// Opens the session the engine runs against.
pub trait Connector {
    fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn Session>>;
}

/// Connects through the driver named in the [`ConnectionSpec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverConnector;

impl Connector for DriverConnector {
    fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn Session>> {
        spec.connect()
    }
}

impl<F> Connector for F
where
    F: Fn(&ConnectionSpec) -> Result<Box<dyn Session>>,
{
    fn connect(&self, spec: &ConnectionSpec) -> Result<Box<dyn Session>> {
        self(spec)
    }
}

/// Totals of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub tests_run: usize,
    pub passed: usize,
    pub failed: usize,
    pub summary: SupportSummary,
    pub report_path: PathBuf,
}

impl RunSummary {
    fn from_report(report: &ConformanceReport, report_path: PathBuf) -> Self {
        let tests_run = report.features.iter().map(|feature| feature.total).sum();
        let passed = report.features.iter().map(|feature| feature.passed).sum();
        Self {
            tests_run,
            passed,
            failed: tests_run - passed,
            summary: report.summary,
            report_path,
        }
    }
}

/// Run with real processes and the built-in drivers.
pub fn run_conformance(config: &HarnessConfig) -> Result<RunSummary> {
    run_conformance_with(config, ProcessRunner::new(), &DriverConnector)
}

/// Run with an injected command runner and connector.
///
/// Tests are loaded before anything is provisioned. Once a container is
/// started it is stopped on every path out of this function. The report is
/// only written when the whole test set executed.
pub fn run_conformance_with<R, C>(
    config: &HarnessConfig,
    runner: R,
    connector: &C,
) -> Result<RunSummary>
where
    R: CommandRunner,
    C: Connector + ?Sized,
{
    config.validate()?;
    let mut run_info = RunInfo::new(
        &config.system_under_test,
        &config.system_version,
        &config.spec_version,
    );

    let tests = load_tests(&config.standards_dir())?;

    let mut lifecycle =
        ContainerLifecycle::new(runner, &config.container_cli, config.container_stop_timeout);
    if config.provision_container {
        lifecycle.build_image(
            &config.dockerfile_dir(),
            &config.system_under_test,
            &config.system_version,
            config.wait_for_image,
        )?;
        lifecycle.run_image(&config.port_mapping, config.container_start_timeout)?;
        info!(
            wait_secs = config.wait_for_server.as_secs(),
            "Waiting for server to start"
        );
        thread::sleep(config.wait_for_server);
    } else {
        info!("container provisioning disabled, using existing server");
    }

    let registry = {
        let mut session = connector.connect(&config.connection)?;
        run_tests(&mut session, tests)?
    };

    let stopped = lifecycle.stop();
    if let Err(err) = &stopped {
        warn!(error = %err, "container did not stop cleanly");
    }

    run_info.finish();
    let report = ConformanceReport::build(run_info, &registry)?;
    report.write_text(&config.report_path)?;
    if let Some(json_path) = &config.json_report_path {
        report.write_json(json_path)?;
    }
    stopped?;

    let summary = RunSummary::from_report(&report, config.report_path.clone());
    info!(
        tests = summary.tests_run,
        passed = summary.passed,
        failed = summary.failed,
        yes = summary.summary.supported,
        partial = summary.summary.partially_supported,
        no = summary.summary.unsupported,
        "conformance run complete"
    );
    Ok(summary)
}
