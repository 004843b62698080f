//! `sqltest`: run the SQL-standard conformance tests against one database.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use sqltest_error::{Result, SqlTestError};
use sqltest_harness::config::{DEFAULT_CONTAINER_CLI, DEFAULT_SPEC_VERSION, default_report_path};
use sqltest_harness::log::init_logging;
use sqltest_harness::{ConnectionSpec, Credentials, HarnessConfig, PortMapping, run_conformance};

#[derive(Parser, Debug)]
#[command(name = "sqltest")]
#[command(about = "Check a database against the SQL standard, feature by feature", long_about = None)]
struct Cli {
    /// System to test, e.g. postgresql. Selects dbs/<system>/ for the Dockerfile.
    #[arg(short = 't', long, value_name = "SYSTEM")]
    system_under_test: String,

    /// Version of the system under test.
    #[arg(short = 'v', long, value_name = "VERSION")]
    system_version: String,

    /// Connection URL for the session driver.
    #[arg(short = 'j', long, value_name = "URL")]
    connection_url: String,

    /// Session driver.
    #[arg(short = 'c', long, value_name = "DRIVER", default_value = "sqlite")]
    driver: String,

    /// User, if not given in the URL. Requires --password.
    #[arg(short = 'u', long)]
    user: Option<String>,

    /// Password, if not given in the URL. Requires --user.
    #[arg(short = 'P', long)]
    password: Option<String>,

    /// Port mapping for the container, `host:container` or a single port.
    #[arg(short = 'p', long, value_name = "PORT")]
    port: String,

    /// Directory holding standards/ and dbs/.
    #[arg(short = 'H', long, value_name = "DIR", default_value = ".")]
    sqltest_home: PathBuf,

    /// Version of the SQL standard to test against.
    #[arg(short = 's', long, value_name = "YEAR", default_value = DEFAULT_SPEC_VERSION)]
    spec_version: String,

    /// Seconds to wait after starting the container before connecting.
    #[arg(short = 'w', long, value_name = "SECS", default_value_t = 5)]
    wait_for_server: u64,

    /// Seconds to wait for the container image to build.
    #[arg(long, value_name = "SECS", default_value_t = 600)]
    wait_for_image: u64,

    /// Report file, defaults to sqltest-<system>-<version>-report.
    #[arg(short = 'r', long, value_name = "FILE")]
    report_file: Option<PathBuf>,

    /// Also write a JSON report to this file.
    #[arg(long, value_name = "FILE")]
    json_report: Option<PathBuf>,

    /// Container runtime binary.
    #[arg(long, value_name = "BIN", default_value = DEFAULT_CONTAINER_CLI)]
    container_cli: String,

    /// Skip building and starting a container; connect to a running server.
    #[arg(long)]
    no_container: bool,

    /// Debug-level logging.
    #[arg(short = 'V', long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<HarnessConfig> {
        let credentials = Credentials::from_parts(self.user, self.password)?;
        let port_mapping: PortMapping = self.port.parse()?;
        let connection =
            ConnectionSpec::new(self.driver, self.connection_url).with_credentials(credentials);
        let report_path = self
            .report_file
            .unwrap_or_else(|| default_report_path(&self.system_under_test, &self.system_version));

        let mut config = HarnessConfig::new(
            self.system_under_test,
            self.system_version,
            connection,
            port_mapping,
        );
        config.sqltest_home = self.sqltest_home;
        config.spec_version = self.spec_version;
        config.wait_for_server = Duration::from_secs(self.wait_for_server);
        config.wait_for_image = Duration::from_secs(self.wait_for_image);
        config.report_path = report_path;
        config.json_report_path = self.json_report;
        config.container_cli = self.container_cli;
        config.provision_container = !self.no_container;
        config.verbose = self.verbose;
        config.validate()?;
        Ok(config)
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.into_config()?;
    let summary = run_conformance(&config)?;
    println!(
        "{} tests, {} passed, {} failed; features Yes: {} Partial: {} No: {}",
        summary.tests_run,
        summary.passed,
        summary.failed,
        summary.summary.supported,
        summary.summary.partially_supported,
        summary.summary.unsupported
    );
    println!("report written to {}", summary.report_path.display());
    Ok(())
}

fn exit_code_for(err: &SqlTestError) -> ExitCode {
    u8::try_from(err.exit_code()).map_or(ExitCode::FAILURE, ExitCode::from)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init_logging(cli.verbose) {
        eprintln!("warning: {err}");
    }
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, kind = ?err.kind(), "conformance run failed");
            eprintln!("Testing failed: {err}");
            if let Some(hint) = err.suggestion() {
                eprintln!("hint: {hint}");
            }
            exit_code_for(&err)
        }
    }
}
