//! Resolved run configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqltest_error::{Result, SqlTestError};

use crate::session::ConnectionSpec;

pub const DEFAULT_SPEC_VERSION: &str = "2016";
pub const DEFAULT_CONTAINER_CLI: &str = "docker";
pub const DEFAULT_WAIT_FOR_SERVER: Duration = Duration::from_secs(5);
pub const DEFAULT_WAIT_FOR_IMAGE: Duration = Duration::from_secs(600);
pub const DEFAULT_CONTAINER_START_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONTAINER_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Host-to-container port publication, passed to `<cli> run -p`.
///
/// A bare port `x` means `x:x`. The host side may carry an interface
/// address (`127.0.0.1:5432:5432`); the container side must be a port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    host: String,
    container: u16,
}

impl PortMapping {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub const fn container_port(&self) -> u16 {
        self.container
    }
}

impl FromStr for PortMapping {
    type Err = SqlTestError;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (host, container) = raw.rsplit_once(':').unwrap_or((raw, raw));
        let container = container.parse::<u16>().map_err(|_| {
            SqlTestError::invalid_config(format!("port mapping '{raw}' has no valid container port"))
        })?;
        if host.is_empty() {
            return Err(SqlTestError::invalid_config(format!(
                "port mapping '{raw}' has an empty host side"
            )));
        }
        Ok(Self {
            host: host.to_owned(),
            container,
        })
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

/// Everything one conformance run needs.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub system_under_test: String,
    pub system_version: String,
    pub connection: ConnectionSpec,
    pub port_mapping: PortMapping,
    /// Root holding `standards/` and `dbs/`.
    pub sqltest_home: PathBuf,
    pub spec_version: String,
    pub wait_for_server: Duration,
    pub wait_for_image: Duration,
    pub container_start_timeout: Duration,
    pub container_stop_timeout: Duration,
    pub report_path: PathBuf,
    pub json_report_path: Option<PathBuf>,
    pub container_cli: String,
    /// When false the run targets an already available database.
    pub provision_container: bool,
    pub verbose: bool,
}

impl HarnessConfig {
    /// Config with every optional field at its default.
    pub fn new(
        system_under_test: impl Into<String>,
        system_version: impl Into<String>,
        connection: ConnectionSpec,
        port_mapping: PortMapping,
    ) -> Self {
        let system_under_test = system_under_test.into();
        let system_version = system_version.into();
        let report_path = default_report_path(&system_under_test, &system_version);
        Self {
            system_under_test,
            system_version,
            connection,
            port_mapping,
            sqltest_home: PathBuf::from("."),
            spec_version: DEFAULT_SPEC_VERSION.to_owned(),
            wait_for_server: DEFAULT_WAIT_FOR_SERVER,
            wait_for_image: DEFAULT_WAIT_FOR_IMAGE,
            container_start_timeout: DEFAULT_CONTAINER_START_TIMEOUT,
            container_stop_timeout: DEFAULT_CONTAINER_STOP_TIMEOUT,
            report_path,
            json_report_path: None,
            container_cli: DEFAULT_CONTAINER_CLI.to_owned(),
            provision_container: true,
            verbose: false,
        }
    }

    /// `<home>/standards/<spec_version>`
    pub fn standards_dir(&self) -> PathBuf {
        self.sqltest_home.join("standards").join(&self.spec_version)
    }

    /// `<home>/dbs/<sut>/v<version>`, with dots in the version replaced by
    /// underscores.
    pub fn dockerfile_dir(&self) -> PathBuf {
        self.sqltest_home
            .join("dbs")
            .join(&self.system_under_test)
            .join(format!("v{}", self.system_version.replace('.', "_")))
    }

    pub fn validate(&self) -> Result<()> {
        require_non_empty("system under test", &self.system_under_test)?;
        require_non_empty("system version", &self.system_version)?;
        require_non_empty("spec version", &self.spec_version)?;
        require_non_empty("connection url", &self.connection.url)?;
        require_non_empty("driver", &self.connection.driver)?;
        if self.provision_container {
            require_non_empty("container cli", &self.container_cli)?;
        }
        if is_blank_path(&self.report_path) {
            return Err(SqlTestError::invalid_config("report file path is empty"));
        }
        if self.json_report_path.as_deref().is_some_and(is_blank_path) {
            return Err(SqlTestError::invalid_config("json report path is empty"));
        }
        Ok(())
    }
}

/// `sqltest-<sut>-<version>-report` in the working directory.
pub fn default_report_path(system_under_test: &str, system_version: &str) -> PathBuf {
    PathBuf::from(format!("sqltest-{system_under_test}-{system_version}-report"))
}

fn require_non_empty(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(SqlTestError::invalid_config(format!("{what} must not be empty")));
    }
    Ok(())
}

fn is_blank_path(path: &Path) -> bool {
    path.as_os_str().is_empty()
}
