use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for the conformance harness.
///
/// Every variant is fatal to a run. A SQL statement failing inside a test
/// case is not an error at this level: the engine records it on the test and
/// keeps going.
#[derive(Error, Debug)]
pub enum SqlTestError {
    // === Load Errors ===
    /// Test source directory does not exist.
    #[error("no such file or directory: '{path}'")]
    TestDirNotFound { path: PathBuf },

    /// Test source path exists but is not a directory.
    #[error("was expecting '{path}' to be a directory")]
    NotADirectory { path: PathBuf },

    /// A test file could not be parsed.
    #[error("failed to parse test file '{path}': {detail}")]
    TestFileParse { path: PathBuf, detail: String },

    /// A test record has the wrong shape or missing fields.
    #[error("malformed test '{id}': {detail}")]
    MalformedTest { id: String, detail: String },

    /// Two test records share the same id.
    #[error("duplicate test id '{id}' in '{path}'")]
    DuplicateTestId { id: String, path: PathBuf },

    /// Discovery found nothing to run.
    #[error("no test files matching '*.tests.yml' under '{path}'")]
    NoTests { path: PathBuf },

    // === Provisioning Errors ===
    /// Container image build failed.
    #[error("failed to build container image '{image}': {detail}")]
    ImageBuild { image: String, detail: String },

    /// Container could not be started.
    #[error("failed to run container '{container}' from image '{image}': {detail}")]
    ContainerRun {
        image: String,
        container: String,
        detail: String,
    },

    /// Container could not be stopped.
    #[error("failed to stop container '{container}': {detail}")]
    ContainerStop { container: String, detail: String },

    /// External command exceeded its deadline.
    #[error("process `{command}` failed to finish in {timeout_secs} seconds")]
    CommandTimeout { command: String, timeout_secs: u64 },

    /// External command could not be launched.
    #[error("failed to launch `{command}`: {detail}")]
    CommandSpawn { command: String, detail: String },

    /// No session driver is registered under this identifier.
    #[error("unsupported driver '{driver}'")]
    UnsupportedDriver { driver: String },

    /// Opening the database session failed.
    #[error("failed to connect to '{url}': {detail}")]
    Connect { url: String, detail: String },

    // === Configuration Errors ===
    /// Options are missing, inconsistent, or unparseable.
    #[error("invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    // === Contract Violations ===
    /// A test was routed to the aggregate of a different feature.
    #[error(
        "attempt to add test '{test_id}' of feature '{test_feature}' to feature '{aggregate_feature}'"
    )]
    FeatureMismatch {
        test_id: String,
        test_feature: String,
        aggregate_feature: String,
    },

    /// A test outcome was set twice.
    #[error("outcome of test '{test_id}' was already recorded")]
    OutcomeAlreadyRecorded { test_id: String },

    /// A test without an outcome was handed to an aggregate.
    #[error("test '{test_id}' has not been run")]
    TestNotRun { test_id: String },

    /// A feature aggregate was classified without any tests.
    #[error("feature '{feature_id}' has no tests")]
    EmptyFeature { feature_id: String },

    // === Sink Errors ===
    /// File or stream I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report could not be serialized.
    #[error("failed to serialize report: {detail}")]
    ReportSerialize { detail: String },

    // === Internal Errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`SqlTestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorKind {
    /// Harness bug or unexpected state.
    Internal = 1,
    /// Bad options.
    Config = 2,
    /// Tests could not be discovered or parsed.
    Load = 3,
    /// Container or connection setup failed.
    Provisioning = 4,
    /// Loader or engine is miswired.
    ContractViolation = 5,
    /// Report sink or filesystem failure.
    Io = 6,
}

impl SqlTestError {
    /// Map this error to its taxonomy bucket.
    #[allow(clippy::match_same_arms)]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TestDirNotFound { .. }
            | Self::NotADirectory { .. }
            | Self::TestFileParse { .. }
            | Self::MalformedTest { .. }
            | Self::DuplicateTestId { .. }
            | Self::NoTests { .. } => ErrorKind::Load,
            Self::ImageBuild { .. }
            | Self::ContainerRun { .. }
            | Self::ContainerStop { .. }
            | Self::CommandTimeout { .. }
            | Self::CommandSpawn { .. }
            | Self::UnsupportedDriver { .. }
            | Self::Connect { .. } => ErrorKind::Provisioning,
            Self::InvalidConfig { .. } => ErrorKind::Config,
            Self::FeatureMismatch { .. }
            | Self::OutcomeAlreadyRecorded { .. }
            | Self::TestNotRun { .. }
            | Self::EmptyFeature { .. } => ErrorKind::ContractViolation,
            Self::Io(_) | Self::ReportSerialize { .. } => ErrorKind::Io,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error points at a harness bug rather than the environment.
    pub const fn is_contract_violation(&self) -> bool {
        matches!(self.kind(), ErrorKind::ContractViolation | ErrorKind::Internal)
    }

    /// Get a hint for the operator, if one applies.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::TestDirNotFound { .. } => {
                Some("check --sqltest-home and --spec-version point at a standards directory")
            }
            Self::CommandSpawn { .. } => Some("is the container CLI installed and on PATH?"),
            Self::CommandTimeout { .. } => {
                Some("raise --wait-for-image if the image build is slow")
            }
            Self::UnsupportedDriver { .. } => Some("use --driver sqlite or build with the matching cargo feature"),
            Self::Connect { .. } => Some("raise --wait-for-server if the server is slow to accept connections"),
            _ => None,
        }
    }

    /// Process exit code for this error.
    pub const fn exit_code(&self) -> i32 {
        self.kind() as i32
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a malformed-test load error.
    pub fn malformed_test(id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedTest {
            id: id.into(),
            detail: detail.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(detail: impl Into<String>) -> Self {
        Self::InvalidConfig {
            detail: detail.into(),
        }
    }
}

/// Result type alias using `SqlTestError`.
pub type Result<T> = std::result::Result<T, SqlTestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_malformed() {
        let err = SqlTestError::malformed_test("E011-01", "sql is a number");
        assert_eq!(err.to_string(), "malformed test 'E011-01': sql is a number");
    }

    #[test]
    fn error_display_feature_mismatch() {
        let err = SqlTestError::FeatureMismatch {
            test_id: "t1".to_owned(),
            test_feature: "E011".to_owned(),
            aggregate_feature: "E021".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "attempt to add test 't1' of feature 'E011' to feature 'E021'"
        );
    }

    #[test]
    fn error_display_timeout() {
        let err = SqlTestError::CommandTimeout {
            command: "docker build".to_owned(),
            timeout_secs: 600,
        };
        assert_eq!(
            err.to_string(),
            "process `docker build` failed to finish in 600 seconds"
        );
    }

    #[test]
    fn kind_mapping() {
        assert_eq!(
            SqlTestError::TestDirNotFound {
                path: PathBuf::from("standards/2016")
            }
            .kind(),
            ErrorKind::Load
        );
        assert_eq!(
            SqlTestError::UnsupportedDriver {
                driver: "odbc".to_owned()
            }
            .kind(),
            ErrorKind::Provisioning
        );
        assert_eq!(
            SqlTestError::invalid_config("x").kind(),
            ErrorKind::Config
        );
        assert_eq!(
            SqlTestError::OutcomeAlreadyRecorded {
                test_id: "t".to_owned()
            }
            .kind(),
            ErrorKind::ContractViolation
        );
        assert_eq!(SqlTestError::internal("bug").kind(), ErrorKind::Internal);
    }

    #[test]
    fn contract_violations_are_flagged() {
        assert!(
            SqlTestError::EmptyFeature {
                feature_id: "F1".to_owned()
            }
            .is_contract_violation()
        );
        assert!(SqlTestError::internal("x").is_contract_violation());
        assert!(!SqlTestError::invalid_config("x").is_contract_violation());
    }

    #[test]
    fn io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: SqlTestError = io_err.into();
        assert!(matches!(err, SqlTestError::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn exit_codes_are_distinct_and_nonzero() {
        let errors = [
            SqlTestError::internal("x"),
            SqlTestError::invalid_config("x"),
            SqlTestError::malformed_test("t", "x"),
            SqlTestError::Connect {
                url: "u".to_owned(),
                detail: "d".to_owned(),
            },
            SqlTestError::TestNotRun {
                test_id: "t".to_owned(),
            },
            SqlTestError::ReportSerialize {
                detail: "d".to_owned(),
            },
        ];
        let mut codes: Vec<i32> = errors.iter().map(SqlTestError::exit_code).collect();
        assert!(codes.iter().all(|code| *code != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn suggestions() {
        assert!(
            SqlTestError::CommandSpawn {
                command: "docker".to_owned(),
                detail: "not found".to_owned()
            }
            .suggestion()
            .is_some()
        );
        assert!(SqlTestError::internal("x").suggestion().is_none());
    }
}
