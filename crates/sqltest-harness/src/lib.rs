//! SQL-standard conformance harness.
//!
//! Loads `*.tests.yml` test files, optionally provisions the system under
//! test in a container, runs every test against one database session, and
//! writes a per-feature Yes/Partial/No report.

pub mod case;
pub mod config;
pub mod container;
pub mod engine;
pub mod feature;
pub mod loader;
pub mod log;
pub mod report;
pub mod run;
pub mod session;

pub use case::{FailureDetail, Outcome, SqlFailure, SqlSource, TestCase};
pub use config::{HarnessConfig, PortMapping};
pub use container::{CommandOutput, CommandRunner, ContainerLifecycle, ProcessRunner};
pub use engine::{ExecutionEngine, run_tests};
pub use feature::{FeatureAggregate, FeatureRegistry, SupportStatus};
pub use loader::load_tests;
pub use report::{ConformanceReport, RunInfo, SupportSummary};
pub use run::{Connector, DriverConnector, RunSummary, run_conformance, run_conformance_with};
pub use session::{ConnectionSpec, Credentials, Execution, Session, SqliteSession};
