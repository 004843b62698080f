//! Sequential execution of test cases against one live session.
//!
//! Each test runs its statements in order and stops at the first error.
//! A failing test is recorded and the run moves on; only contract
//! violations (a test routed to the wrong feature, an outcome recorded
//! twice) abort the run.

use sqltest_error::{Result, SqlTestError};
use tracing::{debug, info, warn};

use crate::case::{FailureDetail, TestCase};
use crate::feature::FeatureRegistry;
use crate::session::Session;

/// Runs tests one at a time and routes each outcome to its feature.
pub struct ExecutionEngine<'a, S: Session + ?Sized> {
    session: &'a mut S,
    registry: FeatureRegistry,
}

impl<'a, S: Session + ?Sized> ExecutionEngine<'a, S> {
    pub fn new(session: &'a mut S) -> Self {
        Self {
            session,
            registry: FeatureRegistry::new(),
        }
    }

    /// Run every test in the order given and return the populated registry.
    pub fn run_all(mut self, tests: impl IntoIterator<Item = TestCase>) -> Result<FeatureRegistry> {
        info!(session = %self.session.describe(), "starting conformance run");
        for test in tests {
            self.run_test(test)?;
        }
        info!(
            features = self.registry.len(),
            tests = self.registry.test_count(),
            "conformance run finished"
        );
        Ok(self.registry)
    }

    /// Execute one test, record its outcome, and hand it to its feature.
    ///
    /// The test is inserted only after its outcome is set, so the registry
    /// is valid for reporting between any two calls.
    pub fn run_test(&mut self, mut test: TestCase) -> Result<()> {
        if test.is_run() {
            return Err(SqlTestError::OutcomeAlreadyRecorded {
                test_id: test.id().to_owned(),
            });
        }
        info!(
            test_id = test.id(),
            feature_id = test.feature_id(),
            "Running test {} as part of feature {}",
            test.id(),
            test.feature_id()
        );
        match self.execute_statements(&test) {
            Ok(()) => {
                test.record_pass()?;
                info!(test_id = test.id(), "Test {} passed", test.id());
            }
            Err(detail) => {
                warn!(
                    test_id = test.id(),
                    statement_index = detail.statement_index,
                    vendor_code = detail.error.vendor_code,
                    vendor_state = detail.error.vendor_state.as_deref(),
                    error = %detail.error.message,
                    "While running {} caught SQL error",
                    detail.statement
                );
                test.record_failure(detail)?;
                info!(test_id = test.id(), "Test {} failed", test.id());
            }
        }
        self.registry.record(test)
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> FeatureRegistry {
        self.registry
    }

    fn execute_statements(&mut self, test: &TestCase) -> std::result::Result<(), FailureDetail> {
        for (statement_index, statement) in test.statements().iter().enumerate() {
            debug!(
                test_id = test.id(),
                statement_index,
                "Going to execute <{statement}>"
            );
            let fetched = match self.session.execute(statement) {
                Ok(execution) if execution.has_result_set => self.session.fetch_one().map(Some),
                Ok(_) => Ok(None),
                Err(error) => Err(error),
            };
            match fetched {
                Ok(Some(false)) => {
                    debug!(test_id = test.id(), statement_index, "result set was empty");
                }
                Ok(_) => {}
                Err(error) => {
                    return Err(FailureDetail {
                        statement_index,
                        statement: statement.clone(),
                        error,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Convenience wrapper: run `tests` against `session` in order.
pub fn run_tests<S: Session + ?Sized>(
    session: &mut S,
    tests: impl IntoIterator<Item = TestCase>,
) -> Result<FeatureRegistry> {
    ExecutionEngine::new(session).run_all(tests)
}
