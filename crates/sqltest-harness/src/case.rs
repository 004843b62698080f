//! Conformance test case model.
//!
//! A [`TestCase`] is created once by the loader and is write-once with
//! respect to its [`Outcome`]: it starts `Unrun` and the execution engine
//! moves it to `Passed` or `Failed` exactly once. The failure detail lives
//! inside the `Failed` variant, so a detail without a failure (or the
//! reverse) cannot be represented.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqltest_error::{Result, SqlTestError};

/// SQL text as written in a test record: a single statement or an ordered
/// list of statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlSource {
    Single(String),
    Multiple(Vec<String>),
}

impl SqlSource {
    /// Normalize into the ordered statement sequence the engine executes.
    #[must_use]
    pub fn into_statements(self) -> Vec<String> {
        match self {
            Self::Single(sql) => vec![sql],
            Self::Multiple(statements) => statements,
        }
    }
}

impl From<&str> for SqlSource {
    fn from(sql: &str) -> Self {
        Self::Single(sql.to_owned())
    }
}

impl From<Vec<String>> for SqlSource {
    fn from(statements: Vec<String>) -> Self {
        Self::Multiple(statements)
    }
}

/// Raw error raised by a database session while executing a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlFailure {
    pub message: String,
    /// Vendor-specific numeric error code, when the driver exposes one.
    pub vendor_code: Option<i32>,
    /// Five-character SQLSTATE, when the driver exposes one.
    pub vendor_state: Option<String>,
}

impl SqlFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            vendor_code: None,
            vendor_state: None,
        }
    }

    #[must_use]
    pub fn with_vendor_code(mut self, code: i32) -> Self {
        self.vendor_code = Some(code);
        self
    }

    #[must_use]
    pub fn with_vendor_state(mut self, state: impl Into<String>) -> Self {
        self.vendor_state = Some(state.into());
        self
    }
}

impl fmt::Display for SqlFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        let mut codes = Vec::with_capacity(2);
        if let Some(code) = self.vendor_code {
            codes.push(format!("vendor_code={code}"));
        }
        if let Some(state) = &self.vendor_state {
            codes.push(format!("vendor_state={state}"));
        }
        if !codes.is_empty() {
            write!(f, " ({})", codes.join(", "))?;
        }
        Ok(())
    }
}

/// Failure captured for one test: which statement broke and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Zero-based position of the failing statement within the test.
    pub statement_index: usize,
    pub statement: String,
    pub error: SqlFailure,
}

/// Execution state of a test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Unrun,
    Passed,
    Failed(FailureDetail),
}

impl Outcome {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Unrun => "unrun",
            Self::Passed => "passed",
            Self::Failed(_) => "failed",
        }
    }
}

/// One conformance test: a feature id plus the statements that demonstrate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    id: String,
    feature_id: String,
    statements: Vec<String>,
    outcome: Outcome,
}

impl TestCase {
    /// Build a validated, unrun test case.
    ///
    /// Rejects empty ids, an empty statement list, and blank statements.
    pub fn new(
        id: impl Into<String>,
        feature_id: impl Into<String>,
        sql: impl Into<SqlSource>,
    ) -> Result<Self> {
        let id = id.into();
        let feature_id = feature_id.into();
        if id.trim().is_empty() {
            return Err(SqlTestError::malformed_test(
                "<unnamed>",
                format!("test of feature '{feature_id}' has an empty id"),
            ));
        }
        if feature_id.trim().is_empty() {
            return Err(SqlTestError::malformed_test(id, "feature is empty"));
        }

        let statements = sql.into().into_statements();
        if statements.is_empty() {
            return Err(SqlTestError::malformed_test(id, "sql has no statements"));
        }
        if let Some(index) = statements.iter().position(|sql| sql.trim().is_empty()) {
            return Err(SqlTestError::malformed_test(
                id,
                format!("statement {} is blank", index + 1),
            ));
        }

        Ok(Self {
            id,
            feature_id,
            statements,
            outcome: Outcome::Unrun,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn feature_id(&self) -> &str {
        &self.feature_id
    }

    /// Statements in execution order; never empty.
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_run(&self) -> bool {
        !matches!(self.outcome, Outcome::Unrun)
    }

    pub fn passed(&self) -> bool {
        matches!(self.outcome, Outcome::Passed)
    }

    pub fn failure(&self) -> Option<&FailureDetail> {
        match &self.outcome {
            Outcome::Failed(detail) => Some(detail),
            _ => None,
        }
    }

    /// Mark the test as passed. Fails if an outcome was already recorded.
    pub fn record_pass(&mut self) -> Result<()> {
        self.transition(Outcome::Passed)
    }

    /// Mark the test as failed with the captured detail. Fails if an outcome
    /// was already recorded.
    pub fn record_failure(&mut self, detail: FailureDetail) -> Result<()> {
        self.transition(Outcome::Failed(detail))
    }

    /// Multi-line rendering used by the report.
    pub fn describe(&self) -> String {
        self.to_string()
    }

    fn transition(&mut self, next: Outcome) -> Result<()> {
        if self.is_run() {
            return Err(SqlTestError::OutcomeAlreadyRecorded {
                test_id: self.id.clone(),
            });
        }
        self.outcome = next;
        Ok(())
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "feature: {}", self.feature_id)?;
        writeln!(f, "id: {}", self.id)?;
        f.write_str("sql: ")?;
        for statement in &self.statements {
            write!(f, "{statement}; ")?;
        }
        writeln!(f)?;
        write!(f, "outcome: {}", self.outcome.label())?;
        if let Outcome::Failed(detail) = &self.outcome {
            write!(
                f,
                "\nerror: {}\nfailed statement {}: {}",
                detail.error,
                detail.statement_index + 1,
                detail.statement
            )?;
        }
        Ok(())
    }
}
