//! Per-feature rollup of test outcomes.
//!
//! Classification is a pure function of the tests held by an aggregate and
//! is recomputed on every query, so appending after a query can never leave
//! a stale answer behind.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sqltest_error::{Result, SqlTestError};

use crate::case::TestCase;
use crate::report::FeatureReport;

/// Separator line between blocks in rendered reports.
pub const BLOCK_SEPARATOR: &str = "--------------------------------";

/// Feature-level support classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportStatus {
    /// Every test passed.
    Supported,
    /// Some tests passed, some failed.
    PartiallySupported,
    /// No test passed.
    Unsupported,
}

impl SupportStatus {
    /// Classify from pass/total counts. `None` when there are no tests.
    #[must_use]
    pub const fn from_counts(passed: usize, total: usize) -> Option<Self> {
        if total == 0 {
            None
        } else if passed == total {
            Some(Self::Supported)
        } else if passed == 0 {
            Some(Self::Unsupported)
        } else {
            Some(Self::PartiallySupported)
        }
    }
}

impl fmt::Display for SupportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Supported => f.write_str("YES"),
            Self::PartiallySupported => f.write_str("PARTIAL"),
            Self::Unsupported => f.write_str("NO"),
        }
    }
}

/// All executed tests of one feature, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureAggregate {
    feature_id: String,
    tests: Vec<TestCase>,
}

impl FeatureAggregate {
    pub fn new(feature_id: impl Into<String>) -> Self {
        Self {
            feature_id: feature_id.into(),
            tests: Vec::new(),
        }
    }

    pub fn feature_id(&self) -> &str {
        &self.feature_id
    }

    pub fn tests(&self) -> &[TestCase] {
        &self.tests
    }

    pub fn total(&self) -> usize {
        self.tests.len()
    }

    pub fn passed(&self) -> usize {
        self.tests.iter().filter(|test| test.passed()).count()
    }

    /// Append an executed test.
    ///
    /// The test must belong to this feature and already carry its outcome;
    /// otherwise the aggregate is left untouched and a contract violation is
    /// returned.
    pub fn add_test(&mut self, test: TestCase) -> Result<()> {
        if test.feature_id() != self.feature_id {
            return Err(SqlTestError::FeatureMismatch {
                test_id: test.id().to_owned(),
                test_feature: test.feature_id().to_owned(),
                aggregate_feature: self.feature_id.clone(),
            });
        }
        if !test.is_run() {
            return Err(SqlTestError::TestNotRun {
                test_id: test.id().to_owned(),
            });
        }
        self.tests.push(test);
        Ok(())
    }

    /// Derive the support classification from the current tests.
    pub fn classification(&self) -> Result<SupportStatus> {
        SupportStatus::from_counts(self.passed(), self.total()).ok_or_else(|| {
            SqlTestError::EmptyFeature {
                feature_id: self.feature_id.clone(),
            }
        })
    }

    /// Multi-line rendering: header, then every test separated by blank lines.
    pub fn describe(&self) -> Result<String> {
        FeatureReport::from_aggregate(self).map(|report| report.to_string())
    }
}

/// Feature id -> aggregate map, iterated in ascending feature id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeatureRegistry {
    features: BTreeMap<String, FeatureAggregate>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the aggregate for `feature_id`, creating it on first use.
    pub fn get_or_create(&mut self, feature_id: &str) -> &mut FeatureAggregate {
        self.features
            .entry(feature_id.to_owned())
            .or_insert_with(|| FeatureAggregate::new(feature_id))
    }

    /// Route an executed test to the aggregate of its feature.
    pub fn record(&mut self, test: TestCase) -> Result<()> {
        let feature_id = test.feature_id().to_owned();
        self.get_or_create(&feature_id).add_test(test)
    }

    pub fn get(&self, feature_id: &str) -> Option<&FeatureAggregate> {
        self.features.get(feature_id)
    }

    /// Aggregates in ascending feature id order.
    pub fn iter(&self) -> impl Iterator<Item = &FeatureAggregate> {
        self.features.values()
    }

    /// Every recorded test, grouped by feature in ascending feature id order.
    pub fn tests(&self) -> impl Iterator<Item = &TestCase> {
        self.features.values().flat_map(|feature| feature.tests().iter())
    }

    pub fn find_test(&self, test_id: &str) -> Option<&TestCase> {
        self.tests().find(|test| test.id() == test_id)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn test_count(&self) -> usize {
        self.features.values().map(FeatureAggregate::total).sum()
    }
}
