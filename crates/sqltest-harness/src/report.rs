//! Conformance report: per-feature blocks plus a Yes/Partial/No summary.
//!
//! A [`ConformanceReport`] is a snapshot built from a [`FeatureRegistry`].
//! Rendering it is pure, so the text and JSON sinks produce identical output
//! no matter how often they are written.

use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use sqltest_error::{Result, SqlTestError};
use tracing::info;

use crate::case::TestCase;
use crate::feature::{BLOCK_SEPARATOR, FeatureAggregate, FeatureRegistry, SupportStatus};

/// JSON schema version for the report format.
pub const REPORT_SCHEMA_V1: &str = "sqltest.report.v1";

/// Identity and timing of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunInfo {
    pub system_under_test: String,
    pub system_version: String,
    pub spec_version: String,
    /// Milliseconds since Unix epoch, captured at run start.
    pub started_unix_ms: u64,
    /// Milliseconds since Unix epoch, captured at run finish (if finished).
    pub finished_unix_ms: Option<u64>,
}

impl RunInfo {
    pub fn new(
        system_under_test: impl Into<String>,
        system_version: impl Into<String>,
        spec_version: impl Into<String>,
    ) -> Self {
        Self {
            system_under_test: system_under_test.into(),
            system_version: system_version.into(),
            spec_version: spec_version.into(),
            started_unix_ms: unix_ms_now(),
            finished_unix_ms: None,
        }
    }

    pub fn finish(&mut self) {
        self.finished_unix_ms = Some(unix_ms_now());
    }
}

/// Count of features per classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SupportSummary {
    pub supported: usize,
    pub partially_supported: usize,
    pub unsupported: usize,
}

impl SupportSummary {
    pub fn add(&mut self, status: SupportStatus) {
        match status {
            SupportStatus::Supported => self.supported += 1,
            SupportStatus::PartiallySupported => self.partially_supported += 1,
            SupportStatus::Unsupported => self.unsupported += 1,
        }
    }

    pub const fn total(&self) -> usize {
        self.supported + self.partially_supported + self.unsupported
    }
}

/// One feature block of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureReport {
    pub feature_id: String,
    pub support: SupportStatus,
    pub passed: usize,
    pub total: usize,
    pub tests: Vec<TestCase>,
}

impl FeatureReport {
    /// Snapshot an aggregate. Fails with `EmptyFeature` when it holds no tests.
    pub fn from_aggregate(feature: &FeatureAggregate) -> Result<Self> {
        Ok(Self {
            feature_id: feature.feature_id().to_owned(),
            support: feature.classification()?,
            passed: feature.passed(),
            total: feature.total(),
            tests: feature.tests().to_vec(),
        })
    }
}

impl fmt::Display for FeatureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "feature: {}\nsupport: {}\ntests: {}/{} passed",
            self.feature_id, self.support, self.passed, self.total
        )?;
        for test in &self.tests {
            write!(f, "\n\n{test}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConformanceReport {
    pub schema_version: String,
    pub run: RunInfo,
    pub features: Vec<FeatureReport>,
    pub summary: SupportSummary,
}

impl ConformanceReport {
    /// Snapshot every feature of `registry` in ascending feature id order.
    pub fn build(run: RunInfo, registry: &FeatureRegistry) -> Result<Self> {
        let features = registry
            .iter()
            .map(FeatureReport::from_aggregate)
            .collect::<Result<Vec<_>>>()?;
        let mut summary = SupportSummary::default();
        for feature in &features {
            summary.add(feature.support);
        }
        Ok(Self {
            schema_version: REPORT_SCHEMA_V1.to_owned(),
            run,
            features,
            summary,
        })
    }

    pub fn render_text(&self) -> String {
        self.to_string()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| SqlTestError::ReportSerialize {
            detail: err.to_string(),
        })
    }

    /// Write the text report to `path`, replacing any previous content.
    pub fn write_text(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render_text())?;
        info!(path = %path.display(), features = self.features.len(), "wrote report");
        Ok(())
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut json = self.to_json()?;
        json.push('\n');
        std::fs::write(path, json)?;
        info!(path = %path.display(), "wrote json report");
        Ok(())
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for feature in &self.features {
            writeln!(f, "{feature}")?;
            writeln!(f, "{BLOCK_SEPARATOR}")?;
        }
        writeln!(f)?;
        writeln!(f, "{BLOCK_SEPARATOR}")?;
        writeln!(f, "Summary:")?;
        writeln!(f, "Yes: {}", self.summary.supported)?;
        writeln!(f, "Partial: {}", self.summary.partially_supported)?;
        writeln!(f, "No: {}", self.summary.unsupported)
    }
}

fn unix_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
        })
}
