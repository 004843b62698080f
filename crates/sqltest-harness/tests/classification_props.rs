//! Property tests for feature classification and report summaries.

use proptest::prelude::*;
use sqltest_harness::report::{ConformanceReport, RunInfo};
use sqltest_harness::{
    FailureDetail, FeatureAggregate, FeatureRegistry, SqlFailure, SupportStatus, TestCase,
};

fn executed(id: usize, feature: &str, pass: bool) -> TestCase {
    let mut case = TestCase::new(format!("t{id}"), feature, "SELECT 1").expect("valid case");
    if pass {
        case.record_pass().expect("first outcome");
    } else {
        case.record_failure(FailureDetail {
            statement_index: 0,
            statement: "SELECT 1".to_owned(),
            error: SqlFailure::new("boom"),
        })
        .expect("first outcome");
    }
    case
}

proptest! {
    #[test]
    fn classification_matches_pass_counts(outcomes in prop::collection::vec(any::<bool>(), 1..40)) {
        let mut feature = FeatureAggregate::new("F1");
        for (id, pass) in outcomes.iter().enumerate() {
            feature.add_test(executed(id, "F1", *pass)).expect("same feature");
        }
        let passed = outcomes.iter().filter(|pass| **pass).count();
        let expected = if passed == outcomes.len() {
            SupportStatus::Supported
        } else if passed == 0 {
            SupportStatus::Unsupported
        } else {
            SupportStatus::PartiallySupported
        };
        prop_assert_eq!(feature.classification().expect("non-empty"), expected);
        prop_assert_eq!(feature.passed(), passed);
    }

    #[test]
    fn summary_partitions_features(assignments in prop::collection::vec((0usize..6, any::<bool>()), 1..60)) {
        let mut registry = FeatureRegistry::new();
        for (id, (feature, pass)) in assignments.iter().enumerate() {
            registry.record(executed(id, &format!("F{feature}"), *pass)).expect("routed");
        }
        let report = ConformanceReport::build(RunInfo::new("sut", "1", "2016"), &registry)
            .expect("no empty features");
        prop_assert_eq!(report.summary.total(), registry.len());
        prop_assert_eq!(registry.test_count(), assignments.len());

        let ids: Vec<&str> = report.features.iter().map(|f| f.feature_id.as_str()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        prop_assert_eq!(ids, sorted);
        prop_assert_eq!(report.render_text(), report.render_text());
    }
}
