//! Discovery and parsing of `*.tests.yml` files.
//!
//! Each file is a multi-document YAML stream. Every non-null document is one
//! test record:
//!
//! ```yaml
//! feature: E011-01
//! id: E011-01-01
//! sql: CREATE TABLE t(a INTEGER)
//! ---
//! feature: E011-01
//! id: E011-01-02
//! sql:
//!   - CREATE TABLE t(a SMALLINT)
//!   - SELECT a FROM t
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use sqltest_error::{Result, SqlTestError};
use tracing::{debug, info};

use crate::case::{SqlSource, TestCase};

/// File name suffix that marks a test file.
pub const TEST_FILE_SUFFIX: &str = ".tests.yml";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TestRecord {
    #[serde(deserialize_with = "scalar_string")]
    feature: String,
    #[serde(deserialize_with = "scalar_string")]
    id: String,
    sql: SqlSource,
}

/// Read a YAML scalar as text, so `id: 1` and `feature: 2016` load as the
/// strings `"1"` and `"2016"`.
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(text) => Ok(text),
        serde_yaml::Value::Number(number) => Ok(number.to_string()),
        serde_yaml::Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, found {other:?}"
        ))),
    }
}

/// Recursively find test files under `dir`, sorted by path.
pub fn discover_test_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Err(SqlTestError::TestDirNotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(SqlTestError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in std::fs::read_dir(&current)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if is_test_file(&path) && path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn is_test_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.len() > TEST_FILE_SUFFIX.len() && name.ends_with(TEST_FILE_SUFFIX))
}

/// Parse every record in one YAML stream. `path` is used for diagnostics only.
pub fn parse_tests(source: &str, path: &Path) -> Result<Vec<TestCase>> {
    let mut tests = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(source).enumerate() {
        let value = serde_yaml::Value::deserialize(document).map_err(|err| {
            SqlTestError::TestFileParse {
                path: path.to_path_buf(),
                detail: err.to_string(),
            }
        })?;
        if value.is_null() {
            continue;
        }
        let label = value
            .get("id")
            .and_then(serde_yaml::Value::as_str)
            .map_or_else(
                || format!("document {} of {}", index + 1, path.display()),
                str::to_owned,
            );
        let record: TestRecord = serde_yaml::from_value(value)
            .map_err(|err| SqlTestError::malformed_test(label, err.to_string()))?;
        tests.push(TestCase::new(record.id, record.feature, record.sql)?);
    }
    Ok(tests)
}

/// Read and parse one test file.
pub fn load_test_file(path: &Path) -> Result<Vec<TestCase>> {
    let source = std::fs::read_to_string(path)?;
    let tests = parse_tests(&source, path)?;
    debug!(path = %path.display(), tests = tests.len(), "parsed test file");
    Ok(tests)
}

/// Discover, parse, and validate every test under `dir`.
///
/// Tests come back in file path order, then document order within a file.
/// Ids must be unique across the whole load.
pub fn load_tests(dir: &Path) -> Result<Vec<TestCase>> {
    let files = discover_test_files(dir)?;
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut tests = Vec::new();
    for file in &files {
        for test in load_test_file(file)? {
            if seen.insert(test.id().to_owned(), file.clone()).is_some() {
                return Err(SqlTestError::DuplicateTestId {
                    id: test.id().to_owned(),
                    path: file.clone(),
                });
            }
            tests.push(test);
        }
    }
    if tests.is_empty() {
        return Err(SqlTestError::NoTests {
            path: dir.to_path_buf(),
        });
    }
    info!(
        dir = %dir.display(),
        files = files.len(),
        tests = tests.len(),
        "loaded conformance tests"
    );
    Ok(tests)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Vec<TestCase>> {
        parse_tests(source, Path::new("inline.tests.yml"))
    }

    #[test]
    fn scalar_and_list_sql_normalize_alike() {
        let tests = parse(
            "feature: E011\nid: a\nsql: SELECT 1\n---\nfeature: E011\nid: b\nsql:\n  - SELECT 1\n",
        )
        .unwrap();
        assert_eq!(tests.len(), 2);
        assert_eq!(tests[0].statements(), tests[1].statements());
    }

    #[test]
    fn null_documents_are_skipped() {
        let tests = parse("---\n---\nfeature: E011\nid: a\nsql: SELECT 1\n---\n").unwrap();
        assert_eq!(tests.len(), 1);
    }

    #[test]
    fn non_string_sql_is_malformed() {
        let err = parse("feature: E011\nid: a\nsql: 42\n").unwrap_err();
        assert!(matches!(err, SqlTestError::MalformedTest { ref id, .. } if id == "a"));
    }

    #[test]
    fn numeric_ids_load_as_text() {
        let tests = parse("feature: 2016\nid: 1\nsql: SELECT 1\n").unwrap();
        assert_eq!(tests[0].id(), "1");
        assert_eq!(tests[0].feature_id(), "2016");
    }

    #[test]
    fn structured_id_is_malformed() {
        let err = parse("feature: E011\nid: [a, b]\nsql: SELECT 1\n").unwrap_err();
        assert!(matches!(err, SqlTestError::MalformedTest { .. }));
    }

    #[test]
    fn missing_field_is_malformed() {
        let err = parse("feature: E011\nsql: SELECT 1\n").unwrap_err();
        assert!(
            matches!(err, SqlTestError::MalformedTest { ref id, .. } if id.starts_with("document 1"))
        );
    }

    #[test]
    fn unknown_field_is_malformed() {
        let err = parse("feature: E011\nid: a\nsql: SELECT 1\nexpect: ok\n").unwrap_err();
        assert!(matches!(err, SqlTestError::MalformedTest { .. }));
    }

    #[test]
    fn invalid_yaml_is_parse_error() {
        let err = parse("feature: [unterminated\n").unwrap_err();
        assert!(matches!(err, SqlTestError::TestFileParse { .. }));
    }

    #[test]
    fn suffix_match_requires_a_stem() {
        assert!(is_test_file(Path::new("dir/e011.tests.yml")));
        assert!(!is_test_file(Path::new("dir/.tests.yml")));
        assert!(!is_test_file(Path::new("dir/e011.tests.yaml")));
        assert!(!is_test_file(Path::new("dir/e011.yml")));
    }
}
