//! Test file discovery and validation against a scratch standards tree.

use std::fs;
use std::path::Path;

use sqltest_error::SqlTestError;
use sqltest_harness::loader::{discover_test_files, load_tests};

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("file has a parent")).expect("create dirs");
    fs::write(path, contents).expect("write test file");
}

#[test]
fn discovery_is_recursive_sorted_and_suffix_filtered() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "e/E021.tests.yml", "");
    write(dir.path(), "E011.tests.yml", "");
    write(dir.path(), "a/b/F031.tests.yml", "");
    write(dir.path(), "README.md", "");
    write(dir.path(), "E011.tests.yaml", "");

    let files = discover_test_files(dir.path()).expect("discover");
    let relative: Vec<String> = files
        .iter()
        .map(|p| {
            p.strip_prefix(dir.path())
                .expect("under root")
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    assert_eq!(relative, ["E011.tests.yml", "a/b/F031.tests.yml", "e/E021.tests.yml"]);
}

#[test]
fn missing_directory_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_tests(&dir.path().join("standards/2016")).expect_err("must fail");
    assert!(matches!(err, SqlTestError::TestDirNotFound { .. }));
}

#[test]
fn file_instead_of_directory_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "2016", "not a dir");
    let err = load_tests(&dir.path().join("2016")).expect_err("must fail");
    assert!(matches!(err, SqlTestError::NotADirectory { .. }));
}

#[test]
fn empty_tree_has_no_tests() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "E011.tests.yml", "---\n");
    let err = load_tests(dir.path()).expect_err("must fail");
    assert!(matches!(err, SqlTestError::NoTests { .. }));
}

#[test]
fn tests_load_in_file_then_document_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(
        dir.path(),
        "E021.tests.yml",
        "feature: E021-01\nid: E021-01-01\nsql: CREATE TABLE t(a CHAR)\n",
    );
    write(
        dir.path(),
        "E011.tests.yml",
        "feature: E011-01\nid: E011-01-01\nsql: CREATE TABLE t(a INTEGER)\n\
         ---\n\
         feature: E011-01\nid: E011-01-02\nsql:\n  - CREATE TABLE t(a SMALLINT)\n  - SELECT a FROM t\n",
    );

    let tests = load_tests(dir.path()).expect("load");
    let ids: Vec<&str> = tests.iter().map(|t| t.id()).collect();
    assert_eq!(ids, ["E011-01-01", "E011-01-02", "E021-01-01"]);
    assert_eq!(tests[1].statements().len(), 2);
    assert!(tests.iter().all(|t| !t.is_run()));
}

#[test]
fn duplicate_ids_across_files_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "a.tests.yml", "feature: F1\nid: dup\nsql: SELECT 1\n");
    write(dir.path(), "b.tests.yml", "feature: F2\nid: dup\nsql: SELECT 2\n");
    let err = load_tests(dir.path()).expect_err("must fail");
    match err {
        SqlTestError::DuplicateTestId { id, path } => {
            assert_eq!(id, "dup");
            assert!(path.ends_with("b.tests.yml"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn blank_statement_fails_before_execution() {
    let dir = tempfile::tempdir().expect("tempdir");
    write(
        dir.path(),
        "a.tests.yml",
        "feature: F1\nid: t1\nsql:\n  - SELECT 1\n  - \"  \"\n",
    );
    let err = load_tests(dir.path()).expect_err("must fail");
    assert!(matches!(err, SqlTestError::MalformedTest { ref id, .. } if id == "t1"));
}
