#![allow(dead_code)]

pub(crate) mod postgrest;

use std::path::{Path, PathBuf};
use std::time::Duration;

use rls_probe::parser::schema::{parse_schema, SchemaCatalog};
use rls_probe::probe::client::RestClient;
use rls_probe::probe::retry::RetryPolicy;

pub(crate) const TEST_ANON_KEY: &str = "test-anon-key";

pub(crate) fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from("tests/fixtures").join(name)
}

pub(crate) fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).expect("fixture should be readable")
}

pub(crate) fn fixture_catalog(name: &str) -> SchemaCatalog {
    parse_schema(&read_fixture(name)).expect("fixture DDL should parse")
}

pub(crate) fn client_for(base_url: &str) -> RestClient {
    RestClient::new(
        base_url,
        TEST_ANON_KEY,
        Duration::from_secs(5),
        RetryPolicy::new(3, Duration::from_millis(10)),
    )
    .expect("client should build")
}

pub(crate) fn tables(names: &[&str]) -> Vec<String> {
    names.iter().map(|t| t.to_string()).collect()
}

pub(crate) fn write_source(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("source dir should be creatable");
    }
    std::fs::write(path, content).expect("source file should be writable");
}
