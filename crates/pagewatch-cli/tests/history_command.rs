#![allow(missing_docs, clippy::expect_used, clippy::unwrap_used)]

use predicates::prelude::*;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::pagewatch_cmd;

#[tokio::test]
async fn history_lists_completed_executions() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/news"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/news"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>Headline</p>"))
        .mount(&server)
        .await;
    let url = format!("{}/news", server.uri());

    pagewatch_cmd(dir.path()).arg(&url).assert().success();

    pagewatch_cmd(dir.path())
        .args([url.as_str(), "--history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 execution(s) recorded"))
        .stdout(predicate::str::contains("new_content"));

    let output = pagewatch_cmd(dir.path())
        .args([url.as_str(), "--history", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let records: serde_json::Value = serde_json::from_slice(&output)?;
    assert_eq!(records.as_array().map(Vec::len), Some(1));
    assert_eq!(records[0]["url"], url.as_str());
    Ok(())
}

#[test]
fn history_for_unknown_url_is_empty() -> anyhow::Result<()> {
    let dir = tempdir()?;

    pagewatch_cmd(dir.path())
        .args(["https://never-checked.example/", "--history"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No executions recorded"));
    Ok(())
}
