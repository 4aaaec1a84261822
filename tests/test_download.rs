use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;

#[tokio::test(flavor = "multi_thread")]
async fn test_download_from_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/llm/bundle.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 4096]))
        .mount(&server)
        .await;

    let test_context = common::TestContext::new();
    test_context.write_config(&format!(
        r#"
        [download]
        url = "{}/llm/bundle.zip"
        dir = "downloads"
        "#,
        server.uri()
    ));

    let mut cmd = test_context.get_command();
    cmd.arg("download");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("AppFlowyLLM.zip"));
    let bundle = test_context.workdir.child("downloads/AppFlowyLLM.zip");
    bundle.assert(predicate::path::is_file());
    assert_eq!(std::fs::read(bundle.path()).unwrap().len(), 4096);
    test_context
        .workdir
        .child("downloads/AppFlowyLLM.zip.part")
        .assert(predicate::path::missing());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_download_flags_override_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/other.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"plugin".to_vec()))
        .mount(&server)
        .await;

    let test_context = common::TestContext::new();
    test_context.write_config(
        r#"
        [download]
        url = "http://127.0.0.1:9/unused.zip"
        "#,
    );

    let mut cmd = test_context.get_command();
    cmd.arg("download")
        .arg("--url")
        .arg(format!("{}/other.zip", server.uri()))
        .arg("--dir")
        .arg("out")
        .arg("--file-name")
        .arg("plugin.zip");

    cmd.assert().success();
    test_context
        .workdir
        .child("out/plugin.zip")
        .assert(predicate::str::diff("plugin"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_download_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let test_context = common::TestContext::new();

    let mut cmd = test_context.get_command();
    cmd.arg("download")
        .arg("--url")
        .arg(format!("{}/missing.zip", server.uri()))
        .arg("--dir")
        .arg("out");

    cmd.assert().failure().stderr(predicate::str::contains("404"));
    test_context
        .workdir
        .child("out/AppFlowyLLM.zip")
        .assert(predicate::path::missing());
}

#[test]
fn test_download_without_url() {
    let test_context = common::TestContext::new();

    let mut cmd = test_context.get_command();
    cmd.arg("download");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No download url"));
}
