use assert_cmd::prelude::*;
use predicates::prelude::*;

mod common;

#[test]
fn test_embed_text() {
    let test_context = common::TestContext::new();
    test_context.write_mock_config();

    let mut cmd = test_context.get_command();
    cmd.arg("embed").arg("a b");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("[[2.0,3.0,1.0]]"));
}

#[test]
fn test_search_with_filter() {
    let test_context = common::TestContext::new();
    test_context.write_mock_config();

    let mut cmd = test_context.get_command();
    cmd.arg("search")
        .arg("--filter")
        .arg("topic=pets")
        .arg("--document")
        .arg("the cat sat")
        .arg("--document")
        .arg("a dog barked")
        .arg("cat");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("the cat sat"))
        .stdout(predicate::str::contains("a dog barked").not());
}

#[test]
fn test_search_bad_filter() {
    let test_context = common::TestContext::new();
    test_context.write_mock_config();

    let mut cmd = test_context.get_command();
    cmd.arg("search").arg("--filter").arg("no-equals").arg("cat");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn test_embed_not_configured() {
    let test_context = common::TestContext::new();
    test_context.touch_model("chat.gguf");
    test_context.write_config(&format!(
        r#"
        [chat]
        bin_path = "{}"
        model_path = "models/chat.gguf"
        "#,
        common::MOCK_PLUGIN
    ));

    let mut cmd = test_context.get_command();
    cmd.arg("embed").arg("text");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No embedding plugin configured"));
}
