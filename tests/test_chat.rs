use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;

mod common;

#[test]
fn test_chat_answer() {
    let test_context = common::TestContext::new();
    test_context.write_mock_config();

    let mut cmd = test_context.get_command();
    cmd.arg("chat").arg("hello there");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("echo: hello there"));
}

#[test]
fn test_chat_stream() {
    let test_context = common::TestContext::new();
    test_context.write_mock_config();

    let mut cmd = test_context.get_command();
    cmd.arg("chat")
        .arg("--stream")
        .arg("--chat-id")
        .arg("streaming")
        .arg("one two three");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("one two three\n"));
}

#[test]
fn test_complete_text_type() {
    let test_context = common::TestContext::new();
    test_context.write_mock_config();

    let mut cmd = test_context.get_command();
    cmd.arg("complete").arg("--type").arg("3").arg("a long sentence");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("[3] a long sentence"));
}

#[test]
fn test_complete_type_out_of_range() {
    let test_context = common::TestContext::new();
    test_context.write_mock_config();

    let mut cmd = test_context.get_command();
    cmd.arg("complete").arg("--type").arg("9").arg("text");

    cmd.assert().failure();
}

#[test]
fn test_related_questions() {
    let test_context = common::TestContext::new();
    test_context.write_mock_config();

    let mut cmd = test_context.get_command();
    cmd.arg("related").arg("--chat-id").arg("abc").arg("what is this?");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("What else is in abc?"))
        .stdout(predicate::str::contains("Can you say more?"));
}

#[test]
fn test_index_file() {
    let test_context = common::TestContext::new();
    test_context.write_mock_config();
    let doc = test_context.workdir.child("notes.md");
    doc.write_str("# Notes\n").unwrap();

    let mut cmd = test_context.get_command();
    cmd.arg("index").arg("--chat-id").arg("abc").arg(doc.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("into chat abc"));
}

#[test]
fn test_index_missing_file() {
    let test_context = common::TestContext::new();
    test_context.write_mock_config();

    let mut cmd = test_context.get_command();
    cmd.arg("index").arg(test_context.workdir().join("missing.md"));

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("missing.md"));
}

#[test]
fn test_chat_plugin_crash() {
    let test_context = common::TestContext::new();
    test_context.write_mock_config_with_chat_args("--crash-on answer");

    let mut cmd = test_context.get_command();
    cmd.arg("chat").arg("hello");

    cmd.assert()
        .failure()
        .stdout(predicate::str::contains("echo:").not())
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_chat_failure_still_shuts_plugin_down() {
    let test_context = common::TestContext::new();
    test_context.write_mock_config_with_chat_args("--fail-on answer");

    let mut cmd = test_context.get_command();
    cmd.arg("chat").arg("hello");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("answer failed"))
        .stderr(predicate::str::contains("[Mock Plugin] shutting down"));
}

#[test]
fn test_related_create_failure_still_shuts_plugin_down() {
    let test_context = common::TestContext::new();
    test_context.write_mock_config_with_chat_args("--fail-on create_chat");

    let mut cmd = test_context.get_command();
    cmd.arg("related").arg("anything");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("create_chat failed"))
        .stderr(predicate::str::contains("[Mock Plugin] shutting down"));
}

#[test]
fn test_index_create_failure_still_shuts_plugin_down() {
    let test_context = common::TestContext::new();
    test_context.write_mock_config_with_chat_args("--fail-on create_chat");
    let doc = test_context.workdir.child("notes.md");
    doc.write_str("# Notes\n").unwrap();

    let mut cmd = test_context.get_command();
    cmd.arg("index").arg(doc.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("[Mock Plugin] shutting down"));
}

#[test]
fn test_chat_from_env_file() {
    let test_context = common::TestContext::new();
    let model = test_context.touch_model("chat.gguf");
    test_context
        .workdir
        .child(".env")
        .write_str(&format!(
            "CHAT_BIN_PATH={}\nLOCAL_AI_CHAT_MODEL_NAME={}\n",
            common::MOCK_PLUGIN,
            model.display()
        ))
        .unwrap();

    let mut cmd = test_context.get_command();
    cmd.arg("chat").arg("from env");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("echo: from env"));
}
