#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;

pub const MOCK_PLUGIN: &str = env!("CARGO_BIN_EXE_aiplug-mock-plugin");

/// Variables that would otherwise leak the developer's setup into a test.
const OVERRIDES: [&str; 6] = [
    "CHAT_BIN_PATH",
    "EMBEDDING_BIN_PATH",
    "LOCAL_AI_MODEL_DIR",
    "LOCAL_AI_CHAT_MODEL_NAME",
    "LOCAL_AI_RELATED_QUESTION_NAME",
    "LOCAL_AI_EMBEDDING_MODEL_NAME",
];

pub struct TestContext {
    pub workdir: assert_fs::TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        Self { workdir: assert_fs::TempDir::new().unwrap() }
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    pub fn write_config(&self, config_src: &str) {
        let config_path = self.workdir.child("aiplug.toml");
        config_path.write_str(config_src).unwrap();
    }

    /// Creates an empty model file under `models/`.
    pub fn touch_model(&self, name: &str) -> PathBuf {
        let model = self.workdir.child("models").child(name);
        model.touch().unwrap();
        model.path().to_path_buf()
    }

    /// Both plugins backed by the mock binary, with chat RAG turned on.
    pub fn write_mock_config(&self) {
        self.write_mock_config_with_chat_args("");
    }

    /// Like `write_mock_config`, passing `chat_args` to the chat plugin.
    pub fn write_mock_config_with_chat_args(&self, chat_args: &str) {
        self.touch_model("chat.gguf");
        self.touch_model("related.gguf");
        self.touch_model("embed.gguf");
        self.write_config(&format!(
            r#"
            model_dir = "models"

            [chat]
            bin_path = "{mock}"
            model_path = "chat.gguf"
            related_model_path = "related.gguf"
            embedding_model_path = "embed.gguf"
            persist_directory = "store"
            args = "{chat_args}"

            [embedding]
            bin_path = "{mock}"
            model_path = "embed.gguf"
            "#,
            mock = MOCK_PLUGIN,
            chat_args = chat_args
        ));
    }

    pub fn get_command(&self) -> Command {
        self.get_command_in(self.workdir())
    }

    pub fn get_command_in(&self, dir: &Path) -> Command {
        let mut cmd = Command::cargo_bin("aiplug").unwrap();
        for key in OVERRIDES {
            cmd.env_remove(key);
        }
        cmd.arg("--debug").arg("-C").arg(dir);
        cmd
    }
}
