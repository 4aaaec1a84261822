//! Runs against the real plugin binaries and models. Skipped unless the
//! environment (or a `.env` in the crate root) points at them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use aiplug::config::{
    CHAT_BIN_PATH, EMBEDDING_BIN_PATH, LOCAL_AI_CHAT_MODEL_NAME, LOCAL_AI_EMBEDDING_MODEL_NAME,
    LOCAL_AI_MODEL_DIR,
};
use aiplug::llm::{ChatPluginConfig, EmbeddingPluginConfig, LocalChatLLM, LocalEmbedding};
use aiplug::PluginManager;

fn var(key: &str) -> Option<String> {
    let _ = dotenvy::dotenv();
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn model(name_key: &str) -> Option<PathBuf> {
    Some(PathBuf::from(var(LOCAL_AI_MODEL_DIR)?).join(var(name_key)?))
}

#[tokio::test]
async fn ci_chat_with_real_plugin() {
    let (Some(bin), Some(model)) = (var(CHAT_BIN_PATH), model(LOCAL_AI_CHAT_MODEL_NAME)) else {
        eprintln!("{} is not set, skipping", CHAT_BIN_PATH);
        return;
    };
    let llm = LocalChatLLM::new(Arc::new(PluginManager::new()));
    llm.init_chat_plugin(ChatPluginConfig::new(PathBuf::from(bin), model).unwrap())
        .await
        .unwrap();

    llm.create_chat("ci").await.unwrap();
    let answer = llm.ask_question("ci", "What is the capital of France?").await.unwrap();
    assert!(!answer.is_empty());
    llm.close_chat("ci").await.unwrap();
    llm.destroy_chat_plugin().await;
}

#[tokio::test]
async fn ci_embedding_with_real_plugin() {
    let (Some(bin), Some(model)) = (var(EMBEDDING_BIN_PATH), model(LOCAL_AI_EMBEDDING_MODEL_NAME))
    else {
        eprintln!("{} is not set, skipping", EMBEDDING_BIN_PATH);
        return;
    };
    let store = tempfile::tempdir().unwrap();
    let config =
        EmbeddingPluginConfig::new(PathBuf::from(bin), model, Some(store.path().to_path_buf()))
            .unwrap();
    let embedding = LocalEmbedding::new(Arc::new(PluginManager::new()));
    embedding.init_embedding_plugin(config).await.unwrap();

    let vectors = embedding.generate_embedding("hello world").await.unwrap();
    assert!(!vectors.is_empty() && !vectors[0].is_empty());

    embedding
        .index("the quick brown fox", HashMap::new())
        .await
        .unwrap();
    let found = embedding
        .similarity_search("fox", HashMap::new())
        .await
        .unwrap();
    assert!(!found.is_empty());
    embedding.destroy_embedding_plugin().await;
}
