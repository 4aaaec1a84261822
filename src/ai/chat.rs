use std::collections::HashMap;
use std::sync::Weak;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc;

use super::{handle_params, upgrade, HANDLE_METHOD};
use crate::error::{PluginError, RemoteError};
use crate::plugin::Plugin;
use crate::rpc::{DefaultResponseParser, ResponseParser};

pub type ChatStream = mpsc::UnboundedReceiver<Result<String, PluginError>>;

/// Chat and database operations served by the chat plugin.
pub struct AIPluginOperation {
    plugin: Weak<Plugin>,
}

impl AIPluginOperation {
    pub fn new(plugin: Weak<Plugin>) -> Self {
        AIPluginOperation { plugin }
    }

    async fn send_request<P: ResponseParser>(
        &self,
        operation: &str,
        fields: JsonValue,
    ) -> Result<P::ValueType, PluginError> {
        let plugin = upgrade(&self.plugin)?;
        let params = handle_params(operation, fields)?;
        plugin.async_request::<P>(HANDLE_METHOD, &params).await
    }

    fn stream_request(&self, operation: &str, fields: JsonValue) -> Result<ChatStream, PluginError> {
        let plugin = upgrade(&self.plugin)?;
        let params = handle_params(operation, fields)?;
        plugin.stream_request::<ChatStreamResponseParser>(HANDLE_METHOD, &params)
    }

    pub async fn create_chat(&self, chat_id: &str, rag_enabled: bool) -> Result<(), PluginError> {
        self.send_request::<DefaultResponseParser>(
            "create_chat",
            json!({ "chat_id": chat_id, "rag_enabled": rag_enabled }),
        )
        .await
    }

    pub async fn close_chat(&self, chat_id: &str) -> Result<(), PluginError> {
        self.send_request::<DefaultResponseParser>("close_chat", json!({ "chat_id": chat_id }))
            .await
    }

    pub async fn send_message(
        &self,
        chat_id: &str,
        message: &str,
        rag_enabled: bool,
    ) -> Result<String, PluginError> {
        self.send_request::<ChatResponseParser>(
            "answer",
            json!({
                "chat_id": chat_id,
                "params": { "content": message, "rag_enabled": rag_enabled }
            }),
        )
        .await
    }

    pub fn stream_message(
        &self,
        chat_id: &str,
        message: &str,
        metadata: JsonValue,
    ) -> Result<ChatStream, PluginError> {
        debug!("[Chat Plugin] stream message in chat <{}>", chat_id);
        self.stream_request(
            "stream_answer",
            json!({
                "chat_id": chat_id,
                "params": { "content": message, "metadata": metadata }
            }),
        )
    }

    pub async fn get_related_questions(&self, chat_id: &str) -> Result<Vec<String>, PluginError> {
        self.send_request::<ChatRelatedQuestionsResponseParser>(
            "related_question",
            json!({ "chat_id": chat_id }),
        )
        .await
    }

    pub async fn index_file(&self, chat_id: &str, file_path: &str) -> Result<(), PluginError> {
        let params = json!({ "file_path": file_path, "metadatas": [{ "chat_id": chat_id }] });
        self.send_request::<DefaultResponseParser>(
            "index_file",
            json!({ "chat_id": chat_id, "params": params }),
        )
        .await
    }

    pub fn complete_text<T: Into<CompleteTextType>>(
        &self,
        text: &str,
        complete_type: T,
    ) -> Result<ChatStream, PluginError> {
        let complete_type = complete_type.into();
        debug!("[Chat Plugin] complete text as <{:?}>", complete_type);
        self.stream_request(
            "complete_text",
            json!({ "params": { "text": text, "type": complete_type as u8 } }),
        )
    }

    pub async fn summary_row(&self, row: HashMap<String, String>) -> Result<String, PluginError> {
        self.send_request::<DatabaseSummaryResponseParser>(
            "database_summary",
            json!({ "params": row }),
        )
        .await
    }

    pub async fn translate_row(
        &self,
        data: LocalAITranslateRowData,
    ) -> Result<LocalAITranslateRowResponse, PluginError> {
        self.send_request::<DatabaseTranslateResponseParser>(
            "database_translate",
            json!({ "params": data }),
        )
        .await
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LocalAITranslateRowData {
    pub cells: Vec<LocalAITranslateItem>,
    pub language: String,
    pub include_header: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct LocalAITranslateItem {
    pub title: String,
    pub content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalAITranslateRowResponse {
    pub items: Vec<HashMap<String, String>>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum CompleteTextType {
    ImproveWriting = 1,
    SpellingAndGrammar = 2,
    MakeShorter = 3,
    MakeLonger = 4,
    AskAI = 5,
}

impl From<u8> for CompleteTextType {
    fn from(value: u8) -> Self {
        match value {
            2 => CompleteTextType::SpellingAndGrammar,
            3 => CompleteTextType::MakeShorter,
            4 => CompleteTextType::MakeLonger,
            5 => CompleteTextType::AskAI,
            _ => CompleteTextType::ImproveWriting,
        }
    }
}

fn data_str(json: JsonValue) -> Result<String, RemoteError> {
    match json.get("data").and_then(|data| data.as_str()) {
        Some(data) => Ok(data.to_string()),
        None => Err(RemoteError::ParseResponse(json)),
    }
}

/// `{"data": "<answer>"}`
pub struct ChatResponseParser;

impl ResponseParser for ChatResponseParser {
    type ValueType = String;

    fn parse_json(json: JsonValue) -> Result<Self::ValueType, RemoteError> {
        data_str(json)
    }
}

/// Each streamed chunk is a bare string.
pub struct ChatStreamResponseParser;

impl ResponseParser for ChatStreamResponseParser {
    type ValueType = String;

    fn parse_json(json: JsonValue) -> Result<Self::ValueType, RemoteError> {
        match json.as_str() {
            Some(chunk) => Ok(chunk.to_string()),
            None => Err(RemoteError::ParseResponse(json)),
        }
    }
}

pub struct ChatRelatedQuestionsResponseParser;

impl ResponseParser for ChatRelatedQuestionsResponseParser {
    type ValueType = Vec<String>;

    fn parse_json(json: JsonValue) -> Result<Self::ValueType, RemoteError> {
        let Some(items) = json.get("data").and_then(|data| data.as_array()) else {
            return Err(RemoteError::ParseResponse(json));
        };
        Ok(items
            .iter()
            .filter_map(|item| item.get("content").and_then(|c| c.as_str()))
            .map(String::from)
            .collect())
    }
}

pub struct DatabaseSummaryResponseParser;

impl ResponseParser for DatabaseSummaryResponseParser {
    type ValueType = String;

    fn parse_json(json: JsonValue) -> Result<Self::ValueType, RemoteError> {
        data_str(json)
    }
}

pub struct DatabaseTranslateResponseParser;

impl ResponseParser for DatabaseTranslateResponseParser {
    type ValueType = LocalAITranslateRowResponse;

    fn parse_json(json: JsonValue) -> Result<Self::ValueType, RemoteError> {
        match json
            .get("data")
            .and_then(|data| LocalAITranslateRowResponse::deserialize(data).ok())
        {
            Some(response) => Ok(response),
            None => Err(RemoteError::ParseResponse(json)),
        }
    }
}
