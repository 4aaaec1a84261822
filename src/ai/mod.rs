//! Typed operations on top of a connected chat or embedding plugin.
//!
//! Every operation is a `handle` request whose params name the operation in
//! their `method` field.

pub mod chat;
pub mod embedding;

use std::sync::{Arc, Weak};

use anyhow::anyhow;
use serde_json::{Map, Value as JsonValue};

use crate::error::PluginError;
use crate::plugin::Plugin;

pub use chat::{
    AIPluginOperation, ChatRelatedQuestionsResponseParser, ChatResponseParser,
    ChatStreamResponseParser, CompleteTextType, DatabaseSummaryResponseParser,
    DatabaseTranslateResponseParser, LocalAITranslateItem, LocalAITranslateRowData,
    LocalAITranslateRowResponse,
};
pub use embedding::{
    EmbeddingPluginOperation, EmbeddingResponseParser, SimilaritySearchResponseParser,
};

pub(crate) const HANDLE_METHOD: &str = "handle";

fn upgrade(plugin: &Weak<Plugin>) -> Result<Arc<Plugin>, PluginError> {
    plugin
        .upgrade()
        .ok_or_else(|| PluginError::Internal(anyhow!("Plugin is dropped")))
}

/// Builds `{"method": operation, ..fields}`.
fn handle_params(operation: &str, fields: JsonValue) -> Result<JsonValue, PluginError> {
    let mut request = Map::new();
    request.insert("method".to_string(), JsonValue::from(operation));
    match fields {
        JsonValue::Object(fields) => request.extend(fields),
        JsonValue::Null => {}
        other => {
            return Err(PluginError::Internal(anyhow!(
                "params for <{}> must be an object, got <{}>",
                operation,
                other
            )))
        }
    }
    Ok(JsonValue::Object(request))
}
