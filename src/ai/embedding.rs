use std::collections::HashMap;
use std::sync::Weak;

use serde_json::{json, Value as JsonValue};

use super::{handle_params, upgrade, HANDLE_METHOD};
use crate::error::{PluginError, RemoteError};
use crate::plugin::Plugin;
use crate::rpc::{DefaultResponseParser, ResponseParser};

/// Operations served by the embedding plugin.
pub struct EmbeddingPluginOperation {
    plugin: Weak<Plugin>,
}

impl EmbeddingPluginOperation {
    pub fn new(plugin: Weak<Plugin>) -> Self {
        EmbeddingPluginOperation { plugin }
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

    pub async fn embed_documents(&self, text: &str) -> Result<Vec<Vec<f64>>, PluginError> {
        self.send_request::<EmbeddingResponseParser>(
            "embed_documents",
            json!({ "params": { "input": text } }),
        )
        .await
    }

    pub async fn index_document(
        &self,
        text: &str,
        metadata: HashMap<String, JsonValue>,
    ) -> Result<(), PluginError> {
        self.send_request::<DefaultResponseParser>(
            "index_document",
            json!({ "params": { "input": text, "metadata": metadata } }),
        )
        .await
    }

    pub async fn similarity_search(
        &self,
        query: &str,
        filter: HashMap<String, JsonValue>,
    ) -> Result<Vec<String>, PluginError> {
        self.send_request::<SimilaritySearchResponseParser>(
            "similarity_search",
            json!({ "params": { "query": query, "filter": filter } }),
        )
        .await
    }
}

/// `{"data": ["doc", ...]}`; any non-string entry rejects the whole response.
pub struct SimilaritySearchResponseParser;

impl ResponseParser for SimilaritySearchResponseParser {
    type ValueType = Vec<String>;

    fn parse_json(json: JsonValue) -> Result<Self::ValueType, RemoteError> {
        let parsed = json.get("data").and_then(|data| data.as_array()).and_then(|items| {
            items
                .iter()
                .map(|item| item.as_str().map(String::from))
                .collect::<Option<Vec<_>>>()
        });
        parsed.ok_or(RemoteError::ParseResponse(json))
    }
}

/// `{"data": [[f64, ...], ...]}`
pub struct EmbeddingResponseParser;

impl ResponseParser for EmbeddingResponseParser {
    type ValueType = Vec<Vec<f64>>;

    fn parse_json(json: JsonValue) -> Result<Self::ValueType, RemoteError> {
        let parsed = json.get("data").and_then(|data| data.as_array()).and_then(|rows| {
            rows.iter()
                .map(|row| {
                    row.as_array()?
                        .iter()
                        .map(|num| num.as_f64())
                        .collect::<Option<Vec<f64>>>()
                })
                .collect::<Option<Vec<_>>>()
        });
        parsed.ok_or(RemoteError::ParseResponse(json))
    }
}
