use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::error::{ReadError, RemoteError};

/// A single line read from the plugin, known to be a json object.
#[derive(Debug, Clone)]
pub struct RpcObject(pub JsonValue);

/// A message the plugin sent on its own initiative.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Request {
        id: u64,
        method: String,
        params: JsonValue,
    },
    Notification {
        method: String,
        params: JsonValue,
    },
}

/// A message answering one of the host's requests.
#[derive(Debug, Clone)]
pub enum Response {
    Result(JsonValue),
    Error(RemoteError),
    StreamData(JsonValue),
    StreamEnd(Option<JsonValue>),
}

impl RpcObject {
    pub fn parse(line: &str) -> Result<Self, ReadError> {
        let value: JsonValue = serde_json::from_str(line)?;
        if !value.is_object() {
            return Err(ReadError::NotObject(line.to_string()));
        }
        Ok(RpcObject(value))
    }

    pub fn get_id(&self) -> Option<u64> {
        self.0.get("id").and_then(JsonValue::as_u64)
    }

    pub fn get_method(&self) -> Option<&str> {
        self.0.get("method").and_then(JsonValue::as_str)
    }

    pub fn is_response(&self) -> bool {
        self.get_id().is_some() && self.get_method().is_none()
    }

    pub fn into_response(mut self) -> Result<Response, String> {
        if self.get_id().is_none() {
            return Err("response requires an 'id' field".to_string());
        }
        let object = self
            .0
            .as_object_mut()
            .ok_or_else(|| "response is not an object".to_string())?;

        if let Some(err) = object.remove("error") {
            let err = RemoteError::deserialize(err).map_err(|e| e.to_string())?;
            return Ok(Response::Error(err));
        }

        let result = object.remove("result");
        match object.get("stream").and_then(JsonValue::as_str) {
            Some("data") => Ok(Response::StreamData(result.unwrap_or(JsonValue::Null))),
            Some("end") => Ok(Response::StreamEnd(result.filter(|v| !v.is_null()))),
            Some(other) => Err(format!("unknown stream marker <{}>", other)),
            None => result
                .map(Response::Result)
                .ok_or_else(|| "response requires 'result' or 'error'".to_string()),
        }
    }

    pub fn into_call(self) -> Result<Call, ReadError> {
        let id = self.get_id();
        let method = self
            .get_method()
            .map(String::from)
            .ok_or_else(|| ReadError::NotObject(self.0.to_string()))?;
        let params = self.0.get("params").cloned().unwrap_or(JsonValue::Null);
        Ok(match id {
            Some(id) => Call::Request { id, method, params },
            None => Call::Notification { method, params },
        })
    }
}

pub fn request(id: u64, method: &str, params: &JsonValue) -> JsonValue {
    json!({ "id": id, "method": method, "params": params })
}

pub fn notification(method: &str, params: &JsonValue) -> JsonValue {
    json!({ "method": method, "params": params })
}

pub fn response(id: u64, result: Result<JsonValue, RemoteError>) -> JsonValue {
    match result {
        Ok(result) => json!({ "id": id, "result": result }),
        Err(err) => json!({ "id": id, "error": err }),
    }
}

pub fn stream_data(id: u64, chunk: &JsonValue) -> JsonValue {
    json!({ "id": id, "result": chunk, "stream": "data" })
}

pub fn stream_end(id: u64) -> JsonValue {
    json!({ "id": id, "stream": "end" })
}
