use std::io;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;

/// Errors surfaced to callers of the plugin host.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The plugin process went away before answering.
    #[error("plugin disconnected")]
    PeerDisconnect,

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("plugin not connected")]
    PluginNotConnected,

    #[error("{0}")]
    Unsupported(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// An error returned by the plugin, or a response the host could not make sense of.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("could not parse response: {0}")]
    ParseResponse(JsonValue),

    #[error("invalid request: {0:?}")]
    InvalidRequest(Option<JsonValue>),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("error {code}: {message}")]
    Custom {
        code: i64,
        message: String,
        data: Option<JsonValue>,
    },

    #[error("unknown error: {0}")]
    Unknown(JsonValue),
}

const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

impl RemoteError {
    pub fn custom(code: i64, message: impl Into<String>, data: Option<JsonValue>) -> Self {
        RemoteError::Custom {
            code,
            message: message.into(),
            data,
        }
    }

    fn code(&self) -> i64 {
        match self {
            RemoteError::InvalidRequest(_) => INVALID_REQUEST,
            RemoteError::MethodNotFound(_) => METHOD_NOT_FOUND,
            RemoteError::ParseResponse(_) => INVALID_PARAMS,
            RemoteError::Custom { code, .. } => *code,
            RemoteError::Unknown(_) => 0,
        }
    }
}

/// Errors that end the read loop of a plugin.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("message is not json: {0}")]
    NotJson(#[from] serde_json::Error),

    #[error("message is not a json-rpc object: {0}")]
    NotObject(String),

    #[error("unknown request: {0}")]
    UnknownRequest(serde_json::Error),

    #[error("peer disconnected")]
    Disconnect,
}

impl ReadError {
    /// Malformed messages are logged and skipped, only broken pipes end the loop.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ReadError::Io(_) | ReadError::Disconnect)
    }
}

#[derive(serde::Deserialize)]
struct ErrorObject {
    code: i64,
    message: String,
    data: Option<JsonValue>,
}

impl<'de> Deserialize<'de> for RemoteError {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = JsonValue::deserialize(deserializer)?;
        let object = match ErrorObject::deserialize(&value) {
            Ok(object) => object,
            Err(_) => return Ok(RemoteError::Unknown(value)),
        };
        Ok(match object.code {
            INVALID_REQUEST => RemoteError::InvalidRequest(object.data),
            METHOD_NOT_FOUND => RemoteError::MethodNotFound(object.message),
            _ => RemoteError::Custom {
                code: object.code,
                message: object.message,
                data: object.data,
            },
        })
    }
}

impl Serialize for RemoteError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let (message, data) = match self {
            RemoteError::ParseResponse(value) => ("Invalid params".to_string(), Some(value.clone())),
            RemoteError::InvalidRequest(data) => ("Invalid request".to_string(), data.clone()),
            RemoteError::MethodNotFound(method) => (format!("Method not found: {}", method), None),
            RemoteError::Custom { message, data, .. } => (message.clone(), data.clone()),
            RemoteError::Unknown(value) => ("Unknown error".to_string(), Some(value.clone())),
        };
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("code", &self.code())?;
        map.serialize_entry("message", &message)?;
        if let Some(data) = data {
            map.serialize_entry("data", &data)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deserialize_custom_error() {
        let err: RemoteError =
            serde_json::from_value(json!({"code": 42, "message": "model missing"})).unwrap();
        match err {
            RemoteError::Custom { code, message, data } => {
                assert_eq!(code, 42);
                assert_eq!(message, "model missing");
                assert!(data.is_none());
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn deserialize_method_not_found() {
        let err: RemoteError =
            serde_json::from_value(json!({"code": -32601, "message": "nope"})).unwrap();
        assert!(matches!(err, RemoteError::MethodNotFound(ref m) if m == "nope"));
    }

    #[test]
    fn deserialize_garbage_is_unknown() {
        let err: RemoteError = serde_json::from_value(json!("boom")).unwrap();
        assert!(matches!(err, RemoteError::Unknown(_)));
    }

    #[test]
    fn serialize_custom_error() {
        let err = RemoteError::custom(7, "bad", Some(json!({"x": 1})));
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"code": 7, "message": "bad", "data": {"x": 1}})
        );
    }

    #[test]
    fn read_error_recoverable() {
        assert!(ReadError::NotObject("x".to_string()).is_recoverable());
        assert!(!ReadError::Disconnect.is_recoverable());
    }
}
