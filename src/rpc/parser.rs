use serde_json::Value as JsonValue;

use crate::error::RemoteError;

/// Turns the raw `result` of a response into a typed value.
pub trait ResponseParser {
    type ValueType: Send + 'static;

    fn parse_json(json: JsonValue) -> Result<Self::ValueType, RemoteError>;
}

/// For requests whose answer carries no information.
pub struct DefaultResponseParser;

impl ResponseParser for DefaultResponseParser {
    type ValueType = ();

    fn parse_json(_json: JsonValue) -> Result<Self::ValueType, RemoteError> {
        Ok(())
    }
}

/// Hands back the result untouched.
pub struct JsonResponseParser;

impl ResponseParser for JsonResponseParser {
    type ValueType = JsonValue;

    fn parse_json(json: JsonValue) -> Result<Self::ValueType, RemoteError> {
        Ok(json)
    }
}
