//! Response body decoding.
//!
//! # Design
//! ML endpoints answer with either a JSON object or a JSON array and callers
//! do not always know which. `parse_json` makes the two attempts explicit,
//! object first and array second, and reports the outcome as a `Parsed`
//! value instead of using a failed parse for control flow.
//!
//! Every decoder takes the `HttpResponse` by value: the body is read once
//! and the response is gone afterwards.

use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::http::HttpResponse;

/// Outcome of the object-then-array parse.
#[derive(Debug)]
pub enum Parsed {
    Object(Map<String, Value>),
    Array(Vec<Value>),
    /// Holds the error from the array attempt, the last one made.
    ParseFailed(serde_json::Error),
}

pub fn parse_json(body: &str) -> Parsed {
    match serde_json::from_str::<Map<String, Value>>(body) {
        Ok(object) => Parsed::Object(object),
        Err(_) => match serde_json::from_str::<Vec<Value>>(body) {
            Ok(array) => Parsed::Array(array),
            Err(err) => Parsed::ParseFailed(err),
        },
    }
}

fn parse_body(response: HttpResponse) -> Result<Value, DecodeError> {
    if response.body.trim().is_empty() {
        return Err(DecodeError::EmptyBody);
    }
    match parse_json(&response.body) {
        Parsed::Object(object) => Ok(Value::Object(object)),
        Parsed::Array(array) => Ok(Value::Array(array)),
        Parsed::ParseFailed(err) => Err(DecodeError::Malformed(err)),
    }
}

/// The body re-serialized as compact JSON text.
pub fn response_as_string(response: HttpResponse) -> Result<String, DecodeError> {
    Ok(parse_body(response)?.to_string())
}

/// The body as a JSON value, either `Value::Object` or `Value::Array`.
pub fn response_as_json_object(response: HttpResponse) -> Result<Value, DecodeError> {
    parse_body(response)
}

/// Integer `field` of the body object, or of the first element when the body
/// is an array.
pub fn extract_integer_field(response: HttpResponse, field: &str) -> Result<i64, DecodeError> {
    let value = field_of(parse_body(response)?, field)?;
    value.as_i64().ok_or_else(|| DecodeError::WrongType {
        field: field.to_string(),
        expected: "an integer",
    })
}

/// String `field` of the body object, or of the first element when the body
/// is an array.
pub fn extract_string_field(response: HttpResponse, field: &str) -> Result<String, DecodeError> {
    match field_of(parse_body(response)?, field)? {
        Value::String(s) => Ok(s),
        _ => Err(DecodeError::WrongType {
            field: field.to_string(),
            expected: "a string",
        }),
    }
}

fn field_of(body: Value, field: &str) -> Result<Value, DecodeError> {
    let target = match body {
        Value::Array(items) => items.into_iter().next().ok_or(DecodeError::EmptyArray)?,
        other => other,
    };
    match target {
        Value::Object(mut object) => object
            .remove(field)
            .ok_or_else(|| DecodeError::MissingField(field.to_string())),
        _ => Err(DecodeError::WrongType {
            field: field.to_string(),
            expected: "inside an object",
        }),
    }
}
