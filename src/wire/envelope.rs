use std::error::Error as _;

use serde::Serialize;
use serde_json::Value;

use crate::error::GridError;

pub const GENERIC_ERROR_MESSAGE: &str = "Sorry, an error occurred while loading the data!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeType {
    Success,
    Error,
}

/// The JSON body of every non-download response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Self {
            kind: EnvelopeType::Success,
            data: Some(data),
            meta: None,
            error: None,
            trace: None,
            exception: None,
        }
    }

    pub fn meta_only(meta: Value) -> Self {
        Self {
            data: None,
            ..Self::success(Value::Null)
        }
        .with_meta(meta)
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Privileged callers see the message and its source chain. Everyone else gets a generic
    /// message and the error class, never SQL or engine detail.
    pub fn from_error(err: &GridError, privileged: bool) -> Self {
        let (error, trace) = if privileged {
            let mut trace = Vec::new();
            let mut source = err.source();
            while let Some(cause) = source {
                trace.push(cause.to_string());
                source = cause.source();
            }
            (err.to_string(), Some(trace))
        } else {
            (GENERIC_ERROR_MESSAGE.to_string(), None)
        };

        Self {
            kind: EnvelopeType::Error,
            data: None,
            meta: None,
            error: Some(error),
            trace,
            exception: Some(err.class_name()),
        }
    }
}
