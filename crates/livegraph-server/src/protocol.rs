//! Wire envelope.
//!
//! Frames are single-line JSON objects tagged by `type`:
//!
//! ```text
//! -> {"type": "request", "operation": "getKeyAt", "args": {"moduleId": "m", "path": [1, 0]}}
//! <- {"type": "response", "success": true, "value": "x"}
//! <- {"type": "response", "success": false, "error": "bad_path", "info": {"message": "..."}}
//! <- {"type": "persist", "descriptors": [{"operation": "delete", ...}]}
//! ```

use livegraph::descriptor::to_json;
use livegraph::Descriptor;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Inbound {
    Request {
        operation: String,
        #[serde(default)]
        args: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    Response {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        info: Option<Value>,
    },
    Persist {
        descriptors: Vec<Value>,
    },
}

impl Outbound {
    pub fn success(value: Value) -> Self {
        Outbound::Response {
            success: true,
            value: Some(value),
            error: None,
            info: None,
        }
    }

    pub fn failure(tag: &str, info: Value) -> Self {
        Outbound::Response {
            success: false,
            value: None,
            error: Some(tag.to_string()),
            info: Some(info),
        }
    }

    pub fn from_error(err: &SessionError) -> Self {
        Self::failure(err.tag(), err.info())
    }

    pub fn persist(descriptors: &[Descriptor]) -> Self {
        Outbound::Persist {
            descriptors: descriptors.iter().map(to_json).collect(),
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Outbound::Response { .. })
    }

    /// One wire line, without the trailing newline.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            json!({
                "type": "response",
                "success": false,
                "error": "generic",
                "info": {"message": e.to_string()}
            })
            .to_string()
        })
    }
}

/// Problems with a frame itself, before any handler runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    BadFrame(String),

    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Bad arguments for {operation}: {message}")]
    BadArgs { operation: String, message: String },
}

/// Anything a request can fail with.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Live(#[from] livegraph::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    pub fn tag(&self) -> &'static str {
        match self {
            SessionError::Live(e) => e.tag(),
            SessionError::Protocol(_) => "generic",
        }
    }

    pub fn info(&self) -> Value {
        match self {
            SessionError::Live(e) => e.info(),
            SessionError::Protocol(e) => json!({"message": e.to_string()}),
        }
    }
}

pub fn parse_frame(line: &str) -> Result<Inbound, ProtocolError> {
    serde_json::from_str(line).map_err(|e| ProtocolError::BadFrame(e.to_string()))
}
