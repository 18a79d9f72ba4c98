//! JSON messages exchanged between the `miniq` client and server.
//!
//! Every request is one JSON object tagged by `action`. Every reply carries
//! `"status": "OK"` with a `job_state`, or `"status": "ERROR"` with an error
//! kind and message.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::StatusReport;
use crate::error::MiniqError;
use crate::scheduler::JobId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Request {
    Submit {
        script: PathBuf,
        num_nodes: i64,
        minutes: i64,
        cwd: PathBuf,
    },
    Delete {
        id: JobId,
    },
    Status {
        #[serde(default)]
        id: Option<JobId>,
    },
}

impl Request {
    pub const ACTIONS: [&'static str; 3] = ["submit", "delete", "status"];

    /// Decode one request, telling an unknown action apart from bad JSON.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let action = value
            .get("action")
            .and_then(serde_json::Value::as_str)
            .ok_or(ProtocolError::MissingAction)?;
        if !Self::ACTIONS.contains(&action) {
            return Err(ProtocolError::UnsupportedAction(action.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Request has no action")]
    MissingAction,

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),
}

impl ProtocolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::Malformed(_) | ProtocolError::MissingAction => "malformed_request",
            ProtocolError::UnsupportedAction(_) => "unsupported_action",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Response {
    #[serde(rename = "OK")]
    Ok { job_state: StatusReport },
    #[serde(rename = "ERROR")]
    Error { error: String, message: String },
}

impl Response {
    pub fn ok(report: StatusReport) -> Self {
        Response::Ok { job_state: report }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }
}

impl From<&MiniqError> for Response {
    fn from(err: &MiniqError) -> Self {
        Response::Error {
            error: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<&ProtocolError> for Response {
    fn from(err: &ProtocolError) -> Self {
        Response::Error {
            error: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}
