//! Batch response assembly
//!
//! Maps a [`BatchResult`] to a transport-agnostic [`BatchResponse`]: an
//! envelope status plus one entry per reported operation.
//!
//! | Result | Envelope | Entries |
//! |---|---|---|
//! | change-set succeeded | 202 | 201 (created, echoed) / 204 per operation |
//! | retrieve succeeded | 200 | 200 with the entity |
//! | structural rejection | code status (400, 404 for a missing table) | one error entry |
//! | transactional rejection | 202 (200 for a retrieve) | one 404/409/412 error entry |
//! | fatal rejection | 503 / 500 | one error entry |

use serde_json::{json, Value as Json};

use tablestore_core::odata::entity_to_json;
use tablestore_core::{
    BatchResult, ETag, ErrorCode, ErrorTier, OperationOutcome, OutcomeStatus, Rejection,
};

/// What kind of batch produced the result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchShape {
    /// A change-set of mutations
    ChangeSet,
    /// A standalone retrieve
    Retrieve,
}

impl BatchShape {
    fn success_status(self) -> u16 {
        match self {
            BatchShape::ChangeSet => 202,
            BatchShape::Retrieve => 200,
        }
    }
}

/// Error details carried by a rejected batch's single entry
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorBody {
    /// Engine outcome code
    pub code: ErrorCode,
    /// Table service error code
    pub wire_code: &'static str,
    /// Human readable detail
    pub message: String,
}

/// One operation's slot in the response
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEntry {
    /// Operation position, when known
    pub index: Option<usize>,
    /// Per-operation HTTP status
    pub status: u16,
    /// Outcome of a successful operation
    pub outcome: Option<OutcomeStatus>,
    /// New ETag; absent for deletes and errors
    pub etag: Option<ETag>,
    /// Entity JSON for retrieves and echoed writes
    pub content: Option<Json>,
    /// Failure details
    pub error: Option<ErrorBody>,
}

impl ResponseEntry {
    fn from_outcome(outcome: &OperationOutcome, echo: bool) -> Self {
        let status = match outcome.status {
            OutcomeStatus::Created if echo => 201,
            OutcomeStatus::Retrieved => 200,
            _ => 204,
        };
        let show = echo || outcome.status == OutcomeStatus::Retrieved;
        ResponseEntry {
            index: Some(outcome.index),
            status,
            outcome: Some(outcome.status),
            etag: outcome.etag().cloned(),
            content: outcome.entity.as_ref().filter(|_| show).map(entity_to_json),
            error: None,
        }
    }

    fn from_rejection(rejection: &Rejection) -> Self {
        ResponseEntry {
            index: rejection.index,
            status: rejection.code.http_status(),
            outcome: None,
            etag: None,
            content: None,
            error: Some(ErrorBody {
                code: rejection.code,
                wire_code: rejection.code.wire_code(),
                message: rejection.message.clone(),
            }),
        }
    }

    fn to_json(&self) -> Json {
        let mut obj = json!({ "status": self.status });
        if let Some(index) = self.index {
            obj["index"] = json!(index);
        }
        if let Some(etag) = &self.etag {
            obj["etag"] = json!(etag.as_str());
        }
        if let Some(content) = &self.content {
            obj["content"] = content.clone();
        }
        if let Some(error) = &self.error {
            obj["error"] = json!({
                "code": error.wire_code,
                "kind": error.code.to_string(),
                "message": error.message,
            });
        }
        obj
    }
}

/// Assembled batch response
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResponse {
    /// Envelope HTTP status
    pub status: u16,
    /// Entries in operation order
    pub entries: Vec<ResponseEntry>,
}

impl BatchResponse {
    /// Whether every operation applied
    pub fn is_success(&self) -> bool {
        self.entries.iter().all(|e| e.error.is_none())
    }

    /// JSON rendering for transports and logs
    pub fn to_json(&self) -> Json {
        json!({
            "status": self.status,
            "entries": self.entries.iter().map(ResponseEntry::to_json).collect::<Vec<_>>(),
        })
    }
}

/// Builds [`BatchResponse`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseAssembler;

impl ResponseAssembler {
    /// Assemble a response
    ///
    /// `echo[i]` says whether operation `i` asked for its resulting entity;
    /// missing flags count as false.
    pub fn assemble(result: &BatchResult, shape: BatchShape, echo: &[bool]) -> BatchResponse {
        match result {
            BatchResult::AllSucceeded(outcomes) => BatchResponse {
                status: shape.success_status(),
                entries: outcomes
                    .iter()
                    .map(|o| {
                        let echoed = echo.get(o.index).copied().unwrap_or(false);
                        ResponseEntry::from_outcome(o, echoed)
                    })
                    .collect(),
            },
            BatchResult::Rejected(rejection) => Self::rejected(rejection, shape),
        }
    }

    /// Response for a rejected batch
    pub fn rejected(rejection: &Rejection, shape: BatchShape) -> BatchResponse {
        let status = match rejection.tier() {
            ErrorTier::Transactional => shape.success_status(),
            ErrorTier::Structural | ErrorTier::Fatal => rejection.code.http_status(),
        };
        BatchResponse {
            status,
            entries: vec![ResponseEntry::from_rejection(rejection)],
        }
    }
}
