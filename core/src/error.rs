use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Structured error response — designed for agents, not humans.
/// Every error contains enough information for a caller to understand
/// what went wrong and how to fix it.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "not_found")
    pub error: String,
    /// Human/agent-readable description of what went wrong
    pub message: String,
    /// Which field caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Request ID for tracing and debugging
    pub request_id: String,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

/// Error codes used across the API
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const CONFLICT: &str = "conflict";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Failure modes of the merge/undo engine.
///
/// Validation and NotFound map to 400/404 at the HTTP boundary; Store
/// covers everything the external registry can throw at us and maps to
/// an internal error.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("{message}")]
    Validation {
        message: String,
        field: Option<String>,
    },
    #[error("lead {id} not found or inactive")]
    NotFound { id: Uuid },
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
}

impl MergeError {
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        MergeError::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }
}
