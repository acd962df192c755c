use serde::{Deserialize, Serialize};

/// Public API error response format.
///
/// `error` is a stable upper-snake code (`REAUTHENTICATION_REQUIRED`,
/// `SAME_PASSWORD`, ...) that clients branch on; `message` is meant for display.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
