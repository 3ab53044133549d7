use serde::{Deserialize, Serialize};
use std::fmt;

pub const CYCLE_START: &str = "cycle-start";
pub const CYCLE_COMPLETE: &str = "cycle-complete";

/// An entry in the agent's operational history.
///
/// Activities are written at the start and end of every cycle and whenever an
/// error is worth surfacing to the index rather than only to the logs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub operation: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// === impl Activity ===

impl Activity {
    pub fn new(operation: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            resource: resource.into(),
            error: None,
        }
    }

    pub fn error(
        operation: impl Into<String>,
        resource: impl Into<String>,
        error: &dyn fmt::Display,
    ) -> Self {
        Self {
            operation: operation.into(),
            resource: resource.into(),
            error: Some(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
