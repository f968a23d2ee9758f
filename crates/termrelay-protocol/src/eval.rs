//! Evaluate-once request/response bodies (`POST /run-code`).

use serde::{Deserialize, Serialize};

/// Source to run once, with its complete standard input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRequest {
    pub code: String,
    #[serde(default)]
    pub stdin: String,
}

/// Captured result of a one-shot evaluation.
///
/// Exactly one of the fields is meaningful: `output` on success, `error`
/// (usually the interpreter traceback) on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalResponse {
    pub output: String,
    pub error: String,
}

impl EvalResponse {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            error: String::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}
