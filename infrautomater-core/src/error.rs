//! Error classification shared by every task

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a failure is handled by the retry machinery
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Bad input or wrong request state; never retried
    Validation,
    /// Missing provisioning binary or similar; needs an operator
    Environment,
    /// Non-zero exit, timeout, or an unexpected failure; retried
    Transient,
    /// The request store rejected a write
    Persistence,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient | ErrorClass::Persistence)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::Validation => "validation",
            ErrorClass::Environment => "environment",
            ErrorClass::Transient => "transient",
            ErrorClass::Persistence => "persistence",
        };
        f.write_str(name)
    }
}
