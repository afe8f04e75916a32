// Copyright (C) 2025 Traceflow Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for traceflow-core.
//!
//! Store and engine failures are errors; business outcomes (invalid scan,
//! duplicate QR, step in use) are response codes, not errors.

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur while serving a command.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum CoreError {
    /// Work item was not found in the store.
    WorkItemNotFound {
        /// The serial that was not found.
        serial: String,
    },

    /// A process step referenced by a work item's sequence does not exist.
    StepNotFound {
        /// The step id that was not found.
        step_id: i32,
    },

    /// A concurrent scan advanced the work item first.
    Conflict {
        /// The work item whose history moved under us.
        serial: String,
    },

    /// The latest transition references a step outside the work item's
    /// sequence. Recognition cannot proceed on such a history.
    CorruptHistory {
        /// The work item serial.
        serial: String,
        /// The out-of-sequence step id.
        step_id: i32,
    },

    /// Input validation failed.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// A store call exceeded the configured deadline.
    Timeout {
        /// The operation that timed out.
        operation: String,
    },

    /// Database operation failed.
    DatabaseError {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::WorkItemNotFound { .. } => "WORK_ITEM_NOT_FOUND",
            Self::StepNotFound { .. } => "STEP_NOT_FOUND",
            Self::Conflict { .. } => "CONFLICT",
            Self::CorruptHistory { .. } => "CORRUPT_HISTORY",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::DatabaseError { .. } => "DATABASE_ERROR",
        }
    }

    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Timeout { .. })
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkItemNotFound { serial } => {
                write!(f, "Work item '{}' not found", serial)
            }
            Self::StepNotFound { step_id } => {
                write!(f, "Process step {} not found", step_id)
            }
            Self::Conflict { serial } => {
                write!(
                    f,
                    "Work item '{}' was advanced by a concurrent scan",
                    serial
                )
            }
            Self::CorruptHistory { serial, step_id } => {
                write!(
                    f,
                    "Transition history for '{}' references step {} outside its sequence",
                    serial, step_id
                )
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::Timeout { operation } => {
                write!(f, "Store operation '{}' timed out", operation)
            }
            Self::DatabaseError { operation, details } => {
                write!(f, "Database error during '{}': {}", operation, details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::DatabaseError {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::DatabaseError {
            operation: "json".to_string(),
            details: err.to_string(),
        }
    }
}
