//! Unified error handling
//!
//! Every failure surfaces as a specific [`AuthGateError`] kind so callers can
//! distinguish, say, a duplicate login from a transient version conflict.
//! Store-layer errors propagate unchanged; workflow operations only attach
//! context, they never replace the kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type AuthGateResult<T> = Result<T, AuthGateError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when the error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where the error originated
    pub component: String,
    /// Operation being performed when the error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the authgate system
#[derive(Error, Debug)]
pub enum AuthGateError {
    #[error("Duplicate {entity}: {message}")]
    DuplicateEntity {
        entity: String,
        message: String,
        context: ErrorContext,
    },

    #[error("{entity} not found")]
    NotFound {
        entity: String,
        context: ErrorContext,
    },

    #[error("Version conflict on {entity}: expected {expected}, found {found}")]
    Conflict {
        entity: String,
        expected: u64,
        found: u64,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("User '{login}' already exists")]
    UserExists {
        login: String,
        context: ErrorContext,
    },

    #[error("User '{login}' is not active")]
    UserNotActive {
        login: String,
        context: ErrorContext,
    },

    #[error("User '{login}' has not confirmed the account")]
    UserNotConfirmed {
        login: String,
        context: ErrorContext,
    },

    #[error("Invalid access token")]
    TokenInvalid { context: ErrorContext },

    #[error("Sign-up error: {message}")]
    SignUp {
        message: String,
        context: ErrorContext,
    },

    #[error("Permission denied: {permission}")]
    PermissionDenied {
        permission: String,
        context: ErrorContext,
    },

    #[error("Authentication error: {message}")]
    Authentication {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl AuthGateError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            AuthGateError::DuplicateEntity { context, .. } => Some(context),
            AuthGateError::NotFound { context, .. } => Some(context),
            AuthGateError::Conflict { context, .. } => Some(context),
            AuthGateError::Timeout { context, .. } => Some(context),
            AuthGateError::UserExists { context, .. } => Some(context),
            AuthGateError::UserNotActive { context, .. } => Some(context),
            AuthGateError::UserNotConfirmed { context, .. } => Some(context),
            AuthGateError::TokenInvalid { context, .. } => Some(context),
            AuthGateError::SignUp { context, .. } => Some(context),
            AuthGateError::PermissionDenied { context, .. } => Some(context),
            AuthGateError::Authentication { context, .. } => Some(context),
            AuthGateError::Validation { context, .. } => Some(context),
            AuthGateError::Config { context, .. } => Some(context),
            AuthGateError::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Attach operation context to an error bubbling through a workflow.
    /// The kind is preserved; only the context gains the operation name.
    pub fn in_operation(mut self, operation: &str) -> Self {
        if let Some(context) = self.context_mut() {
            if context.operation.is_none() {
                context.operation = Some(operation.to_string());
            }
        }
        self
    }

    fn context_mut(&mut self) -> Option<&mut ErrorContext> {
        match self {
            AuthGateError::DuplicateEntity { context, .. } => Some(context),
            AuthGateError::NotFound { context, .. } => Some(context),
            AuthGateError::Conflict { context, .. } => Some(context),
            AuthGateError::Timeout { context, .. } => Some(context),
            AuthGateError::UserExists { context, .. } => Some(context),
            AuthGateError::UserNotActive { context, .. } => Some(context),
            AuthGateError::UserNotConfirmed { context, .. } => Some(context),
            AuthGateError::TokenInvalid { context, .. } => Some(context),
            AuthGateError::SignUp { context, .. } => Some(context),
            AuthGateError::PermissionDenied { context, .. } => Some(context),
            AuthGateError::Authentication { context, .. } => Some(context),
            AuthGateError::Validation { context, .. } => Some(context),
            AuthGateError::Config { context, .. } => Some(context),
            AuthGateError::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Check if the error is recoverable by retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AuthGateError::Conflict { .. } | AuthGateError::Timeout { .. }
        )
    }

    /// Log the error with an appropriate level
    pub fn log(&self) {
        match self {
            AuthGateError::Conflict { .. } | AuthGateError::Timeout { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Recoverable error occurred"
                );
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! not_found_error {
    ($entity:expr, $component:expr) => {
        $crate::error::AuthGateError::NotFound {
            entity: $entity.to_string(),
            context: $crate::error::ErrorContext::new($component)
                .with_suggestion("Verify the identifier"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::error::AuthGateError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::error::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_survives_operation_wrapping() {
        let err = AuthGateError::Conflict {
            entity: "user".to_string(),
            expected: 3,
            found: 4,
            context: ErrorContext::new("store"),
        };
        let err = err.in_operation("save_user");
        assert!(err.is_recoverable());
        assert_eq!(
            err.context().unwrap().operation.as_deref(),
            Some("save_user")
        );
    }

    #[test]
    fn wrapping_does_not_overwrite_existing_operation() {
        let err = AuthGateError::NotFound {
            entity: "role".to_string(),
            context: ErrorContext::new("store").with_operation("get_role"),
        };
        let err = err.in_operation("sign_up");
        assert_eq!(err.context().unwrap().operation.as_deref(), Some("get_role"));
    }
}
