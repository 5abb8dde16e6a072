use serde::{Deserialize, Serialize};

/// Closed set of machine-readable error codes surfaced by the tool layer
/// and the nodes. Interpreters see these verbatim in corrective hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnknownRef,
    ValidationError,
    FkViolation,
    ConstraintViolation,
    NotFound,
    StoreUnavailable,
    CapReached,
    InterpreterTimeout,
    StepDeadline,
    AmbiguousMutation,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownRef => "UNKNOWN_REF",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::FkViolation => "FK_VIOLATION",
            Self::ConstraintViolation => "CONSTRAINT_VIOLATION",
            Self::NotFound => "NOT_FOUND",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::CapReached => "CAP_REACHED",
            Self::InterpreterTimeout => "INTERPRETER_TIMEOUT",
            Self::StepDeadline => "STEP_DEADLINE",
            Self::AmbiguousMutation => "AMBIGUOUS_MUTATION",
        }
    }

    /// Transient codes may be retried without changing inputs.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::StoreUnavailable)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared error type used across all Alfred crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{code}: {message}")]
    Tagged { code: ErrorCode, message: String },

    #[error("interpreter: {0}")]
    Interpreter(String),

    #[error("config: {0}")]
    Config(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn tagged(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Tagged {
            code,
            message: message.into(),
        }
    }

    pub fn unknown_ref(reference: &str) -> Self {
        Self::tagged(ErrorCode::UnknownRef, format!("unknown ref: {reference}"))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::tagged(ErrorCode::ValidationError, message)
    }

    /// The machine-readable code, when this error carries one.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Tagged { code, .. } => Some(*code),
            Self::Timeout(_) => Some(ErrorCode::InterpreterTimeout),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
