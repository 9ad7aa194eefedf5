use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single compiler diagnostic, as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub line: u32,
    pub column: u32,
    pub code: String,
    pub message: String,
}

impl Diagnostic {
    pub fn new(line: u32, column: u32, code: &str, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} [{}] {}",
            self.line, self.column, self.code, self.message
        )
    }
}

/// Unified error type for Skein.
#[derive(Error, Debug)]
pub enum SkeinError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid ref: {0}")]
    InvalidRef(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Input type mismatch: {0}")]
    InputTypeMismatch(String),

    #[error("No source available: {0}")]
    NoSource(String),

    #[error("Compilation failed with {} error(s)", .0.len())]
    CompileError(Vec<Diagnostic>),

    #[error("Input missing: {0}")]
    InputMissing(String),

    #[error("Engine error: {0}")]
    EngineError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl SkeinError {
    /// Stable machine-readable error kind, exposed on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            SkeinError::NotFound(_) => "not_found",
            SkeinError::Conflict(_) => "conflict",
            SkeinError::InvalidRef(_) => "invalid_ref",
            SkeinError::InvalidInput(_) => "invalid_input",
            SkeinError::InputTypeMismatch(_) => "input_type_mismatch",
            SkeinError::NoSource(_) => "no_source",
            SkeinError::CompileError(_) => "compile_error",
            SkeinError::InputMissing(_) => "input_missing",
            SkeinError::EngineError(_) => "engine_error",
            SkeinError::PersistenceError(_) => "persistence_error",
            SkeinError::Io(_) => "io_error",
            SkeinError::Serde(_) => "serde_error",
        }
    }

    /// Map to HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            SkeinError::NotFound(_) => 404,
            SkeinError::Conflict(_) => 409,
            SkeinError::InvalidRef(_)
            | SkeinError::InvalidInput(_)
            | SkeinError::InputTypeMismatch(_)
            | SkeinError::NoSource(_)
            | SkeinError::CompileError(_)
            | SkeinError::InputMissing(_) => 400,
            _ => 500,
        }
    }

    /// Compiler diagnostics carried by this error, if any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            SkeinError::CompileError(diags) => diags,
            _ => &[],
        }
    }
}
