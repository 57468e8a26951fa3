//! Common error types.

use thiserror::Error;

/// Top-level error type for the compositing engine.
#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Resource error: {0}")]
    Resource(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Draw error: {0}")]
    Draw(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Scene error: {0}")]
    Scene(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

pub type EditorResult<T> = Result<T, EditorError>;

impl EditorError {
    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn draw(msg: impl Into<String>) -> Self {
        Self::Draw(msg.into())
    }

    pub fn export(msg: impl Into<String>) -> Self {
        Self::Export(msg.into())
    }

    pub fn scene(msg: impl Into<String>) -> Self {
        Self::Scene(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }
}
