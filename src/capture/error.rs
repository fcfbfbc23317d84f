//! Capture error types.

use thiserror::Error;

use crate::host::BodyError;

/// Errors raised while installing or running capture.
///
/// None of these reach application code: interception swallows them and
/// logs at debug.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The host lacks a primitive, so that capture path is skipped.
    #[error("{0} is not available in this context")]
    Unavailable(&'static str),

    /// A response body could not be decoded; response data is left absent.
    #[error("failed to decode response body: {0}")]
    ResponseParse(#[from] BodyError),
}

/// Errors from interactive expression evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    #[error("evaluation is disabled")]
    Disabled,

    #[error("SyntaxError: {0}")]
    Syntax(String),

    #[error("ReferenceError: {0} is not defined")]
    Reference(String),

    #[error("TypeError: {0}")]
    Type(String),
}
