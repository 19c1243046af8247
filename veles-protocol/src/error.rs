//! Protocol-level error types

use crate::asset::Symbol;
use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol errors
///
/// These are deterministic functions of the inputs; none are transient.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Asset arithmetic on mismatched currencies
    #[error("Symbol mismatch: expected {expected}, got {actual}")]
    SymbolMismatch {
        /// Symbol of the left operand
        expected: Symbol,
        /// Symbol of the right operand
        actual: Symbol,
    },

    /// Wide-arithmetic guard tripped
    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    /// Static operation validation failed
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}
