//! Error types for the aquasolve equilibrium solver.
//!
//! This module provides a unified error type [`AquasolveError`] that covers
//! all error conditions that can occur during input parsing, system assembly,
//! and iteration.
//!
//! Configuration-time errors (lexer, parser, system assembly) are fatal for
//! the calculator being built and surface to the caller. Numeric faults during
//! iteration are caught inside the Newton loop and folded into a failed
//! calculation; they never escape `Calculator::calculate`.

use thiserror::Error;

/// Result type alias using [`AquasolveError`].
pub type Result<T> = std::result::Result<T, AquasolveError>;

/// Unified error type for all aquasolve operations.
#[derive(Error, Debug)]
pub enum AquasolveError {
    // ============ Input Parsing Errors ============
    /// Error during lexical analysis
    #[error("Lexer error at line {line}, column {column}: {message}")]
    LexerError {
        line: usize,
        column: usize,
        message: String,
    },

    /// Error during parsing
    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Reference to a name that has not been declared
    #[error("Unknown identifier '{name}' at line {line}")]
    UnknownIdentifier { name: String, line: usize },

    /// Unknown function name in an expression
    #[error("Unknown function '{name}' at line {line}")]
    UnknownFunction { name: String, line: usize },

    /// Wrong number of arguments to a function
    #[error("Function '{name}' expects {expected} argument(s), got {got} at line {line}")]
    WrongArity {
        name: String,
        expected: usize,
        got: usize,
        line: usize,
    },

    // ============ System Assembly Errors ============
    /// Malformed declaration (duplicate unknown/equation pair, bad synonym, ...)
    #[error("Read error: {message}")]
    ReadError { message: String },

    // ============ Iteration Errors ============
    /// NaN or infinity in a residual, Jacobian column, or solve direction.
    /// Caught inside the Newton loop and folded into non-convergence.
    #[error("Numeric fault during iteration: {message}")]
    NumericFault { message: String },

    // ============ I/O Errors ============
    /// Error reading an input file
    #[error("Failed to read input file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error writing an output file
    #[error("Failed to write output file '{path}': {source}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AquasolveError {
    /// Create a lexer error
    pub fn lexer(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::LexerError {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::ParseError {
            line,
            message: message.into(),
        }
    }

    /// Create a read error
    pub fn read(message: impl Into<String>) -> Self {
        Self::ReadError {
            message: message.into(),
        }
    }

    /// Create a numeric fault
    pub fn numeric(message: impl Into<String>) -> Self {
        Self::NumericFault {
            message: message.into(),
        }
    }
}
