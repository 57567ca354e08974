//! Object-level errors

use thiserror::Error;

use crate::meta::ValueKind;

/// Errors raised while resolving or invoking members of an object
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObjectError {
    /// No stage of the resolution chain serves the name
    #[error("'{member}' is not a member of '{class}'")]
    UnknownMember {
        /// Object type
        class: String,
        /// Requested member
        member: String,
    },

    /// Signal is not declared on the type or the behavior
    #[error("'{class}' declares no signal '{signal}'")]
    UnknownSignal {
        /// Object type
        class: String,
        /// Requested signal
        signal: String,
    },

    /// The exact (target, method) pair is already connected
    #[error("signal '{signal}' is already connected to '{method}' on that target")]
    DuplicateConnection {
        /// Signal name
        signal: String,
        /// Handler method
        method: String,
    },

    /// Strict disconnect of a connection that does not exist
    #[error("signal '{signal}' is not connected to '{method}' on that target")]
    NotConnected {
        /// Signal name
        signal: String,
        /// Handler method
        method: String,
    },

    /// Write to a read-only property
    #[error("property '{0}' is read-only")]
    ReadOnly(String),

    /// Value does not match the declared schema
    #[error("'{member}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Property, or `method(param)`
        member: String,
        /// Declared schema
        expected: ValueKind,
        /// Kind of the offending value
        found: ValueKind,
    },

    /// Wrong number of arguments for a method or signal
    #[error("'{class}.{member}' expects {expected} argument(s), got {found}")]
    ArgumentCount {
        /// Object type
        class: String,
        /// Method or signal
        member: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        found: usize,
    },

    /// Argument rejected by the member
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// User handler reported a failure
    #[error("handler failed: {0}")]
    Handler(String),
}
