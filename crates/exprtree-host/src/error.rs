//! Error types for graph construction, reflection and evaluation.

use crate::value::Value;

/// A graph node or member handle could not be constructed from its inputs.
///
/// Factories validate their arguments the way a well-formed tree requires
/// (instance vs static access, argument counts, operator codes). Any violation
/// is reported here rather than producing a malformed node.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("invalid {node} expression: {reason}")]
    InvalidExpression { node: &'static str, reason: String },

    #[error("`{method}` expects {expected} generic argument(s), found {found}")]
    GenericArity {
        method: String,
        expected: usize,
        found: usize,
    },

    #[error("`{method}` is not a generic method definition")]
    NotGenericMethodDefinition { method: String },
}

impl HostError {
    pub(crate) fn invalid(node: &'static str, reason: impl Into<String>) -> Self {
        HostError::InvalidExpression { node, reason: reason.into() }
    }
}

/// A failure while evaluating a graph.
#[derive(Clone, Debug, thiserror::Error)]
pub enum EvalError {
    /// A parameter occurrence has no binding in any enclosing scope. Seen when
    /// a use site is not the same instance as its declaration.
    #[error("parameter `{name}` is not bound in the current scope")]
    UnboundParameter { name: String },

    #[error("null reference while evaluating {context}")]
    NullReference { context: String },

    #[error("{operation}: expected {expected}, found {found}")]
    TypeMismatch {
        operation: String,
        expected: String,
        found: String,
    },

    #[error("attempted to divide by zero")]
    DivideByZero,

    #[error("arithmetic operation resulted in an overflow")]
    Overflow,

    #[error("index {index} is out of range for length {length}")]
    IndexOutOfRange { index: i64, length: usize },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("unsupported during evaluation: {0}")]
    Unsupported(String),

    #[error("no label `{label}` is reachable from this jump")]
    UnmatchedJump { label: String },

    #[error("unhandled exception: {message}")]
    Unhandled { message: String, exception: Value },
}

impl EvalError {
    pub(crate) fn mismatch(operation: &str, expected: &str, found: &Value) -> Self {
        EvalError::TypeMismatch {
            operation: operation.to_string(),
            expected: expected.to_string(),
            found: found.describe(),
        }
    }
}
