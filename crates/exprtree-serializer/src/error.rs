//! Conversion errors.
//!
//! Any failure aborts the whole conversion: there are no partial results and
//! no fallback member on ambiguity.

use exprtree_host::{HostError, MemberKind};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SerializeError {
    #[error("unsupported node kind `{kind}`")]
    UnsupportedNodeKind { kind: String },

    #[error("cannot resolve type `{reference}`: {reason}")]
    TypeNotFound { reference: String, reason: String },

    #[error("{member_kind} `{name}` not found on `{reflected_type}`")]
    MemberNotFound {
        member_kind: MemberKind,
        name: String,
        reflected_type: String,
    },

    /// Zero or several candidates matched a method or constructor
    /// descriptor. The two outcomes are not told apart.
    #[error("{member_kind} `{name}` on `{reflected_type}` is ambiguous or missing ({candidates} candidate(s) matched)")]
    AmbiguousOrNotFoundMember {
        member_kind: MemberKind,
        name: String,
        reflected_type: String,
        candidates: usize,
    },

    #[error("invalid {node} node: {reason}")]
    InvalidNode { node: String, reason: String },

    #[error("constant of type `{ty}` has no portable literal form")]
    UnsupportedConstant { ty: String },

    #[error("cannot convert {value} to `{ty}`")]
    ConstantConversion { value: String, ty: String },
}

impl SerializeError {
    pub(crate) fn invalid(node: impl Into<String>, reason: impl Into<String>) -> Self {
        SerializeError::InvalidNode { node: node.into(), reason: reason.into() }
    }
}

impl From<HostError> for SerializeError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::InvalidExpression { node, reason } => SerializeError::invalid(node, reason),
            other => SerializeError::invalid("method", other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SerializeError>;
