//! JSON wire format for portable trees.
//!
//! Nodes are internally tagged with `kind`, member descriptors with
//! `memberType` and member bindings with `bindingType`. Absent values are
//! omitted when writing and tolerated when reading.

use thiserror::Error;

use crate::node::PortableNode;

/// Output settings for [`to_json`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WireOptions {
    /// Indent the output.
    pub pretty: bool,
}

impl WireOptions {
    pub fn pretty() -> Self {
        WireOptions { pretty: true }
    }
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("could not write portable tree: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("malformed portable tree at line {line}, column {column}: {source}")]
    Decode {
        line: usize,
        column: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub fn to_json(node: &PortableNode, options: WireOptions) -> Result<String, WireError> {
    let text = if options.pretty {
        serde_json::to_string_pretty(node)
    } else {
        serde_json::to_string(node)
    };
    text.map_err(WireError::Encode)
}

pub fn from_json(text: &str) -> Result<PortableNode, WireError> {
    serde_json::from_str(text).map_err(|source| WireError::Decode {
        line: source.line(),
        column: source.column(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ConstantNode, TypeReference};

    #[test]
    fn compact_and_pretty_differ_only_in_layout() {
        let node = PortableNode::Constant(ConstantNode {
            ty: Some(TypeReference::new("System.String, System.Private.CoreLib")),
            value: Some("hi".into()),
        });
        let compact = to_json(&node, WireOptions::default()).unwrap();
        let pretty = to_json(&node, WireOptions::pretty()).unwrap();
        assert!(!compact.contains('\n'));
        assert!(pretty.contains('\n'));
        assert_eq!(from_json(&compact).unwrap(), from_json(&pretty).unwrap());
    }

    #[test]
    fn unknown_kind_reports_position() {
        let err = from_json("{\n  \"kind\": \"Teleport\"\n}").unwrap_err();
        match err {
            WireError::Decode { line, .. } => assert!(line >= 1),
            other => panic!("expected a decode error, got {:?}", other),
        }
    }
}
