//! Expression graph serializer.
//!
//! Converts live expression graphs into portable nodes that carry only
//! names and qualified type references, and rebuilds equivalent graphs from
//! them by resolving every type and member against a [`TypeSystem`].
//!
//! The serializer is stateless between calls: label and parameter identity
//! are tracked per conversion and nothing is cached across calls.
//!
//! # Architecture
//!
//! - [`types`]: Type describe/resolve with generic-argument reduction
//! - [`members`]: Member descriptors and overload selection
//! - [`constant`]: Constant literal coercion
//! - `encode`: Graph to portable nodes, scope-relative parameter slots, label ids
//! - `decode`: Portable nodes to graph, one label target per id
//! - `canonicalize`: Rebinding use-site parameters to their declarations
//! - [`error`]: Error type

mod canonicalize;
pub mod constant;
mod decode;
mod encode;
pub mod error;
pub mod members;
pub mod types;

use exprtree_host::{Expr, LambdaExpr, TypeSystem};
use exprtree_portable::PortableNode;
use tracing::debug;

use crate::decode::Decoder;
use crate::encode::Encoder;

pub use error::{Result, SerializeError};
pub use members::{
    describe_constructor, describe_field, describe_member, describe_method, describe_property,
    MemberResolver,
};
pub use types::{describe, TypeResolver};

/// Serializes graphs against one type system.
#[derive(Clone, Copy)]
pub struct ExpressionSerializer<'t> {
    types: &'t dyn TypeSystem,
}

impl<'t> ExpressionSerializer<'t> {
    pub fn new(types: &'t dyn TypeSystem) -> Self {
        ExpressionSerializer { types }
    }

    /// Convert a graph into its portable form.
    pub fn serialize(&self, expr: &Expr) -> Result<PortableNode> {
        let node = Encoder::new(self.types).encode(expr)?;
        debug!(kind = node.kind_name(), nodes = node.node_count(), "serialized expression");
        Ok(node)
    }

    pub fn serialize_lambda(&self, lambda: &LambdaExpr) -> Result<PortableNode> {
        self.serialize(&lambda.to_expr())
    }

    /// Rebuild a graph from its portable form. Every use site of a bound
    /// parameter in the result is the same instance as its declaration.
    pub fn deserialize(&self, node: &PortableNode) -> Result<Expr> {
        let expr = Decoder::new(self.types).decode(node)?;
        debug!(kind = node.kind_name(), nodes = node.node_count(), "deserialized expression");
        Ok(expr)
    }

    /// Rebuild a graph whose root must be a lambda.
    pub fn deserialize_lambda(&self, node: &PortableNode) -> Result<LambdaExpr> {
        let lambda = Decoder::new(self.types).decode_lambda(node)?;
        debug!(parameters = lambda.parameters().len(), "deserialized lambda");
        Ok(lambda)
    }

    pub fn type_resolver(&self) -> TypeResolver<'t> {
        TypeResolver::new(self.types)
    }

    pub fn member_resolver(&self) -> MemberResolver<'t> {
        MemberResolver::new(self.types)
    }
}
