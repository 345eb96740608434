//! Portable node model for exprtree.
//!
//! A [`PortableNode`] tree is the persistable twin of a live expression
//! graph: types travel as [`TypeReference`] strings, members as
//! [`MemberDescriptor`]s, parameters as [`ParameterDescriptor`]s carrying
//! scope depth and position. [`wire`] reads and writes the JSON form.

pub mod node;
pub mod wire;

pub use node::{
    BinaryNode, BlockNode, CatchBlockRecord, ConditionalNode, ConstantNode, ConstructorDescriptor,
    DebugInfoNode, DefaultNode, DynamicNode, ElementInitRecord, FieldDescriptor, GotoNode,
    IndexNode, InvokeNode, LabelNode, LabelRecord, LambdaNode, ListInitNode, LoopNode,
    MemberAccessNode, MemberBindingRecord, MemberDescriptor, MemberHeader, MemberInitNode,
    MethodCallNode, MethodDescriptor, NewArrayNode, NewNode, ParameterDescriptor, PortableNode,
    PropertyDescriptor, RuntimeVariablesNode, SwitchCaseRecord, SwitchNode, SymbolDocumentRecord,
    TryNode, TypeBinaryNode, TypeReference, UnaryNode,
};
pub use wire::{from_json, to_json, WireError, WireOptions};
