//! Portable node model.
//!
//! Every type here is plain value data: it names types and members instead
//! of holding runtime handles, so a tree can be written out, read back in a
//! different process and resolved there. Field names follow the JSON wire
//! format (lower camel case, absent optionals omitted).

use std::fmt;

use exprtree_host::{GotoKind, NodeType};
use serde::{Deserialize, Serialize};

// ── Type references ────────────────────────────────────────────────────

/// A textual type name: full name plus defining module, with generic
/// arguments embedded in the same reduced form.
///
/// Never validated at construction; resolution happens on demand.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeReference(String);

impl TypeReference {
    pub fn new(text: impl Into<String>) -> Self {
        TypeReference(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Parameters ─────────────────────────────────────────────────────────

/// A parameter of a method signature, or a variable / lambda parameter of
/// an expression graph.
///
/// For a declaration `position` is the index in the declaring scope's list
/// and `depth` the scope's nesting level. For a use site both identify the
/// declaration it refers to; they are absent for free parameters. Method
/// signature parameters carry a position and no depth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub parameter_type: TypeReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<usize>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_by_ref: bool,
}

// ── Member descriptors ─────────────────────────────────────────────────

/// Fields every member descriptor carries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberHeader {
    pub declaring_type: TypeReference,
    pub reflected_type: TypeReference,
    pub name: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub is_static: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    #[serde(flatten)]
    pub header: MemberHeader,
    pub field_type: TypeReference,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    #[serde(flatten)]
    pub header: MemberHeader,
    pub property_type: TypeReference,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodDescriptor {
    #[serde(flatten)]
    pub header: MemberHeader,
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
    #[serde(default)]
    pub generic_arguments: Vec<TypeReference>,
    pub return_type: TypeReference,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructorDescriptor {
    #[serde(flatten)]
    pub header: MemberHeader,
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
    #[serde(default)]
    pub generic_arguments: Vec<TypeReference>,
}

/// A name-based reference to a field, property, method or constructor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "memberType")]
pub enum MemberDescriptor {
    Field(FieldDescriptor),
    Property(PropertyDescriptor),
    Method(MethodDescriptor),
    Constructor(ConstructorDescriptor),
}

impl MemberDescriptor {
    pub fn header(&self) -> &MemberHeader {
        match self {
            MemberDescriptor::Field(d) => &d.header,
            MemberDescriptor::Property(d) => &d.header,
            MemberDescriptor::Method(d) => &d.header,
            MemberDescriptor::Constructor(d) => &d.header,
        }
    }

    pub fn name(&self) -> &str {
        &self.header().name
    }

    /// Lowercase member kind, as used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            MemberDescriptor::Field(_) => "field",
            MemberDescriptor::Property(_) => "property",
            MemberDescriptor::Method(_) => "method",
            MemberDescriptor::Constructor(_) => "constructor",
        }
    }
}

// ── Auxiliary records ──────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    /// Identity of the target within one tree; every record naming the
    /// same target carries the same id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolDocumentRecord {
    pub file_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatchBlockRecord {
    /// Exception type handled.
    pub test: TypeReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<ParameterDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<PortableNode>,
    pub body: PortableNode,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchCaseRecord {
    pub test_values: Vec<PortableNode>,
    pub body: PortableNode,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementInitRecord {
    pub add_method: MemberDescriptor,
    #[serde(default)]
    pub arguments: Vec<PortableNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "bindingType")]
pub enum MemberBindingRecord {
    Assignment {
        member: MemberDescriptor,
        expression: PortableNode,
    },
    ListBinding {
        member: MemberDescriptor,
        #[serde(default)]
        initializers: Vec<ElementInitRecord>,
    },
    MemberBinding {
        member: MemberDescriptor,
        #[serde(default)]
        bindings: Vec<MemberBindingRecord>,
    },
}

// ── Nodes ──────────────────────────────────────────────────────────────

/// One node of a portable tree, tagged by kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PortableNode {
    Binary(BinaryNode),
    Unary(UnaryNode),
    Constant(ConstantNode),
    Conditional(ConditionalNode),
    Block(BlockNode),
    MethodCall(MethodCallNode),
    MemberAccess(MemberAccessNode),
    Parameter(ParameterDescriptor),
    Lambda(LambdaNode),
    New(NewNode),
    NewArray(NewArrayNode),
    ListInit(ListInitNode),
    MemberInit(MemberInitNode),
    Invoke(InvokeNode),
    Index(IndexNode),
    Goto(GotoNode),
    Label(LabelNode),
    Loop(LoopNode),
    RuntimeVariables(RuntimeVariablesNode),
    Switch(SwitchNode),
    Try(TryNode),
    TypeBinary(TypeBinaryNode),
    Dynamic(DynamicNode),
    Default(DefaultNode),
    DebugInfo(DebugInfoNode),
}

impl PortableNode {
    /// The wire tag of this node.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PortableNode::Binary(_) => "Binary",
            PortableNode::Unary(_) => "Unary",
            PortableNode::Constant(_) => "Constant",
            PortableNode::Conditional(_) => "Conditional",
            PortableNode::Block(_) => "Block",
            PortableNode::MethodCall(_) => "MethodCall",
            PortableNode::MemberAccess(_) => "MemberAccess",
            PortableNode::Parameter(_) => "Parameter",
            PortableNode::Lambda(_) => "Lambda",
            PortableNode::New(_) => "New",
            PortableNode::NewArray(_) => "NewArray",
            PortableNode::ListInit(_) => "ListInit",
            PortableNode::MemberInit(_) => "MemberInit",
            PortableNode::Invoke(_) => "Invoke",
            PortableNode::Index(_) => "Index",
            PortableNode::Goto(_) => "Goto",
            PortableNode::Label(_) => "Label",
            PortableNode::Loop(_) => "Loop",
            PortableNode::RuntimeVariables(_) => "RuntimeVariables",
            PortableNode::Switch(_) => "Switch",
            PortableNode::Try(_) => "Try",
            PortableNode::TypeBinary(_) => "TypeBinary",
            PortableNode::Dynamic(_) => "Dynamic",
            PortableNode::Default(_) => "Default",
            PortableNode::DebugInfo(_) => "DebugInfo",
        }
    }

    /// Number of nodes in this tree, records included.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        self.visit(&mut |_| count += 1);
        count
    }

    /// Pre-order traversal over this node and every nested node.
    pub fn visit(&self, f: &mut dyn FnMut(&PortableNode)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    /// Direct child nodes, in wire order.
    pub fn children(&self) -> Vec<&PortableNode> {
        let mut out: Vec<&PortableNode> = Vec::new();
        match self {
            PortableNode::Binary(n) => {
                out.push(&n.left);
                out.push(&n.right);
                out.extend(n.conversion.as_deref());
            }
            PortableNode::Unary(n) => out.extend(n.operand.as_deref()),
            PortableNode::Constant(_)
            | PortableNode::Parameter(_)
            | PortableNode::RuntimeVariables(_)
            | PortableNode::Default(_)
            | PortableNode::DebugInfo(_) => {}
            PortableNode::Conditional(n) => out.extend([&*n.test, &*n.if_true, &*n.if_false]),
            PortableNode::Block(n) => {
                out.extend(&n.expressions);
                out.push(&n.result);
            }
            PortableNode::MethodCall(n) => {
                out.extend(n.instance.as_deref());
                out.extend(&n.arguments);
            }
            PortableNode::MemberAccess(n) => out.extend(n.expression.as_deref()),
            PortableNode::Lambda(n) => out.push(&n.body),
            PortableNode::New(n) => out.extend(&n.arguments),
            PortableNode::NewArray(n) => out.extend(&n.expressions),
            PortableNode::ListInit(n) => {
                out.push(&n.new_expression);
                for init in &n.initializers {
                    out.extend(&init.arguments);
                }
            }
            PortableNode::MemberInit(n) => {
                out.push(&n.new_expression);
                for binding in &n.bindings {
                    binding_children(binding, &mut out);
                }
            }
            PortableNode::Invoke(n) => {
                out.push(&n.expression);
                out.extend(&n.arguments);
            }
            PortableNode::Index(n) => {
                out.push(&n.object);
                out.extend(&n.arguments);
            }
            PortableNode::Goto(n) => out.extend(n.value.as_deref()),
            PortableNode::Label(n) => out.extend(n.default_value.as_deref()),
            PortableNode::Loop(n) => out.push(&n.body),
            PortableNode::Switch(n) => {
                out.push(&n.switch_value);
                for case in &n.cases {
                    out.extend(&case.test_values);
                    out.push(&case.body);
                }
                out.extend(n.default_body.as_deref());
            }
            PortableNode::Try(n) => {
                out.push(&n.body);
                for handler in &n.handlers {
                    out.extend(handler.filter.as_ref());
                    out.push(&handler.body);
                }
                out.extend(n.finally.as_deref());
                out.extend(n.fault.as_deref());
            }
            PortableNode::TypeBinary(n) => out.push(&n.expression),
            PortableNode::Dynamic(n) => out.extend(&n.arguments),
        }
        out
    }
}

fn binding_children<'a>(binding: &'a MemberBindingRecord, out: &mut Vec<&'a PortableNode>) {
    match binding {
        MemberBindingRecord::Assignment { expression, .. } => out.push(expression),
        MemberBindingRecord::ListBinding { initializers, .. } => {
            for init in initializers {
                out.extend(&init.arguments);
            }
        }
        MemberBindingRecord::MemberBinding { bindings, .. } => {
            for nested in bindings {
                binding_children(nested, out);
            }
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryNode {
    pub node_type: NodeType,
    pub left: Box<PortableNode>,
    pub right: Box<PortableNode>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub lift_to_null: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<MemberDescriptor>,
    /// A Lambda node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion: Option<Box<PortableNode>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnaryNode {
    pub node_type: NodeType,
    /// Absent only for a rethrow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operand: Option<Box<PortableNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<MemberDescriptor>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConstantNode {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
    /// JSON literal; enum values are written by name. Absent means null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalNode {
    pub test: Box<PortableNode>,
    pub if_true: Box<PortableNode>,
    pub if_false: Box<PortableNode>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockNode {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
    #[serde(default)]
    pub variables: Vec<ParameterDescriptor>,
    /// Every expression but the last.
    #[serde(default)]
    pub expressions: Vec<PortableNode>,
    pub result: Box<PortableNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodCallNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<Box<PortableNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<MemberDescriptor>,
    #[serde(default)]
    pub arguments: Vec<PortableNode>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberAccessNode {
    /// Absent for static members.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<Box<PortableNode>>,
    pub member: MemberDescriptor,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
    pub body: Box<PortableNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<TypeReference>,
    /// Delegate type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub tail_call: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    /// Absent for value-type default construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constructor: Option<MemberDescriptor>,
    #[serde(default)]
    pub arguments: Vec<PortableNode>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewArrayNode {
    /// `NewArrayInit` or `NewArrayBounds`.
    pub node_type: NodeType,
    /// The array type.
    #[serde(rename = "type")]
    pub ty: TypeReference,
    #[serde(default)]
    pub expressions: Vec<PortableNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListInitNode {
    pub new_expression: Box<PortableNode>,
    #[serde(default)]
    pub initializers: Vec<ElementInitRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberInitNode {
    pub new_expression: Box<PortableNode>,
    #[serde(default)]
    pub bindings: Vec<MemberBindingRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InvokeNode {
    pub expression: Box<PortableNode>,
    #[serde(default)]
    pub arguments: Vec<PortableNode>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexNode {
    pub object: Box<PortableNode>,
    #[serde(default)]
    pub arguments: Vec<PortableNode>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GotoNode {
    pub goto_kind: GotoKind,
    pub target: LabelRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Box<PortableNode>>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelNode {
    pub target: LabelRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Box<PortableNode>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopNode {
    pub body: Box<PortableNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub break_label: Option<LabelRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_label: Option<LabelRecord>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeVariablesNode {
    #[serde(default)]
    pub variables: Vec<ParameterDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchNode {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
    pub switch_value: Box<PortableNode>,
    #[serde(default)]
    pub cases: Vec<SwitchCaseRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_body: Option<Box<PortableNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<MemberDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TryNode {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
    pub body: Box<PortableNode>,
    #[serde(default)]
    pub handlers: Vec<CatchBlockRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finally: Option<Box<PortableNode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<Box<PortableNode>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeBinaryNode {
    /// `TypeIs` or `TypeEqual`.
    pub node_type: NodeType,
    pub expression: Box<PortableNode>,
    pub type_operand: TypeReference,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicNode {
    pub delegate_type: TypeReference,
    #[serde(default)]
    pub arguments: Vec<PortableNode>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeReference>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefaultNode {
    #[serde(rename = "type")]
    pub ty: TypeReference,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfoNode {
    pub document: SymbolDocumentRecord,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_clear: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_constant(n: i64) -> PortableNode {
        PortableNode::Constant(ConstantNode {
            ty: Some(TypeReference::new("System.Int32, System.Private.CoreLib")),
            value: Some(n.into()),
        })
    }

    #[test]
    fn children_follow_wire_order() {
        let node = PortableNode::Conditional(ConditionalNode {
            test: Box::new(PortableNode::Constant(ConstantNode {
                ty: Some(TypeReference::new("System.Boolean, System.Private.CoreLib")),
                value: Some(true.into()),
            })),
            if_true: Box::new(int_constant(1)),
            if_false: Box::new(int_constant(2)),
            ty: None,
        });
        let kinds: Vec<_> = node.children().iter().map(|c| c.kind_name()).collect();
        assert_eq!(kinds, vec!["Constant", "Constant", "Constant"]);
        assert_eq!(node.node_count(), 4);
    }

    #[test]
    fn member_descriptor_exposes_header() {
        let descriptor = MemberDescriptor::Property(PropertyDescriptor {
            header: MemberHeader {
                declaring_type: TypeReference::new("Demo.Model, Demo.Models"),
                reflected_type: TypeReference::new("Demo.Model, Demo.Models"),
                name: "Int32Property".into(),
                is_public: true,
                is_static: false,
            },
            property_type: TypeReference::new("System.Int32, System.Private.CoreLib"),
        });
        assert_eq!(descriptor.name(), "Int32Property");
        assert_eq!(descriptor.kind_name(), "property");
    }
}
