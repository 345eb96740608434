//! The live expression graph.
//!
//! An `Expr` is an immutable, reference-counted node. Parameters and label
//! targets have reference identity: two `ParameterExpr`s are the same
//! variable only if they are the same allocation, regardless of name or type.
//! Construction goes through the validating factories in `factory`.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::reflect::{ConstructorInfo, MemberInfo, MethodInfo};
use crate::ty::Ty;
use crate::value::Value;

/// Every expression type code, named as on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Add,
    AddChecked,
    And,
    AndAlso,
    ArrayLength,
    ArrayIndex,
    Call,
    Coalesce,
    Conditional,
    Constant,
    Convert,
    ConvertChecked,
    Divide,
    Equal,
    ExclusiveOr,
    GreaterThan,
    GreaterThanOrEqual,
    Invoke,
    Lambda,
    LeftShift,
    LessThan,
    LessThanOrEqual,
    ListInit,
    MemberAccess,
    MemberInit,
    Modulo,
    Multiply,
    MultiplyChecked,
    Negate,
    UnaryPlus,
    NegateChecked,
    New,
    NewArrayInit,
    NewArrayBounds,
    Not,
    NotEqual,
    Or,
    OrElse,
    Parameter,
    Power,
    Quote,
    RightShift,
    Subtract,
    SubtractChecked,
    TypeAs,
    TypeIs,
    Assign,
    Block,
    DebugInfo,
    Decrement,
    Dynamic,
    Default,
    Extension,
    Goto,
    Increment,
    Index,
    Label,
    RuntimeVariables,
    Loop,
    Switch,
    Throw,
    Try,
    Unbox,
    AddAssign,
    AndAssign,
    DivideAssign,
    ExclusiveOrAssign,
    LeftShiftAssign,
    ModuloAssign,
    MultiplyAssign,
    OrAssign,
    PowerAssign,
    RightShiftAssign,
    SubtractAssign,
    AddAssignChecked,
    MultiplyAssignChecked,
    SubtractAssignChecked,
    PreIncrementAssign,
    PreDecrementAssign,
    PostIncrementAssign,
    PostDecrementAssign,
    TypeEqual,
    OnesComplement,
    IsTrue,
    IsFalse,
}

impl NodeType {
    /// Operators carried by binary nodes.
    pub fn is_binary(self) -> bool {
        use NodeType::*;
        matches!(
            self,
            Add | AddChecked
                | And
                | AndAlso
                | ArrayIndex
                | Coalesce
                | Divide
                | Equal
                | ExclusiveOr
                | GreaterThan
                | GreaterThanOrEqual
                | LeftShift
                | LessThan
                | LessThanOrEqual
                | Modulo
                | Multiply
                | MultiplyChecked
                | NotEqual
                | Or
                | OrElse
                | Power
                | RightShift
                | Subtract
                | SubtractChecked
                | Assign
        ) || self.compound_operator().is_some()
    }

    /// Operators carried by unary nodes.
    pub fn is_unary(self) -> bool {
        use NodeType::*;
        matches!(
            self,
            ArrayLength
                | Convert
                | ConvertChecked
                | Negate
                | NegateChecked
                | UnaryPlus
                | Not
                | OnesComplement
                | Quote
                | TypeAs
                | Decrement
                | Increment
                | Throw
                | Unbox
                | PreIncrementAssign
                | PreDecrementAssign
                | PostIncrementAssign
                | PostDecrementAssign
                | IsTrue
                | IsFalse
        )
    }

    pub fn is_comparison(self) -> bool {
        use NodeType::*;
        matches!(
            self,
            Equal | NotEqual | LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual
        )
    }

    /// The arithmetic operator behind a compound assignment
    /// (`AddAssign` -> `Add`).
    pub fn compound_operator(self) -> Option<NodeType> {
        use NodeType::*;
        Some(match self {
            AddAssign => Add,
            AndAssign => And,
            DivideAssign => Divide,
            ExclusiveOrAssign => ExclusiveOr,
            LeftShiftAssign => LeftShift,
            ModuloAssign => Modulo,
            MultiplyAssign => Multiply,
            OrAssign => Or,
            PowerAssign => Power,
            RightShiftAssign => RightShift,
            SubtractAssign => Subtract,
            AddAssignChecked => AddChecked,
            MultiplyAssignChecked => MultiplyChecked,
            SubtractAssignChecked => SubtractChecked,
            _ => return None,
        })
    }

    /// `Assign` or any compound assignment.
    pub fn is_assignment(self) -> bool {
        self == NodeType::Assign || self.compound_operator().is_some()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Flavour of a goto node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GotoKind {
    Goto,
    Return,
    Break,
    Continue,
}

// ── Parameters and labels ──────────────────────────────────────────────

static NEXT_PARAMETER_ID: AtomicU64 = AtomicU64::new(1);

/// A parameter or local variable. Identity is the allocation: clones share
/// it, fresh constructions never do.
#[derive(Clone)]
pub struct ParameterExpr(Rc<ParameterData>);

struct ParameterData {
    id: u64,
    name: Option<String>,
    ty: Ty,
    is_by_ref: bool,
}

impl ParameterExpr {
    pub fn new(ty: Ty, name: Option<&str>) -> Self {
        Self::with_by_ref(ty, name, false)
    }

    pub fn named(ty: Ty, name: &str) -> Self {
        Self::with_by_ref(ty, Some(name), false)
    }

    pub fn with_by_ref(ty: Ty, name: Option<&str>, is_by_ref: bool) -> Self {
        ParameterExpr(Rc::new(ParameterData {
            id: NEXT_PARAMETER_ID.fetch_add(1, Ordering::Relaxed),
            name: name.map(str::to_string),
            ty,
            is_by_ref,
        }))
    }

    /// Process-unique identity, stable for the lifetime of the parameter.
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn ty(&self) -> &Ty {
        &self.0.ty
    }

    pub fn is_by_ref(&self) -> bool {
        self.0.is_by_ref
    }

    pub fn ptr_eq(&self, other: &ParameterExpr) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for ParameterExpr {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ParameterExpr {}

impl std::hash::Hash for ParameterExpr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for ParameterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}: {}", self.name().unwrap_or("_"), self.0.id, self.0.ty)
    }
}

/// A jump target. Identity is the allocation, as for parameters.
#[derive(Clone)]
pub struct LabelTarget(Rc<LabelData>);

struct LabelData {
    name: Option<String>,
    ty: Ty,
}

impl LabelTarget {
    pub fn new(ty: Ty, name: Option<&str>) -> Self {
        LabelTarget(Rc::new(LabelData { name: name.map(str::to_string), ty }))
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn ty(&self) -> &Ty {
        &self.0.ty
    }

    pub fn ptr_eq(&self, other: &LabelTarget) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for LabelTarget {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for LabelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "label {}: {}", self.name().unwrap_or("_"), self.0.ty)
    }
}

// ── Lambdas ────────────────────────────────────────────────────────────

/// A lambda: parameters, body and delegate type.
#[derive(Clone)]
pub struct LambdaExpr(Rc<LambdaData>);

pub(crate) struct LambdaData {
    pub(crate) name: Option<String>,
    pub(crate) parameters: Vec<ParameterExpr>,
    pub(crate) body: Expr,
    pub(crate) tail_call: bool,
    pub(crate) delegate_type: Ty,
}

impl LambdaExpr {
    pub(crate) fn from_data(data: LambdaData) -> Self {
        LambdaExpr(Rc::new(data))
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn parameters(&self) -> &[ParameterExpr] {
        &self.0.parameters
    }

    pub fn body(&self) -> &Expr {
        &self.0.body
    }

    pub fn tail_call(&self) -> bool {
        self.0.tail_call
    }

    pub fn delegate_type(&self) -> &Ty {
        &self.0.delegate_type
    }

    /// Result type from the delegate signature.
    pub fn return_type(&self) -> Ty {
        self.0
            .delegate_type
            .delegate_return_type()
            .unwrap_or_else(|| self.0.body.ty().clone())
    }

    pub fn ptr_eq(&self, other: &LambdaExpr) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn to_expr(&self) -> Expr {
        Expr::from(self.clone())
    }
}

impl From<LambdaExpr> for Expr {
    fn from(lambda: LambdaExpr) -> Self {
        let ty = lambda.delegate_type().clone();
        Expr::new(ExprKind::Lambda(lambda), ty)
    }
}

impl fmt::Debug for LambdaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_expr())
    }
}

// ── Auxiliary records ──────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolDocument {
    pub file_name: String,
}

#[derive(Clone, Debug)]
pub struct CatchBlock {
    /// Exception type handled by this block.
    pub test: Ty,
    pub variable: Option<ParameterExpr>,
    pub body: Expr,
    pub filter: Option<Expr>,
}

#[derive(Clone, Debug)]
pub struct SwitchCase {
    pub test_values: Vec<Expr>,
    pub body: Expr,
}

#[derive(Clone, Debug)]
pub struct ElementInit {
    pub add_method: MethodInfo,
    pub arguments: Vec<Expr>,
}

#[derive(Clone, Debug)]
pub enum MemberBinding {
    Assignment { member: MemberInfo, expression: Expr },
    List { member: MemberInfo, initializers: Vec<ElementInit> },
    Member { member: MemberInfo, bindings: Vec<MemberBinding> },
}

impl MemberBinding {
    pub fn member(&self) -> &MemberInfo {
        match self {
            MemberBinding::Assignment { member, .. }
            | MemberBinding::List { member, .. }
            | MemberBinding::Member { member, .. } => member,
        }
    }
}

// ── Nodes ──────────────────────────────────────────────────────────────

/// An expression node.
#[derive(Clone)]
pub struct Expr(Rc<ExprNode>);

struct ExprNode {
    kind: ExprKind,
    ty: Ty,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    Binary {
        op: NodeType,
        left: Expr,
        right: Expr,
        lift_to_null: bool,
        method: Option<MethodInfo>,
        conversion: Option<LambdaExpr>,
    },
    Unary {
        op: NodeType,
        operand: Option<Expr>,
        method: Option<MethodInfo>,
    },
    Constant(Value),
    Conditional {
        test: Expr,
        if_true: Expr,
        if_false: Expr,
    },
    Block {
        variables: Vec<ParameterExpr>,
        expressions: Vec<Expr>,
    },
    Call {
        instance: Option<Expr>,
        method: MethodInfo,
        arguments: Vec<Expr>,
    },
    Member {
        expression: Option<Expr>,
        member: MemberInfo,
    },
    Parameter(ParameterExpr),
    Lambda(LambdaExpr),
    New {
        constructor: Option<ConstructorInfo>,
        arguments: Vec<Expr>,
    },
    NewArray {
        bounds: bool,
        expressions: Vec<Expr>,
    },
    ListInit {
        new_expression: Expr,
        initializers: Vec<ElementInit>,
    },
    MemberInit {
        new_expression: Expr,
        bindings: Vec<MemberBinding>,
    },
    Invoke {
        expression: Expr,
        arguments: Vec<Expr>,
    },
    Index {
        object: Expr,
        arguments: Vec<Expr>,
    },
    Goto {
        kind: GotoKind,
        target: LabelTarget,
        value: Option<Expr>,
    },
    Label {
        target: LabelTarget,
        default_value: Option<Expr>,
    },
    Loop {
        body: Expr,
        break_label: Option<LabelTarget>,
        continue_label: Option<LabelTarget>,
    },
    RuntimeVariables(Vec<ParameterExpr>),
    Switch {
        switch_value: Expr,
        cases: Vec<SwitchCase>,
        default_body: Option<Expr>,
        comparison: Option<MethodInfo>,
    },
    Try {
        body: Expr,
        handlers: Vec<CatchBlock>,
        finally: Option<Expr>,
        fault: Option<Expr>,
    },
    TypeBinary {
        op: NodeType,
        expression: Expr,
        type_operand: Ty,
    },
    /// A late-bound operation. The host has no call-site binders, so these
    /// can be built and transported but not evaluated.
    Dynamic {
        delegate_type: Ty,
        arguments: Vec<Expr>,
    },
    Default,
    DebugInfo {
        document: SymbolDocument,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    },
    /// A host-specific node. `reduced` is its rewriting into standard nodes,
    /// if it has one.
    Extension {
        name: String,
        reduced: Option<Expr>,
    },
}

/// Line number marking a debug-info node that clears sequence points.
pub const CLEAR_DEBUG_LINE: u32 = 0xfeefee;

impl Expr {
    pub(crate) fn new(kind: ExprKind, ty: Ty) -> Expr {
        Expr(Rc::new(ExprNode { kind, ty }))
    }

    pub fn kind(&self) -> &ExprKind {
        &self.0.kind
    }

    /// Static type of the node's result.
    pub fn ty(&self) -> &Ty {
        &self.0.ty
    }

    pub fn ptr_eq(&self, other: &Expr) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn as_parameter(&self) -> Option<&ParameterExpr> {
        match self.kind() {
            ExprKind::Parameter(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_lambda(&self) -> Option<&LambdaExpr> {
        match self.kind() {
            ExprKind::Lambda(l) => Some(l),
            _ => None,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self.kind() {
            ExprKind::Binary { op, .. } | ExprKind::Unary { op, .. } => *op,
            ExprKind::TypeBinary { op, .. } => *op,
            ExprKind::Constant(_) => NodeType::Constant,
            ExprKind::Conditional { .. } => NodeType::Conditional,
            ExprKind::Block { .. } => NodeType::Block,
            ExprKind::Call { .. } => NodeType::Call,
            ExprKind::Member { .. } => NodeType::MemberAccess,
            ExprKind::Parameter(_) => NodeType::Parameter,
            ExprKind::Lambda(_) => NodeType::Lambda,
            ExprKind::New { .. } => NodeType::New,
            ExprKind::NewArray { bounds: true, .. } => NodeType::NewArrayBounds,
            ExprKind::NewArray { bounds: false, .. } => NodeType::NewArrayInit,
            ExprKind::ListInit { .. } => NodeType::ListInit,
            ExprKind::MemberInit { .. } => NodeType::MemberInit,
            ExprKind::Invoke { .. } => NodeType::Invoke,
            ExprKind::Index { .. } => NodeType::Index,
            ExprKind::Goto { .. } => NodeType::Goto,
            ExprKind::Label { .. } => NodeType::Label,
            ExprKind::Loop { .. } => NodeType::Loop,
            ExprKind::RuntimeVariables(_) => NodeType::RuntimeVariables,
            ExprKind::Switch { .. } => NodeType::Switch,
            ExprKind::Try { .. } => NodeType::Try,
            ExprKind::Dynamic { .. } => NodeType::Dynamic,
            ExprKind::Default => NodeType::Default,
            ExprKind::DebugInfo { .. } => NodeType::DebugInfo,
            ExprKind::Extension { .. } => NodeType::Extension,
        }
    }

    /// Visit this node and every descendant expression, parents first.
    /// Lambdas nested in binary conversions, catch blocks, cases, element
    /// initializers and member bindings are included.
    pub fn walk(&self, visit: &mut dyn FnMut(&Expr)) {
        visit(self);
        match self.kind() {
            ExprKind::Binary { left, right, conversion, .. } => {
                left.walk(visit);
                right.walk(visit);
                if let Some(conversion) = conversion {
                    conversion.to_expr().walk(visit);
                }
            }
            ExprKind::Unary { operand, .. } => {
                if let Some(operand) = operand {
                    operand.walk(visit);
                }
            }
            ExprKind::Conditional { test, if_true, if_false } => {
                test.walk(visit);
                if_true.walk(visit);
                if_false.walk(visit);
            }
            ExprKind::Block { expressions, .. } => walk_all(expressions, visit),
            ExprKind::Call { instance, arguments, .. } => {
                if let Some(instance) = instance {
                    instance.walk(visit);
                }
                walk_all(arguments, visit);
            }
            ExprKind::Member { expression, .. } => {
                if let Some(expression) = expression {
                    expression.walk(visit);
                }
            }
            ExprKind::Lambda(lambda) => lambda.body().walk(visit),
            ExprKind::New { arguments, .. } => walk_all(arguments, visit),
            ExprKind::NewArray { expressions, .. } => walk_all(expressions, visit),
            ExprKind::ListInit { new_expression, initializers } => {
                new_expression.walk(visit);
                for init in initializers {
                    walk_all(&init.arguments, visit);
                }
            }
            ExprKind::MemberInit { new_expression, bindings } => {
                new_expression.walk(visit);
                walk_bindings(bindings, visit);
            }
            ExprKind::Invoke { expression, arguments } => {
                expression.walk(visit);
                walk_all(arguments, visit);
            }
            ExprKind::Index { object, arguments } => {
                object.walk(visit);
                walk_all(arguments, visit);
            }
            ExprKind::Goto { value, .. } => {
                if let Some(value) = value {
                    value.walk(visit);
                }
            }
            ExprKind::Label { default_value, .. } => {
                if let Some(value) = default_value {
                    value.walk(visit);
                }
            }
            ExprKind::Loop { body, .. } => body.walk(visit),
            ExprKind::Switch { switch_value, cases, default_body, .. } => {
                switch_value.walk(visit);
                for case in cases {
                    walk_all(&case.test_values, visit);
                    case.body.walk(visit);
                }
                if let Some(body) = default_body {
                    body.walk(visit);
                }
            }
            ExprKind::Try { body, handlers, finally, fault } => {
                body.walk(visit);
                for handler in handlers {
                    if let Some(filter) = &handler.filter {
                        filter.walk(visit);
                    }
                    handler.body.walk(visit);
                }
                for e in [finally, fault].into_iter().flatten() {
                    e.walk(visit);
                }
            }
            ExprKind::TypeBinary { expression, .. } => expression.walk(visit),
            ExprKind::Dynamic { arguments, .. } => walk_all(arguments, visit),
            ExprKind::Extension { reduced, .. } => {
                if let Some(reduced) = reduced {
                    reduced.walk(visit);
                }
            }
            ExprKind::Constant(_)
            | ExprKind::Parameter(_)
            | ExprKind::RuntimeVariables(_)
            | ExprKind::Default
            | ExprKind::DebugInfo { .. } => {}
        }
    }
}

fn walk_all(exprs: &[Expr], visit: &mut dyn FnMut(&Expr)) {
    for e in exprs {
        e.walk(visit);
    }
}

fn walk_bindings(bindings: &[MemberBinding], visit: &mut dyn FnMut(&Expr)) {
    for binding in bindings {
        match binding {
            MemberBinding::Assignment { expression, .. } => expression.walk(visit),
            MemberBinding::List { initializers, .. } => {
                for init in initializers {
                    walk_all(&init.arguments, visit);
                }
            }
            MemberBinding::Member { bindings, .. } => walk_bindings(bindings, visit),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}
