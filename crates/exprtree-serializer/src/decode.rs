//! Portable tree to live graph.
//!
//! Every use-site parameter is built as its own object and its recorded
//! slot noted in a table; each scope is canonicalized once its body is
//! rebuilt. Label records carrying the same id become one target, so jumps
//! reconnect to their targets; records without an id fall back to sharing
//! by name and type.

use exprtree_host::{
    CatchBlock, ElementInit, Expr, LabelTarget, LambdaExpr, MemberBinding, MemberKind, MethodInfo,
    NodeType, ParameterExpr, SwitchCase, SymbolDocument, Ty, TypeSystem,
};
use exprtree_portable::{
    CatchBlockRecord, ElementInitRecord, LabelRecord, MemberBindingRecord, MemberDescriptor,
    ParameterDescriptor, PortableNode,
};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::canonicalize::{canonicalize, SlotTable};
use crate::constant::decode_constant;
use crate::error::{Result, SerializeError};
use crate::members::{expect_constructor, expect_method, MemberResolver};
use crate::types::TypeResolver;

pub(crate) struct Decoder<'t> {
    types: &'t dyn TypeSystem,
    resolver: TypeResolver<'t>,
    members: MemberResolver<'t>,
    /// Number of scopes currently open.
    depth: usize,
    slots: SlotTable,
    labels: FxHashMap<usize, LabelTarget>,
    named_labels: FxHashMap<(String, Ty), LabelTarget>,
    free: FxHashMap<(Option<String>, Ty), ParameterExpr>,
}

/// Declarations of a scope, with the depth they were declared at.
struct DeclaredScope {
    depth: usize,
    parameters: Vec<ParameterExpr>,
}

impl DeclaredScope {
    fn canonicalize(&self, body: &Expr, slots: &SlotTable) -> Result<Expr> {
        canonicalize(body, &self.parameters, self.depth, slots)
    }
}

impl<'t> Decoder<'t> {
    pub(crate) fn new(types: &'t dyn TypeSystem) -> Self {
        Decoder {
            types,
            resolver: TypeResolver::new(types),
            members: MemberResolver::new(types),
            depth: 0,
            slots: SlotTable::default(),
            labels: FxHashMap::default(),
            named_labels: FxHashMap::default(),
            free: FxHashMap::default(),
        }
    }

    pub(crate) fn decode(&mut self, node: &PortableNode) -> Result<Expr> {
        trace!(kind = node.kind_name(), depth = self.depth, "decoding node");
        match node {
            PortableNode::Binary(n) => {
                if !n.node_type.is_binary() {
                    return Err(unsupported_operator("Binary", n.node_type));
                }
                let left = self.decode(&n.left)?;
                let right = self.decode(&n.right)?;
                let method = self.optional_method(n.method.as_ref(), "Binary")?;
                let conversion = match &n.conversion {
                    Some(conversion) => Some(self.decode_lambda(conversion)?),
                    None => None,
                };
                Ok(Expr::make_binary(n.node_type, left, right, n.lift_to_null, method, conversion)?)
            }
            PortableNode::Unary(n) => {
                if !n.node_type.is_unary() {
                    return Err(unsupported_operator("Unary", n.node_type));
                }
                let ty = self.resolver.resolve_optional(n.ty.as_ref())?;
                match (n.node_type, &n.operand) {
                    (NodeType::Throw, operand) => {
                        let operand = self.optional(operand.as_deref())?;
                        Ok(Expr::throw(operand, ty.unwrap_or_else(Ty::void)))
                    }
                    (NodeType::Quote, Some(operand)) => Ok(Expr::quote(&self.decode_lambda(operand)?)),
                    (op, operand) => {
                        let operand = self.optional(operand.as_deref())?;
                        let method = self.optional_method(n.method.as_ref(), "Unary")?;
                        Ok(Expr::make_unary(op, operand, ty, method)?)
                    }
                }
            }
            PortableNode::Constant(n) => {
                let ty = self.resolver.resolve_optional(n.ty.as_ref())?.unwrap_or_else(Ty::object);
                let value = decode_constant(self.types, n.value.as_ref(), &ty)?;
                Ok(Expr::constant(value, ty))
            }
            PortableNode::Conditional(n) => {
                let test = self.decode(&n.test)?;
                let if_true = self.decode(&n.if_true)?;
                let if_false = self.decode(&n.if_false)?;
                let ty = self.resolver.resolve_optional(n.ty.as_ref())?;
                Ok(Expr::condition(test, if_true, if_false, ty)?)
            }
            PortableNode::Block(n) => {
                let ty = self.resolver.resolve_optional(n.ty.as_ref())?;
                let (scope, expressions) = self.scoped(&n.variables, |this| {
                    let mut expressions = this.decode_all(&n.expressions)?;
                    expressions.push(this.decode(&n.result)?);
                    Ok(expressions)
                })?;
                let expressions = expressions
                    .iter()
                    .map(|e| scope.canonicalize(e, &self.slots))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expr::block(scope.parameters, expressions, ty)?)
            }
            PortableNode::MethodCall(n) => {
                let Some(descriptor) = &n.method else {
                    return Err(SerializeError::MemberNotFound {
                        member_kind: MemberKind::Method,
                        name: String::new(),
                        reflected_type: n.ty.as_ref().map(|t| t.to_string()).unwrap_or_default(),
                    });
                };
                let instance = self.optional(n.instance.as_deref())?;
                let method = expect_method(self.members.resolve_member(descriptor)?, "MethodCall")?;
                let arguments = self.decode_all(&n.arguments)?;
                Ok(Expr::call(instance, method, arguments)?)
            }
            PortableNode::MemberAccess(n) => {
                let expression = self.optional(n.expression.as_deref())?;
                let member = self.members.resolve_member(&n.member)?;
                Ok(Expr::member(expression, member)?)
            }
            PortableNode::Parameter(d) => Ok(Expr::parameter(&self.use_site(d)?)),
            PortableNode::Lambda(_) => Ok(self.decode_lambda(node)?.to_expr()),
            PortableNode::New(n) => {
                let constructor = match &n.constructor {
                    Some(d) => Some(expect_constructor(self.members.resolve_member(d)?, "New")?),
                    None => None,
                };
                let arguments = self.decode_all(&n.arguments)?;
                let ty = self.resolver.resolve_optional(n.ty.as_ref())?;
                Ok(Expr::make_new(constructor, arguments, ty)?)
            }
            PortableNode::NewArray(n) => {
                let array = self.resolver.resolve(&n.ty)?;
                let element = array.element_type().cloned().ok_or_else(|| {
                    SerializeError::invalid("NewArray", format!("`{}` is not an array type", array))
                })?;
                let expressions = self.decode_all(&n.expressions)?;
                match n.node_type {
                    NodeType::NewArrayInit => Ok(Expr::new_array_init(element, expressions)),
                    NodeType::NewArrayBounds => Ok(Expr::new_array_bounds(element, expressions)?),
                    other => Err(unsupported_operator("NewArray", other)),
                }
            }
            PortableNode::ListInit(n) => {
                let new_expression = self.decode(&n.new_expression)?;
                let initializers = self.element_inits(&n.initializers)?;
                Ok(Expr::list_init(new_expression, initializers)?)
            }
            PortableNode::MemberInit(n) => {
                let new_expression = self.decode(&n.new_expression)?;
                let bindings = self.bindings(&n.bindings)?;
                Ok(Expr::member_init(new_expression, bindings)?)
            }
            PortableNode::Invoke(n) => {
                let expression = self.decode(&n.expression)?;
                let arguments = self.decode_all(&n.arguments)?;
                Ok(Expr::invoke(expression, arguments)?)
            }
            PortableNode::Index(n) => {
                let object = self.decode(&n.object)?;
                let arguments = self.decode_all(&n.arguments)?;
                Ok(Expr::array_access(object, arguments)?)
            }
            PortableNode::Goto(n) => {
                let target = self.label(&n.target)?;
                let value = self.optional(n.value.as_deref())?;
                let ty = self.resolver.resolve_optional(n.ty.as_ref())?;
                Ok(Expr::make_goto(n.goto_kind, target, value, ty))
            }
            PortableNode::Label(n) => {
                let target = self.label(&n.target)?;
                let default_value = self.optional(n.default_value.as_deref())?;
                Ok(Expr::label(target, default_value))
            }
            PortableNode::Loop(n) => {
                let body = self.decode(&n.body)?;
                let break_label = self.optional_label(n.break_label.as_ref())?;
                let continue_label = self.optional_label(n.continue_label.as_ref())?;
                Ok(Expr::make_loop(body, break_label, continue_label))
            }
            PortableNode::RuntimeVariables(n) => {
                let variables = n
                    .variables
                    .iter()
                    .map(|d| self.use_site(d))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Expr::runtime_variables(variables))
            }
            PortableNode::Switch(n) => {
                let ty = self.resolver.resolve_optional(n.ty.as_ref())?;
                let switch_value = self.decode(&n.switch_value)?;
                let cases = n
                    .cases
                    .iter()
                    .map(|case| {
                        Ok(SwitchCase {
                            test_values: self.decode_all(&case.test_values)?,
                            body: self.decode(&case.body)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let default_body = self.optional(n.default_body.as_deref())?;
                let comparison = self.optional_method(n.comparison.as_ref(), "Switch")?;
                Ok(Expr::switch(ty, switch_value, cases, default_body, comparison)?)
            }
            PortableNode::Try(n) => {
                let ty = self.resolver.resolve_optional(n.ty.as_ref())?;
                let body = self.decode(&n.body)?;
                let handlers = n
                    .handlers
                    .iter()
                    .map(|h| self.catch_block(h))
                    .collect::<Result<Vec<_>>>()?;
                let finally = self.optional(n.finally.as_deref())?;
                let fault = self.optional(n.fault.as_deref())?;
                Ok(Expr::make_try(ty, body, handlers, finally, fault)?)
            }
            PortableNode::TypeBinary(n) => {
                if !matches!(n.node_type, NodeType::TypeIs | NodeType::TypeEqual) {
                    return Err(unsupported_operator("TypeBinary", n.node_type));
                }
                let expression = self.decode(&n.expression)?;
                let type_operand = self.resolver.resolve(&n.type_operand)?;
                Ok(Expr::type_binary(n.node_type, expression, type_operand)?)
            }
            PortableNode::Dynamic(n) => {
                let delegate_type = self.resolver.resolve(&n.delegate_type)?;
                let arguments = self.decode_all(&n.arguments)?;
                let ty = self.resolver.resolve_optional(n.ty.as_ref())?;
                Ok(Expr::dynamic(delegate_type, arguments, ty)?)
            }
            PortableNode::Default(n) => Ok(Expr::default(self.resolver.resolve(&n.ty)?)),
            PortableNode::DebugInfo(n) => {
                let document = SymbolDocument { file_name: n.document.file_name.clone() };
                if n.is_clear {
                    return Ok(Expr::clear_debug_info(document));
                }
                Ok(Expr::debug_info(
                    document,
                    n.start_line,
                    n.start_column,
                    n.end_line,
                    n.end_column,
                )?)
            }
        }
    }

    /// Decode a node that must be a lambda.
    pub(crate) fn decode_lambda(&mut self, node: &PortableNode) -> Result<LambdaExpr> {
        let PortableNode::Lambda(n) = node else {
            return Err(SerializeError::invalid(
                node.kind_name(),
                "expected a Lambda node",
            ));
        };
        let delegate_type = self.resolver.resolve_optional(n.ty.as_ref())?;
        let (scope, body) = self.scoped(&n.parameters, |this| this.decode(&n.body))?;
        let body = scope.canonicalize(&body, &self.slots)?;
        Ok(LambdaExpr::build(delegate_type, body, n.name.clone(), n.tail_call, scope.parameters)?)
    }

    fn decode_all(&mut self, nodes: &[PortableNode]) -> Result<Vec<Expr>> {
        nodes.iter().map(|n| self.decode(n)).collect()
    }

    fn optional(&mut self, node: Option<&PortableNode>) -> Result<Option<Expr>> {
        node.map(|n| self.decode(n)).transpose()
    }

    fn optional_method(
        &self,
        descriptor: Option<&MemberDescriptor>,
        node: &str,
    ) -> Result<Option<MethodInfo>> {
        descriptor
            .map(|d| expect_method(self.members.resolve_member(d)?, node))
            .transpose()
    }

    fn catch_block(&mut self, record: &CatchBlockRecord) -> Result<CatchBlock> {
        let test = self.resolver.resolve(&record.test)?;
        let declared: Vec<ParameterDescriptor> = record.variable.iter().cloned().collect();
        let (scope, (filter, body)) = self.scoped(&declared, |this| {
            let filter = this.optional(record.filter.as_ref())?;
            Ok((filter, this.decode(&record.body)?))
        })?;
        let filter = filter.map(|f| scope.canonicalize(&f, &self.slots)).transpose()?;
        let body = scope.canonicalize(&body, &self.slots)?;
        Ok(CatchBlock { test, variable: scope.parameters.into_iter().next(), body, filter })
    }

    fn element_inits(&mut self, records: &[ElementInitRecord]) -> Result<Vec<ElementInit>> {
        records
            .iter()
            .map(|record| {
                let member = self.members.resolve_member(&record.add_method)?;
                Ok(ElementInit {
                    add_method: expect_method(member, "ElementInit")?,
                    arguments: self.decode_all(&record.arguments)?,
                })
            })
            .collect()
    }

    fn bindings(&mut self, records: &[MemberBindingRecord]) -> Result<Vec<MemberBinding>> {
        records
            .iter()
            .map(|record| {
                Ok(match record {
                    MemberBindingRecord::Assignment { member, expression } => {
                        MemberBinding::Assignment {
                            member: self.members.resolve_member(member)?,
                            expression: self.decode(expression)?,
                        }
                    }
                    MemberBindingRecord::ListBinding { member, initializers } => MemberBinding::List {
                        member: self.members.resolve_member(member)?,
                        initializers: self.element_inits(initializers)?,
                    },
                    MemberBindingRecord::MemberBinding { member, bindings } => MemberBinding::Member {
                        member: self.members.resolve_member(member)?,
                        bindings: self.bindings(bindings)?,
                    },
                })
            })
            .collect()
    }

    // ── Parameters and labels ──────────────────────────────────────────

    /// Declare `descriptors` as a new scope and decode its body inside it.
    fn scoped<T>(
        &mut self,
        descriptors: &[ParameterDescriptor],
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<(DeclaredScope, T)> {
        let parameters = descriptors
            .iter()
            .map(|d| self.parameter(d))
            .collect::<Result<Vec<_>>>()?;
        let scope = DeclaredScope { depth: self.depth, parameters };
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        Ok((scope, result?))
    }

    fn parameter(&self, descriptor: &ParameterDescriptor) -> Result<ParameterExpr> {
        let ty = self.resolver.resolve(&descriptor.parameter_type)?;
        Ok(ParameterExpr::with_by_ref(ty, descriptor.name.as_deref(), descriptor.is_by_ref))
    }

    /// A fresh parameter for a bound use site, slot recorded; free
    /// parameters are shared by name and type.
    fn use_site(&mut self, descriptor: &ParameterDescriptor) -> Result<ParameterExpr> {
        let parameter = self.parameter(descriptor)?;
        match (descriptor.depth, descriptor.position) {
            (Some(depth), Some(position)) => {
                self.slots.insert(parameter.id(), (depth, position));
                Ok(parameter)
            }
            _ => {
                let key = (descriptor.name.clone(), parameter.ty().clone());
                Ok(self.free.entry(key).or_insert(parameter).clone())
            }
        }
    }

    fn label(&mut self, record: &LabelRecord) -> Result<LabelTarget> {
        let ty = self.resolver.resolve_optional(record.ty.as_ref())?.unwrap_or_else(Ty::void);
        let name = record.name.as_deref();
        if let Some(id) = record.id {
            if let Some(target) = self.labels.get(&id) {
                if target.name() != name || *target.ty() != ty {
                    return Err(SerializeError::invalid(
                        "Label",
                        format!("label {} is recorded with conflicting names or types", id),
                    ));
                }
                return Ok(target.clone());
            }
            let target = LabelTarget::new(ty, name);
            self.labels.insert(id, target.clone());
            return Ok(target);
        }
        Ok(match name {
            Some(name) => self
                .named_labels
                .entry((name.to_string(), ty.clone()))
                .or_insert_with(|| LabelTarget::new(ty, Some(name)))
                .clone(),
            None => LabelTarget::new(ty, None),
        })
    }

    fn optional_label(&mut self, record: Option<&LabelRecord>) -> Result<Option<LabelTarget>> {
        record.map(|r| self.label(r)).transpose()
    }
}

fn unsupported_operator(node: &str, op: NodeType) -> SerializeError {
    SerializeError::UnsupportedNodeKind { kind: format!("{} ({})", node, op) }
}
