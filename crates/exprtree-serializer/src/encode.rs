//! Live graph to portable tree.

use exprtree_host::expr::CLEAR_DEBUG_LINE;
use exprtree_host::{
    CatchBlock, ElementInit, Expr, ExprKind, LabelTarget, LambdaExpr, MemberBinding, NodeType,
    ParameterExpr, TypeSystem,
};
use exprtree_portable::{
    BinaryNode, BlockNode, CatchBlockRecord, ConditionalNode, ConstantNode, DebugInfoNode,
    DefaultNode, DynamicNode, ElementInitRecord, GotoNode, IndexNode, InvokeNode, LabelNode,
    LabelRecord, LambdaNode, ListInitNode, LoopNode, MemberAccessNode, MemberBindingRecord,
    MemberInitNode, MethodCallNode, NewArrayNode, NewNode, ParameterDescriptor, PortableNode,
    RuntimeVariablesNode, SwitchCaseRecord, SwitchNode, SymbolDocumentRecord, TryNode,
    TypeBinaryNode, UnaryNode,
};
use tracing::trace;

use crate::constant::encode_constant;
use crate::error::{Result, SerializeError};
use crate::members::{describe_constructor, describe_member, describe_method};
use crate::types::describe;

/// Depth-first walker. `scopes` holds the declarations of every enclosing
/// lambda, block and catch handler, outermost first. `labels` lists label
/// targets in first-seen order; the index is the target's id.
pub(crate) struct Encoder<'t> {
    types: &'t dyn TypeSystem,
    scopes: Vec<Vec<ParameterExpr>>,
    labels: Vec<LabelTarget>,
}

impl<'t> Encoder<'t> {
    pub(crate) fn new(types: &'t dyn TypeSystem) -> Self {
        Encoder { types, scopes: Vec::new(), labels: Vec::new() }
    }

    pub(crate) fn encode(&mut self, expr: &Expr) -> Result<PortableNode> {
        trace!(node = %expr.node_type(), depth = self.scopes.len(), "encoding node");
        let ty = Some(describe(expr.ty()));
        let node = match expr.kind() {
            ExprKind::Binary { op, left, right, lift_to_null, method, conversion } => {
                PortableNode::Binary(BinaryNode {
                    node_type: *op,
                    left: self.boxed(left)?,
                    right: self.boxed(right)?,
                    lift_to_null: *lift_to_null,
                    method: method.as_ref().map(describe_method),
                    conversion: match conversion {
                        Some(lambda) => Some(Box::new(self.encode_lambda(lambda)?)),
                        None => None,
                    },
                })
            }
            ExprKind::Unary { op, operand, method } => PortableNode::Unary(UnaryNode {
                node_type: *op,
                operand: self.optional(operand.as_ref())?,
                method: method.as_ref().map(describe_method),
                ty,
            }),
            ExprKind::Constant(value) => PortableNode::Constant(ConstantNode {
                value: encode_constant(self.types, value, expr.ty())?,
                ty,
            }),
            ExprKind::Conditional { test, if_true, if_false } => {
                PortableNode::Conditional(ConditionalNode {
                    test: self.boxed(test)?,
                    if_true: self.boxed(if_true)?,
                    if_false: self.boxed(if_false)?,
                    ty,
                })
            }
            ExprKind::Block { variables, expressions } => {
                let (result, leading) = expressions
                    .split_last()
                    .ok_or_else(|| SerializeError::invalid("Block", "a block has no expressions"))?;
                let declared = self.declare(variables);
                let (expressions, result) = self.scoped(variables, |this| {
                    Ok((this.encode_all(leading)?, this.boxed(result)?))
                })?;
                PortableNode::Block(BlockNode { ty, variables: declared, expressions, result })
            }
            ExprKind::Call { instance, method, arguments } => {
                PortableNode::MethodCall(MethodCallNode {
                    instance: self.optional(instance.as_ref())?,
                    method: Some(describe_method(method)),
                    arguments: self.encode_all(arguments)?,
                    ty,
                })
            }
            ExprKind::Member { expression, member } => {
                PortableNode::MemberAccess(MemberAccessNode {
                    expression: self.optional(expression.as_ref())?,
                    member: describe_member(member),
                    ty,
                })
            }
            ExprKind::Parameter(p) => PortableNode::Parameter(self.use_site(p)),
            ExprKind::Lambda(lambda) => self.encode_lambda(lambda)?,
            ExprKind::New { constructor, arguments } => PortableNode::New(NewNode {
                constructor: constructor.as_ref().map(describe_constructor),
                arguments: self.encode_all(arguments)?,
                ty,
            }),
            ExprKind::NewArray { bounds, expressions } => PortableNode::NewArray(NewArrayNode {
                node_type: if *bounds { NodeType::NewArrayBounds } else { NodeType::NewArrayInit },
                ty: describe(expr.ty()),
                expressions: self.encode_all(expressions)?,
            }),
            ExprKind::ListInit { new_expression, initializers } => {
                PortableNode::ListInit(ListInitNode {
                    new_expression: self.boxed(new_expression)?,
                    initializers: self.element_inits(initializers)?,
                })
            }
            ExprKind::MemberInit { new_expression, bindings } => {
                PortableNode::MemberInit(MemberInitNode {
                    new_expression: self.boxed(new_expression)?,
                    bindings: self.bindings(bindings)?,
                })
            }
            ExprKind::Invoke { expression, arguments } => PortableNode::Invoke(InvokeNode {
                expression: self.boxed(expression)?,
                arguments: self.encode_all(arguments)?,
            }),
            ExprKind::Index { object, arguments } => PortableNode::Index(IndexNode {
                object: self.boxed(object)?,
                arguments: self.encode_all(arguments)?,
                ty,
            }),
            ExprKind::Goto { kind, target, value } => PortableNode::Goto(GotoNode {
                goto_kind: *kind,
                target: self.label(target),
                value: self.optional(value.as_ref())?,
                ty,
            }),
            ExprKind::Label { target, default_value } => PortableNode::Label(LabelNode {
                target: self.label(target),
                default_value: self.optional(default_value.as_ref())?,
            }),
            ExprKind::Loop { body, break_label, continue_label } => PortableNode::Loop(LoopNode {
                body: self.boxed(body)?,
                break_label: break_label.as_ref().map(|l| self.label(l)),
                continue_label: continue_label.as_ref().map(|l| self.label(l)),
            }),
            ExprKind::RuntimeVariables(variables) => {
                PortableNode::RuntimeVariables(RuntimeVariablesNode {
                    variables: variables.iter().map(|v| self.use_site(v)).collect(),
                })
            }
            ExprKind::Switch { switch_value, cases, default_body, comparison } => {
                let cases = cases
                    .iter()
                    .map(|case| {
                        Ok(SwitchCaseRecord {
                            test_values: self.encode_all(&case.test_values)?,
                            body: self.encode(&case.body)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                PortableNode::Switch(SwitchNode {
                    ty,
                    switch_value: self.boxed(switch_value)?,
                    cases,
                    default_body: self.optional(default_body.as_ref())?,
                    comparison: comparison.as_ref().map(describe_method),
                })
            }
            ExprKind::Try { body, handlers, finally, fault } => PortableNode::Try(TryNode {
                ty,
                body: self.boxed(body)?,
                handlers: handlers
                    .iter()
                    .map(|h| self.catch_block(h))
                    .collect::<Result<Vec<_>>>()?,
                finally: self.optional(finally.as_ref())?,
                fault: self.optional(fault.as_ref())?,
            }),
            ExprKind::TypeBinary { op, expression, type_operand } => {
                PortableNode::TypeBinary(TypeBinaryNode {
                    node_type: *op,
                    expression: self.boxed(expression)?,
                    type_operand: describe(type_operand),
                })
            }
            ExprKind::Dynamic { delegate_type, arguments } => PortableNode::Dynamic(DynamicNode {
                delegate_type: describe(delegate_type),
                arguments: self.encode_all(arguments)?,
                ty,
            }),
            ExprKind::Default => PortableNode::Default(DefaultNode { ty: describe(expr.ty()) }),
            ExprKind::DebugInfo { document, start_line, start_column, end_line, end_column } => {
                PortableNode::DebugInfo(DebugInfoNode {
                    document: SymbolDocumentRecord { file_name: document.file_name.clone() },
                    start_line: *start_line,
                    start_column: *start_column,
                    end_line: *end_line,
                    end_column: *end_column,
                    is_clear: *start_line == CLEAR_DEBUG_LINE,
                })
            }
            // Extensions are encoded as what they reduce to.
            ExprKind::Extension { name, reduced } => match reduced {
                Some(reduced) => self.encode(reduced)?,
                None => return Err(SerializeError::UnsupportedNodeKind { kind: name.clone() }),
            },
        };
        Ok(node)
    }

    fn boxed(&mut self, expr: &Expr) -> Result<Box<PortableNode>> {
        self.encode(expr).map(Box::new)
    }

    fn optional(&mut self, expr: Option<&Expr>) -> Result<Option<Box<PortableNode>>> {
        expr.map(|e| self.boxed(e)).transpose()
    }

    fn encode_all(&mut self, exprs: &[Expr]) -> Result<Vec<PortableNode>> {
        exprs.iter().map(|e| self.encode(e)).collect()
    }

    fn encode_lambda(&mut self, lambda: &LambdaExpr) -> Result<PortableNode> {
        let parameters = self.declare(lambda.parameters());
        let body = self.scoped(lambda.parameters(), |this| this.boxed(lambda.body()))?;
        Ok(PortableNode::Lambda(LambdaNode {
            name: lambda.name().map(str::to_string),
            parameters,
            body,
            return_type: Some(describe(&lambda.return_type())),
            ty: Some(describe(lambda.delegate_type())),
            tail_call: lambda.tail_call(),
        }))
    }

    fn catch_block(&mut self, handler: &CatchBlock) -> Result<CatchBlockRecord> {
        let declared: Vec<ParameterExpr> = handler.variable.iter().cloned().collect();
        let variable = self.declare(&declared).pop();
        let (filter, body) = self.scoped(&declared, |this| {
            let filter = match &handler.filter {
                Some(filter) => Some(this.encode(filter)?),
                None => None,
            };
            Ok((filter, this.encode(&handler.body)?))
        })?;
        Ok(CatchBlockRecord { test: describe(&handler.test), variable, filter, body })
    }

    fn element_inits(&mut self, initializers: &[ElementInit]) -> Result<Vec<ElementInitRecord>> {
        initializers
            .iter()
            .map(|init| {
                Ok(ElementInitRecord {
                    add_method: describe_method(&init.add_method),
                    arguments: self.encode_all(&init.arguments)?,
                })
            })
            .collect()
    }

    fn bindings(&mut self, bindings: &[MemberBinding]) -> Result<Vec<MemberBindingRecord>> {
        bindings
            .iter()
            .map(|binding| {
                Ok(match binding {
                    MemberBinding::Assignment { member, expression } => {
                        MemberBindingRecord::Assignment {
                            member: describe_member(member),
                            expression: self.encode(expression)?,
                        }
                    }
                    MemberBinding::List { member, initializers } => MemberBindingRecord::ListBinding {
                        member: describe_member(member),
                        initializers: self.element_inits(initializers)?,
                    },
                    MemberBinding::Member { member, bindings } => {
                        MemberBindingRecord::MemberBinding {
                            member: describe_member(member),
                            bindings: self.bindings(bindings)?,
                        }
                    }
                })
            })
            .collect()
    }

    // ── Scopes ─────────────────────────────────────────────────────────

    /// Run `f` with `declared` pushed as the innermost scope.
    fn scoped<T>(
        &mut self,
        declared: &[ParameterExpr],
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.scopes.push(declared.to_vec());
        let result = f(self);
        self.scopes.pop();
        result
    }

    /// Declarations of the scope about to be pushed.
    fn declare(&self, declared: &[ParameterExpr]) -> Vec<ParameterDescriptor> {
        let depth = self.scopes.len();
        declared
            .iter()
            .enumerate()
            .map(|(position, p)| parameter(p, Some((depth, position))))
            .collect()
    }

    /// Record for `target`, numbered by first appearance in this tree.
    fn label(&mut self, target: &LabelTarget) -> LabelRecord {
        let id = match self.labels.iter().position(|l| l.ptr_eq(target)) {
            Some(id) => id,
            None => {
                self.labels.push(target.clone());
                self.labels.len() - 1
            }
        };
        LabelRecord {
            id: Some(id),
            name: target.name().map(str::to_string),
            ty: Some(describe(target.ty())),
        }
    }

    /// A use site, pointing at the innermost declaration that is this very
    /// parameter. Free parameters carry no slot.
    fn use_site(&self, p: &ParameterExpr) -> ParameterDescriptor {
        let slot = self.scopes.iter().enumerate().rev().find_map(|(depth, scope)| {
            scope.iter().position(|d| d.ptr_eq(p)).map(|position| (depth, position))
        });
        parameter(p, slot)
    }
}

fn parameter(p: &ParameterExpr, slot: Option<(usize, usize)>) -> ParameterDescriptor {
    ParameterDescriptor {
        name: p.name().map(str::to_string),
        parameter_type: describe(p.ty()),
        position: slot.map(|(_, position)| position),
        depth: slot.map(|(depth, _)| depth),
        is_by_ref: p.is_by_ref(),
    }
}

