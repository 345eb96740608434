//! Pure rebuilding of expression trees with parameter substitution.
//!
//! `Expr::rewrite_parameters` walks a tree and asks a substitution function
//! about every parameter it meets (declarations and use sites alike).
//! Subtrees in which nothing changed are shared with the input, not copied.

use crate::expr::{
    CatchBlock, ElementInit, Expr, ExprKind, LambdaData, LambdaExpr, MemberBinding,
    ParameterExpr, SwitchCase,
};

type Substitute<'f> = dyn FnMut(&ParameterExpr) -> Option<ParameterExpr> + 'f;

impl Expr {
    /// Rebuild the tree, replacing each parameter for which `substitute`
    /// returns a replacement.
    pub fn rewrite_parameters(
        &self,
        substitute: &mut dyn FnMut(&ParameterExpr) -> Option<ParameterExpr>,
    ) -> Expr {
        let mut rewriter = Rewriter { substitute };
        rewriter.expr(self).unwrap_or_else(|| self.clone())
    }
}

impl LambdaExpr {
    /// Rebuild the lambda; see `Expr::rewrite_parameters`.
    pub fn rewrite_parameters(
        &self,
        substitute: &mut dyn FnMut(&ParameterExpr) -> Option<ParameterExpr>,
    ) -> LambdaExpr {
        let mut rewriter = Rewriter { substitute };
        rewriter.lambda(self).unwrap_or_else(|| self.clone())
    }
}

struct Rewriter<'a, 'f> {
    substitute: &'a mut Substitute<'f>,
}

/// Keep `original` unless `changed` produced something new.
fn or_keep<T: Clone>(changed: Option<T>, original: &T) -> T {
    changed.unwrap_or_else(|| original.clone())
}

impl Rewriter<'_, '_> {
    fn param(&mut self, p: &ParameterExpr) -> Option<ParameterExpr> {
        (self.substitute)(p).filter(|replacement| !replacement.ptr_eq(p))
    }

    fn params(&mut self, params: &[ParameterExpr]) -> Option<Vec<ParameterExpr>> {
        let rewritten: Vec<Option<ParameterExpr>> = params.iter().map(|p| self.param(p)).collect();
        if rewritten.iter().all(Option::is_none) {
            return None;
        }
        Some(rewritten.into_iter().zip(params).map(|(new, old)| or_keep(new, old)).collect())
    }

    fn exprs(&mut self, exprs: &[Expr]) -> Option<Vec<Expr>> {
        let rewritten: Vec<Option<Expr>> = exprs.iter().map(|e| self.expr(e)).collect();
        if rewritten.iter().all(Option::is_none) {
            return None;
        }
        Some(rewritten.into_iter().zip(exprs).map(|(new, old)| or_keep(new, old)).collect())
    }

    fn opt(&mut self, expr: &Option<Expr>) -> Option<Option<Expr>> {
        expr.as_ref().and_then(|e| self.expr(e)).map(Some)
    }

    fn lambda(&mut self, lambda: &LambdaExpr) -> Option<LambdaExpr> {
        let parameters = self.params(lambda.parameters());
        let body = self.expr(lambda.body());
        if parameters.is_none() && body.is_none() {
            return None;
        }
        Some(LambdaExpr::from_data(LambdaData {
            name: lambda.name().map(str::to_string),
            parameters: parameters.unwrap_or_else(|| lambda.parameters().to_vec()),
            body: or_keep(body, lambda.body()),
            tail_call: lambda.tail_call(),
            delegate_type: lambda.delegate_type().clone(),
        }))
    }

    fn inits(&mut self, inits: &[ElementInit]) -> Option<Vec<ElementInit>> {
        let rewritten: Vec<Option<Vec<Expr>>> =
            inits.iter().map(|init| self.exprs(&init.arguments)).collect();
        if rewritten.iter().all(Option::is_none) {
            return None;
        }
        Some(
            rewritten
                .into_iter()
                .zip(inits)
                .map(|(args, init)| ElementInit {
                    add_method: init.add_method.clone(),
                    arguments: or_keep(args, &init.arguments),
                })
                .collect(),
        )
    }

    fn bindings(&mut self, bindings: &[MemberBinding]) -> Option<Vec<MemberBinding>> {
        let rewritten: Vec<Option<MemberBinding>> = bindings
            .iter()
            .map(|binding| match binding {
                MemberBinding::Assignment { member, expression } => {
                    self.expr(expression).map(|expression| MemberBinding::Assignment {
                        member: member.clone(),
                        expression,
                    })
                }
                MemberBinding::List { member, initializers } => {
                    self.inits(initializers).map(|initializers| MemberBinding::List {
                        member: member.clone(),
                        initializers,
                    })
                }
                MemberBinding::Member { member, bindings } => {
                    self.bindings(bindings).map(|bindings| MemberBinding::Member {
                        member: member.clone(),
                        bindings,
                    })
                }
            })
            .collect();
        if rewritten.iter().all(Option::is_none) {
            return None;
        }
        Some(rewritten.into_iter().zip(bindings).map(|(new, old)| or_keep(new, old)).collect())
    }

    fn handlers(&mut self, handlers: &[CatchBlock]) -> Option<Vec<CatchBlock>> {
        let rewritten: Vec<Option<CatchBlock>> = handlers
            .iter()
            .map(|h| {
                let variable = h.variable.as_ref().and_then(|v| self.param(v));
                let body = self.expr(&h.body);
                let filter = self.opt(&h.filter);
                if variable.is_none() && body.is_none() && filter.is_none() {
                    return None;
                }
                Some(CatchBlock {
                    test: h.test.clone(),
                    variable: variable.or_else(|| h.variable.clone()),
                    body: or_keep(body, &h.body),
                    filter: or_keep(filter, &h.filter),
                })
            })
            .collect();
        if rewritten.iter().all(Option::is_none) {
            return None;
        }
        Some(rewritten.into_iter().zip(handlers).map(|(new, old)| or_keep(new, old)).collect())
    }

    fn cases(&mut self, cases: &[SwitchCase]) -> Option<Vec<SwitchCase>> {
        let rewritten: Vec<Option<SwitchCase>> = cases
            .iter()
            .map(|case| {
                let tests = self.exprs(&case.test_values);
                let body = self.expr(&case.body);
                if tests.is_none() && body.is_none() {
                    return None;
                }
                Some(SwitchCase {
                    test_values: or_keep(tests, &case.test_values),
                    body: or_keep(body, &case.body),
                })
            })
            .collect();
        if rewritten.iter().all(Option::is_none) {
            return None;
        }
        Some(rewritten.into_iter().zip(cases).map(|(new, old)| or_keep(new, old)).collect())
    }

    /// `None` when the subtree is unchanged.
    fn expr(&mut self, expr: &Expr) -> Option<Expr> {
        let kind = match expr.kind() {
            ExprKind::Parameter(p) => ExprKind::Parameter(self.param(p)?),
            ExprKind::Binary { op, left, right, lift_to_null, method, conversion } => {
                let (l, r) = (self.expr(left), self.expr(right));
                let c = conversion.as_ref().and_then(|c| self.lambda(c));
                if l.is_none() && r.is_none() && c.is_none() {
                    return None;
                }
                ExprKind::Binary {
                    op: *op,
                    left: or_keep(l, left),
                    right: or_keep(r, right),
                    lift_to_null: *lift_to_null,
                    method: method.clone(),
                    conversion: c.or_else(|| conversion.clone()),
                }
            }
            ExprKind::Unary { op, operand, method } => ExprKind::Unary {
                op: *op,
                operand: self.opt(operand)?,
                method: method.clone(),
            },
            ExprKind::Conditional { test, if_true, if_false } => {
                let (t, a, b) = (self.expr(test), self.expr(if_true), self.expr(if_false));
                if t.is_none() && a.is_none() && b.is_none() {
                    return None;
                }
                ExprKind::Conditional {
                    test: or_keep(t, test),
                    if_true: or_keep(a, if_true),
                    if_false: or_keep(b, if_false),
                }
            }
            ExprKind::Block { variables, expressions } => {
                let (v, e) = (self.params(variables), self.exprs(expressions));
                if v.is_none() && e.is_none() {
                    return None;
                }
                ExprKind::Block {
                    variables: or_keep(v, variables),
                    expressions: or_keep(e, expressions),
                }
            }
            ExprKind::Call { instance, method, arguments } => {
                let (i, a) = (self.opt(instance), self.exprs(arguments));
                if i.is_none() && a.is_none() {
                    return None;
                }
                ExprKind::Call {
                    instance: or_keep(i, instance),
                    method: method.clone(),
                    arguments: or_keep(a, arguments),
                }
            }
            ExprKind::Member { expression, member } => ExprKind::Member {
                expression: self.opt(expression)?,
                member: member.clone(),
            },
            ExprKind::Lambda(lambda) => ExprKind::Lambda(self.lambda(lambda)?),
            ExprKind::New { constructor, arguments } => ExprKind::New {
                constructor: constructor.clone(),
                arguments: self.exprs(arguments)?,
            },
            ExprKind::NewArray { bounds, expressions } => ExprKind::NewArray {
                bounds: *bounds,
                expressions: self.exprs(expressions)?,
            },
            ExprKind::ListInit { new_expression, initializers } => {
                let (n, i) = (self.expr(new_expression), self.inits(initializers));
                if n.is_none() && i.is_none() {
                    return None;
                }
                ExprKind::ListInit {
                    new_expression: or_keep(n, new_expression),
                    initializers: or_keep(i, initializers),
                }
            }
            ExprKind::MemberInit { new_expression, bindings } => {
                let (n, b) = (self.expr(new_expression), self.bindings(bindings));
                if n.is_none() && b.is_none() {
                    return None;
                }
                ExprKind::MemberInit {
                    new_expression: or_keep(n, new_expression),
                    bindings: or_keep(b, bindings),
                }
            }
            ExprKind::Invoke { expression, arguments } => {
                let (e, a) = (self.expr(expression), self.exprs(arguments));
                if e.is_none() && a.is_none() {
                    return None;
                }
                ExprKind::Invoke {
                    expression: or_keep(e, expression),
                    arguments: or_keep(a, arguments),
                }
            }
            ExprKind::Index { object, arguments } => {
                let (o, a) = (self.expr(object), self.exprs(arguments));
                if o.is_none() && a.is_none() {
                    return None;
                }
                ExprKind::Index { object: or_keep(o, object), arguments: or_keep(a, arguments) }
            }
            ExprKind::Goto { kind, target, value } => ExprKind::Goto {
                kind: *kind,
                target: target.clone(),
                value: self.opt(value)?,
            },
            ExprKind::Label { target, default_value } => ExprKind::Label {
                target: target.clone(),
                default_value: self.opt(default_value)?,
            },
            ExprKind::Loop { body, break_label, continue_label } => ExprKind::Loop {
                body: self.expr(body)?,
                break_label: break_label.clone(),
                continue_label: continue_label.clone(),
            },
            ExprKind::RuntimeVariables(variables) => {
                ExprKind::RuntimeVariables(self.params(variables)?)
            }
            ExprKind::Switch { switch_value, cases, default_body, comparison } => {
                let v = self.expr(switch_value);
                let c = self.cases(cases);
                let d = self.opt(default_body);
                if v.is_none() && c.is_none() && d.is_none() {
                    return None;
                }
                ExprKind::Switch {
                    switch_value: or_keep(v, switch_value),
                    cases: or_keep(c, cases),
                    default_body: or_keep(d, default_body),
                    comparison: comparison.clone(),
                }
            }
            ExprKind::Try { body, handlers, finally, fault } => {
                let b = self.expr(body);
                let h = self.handlers(handlers);
                let fi = self.opt(finally);
                let fa = self.opt(fault);
                if b.is_none() && h.is_none() && fi.is_none() && fa.is_none() {
                    return None;
                }
                ExprKind::Try {
                    body: or_keep(b, body),
                    handlers: or_keep(h, handlers),
                    finally: or_keep(fi, finally),
                    fault: or_keep(fa, fault),
                }
            }
            ExprKind::TypeBinary { op, expression, type_operand } => ExprKind::TypeBinary {
                op: *op,
                expression: self.expr(expression)?,
                type_operand: type_operand.clone(),
            },
            ExprKind::Dynamic { delegate_type, arguments } => ExprKind::Dynamic {
                delegate_type: delegate_type.clone(),
                arguments: self.exprs(arguments)?,
            },
            ExprKind::Extension { name, reduced } => ExprKind::Extension {
                name: name.clone(),
                reduced: self.opt(reduced)?,
            },
            ExprKind::Constant(_) | ExprKind::Default | ExprKind::DebugInfo { .. } => return None,
        };
        Some(Expr::new(kind, expr.ty().clone()))
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::{Expr, ExprKind, NodeType, ParameterExpr};
    use crate::ty::Ty;
    use crate::value::Value;

    #[test]
    fn substitutes_every_matching_occurrence() {
        let stale = ParameterExpr::named(Ty::int32(), "x");
        let canonical = ParameterExpr::named(Ty::int32(), "x");
        let sum = Expr::binary(NodeType::Add, Expr::parameter(&stale), Expr::parameter(&stale))
            .unwrap();

        let rewritten =
            sum.rewrite_parameters(&mut |p| p.ptr_eq(&stale).then(|| canonical.clone()));

        let mut seen = Vec::new();
        rewritten.walk(&mut |e| {
            if let Some(p) = e.as_parameter() {
                seen.push(p.clone());
            }
        });
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|p| p.ptr_eq(&canonical)));
    }

    #[test]
    fn unchanged_trees_are_shared() {
        let x = ParameterExpr::named(Ty::int32(), "x");
        let one = Expr::constant(Value::Int32(1), Ty::int32());
        let sum = Expr::binary(NodeType::Add, Expr::parameter(&x), one).unwrap();
        let rewritten = sum.rewrite_parameters(&mut |_| None);
        assert!(rewritten.ptr_eq(&sum));
        assert!(matches!(rewritten.kind(), ExprKind::Binary { .. }));
    }
}
