//! Validating constructors for expression nodes.
//!
//! Each factory checks the shape its node requires and computes the node's
//! result type. Invalid input yields `HostError::InvalidExpression`; no
//! malformed node is ever built.

use crate::error::HostError;
use crate::expr::{
    CatchBlock, ElementInit, Expr, ExprKind, GotoKind, LabelTarget, LambdaData, LambdaExpr,
    MemberBinding, NodeType, ParameterExpr, SwitchCase, SymbolDocument, CLEAR_DEBUG_LINE,
};
use crate::reflect::{
    BindingFlags, ConstructorInfo, MemberInfo, MethodInfo, ParameterInfo, TypeSystem,
};
use crate::ty::{names, Ty};
use crate::value::Value;

type Result<T> = std::result::Result<T, HostError>;

/// Whether an expression can appear on the left of an assignment.
fn is_writable(expr: &Expr) -> bool {
    match expr.kind() {
        ExprKind::Parameter(_) | ExprKind::Index { .. } => true,
        ExprKind::Member { member: MemberInfo::Field(_), .. } => true,
        ExprKind::Member { member: MemberInfo::Property(p), .. } => p.can_write(),
        _ => false,
    }
}

fn check_arguments(node: &'static str, params: &[ParameterInfo], args: &[Expr]) -> Result<()> {
    if params.len() != args.len() {
        return Err(HostError::invalid(
            node,
            format!("expected {} argument(s), found {}", params.len(), args.len()),
        ));
    }
    Ok(())
}

fn check_receiver(node: &'static str, name: &str, instance: bool, is_static: bool) -> Result<()> {
    match (instance, is_static) {
        (true, true) => Err(HostError::invalid(
            node,
            format!("static member `{}` accessed through an instance", name),
        )),
        (false, false) => Err(HostError::invalid(
            node,
            format!("instance member `{}` accessed without an instance", name),
        )),
        _ => Ok(()),
    }
}

impl Expr {
    pub fn constant(value: Value, ty: Ty) -> Expr {
        Expr::new(ExprKind::Constant(value), ty)
    }

    pub fn parameter(parameter: &ParameterExpr) -> Expr {
        Expr::new(ExprKind::Parameter(parameter.clone()), parameter.ty().clone())
    }

    // ── Operators ──────────────────────────────────────────────────────

    pub fn binary(op: NodeType, left: Expr, right: Expr) -> Result<Expr> {
        Expr::make_binary(op, left, right, false, None, None)
    }

    pub fn make_binary(
        op: NodeType,
        left: Expr,
        right: Expr,
        lift_to_null: bool,
        method: Option<MethodInfo>,
        conversion: Option<LambdaExpr>,
    ) -> Result<Expr> {
        if !op.is_binary() {
            return Err(HostError::invalid("binary", format!("`{}` is not a binary operator", op)));
        }
        if op.is_assignment() && !is_writable(&left) {
            return Err(HostError::invalid(
                "binary",
                format!("left operand of `{}` is not assignable", op),
            ));
        }
        if let Some(method) = &method {
            if method.parameters().len() != 2 {
                return Err(HostError::invalid(
                    "binary",
                    format!("operator method `{}` must take two parameters", method.name()),
                ));
            }
        }
        let ty = if op.is_assignment() {
            left.ty().clone()
        } else if let Some(method) = &method {
            method.return_type().clone()
        } else if op.is_comparison() || matches!(op, NodeType::AndAlso | NodeType::OrElse) {
            Ty::boolean()
        } else if op == NodeType::ArrayIndex {
            left.ty()
                .element_type()
                .cloned()
                .ok_or_else(|| HostError::invalid("binary", "ArrayIndex requires an array operand"))?
        } else if op == NodeType::Coalesce {
            right.ty().clone()
        } else {
            left.ty().clone()
        };
        Ok(Expr::new(
            ExprKind::Binary { op, left, right, lift_to_null, method, conversion },
            ty,
        ))
    }

    pub fn unary(op: NodeType, operand: Expr) -> Result<Expr> {
        Expr::make_unary(op, Some(operand), None, None)
    }

    pub fn make_unary(
        op: NodeType,
        operand: Option<Expr>,
        ty: Option<Ty>,
        method: Option<MethodInfo>,
    ) -> Result<Expr> {
        use NodeType::*;
        if !op.is_unary() {
            return Err(HostError::invalid("unary", format!("`{}` is not a unary operator", op)));
        }
        let operand_ty = match &operand {
            Some(operand) => operand.ty().clone(),
            None if op == Throw => Ty::void(),
            None => {
                return Err(HostError::invalid("unary", format!("`{}` requires an operand", op)))
            }
        };
        if matches!(
            op,
            PreIncrementAssign | PreDecrementAssign | PostIncrementAssign | PostDecrementAssign
        ) && !operand.as_ref().is_some_and(is_writable)
        {
            return Err(HostError::invalid("unary", format!("operand of `{}` is not assignable", op)));
        }
        let ty = match op {
            Convert | ConvertChecked | TypeAs | Unbox => ty.ok_or_else(|| {
                HostError::invalid("unary", format!("`{}` requires a target type", op))
            })?,
            Throw => ty.unwrap_or_else(Ty::void),
            ArrayLength => {
                if operand_ty.element_type().is_none() {
                    return Err(HostError::invalid("unary", "ArrayLength requires an array operand"));
                }
                Ty::int32()
            }
            IsTrue | IsFalse => Ty::boolean(),
            _ => match &method {
                Some(method) => method.return_type().clone(),
                None => operand_ty,
            },
        };
        Ok(Expr::new(ExprKind::Unary { op, operand, method }, ty))
    }

    pub fn not(operand: Expr) -> Result<Expr> {
        Expr::unary(NodeType::Not, operand)
    }

    pub fn convert(operand: Expr, ty: Ty) -> Result<Expr> {
        Expr::make_unary(NodeType::Convert, Some(operand), Some(ty), None)
    }

    pub fn quote(lambda: &LambdaExpr) -> Expr {
        let ty = lambda.delegate_type().clone();
        Expr::new(
            ExprKind::Unary { op: NodeType::Quote, operand: Some(lambda.to_expr()), method: None },
            ty,
        )
    }

    pub fn throw(exception: Option<Expr>, ty: Ty) -> Expr {
        Expr::new(ExprKind::Unary { op: NodeType::Throw, operand: exception, method: None }, ty)
    }

    pub fn type_binary(op: NodeType, expression: Expr, type_operand: Ty) -> Result<Expr> {
        if !matches!(op, NodeType::TypeIs | NodeType::TypeEqual) {
            return Err(HostError::invalid(
                "type binary",
                format!("`{}` is not a type test operator", op),
            ));
        }
        Ok(Expr::new(ExprKind::TypeBinary { op, expression, type_operand }, Ty::boolean()))
    }

    // ── Control flow ───────────────────────────────────────────────────

    pub fn condition(test: Expr, if_true: Expr, if_false: Expr, ty: Option<Ty>) -> Result<Expr> {
        if *test.ty() != Ty::boolean() {
            return Err(HostError::invalid(
                "conditional",
                format!("test must be Boolean, found {}", test.ty()),
            ));
        }
        let ty = match ty {
            Some(ty) => ty,
            None if if_true.ty() == if_false.ty() => if_true.ty().clone(),
            None => {
                return Err(HostError::invalid(
                    "conditional",
                    format!("branch types differ: {} and {}", if_true.ty(), if_false.ty()),
                ))
            }
        };
        Ok(Expr::new(ExprKind::Conditional { test, if_true, if_false }, ty))
    }

    pub fn block(
        variables: Vec<ParameterExpr>,
        expressions: Vec<Expr>,
        ty: Option<Ty>,
    ) -> Result<Expr> {
        let last = expressions
            .last()
            .ok_or_else(|| HostError::invalid("block", "a block needs at least one expression"))?;
        let ty = ty.unwrap_or_else(|| last.ty().clone());
        Ok(Expr::new(ExprKind::Block { variables, expressions }, ty))
    }

    pub fn make_goto(
        kind: GotoKind,
        target: LabelTarget,
        value: Option<Expr>,
        ty: Option<Ty>,
    ) -> Expr {
        Expr::new(ExprKind::Goto { kind, target, value }, ty.unwrap_or_else(Ty::void))
    }

    pub fn break_to(target: &LabelTarget, value: Option<Expr>) -> Expr {
        Expr::make_goto(GotoKind::Break, target.clone(), value, None)
    }

    pub fn label(target: LabelTarget, default_value: Option<Expr>) -> Expr {
        let ty = target.ty().clone();
        Expr::new(ExprKind::Label { target, default_value }, ty)
    }

    pub fn make_loop(
        body: Expr,
        break_label: Option<LabelTarget>,
        continue_label: Option<LabelTarget>,
    ) -> Expr {
        let ty = break_label.as_ref().map(|l| l.ty().clone()).unwrap_or_else(Ty::void);
        Expr::new(ExprKind::Loop { body, break_label, continue_label }, ty)
    }

    pub fn switch(
        ty: Option<Ty>,
        switch_value: Expr,
        cases: Vec<SwitchCase>,
        default_body: Option<Expr>,
        comparison: Option<MethodInfo>,
    ) -> Result<Expr> {
        if cases.iter().any(|case| case.test_values.is_empty()) {
            return Err(HostError::invalid("switch", "every case needs at least one test value"));
        }
        if let Some(comparison) = &comparison {
            if comparison.parameters().len() != 2 || *comparison.return_type() != Ty::boolean() {
                return Err(HostError::invalid(
                    "switch",
                    "comparison must take two parameters and return Boolean",
                ));
            }
        }
        let ty = ty
            .or_else(|| cases.first().map(|case| case.body.ty().clone()))
            .or_else(|| default_body.as_ref().map(|body| body.ty().clone()))
            .unwrap_or_else(Ty::void);
        Ok(Expr::new(ExprKind::Switch { switch_value, cases, default_body, comparison }, ty))
    }

    pub fn make_try(
        ty: Option<Ty>,
        body: Expr,
        handlers: Vec<CatchBlock>,
        finally: Option<Expr>,
        fault: Option<Expr>,
    ) -> Result<Expr> {
        if fault.is_some() && (finally.is_some() || !handlers.is_empty()) {
            return Err(HostError::invalid("try", "a fault block cannot be combined with catch or finally"));
        }
        if handlers.is_empty() && finally.is_none() && fault.is_none() {
            return Err(HostError::invalid("try", "a try needs a catch, finally or fault block"));
        }
        let ty = ty.unwrap_or_else(|| body.ty().clone());
        Ok(Expr::new(ExprKind::Try { body, handlers, finally, fault }, ty))
    }

    // ── Members and calls ──────────────────────────────────────────────

    pub fn call(instance: Option<Expr>, method: MethodInfo, arguments: Vec<Expr>) -> Result<Expr> {
        if method.is_generic_method_definition() {
            return Err(HostError::invalid(
                "call",
                format!("`{}` is an open generic method definition", method.name()),
            ));
        }
        check_receiver("call", method.name(), instance.is_some(), method.is_static())?;
        check_arguments("call", method.parameters(), &arguments)?;
        let ty = method.return_type().clone();
        Ok(Expr::new(ExprKind::Call { instance, method, arguments }, ty))
    }

    pub fn member(expression: Option<Expr>, member: MemberInfo) -> Result<Expr> {
        let ty = member.value_type().cloned().ok_or_else(|| {
            HostError::invalid(
                "member access",
                format!("`{}` is a {}, not a field or property", member.name(), member.kind()),
            )
        })?;
        check_receiver("member access", member.name(), expression.is_some(), member.is_static())?;
        Ok(Expr::new(ExprKind::Member { expression, member }, ty))
    }

    /// Access a public instance property, or failing that a field, by name.
    pub fn property_or_field(types: &dyn TypeSystem, expression: Expr, name: &str) -> Result<Expr> {
        let owner = expression.ty().clone();
        let member = types
            .property(&owner, name, BindingFlags::PUBLIC_INSTANCE)
            .map(MemberInfo::Property)
            .or_else(|| {
                types
                    .field(&owner, name, BindingFlags::PUBLIC_INSTANCE)
                    .map(MemberInfo::Field)
            })
            .ok_or_else(|| {
                HostError::invalid(
                    "member access",
                    format!("`{}` has no public field or property `{}`", owner, name),
                )
            })?;
        Expr::member(Some(expression), member)
    }

    pub fn invoke(expression: Expr, arguments: Vec<Expr>) -> Result<Expr> {
        let ty = expression.ty().clone();
        let (Some(params), Some(return_type)) =
            (ty.delegate_parameter_types(), ty.delegate_return_type())
        else {
            return Err(HostError::invalid("invoke", format!("`{}` is not a delegate type", ty)));
        };
        let arity = params.len();
        if arity != arguments.len() {
            return Err(HostError::invalid(
                "invoke",
                format!("expected {} argument(s), found {}", arity, arguments.len()),
            ));
        }
        Ok(Expr::new(ExprKind::Invoke { expression, arguments }, return_type))
    }

    // ── Construction ───────────────────────────────────────────────────

    pub fn new_object(constructor: ConstructorInfo, arguments: Vec<Expr>) -> Result<Expr> {
        Expr::make_new(Some(constructor), arguments, None)
    }

    /// `constructor` is absent only for default construction of a value type,
    /// in which case `ty` names it.
    pub fn make_new(
        constructor: Option<ConstructorInfo>,
        arguments: Vec<Expr>,
        ty: Option<Ty>,
    ) -> Result<Expr> {
        let ty = match &constructor {
            Some(ctor) => {
                check_arguments("new", ctor.parameters(), &arguments)?;
                ctor.declaring_type().clone()
            }
            None => {
                if !arguments.is_empty() {
                    return Err(HostError::invalid("new", "arguments given without a constructor"));
                }
                ty.ok_or_else(|| HostError::invalid("new", "default construction needs a type"))?
            }
        };
        Ok(Expr::new(ExprKind::New { constructor, arguments }, ty))
    }

    pub fn new_array_init(element: Ty, expressions: Vec<Expr>) -> Expr {
        Expr::new(ExprKind::NewArray { bounds: false, expressions }, Ty::array(element))
    }

    pub fn new_array_bounds(element: Ty, bounds: Vec<Expr>) -> Result<Expr> {
        match bounds.as_slice() {
            [bound] if *bound.ty() == Ty::int32() || *bound.ty() == Ty::int64() => {}
            _ => {
                return Err(HostError::invalid(
                    "new array",
                    "exactly one integral bound is supported",
                ))
            }
        }
        Ok(Expr::new(ExprKind::NewArray { bounds: true, expressions: bounds }, Ty::array(element)))
    }

    pub fn list_init(new_expression: Expr, initializers: Vec<ElementInit>) -> Result<Expr> {
        if !matches!(new_expression.kind(), ExprKind::New { .. }) {
            return Err(HostError::invalid("list init", "the target must be a new expression"));
        }
        for init in &initializers {
            check_receiver("list init", init.add_method.name(), true, init.add_method.is_static())?;
            check_arguments("list init", init.add_method.parameters(), &init.arguments)?;
        }
        let ty = new_expression.ty().clone();
        Ok(Expr::new(ExprKind::ListInit { new_expression, initializers }, ty))
    }

    pub fn member_init(new_expression: Expr, bindings: Vec<MemberBinding>) -> Result<Expr> {
        if !matches!(new_expression.kind(), ExprKind::New { .. }) {
            return Err(HostError::invalid("member init", "the target must be a new expression"));
        }
        check_bindings(&bindings)?;
        let ty = new_expression.ty().clone();
        Ok(Expr::new(ExprKind::MemberInit { new_expression, bindings }, ty))
    }

    pub fn array_access(array: Expr, indexes: Vec<Expr>) -> Result<Expr> {
        let element = array
            .ty()
            .element_type()
            .cloned()
            .ok_or_else(|| HostError::invalid("index", format!("`{}` is not an array", array.ty())))?;
        if indexes.len() != 1 {
            return Err(HostError::invalid("index", "exactly one index is supported"));
        }
        Ok(Expr::new(ExprKind::Index { object: array, arguments: indexes }, element))
    }

    // ── Miscellaneous ──────────────────────────────────────────────────

    pub fn runtime_variables(variables: Vec<ParameterExpr>) -> Expr {
        Expr::new(ExprKind::RuntimeVariables(variables), Ty::core(names::RUNTIME_VARIABLES))
    }

    pub fn dynamic(delegate_type: Ty, arguments: Vec<Expr>, ty: Option<Ty>) -> Result<Expr> {
        let return_type = delegate_type.delegate_return_type().ok_or_else(|| {
            HostError::invalid("dynamic", format!("`{}` is not a delegate type", delegate_type))
        })?;
        let ty = ty.unwrap_or(return_type);
        Ok(Expr::new(ExprKind::Dynamic { delegate_type, arguments }, ty))
    }

    pub fn default(ty: Ty) -> Expr {
        Expr::new(ExprKind::Default, ty)
    }

    pub fn debug_info(
        document: SymbolDocument,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Result<Expr> {
        let clear = start_line == CLEAR_DEBUG_LINE && end_line == CLEAR_DEBUG_LINE;
        if !clear {
            if start_line == 0 || start_column == 0 || end_line < start_line {
                return Err(HostError::invalid("debug info", "invalid span"));
            }
            if end_line == start_line && end_column < start_column {
                return Err(HostError::invalid("debug info", "span ends before it starts"));
            }
        }
        Ok(Expr::new(
            ExprKind::DebugInfo { document, start_line, start_column, end_line, end_column },
            Ty::void(),
        ))
    }

    pub fn clear_debug_info(document: SymbolDocument) -> Expr {
        Expr::new(
            ExprKind::DebugInfo {
                document,
                start_line: CLEAR_DEBUG_LINE,
                start_column: 0,
                end_line: CLEAR_DEBUG_LINE,
                end_column: 0,
            },
            Ty::void(),
        )
    }

    pub fn extension(name: impl Into<String>, ty: Ty, reduced: Option<Expr>) -> Expr {
        Expr::new(ExprKind::Extension { name: name.into(), reduced }, ty)
    }
}

fn check_bindings(bindings: &[MemberBinding]) -> Result<()> {
    for binding in bindings {
        let member = binding.member();
        if member.value_type().is_none() || member.is_static() {
            return Err(HostError::invalid(
                "member init",
                format!("`{}` is not an instance field or property", member.name()),
            ));
        }
        match binding {
            MemberBinding::Assignment { .. } => {}
            MemberBinding::List { initializers, .. } => {
                for init in initializers {
                    check_arguments("member init", init.add_method.parameters(), &init.arguments)?;
                }
            }
            MemberBinding::Member { bindings, .. } => check_bindings(bindings)?,
        }
    }
    Ok(())
}

impl LambdaExpr {
    pub fn new(body: Expr, parameters: Vec<ParameterExpr>) -> Result<LambdaExpr> {
        LambdaExpr::build(None, body, None, false, parameters)
    }

    /// Build a lambda. Without an explicit delegate type one is inferred:
    /// `Action<...>` for a void body, `Func<..., TResult>` otherwise.
    pub fn build(
        delegate_type: Option<Ty>,
        body: Expr,
        name: Option<String>,
        tail_call: bool,
        parameters: Vec<ParameterExpr>,
    ) -> Result<LambdaExpr> {
        for (i, p) in parameters.iter().enumerate() {
            if parameters[..i].iter().any(|q| q.ptr_eq(p)) {
                return Err(HostError::invalid(
                    "lambda",
                    format!("parameter `{}` is declared twice", p.name().unwrap_or("_")),
                ));
            }
        }
        let delegate_type = match delegate_type {
            Some(ty) if ty.delegate_return_type().is_some() => ty,
            Some(ty) => {
                return Err(HostError::invalid("lambda", format!("`{}` is not a delegate type", ty)))
            }
            None => {
                let params: Vec<Ty> = parameters.iter().map(|p| p.ty().clone()).collect();
                if body.ty().is_void() {
                    if params.len() > 2 {
                        return Err(HostError::invalid("lambda", "no Action type for this many parameters"));
                    }
                    Ty::action(params)
                } else {
                    if params.len() > 4 {
                        return Err(HostError::invalid("lambda", "no Func type for this many parameters"));
                    }
                    Ty::func(params, body.ty().clone())
                }
            }
        };
        Ok(LambdaExpr::from_data(LambdaData { name, parameters, body, tail_call, delegate_type }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;

    fn int(n: i32) -> Expr {
        Expr::constant(Value::Int32(n), Ty::int32())
    }

    #[test]
    fn binary_result_types() {
        let sum = Expr::binary(NodeType::Add, int(1), int(2)).unwrap();
        assert_eq!(*sum.ty(), Ty::int32());
        let cmp = Expr::binary(NodeType::GreaterThan, int(1), int(2)).unwrap();
        assert_eq!(*cmp.ty(), Ty::boolean());
    }

    #[test]
    fn operator_codes_are_checked_per_node_kind() {
        assert!(Expr::binary(NodeType::Not, int(1), int(2)).is_err());
        assert!(Expr::unary(NodeType::Add, int(1)).is_err());
        assert!(Expr::type_binary(NodeType::Equal, int(1), Ty::int32()).is_err());
    }

    #[test]
    fn assignment_requires_writable_target() {
        let x = ParameterExpr::named(Ty::int32(), "x");
        assert!(Expr::binary(NodeType::Assign, Expr::parameter(&x), int(5)).is_ok());
        assert!(Expr::binary(NodeType::Assign, int(1), int(5)).is_err());
    }

    #[test]
    fn static_and_instance_access_are_distinguished() {
        let types = TypeRegistry::with_core_library();
        let length = types
            .property(&Ty::string(), "Length", BindingFlags::PUBLIC_INSTANCE)
            .map(MemberInfo::Property)
            .unwrap();
        assert!(Expr::member(None, length.clone()).is_err());
        let s = Expr::constant(Value::string("abc"), Ty::string());
        let access = Expr::member(Some(s), length).unwrap();
        assert_eq!(*access.ty(), Ty::int32());
    }

    #[test]
    fn lambda_infers_delegate_type() {
        let x = ParameterExpr::named(Ty::int32(), "x");
        let body = Expr::binary(NodeType::Multiply, Expr::parameter(&x), int(2)).unwrap();
        let lambda = LambdaExpr::new(body, vec![x.clone()]).unwrap();
        assert_eq!(*lambda.delegate_type(), Ty::func(vec![Ty::int32()], Ty::int32()));
        assert_eq!(lambda.return_type(), Ty::int32());
        assert!(LambdaExpr::new(Expr::parameter(&x), vec![x.clone(), x]).is_err());
    }

    #[test]
    fn try_rejects_fault_with_finally() {
        let body = int(1);
        assert!(Expr::make_try(None, body.clone(), vec![], Some(int(2)), Some(int(3))).is_err());
        assert!(Expr::make_try(None, body, vec![], None, None).is_err());
    }
}
