//! Tree-walking evaluator for expression graphs.
//!
//! Parameters are looked up by identity in a chain of scope frames, so a
//! use site only sees the value bound to the exact declaration it refers to.
//! Non-local control flow (jumps to labels, thrown exceptions) travels as a
//! `Flow` through the `Err` side of each step until a block, loop or try
//! handles it.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::error::EvalError;
use crate::expr::{
    CatchBlock, ElementInit, Expr, ExprKind, LabelTarget, LambdaExpr, MemberBinding, NodeType,
    ParameterExpr,
};
use crate::reflect::{MemberInfo, MethodInfo};
use crate::registry::TypeRegistry;
use crate::ty::{names, Ty};
use crate::value::{exception_message, list, Closure, ListRef, Value};

/// Calls back into the evaluator from native member bodies, e.g. to run the
/// predicate handed to a query operator.
pub trait Invoker {
    fn invoke(&mut self, function: &Value, args: &[Value]) -> Result<Value, EvalError>;
}

// ── Scopes ─────────────────────────────────────────────────────────────

/// A chain of variable frames. Frames are shared, so closures observe later
/// assignments to the variables they captured.
#[derive(Clone, Default)]
pub struct Scope(Option<Rc<ScopeFrame>>);

struct ScopeFrame {
    bindings: Vec<(ParameterExpr, RefCell<Value>)>,
    parent: Scope,
}

impl Scope {
    pub fn empty() -> Scope {
        Scope(None)
    }

    /// A child scope binding each parameter to its value.
    pub fn extend(&self, bindings: Vec<(ParameterExpr, Value)>) -> Scope {
        let bindings = bindings.into_iter().map(|(p, v)| (p, RefCell::new(v))).collect();
        Scope(Some(Rc::new(ScopeFrame { bindings, parent: self.clone() })))
    }

    fn slot(&self, parameter: &ParameterExpr) -> Option<&RefCell<Value>> {
        let frame = self.0.as_ref()?;
        frame
            .bindings
            .iter()
            .find(|(p, _)| p.ptr_eq(parameter))
            .map(|(_, slot)| slot)
            .or_else(|| frame.parent.slot(parameter))
    }

    pub fn get(&self, parameter: &ParameterExpr) -> Option<Value> {
        self.slot(parameter).map(|slot| slot.borrow().clone())
    }

    /// Assign to an existing binding; false when the parameter is unbound.
    pub fn set(&self, parameter: &ParameterExpr, value: Value) -> bool {
        match self.slot(parameter) {
            Some(slot) => {
                *slot.borrow_mut() = value;
                true
            }
            None => false,
        }
    }

    pub fn ptr_eq(&self, other: &Scope) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

// ── Control flow ───────────────────────────────────────────────────────

enum Flow {
    Error(EvalError),
    Jump { target: LabelTarget, value: Value },
    Throw(Value),
}

impl From<EvalError> for Flow {
    fn from(error: EvalError) -> Self {
        match error {
            // Exceptions escaping a native call stay catchable.
            EvalError::Unhandled { exception, .. } => Flow::Throw(exception),
            other => Flow::Error(other),
        }
    }
}

impl Flow {
    fn into_error(self) -> EvalError {
        match self {
            Flow::Error(error) => error,
            Flow::Jump { target, .. } => EvalError::UnmatchedJump {
                label: target.name().unwrap_or("UnnamedLabel").to_string(),
            },
            Flow::Throw(exception) => EvalError::Unhandled {
                message: exception_message(&exception),
                exception,
            },
        }
    }
}

type Step<T = Value> = Result<T, Flow>;

/// An assignable location.
enum Place {
    Variable(ParameterExpr),
    Member { target: Option<Value>, member: MemberInfo },
    Element { items: ListRef, index: i64 },
}

// ── Evaluator ──────────────────────────────────────────────────────────

pub struct Evaluator<'a> {
    types: &'a TypeRegistry,
    /// Exceptions being handled, innermost last; consulted by rethrow.
    caught: Vec<Value>,
}

impl<'a> Evaluator<'a> {
    pub fn new(types: &'a TypeRegistry) -> Self {
        Evaluator { types, caught: Vec::new() }
    }

    pub fn types(&self) -> &'a TypeRegistry {
        self.types
    }

    /// Evaluate a closed expression.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        self.eval(expr, &Scope::empty()).map_err(Flow::into_error)
    }

    /// Invoke a lambda with positional arguments.
    pub fn call_lambda(&mut self, lambda: &LambdaExpr, args: &[Value]) -> Result<Value, EvalError> {
        let closure = Closure { lambda: lambda.clone(), scope: Scope::empty() };
        self.call_closure(&closure, args)
    }

    fn call_closure(&mut self, closure: &Closure, args: &[Value]) -> Result<Value, EvalError> {
        let lambda = &closure.lambda;
        if lambda.parameters().len() != args.len() {
            return Err(EvalError::InvalidOperation(format!(
                "{} expects {} argument(s), found {}",
                lambda.delegate_type(),
                lambda.parameters().len(),
                args.len()
            )));
        }
        trace!(delegate = %lambda.delegate_type(), args = args.len(), "invoking lambda");
        let bindings = lambda.parameters().iter().cloned().zip(args.iter().cloned()).collect();
        let scope = closure.scope.extend(bindings);
        let value = self.eval(lambda.body(), &scope).map_err(Flow::into_error)?;
        Ok(if lambda.return_type().is_void() { Value::Null } else { value })
    }

    fn eval(&mut self, expr: &Expr, scope: &Scope) -> Step {
        let value = self.eval_kind(expr, scope)?;
        Ok(if expr.ty().is_void() { Value::Null } else { value })
    }

    fn eval_all(&mut self, exprs: &[Expr], scope: &Scope) -> Step<Vec<Value>> {
        exprs.iter().map(|e| self.eval(e, scope)).collect()
    }

    fn eval_kind(&mut self, expr: &Expr, scope: &Scope) -> Step {
        match expr.kind() {
            ExprKind::Constant(value) => Ok(value.clone()),
            ExprKind::Parameter(p) => scope.get(p).ok_or_else(|| unbound(p)),
            ExprKind::Lambda(lambda) => Ok(Value::Function(Closure {
                lambda: lambda.clone(),
                scope: scope.clone(),
            })),
            ExprKind::Binary { op, left, right, method, conversion, .. } => {
                self.binary(*op, left, right, method.as_ref(), conversion.as_ref(), scope)
            }
            ExprKind::Unary { op, operand, method } => {
                self.unary(expr, *op, operand.as_ref(), method.as_ref(), scope)
            }
            ExprKind::Conditional { test, if_true, if_false } => {
                if self.condition(test, scope)? {
                    self.eval(if_true, scope)
                } else {
                    self.eval(if_false, scope)
                }
            }
            ExprKind::Block { variables, expressions } => {
                let bindings = variables
                    .iter()
                    .map(|v| (v.clone(), self.types.default_value(v.ty())))
                    .collect();
                self.sequence(expressions, &scope.extend(bindings))
            }
            ExprKind::Call { instance, method, arguments } => {
                let receiver = match instance {
                    Some(instance) => Some(self.receiver(instance, method.name(), scope)?),
                    None => None,
                };
                let args = self.eval_all(arguments, scope)?;
                Ok(method.def().body.call(self, receiver.as_ref(), &args)?)
            }
            ExprKind::Member { expression, member } => {
                let target = match expression {
                    Some(e) => Some(self.receiver(e, member.name(), scope)?),
                    None => None,
                };
                self.read_member(target.as_ref(), member)
            }
            ExprKind::New { constructor: Some(ctor), arguments } => {
                let args = self.eval_all(arguments, scope)?;
                let instance = self.types.instantiate(ctor.declaring_type());
                match &ctor.def().body {
                    Some(body) => Ok(body.call(self, Some(&instance), &args)?),
                    None => Ok(instance),
                }
            }
            ExprKind::New { constructor: None, .. } => Ok(self.types.default_value(expr.ty())),
            ExprKind::NewArray { bounds: false, expressions } => {
                Ok(list(expr.ty().clone(), self.eval_all(expressions, scope)?))
            }
            ExprKind::NewArray { bounds: true, expressions } => {
                let [bound] = expressions.as_slice() else {
                    return Err(unsupported("multi-dimensional arrays"));
                };
                let length = self.eval(bound, scope)?;
                let length = length
                    .as_i64()
                    .ok_or_else(|| EvalError::mismatch("array bound", "integer", &length))?;
                let length = usize::try_from(length).map_err(|_| EvalError::Overflow)?;
                let element = expr.ty().element_type().cloned().unwrap_or_else(Ty::object);
                let items = vec![self.types.default_value(&element); length];
                Ok(list(expr.ty().clone(), items))
            }
            ExprKind::ListInit { new_expression, initializers } => {
                let collection = self.eval(new_expression, scope)?;
                self.add_elements(&collection, initializers, scope)?;
                Ok(collection)
            }
            ExprKind::MemberInit { new_expression, bindings } => {
                let instance = self.eval(new_expression, scope)?;
                self.apply_bindings(&instance, bindings, scope)?;
                Ok(instance)
            }
            ExprKind::Invoke { expression, arguments } => {
                let function = self.eval(expression, scope)?;
                let args = self.eval_all(arguments, scope)?;
                Ok(self.invoke(&function, &args)?)
            }
            ExprKind::Index { .. } => {
                let place = self.place(expr, scope)?;
                self.load(&place, scope)
            }
            ExprKind::Goto { target, value, .. } => {
                let value = match value {
                    Some(v) => self.eval(v, scope)?,
                    None => Value::Null,
                };
                Err(Flow::Jump { target: target.clone(), value })
            }
            ExprKind::Label { default_value, .. } => match default_value {
                Some(v) => self.eval(v, scope),
                None => Ok(Value::Null),
            },
            ExprKind::Loop { body, break_label, continue_label } => loop {
                match self.eval(body, scope) {
                    Ok(_) => {}
                    Err(Flow::Jump { target, value }) => {
                        if is_target(break_label, &target) {
                            return Ok(value);
                        }
                        if !is_target(continue_label, &target) {
                            return Err(Flow::Jump { target, value });
                        }
                    }
                    Err(other) => return Err(other),
                }
            },
            ExprKind::RuntimeVariables(variables) => {
                let values = variables
                    .iter()
                    .map(|v| scope.get(v).ok_or_else(|| unbound(v)))
                    .collect::<Step<Vec<_>>>()?;
                Ok(list(Ty::core(names::RUNTIME_VARIABLES), values))
            }
            ExprKind::Switch { switch_value, cases, default_body, comparison } => {
                let value = self.eval(switch_value, scope)?;
                for case in cases {
                    for test in &case.test_values {
                        let test = self.eval(test, scope)?;
                        let matched = match comparison {
                            Some(method) => {
                                let result = method.def().body.call(self, None, &[value.clone(), test])?;
                                result.as_bool().unwrap_or(false)
                            }
                            None => value == test,
                        };
                        if matched {
                            return self.eval(&case.body, scope);
                        }
                    }
                }
                match default_body {
                    Some(body) => self.eval(body, scope),
                    None => Ok(Value::Null),
                }
            }
            ExprKind::Try { body, handlers, finally, fault } => {
                let mut outcome = self.eval(body, scope);
                if let Err(Flow::Throw(exception)) = &outcome {
                    let exception = exception.clone();
                    if let Some(handled) = self.handle(&exception, handlers, scope)? {
                        outcome = handled;
                    } else if let Some(fault) = fault {
                        self.eval(fault, scope)?;
                    }
                }
                if let Some(finally) = finally {
                    self.eval(finally, scope)?;
                }
                outcome
            }
            ExprKind::TypeBinary { op, expression, type_operand } => {
                let value = self.eval(expression, scope)?;
                let Some(runtime) = value.runtime_type() else {
                    return Ok(Value::Bool(false));
                };
                Ok(Value::Bool(match op {
                    NodeType::TypeEqual => runtime == *type_operand,
                    _ => self.types.is_assignable(&runtime, type_operand),
                }))
            }
            ExprKind::Dynamic { delegate_type, .. } => {
                Err(unsupported(&format!("dynamic operation ({})", delegate_type)))
            }
            ExprKind::Default => Ok(self.types.default_value(expr.ty())),
            ExprKind::DebugInfo { .. } => Ok(Value::Null),
            ExprKind::Extension { name, reduced } => match reduced {
                Some(reduced) => self.eval(reduced, scope),
                None => Err(unsupported(&format!("extension node `{}`", name))),
            },
        }
    }

    /// Run block statements in order. A jump to a label that is itself one
    /// of the statements resumes right after it.
    fn sequence(&mut self, expressions: &[Expr], scope: &Scope) -> Step {
        let mut last = Value::Null;
        let mut next = 0;
        while let Some(expr) = expressions.get(next) {
            match self.eval(expr, scope) {
                Ok(value) => {
                    last = value;
                    next += 1;
                }
                Err(Flow::Jump { target, value }) => {
                    let landing = expressions.iter().position(|e| {
                        matches!(e.kind(), ExprKind::Label { target: t, .. } if t.ptr_eq(&target))
                    });
                    match landing {
                        Some(index) => {
                            last = value;
                            next = index + 1;
                        }
                        None => return Err(Flow::Jump { target, value }),
                    }
                }
                Err(other) => return Err(other),
            }
        }
        Ok(last)
    }

    fn condition(&mut self, test: &Expr, scope: &Scope) -> Step<bool> {
        let value = self.eval(test, scope)?;
        value
            .as_bool()
            .ok_or_else(|| EvalError::mismatch("condition", "Boolean", &value).into())
    }

    fn receiver(&mut self, instance: &Expr, member: &str, scope: &Scope) -> Step {
        let value = self.eval(instance, scope)?;
        if value.is_null() {
            return Err(EvalError::NullReference { context: format!("`{}`", member) }.into());
        }
        Ok(value)
    }

    /// Pick the first handler whose type and filter accept the exception and
    /// run it. `None` when no handler applies.
    fn handle(
        &mut self,
        exception: &Value,
        handlers: &[CatchBlock],
        scope: &Scope,
    ) -> Step<Option<Step>> {
        let runtime = exception.runtime_type().unwrap_or_else(Ty::object);
        for handler in handlers {
            if !self.types.is_assignable(&runtime, &handler.test) {
                continue;
            }
            let scope = match &handler.variable {
                Some(v) => scope.extend(vec![(v.clone(), exception.clone())]),
                None => scope.clone(),
            };
            if let Some(filter) = &handler.filter {
                if !self.condition(filter, &scope)? {
                    continue;
                }
            }
            self.caught.push(exception.clone());
            let outcome = self.eval(&handler.body, &scope);
            self.caught.pop();
            return Ok(Some(outcome));
        }
        Ok(None)
    }

    // ── Operators ──────────────────────────────────────────────────────

    fn binary(
        &mut self,
        op: NodeType,
        left: &Expr,
        right: &Expr,
        method: Option<&MethodInfo>,
        conversion: Option<&LambdaExpr>,
        scope: &Scope,
    ) -> Step {
        match op {
            NodeType::AndAlso => {
                return Ok(Value::Bool(self.condition(left, scope)? && self.condition(right, scope)?))
            }
            NodeType::OrElse => {
                return Ok(Value::Bool(self.condition(left, scope)? || self.condition(right, scope)?))
            }
            NodeType::Coalesce => {
                let value = self.eval(left, scope)?;
                if value.is_null() {
                    return self.eval(right, scope);
                }
                return match conversion {
                    Some(conversion) => Ok(self.call_lambda(conversion, &[value])?),
                    None => Ok(value),
                };
            }
            NodeType::Assign => {
                let place = self.place(left, scope)?;
                let value = self.eval(right, scope)?;
                self.store(&place, value.clone(), scope)?;
                return Ok(value);
            }
            _ => {}
        }
        if let Some(arithmetic) = op.compound_operator() {
            let place = self.place(left, scope)?;
            let current = self.load(&place, scope)?;
            let operand = self.eval(right, scope)?;
            let value = match method {
                Some(method) => method.def().body.call(self, None, &[current, operand])?,
                None => binary_value(arithmetic, current, operand)?,
            };
            self.store(&place, value.clone(), scope)?;
            return Ok(value);
        }
        let l = self.eval(left, scope)?;
        let r = self.eval(right, scope)?;
        match method {
            Some(method) => Ok(method.def().body.call(self, None, &[l, r])?),
            None => Ok(binary_value(op, l, r)?),
        }
    }

    fn unary(
        &mut self,
        node: &Expr,
        op: NodeType,
        operand: Option<&Expr>,
        method: Option<&MethodInfo>,
        scope: &Scope,
    ) -> Step {
        let Some(operand) = operand else {
            // Rethrow.
            return match self.caught.last() {
                Some(exception) => Err(Flow::Throw(exception.clone())),
                None => Err(EvalError::InvalidOperation("rethrow outside a catch block".into()).into()),
            };
        };
        match op {
            NodeType::Quote => {
                let lambda = operand.as_lambda().ok_or_else(|| unsupported("quote of a non-lambda"))?;
                return Ok(Value::Function(Closure { lambda: lambda.clone(), scope: scope.clone() }));
            }
            NodeType::PreIncrementAssign
            | NodeType::PreDecrementAssign
            | NodeType::PostIncrementAssign
            | NodeType::PostDecrementAssign => {
                let place = self.place(operand, scope)?;
                let old = self.load(&place, scope)?;
                let step = if matches!(op, NodeType::PreIncrementAssign | NodeType::PostIncrementAssign) {
                    NodeType::Increment
                } else {
                    NodeType::Decrement
                };
                let new = match method {
                    Some(method) => method.def().body.call(self, None, &[old.clone()])?,
                    None => unary_value(step, old.clone())?,
                };
                self.store(&place, new.clone(), scope)?;
                let pre = matches!(op, NodeType::PreIncrementAssign | NodeType::PreDecrementAssign);
                return Ok(if pre { new } else { old });
            }
            _ => {}
        }
        let value = self.eval(operand, scope)?;
        if let Some(method) = method {
            return Ok(method.def().body.call(self, None, &[value])?);
        }
        match op {
            NodeType::Throw => {
                if value.is_null() {
                    return Err(EvalError::NullReference { context: "throw".into() }.into());
                }
                Err(Flow::Throw(value))
            }
            NodeType::Convert | NodeType::ConvertChecked => {
                Ok(self.convert(value, node.ty(), op == NodeType::ConvertChecked)?)
            }
            NodeType::TypeAs => {
                let accepted = value
                    .runtime_type()
                    .is_some_and(|ty| self.types.is_assignable(&ty, node.ty()));
                Ok(if accepted { value } else { Value::Null })
            }
            NodeType::ArrayLength => match &value {
                Value::List(items) => Ok(Value::Int32(i32::try_from(items.len()).map_err(|_| EvalError::Overflow)?)),
                Value::Null => Err(EvalError::NullReference { context: "array length".into() }.into()),
                other => Err(EvalError::mismatch("array length", "array", other).into()),
            },
            NodeType::Unbox => Ok(value),
            other => Ok(unary_value(other, value)?),
        }
    }

    fn convert(&self, value: Value, to: &Ty, checked: bool) -> Result<Value, EvalError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let target = to.type_name().map(|name| name.full_name.as_str());
        let converted = match target {
            Some(names::INT32) => match value {
                Value::Double(d) if checked => Value::Int32(float_to_int(d, i32::MIN as f64, i32::MAX as f64)? as i32),
                Value::Double(d) => Value::Int32(d as i32),
                ref v => {
                    let n = integral(v, "convert to Int32")?;
                    if checked {
                        Value::Int32(i32::try_from(n).map_err(|_| EvalError::Overflow)?)
                    } else {
                        Value::Int32(n as i32)
                    }
                }
            },
            Some(names::INT64) => match value {
                Value::Double(d) if checked => Value::Int64(float_to_int(d, i64::MIN as f64, i64::MAX as f64)? as i64),
                Value::Double(d) => Value::Int64(d as i64),
                ref v => Value::Int64(integral(v, "convert to Int64")?),
            },
            Some(names::DOUBLE) => value
                .as_f64()
                .map(Value::Double)
                .ok_or_else(|| EvalError::mismatch("convert to Double", "number", &value))?,
            Some(names::CHAR) => {
                let n = integral(&value, "convert to Char")?;
                let c = u32::try_from(n).ok().and_then(char::from_u32);
                match c {
                    Some(c) => Value::Char(c),
                    None if checked => return Err(EvalError::Overflow),
                    None => Value::Char('\u{fffd}'),
                }
            }
            _ if self.types.is_enum(to) => Value::Enum(to.clone(), integral(&value, "convert to enum")?),
            // Reference and boxing conversions keep the value.
            _ => value,
        };
        Ok(converted)
    }

    // ── Members and places ─────────────────────────────────────────────

    fn read_member(&mut self, target: Option<&Value>, member: &MemberInfo) -> Step {
        let (getter, is_static) = match member {
            MemberInfo::Field(f) => (f.def().getter.as_ref(), f.is_static()),
            MemberInfo::Property(p) => (p.def().getter.as_ref(), p.is_static()),
            MemberInfo::Method(_) | MemberInfo::Constructor(_) => {
                return Err(unsupported(&format!("reading {} `{}`", member.kind(), member.name())));
            }
        };
        if let Some(getter) = getter {
            return Ok(getter.call(self, target, &[])?);
        }
        if is_static {
            return Err(unsupported(&format!("static {} `{}` without a value", member.kind(), member.name())));
        }
        match target {
            Some(Value::Object(obj)) => obj.get(member.name()).ok_or_else(|| {
                EvalError::InvalidOperation(format!("`{}` has no member `{}`", obj.ty(), member.name())).into()
            }),
            Some(other) => Err(EvalError::mismatch(member.name(), "object", other).into()),
            None => Err(EvalError::NullReference { context: format!("`{}`", member.name()) }.into()),
        }
    }

    fn write_member(&mut self, target: Option<&Value>, member: &MemberInfo, value: Value) -> Step<()> {
        let writable = match member {
            MemberInfo::Field(f) => !f.is_static(),
            MemberInfo::Property(p) => p.can_write() && !p.is_static(),
            MemberInfo::Method(_) | MemberInfo::Constructor(_) => false,
        };
        if !writable {
            return Err(EvalError::InvalidOperation(format!(
                "{} `{}` cannot be assigned",
                member.kind(),
                member.name()
            ))
            .into());
        }
        match target {
            Some(Value::Object(obj)) => {
                obj.set(member.name(), value);
                Ok(())
            }
            Some(other) => Err(EvalError::mismatch(member.name(), "object", other).into()),
            None => Err(EvalError::NullReference { context: format!("`{}`", member.name()) }.into()),
        }
    }

    fn place(&mut self, target: &Expr, scope: &Scope) -> Step<Place> {
        match target.kind() {
            ExprKind::Parameter(p) => Ok(Place::Variable(p.clone())),
            ExprKind::Member { expression, member } => {
                let target = match expression {
                    Some(e) => Some(self.receiver(e, member.name(), scope)?),
                    None => None,
                };
                Ok(Place::Member { target, member: member.clone() })
            }
            ExprKind::Index { object, arguments } => {
                let items = match self.receiver(object, "indexer", scope)? {
                    Value::List(items) => items,
                    other => return Err(EvalError::mismatch("indexer", "array or list", &other).into()),
                };
                let [index] = arguments.as_slice() else {
                    return Err(unsupported("multi-dimensional indexing"));
                };
                let index = self.eval(index, scope)?;
                let index = integral(&index, "index")?;
                Ok(Place::Element { items, index })
            }
            _ => Err(EvalError::InvalidOperation(format!("`{}` is not assignable", target)).into()),
        }
    }

    fn load(&mut self, place: &Place, scope: &Scope) -> Step {
        match place {
            Place::Variable(p) => scope.get(p).ok_or_else(|| unbound(p)),
            Place::Member { target, member } => self.read_member(target.as_ref(), member),
            Place::Element { items, index } => usize::try_from(*index)
                .ok()
                .and_then(|i| items.get(i))
                .ok_or_else(|| EvalError::IndexOutOfRange { index: *index, length: items.len() }.into()),
        }
    }

    fn store(&mut self, place: &Place, value: Value, scope: &Scope) -> Step<()> {
        match place {
            Place::Variable(p) => {
                if scope.set(p, value) {
                    Ok(())
                } else {
                    Err(unbound(p))
                }
            }
            Place::Member { target, member } => self.write_member(target.as_ref(), member, value),
            Place::Element { items, index } => {
                let stored = usize::try_from(*index).is_ok_and(|i| items.set(i, value));
                if stored {
                    Ok(())
                } else {
                    Err(EvalError::IndexOutOfRange { index: *index, length: items.len() }.into())
                }
            }
        }
    }

    fn add_elements(&mut self, collection: &Value, initializers: &[ElementInit], scope: &Scope) -> Step<()> {
        for init in initializers {
            let args = self.eval_all(&init.arguments, scope)?;
            init.add_method.def().body.call(self, Some(collection), &args)?;
        }
        Ok(())
    }

    fn apply_bindings(&mut self, instance: &Value, bindings: &[MemberBinding], scope: &Scope) -> Step<()> {
        for binding in bindings {
            match binding {
                MemberBinding::Assignment { member, expression } => {
                    let value = self.eval(expression, scope)?;
                    self.write_member(Some(instance), member, value)?;
                }
                MemberBinding::List { member, initializers } => {
                    let collection = self.read_member(Some(instance), member)?;
                    self.add_elements(&collection, initializers, scope)?;
                }
                MemberBinding::Member { member, bindings } => {
                    let nested = self.read_member(Some(instance), member)?;
                    self.apply_bindings(&nested, bindings, scope)?;
                }
            }
        }
        Ok(())
    }
}

impl Invoker for Evaluator<'_> {
    fn invoke(&mut self, function: &Value, args: &[Value]) -> Result<Value, EvalError> {
        match function {
            Value::Function(closure) => self.call_closure(closure, args),
            Value::Null => Err(EvalError::NullReference { context: "delegate invocation".into() }),
            other => Err(EvalError::mismatch("invoke", "delegate", other)),
        }
    }
}

// ── Helpers ────────────────────────────────────────────────────────────

fn unbound(p: &ParameterExpr) -> Flow {
    Flow::Error(EvalError::UnboundParameter { name: p.name().unwrap_or("_").to_string() })
}

fn unsupported(what: &str) -> Flow {
    Flow::Error(EvalError::Unsupported(what.to_string()))
}

fn is_target(label: &Option<LabelTarget>, target: &LabelTarget) -> bool {
    label.as_ref().is_some_and(|l| l.ptr_eq(target))
}

fn integral(value: &Value, operation: &str) -> Result<i64, EvalError> {
    value.as_i64().ok_or_else(|| EvalError::mismatch(operation, "integer", value))
}

fn float_to_int(d: f64, min: f64, max: f64) -> Result<f64, EvalError> {
    let t = d.trunc();
    if t.is_nan() || t < min || t > max {
        Err(EvalError::Overflow)
    } else {
        Ok(t)
    }
}

macro_rules! integer_arithmetic {
    ($name:ident, $t:ty, $wrap:expr) => {
        fn $name(op: NodeType, a: $t, b: $t) -> Result<Value, EvalError> {
            use NodeType::*;
            let checked = |r: Option<$t>| r.map($wrap).ok_or(EvalError::Overflow);
            let v = match op {
                Add => a.wrapping_add(b),
                AddChecked => return checked(a.checked_add(b)),
                Subtract => a.wrapping_sub(b),
                SubtractChecked => return checked(a.checked_sub(b)),
                Multiply => a.wrapping_mul(b),
                MultiplyChecked => return checked(a.checked_mul(b)),
                Divide | Modulo if b == 0 => return Err(EvalError::DivideByZero),
                Divide => return checked(a.checked_div(b)),
                Modulo => return checked(a.checked_rem(b)),
                And => a & b,
                Or => a | b,
                ExclusiveOr => a ^ b,
                LeftShift => a.wrapping_shl(b as u32),
                RightShift => a.wrapping_shr(b as u32),
                _ => return Err(EvalError::Unsupported(format!("`{}` on integers", op))),
            };
            Ok($wrap(v))
        }
    };
}

integer_arithmetic!(int32_arithmetic, i32, Value::Int32);
integer_arithmetic!(int64_arithmetic, i64, Value::Int64);

fn double_arithmetic(op: NodeType, a: f64, b: f64) -> Result<Value, EvalError> {
    use NodeType::*;
    Ok(Value::Double(match op {
        Add | AddChecked => a + b,
        Subtract | SubtractChecked => a - b,
        Multiply | MultiplyChecked => a * b,
        Divide => a / b,
        Modulo => a % b,
        Power => a.powf(b),
        _ => return Err(EvalError::Unsupported(format!("`{}` on Double", op))),
    }))
}

fn compare(op: NodeType, l: &Value, r: &Value) -> Result<bool, EvalError> {
    use std::cmp::Ordering;
    let ordering = match (l, r) {
        (Value::Double(_), _) | (_, Value::Double(_)) => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => return Err(EvalError::mismatch(&op.to_string(), "number", if l.as_f64().is_none() { l } else { r })),
        },
        _ => match (l.as_i64(), r.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => return Err(EvalError::mismatch(&op.to_string(), "number", if l.as_i64().is_none() { l } else { r })),
        },
    };
    let Some(ordering) = ordering else {
        // NaN compares false.
        return Ok(false);
    };
    Ok(match op {
        NodeType::LessThan => ordering == Ordering::Less,
        NodeType::LessThanOrEqual => ordering != Ordering::Greater,
        NodeType::GreaterThan => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

/// Apply a non-short-circuiting binary operator to two values.
fn binary_value(op: NodeType, l: Value, r: Value) -> Result<Value, EvalError> {
    match op {
        NodeType::Equal => return Ok(Value::Bool(l == r)),
        NodeType::NotEqual => return Ok(Value::Bool(l != r)),
        NodeType::ArrayIndex => {
            let Value::List(items) = &l else {
                return Err(EvalError::mismatch("array index", "array", &l));
            };
            let index = integral(&r, "array index")?;
            return usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .ok_or(EvalError::IndexOutOfRange { index, length: items.len() });
        }
        op if op.is_comparison() => return Ok(Value::Bool(compare(op, &l, &r)?)),
        _ => {}
    }
    match (&l, &r) {
        (Value::Int32(a), Value::Int32(b)) => int32_arithmetic(op, *a, *b),
        (Value::Int64(a), Value::Int64(b)) => int64_arithmetic(op, *a, *b),
        (Value::Int64(a), Value::Int32(b)) if matches!(op, NodeType::LeftShift | NodeType::RightShift) => {
            int64_arithmetic(op, *a, i64::from(*b))
        }
        (Value::Double(a), Value::Double(b)) => double_arithmetic(op, *a, *b),
        (Value::Bool(a), Value::Bool(b)) => match op {
            NodeType::And => Ok(Value::Bool(*a & *b)),
            NodeType::Or => Ok(Value::Bool(*a | *b)),
            NodeType::ExclusiveOr => Ok(Value::Bool(*a ^ *b)),
            _ => Err(EvalError::mismatch(&op.to_string(), "number", &l)),
        },
        (Value::String(a), Value::String(b)) if op == NodeType::Add => {
            Ok(Value::string(format!("{}{}", a, b)))
        }
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        _ => Err(EvalError::TypeMismatch {
            operation: op.to_string(),
            expected: "operands of one numeric type".to_string(),
            found: format!("{} and {}", l.describe(), r.describe()),
        }),
    }
}

fn unary_value(op: NodeType, value: Value) -> Result<Value, EvalError> {
    use NodeType::*;
    let result = match (op, &value) {
        (Negate, Value::Int32(n)) => Value::Int32(n.wrapping_neg()),
        (NegateChecked, Value::Int32(n)) => Value::Int32(n.checked_neg().ok_or(EvalError::Overflow)?),
        (Negate, Value::Int64(n)) => Value::Int64(n.wrapping_neg()),
        (NegateChecked, Value::Int64(n)) => Value::Int64(n.checked_neg().ok_or(EvalError::Overflow)?),
        (Negate | NegateChecked, Value::Double(d)) => Value::Double(-d),
        (UnaryPlus, _) => value.clone(),
        (Not, Value::Bool(b)) => Value::Bool(!b),
        (IsTrue, Value::Bool(b)) => Value::Bool(*b),
        (IsFalse, Value::Bool(b)) => Value::Bool(!b),
        (Not | OnesComplement, Value::Int32(n)) => Value::Int32(!n),
        (Not | OnesComplement, Value::Int64(n)) => Value::Int64(!n),
        (Increment, Value::Int32(n)) => Value::Int32(n.wrapping_add(1)),
        (Increment, Value::Int64(n)) => Value::Int64(n.wrapping_add(1)),
        (Increment, Value::Double(d)) => Value::Double(d + 1.0),
        (Decrement, Value::Int32(n)) => Value::Int32(n.wrapping_sub(1)),
        (Decrement, Value::Int64(n)) => Value::Int64(n.wrapping_sub(1)),
        (Decrement, Value::Double(d)) => Value::Double(d - 1.0),
        (_, Value::Null) => Value::Null,
        _ => return Err(EvalError::mismatch(&op.to_string(), "a numeric or Boolean operand", &value)),
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::GotoKind;

    fn int(n: i32) -> Expr {
        Expr::constant(Value::Int32(n), Ty::int32())
    }

    fn run(expr: &Expr) -> Result<Value, EvalError> {
        let types = TypeRegistry::with_core_library();
        Evaluator::new(&types).evaluate(expr)
    }

    #[test]
    fn unchecked_arithmetic_wraps_and_checked_overflows() {
        let wrapped = Expr::binary(NodeType::Add, int(i32::MAX), int(1)).unwrap();
        assert_eq!(run(&wrapped).unwrap(), Value::Int32(i32::MIN));

        let checked = Expr::binary(NodeType::AddChecked, int(i32::MAX), int(1)).unwrap();
        assert!(matches!(run(&checked), Err(EvalError::Overflow)));
    }

    #[test]
    fn division_by_zero_is_reported() {
        let div = Expr::binary(NodeType::Divide, int(1), int(0)).unwrap();
        assert!(matches!(run(&div), Err(EvalError::DivideByZero)));
    }

    #[test]
    fn and_also_short_circuits() {
        let boom = Expr::binary(
            NodeType::Equal,
            Expr::binary(NodeType::Divide, int(1), int(0)).unwrap(),
            int(0),
        )
        .unwrap();
        let f = Expr::constant(Value::Bool(false), Ty::boolean());
        let expr = Expr::binary(NodeType::AndAlso, f, boom).unwrap();
        assert_eq!(run(&expr).unwrap(), Value::Bool(false));
    }

    #[test]
    fn lambda_parameters_bind_by_identity() {
        let x = ParameterExpr::named(Ty::int32(), "x");
        let impostor = ParameterExpr::named(Ty::int32(), "x");
        let types = TypeRegistry::with_core_library();
        let mut evaluator = Evaluator::new(&types);

        let good = LambdaExpr::new(Expr::parameter(&x), vec![x.clone()]).unwrap();
        assert_eq!(evaluator.call_lambda(&good, &[Value::Int32(7)]).unwrap(), Value::Int32(7));

        let bad = LambdaExpr::new(Expr::parameter(&impostor), vec![x]).unwrap();
        assert!(matches!(
            evaluator.call_lambda(&bad, &[Value::Int32(7)]),
            Err(EvalError::UnboundParameter { name }) if name == "x"
        ));
    }

    #[test]
    fn loop_breaks_with_value() {
        let i = ParameterExpr::named(Ty::int32(), "i");
        let exit = LabelTarget::new(Ty::int32(), Some("exit"));
        let body = Expr::condition(
            Expr::binary(NodeType::LessThan, Expr::parameter(&i), int(5)).unwrap(),
            Expr::unary(NodeType::PreIncrementAssign, Expr::parameter(&i)).unwrap(),
            Expr::make_goto(GotoKind::Break, exit.clone(), Some(Expr::parameter(&i)), Some(Ty::int32())),
            Some(Ty::int32()),
        )
        .unwrap();
        let block = Expr::block(vec![i], vec![Expr::make_loop(body, Some(exit), None)], None).unwrap();
        assert_eq!(run(&block).unwrap(), Value::Int32(5));
    }

    #[test]
    fn jump_to_label_in_block_skips_statements() {
        let x = ParameterExpr::named(Ty::int32(), "x");
        let done = LabelTarget::new(Ty::void(), Some("done"));
        let block = Expr::block(
            vec![x.clone()],
            vec![
                Expr::make_goto(GotoKind::Goto, done.clone(), None, None),
                Expr::binary(NodeType::Assign, Expr::parameter(&x), int(9)).unwrap(),
                Expr::label(done, None),
                Expr::parameter(&x),
            ],
            None,
        )
        .unwrap();
        assert_eq!(run(&block).unwrap(), Value::Int32(0));
    }

    #[test]
    fn unmatched_jump_is_an_error() {
        let nowhere = LabelTarget::new(Ty::void(), Some("nowhere"));
        let jump = Expr::make_goto(GotoKind::Goto, nowhere, None, None);
        assert!(matches!(run(&jump), Err(EvalError::UnmatchedJump { label }) if label == "nowhere"));
    }

    #[test]
    fn closures_observe_later_assignments() {
        let x = ParameterExpr::named(Ty::int32(), "x");
        let f = ParameterExpr::named(Ty::func(vec![], Ty::int32()), "f");
        let read_x = LambdaExpr::new(Expr::parameter(&x), vec![]).unwrap();
        let block = Expr::block(
            vec![x.clone(), f.clone()],
            vec![
                Expr::binary(NodeType::Assign, Expr::parameter(&f), read_x.to_expr()).unwrap(),
                Expr::binary(NodeType::Assign, Expr::parameter(&x), int(3)).unwrap(),
                Expr::invoke(Expr::parameter(&f), vec![]).unwrap(),
            ],
            None,
        )
        .unwrap();
        assert_eq!(run(&block).unwrap(), Value::Int32(3));
    }
}
