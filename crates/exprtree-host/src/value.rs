//! Runtime values produced and consumed by the evaluator.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::eval::Scope;
use crate::expr::LambdaExpr;
use crate::ty::{names, Ty};

/// A host value.
///
/// Primitives compare structurally; objects, lists and functions compare by
/// reference, matching the reference semantics of the types they model.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Char(char),
    String(Rc<str>),
    /// An enum value: its type plus the underlying integral value.
    Enum(Ty, i64),
    Object(ObjectRef),
    /// Arrays, lists and sequences.
    List(ListRef),
    Function(Closure),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Value {
        Value::String(Rc::from(s.as_ref()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            Value::Char(c) => Some(i64::from(u32::from(*c))),
            Value::Enum(_, n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            other => other.as_i64().map(|n| n as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The dynamic type of the value; `None` for null.
    pub fn runtime_type(&self) -> Option<Ty> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(Ty::boolean()),
            Value::Int32(_) => Some(Ty::int32()),
            Value::Int64(_) => Some(Ty::int64()),
            Value::Double(_) => Some(Ty::double()),
            Value::Char(_) => Some(Ty::char()),
            Value::String(_) => Some(Ty::string()),
            Value::Enum(ty, _) => Some(ty.clone()),
            Value::Object(obj) => Some(obj.ty()),
            Value::List(list) => Some(list.ty().clone()),
            Value::Function(closure) => Some(closure.lambda.delegate_type().clone()),
        }
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self.runtime_type() {
            Some(ty) => format!("{} ({})", self, ty),
            None => "null".to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Enum(ta, a), Value::Enum(tb, b)) => ta == tb && a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int32(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int64(n)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int32(n) => write!(f, "{}", n),
            Value::Int64(n) => write!(f, "{}", n),
            Value::Double(d) => write!(f, "{}", d),
            Value::Char(c) => write!(f, "{}", c),
            Value::String(s) => write!(f, "{}", s),
            Value::Enum(ty, n) => write!(f, "{}({})", ty, n),
            Value::Object(obj) => write!(f, "{}", obj.ty()),
            Value::List(list) => {
                write!(f, "[")?;
                for (i, item) in list.items().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Function(closure) => write!(f, "{}", closure.lambda.delegate_type()),
        }
    }
}

// ── Objects ────────────────────────────────────────────────────────────

/// A mutable object with named slots for its fields and auto-properties.
#[derive(Clone)]
pub struct ObjectRef(Rc<RefCell<ObjectData>>);

pub struct ObjectData {
    pub ty: Ty,
    pub slots: FxHashMap<String, Value>,
}

impl ObjectRef {
    pub fn new(ty: Ty) -> Self {
        ObjectRef(Rc::new(RefCell::new(ObjectData { ty, slots: FxHashMap::default() })))
    }

    pub fn ty(&self) -> Ty {
        self.0.borrow().ty.clone()
    }

    pub fn get(&self, slot: &str) -> Option<Value> {
        self.0.borrow().slots.get(slot).cloned()
    }

    pub fn set(&self, slot: &str, value: Value) {
        self.0.borrow_mut().slots.insert(slot.to_string(), value);
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        let mut slots: Vec<&String> = data.slots.keys().collect();
        slots.sort();
        write!(f, "Object({} {{ {:?} }})", data.ty, slots)
    }
}

/// Build an exception object carrying a message.
pub fn exception(ty: Ty, message: &str) -> Value {
    let obj = ObjectRef::new(ty);
    obj.set("Message", Value::string(message));
    Value::Object(obj)
}

/// The message slot of an exception object, if present.
pub fn exception_message(value: &Value) -> String {
    match value {
        Value::Object(obj) => obj
            .get("Message")
            .and_then(|m| m.as_str().map(str::to_string))
            .unwrap_or_else(|| obj.ty().to_string()),
        other => other.to_string(),
    }
}

// ── Lists ──────────────────────────────────────────────────────────────

/// A shared, growable list. `ty` is the collection type (`Int32[]`,
/// `List<String>`, ...).
#[derive(Clone)]
pub struct ListRef {
    ty: Ty,
    items: Rc<RefCell<Vec<Value>>>,
}

impl ListRef {
    pub fn new(ty: Ty, items: Vec<Value>) -> Self {
        ListRef { ty, items: Rc::new(RefCell::new(items)) }
    }

    pub fn ty(&self) -> &Ty {
        &self.ty
    }

    pub fn items(&self) -> std::cell::Ref<'_, Vec<Value>> {
        self.items.borrow()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    pub fn set(&self, index: usize, value: Value) -> bool {
        match self.items.borrow_mut().get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn push(&self, value: Value) {
        self.items.borrow_mut().push(value);
    }

    /// A snapshot of the items, safe to iterate while callbacks run.
    pub fn snapshot(&self) -> Vec<Value> {
        self.items.borrow().clone()
    }

    pub fn ptr_eq(&self, other: &ListRef) -> bool {
        Rc::ptr_eq(&self.items, &other.items)
    }
}

impl fmt::Debug for ListRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "List({}, {:?})", self.ty, self.items.borrow())
    }
}

/// Create a list value of the given collection type.
pub fn list(ty: Ty, items: Vec<Value>) -> Value {
    Value::List(ListRef::new(ty, items))
}

/// Create a `List<T>` value.
pub fn list_of(item: Ty, items: Vec<Value>) -> Value {
    list(Ty::list(item), items)
}

// ── Closures ───────────────────────────────────────────────────────────

/// A lambda together with the scope it was created in.
#[derive(Clone)]
pub struct Closure {
    pub lambda: LambdaExpr,
    pub scope: Scope,
}

impl Closure {
    pub fn ptr_eq(&self, other: &Closure) -> bool {
        self.lambda.ptr_eq(&other.lambda) && self.scope.ptr_eq(&other.scope)
    }
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Closure({})", self.lambda.delegate_type())
    }
}

/// True for the primitive types the evaluator handles natively.
pub fn is_primitive(ty: &Ty) -> bool {
    matches!(
        ty.type_name().map(|n| n.full_name.as_str()),
        Some(names::BOOLEAN | names::INT32 | names::INT64 | names::DOUBLE | names::CHAR)
    )
}
