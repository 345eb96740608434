//! Type definitions and the type registry.
//!
//! A `TypeDef` describes one named type: its kind, generic parameters, base
//! type, and the fields, properties, methods and constructors it declares.
//! Member bodies are native Rust closures. The `TypeRegistry` owns every
//! definition and answers reflection queries through the `TypeSystem` trait
//! (see `reflect`).

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::EvalError;
use crate::eval::Invoker;
use crate::reflect::{
    BindingFlags, ConstructorInfo, FieldInfo, MethodInfo, PropertyInfo, TypeSystem,
};
use crate::type_name::QualifiedTypeName;
use crate::ty::{names, Ty, TypeName};
use crate::value::{ObjectRef, Value};

/// Signature of a native member body: the invoker (for calling back into
/// closures), the receiver (absent for static members) and the arguments.
pub type NativeBody =
    dyn Fn(&mut dyn Invoker, Option<&Value>, &[Value]) -> Result<Value, EvalError> + Send + Sync;

/// A shareable native member body.
#[derive(Clone)]
pub struct NativeFn(Arc<NativeBody>);

impl NativeFn {
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&mut dyn Invoker, Option<&Value>, &[Value]) -> Result<Value, EvalError>
            + Send
            + Sync
            + 'static,
    {
        NativeFn(Arc::new(body))
    }

    pub fn call(
        &self,
        invoker: &mut dyn Invoker,
        instance: Option<&Value>,
        args: &[Value],
    ) -> Result<Value, EvalError> {
        (self.0)(invoker, instance, args)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native>")
    }
}

// ── Member definitions ─────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamDef {
    pub name: String,
    pub ty: Ty,
}

#[derive(Debug)]
pub struct FieldDef {
    pub name: String,
    pub field_type: Ty,
    pub is_public: bool,
    pub is_static: bool,
    /// Static fields read through a getter; instance fields live in object slots.
    pub getter: Option<NativeFn>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: Ty) -> Self {
        FieldDef {
            name: name.into(),
            field_type,
            is_public: true,
            is_static: false,
            getter: None,
        }
    }

    pub fn non_public(mut self) -> Self {
        self.is_public = false;
        self
    }

    pub fn constant(mut self, getter: NativeFn) -> Self {
        self.is_static = true;
        self.getter = Some(getter);
        self
    }
}

#[derive(Debug)]
pub struct PropertyDef {
    pub name: String,
    pub property_type: Ty,
    pub is_public: bool,
    pub is_static: bool,
    /// `None` for auto-properties backed by an object slot (read/write);
    /// `Some` for computed, read-only properties.
    pub getter: Option<NativeFn>,
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, property_type: Ty) -> Self {
        PropertyDef {
            name: name.into(),
            property_type,
            is_public: true,
            is_static: false,
            getter: None,
        }
    }

    pub fn computed(mut self, getter: NativeFn) -> Self {
        self.getter = Some(getter);
        self
    }

    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }
}

#[derive(Debug)]
pub struct MethodDef {
    pub name: String,
    pub generic_params: Vec<String>,
    pub parameters: Vec<ParamDef>,
    pub return_type: Ty,
    pub is_public: bool,
    pub is_static: bool,
    pub body: NativeFn,
}

impl MethodDef {
    /// A public instance method. Chain `as_static`, `non_public`, `param`
    /// and `generic` to refine it.
    pub fn new(name: impl Into<String>, return_type: Ty, body: NativeFn) -> Self {
        MethodDef {
            name: name.into(),
            generic_params: Vec::new(),
            parameters: Vec::new(),
            return_type,
            is_public: true,
            is_static: false,
            body,
        }
    }

    pub fn as_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn non_public(mut self) -> Self {
        self.is_public = false;
        self
    }

    pub fn param(mut self, name: impl Into<String>, ty: Ty) -> Self {
        self.parameters.push(ParamDef { name: name.into(), ty });
        self
    }

    pub fn generic(mut self, params: &[&str]) -> Self {
        self.generic_params = params.iter().map(|p| p.to_string()).collect();
        self
    }
}

#[derive(Debug)]
pub struct CtorDef {
    pub parameters: Vec<ParamDef>,
    pub is_public: bool,
    /// Receives the freshly allocated instance and returns the constructed
    /// value. `None` returns the instance unchanged.
    pub body: Option<NativeFn>,
}

impl CtorDef {
    pub fn new() -> Self {
        CtorDef { parameters: Vec::new(), is_public: true, body: None }
    }

    pub fn param(mut self, name: impl Into<String>, ty: Ty) -> Self {
        self.parameters.push(ParamDef { name: name.into(), ty });
        self
    }

    pub fn body(mut self, body: NativeFn) -> Self {
        self.body = Some(body);
        self
    }
}

impl Default for CtorDef {
    fn default() -> Self {
        CtorDef::new()
    }
}

// ── Type definitions ───────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Struct,
    Interface,
    /// Named variants with their underlying values.
    Enum(Vec<(String, i64)>),
    Delegate,
}

#[derive(Debug)]
pub struct TypeDef {
    pub name: TypeName,
    pub kind: TypeKind,
    pub generic_params: Vec<String>,
    pub base: Option<Ty>,
    pub interfaces: Vec<Ty>,
    pub fields: Vec<Arc<FieldDef>>,
    pub properties: Vec<Arc<PropertyDef>>,
    pub methods: Vec<Arc<MethodDef>>,
    pub constructors: Vec<Arc<CtorDef>>,
}

impl TypeDef {
    pub fn new(name: TypeName, kind: TypeKind) -> Self {
        TypeDef {
            name,
            kind,
            generic_params: Vec::new(),
            base: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
        }
    }

    pub fn class(name: TypeName) -> Self {
        TypeDef::new(name, TypeKind::Class).extends(Ty::object())
    }

    pub fn generic(mut self, params: &[&str]) -> Self {
        self.generic_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn extends(mut self, base: Ty) -> Self {
        self.base = Some(base);
        self
    }

    pub fn implements(mut self, interface: Ty) -> Self {
        self.interfaces.push(interface);
        self
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(Arc::new(field));
        self
    }

    pub fn property(mut self, property: PropertyDef) -> Self {
        self.properties.push(Arc::new(property));
        self
    }

    pub fn method(mut self, method: MethodDef) -> Self {
        self.methods.push(Arc::new(method));
        self
    }

    pub fn constructor(mut self, ctor: CtorDef) -> Self {
        self.constructors.push(Arc::new(ctor));
        self
    }

    /// The definition viewed as a type: open generic parameters for a
    /// generic definition.
    pub fn self_type(&self) -> Ty {
        if self.generic_params.is_empty() {
            Ty::Con(self.name.clone())
        } else {
            let params = self
                .generic_params
                .iter()
                .enumerate()
                .map(|(i, p)| Ty::type_param(p.clone(), i))
                .collect();
            Ty::App(self.name.clone(), params)
        }
    }

    pub fn is_value_type(&self) -> bool {
        matches!(self.kind, TypeKind::Struct | TypeKind::Enum(_))
    }
}

// ── Registry ───────────────────────────────────────────────────────────

/// Owner of every type definition known to the host.
///
/// Read-only once populated; definitions are shared through `Arc`, so a
/// registry can be used from several threads at once.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: FxHashMap<String, Arc<TypeDef>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the core library.
    pub fn with_core_library() -> Self {
        let mut registry = Self::new();
        crate::builtins::register_core_library(&mut registry);
        registry
    }

    pub fn register(&mut self, def: TypeDef) {
        self.types.insert(def.name.full_name.clone(), Arc::new(def));
    }

    pub fn get(&self, full_name: &str) -> Option<&Arc<TypeDef>> {
        self.types.get(full_name)
    }

    /// Look up by name; the defining module must match.
    pub fn lookup(&self, name: &TypeName) -> Option<&Arc<TypeDef>> {
        self.get(&name.full_name).filter(|def| def.name.module == name.module)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    fn enum_variants(&self, ty: &Ty) -> Option<&[(String, i64)]> {
        match &self.lookup(ty.type_name()?)?.kind {
            TypeKind::Enum(variants) => Some(variants),
            _ => None,
        }
    }

    pub fn is_enum(&self, ty: &Ty) -> bool {
        self.enum_variants(ty).is_some()
    }

    /// The value of a named enum variant.
    pub fn enum_value(&self, ty: &Ty, variant: &str) -> Option<Value> {
        self.enum_variants(ty)?
            .iter()
            .find(|(name, _)| name == variant)
            .map(|(_, value)| Value::Enum(ty.clone(), *value))
    }

    /// The name of the variant holding `value`, if any.
    pub fn enum_name(&self, ty: &Ty, value: i64) -> Option<&str> {
        self.enum_variants(ty)?
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| name.as_str())
    }

    /// The default value of a type: zero for numbers, `false`, the zero
    /// enum value, a fresh instance for structs, and null otherwise.
    pub fn default_value(&self, ty: &Ty) -> Value {
        let Some(name) = ty.type_name() else {
            return Value::Null;
        };
        match name.full_name.as_str() {
            names::BOOLEAN => return Value::Bool(false),
            names::INT32 => return Value::Int32(0),
            names::INT64 => return Value::Int64(0),
            names::DOUBLE => return Value::Double(0.0),
            names::CHAR => return Value::Char('\0'),
            _ => {}
        }
        match self.lookup(name).map(|def| &def.kind) {
            Some(TypeKind::Enum(_)) => Value::Enum(ty.clone(), 0),
            Some(TypeKind::Struct) => self.instantiate(ty),
            _ => Value::Null,
        }
    }

    /// Allocate an object of `ty` with every instance field and
    /// auto-property slot set to its default.
    pub fn instantiate(&self, ty: &Ty) -> Value {
        let obj = ObjectRef::new(ty.clone());
        for field in self.fields(ty, BindingFlags::ALL_INSTANCE) {
            obj.set(field.name(), self.default_value(field.field_type()));
        }
        for property in self.properties(ty, BindingFlags::ALL_INSTANCE) {
            if property.def().getter.is_none() {
                obj.set(property.name(), self.default_value(property.property_type()));
            }
        }
        Value::Object(obj)
    }

    /// Whether a value of type `from` can be used where `to` is expected:
    /// identity, `Object`, the base chain, or a declared interface.
    pub fn is_assignable(&self, from: &Ty, to: &Ty) -> bool {
        if from == to || *to == Ty::object() {
            return true;
        }
        let Some(def) = from.type_name().and_then(|name| self.lookup(name)) else {
            return false;
        };
        let args = from.generic_arguments();
        def.interfaces.iter().any(|i| i.substitute(args, &[]) == *to)
            || def
                .base
                .as_ref()
                .is_some_and(|base| self.is_assignable(&base.substitute(args, &[]), to))
    }

    /// Visit `ty` and then each base type, with type arguments substituted.
    /// The flag passed to `visit` is true for inherited (base) levels.
    fn walk_hierarchy(&self, ty: &Ty, mut visit: impl FnMut(&TypeDef, &Ty, bool)) {
        let mut current = Some(ty.clone());
        let mut inherited = false;
        while let Some(owner) = current {
            let Some(def) = owner.type_name().and_then(|name| self.lookup(name)) else {
                break;
            };
            visit(def.as_ref(), &owner, inherited);
            current = def
                .base
                .as_ref()
                .map(|base| base.substitute(owner.generic_arguments(), &[]));
            inherited = true;
        }
    }
}

/// Static and non-public members are not inherited.
fn visible(flags: BindingFlags, is_public: bool, is_static: bool, inherited: bool) -> bool {
    flags.matches(is_public, is_static) && !(inherited && (is_static || !is_public))
}

impl TypeSystem for TypeRegistry {
    fn find_type(&self, name: &QualifiedTypeName) -> Option<Ty> {
        let def = self.get(&name.full_name)?;
        if name.module.as_ref().is_some_and(|module| *module != def.name.module.name) {
            return None;
        }
        let mut ty = if name.type_arguments.is_empty() {
            Ty::Con(def.name.clone())
        } else {
            if def.generic_params.len() != name.type_arguments.len() {
                return None;
            }
            let args = name
                .type_arguments
                .iter()
                .map(|arg| self.find_type(arg))
                .collect::<Option<Vec<_>>>()?;
            Ty::App(def.name.clone(), args)
        };
        for _ in 0..name.array_rank {
            ty = Ty::array(ty);
        }
        Some(ty)
    }

    fn type_def(&self, ty: &Ty) -> Option<Arc<TypeDef>> {
        ty.type_name().and_then(|name| self.lookup(name)).cloned()
    }

    fn fields(&self, ty: &Ty, flags: BindingFlags) -> Vec<FieldInfo> {
        let mut out = Vec::new();
        self.walk_hierarchy(ty, |def, owner, inherited| {
            for field in &def.fields {
                if visible(flags, field.is_public, field.is_static, inherited) {
                    out.push(FieldInfo::new(field.clone(), owner.clone(), ty.clone()));
                }
            }
        });
        out
    }

    fn properties(&self, ty: &Ty, flags: BindingFlags) -> Vec<PropertyInfo> {
        let mut out = Vec::new();
        self.walk_hierarchy(ty, |def, owner, inherited| {
            for property in &def.properties {
                if visible(flags, property.is_public, property.is_static, inherited) {
                    out.push(PropertyInfo::new(property.clone(), owner.clone(), ty.clone()));
                }
            }
        });
        out
    }

    fn methods(&self, ty: &Ty, flags: BindingFlags) -> Vec<MethodInfo> {
        let mut out = Vec::new();
        self.walk_hierarchy(ty, |def, owner, inherited| {
            for method in &def.methods {
                if visible(flags, method.is_public, method.is_static, inherited) {
                    out.push(MethodInfo::new(method.clone(), owner.clone(), ty.clone()));
                }
            }
        });
        out
    }

    fn constructors(&self, ty: &Ty, flags: BindingFlags) -> Vec<ConstructorInfo> {
        let Some(def) = ty.type_name().and_then(|name| self.lookup(name)) else {
            return Vec::new();
        };
        def.constructors
            .iter()
            .filter(|ctor| flags.matches(ctor.is_public, false))
            .map(|ctor| ConstructorInfo::new(ctor.clone(), ty.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_name;

    fn registry() -> TypeRegistry {
        TypeRegistry::with_core_library()
    }

    #[test]
    fn finds_constructed_generic_types() {
        let types = registry();
        let name = type_name::parse(
            "System.Collections.Generic.List`1[[System.Int32, System.Private.CoreLib]], System.Private.CoreLib",
        )
        .unwrap();
        assert_eq!(types.find_type(&name), Some(Ty::list(Ty::int32())));
    }

    #[test]
    fn unknown_module_is_not_found() {
        let types = registry();
        let name = type_name::parse("System.Int32, Some.Other.Module").unwrap();
        assert_eq!(types.find_type(&name), None);
    }

    #[test]
    fn members_of_constructed_types_are_substituted() {
        let types = registry();
        let list = Ty::list(Ty::string());
        let add = types
            .methods(&list, BindingFlags::PUBLIC_INSTANCE)
            .into_iter()
            .find(|m| m.name() == "Add")
            .unwrap();
        assert_eq!(add.parameters()[0].parameter_type, Ty::string());
        assert_eq!(add.declaring_type(), &list);
    }

    #[test]
    fn inherited_members_report_their_declaring_type() {
        let types = registry();
        let ty = Ty::core(names::INVALID_OPERATION);
        let message = types
            .property(&ty, "Message", BindingFlags::PUBLIC_INSTANCE)
            .unwrap();
        assert_eq!(message.declaring_type(), &Ty::exception());
        assert_eq!(message.reflected_type(), &ty);
        assert!(types.is_assignable(&ty, &Ty::exception()));
        assert!(!types.is_assignable(&Ty::exception(), &ty));
    }

    #[test]
    fn list_is_assignable_to_its_sequence_interface() {
        let types = registry();
        assert!(types.is_assignable(&Ty::list(Ty::int32()), &Ty::enumerable(Ty::int32())));
        assert!(!types.is_assignable(&Ty::list(Ty::int32()), &Ty::enumerable(Ty::string())));
    }
}
