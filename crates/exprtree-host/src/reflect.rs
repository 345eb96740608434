//! Reflection: member handles and the `TypeSystem` query trait.
//!
//! Handles (`FieldInfo`, `PropertyInfo`, `MethodInfo`, `ConstructorInfo`)
//! pair a shared member definition with the type it was declared on and the
//! type it was looked up through. Type-level generic parameters are already
//! substituted with the reflected type's arguments.

use std::fmt;
use std::sync::Arc;

use crate::error::HostError;
use crate::registry::{CtorDef, FieldDef, MethodDef, ParamDef, PropertyDef, TypeDef};
use crate::type_name::QualifiedTypeName;
use crate::ty::Ty;

/// Member lookup filter: visibility (public / non-public) crossed with
/// binding (instance / static). A member is returned only when both of its
/// facets are enabled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BindingFlags {
    pub public: bool,
    pub non_public: bool,
    pub instance: bool,
    pub statics: bool,
}

impl BindingFlags {
    pub const PUBLIC_INSTANCE: BindingFlags =
        BindingFlags { public: true, non_public: false, instance: true, statics: false };
    pub const PUBLIC_STATIC: BindingFlags =
        BindingFlags { public: true, non_public: false, instance: false, statics: true };
    pub const ALL_INSTANCE: BindingFlags =
        BindingFlags { public: true, non_public: true, instance: true, statics: false };
    pub const ALL: BindingFlags =
        BindingFlags { public: true, non_public: true, instance: true, statics: true };

    /// Exactly the visibility and binding of one recorded member.
    pub fn exact(is_public: bool, is_static: bool) -> Self {
        BindingFlags {
            public: is_public,
            non_public: !is_public,
            instance: !is_static,
            statics: is_static,
        }
    }

    /// One visibility, both bindings.
    pub fn visibility(is_public: bool) -> Self {
        BindingFlags { public: is_public, non_public: !is_public, instance: true, statics: true }
    }

    pub fn matches(&self, is_public: bool, is_static: bool) -> bool {
        let visibility = if is_public { self.public } else { self.non_public };
        let binding = if is_static { self.statics } else { self.instance };
        visibility && binding
    }
}

/// Reflection queries over the host's types.
///
/// Implemented by `TypeRegistry`; the serializer only talks to this trait,
/// so tests can wrap a registry to hide or alter types.
pub trait TypeSystem {
    /// Locate a type by its parsed qualified name.
    fn find_type(&self, name: &QualifiedTypeName) -> Option<Ty>;

    fn type_def(&self, ty: &Ty) -> Option<Arc<TypeDef>>;

    fn fields(&self, ty: &Ty, flags: BindingFlags) -> Vec<FieldInfo>;

    fn properties(&self, ty: &Ty, flags: BindingFlags) -> Vec<PropertyInfo>;

    fn methods(&self, ty: &Ty, flags: BindingFlags) -> Vec<MethodInfo>;

    fn constructors(&self, ty: &Ty, flags: BindingFlags) -> Vec<ConstructorInfo>;

    fn field(&self, ty: &Ty, name: &str, flags: BindingFlags) -> Option<FieldInfo> {
        self.fields(ty, flags).into_iter().find(|f| f.name() == name)
    }

    fn property(&self, ty: &Ty, name: &str, flags: BindingFlags) -> Option<PropertyInfo> {
        self.properties(ty, flags).into_iter().find(|p| p.name() == name)
    }

    /// The method with this name whose parameter types are exactly
    /// `param_types` (open generic parameters included).
    fn method(
        &self,
        ty: &Ty,
        name: &str,
        flags: BindingFlags,
        param_types: &[Ty],
    ) -> Option<MethodInfo> {
        self.methods(ty, flags).into_iter().find(|m| {
            m.name() == name
                && m.parameters().len() == param_types.len()
                && m.parameters()
                    .iter()
                    .zip(param_types)
                    .all(|(p, t)| p.parameter_type == *t)
        })
    }

    fn constructor(&self, ty: &Ty, param_types: &[Ty]) -> Option<ConstructorInfo> {
        self.constructors(ty, BindingFlags::ALL_INSTANCE).into_iter().find(|c| {
            c.parameters().len() == param_types.len()
                && c.parameters()
                    .iter()
                    .zip(param_types)
                    .all(|(p, t)| p.parameter_type == *t)
        })
    }
}

/// A formal parameter of a method or constructor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterInfo {
    pub name: String,
    pub parameter_type: Ty,
    pub position: usize,
}

fn parameter_infos(params: &[ParamDef], type_args: &[Ty], method_args: &[Ty]) -> Vec<ParameterInfo> {
    params
        .iter()
        .enumerate()
        .map(|(position, p)| ParameterInfo {
            name: p.name.clone(),
            parameter_type: p.ty.substitute(type_args, method_args),
            position,
        })
        .collect()
}

// ── Fields and properties ──────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct FieldInfo {
    def: Arc<FieldDef>,
    declaring_type: Ty,
    reflected_type: Ty,
    field_type: Ty,
}

impl FieldInfo {
    pub fn new(def: Arc<FieldDef>, declaring_type: Ty, reflected_type: Ty) -> Self {
        let field_type = def.field_type.substitute(declaring_type.generic_arguments(), &[]);
        FieldInfo { def, declaring_type, reflected_type, field_type }
    }

    pub fn def(&self) -> &FieldDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn field_type(&self) -> &Ty {
        &self.field_type
    }

    pub fn is_public(&self) -> bool {
        self.def.is_public
    }

    pub fn is_static(&self) -> bool {
        self.def.is_static
    }

    pub fn declaring_type(&self) -> &Ty {
        &self.declaring_type
    }

    pub fn reflected_type(&self) -> &Ty {
        &self.reflected_type
    }
}

impl PartialEq for FieldInfo {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.def, &other.def) && self.declaring_type == other.declaring_type
    }
}

#[derive(Clone, Debug)]
pub struct PropertyInfo {
    def: Arc<PropertyDef>,
    declaring_type: Ty,
    reflected_type: Ty,
    property_type: Ty,
}

impl PropertyInfo {
    pub fn new(def: Arc<PropertyDef>, declaring_type: Ty, reflected_type: Ty) -> Self {
        let property_type = def.property_type.substitute(declaring_type.generic_arguments(), &[]);
        PropertyInfo { def, declaring_type, reflected_type, property_type }
    }

    pub fn def(&self) -> &PropertyDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn property_type(&self) -> &Ty {
        &self.property_type
    }

    pub fn is_public(&self) -> bool {
        self.def.is_public
    }

    pub fn is_static(&self) -> bool {
        self.def.is_static
    }

    pub fn can_write(&self) -> bool {
        self.def.getter.is_none()
    }

    pub fn declaring_type(&self) -> &Ty {
        &self.declaring_type
    }

    pub fn reflected_type(&self) -> &Ty {
        &self.reflected_type
    }
}

impl PartialEq for PropertyInfo {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.def, &other.def) && self.declaring_type == other.declaring_type
    }
}

// ── Methods and constructors ───────────────────────────────────────────

/// A method handle. For a generic method definition the generic arguments
/// are the open method parameters; `make_generic_method` closes it.
#[derive(Clone, Debug)]
pub struct MethodInfo {
    def: Arc<MethodDef>,
    declaring_type: Ty,
    reflected_type: Ty,
    parameters: Vec<ParameterInfo>,
    return_type: Ty,
    generic_arguments: Vec<Ty>,
    is_generic_method_definition: bool,
}

impl MethodInfo {
    pub fn new(def: Arc<MethodDef>, declaring_type: Ty, reflected_type: Ty) -> Self {
        let type_args = declaring_type.generic_arguments().to_vec();
        let parameters = parameter_infos(&def.parameters, &type_args, &[]);
        let return_type = def.return_type.substitute(&type_args, &[]);
        let generic_arguments: Vec<Ty> = def
            .generic_params
            .iter()
            .enumerate()
            .map(|(i, name)| Ty::method_param(name.clone(), i))
            .collect();
        let is_generic_method_definition = !generic_arguments.is_empty();
        MethodInfo {
            def,
            declaring_type,
            reflected_type,
            parameters,
            return_type,
            generic_arguments,
            is_generic_method_definition,
        }
    }

    /// Close a generic method definition over concrete type arguments.
    pub fn make_generic_method(&self, type_arguments: Vec<Ty>) -> Result<MethodInfo, HostError> {
        if !self.is_generic_method_definition {
            return Err(HostError::NotGenericMethodDefinition { method: self.to_string() });
        }
        if type_arguments.len() != self.generic_arguments.len() {
            return Err(HostError::GenericArity {
                method: self.to_string(),
                expected: self.generic_arguments.len(),
                found: type_arguments.len(),
            });
        }
        let type_args = self.declaring_type.generic_arguments().to_vec();
        Ok(MethodInfo {
            def: self.def.clone(),
            declaring_type: self.declaring_type.clone(),
            reflected_type: self.reflected_type.clone(),
            parameters: parameter_infos(&self.def.parameters, &type_args, &type_arguments),
            return_type: self.def.return_type.substitute(&type_args, &type_arguments),
            generic_arguments: type_arguments,
            is_generic_method_definition: false,
        })
    }

    pub fn def(&self) -> &MethodDef {
        &self.def
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }

    pub fn return_type(&self) -> &Ty {
        &self.return_type
    }

    pub fn generic_arguments(&self) -> &[Ty] {
        &self.generic_arguments
    }

    pub fn is_generic_method_definition(&self) -> bool {
        self.is_generic_method_definition
    }

    pub fn is_public(&self) -> bool {
        self.def.is_public
    }

    pub fn is_static(&self) -> bool {
        self.def.is_static
    }

    pub fn declaring_type(&self) -> &Ty {
        &self.declaring_type
    }

    pub fn reflected_type(&self) -> &Ty {
        &self.reflected_type
    }
}

impl PartialEq for MethodInfo {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.def, &other.def)
            && self.declaring_type == other.declaring_type
            && self.generic_arguments == other.generic_arguments
    }
}

impl fmt::Display for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.return_type, self.declaring_type, self.def.name)?;
        if !self.generic_arguments.is_empty() {
            let args: Vec<String> = self.generic_arguments.iter().map(Ty::to_string).collect();
            write!(f, "<{}>", args.join(", "))?;
        }
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("{} {}", p.parameter_type, p.name))
            .collect();
        write!(f, "({})", params.join(", "))
    }
}

#[derive(Clone, Debug)]
pub struct ConstructorInfo {
    def: Arc<CtorDef>,
    declaring_type: Ty,
    parameters: Vec<ParameterInfo>,
}

impl ConstructorInfo {
    pub const NAME: &'static str = ".ctor";

    pub fn new(def: Arc<CtorDef>, declaring_type: Ty) -> Self {
        let parameters = parameter_infos(&def.parameters, declaring_type.generic_arguments(), &[]);
        ConstructorInfo { def, declaring_type, parameters }
    }

    pub fn def(&self) -> &CtorDef {
        &self.def
    }

    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }

    pub fn is_public(&self) -> bool {
        self.def.is_public
    }

    pub fn declaring_type(&self) -> &Ty {
        &self.declaring_type
    }
}

impl PartialEq for ConstructorInfo {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.def, &other.def) && self.declaring_type == other.declaring_type
    }
}

// ── Members ────────────────────────────────────────────────────────────

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Property,
    Method,
    Constructor,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemberKind::Field => "field",
            MemberKind::Property => "property",
            MemberKind::Method => "method",
            MemberKind::Constructor => "constructor",
        };
        write!(f, "{}", s)
    }
}

/// Any member handle.
#[derive(Clone, Debug, PartialEq)]
pub enum MemberInfo {
    Field(FieldInfo),
    Property(PropertyInfo),
    Method(MethodInfo),
    Constructor(ConstructorInfo),
}

impl MemberInfo {
    pub fn kind(&self) -> MemberKind {
        match self {
            MemberInfo::Field(_) => MemberKind::Field,
            MemberInfo::Property(_) => MemberKind::Property,
            MemberInfo::Method(_) => MemberKind::Method,
            MemberInfo::Constructor(_) => MemberKind::Constructor,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MemberInfo::Field(f) => f.name(),
            MemberInfo::Property(p) => p.name(),
            MemberInfo::Method(m) => m.name(),
            MemberInfo::Constructor(_) => ConstructorInfo::NAME,
        }
    }

    pub fn declaring_type(&self) -> &Ty {
        match self {
            MemberInfo::Field(f) => f.declaring_type(),
            MemberInfo::Property(p) => p.declaring_type(),
            MemberInfo::Method(m) => m.declaring_type(),
            MemberInfo::Constructor(c) => c.declaring_type(),
        }
    }

    pub fn reflected_type(&self) -> &Ty {
        match self {
            MemberInfo::Field(f) => f.reflected_type(),
            MemberInfo::Property(p) => p.reflected_type(),
            MemberInfo::Method(m) => m.reflected_type(),
            MemberInfo::Constructor(c) => c.declaring_type(),
        }
    }

    pub fn is_static(&self) -> bool {
        match self {
            MemberInfo::Field(f) => f.is_static(),
            MemberInfo::Property(p) => p.is_static(),
            MemberInfo::Method(m) => m.is_static(),
            MemberInfo::Constructor(_) => false,
        }
    }

    /// Type of the value read through a field or property.
    pub fn value_type(&self) -> Option<&Ty> {
        match self {
            MemberInfo::Field(f) => Some(f.field_type()),
            MemberInfo::Property(p) => Some(p.property_type()),
            MemberInfo::Method(_) | MemberInfo::Constructor(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;

    #[test]
    fn binding_flags_require_both_facets() {
        let flags = BindingFlags::exact(true, false);
        assert!(flags.matches(true, false));
        assert!(!flags.matches(true, true));
        assert!(!flags.matches(false, false));
        assert!(BindingFlags::visibility(false).matches(false, true));
    }

    #[test]
    fn make_generic_method_closes_signature() {
        let types = TypeRegistry::with_core_library();
        let enumerable = Ty::linq_enumerable();
        let any = types
            .methods(&enumerable, BindingFlags::PUBLIC_STATIC)
            .into_iter()
            .find(|m| m.name() == "Any" && m.parameters().len() == 2)
            .unwrap();
        assert!(any.is_generic_method_definition());

        let closed = any.make_generic_method(vec![Ty::string()]).unwrap();
        assert!(!closed.is_generic_method_definition());
        assert_eq!(closed.parameters()[0].parameter_type, Ty::enumerable(Ty::string()));
        assert_eq!(
            closed.parameters()[1].parameter_type,
            Ty::func(vec![Ty::string()], Ty::boolean())
        );
        assert_eq!(
            any.make_generic_method(vec![]),
            Err(HostError::GenericArity {
                method: any.to_string(),
                expected: 1,
                found: 0
            })
        );
    }
}
