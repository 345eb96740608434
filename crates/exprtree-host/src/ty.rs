//! Runtime type representation for the exprtree host.
//!
//! Defines the core `Ty` enum, type names (`TypeName`), defining-module
//! identities (`ModuleIdentity`) and generic parameters (`GenericParam`).
//! Every value, member and expression node in the host is typed with a `Ty`.

use std::fmt;

/// Identity of the module (assembly) that defines a type.
///
/// Only `name` takes part in equality and hashing. Version, culture and
/// public key token are carried for the fully qualified display form and are
/// ignored when two identities are compared, so a reference produced against
/// one build of a module still names the same type in another.
#[derive(Clone, Debug)]
pub struct ModuleIdentity {
    pub name: String,
    pub version: String,
    pub culture: String,
    pub public_key_token: Option<String>,
}

impl PartialEq for ModuleIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name // version metadata excluded
    }
}

impl Eq for ModuleIdentity {}

impl std::hash::Hash for ModuleIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl ModuleIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        ModuleIdentity {
            name: name.into(),
            version: "1.0.0.0".to_string(),
            culture: "neutral".to_string(),
            public_key_token: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_public_key_token(mut self, token: impl Into<String>) -> Self {
        self.public_key_token = Some(token.into());
        self
    }

    /// The module holding the primitive and collection types.
    pub fn core_library() -> Self {
        ModuleIdentity::new(CORE_LIBRARY)
            .with_version("9.0.0.0")
            .with_public_key_token("7cec85d7bea7798e")
    }

    /// The module holding the sequence query operators.
    pub fn linq() -> Self {
        ModuleIdentity::new(LINQ_LIBRARY)
            .with_version("9.0.0.0")
            .with_public_key_token("b03f5f7f11d50a3a")
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, Version={}, Culture={}, PublicKeyToken={}",
            self.name,
            self.version,
            self.culture,
            self.public_key_token.as_deref().unwrap_or("null")
        )
    }
}

pub const CORE_LIBRARY: &str = "System.Private.CoreLib";
pub const LINQ_LIBRARY: &str = "System.Linq";

/// Well-known type names registered by the core library.
pub mod names {
    pub const OBJECT: &str = "System.Object";
    pub const VOID: &str = "System.Void";
    pub const BOOLEAN: &str = "System.Boolean";
    pub const INT32: &str = "System.Int32";
    pub const INT64: &str = "System.Int64";
    pub const DOUBLE: &str = "System.Double";
    pub const CHAR: &str = "System.Char";
    pub const STRING: &str = "System.String";
    pub const EXCEPTION: &str = "System.Exception";
    pub const INVALID_OPERATION: &str = "System.InvalidOperationException";
    pub const MATH: &str = "System.Math";
    pub const ENUMERABLE_OF_T: &str = "System.Collections.Generic.IEnumerable`1";
    pub const LIST_OF_T: &str = "System.Collections.Generic.List`1";
    pub const RUNTIME_VARIABLES: &str = "System.Runtime.CompilerServices.IRuntimeVariables";
    pub const LINQ_ENUMERABLE: &str = "System.Linq.Enumerable";
    pub const FUNC_PREFIX: &str = "System.Func`";
    pub const ACTION: &str = "System.Action";
}

/// A named type: full (namespace-qualified) name plus its defining module.
///
/// For generic types the full name carries the arity suffix, e.g.
/// ``System.Collections.Generic.List`1``.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeName {
    pub full_name: String,
    pub module: ModuleIdentity,
}

impl TypeName {
    pub fn new(full_name: impl Into<String>, module: ModuleIdentity) -> Self {
        TypeName { full_name: full_name.into(), module }
    }

    pub fn core(full_name: impl Into<String>) -> Self {
        TypeName::new(full_name, ModuleIdentity::core_library())
    }

    /// Number of generic parameters encoded in the name's arity suffix.
    pub fn arity(&self) -> usize {
        generic_arity(&self.full_name)
    }

    /// The unqualified name without namespace and arity suffix.
    pub fn short_name(&self) -> &str {
        let name = self
            .full_name
            .rsplit_once('.')
            .map(|(_, short)| short)
            .unwrap_or(&self.full_name);
        name.split('`').next().unwrap_or(name)
    }
}

/// Parse the arity suffix of a generic type name (``List`1`` -> 1).
pub fn generic_arity(full_name: &str) -> usize {
    full_name
        .rsplit_once('`')
        .and_then(|(_, n)| n.parse().ok())
        .unwrap_or(0)
}

/// Whether a generic parameter belongs to a type or to a method.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParamOwner {
    Type,
    Method,
}

/// An unbound generic parameter such as `T` or `TSource`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GenericParam {
    pub name: String,
    pub position: usize,
    pub owner: ParamOwner,
}

/// A host type.
///
/// - `Con`: a named type; for a generic type this is its open definition
/// - `App`: a generic type applied to arguments: `List<Int32>`
/// - `Array`: a single-dimension array
/// - `Param`: a generic parameter of a type or a method
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ty {
    Con(TypeName),
    App(TypeName, Vec<Ty>),
    Array(Box<Ty>),
    Param(GenericParam),
}

impl Ty {
    pub fn core(full_name: &str) -> Ty {
        Ty::Con(TypeName::core(full_name))
    }

    pub fn object() -> Ty {
        Ty::core(names::OBJECT)
    }

    pub fn void() -> Ty {
        Ty::core(names::VOID)
    }

    pub fn boolean() -> Ty {
        Ty::core(names::BOOLEAN)
    }

    pub fn int32() -> Ty {
        Ty::core(names::INT32)
    }

    pub fn int64() -> Ty {
        Ty::core(names::INT64)
    }

    pub fn double() -> Ty {
        Ty::core(names::DOUBLE)
    }

    pub fn char() -> Ty {
        Ty::core(names::CHAR)
    }

    pub fn string() -> Ty {
        Ty::core(names::STRING)
    }

    pub fn exception() -> Ty {
        Ty::core(names::EXCEPTION)
    }

    /// Create an `IEnumerable<T>` type.
    pub fn enumerable(item: Ty) -> Ty {
        Ty::App(TypeName::core(names::ENUMERABLE_OF_T), vec![item])
    }

    /// Create a `List<T>` type.
    pub fn list(item: Ty) -> Ty {
        Ty::App(TypeName::core(names::LIST_OF_T), vec![item])
    }

    /// Create a `Func<T1, ..., TResult>` delegate type.
    pub fn func(params: Vec<Ty>, result: Ty) -> Ty {
        let mut args = params;
        args.push(result);
        Ty::App(TypeName::core(format!("{}{}", names::FUNC_PREFIX, args.len())), args)
    }

    /// Create an `Action` / `Action<T1, ...>` delegate type.
    pub fn action(params: Vec<Ty>) -> Ty {
        if params.is_empty() {
            Ty::core(names::ACTION)
        } else {
            let name = format!("{}`{}", names::ACTION, params.len());
            Ty::App(TypeName::core(name), params)
        }
    }

    /// The static class holding the sequence query operators.
    pub fn linq_enumerable() -> Ty {
        Ty::Con(TypeName::new(names::LINQ_ENUMERABLE, ModuleIdentity::linq()))
    }

    pub fn array(element: Ty) -> Ty {
        Ty::Array(Box::new(element))
    }

    pub fn type_param(name: impl Into<String>, position: usize) -> Ty {
        Ty::Param(GenericParam { name: name.into(), position, owner: ParamOwner::Type })
    }

    pub fn method_param(name: impl Into<String>, position: usize) -> Ty {
        Ty::Param(GenericParam { name: name.into(), position, owner: ParamOwner::Method })
    }

    /// The named definition behind this type, if any.
    pub fn type_name(&self) -> Option<&TypeName> {
        match self {
            Ty::Con(name) | Ty::App(name, _) => Some(name),
            Ty::Array(_) | Ty::Param(_) => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Ty::Con(name) if name.full_name == names::VOID)
    }

    /// The module that defines this type. Arrays report their element's module.
    pub fn module(&self) -> Option<&ModuleIdentity> {
        match self {
            Ty::Con(name) | Ty::App(name, _) => Some(&name.module),
            Ty::Array(elem) => elem.module(),
            Ty::Param(_) => None,
        }
    }

    /// The namespace-qualified name. Generic arguments are embedded in their
    /// fully qualified form: ``List`1[[System.Int32, System.Private.CoreLib, Version=...]]``.
    pub fn full_name(&self) -> String {
        match self {
            Ty::Con(name) => name.full_name.clone(),
            Ty::App(name, args) => {
                let args: Vec<String> = args
                    .iter()
                    .map(|arg| format!("[{}]", arg.assembly_qualified_name()))
                    .collect();
                format!("{}[{}]", name.full_name, args.join(","))
            }
            Ty::Array(elem) => format!("{}[]", elem.full_name()),
            Ty::Param(param) => param.name.clone(),
        }
    }

    /// Full name followed by the complete module identity.
    pub fn assembly_qualified_name(&self) -> String {
        match self.module() {
            Some(module) => format!("{}, {}", self.full_name(), module),
            None => self.full_name(),
        }
    }

    pub fn generic_arguments(&self) -> &[Ty] {
        match self {
            Ty::App(_, args) => args,
            _ => &[],
        }
    }

    /// A constructed generic type such as `List<Int32>`.
    pub fn is_generic_type(&self) -> bool {
        matches!(self, Ty::App(..))
    }

    /// The open definition of a constructed generic type; other types map to
    /// themselves.
    pub fn generic_type_definition(&self) -> Ty {
        match self {
            Ty::App(name, _) => Ty::Con(name.clone()),
            other => other.clone(),
        }
    }

    pub fn element_type(&self) -> Option<&Ty> {
        match self {
            Ty::Array(elem) => Some(elem),
            _ => None,
        }
    }

    pub fn contains_generic_parameters(&self) -> bool {
        match self {
            Ty::Param(_) => true,
            Ty::App(_, args) => args.iter().any(Ty::contains_generic_parameters),
            Ty::Array(elem) => elem.contains_generic_parameters(),
            Ty::Con(_) => false,
        }
    }

    /// Replace generic parameters with concrete arguments.
    ///
    /// Type-owned parameters index into `type_args`, method-owned ones into
    /// `method_args`. Parameters without a matching argument are left open.
    pub fn substitute(&self, type_args: &[Ty], method_args: &[Ty]) -> Ty {
        match self {
            Ty::Param(param) => {
                let args = match param.owner {
                    ParamOwner::Type => type_args,
                    ParamOwner::Method => method_args,
                };
                args.get(param.position).cloned().unwrap_or_else(|| self.clone())
            }
            Ty::App(name, args) => Ty::App(
                name.clone(),
                args.iter().map(|a| a.substitute(type_args, method_args)).collect(),
            ),
            Ty::Array(elem) => Ty::array(elem.substitute(type_args, method_args)),
            Ty::Con(_) => self.clone(),
        }
    }

    /// The item type of a sequence: array element, or the single argument of
    /// a generic collection.
    pub fn sequence_item(&self) -> Option<&Ty> {
        match self {
            Ty::Array(elem) => Some(elem),
            Ty::App(_, args) if args.len() == 1 => args.first(),
            _ => None,
        }
    }

    /// Parameter types of a `Func` or `Action` delegate.
    pub fn delegate_parameter_types(&self) -> Option<&[Ty]> {
        let name = self.type_name()?;
        let args = self.generic_arguments();
        if name.full_name.starts_with(names::FUNC_PREFIX) {
            args.split_last().map(|(_, params)| params)
        } else if name.full_name.starts_with(names::ACTION) {
            Some(args)
        } else {
            None
        }
    }

    /// For a `Func` delegate, its result type; `Void` for an `Action`.
    pub fn delegate_return_type(&self) -> Option<Ty> {
        let name = self.type_name()?;
        if name.full_name.starts_with(names::FUNC_PREFIX) {
            self.generic_arguments().last().cloned()
        } else if name.full_name.starts_with(names::ACTION) {
            Some(Ty::void())
        } else {
            None
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Con(name) => write!(f, "{}", name.short_name()),
            Ty::App(name, args) => {
                write!(f, "{}<", name.short_name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ">")
            }
            Ty::Array(elem) => write!(f, "{}[]", elem),
            Ty::Param(param) => write!(f, "{}", param.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> Ty {
        Ty::Con(TypeName::new("Demo.Model", ModuleIdentity::new("Demo.Models")))
    }

    #[test]
    fn module_identity_ignores_version() {
        let a = ModuleIdentity::new("Demo.Models");
        let b = ModuleIdentity::new("Demo.Models").with_version("2.0.0.0");
        assert_eq!(a, b);
        assert_eq!(
            a.to_string(),
            "Demo.Models, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"
        );
    }

    #[test]
    fn full_name_embeds_qualified_arguments() {
        let ty = Ty::enumerable(model());
        assert_eq!(
            ty.full_name(),
            "System.Collections.Generic.IEnumerable`1[[Demo.Model, Demo.Models, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null]]"
        );
        assert_eq!(ty.to_string(), "IEnumerable<Model>");
    }

    #[test]
    fn substitute_replaces_owned_parameters() {
        let open = Ty::func(vec![Ty::method_param("TSource", 0)], Ty::boolean());
        let closed = open.substitute(&[], &[Ty::int32()]);
        assert_eq!(closed, Ty::func(vec![Ty::int32()], Ty::boolean()));
        assert!(!closed.contains_generic_parameters());
        assert_eq!(closed.delegate_return_type(), Some(Ty::boolean()));
    }

    #[test]
    fn generic_definition_of_constructed_type() {
        let def = Ty::list(Ty::string()).generic_type_definition();
        assert_eq!(def, Ty::core(names::LIST_OF_T));
        assert_eq!(def.type_name().map(TypeName::arity), Some(1));
        assert_eq!(Ty::int32().generic_type_definition(), Ty::int32());
    }
}
