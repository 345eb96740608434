//! Type references: describing host types as reduced qualified names and
//! resolving those names back through a [`TypeSystem`].

use exprtree_host::{type_name, Ty, TypeSystem};
use exprtree_portable::TypeReference;
use tracing::debug;

use crate::error::{Result, SerializeError};

/// Maps [`TypeReference`]s to host types and back.
#[derive(Clone, Copy)]
pub struct TypeResolver<'t> {
    types: &'t dyn TypeSystem,
}

impl<'t> TypeResolver<'t> {
    pub fn new(types: &'t dyn TypeSystem) -> Self {
        TypeResolver { types }
    }

    /// Parse the reference and locate the type it names.
    pub fn resolve(&self, reference: &TypeReference) -> Result<Ty> {
        let parsed = type_name::parse(reference.as_str()).map_err(|err| {
            SerializeError::TypeNotFound {
                reference: reference.to_string(),
                reason: err.to_string(),
            }
        })?;
        let ty = self.types.find_type(&parsed).ok_or_else(|| SerializeError::TypeNotFound {
            reference: reference.to_string(),
            reason: "no such type is known to the runtime".to_string(),
        })?;
        debug!(reference = %reference, resolved = %ty, "resolved type");
        Ok(ty)
    }

    pub fn resolve_optional(&self, reference: Option<&TypeReference>) -> Result<Option<Ty>> {
        reference.map(|r| self.resolve(r)).transpose()
    }

    pub fn describe(&self, ty: &Ty) -> TypeReference {
        describe(ty)
    }
}

/// Reduced qualified name of `ty`: full name plus module name, without
/// version, culture or public key token.
pub fn describe(ty: &Ty) -> TypeReference {
    let base = match ty.module() {
        Some(module) => format!("{}, {}", ty.full_name(), module.name),
        None => ty.full_name(),
    };
    TypeReference::new(reduce_generic_arguments(base, ty))
}

/// Swap each direct generic argument's fully qualified text inside `text`
/// for that argument's reduced form.
///
/// This is plain substring replacement: if one argument's qualified name
/// occurs inside another's, the wrong span can be rewritten. Arrays of
/// generic types keep their arguments fully qualified, which still parses.
fn reduce_generic_arguments(mut text: String, ty: &Ty) -> String {
    for arg in ty.generic_arguments() {
        let qualified = arg.assembly_qualified_name();
        let reduced = describe(arg);
        text = text.replace(&qualified, reduced.as_str());
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use exprtree_host::sample;

    #[test]
    fn describes_core_types_without_version() {
        assert_eq!(describe(&Ty::int32()).as_str(), "System.Int32, System.Private.CoreLib");
    }

    #[test]
    fn describes_nested_generic_arguments_in_reduced_form() {
        let ty = Ty::func(vec![sample::model_type()], Ty::boolean());
        assert_eq!(
            describe(&ty).as_str(),
            "System.Func`2[[Demo.Model, Demo.Models],[System.Boolean, System.Private.CoreLib]], System.Private.CoreLib"
        );
    }

    #[test]
    fn resolves_what_it_describes() {
        let types = sample::sample_registry();
        let resolver = TypeResolver::new(&types);
        for ty in [
            Ty::string(),
            sample::model_type(),
            Ty::enumerable(sample::model_type()),
            Ty::list(Ty::string()),
            Ty::array(Ty::int32()),
            Ty::func(vec![Ty::enumerable(Ty::int32())], Ty::int32()),
        ] {
            assert_eq!(resolver.resolve(&describe(&ty)).unwrap(), ty);
        }
    }

    #[test]
    fn unknown_type_is_reported() {
        let types = sample::sample_registry();
        let err = TypeResolver::new(&types)
            .resolve(&TypeReference::new("Demo.Missing, Demo.Models"))
            .unwrap_err();
        assert!(matches!(err, SerializeError::TypeNotFound { .. }));
    }

    #[test]
    fn absent_reference_resolves_to_none() {
        let types = sample::sample_registry();
        assert_eq!(TypeResolver::new(&types).resolve_optional(None).unwrap(), None);
    }
}
