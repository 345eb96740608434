//! Member descriptors: projecting member handles into name-based
//! descriptors, and finding the handle a descriptor names.
//!
//! Method and constructor resolution emulates overload selection without
//! compile-time handles. A candidate qualifies when
//!
//! 1. its return type equals the recorded return type exactly (methods only),
//! 2. its parameter list has the recorded length and every parameter agrees
//!    by name and by type, comparing generic type definitions when the
//!    constructed types differ,
//! 3. it has as many generic arguments as were recorded.
//!
//! Exactly one candidate must survive. Generic arguments are compared by
//! count only, so overloads that differ only inside a generic argument are
//! indistinguishable and fail as ambiguous.

use exprtree_host::{
    BindingFlags, ConstructorInfo, FieldInfo, MemberInfo, MemberKind, MethodInfo, ParameterInfo,
    PropertyInfo, Ty, TypeSystem,
};
use exprtree_portable::{
    ConstructorDescriptor, FieldDescriptor, MemberDescriptor, MemberHeader, MethodDescriptor,
    ParameterDescriptor, PropertyDescriptor,
};
use tracing::debug;

use crate::error::{Result, SerializeError};
use crate::types::{describe, TypeResolver};

/// Resolves [`MemberDescriptor`]s against a [`TypeSystem`].
#[derive(Clone, Copy)]
pub struct MemberResolver<'t> {
    types: &'t dyn TypeSystem,
    resolver: TypeResolver<'t>,
}

impl<'t> MemberResolver<'t> {
    pub fn new(types: &'t dyn TypeSystem) -> Self {
        MemberResolver { types, resolver: TypeResolver::new(types) }
    }

    pub fn resolve_member(&self, descriptor: &MemberDescriptor) -> Result<MemberInfo> {
        match descriptor {
            MemberDescriptor::Field(d) => self.resolve_field(d).map(MemberInfo::Field),
            MemberDescriptor::Property(d) => self.resolve_property(d).map(MemberInfo::Property),
            MemberDescriptor::Method(d) => self.resolve_method(d).map(MemberInfo::Method),
            MemberDescriptor::Constructor(d) => {
                self.resolve_constructor(d).map(MemberInfo::Constructor)
            }
        }
    }

    pub fn resolve_field(&self, descriptor: &FieldDescriptor) -> Result<FieldInfo> {
        let header = &descriptor.header;
        let reflected = self.resolver.resolve(&header.reflected_type)?;
        let flags = BindingFlags::exact(header.is_public, header.is_static);
        let field = self
            .types
            .field(&reflected, &header.name, flags)
            .ok_or_else(|| not_found(MemberKind::Field, header))?;
        debug!(field = %header.name, on = %reflected, "resolved field");
        Ok(field)
    }

    /// Properties are looked up by visibility only; static and instance
    /// properties are both searched.
    pub fn resolve_property(&self, descriptor: &PropertyDescriptor) -> Result<PropertyInfo> {
        let header = &descriptor.header;
        let reflected = self.resolver.resolve(&header.reflected_type)?;
        let flags = BindingFlags::visibility(header.is_public);
        let property = self
            .types
            .property(&reflected, &header.name, flags)
            .ok_or_else(|| not_found(MemberKind::Property, header))?;
        debug!(property = %header.name, on = %reflected, "resolved property");
        Ok(property)
    }

    pub fn resolve_method(&self, descriptor: &MethodDescriptor) -> Result<MethodInfo> {
        let header = &descriptor.header;
        let reflected = self.resolver.resolve(&header.reflected_type)?;
        let return_type = self.resolver.resolve(&descriptor.return_type)?;
        let parameters = self.resolve_parameters(&descriptor.parameters)?;
        let flags = BindingFlags::exact(header.is_public, header.is_static);

        let mut survivors: Vec<MethodInfo> = self
            .types
            .methods(&reflected, flags)
            .into_iter()
            .filter(|m| m.name() == header.name)
            .filter(|m| *m.return_type() == return_type)
            .filter(|m| signature_matches(m.parameters(), &parameters))
            .filter(|m| m.generic_arguments().len() == descriptor.generic_arguments.len())
            .collect();
        let method = match survivors.len() {
            1 => survivors.remove(0),
            candidates => {
                return Err(ambiguous_or_not_found(MemberKind::Method, header, candidates))
            }
        };

        let method = if method.is_generic_method_definition() {
            let arguments = descriptor
                .generic_arguments
                .iter()
                .map(|r| self.resolver.resolve(r))
                .collect::<Result<Vec<_>>>()?;
            method.make_generic_method(arguments)?
        } else {
            method
        };
        debug!(%method, "resolved method");
        Ok(method)
    }

    /// Like method resolution, without return type or static filtering.
    pub fn resolve_constructor(&self, descriptor: &ConstructorDescriptor) -> Result<ConstructorInfo> {
        let header = &descriptor.header;
        let reflected = self.resolver.resolve(&header.reflected_type)?;
        let parameters = self.resolve_parameters(&descriptor.parameters)?;
        let flags = BindingFlags::exact(header.is_public, false);
        let arity_matches = descriptor.generic_arguments.is_empty();

        let mut survivors: Vec<ConstructorInfo> = self
            .types
            .constructors(&reflected, flags)
            .into_iter()
            .filter(|c| signature_matches(c.parameters(), &parameters))
            .filter(|_| arity_matches)
            .collect();
        match survivors.len() {
            1 => {
                debug!(on = %reflected, parameters = parameters.len(), "resolved constructor");
                Ok(survivors.remove(0))
            }
            candidates => Err(ambiguous_or_not_found(MemberKind::Constructor, header, candidates)),
        }
    }

    fn resolve_parameters(&self, parameters: &[ParameterDescriptor]) -> Result<Vec<(String, Ty)>> {
        parameters
            .iter()
            .map(|p| {
                let ty = self.resolver.resolve(&p.parameter_type)?;
                Ok((p.name.clone().unwrap_or_default(), ty))
            })
            .collect()
    }
}

fn signature_matches(candidate: &[ParameterInfo], recorded: &[(String, Ty)]) -> bool {
    candidate.len() == recorded.len()
        && candidate.iter().zip(recorded).all(|(p, (name, ty))| {
            p.name == *name
                && (p.parameter_type == *ty
                    || p.parameter_type.generic_type_definition() == ty.generic_type_definition())
        })
}

fn not_found(member_kind: MemberKind, header: &MemberHeader) -> SerializeError {
    SerializeError::MemberNotFound {
        member_kind,
        name: header.name.clone(),
        reflected_type: header.reflected_type.to_string(),
    }
}

fn ambiguous_or_not_found(
    member_kind: MemberKind,
    header: &MemberHeader,
    candidates: usize,
) -> SerializeError {
    SerializeError::AmbiguousOrNotFoundMember {
        member_kind,
        name: header.name.clone(),
        reflected_type: header.reflected_type.to_string(),
        candidates,
    }
}

// ── Describing ─────────────────────────────────────────────────────────

pub fn describe_member(member: &MemberInfo) -> MemberDescriptor {
    match member {
        MemberInfo::Field(f) => describe_field(f),
        MemberInfo::Property(p) => describe_property(p),
        MemberInfo::Method(m) => describe_method(m),
        MemberInfo::Constructor(c) => describe_constructor(c),
    }
}

fn header(
    declaring: &Ty,
    reflected: &Ty,
    name: &str,
    is_public: bool,
    is_static: bool,
) -> MemberHeader {
    MemberHeader {
        declaring_type: describe(declaring),
        reflected_type: describe(reflected),
        name: name.to_string(),
        is_public,
        is_static,
    }
}

pub fn describe_field(field: &FieldInfo) -> MemberDescriptor {
    MemberDescriptor::Field(FieldDescriptor {
        header: header(
            field.declaring_type(),
            field.reflected_type(),
            field.name(),
            field.is_public(),
            field.is_static(),
        ),
        field_type: describe(field.field_type()),
    })
}

pub fn describe_property(property: &PropertyInfo) -> MemberDescriptor {
    MemberDescriptor::Property(PropertyDescriptor {
        header: header(
            property.declaring_type(),
            property.reflected_type(),
            property.name(),
            property.is_public(),
            property.is_static(),
        ),
        property_type: describe(property.property_type()),
    })
}

pub fn describe_method(method: &MethodInfo) -> MemberDescriptor {
    MemberDescriptor::Method(MethodDescriptor {
        header: header(
            method.declaring_type(),
            method.reflected_type(),
            method.name(),
            method.is_public(),
            method.is_static(),
        ),
        parameters: describe_parameters(method.parameters()),
        generic_arguments: method.generic_arguments().iter().map(describe).collect(),
        return_type: describe(method.return_type()),
    })
}

pub fn describe_constructor(ctor: &ConstructorInfo) -> MemberDescriptor {
    MemberDescriptor::Constructor(ConstructorDescriptor {
        header: header(
            ctor.declaring_type(),
            ctor.declaring_type(),
            ConstructorInfo::NAME,
            ctor.is_public(),
            false,
        ),
        parameters: describe_parameters(ctor.parameters()),
        generic_arguments: Vec::new(),
    })
}

fn describe_parameters(parameters: &[ParameterInfo]) -> Vec<ParameterDescriptor> {
    parameters
        .iter()
        .map(|p| ParameterDescriptor {
            name: Some(p.name.clone()),
            parameter_type: describe(&p.parameter_type),
            position: Some(p.position),
            depth: None,
            is_by_ref: false,
        })
        .collect()
}

/// Narrow a resolved member to a method; `node` names the caller in the
/// error.
pub(crate) fn expect_method(member: MemberInfo, node: &str) -> Result<MethodInfo> {
    match member {
        MemberInfo::Method(m) => Ok(m),
        other => Err(SerializeError::invalid(
            node,
            format!("expected a method descriptor, found {} `{}`", other.kind(), other.name()),
        )),
    }
}

pub(crate) fn expect_constructor(member: MemberInfo, node: &str) -> Result<ConstructorInfo> {
    match member {
        MemberInfo::Constructor(c) => Ok(c),
        other => Err(SerializeError::invalid(
            node,
            format!("expected a constructor descriptor, found {} `{}`", other.kind(), other.name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exprtree_host::sample;

    #[test]
    fn describes_constructor_with_positions() {
        let types = sample::sample_registry();
        let ctor = types
            .constructor(&sample::model_type(), &[Ty::string(), Ty::int32()])
            .unwrap();
        let MemberDescriptor::Constructor(d) = describe_constructor(&ctor) else {
            panic!("expected a constructor descriptor");
        };
        assert_eq!(d.header.name, ".ctor");
        let positions: Vec<_> = d.parameters.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![Some(0), Some(1)]);
    }

    #[test]
    fn non_public_field_needs_non_public_descriptor() {
        let types = sample::sample_registry();
        let secret = types
            .field(&sample::model_type(), "secret", BindingFlags::ALL_INSTANCE)
            .unwrap();
        let MemberDescriptor::Field(mut d) = describe_field(&secret) else {
            panic!("expected a field descriptor");
        };
        let resolver = MemberResolver::new(&types);
        assert!(resolver.resolve_field(&d).is_ok());

        d.header.is_public = true;
        assert!(matches!(
            resolver.resolve_field(&d),
            Err(SerializeError::MemberNotFound { member_kind: MemberKind::Field, .. })
        ));
    }
}
