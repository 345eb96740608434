//! Parameter canonicalization.
//!
//! Decoding builds a fresh parameter object for every use site. Once a
//! scope (lambda, block or catch handler) and its body are rebuilt, each use
//! site that denotes one of the scope's declarations is replaced by the
//! declared instance, so evaluation binds it by identity.

use exprtree_host::{Expr, ParameterExpr};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::{Result, SerializeError};

/// Recorded `(depth, position)` of each use-site parameter, keyed by
/// parameter identity.
pub(crate) type SlotTable = FxHashMap<u64, (usize, usize)>;

/// Rewrite `body` so that use sites recorded at `depth` point to
/// `declared[position]`. A use site whose slot names a missing declaration,
/// or one that disagrees with it on name or type, fails the decode.
pub(crate) fn canonicalize(
    body: &Expr,
    declared: &[ParameterExpr],
    depth: usize,
    slots: &SlotTable,
) -> Result<Expr> {
    let mut replaced = 0usize;
    let mut mismatch = None;
    let rewritten = body.rewrite_parameters(&mut |use_site| {
        let &(slot_depth, position) = slots.get(&use_site.id())?;
        if slot_depth != depth {
            return None;
        }
        let Some(declaration) = declared.get(position) else {
            mismatch.get_or_insert_with(|| {
                format!(
                    "parameter `{}` refers to position {} of a scope declaring {}",
                    use_site.name().unwrap_or("_"),
                    position,
                    declared.len()
                )
            });
            return None;
        };
        if declaration.ptr_eq(use_site) {
            return None;
        }
        if declaration.name() != use_site.name() || declaration.ty() != use_site.ty() {
            mismatch.get_or_insert_with(|| {
                format!(
                    "parameter `{}: {}` does not match declaration `{}: {}`",
                    use_site.name().unwrap_or("_"),
                    use_site.ty(),
                    declaration.name().unwrap_or("_"),
                    declaration.ty()
                )
            });
            return None;
        }
        replaced += 1;
        Some(declaration.clone())
    });
    if let Some(reason) = mismatch {
        return Err(SerializeError::invalid("Parameter", reason));
    }
    if replaced > 0 {
        debug!(depth, declared = declared.len(), replaced, "canonicalized scope");
    }
    Ok(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use exprtree_host::{NodeType, Ty};

    #[test]
    fn only_matching_depth_is_rewritten() {
        let declared = ParameterExpr::named(Ty::int32(), "x");
        let here = ParameterExpr::named(Ty::int32(), "x");
        let outer = ParameterExpr::named(Ty::int32(), "x");
        let mut slots = SlotTable::default();
        slots.insert(here.id(), (1, 0));
        slots.insert(outer.id(), (0, 0));

        let body = Expr::binary(NodeType::Add, Expr::parameter(&here), Expr::parameter(&outer)).unwrap();
        let rebuilt = canonicalize(&body, &[declared.clone()], 1, &slots).unwrap();

        let exprtree_host::ExprKind::Binary { left, right, .. } = rebuilt.kind() else {
            panic!("expected a binary node");
        };
        assert!(left.as_parameter().unwrap().ptr_eq(&declared));
        assert!(right.as_parameter().unwrap().ptr_eq(&outer));
    }

    #[test]
    fn mismatched_type_is_rejected() {
        let declared = ParameterExpr::named(Ty::int32(), "x");
        let use_site = ParameterExpr::named(Ty::string(), "x");
        let mut slots = SlotTable::default();
        slots.insert(use_site.id(), (0, 0));

        let body = Expr::parameter(&use_site);
        assert!(matches!(
            canonicalize(&body, &[declared], 0, &slots),
            Err(SerializeError::InvalidNode { .. })
        ));
    }

    #[test]
    fn position_past_the_scope_is_rejected() {
        let declared = ParameterExpr::named(Ty::int32(), "x");
        let use_site = ParameterExpr::named(Ty::int32(), "y");
        let mut slots = SlotTable::default();
        slots.insert(use_site.id(), (0, 3));

        let body = Expr::parameter(&use_site);
        assert!(canonicalize(&body, &[declared], 0, &slots).is_err());
    }
}
