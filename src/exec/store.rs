//! `Store`-target semantics (`spec.md` §4.4.2 "Store targets"): writing a
//! value to a `Target` resolved from a `REFERENCE`-mode operand.

use crate::{
    name_object::Target,
    namespace::NodeKind,
    value::{move_value, AmlValue},
    AmlContext, AmlError,
};

/// Writes `value` to `target`, per the per-variant rules of `spec.md`
/// §4.4.2: a `Null` target discards the value, `Debug` logs it, `Arg`/
/// `Local` overwrite the corresponding slot, and `Name` dispatches on the
/// resolved node's kind (plain value, field write, or buffer-field write).
pub(super) fn store_into(ctx: &mut AmlContext, target: Target, value: AmlValue) -> Result<(), AmlError> {
    match target {
        Target::Null => Ok(()),
        Target::Debug => {
            log::debug!("aml: Debug <- {:?}", value.type_of());
            Ok(())
        }
        Target::Arg(num) => {
            let invocation = ctx.current_invocation()?;
            let slot = invocation.args.values.get_mut(num as usize).ok_or(AmlError::InvalidArgAccess(num))?;
            let mut value = value;
            move_value(slot, &mut value);
            Ok(())
        }
        Target::Local(num) => {
            let invocation = ctx.current_invocation()?;
            let slot = invocation.locals.get_mut(num as usize).ok_or(AmlError::InvalidArgAccess(num))?;
            let mut value = value;
            move_value(slot, &mut value);
            Ok(())
        }
        Target::Name(name) => {
            let scope = ctx.current_scope();
            let node = match ctx.namespace.resolve(&name, &scope) {
                Some(node) => node,
                None => return Err(ctx.raise_fatal(crate::FATAL_UNDEFINED_STORE_TARGET, 0, 0)),
            };
            let node = node.resolve_alias()?;
            let field = match &node.0.borrow().kind {
                NodeKind::Field(f) => Some(f.clone()),
                _ => None,
            };
            if let Some(field) = field {
                return crate::opregion::write_field(ctx, &field, &value);
            }
            let index_field = match &node.0.borrow().kind {
                NodeKind::IndexField(f) => Some(f.clone()),
                _ => None,
            };
            if let Some(index_field) = index_field {
                return crate::opregion::write_index_field(ctx, &index_field, &value);
            }
            let buffer_field = match &node.0.borrow().kind {
                NodeKind::BufferField(f) => Some(f.clone()),
                _ => None,
            };
            if let Some(buffer_field) = buffer_field {
                return crate::opregion::write_buffer_field(ctx, &buffer_field, &value);
            }
            let mut node_mut = node.0.borrow_mut();
            match &mut node_mut.kind {
                NodeKind::Name(slot) => {
                    let mut value = value;
                    move_value(slot, &mut value);
                    Ok(())
                }
                _ => Err(AmlError::UnexpectedResult),
            }
        }
    }
}
