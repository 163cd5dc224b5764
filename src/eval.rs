//! Typed accessor helpers (`SPEC_FULL.md` "typed accessor helpers"),
//! grounded on `original_source/src/eval.c`'s `lai_eval_*` family: thin
//! wrappers that evaluate a value (resolving `Handle`/`LazyHandle`
//! indirection first) and then assert its type, returning the restricted
//! "Typed API" subset of `AmlError` `spec.md` §7 describes rather than
//! requiring every caller to match on `AmlValue` by hand.

use crate::{
    name_object::AmlName,
    namespace::NodeHandle,
    value::{AmlType, AmlValue, Args},
    AmlContext, AmlError,
};
use alloc::{rc::Rc, string::String, vec::Vec};
use core::cell::RefCell;

/// Resolves a `Handle`/`LazyHandle` indirection down to the `NodeHandle` it
/// names, without evaluating the node's value.
pub fn obj_get_handle(ctx: &AmlContext, value: &AmlValue) -> Result<NodeHandle, AmlError> {
    match value {
        AmlValue::Handle(node) => Ok(node.clone()),
        AmlValue::LazyHandle { name, scope } => resolve_lazy(ctx, name, scope),
        other => Err(AmlError::IncompatibleValueConversion { current: other.type_of(), target: AmlType::Device }),
    }
}

fn resolve_lazy(ctx: &AmlContext, name: &AmlName, scope: &AmlName) -> Result<NodeHandle, AmlError> {
    let scope_node = ctx.namespace.resolve_path(scope)?;
    ctx.namespace.resolve(name, &scope_node).ok_or_else(|| AmlError::ValueDoesNotExist(name.clone()))
}

/// Evaluates `value` to a concrete (non-`Handle`, non-`LazyHandle`)
/// `AmlValue`, invoking a `Method` node with no arguments if it names one.
fn resolve_value(ctx: &mut AmlContext, value: &AmlValue) -> Result<AmlValue, AmlError> {
    match value {
        AmlValue::Handle(node) => ctx.evaluate_node(node, Args::default()),
        AmlValue::LazyHandle { name, scope } => {
            let node = resolve_lazy(ctx, name, scope)?;
            ctx.evaluate_node(&node, Args::default())
        }
        other => Ok(other.clone()),
    }
}

/// Evaluates `value` and asserts it is an `Integer` (`lai_eval_*` analogue
/// for `LAI_INTEGER`).
pub fn obj_get_integer(ctx: &mut AmlContext, value: &AmlValue) -> Result<u64, AmlError> {
    resolve_value(ctx, value)?.as_integer()
}

/// Evaluates `value` and asserts it is a `String`, returning its shared
/// body (same aliasing contract as [`AmlValue::as_string`]).
pub fn obj_get_string(ctx: &mut AmlContext, value: &AmlValue) -> Result<Rc<RefCell<String>>, AmlError> {
    resolve_value(ctx, value)?.as_string()
}

/// Evaluates `value` and asserts it is a `Buffer`, returning its shared body.
pub fn obj_get_buffer(ctx: &mut AmlContext, value: &AmlValue) -> Result<Rc<RefCell<Vec<u8>>>, AmlError> {
    resolve_value(ctx, value)?.as_buffer()
}

/// Evaluates `value` and asserts it is a `Package`, returning its shared body.
pub fn obj_get_pkg(ctx: &mut AmlContext, value: &AmlValue) -> Result<Rc<RefCell<Vec<AmlValue>>>, AmlError> {
    resolve_value(ctx, value)?.as_package()
}

/// The namespace-aware `get_type` (`spec.md` §4.2): resolves a `Handle`/
/// `LazyHandle` indirection before classifying, so a handle pointing at a
/// `Name(Integer)` node reports `Integer` rather than the fallback `Device`
/// [`AmlValue::type_of`] assigns to an unresolved handle. A handle to a node
/// `evaluate_node` cannot reduce further (`Device`, `Mutex`, ...) resolves
/// back to a `Handle` of that same node, so it still reports that node's
/// kind correctly.
pub fn obj_get_type(ctx: &mut AmlContext, value: &AmlValue) -> Result<AmlType, AmlError> {
    Ok(resolve_value(ctx, value)?.type_of())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{namespace::NodeKind, value::MethodCode, DebugVerbosity};

    struct NullHandler;
    impl crate::Handler for NullHandler {
        fn read_u8(&self, _address: usize) -> u8 {
            0
        }
        fn read_u16(&self, _address: usize) -> u16 {
            0
        }
        fn read_u32(&self, _address: usize) -> u32 {
            0
        }
        fn read_u64(&self, _address: usize) -> u64 {
            0
        }
        fn write_u8(&self, _address: usize, _value: u8) {}
        fn write_u16(&self, _address: usize, _value: u16) {}
        fn write_u32(&self, _address: usize, _value: u32) {}
        fn write_u64(&self, _address: usize, _value: u64) {}
        fn read_io_u8(&self, _port: u16) -> u8 {
            0
        }
        fn read_io_u16(&self, _port: u16) -> u16 {
            0
        }
        fn read_io_u32(&self, _port: u16) -> u32 {
            0
        }
        fn write_io_u8(&self, _port: u16, _value: u8) {}
        fn write_io_u16(&self, _port: u16, _value: u16) {}
        fn write_io_u32(&self, _port: u16, _value: u32) {}
        fn read_pci_u8(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, _offset: u16) -> u8 {
            0
        }
        fn read_pci_u16(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, _offset: u16) -> u16 {
            0
        }
        fn read_pci_u32(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, _offset: u16) -> u32 {
            0
        }
        fn write_pci_u8(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, _offset: u16, _value: u8) {}
        fn write_pci_u16(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, _offset: u16, _value: u16) {}
        fn write_pci_u32(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, _offset: u16, _value: u32) {}
        fn stall(&self, _microseconds: u64) {}
        fn sleep(&self, _milliseconds: u64) {}
    }

    #[test]
    fn reads_plain_integer() {
        let mut ctx = AmlContext::new(alloc::boxed::Box::new(NullHandler), DebugVerbosity::None);
        let value = AmlValue::Integer(42);
        assert_eq!(obj_get_integer(&mut ctx, &value).unwrap(), 42);
    }

    #[test]
    fn resolves_handle_to_name_value() {
        let mut ctx = AmlContext::new(alloc::boxed::Box::new(NullHandler), DebugVerbosity::None);
        let root = ctx.namespace.root.clone();
        let name = AmlName::from_str("\\FOOO").unwrap();
        let node = ctx.namespace.create(&name, &root, NodeKind::Name(AmlValue::Integer(7))).unwrap();
        let handle = AmlValue::Handle(node);
        assert_eq!(obj_get_integer(&mut ctx, &handle).unwrap(), 7);
    }

    #[test]
    fn resolves_handle_to_zero_arg_method() {
        let mut ctx = AmlContext::new(alloc::boxed::Box::new(NullHandler), DebugVerbosity::None);
        let root = ctx.namespace.root.clone();
        let name = AmlName::from_str("\\BARR").unwrap();
        let native: crate::value::NativeMethod = Rc::new(|_ctx: &mut AmlContext, _args: &Args| Ok(AmlValue::Integer(99)));
        let node = ctx
            .namespace
            .create(&name, &root, NodeKind::Method { arg_count: 0, serialized: false, code: MethodCode::Native(native) })
            .unwrap();
        let handle = AmlValue::Handle(node);
        assert_eq!(obj_get_integer(&mut ctx, &handle).unwrap(), 99);
    }

    #[test]
    fn wrong_type_is_an_error() {
        let mut ctx = AmlContext::new(alloc::boxed::Box::new(NullHandler), DebugVerbosity::None);
        let value = AmlValue::Integer(1);
        assert!(obj_get_string(&mut ctx, &value).is_err());
    }
}
