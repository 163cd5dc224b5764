//! The arithmetic/logical/reference reducers of `spec.md` §4.4.1: each
//! takes the operands an `ItemKind::Op` collected (already in `Operand`
//! form) and produces the expression's result, writing through any
//! `Reference`-mode operand as a store target along the way.

use super::{store, ExprOp, Operand};
use crate::{
    namespace::NodeKind,
    value::{AmlType, AmlValue, Args},
    AmlContext, AmlError,
};
use alloc::vec::Vec;

pub(super) fn reduce_expr(ctx: &mut AmlContext, op: ExprOp, operands: Vec<Operand>) -> Result<AmlValue, AmlError> {
    let mut operands = operands.into_iter();
    match op {
        ExprOp::Store => {
            let value = operands.next().expect("Store missing its source").into_value(ctx)?;
            let target = operands.next().expect("Store missing its target").into_target();
            store::store_into(ctx, target, value.deep_clone())?;
            Ok(value)
        }
        ExprOp::Not => {
            let value = operands.next().expect("Not missing its operand").into_value(ctx)?.as_integer()?;
            let target = operands.next().expect("Not missing its target").into_target();
            let result = AmlValue::Integer(!value);
            store::store_into(ctx, target, result.clone())?;
            Ok(result)
        }
        ExprOp::Add | ExprOp::Subtract | ExprOp::Multiply | ExprOp::And | ExprOp::Or | ExprOp::Xor
        | ExprOp::ShiftLeft | ExprOp::ShiftRight => {
            let lhs = operands.next().expect("binary op missing lhs").into_value(ctx)?.as_integer()?;
            let rhs = operands.next().expect("binary op missing rhs").into_value(ctx)?.as_integer()?;
            let target = operands.next().expect("binary op missing target").into_target();
            let result = match op {
                ExprOp::Add => lhs.wrapping_add(rhs),
                ExprOp::Subtract => lhs.wrapping_sub(rhs),
                ExprOp::Multiply => lhs.wrapping_mul(rhs),
                ExprOp::And => lhs & rhs,
                ExprOp::Or => lhs | rhs,
                ExprOp::Xor => lhs ^ rhs,
                ExprOp::ShiftLeft => (rhs < 64).then(|| lhs << rhs).unwrap_or(0),
                ExprOp::ShiftRight => (rhs < 64).then(|| lhs >> rhs).unwrap_or(0),
                _ => unreachable!(),
            };
            let result = AmlValue::Integer(result);
            store::store_into(ctx, target, result.clone())?;
            Ok(result)
        }
        ExprOp::Divide => {
            let dividend = operands.next().expect("Divide missing dividend").into_value(ctx)?.as_integer()?;
            let divisor = operands.next().expect("Divide missing divisor").into_value(ctx)?.as_integer()?;
            let remainder_target = operands.next().expect("Divide missing remainder target").into_target();
            let quotient_target = operands.next().expect("Divide missing quotient target").into_target();
            if divisor == 0 {
                return Err(AmlError::DivideByZero);
            }
            let quotient = dividend / divisor;
            let remainder = dividend % divisor;
            store::store_into(ctx, remainder_target, AmlValue::Integer(remainder))?;
            store::store_into(ctx, quotient_target, AmlValue::Integer(quotient))?;
            Ok(AmlValue::Integer(quotient))
        }
        ExprOp::Increment | ExprOp::Decrement => {
            let operand = operands.next().expect("Increment/Decrement missing its operand");
            let current = operand.clone().into_value(ctx)?.as_integer()?;
            let target = operand.into_target();
            let result =
                AmlValue::Integer(if op == ExprOp::Increment { current.wrapping_add(1) } else { current.wrapping_sub(1) });
            store::store_into(ctx, target, result.clone())?;
            Ok(result)
        }
        ExprOp::LNot => {
            let value = operands.next().expect("LNot missing its operand").into_value(ctx)?.as_integer()?;
            Ok(if value == 0 { AmlValue::ones() } else { AmlValue::zero() })
        }
        ExprOp::LAnd | ExprOp::LOr => {
            let lhs = operands.next().expect("LAnd/LOr missing lhs").into_value(ctx)?.as_integer()? != 0;
            let rhs = operands.next().expect("LAnd/LOr missing rhs").into_value(ctx)?.as_integer()? != 0;
            let truthy = if op == ExprOp::LAnd { lhs && rhs } else { lhs || rhs };
            Ok(if truthy { AmlValue::ones() } else { AmlValue::zero() })
        }
        ExprOp::LEqual | ExprOp::LLess | ExprOp::LGreater => {
            let lhs = operands.next().expect("comparison missing lhs").into_value(ctx)?;
            let rhs = operands.next().expect("comparison missing rhs").into_value(ctx)?;
            let ordering = compare_values(ctx, &lhs, &rhs)?;
            let truthy = match op {
                ExprOp::LEqual => ordering == core::cmp::Ordering::Equal,
                ExprOp::LLess => ordering == core::cmp::Ordering::Less,
                ExprOp::LGreater => ordering == core::cmp::Ordering::Greater,
                _ => unreachable!(),
            };
            Ok(if truthy { AmlValue::ones() } else { AmlValue::zero() })
        }
        ExprOp::Index => {
            let source = operands.next().expect("Index missing its source").into_value(ctx)?;
            let index = operands.next().expect("Index missing its index").into_value(ctx)?.as_integer()? as usize;
            let target = operands.next().expect("Index missing its target").into_target();
            let result = match source {
                AmlValue::Buffer(b) => AmlValue::BufferIndex(b, index),
                AmlValue::String(s) => AmlValue::StringIndex(s, index),
                AmlValue::Package(p) => AmlValue::PackageIndex(p, index),
                other => {
                    return Err(AmlError::IncompatibleValueConversion { current: other.type_of(), target: AmlType::Buffer })
                }
            };
            store::store_into(ctx, target, result.clone())?;
            Ok(result)
        }
        ExprOp::DeRefOf => {
            let value = operands.next().expect("DeRefOf missing its operand").into_value(ctx)?;
            deref_value(ctx, value)
        }
        ExprOp::SizeOf => {
            let value = operands.next().expect("SizeOf missing its operand").into_value(ctx)?;
            Ok(AmlValue::Integer(value.size_of()?))
        }
        ExprOp::CondRefOf => {
            let source = operands.next().expect("CondRefOf missing its source");
            let dest_target = operands.next().expect("CondRefOf missing its destination").into_target();
            let resolved = match source {
                Operand::ResolvedName(node) => Some(node),
                Operand::UnresolvedName(name, scope) => ctx.namespace.resolve(&name, &scope),
                _ => None,
            };
            match resolved {
                Some(node) => {
                    store::store_into(ctx, dest_target, AmlValue::Handle(node))?;
                    Ok(AmlValue::ones())
                }
                None => Ok(AmlValue::zero()),
            }
        }
        ExprOp::Sleep => {
            let ms = operands.next().expect("Sleep missing its operand").into_value(ctx)?.as_integer()?;
            let ms = ms.max(1);
            ctx.handler.sleep(ms);
            Ok(AmlValue::zero())
        }
        ExprOp::Acquire => {
            let mutex = resolve_operand_node(ctx, operands.next().expect("Acquire missing its mutex"))?;
            let _timeout = operands.next().expect("Acquire missing its timeout").into_value(ctx)?.as_integer()?;
            if !matches!(mutex.0.borrow().kind, NodeKind::Mutex { .. }) {
                return Err(AmlError::UnexpectedResult);
            }
            Ok(AmlValue::Integer(1))
        }
        ExprOp::Release => {
            let mutex = resolve_operand_node(ctx, operands.next().expect("Release missing its mutex"))?;
            if !matches!(mutex.0.borrow().kind, NodeKind::Mutex { .. }) {
                return Err(AmlError::UnexpectedResult);
            }
            Ok(AmlValue::zero())
        }
    }
}

fn resolve_operand_node(ctx: &mut AmlContext, operand: Operand) -> Result<crate::namespace::NodeHandle, AmlError> {
    match operand {
        Operand::ResolvedName(node) => node.resolve_alias(),
        Operand::UnresolvedName(name, scope) => {
            let node = ctx.namespace.resolve(&name, &scope).ok_or(AmlError::ValueDoesNotExist(name))?;
            node.resolve_alias()
        }
        _ => Err(AmlError::UnexpectedResult),
    }
}

/// Follows an `ObjectReference` to the value it points at (`spec.md`
/// §4.4.1 "DeRefOf"): a byte out of a buffer/string index, an element out of
/// a package index, or a named object's current value.
fn deref_value(ctx: &mut AmlContext, value: AmlValue) -> Result<AmlValue, AmlError> {
    match value {
        AmlValue::BufferIndex(b, i) => {
            Ok(AmlValue::Integer(*b.borrow().get(i).ok_or(AmlError::FieldInvalidAddress)? as u64))
        }
        AmlValue::StringIndex(s, i) => {
            Ok(AmlValue::Integer(*s.borrow().as_bytes().get(i).ok_or(AmlError::FieldInvalidAddress)? as u64))
        }
        AmlValue::PackageIndex(p, i) => p.borrow().get(i).cloned().ok_or(AmlError::FieldInvalidAddress),
        AmlValue::Handle(node) => ctx.evaluate_node(&node, Args::default()),
        other => Ok(other),
    }
}

/// Orders two values for `LEqual`/`LLess`/`LGreater` (`spec.md` §4.4.1):
/// integers compare numerically, strings and buffers lexicographically by
/// byte.
fn compare_values(ctx: &AmlContext, a: &AmlValue, b: &AmlValue) -> Result<core::cmp::Ordering, AmlError> {
    match (a, b) {
        (AmlValue::Integer(_), _) | (_, AmlValue::Integer(_)) => Ok(a.as_integer()?.cmp(&b.as_integer()?)),
        (AmlValue::String(x), AmlValue::String(y)) => Ok(x.borrow().as_bytes().cmp(y.borrow().as_bytes())),
        (AmlValue::Buffer(x), AmlValue::Buffer(y)) => Ok(x.borrow().cmp(&y.borrow())),
        _ => Err(ctx.raise_fatal(crate::FATAL_HETEROGENEOUS_COMPARE, a.type_of() as u32, b.type_of() as u32 as u64)),
    }
}
