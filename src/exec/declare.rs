//! Installs the declarative constructs (`spec.md` §4.4 "Node (declarative)",
//! "Field", "IndexField"): `Name`, `OperationRegion`, `Create*Field`, and the
//! `Field`/`IndexField` lists, which are parsed synchronously rather than
//! through the item stack since their elements never themselves recurse.

use super::{NodeOpKind, Operand};
use crate::{
    name_object::AmlName,
    namespace::{BufferFieldPayload, FieldPayload, IndexFieldPayload, NodeHandle, NodeKind, OpRegionPayload},
    opcode, parser,
    value::{FieldAccessType, FieldFlags, RegionSpace},
    AmlContext, AmlError,
};
use alloc::vec::Vec;

/// Finishes an `ItemKind::Node` once its operands (and, for `Create*Field`,
/// its trailing name) are all collected.
pub(super) fn install_node(
    ctx: &mut AmlContext,
    kind: NodeOpKind,
    name: Option<AmlName>,
    trailing_name: Option<AmlName>,
    operands: Vec<Operand>,
) -> Result<(), AmlError> {
    match kind {
        NodeOpKind::Name => {
            let name = name.expect("Name node missing its NameString");
            let value = operands.into_iter().next().expect("Name node missing its value operand").into_value(ctx)?;
            let scope = ctx.current_scope();
            let node = ctx.namespace.create(&name, &scope, NodeKind::Name(value))?;
            record_created(ctx, &node);
            Ok(())
        }
        NodeOpKind::OpRegion => {
            let name = name.expect("OpRegion node missing its NameString");
            let mut operands = operands.into_iter();
            let space_byte = operands.next().expect("OpRegion missing space byte").into_value(ctx)?.as_integer()? as u8;
            let base = operands.next().expect("OpRegion missing offset").into_value(ctx)?.as_integer()?;
            let length = operands.next().expect("OpRegion missing length").into_value(ctx)?.as_integer()?;
            let space = RegionSpace::from_byte(space_byte)?;
            let scope = ctx.current_scope();
            let node =
                ctx.namespace.create(&name, &scope, NodeKind::OperationRegion(OpRegionPayload { space, base, length }))?;
            record_created(ctx, &node);
            Ok(())
        }
        NodeOpKind::ByteField | NodeOpKind::WordField | NodeOpKind::DwordField | NodeOpKind::QwordField => {
            let name = trailing_name.expect("Create*Field node missing its target NameString");
            let mut operands = operands.into_iter();
            let source = operands.next().expect("Create*Field missing its source buffer");
            let byte_offset =
                operands.next().expect("Create*Field missing its byte index").into_value(ctx)?.as_integer()?;
            let bit_size = match kind {
                NodeOpKind::ByteField => 8,
                NodeOpKind::WordField => 16,
                NodeOpKind::DwordField => 32,
                NodeOpKind::QwordField => 64,
                _ => unreachable!(),
            };
            let buffer = buffer_source_node(ctx, source)?;
            let payload = BufferFieldPayload { buffer, bit_offset: byte_offset * 8, bit_size };
            let scope = ctx.current_scope();
            let node = ctx.namespace.create(&name, &scope, NodeKind::BufferField(payload))?;
            record_created(ctx, &node);
            Ok(())
        }
    }
}

/// Resolves a `Create*Field`'s `SourceBuf` operand to the node backing its
/// buffer body, synthesizing a detached one if it was a bare value rather
/// than a name reference.
fn buffer_source_node(ctx: &mut AmlContext, operand: Operand) -> Result<NodeHandle, AmlError> {
    match operand {
        Operand::ResolvedName(node) => node.resolve_alias(),
        Operand::UnresolvedName(name, scope) => {
            let node = ctx.namespace.resolve(&name, &scope).ok_or(AmlError::ValueDoesNotExist(name))?;
            node.resolve_alias()
        }
        other => {
            let value = other.into_value(ctx)?;
            value.as_buffer()?;
            Ok(NodeHandle::detached(NodeKind::Name(value)))
        }
    }
}

/// Records a namespace node created while a control method is executing, so
/// it is uninstalled when that invocation returns (`spec.md` §3 "Ownership
/// and lifecycle"). A no-op outside any method, where declarations persist
/// for the life of the namespace.
pub(super) fn record_created(ctx: &mut AmlContext, node: &NodeHandle) {
    if let Ok(invocation) = ctx.current_invocation() {
        invocation.created_nodes.push(node.clone());
    }
}

fn access_type_from_byte(byte: u8) -> Result<FieldAccessType, AmlError> {
    Ok(match byte & 0x0F {
        opcode::FIELD_ACCESS_ANY => FieldAccessType::Any,
        opcode::FIELD_ACCESS_BYTE => FieldAccessType::Byte,
        opcode::FIELD_ACCESS_WORD => FieldAccessType::Word,
        opcode::FIELD_ACCESS_DWORD => FieldAccessType::DWord,
        opcode::FIELD_ACCESS_QWORD => FieldAccessType::QWord,
        opcode::FIELD_ACCESS_BUFFER => FieldAccessType::Buffer,
        _ => return Err(AmlError::InvalidFieldFlags),
    })
}

/// Parses a `DefField`'s body (`spec.md` §4.4 "Field"): a region name, a
/// flags byte, then a `FieldList` of named/reserved/access/connect elements,
/// each named element installing its own `Field` node at the running bit
/// offset. `start`/`end` bound the bytes following the already-consumed
/// `PkgLength`.
pub(super) fn parse_field_list(ctx: &mut AmlContext, start: usize, end: usize) -> Result<(), AmlError> {
    let code = ctx.current_code();
    let mut pc = start;

    let (region_name, len) = parser::name_string(&code[pc..end])?.ok_or(AmlError::InvalidNameSeg)?;
    pc += len;
    let scope = ctx.current_scope();
    let region = ctx.namespace.resolve(&region_name, &scope).ok_or_else(|| AmlError::ValueDoesNotExist(region_name))?;

    let base_flags = FieldFlags::from_byte(*code.get(pc).ok_or(AmlError::UnexpectedEndOfStream)?)?;
    pc += 1;
    let mut access_type = base_flags.access_type;
    let mut bit_offset: u64 = 0;

    while pc < end {
        match code[pc] {
            0x00 => {
                pc += 1;
                let pkg = parser::pkg_length(&code[pc..end])?;
                pc += pkg.encoded_len;
                bit_offset += pkg.end as u64;
            }
            0x01 => {
                pc += 1;
                let access_byte = *code.get(pc).ok_or(AmlError::UnexpectedEndOfStream)?;
                pc += 2; // AccessType byte + AccessAttrib byte
                access_type = access_type_from_byte(access_byte)?;
            }
            0x03 => {
                pc += 1;
                let access_byte = *code.get(pc).ok_or(AmlError::UnexpectedEndOfStream)?;
                pc += 3; // AccessType byte + ExtendedAccessAttrib byte + AccessLength byte
                access_type = access_type_from_byte(access_byte)?;
            }
            0x02 => {
                pc += 1;
                let (_connection, len) = parser::name_string(&code[pc..end])?.ok_or(AmlError::InvalidNameSeg)?;
                pc += len;
            }
            _ if opcode::is_name_char(code[pc]) => {
                if pc + 4 > end {
                    return Err(AmlError::UnexpectedEndOfStream);
                }
                let mut seg = [0u8; 4];
                seg.copy_from_slice(&code[pc..pc + 4]);
                pc += 4;
                let pkg = parser::pkg_length(&code[pc..end])?;
                pc += pkg.encoded_len;
                let bit_size = pkg.end as u64;

                let flags = FieldFlags { access_type, lock: base_flags.lock, update_rule: base_flags.update_rule };
                let payload = FieldPayload { region: region.clone(), bit_offset, bit_size, flags };
                let field_name = AmlName::single(crate::name_object::NameSeg(seg));
                let scope = ctx.current_scope();
                let node = ctx.namespace.create(&field_name, &scope, NodeKind::Field(payload))?;
                record_created(ctx, &node);

                bit_offset += bit_size;
            }
            other => return Err(ctx.raise_fatal(crate::FATAL_UNKNOWN_OPCODE, other as u32, 0)),
        }
    }

    ctx.stacks.block.last_mut().unwrap().pc = end;
    Ok(())
}

/// Parses a `DefIndexField`'s body (`spec.md` §4.4 "IndexField"): two region
/// names (index register, data register), a flags byte, then the same
/// `FieldList` grammar as `Field`, each named element installing an
/// `IndexField` node.
pub(super) fn parse_index_field_list(ctx: &mut AmlContext, start: usize, end: usize) -> Result<(), AmlError> {
    let code = ctx.current_code();
    let mut pc = start;

    let (index_name, len) = parser::name_string(&code[pc..end])?.ok_or(AmlError::InvalidNameSeg)?;
    pc += len;
    let (data_name, len) = parser::name_string(&code[pc..end])?.ok_or(AmlError::InvalidNameSeg)?;
    pc += len;
    let scope = ctx.current_scope();
    let index = ctx.namespace.resolve(&index_name, &scope).ok_or_else(|| AmlError::ValueDoesNotExist(index_name))?;
    let data = ctx.namespace.resolve(&data_name, &scope).ok_or_else(|| AmlError::ValueDoesNotExist(data_name))?;

    let base_flags = FieldFlags::from_byte(*code.get(pc).ok_or(AmlError::UnexpectedEndOfStream)?)?;
    pc += 1;
    let mut access_type = base_flags.access_type;
    let mut bit_offset: u64 = 0;

    while pc < end {
        match code[pc] {
            0x00 => {
                pc += 1;
                let pkg = parser::pkg_length(&code[pc..end])?;
                pc += pkg.encoded_len;
                bit_offset += pkg.end as u64;
            }
            0x01 => {
                pc += 1;
                let access_byte = *code.get(pc).ok_or(AmlError::UnexpectedEndOfStream)?;
                pc += 2;
                access_type = access_type_from_byte(access_byte)?;
            }
            0x03 => {
                pc += 1;
                let access_byte = *code.get(pc).ok_or(AmlError::UnexpectedEndOfStream)?;
                pc += 3;
                access_type = access_type_from_byte(access_byte)?;
            }
            0x02 => {
                pc += 1;
                let (_connection, len) = parser::name_string(&code[pc..end])?.ok_or(AmlError::InvalidNameSeg)?;
                pc += len;
            }
            _ if opcode::is_name_char(code[pc]) => {
                if pc + 4 > end {
                    return Err(AmlError::UnexpectedEndOfStream);
                }
                let mut seg = [0u8; 4];
                seg.copy_from_slice(&code[pc..pc + 4]);
                pc += 4;
                let pkg = parser::pkg_length(&code[pc..end])?;
                pc += pkg.encoded_len;
                let bit_size = pkg.end as u64;

                let flags = FieldFlags { access_type, lock: base_flags.lock, update_rule: base_flags.update_rule };
                let payload =
                    IndexFieldPayload { index: index.clone(), data: data.clone(), bit_offset, bit_size, flags };
                let field_name = AmlName::single(crate::name_object::NameSeg(seg));
                let scope = ctx.current_scope();
                let node = ctx.namespace.create(&field_name, &scope, NodeKind::IndexField(payload))?;
                record_created(ctx, &node);

                bit_offset += bit_size;
            }
            other => return Err(ctx.raise_fatal(crate::FATAL_UNKNOWN_OPCODE, other as u32, 0)),
        }
    }

    ctx.stacks.block.last_mut().unwrap().pc = end;
    Ok(())
}
