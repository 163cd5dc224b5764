//! The OperationRegion read/write engine (`spec.md` §4.5).
//!
//! Translates field reads/writes into access-width-aligned accesses against
//! the `Handler`-provided memory, I/O, and PCI-config primitives, honoring
//! a field's access type, lock, and update-rule flags.

use crate::{
    name_object::NameSeg,
    namespace::{BufferFieldPayload, FieldPayload, IndexFieldPayload, NodeHandle, NodeKind, OpRegionPayload},
    value::{AmlValue, AmlType, Args, FieldAccessType, FieldUpdateRule, RegionSpace},
    AmlContext, AmlError,
};
use alloc::vec;
use bit_field::BitField;

/// Computes the access width in bits for a field, per `spec.md` §4.5.
fn access_width(field: &FieldPayload) -> u64 {
    match field.flags.access_type {
        FieldAccessType::Byte => 8,
        FieldAccessType::Word => 16,
        FieldAccessType::DWord => 32,
        FieldAccessType::QWord => 64,
        FieldAccessType::Buffer => 8, // Buffer-acquire access is not modeled beyond byte units.
        FieldAccessType::Any => {
            let max = match region_space(field) {
                Some(RegionSpace::SystemMemory) => 64,
                _ => 32,
            };
            let mut width = field.bit_size.next_power_of_two().max(8);
            if width > max {
                width = max;
            }
            width
        }
    }
}

fn region_space(field: &FieldPayload) -> Option<RegionSpace> {
    match &field.region.0.borrow().kind {
        NodeKind::OperationRegion(region) => Some(region.space),
        _ => None,
    }
}

/// One access-unit-aligned slice of a field's bit range: the index of the
/// access unit, the slice's length in bits, the bit offset of the slice
/// within that unit, and the bit offset of the slice within the field's own
/// value (`spec.md` §4.5).
struct Slice {
    unit_index: u64,
    in_unit_offset: u64,
    len: u64,
    field_offset: u64,
}

fn slices(bit_offset: u64, bit_size: u64, width: u64) -> vec::Vec<Slice> {
    let mut out = vec::Vec::new();
    let aligned_start = (bit_offset / width) * width;
    let mut unit_base = aligned_start;
    let mut produced = 0u64;
    while produced < bit_size {
        let window_start = unit_base.max(bit_offset);
        let window_end = (unit_base + width).min(bit_offset + bit_size);
        if window_end > window_start {
            out.push(Slice {
                unit_index: unit_base / width,
                in_unit_offset: window_start - unit_base,
                len: window_end - window_start,
                field_offset: window_start - bit_offset,
            });
            produced += window_end - window_start;
        }
        unit_base += width;
    }
    out
}

/// `(seg, bus, slot, func)` coordinates for a PCI-config region, resolved
/// once per field operation (`spec.md` §4.5).
type PciCoords = (u16, u8, u8, u8);

fn read_region_unit(
    ctx: &AmlContext,
    region: &OpRegionPayload,
    pci: Option<PciCoords>,
    unit_index: u64,
    width: u64,
) -> Result<u64, AmlError> {
    let byte_offset = unit_index * (width / 8);
    let address = region.base + byte_offset;
    match region.space {
        RegionSpace::SystemMemory => Ok(match width {
            8 => ctx.handler.read_u8(address as usize) as u64,
            16 => ctx.handler.read_u16(address as usize) as u64,
            32 => ctx.handler.read_u32(address as usize) as u64,
            64 => ctx.handler.read_u64(address as usize),
            _ => return Err(AmlError::FieldInvalidAccessSize),
        }),
        RegionSpace::SystemIo => {
            if address > u64::from(u16::MAX) {
                return Err(AmlError::FieldInvalidAddress);
            }
            Ok(match width {
                8 => ctx.handler.read_io_u8(address as u16) as u64,
                16 => ctx.handler.read_io_u16(address as u16) as u64,
                32 => ctx.handler.read_io_u32(address as u16) as u64,
                _ => return Err(AmlError::FieldInvalidAccessSize), // no 64-bit IO
            })
        }
        RegionSpace::PciConfig => {
            let (seg, bus, slot, func) = pci.ok_or(AmlError::FieldInvalidAddress)?;
            Ok(match width {
                8 => ctx.handler.read_pci_u8(seg, bus, slot, func, address as u16) as u64,
                16 => ctx.handler.read_pci_u16(seg, bus, slot, func, address as u16) as u64,
                32 => ctx.handler.read_pci_u32(seg, bus, slot, func, address as u16) as u64,
                _ => return Err(AmlError::FieldInvalidAccessSize),
            })
        }
        other => Err(AmlError::UnsupportedAddressSpace(other)),
    }
}

fn write_region_unit(
    ctx: &AmlContext,
    region: &OpRegionPayload,
    pci: Option<PciCoords>,
    unit_index: u64,
    width: u64,
    value: u64,
) -> Result<(), AmlError> {
    let byte_offset = unit_index * (width / 8);
    let address = region.base + byte_offset;
    match region.space {
        RegionSpace::SystemMemory => {
            match width {
                8 => ctx.handler.write_u8(address as usize, value as u8),
                16 => ctx.handler.write_u16(address as usize, value as u16),
                32 => ctx.handler.write_u32(address as usize, value as u32),
                64 => ctx.handler.write_u64(address as usize, value),
                _ => return Err(AmlError::FieldInvalidAccessSize),
            }
            Ok(())
        }
        RegionSpace::SystemIo => {
            if address > u64::from(u16::MAX) {
                return Err(AmlError::FieldInvalidAddress);
            }
            match width {
                8 => ctx.handler.write_io_u8(address as u16, value as u8),
                16 => ctx.handler.write_io_u16(address as u16, value as u16),
                32 => ctx.handler.write_io_u32(address as u16, value as u32),
                _ => return Err(AmlError::FieldInvalidAccessSize),
            }
            Ok(())
        }
        RegionSpace::PciConfig => {
            let (seg, bus, slot, func) = pci.ok_or(AmlError::FieldInvalidAddress)?;
            match width {
                8 => ctx.handler.write_pci_u8(seg, bus, slot, func, address as u16, value as u8),
                16 => ctx.handler.write_pci_u16(seg, bus, slot, func, address as u16, value as u16),
                32 => ctx.handler.write_pci_u32(seg, bus, slot, func, address as u16, value as u32),
                _ => return Err(AmlError::FieldInvalidAccessSize),
            }
            Ok(())
        }
        other => Err(AmlError::UnsupportedAddressSpace(other)),
    }
}

/// Resolves `(seg, bus, slot, func)` for a PCI-config region by evaluating
/// `_SEG`, `_BBN`, and `_ADR` on ancestors of the region node, each
/// defaulting to 0 if absent, except that `_ADR` is taken from the nearest
/// `Device`-typed ancestor (`spec.md` §4.5).
fn pci_coords_for_node(ctx: &mut AmlContext, region_node: &NodeHandle) -> Result<PciCoords, AmlError> {
    let mut seg = None;
    let mut bbn = None;
    let mut adr = None;

    let mut cursor = region_node.parent();
    while let Some(node) = cursor {
        if seg.is_none() {
            if let Some(v) = eval_child_if_present(ctx, &node, "_SEG")? {
                seg = Some(v.as_integer()? as u16);
            }
        }
        if bbn.is_none() {
            if let Some(v) = eval_child_if_present(ctx, &node, "_BBN")? {
                bbn = Some(v.as_integer()? as u8);
            }
        }
        if adr.is_none() && matches!(node.0.borrow().kind, NodeKind::Device) {
            if let Some(v) = eval_child_if_present(ctx, &node, "_ADR")? {
                adr = Some(v.as_integer()?);
            }
        }
        cursor = node.parent();
    }

    let adr = adr.unwrap_or(0);
    let slot = ((adr >> 16) & 0xFFFF) as u8;
    let func = (adr & 0xFFFF) as u8;
    Ok((seg.unwrap_or(0), bbn.unwrap_or(0), slot, func))
}

fn eval_child_if_present(ctx: &mut AmlContext, node: &NodeHandle, seg: &str) -> Result<Option<AmlValue>, AmlError> {
    let seg = NameSeg::from_str(seg)?;
    match node.child(seg) {
        Some(child) => Ok(Some(ctx.evaluate_node(&child, Args::default())?)),
        None => Ok(None),
    }
}

/// Reads the prior contents of an access unit, respecting the field's
/// update rule, before a partial write (`spec.md` §4.5 "Write").
fn prior_unit(
    ctx: &AmlContext,
    region: &OpRegionPayload,
    pci: Option<PciCoords>,
    unit_index: u64,
    width: u64,
    rule: FieldUpdateRule,
) -> Result<u64, AmlError> {
    Ok(match rule {
        FieldUpdateRule::Preserve => read_region_unit(ctx, region, pci, unit_index, width)?,
        FieldUpdateRule::WriteAsOnes => u64::MAX,
        FieldUpdateRule::WriteAsZeros => 0,
    })
}

/// Reads a `Field` (`spec.md` §4.5 "Read"). Returns an `Integer` when the
/// result fits in 64 bits, otherwise a `Buffer` of `ceil(bit_size/8)` bytes.
pub fn read_field(ctx: &mut AmlContext, field: &FieldPayload) -> Result<AmlValue, AmlError> {
    let width = access_width(field);
    let region = region_payload(field)?;
    let pci = pci_coords_if_needed(ctx, field, &region)?;

    if field.bit_size <= 64 {
        let mut result: u64 = 0;
        for slice in slices(field.bit_offset, field.bit_size, width) {
            let unit = read_region_unit(ctx, &region, pci, slice.unit_index, width)?;
            let piece = (unit >> slice.in_unit_offset) & mask(slice.len);
            result |= piece << slice.field_offset;
        }
        Ok(AmlValue::Integer(result))
    } else {
        let byte_len = ((field.bit_size + 7) / 8) as usize;
        let mut bytes = vec![0u8; byte_len];
        for slice in slices(field.bit_offset, field.bit_size, width) {
            let unit = read_region_unit(ctx, &region, pci, slice.unit_index, width)?;
            let piece = (unit >> slice.in_unit_offset) & mask(slice.len);
            write_bits_le(&mut bytes, slice.field_offset, slice.len, piece);
        }
        Ok(AmlValue::Buffer(alloc::rc::Rc::new(core::cell::RefCell::new(bytes))))
    }
}

/// Writes a `Field` (`spec.md` §4.5 "Write").
pub fn write_field(ctx: &mut AmlContext, field: &FieldPayload, value: &AmlValue) -> Result<(), AmlError> {
    let width = access_width(field);
    let region = region_payload(field)?;
    let pci = pci_coords_if_needed(ctx, field, &region)?;
    let rule = field.flags.update_rule;

    let source_bits = match value {
        AmlValue::Integer(i) => SourceBits::Integer(*i),
        AmlValue::Buffer(b) => SourceBits::Buffer(b.borrow().clone()),
        other => {
            return Err(AmlError::TypeCannotBeWrittenToBufferField(other.type_of()));
        }
    };

    for slice in slices(field.bit_offset, field.bit_size, width) {
        let prior = prior_unit(ctx, &region, pci, slice.unit_index, width, rule)?;
        let piece = source_bits.read_bits(slice.field_offset, slice.len);
        let cleared = prior & !(mask(slice.len) << slice.in_unit_offset);
        let updated = cleared | ((piece & mask(slice.len)) << slice.in_unit_offset);
        write_region_unit(ctx, &region, pci, slice.unit_index, width, updated)?;
    }
    Ok(())
}

fn pci_coords_if_needed(
    ctx: &mut AmlContext,
    field: &FieldPayload,
    region: &OpRegionPayload,
) -> Result<Option<PciCoords>, AmlError> {
    if region.space == RegionSpace::PciConfig {
        Ok(Some(pci_coords_for_node(ctx, &field.region)?))
    } else {
        Ok(None)
    }
}

enum SourceBits {
    Integer(u64),
    Buffer(vec::Vec<u8>),
}

impl SourceBits {
    fn read_bits(&self, offset: u64, len: u64) -> u64 {
        match self {
            SourceBits::Integer(v) => (v >> offset) & mask(len),
            SourceBits::Buffer(bytes) => read_bits_le(bytes, offset, len),
        }
    }
}

fn region_payload(field: &FieldPayload) -> Result<OpRegionPayload, AmlError> {
    match &field.region.0.borrow().kind {
        NodeKind::OperationRegion(region) => Ok(*region),
        _ => Err(AmlError::FieldRegionIsNotOpRegion),
    }
}

fn mask(bits: u64) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn write_bits_le(bytes: &mut [u8], bit_offset: u64, len: u64, value: u64) {
    for i in 0..len {
        let bit = ((value >> i) & 1) == 1;
        let global = bit_offset + i;
        let byte_index = (global / 8) as usize;
        let bit_index = (global % 8) as usize;
        if byte_index < bytes.len() {
            bytes[byte_index].set_bit(bit_index, bit);
        }
    }
}

fn read_bits_le(bytes: &[u8], bit_offset: u64, len: u64) -> u64 {
    let mut value = 0u64;
    for i in 0..len {
        let global = bit_offset + i;
        let byte_index = (global / 8) as usize;
        let bit_index = (global % 8) as usize;
        let bit = bytes.get(byte_index).map(|b| b.get_bit(bit_index)).unwrap_or(false);
        if bit {
            value |= 1 << i;
        }
    }
    value
}

/// `IndexField` read: writes a byte-aligned offset to the index field, then
/// reads the data field (`spec.md` §4.5 "IndexField").
pub fn read_index_field(ctx: &mut AmlContext, idx: &IndexFieldPayload) -> Result<AmlValue, AmlError> {
    let byte_offset = idx.bit_offset / 8;
    write_index_offset(ctx, idx, byte_offset)?;
    let data_field = data_field_payload(idx)?;
    read_field(ctx, &data_field)
}

/// `IndexField` write.
pub fn write_index_field(ctx: &mut AmlContext, idx: &IndexFieldPayload, value: &AmlValue) -> Result<(), AmlError> {
    let byte_offset = idx.bit_offset / 8;
    write_index_offset(ctx, idx, byte_offset)?;
    let data_field = data_field_payload(idx)?;
    write_field(ctx, &data_field, value)
}

fn write_index_offset(ctx: &mut AmlContext, idx: &IndexFieldPayload, byte_offset: u64) -> Result<(), AmlError> {
    let index_field = match &idx.index.0.borrow().kind {
        NodeKind::Field(f) => f.clone(),
        _ => return Err(AmlError::FieldRegionIsNotOpRegion),
    };
    write_field(ctx, &index_field, &AmlValue::Integer(byte_offset))
}

fn data_field_payload(idx: &IndexFieldPayload) -> Result<FieldPayload, AmlError> {
    match &idx.data.0.borrow().kind {
        NodeKind::Field(f) => {
            let mut f = f.clone();
            f.bit_offset %= 8;
            f.bit_size = idx.bit_size;
            f.flags = idx.flags;
            Ok(f)
        }
        _ => Err(AmlError::FieldRegionIsNotOpRegion),
    }
}

fn buffer_field_body(bf: &BufferFieldPayload) -> Result<alloc::rc::Rc<core::cell::RefCell<vec::Vec<u8>>>, AmlError> {
    match &bf.buffer.0.borrow().kind {
        NodeKind::Name(AmlValue::Buffer(b)) => Ok(b.clone()),
        _ => Err(AmlError::TypeCannotBeWrittenToBufferField(AmlType::BufferField)),
    }
}

/// `BufferField` read, using the same bit-packing as the region engine but
/// reading the buffer body directly (`spec.md` §4.5 "BufferField"). Returns
/// an `Integer` when the bit range fits in 64 bits, otherwise a `Buffer`.
pub fn read_buffer_field(ctx: &AmlContext, bf: &BufferFieldPayload) -> Result<AmlValue, AmlError> {
    let _ = ctx;
    let buffer = buffer_field_body(bf)?;
    let bytes = buffer.borrow();
    if bf.bit_size <= 64 {
        Ok(AmlValue::Integer(read_bits_le(&bytes, bf.bit_offset, bf.bit_size)))
    } else {
        let byte_len = ((bf.bit_size + 7) / 8) as usize;
        let mut out = vec![0u8; byte_len];
        for i in 0..bf.bit_size {
            let bit = bytes.get(((bf.bit_offset + i) / 8) as usize).map(|b| b.get_bit(((bf.bit_offset + i) % 8) as usize)).unwrap_or(false);
            if bit {
                out[(i / 8) as usize].set_bit((i % 8) as usize, true);
            }
        }
        Ok(AmlValue::Buffer(alloc::rc::Rc::new(core::cell::RefCell::new(out))))
    }
}

/// `BufferField` write, using the same bit-packing as the region engine but
/// targeting the buffer body directly (`spec.md` §4.5 "BufferField").
pub fn write_buffer_field(ctx: &mut AmlContext, bf: &BufferFieldPayload, value: &AmlValue) -> Result<(), AmlError> {
    let _ = ctx;
    let buffer = buffer_field_body(bf)?;
    let source_bits = match value {
        AmlValue::Integer(i) => SourceBits::Integer(*i),
        AmlValue::Buffer(b) => SourceBits::Buffer(b.borrow().clone()),
        other => return Err(AmlError::TypeCannotBeWrittenToBufferField(other.type_of())),
    };
    let source = source_bits.read_bits(0, bf.bit_size.min(64));
    let mut bytes = buffer.borrow_mut();
    write_bits_le(&mut bytes, bf.bit_offset, bf.bit_size.min(64), source);
    if bf.bit_size > 64 {
        if let SourceBits::Buffer(src_bytes) = &source_bits {
            for i in 64..bf.bit_size {
                let bit = src_bytes.get((i / 8) as usize).map(|b| b.get_bit((i % 8) as usize)).unwrap_or(false);
                let global = bf.bit_offset + i;
                bytes.get_mut((global / 8) as usize).map(|b| b.set_bit((global % 8) as usize, bit));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AmlContext, DebugVerbosity, Handler};
    use core::cell::RefCell;

    /// Backs memory/IO/PCI-config accesses with host-side byte arrays so
    /// OperationRegion scenarios can be exercised deterministically.
    struct TestHandler {
        memory: RefCell<vec::Vec<u8>>,
        pci: RefCell<vec::Vec<u8>>,
    }

    impl TestHandler {
        fn new(memory_len: usize) -> TestHandler {
            TestHandler { memory: RefCell::new(vec![0u8; memory_len]), pci: RefCell::new(vec![0u8; 256]) }
        }
    }

    impl Handler for TestHandler {
        fn read_u8(&self, address: usize) -> u8 {
            self.memory.borrow()[address]
        }
        fn read_u16(&self, address: usize) -> u16 {
            let m = self.memory.borrow();
            u16::from_le_bytes([m[address], m[address + 1]])
        }
        fn read_u32(&self, address: usize) -> u32 {
            let m = self.memory.borrow();
            u32::from_le_bytes([m[address], m[address + 1], m[address + 2], m[address + 3]])
        }
        fn read_u64(&self, address: usize) -> u64 {
            let lo = self.read_u32(address) as u64;
            let hi = self.read_u32(address + 4) as u64;
            lo | (hi << 32)
        }
        fn write_u8(&self, address: usize, value: u8) {
            self.memory.borrow_mut()[address] = value;
        }
        fn write_u16(&self, address: usize, value: u16) {
            let bytes = value.to_le_bytes();
            self.memory.borrow_mut()[address..address + 2].copy_from_slice(&bytes);
        }
        fn write_u32(&self, address: usize, value: u32) {
            let bytes = value.to_le_bytes();
            self.memory.borrow_mut()[address..address + 4].copy_from_slice(&bytes);
        }
        fn write_u64(&self, address: usize, value: u64) {
            self.write_u32(address, value as u32);
            self.write_u32(address + 4, (value >> 32) as u32);
        }
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
        fn read_pci_u8(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, offset: u16) -> u8 {
            self.pci.borrow()[offset as usize]
        }
        fn read_pci_u16(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, offset: u16) -> u16 {
            let p = self.pci.borrow();
            u16::from_le_bytes([p[offset as usize], p[offset as usize + 1]])
        }
        fn read_pci_u32(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, offset: u16) -> u32 {
            let p = self.pci.borrow();
            let o = offset as usize;
            u32::from_le_bytes([p[o], p[o + 1], p[o + 2], p[o + 3]])
        }
        fn write_pci_u8(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, offset: u16, value: u8) {
            self.pci.borrow_mut()[offset as usize] = value;
        }
        fn write_pci_u16(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, offset: u16, value: u16) {
            let bytes = value.to_le_bytes();
            self.pci.borrow_mut()[offset as usize..offset as usize + 2].copy_from_slice(&bytes);
        }
        fn write_pci_u32(&self, _segment: u16, _bus: u8, _device: u8, _function: u8, offset: u16, value: u32) {
            let bytes = value.to_le_bytes();
            self.pci.borrow_mut()[offset as usize..offset as usize + 4].copy_from_slice(&bytes);
        }
        fn stall(&self, _microseconds: u64) {}
        fn sleep(&self, _milliseconds: u64) {}
    }

    fn context() -> AmlContext {
        AmlContext::new(alloc::boxed::Box::new(TestHandler::new(64)), DebugVerbosity::None)
    }

    fn field(region: NodeHandle, bit_offset: u64, bit_size: u64, access: FieldAccessType) -> FieldPayload {
        FieldPayload {
            region,
            bit_offset,
            bit_size,
            flags: crate::value::FieldFlags { access_type: access, lock: false, update_rule: FieldUpdateRule::Preserve },
        }
    }

    fn memory_region(ctx: &mut AmlContext, base: u64, length: u64) -> NodeHandle {
        let root = ctx.namespace.root.clone();
        let name = crate::AmlName::from_str("\\REGN").unwrap();
        ctx.namespace
            .create(
                &name,
                &root,
                NodeKind::OperationRegion(OpRegionPayload { space: crate::value::RegionSpace::SystemMemory, base, length }),
            )
            .unwrap()
    }

    #[test]
    fn byte_field_round_trips_through_memory() {
        let mut ctx = context();
        let region = memory_region(&mut ctx, 0, 8);
        let f = field(region, 8, 8, FieldAccessType::Byte);
        write_field(&mut ctx, &f, &AmlValue::Integer(0xAB)).unwrap();
        assert_eq!(read_field(&mut ctx, &f).unwrap().as_integer().unwrap(), 0xAB);
    }

    #[test]
    fn field_spanning_two_units_reads_back_combined_value() {
        let mut ctx = context();
        let region = memory_region(&mut ctx, 0, 8);
        // 12-bit field starting at bit 4, straddling the first two bytes.
        let f = field(region, 4, 12, FieldAccessType::Byte);
        write_field(&mut ctx, &f, &AmlValue::Integer(0xABC)).unwrap();
        assert_eq!(read_field(&mut ctx, &f).unwrap().as_integer().unwrap(), 0xABC);
    }

    #[test]
    fn write_as_ones_update_rule_sets_untouched_bits() {
        let mut ctx = context();
        let region = memory_region(&mut ctx, 0, 8);
        let low_nibble = FieldPayload {
            region: region.clone(),
            bit_offset: 0,
            bit_size: 4,
            flags: crate::value::FieldFlags {
                access_type: FieldAccessType::Byte,
                lock: false,
                update_rule: FieldUpdateRule::WriteAsOnes,
            },
        };
        write_field(&mut ctx, &low_nibble, &AmlValue::Integer(0x5)).unwrap();
        let whole_byte = field(region, 0, 8, FieldAccessType::Byte);
        // low nibble is the written value, high nibble defaults to all-ones
        // since nothing else has touched this byte yet.
        assert_eq!(read_field(&mut ctx, &whole_byte).unwrap().as_integer().unwrap(), 0xF5);
    }

    #[test]
    fn buffer_field_round_trips_bit_accurately() {
        let mut ctx = context();
        let root = ctx.namespace.root.clone();
        let buffer_name = crate::AmlName::from_str("\\BUFF").unwrap();
        let buffer_node = ctx.namespace.create(&buffer_name, &root, NodeKind::Name(AmlValue::new_buffer(4))).unwrap();
        let bf = BufferFieldPayload { buffer: buffer_node, bit_offset: 3, bit_size: 5 };
        write_buffer_field(&mut ctx, &bf, &AmlValue::Integer(0b10101)).unwrap();
        assert_eq!(read_buffer_field(&ctx, &bf).unwrap().as_integer().unwrap(), 0b10101);
    }

    #[test]
    fn large_buffer_field_round_trips_through_a_buffer_value() {
        let mut ctx = context();
        let root = ctx.namespace.root.clone();
        let buffer_name = crate::AmlName::from_str("\\BIGB").unwrap();
        let buffer_node = ctx.namespace.create(&buffer_name, &root, NodeKind::Name(AmlValue::new_buffer(12))).unwrap();
        let bf = BufferFieldPayload { buffer: buffer_node, bit_offset: 0, bit_size: 80 };
        let source = AmlValue::Buffer(alloc::rc::Rc::new(RefCell::new((0u8..10).collect())));
        write_buffer_field(&mut ctx, &bf, &source).unwrap();
        let result = read_buffer_field(&ctx, &bf).unwrap().as_buffer().unwrap();
        assert_eq!(&*result.borrow(), &(0u8..10).collect::<vec::Vec<u8>>());
    }

    #[test]
    fn pci_config_field_resolves_coordinates_from_ancestors() {
        let mut ctx = context();
        let root = ctx.namespace.root.clone();
        let device = ctx.namespace.create(&crate::AmlName::from_str("\\DEV0").unwrap(), &root, NodeKind::Device).unwrap();
        ctx.namespace
            .create(&crate::AmlName::from_str("_ADR").unwrap(), &device, NodeKind::Name(AmlValue::Integer(0x0002_0001)))
            .unwrap();
        let region_name = crate::AmlName::from_str("REGN").unwrap();
        let region = ctx
            .namespace
            .create(
                &region_name,
                &device,
                NodeKind::OperationRegion(OpRegionPayload { space: crate::value::RegionSpace::PciConfig, base: 0x10, length: 4 }),
            )
            .unwrap();
        let f = field(region, 0, 32, FieldAccessType::DWord);
        write_field(&mut ctx, &f, &AmlValue::Integer(0xDEAD_BEEF)).unwrap();
        assert_eq!(read_field(&mut ctx, &f).unwrap().as_integer().unwrap(), 0xDEAD_BEEF);
    }
}
