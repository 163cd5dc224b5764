//! The AML object system (`spec.md` §3 "Variable" and §4.2 "Object Operations").
//!
//! `AmlValue` is the tagged variant representing any AML value. String,
//! Buffer, and Package bodies are heap-allocated and reference-counted;
//! we use `Rc<RefCell<_>>` so Rust's own strong count gives us the refcount
//! invariant `spec.md` describes for free, rather than hand-rolling one.

use crate::{namespace::NodeHandle, name_object::AmlName, AmlContext, AmlError};
use alloc::{rc::Rc, string::String, vec, vec::Vec};
use core::cell::RefCell;

pub type ArgNum = u8;
pub type LocalNum = u8;

/// The coarse, public type of an `AmlValue`, as returned by `get_type`
/// (`spec.md` §4.2). `LazyHandle` is resolved on demand and reports the
/// underlying node's public type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmlType {
    None,
    Integer,
    String,
    Buffer,
    Package,
    Device,
    FieldUnit,
    BufferField,
    Mutex,
    Event,
    Method,
    PowerResource,
    Processor,
    ThermalZone,
    ObjectReference,
}

/// Up to seven arguments passed to a control method invocation.
#[derive(Clone, Debug, Default)]
pub struct Args {
    pub values: Vec<AmlValue>,
}

impl Args {
    pub const EMPTY: Args = Args { values: Vec::new() };

    pub fn arg(&self, num: ArgNum) -> Result<&AmlValue, AmlError> {
        self.values.get(num as usize).ok_or(AmlError::InvalidArgAccess(num))
    }
}

/// A native (host-implemented) control method body, used for the
/// overridable `_OSI`/`_OS`/`_REV` roots (`spec.md` §4.6).
pub type NativeMethod = Rc<dyn Fn(&mut AmlContext, &Args) -> Result<AmlValue, AmlError>>;

#[derive(Clone)]
pub enum MethodCode {
    /// Offset and length of the method body within its owning AML segment.
    Aml { segment: usize, offset: usize, length: usize },
    Native(NativeMethod),
}

/// Access type, bits 0-3 of a field-list flags byte (`spec.md` §4.5/§6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldAccessType {
    Any,
    Byte,
    Word,
    DWord,
    QWord,
    Buffer,
}

/// Update rule, bits 5-6 of a field-list flags byte (`spec.md` §4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldUpdateRule {
    Preserve,
    WriteAsOnes,
    WriteAsZeros,
}

/// A decoded field-list flags byte.
#[derive(Clone, Copy, Debug)]
pub struct FieldFlags {
    pub access_type: FieldAccessType,
    pub lock: bool,
    pub update_rule: FieldUpdateRule,
}

impl FieldFlags {
    pub fn from_byte(byte: u8) -> Result<FieldFlags, AmlError> {
        let access_type = match byte & 0x0F {
            0 => FieldAccessType::Any,
            1 => FieldAccessType::Byte,
            2 => FieldAccessType::Word,
            3 => FieldAccessType::DWord,
            4 => FieldAccessType::QWord,
            5 => FieldAccessType::Buffer,
            _ => return Err(AmlError::InvalidFieldFlags),
        };
        let lock = (byte & 0x10) != 0;
        let update_rule = match (byte >> 5) & 0x3 {
            0 => FieldUpdateRule::Preserve,
            1 => FieldUpdateRule::WriteAsOnes,
            2 => FieldUpdateRule::WriteAsZeros,
            _ => return Err(AmlError::InvalidFieldFlags),
        };
        Ok(FieldFlags { access_type, lock, update_rule })
    }
}

/// OperationRegion address space id (`spec.md` §3 "Node" / §4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegionSpace {
    SystemMemory,
    SystemIo,
    PciConfig,
    EmbeddedControl,
    SMBus,
    Cmos,
    PciBar,
    Ipmi,
}

impl RegionSpace {
    pub fn from_byte(byte: u8) -> Result<RegionSpace, AmlError> {
        Ok(match byte {
            0 => RegionSpace::SystemMemory,
            1 => RegionSpace::SystemIo,
            2 => RegionSpace::PciConfig,
            3 => RegionSpace::EmbeddedControl,
            4 => RegionSpace::SMBus,
            5 => RegionSpace::Cmos,
            6 => RegionSpace::PciBar,
            7 => RegionSpace::Ipmi,
            other => return Err(AmlError::InvalidRegionSpace(other)),
        })
    }
}

/// The shape of the `_STA` status bitmask, as a decoded convenience struct.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusObject {
    pub present: bool,
    pub enabled: bool,
    pub show_in_ui: bool,
    pub functional: bool,
    pub battery_present: bool,
}

impl StatusObject {
    pub fn from_integer(value: u64) -> StatusObject {
        StatusObject {
            present: value & 1 != 0,
            enabled: value & 2 != 0,
            show_in_ui: value & 4 != 0,
            functional: value & 8 != 0,
            battery_present: value & 16 != 0,
        }
    }
}

/// Any AML value (`spec.md` §3). String/Buffer/Package carry a shared,
/// reference-counted heap body; the three `*Index` variants are references
/// produced by `Index`/`RefOf` into such a body.
#[derive(Clone)]
pub enum AmlValue {
    Uninitialized,
    Integer(u64),
    String(Rc<RefCell<String>>),
    Buffer(Rc<RefCell<Vec<u8>>>),
    Package(Rc<RefCell<Vec<AmlValue>>>),
    Handle(NodeHandle),
    /// An as-yet-unresolved name, resolved the first time its type or value
    /// is queried (`spec.md` §3 "Handles").
    LazyHandle { name: AmlName, scope: AmlName },
    StringIndex(Rc<RefCell<String>>, usize),
    BufferIndex(Rc<RefCell<Vec<u8>>>, usize),
    PackageIndex(Rc<RefCell<Vec<AmlValue>>>, usize),
}

impl AmlValue {
    pub fn zero() -> AmlValue {
        AmlValue::Integer(0)
    }

    pub fn ones() -> AmlValue {
        AmlValue::Integer(u64::MAX)
    }

    pub fn new_string(s: String) -> AmlValue {
        AmlValue::String(Rc::new(RefCell::new(s)))
    }

    pub fn new_buffer(len: usize) -> AmlValue {
        AmlValue::Buffer(Rc::new(RefCell::new(vec![0u8; len])))
    }

    pub fn new_package(len: usize) -> AmlValue {
        AmlValue::Package(Rc::new(RefCell::new(vec![AmlValue::Uninitialized; len])))
    }

    /// Deep clone: duplicates heap bodies so the result shares none with
    /// `self` (`spec.md` §4.2 `clone`). Packages recurse into their elements.
    pub fn deep_clone(&self) -> AmlValue {
        match self {
            AmlValue::String(s) => AmlValue::new_string(s.borrow().clone()),
            AmlValue::Buffer(b) => AmlValue::Buffer(Rc::new(RefCell::new(b.borrow().clone()))),
            AmlValue::Package(p) => {
                let cloned: Vec<AmlValue> = p.borrow().iter().map(|v| v.deep_clone()).collect();
                AmlValue::Package(Rc::new(RefCell::new(cloned)))
            }
            other => other.clone(),
        }
    }

    pub fn type_of(&self) -> AmlType {
        match self {
            AmlValue::Uninitialized => AmlType::None,
            AmlValue::Integer(_) => AmlType::Integer,
            AmlValue::String(_) => AmlType::String,
            AmlValue::Buffer(_) => AmlType::Buffer,
            AmlValue::Package(_) => AmlType::Package,
            AmlValue::Handle(_) | AmlValue::LazyHandle { .. } => AmlType::Device,
            AmlValue::StringIndex(..) | AmlValue::BufferIndex(..) | AmlValue::PackageIndex(..) => {
                AmlType::ObjectReference
            }
        }
    }

    pub fn as_integer(&self) -> Result<u64, AmlError> {
        match self {
            AmlValue::Integer(value) => Ok(*value),
            other => {
                Err(AmlError::IncompatibleValueConversion { current: other.type_of(), target: AmlType::Integer })
            }
        }
    }

    pub fn as_buffer(&self) -> Result<Rc<RefCell<Vec<u8>>>, AmlError> {
        match self {
            AmlValue::Buffer(b) => Ok(b.clone()),
            other => Err(AmlError::IncompatibleValueConversion { current: other.type_of(), target: AmlType::Buffer }),
        }
    }

    pub fn as_package(&self) -> Result<Rc<RefCell<Vec<AmlValue>>>, AmlError> {
        match self {
            AmlValue::Package(p) => Ok(p.clone()),
            other => Err(AmlError::IncompatibleValueConversion { current: other.type_of(), target: AmlType::Package }),
        }
    }

    pub fn as_string(&self) -> Result<Rc<RefCell<String>>, AmlError> {
        match self {
            AmlValue::String(s) => Ok(s.clone()),
            other => Err(AmlError::IncompatibleValueConversion { current: other.type_of(), target: AmlType::String }),
        }
    }

    /// The `SizeOf` reducer's length, for string/buffer/package values
    /// (`spec.md` §4.4.1).
    pub fn size_of(&self) -> Result<u64, AmlError> {
        match self {
            AmlValue::String(s) => Ok(s.borrow().len() as u64),
            AmlValue::Buffer(b) => Ok(b.borrow().len() as u64),
            AmlValue::Package(p) => Ok(p.borrow().len() as u64),
            other => Err(AmlError::InvalidSizeOfApplication(other.type_of())),
        }
    }
}

/// Move semantics: swaps `src`'s body into `dst`, leaving `src` empty.
/// Implemented via `mem::swap` through a temporary so `dst == src` is safe,
/// matching `spec.md` §4.2's "swap-through-temporary" requirement even
/// though Rust's `mem::swap` already guards self-aliasing.
pub fn move_value(dst: &mut AmlValue, src: &mut AmlValue) {
    let mut temp = AmlValue::Uninitialized;
    core::mem::swap(&mut temp, src);
    core::mem::swap(dst, &mut temp);
}
