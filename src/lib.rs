//! `aml-core` is a pure-Rust AML (ACPI Machine Language) bytecode interpreter, used for
//! executing the DSDT and SSDT tables from ACPI. This crate can be used by kernels to gather
//! information about the hardware, and invoke control methods to query and change the state of
//! devices in a hardware-independent way.
//!
//! ### Using the library
//! To use the library, create an `AmlContext` with `AmlContext::new()`, then hand it tables
//! containing AML (acquired via `Handler::scan_table`, probably backed by the `acpi` crate's
//! table discovery), mapped into the virtual address space. This parses the table, populating
//! the namespace with objects encoded by the AML. After this, the memory the table was mapped
//! into may be unmapped - everything the interpreter needs is allocated on the heap.
//!
//! Specific objects can then be read by name:
//! ```ignore
//! let value = aml_context.eval_named(&AmlName::from_str("\\_SB.PCI0.S08._ADR").unwrap());
//! ```
//!
//! And control methods invoked like this:
//! ```ignore
//! let result = aml_context.invoke_method(&AmlName::from_str("\\_SB.HPET._CRS").unwrap(), Args::default());
//! ```
//!
//! ### About the interpreter
//! Rather than recursing through the AML grammar natively (which would let firmware-supplied
//! bytecode drive the host's native call stack to overflow), the engine in `exec` drives four
//! explicit, heap-allocated stacks: a context stack (active scopes/methods), a block stack
//! (program-counter ranges), an item stack (in-progress constructs), and an operand stack
//! (collected sub-results). See `exec`'s module documentation for the state machine itself.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod eval;
mod exec;
mod name_object;
mod namespace;
mod opcode;
pub mod opregion;
mod parser;
mod table;
pub mod value;

pub use crate::{
    name_object::AmlName,
    namespace::*,
    table::AcpiTableHeader,
    value::{AmlType, AmlValue, Args},
};

use alloc::boxed::Box;
use exec::Stacks;
use log::{error, warn};
use name_object::NameSeg;
use value::MethodCode;

/// Describes how much debug information the interpreter should emit. Set the "maximum" expected
/// verbosity in the context's `debug_verbosity` - everything will be printed that is less than or
/// equal in 'verbosity'. The interpreter itself always traces opcode dispatch at
/// `log::Level::Trace` regardless of this setting; this knob additionally gates the
/// scope-entry/exit `debug!` lines `invoke_method` and `parse_table` emit.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum DebugVerbosity {
    /// Print no debug information.
    #[default]
    None,
    /// Print heads and tails when entering and leaving scopes of major objects (methods, tables).
    Scopes,
    /// Print heads and tails when entering and leaving scopes of all objects.
    AllScopes,
    /// Print heads and tails of all objects, and extra debug information as it's parsed.
    All,
}

/// The central type of the interpreter. Only one of these should be created, and it should be
/// passed the DSDT and all SSDTs defined by the hardware.
pub struct AmlContext {
    /// The `Handler` passed from the library user. Boxed as a trait object to avoid adding a
    /// lifetime and type parameter to `AmlContext`, which would otherwise infect every type in
    /// `exec`.
    handler: Box<dyn Handler>,

    pub namespace: Namespace,

    /// The four explicit execution stacks (see `exec`'s module documentation).
    stacks: Stacks,

    debug_verbosity: DebugVerbosity,
}

impl AmlContext {
    /// Creates a new `AmlContext`, pre-populating the namespace with the predefined scopes and
    /// objects every table is entitled to assume already exist.
    pub fn new(handler: Box<dyn Handler>, debug_verbosity: DebugVerbosity) -> AmlContext {
        let mut context =
            AmlContext { handler, namespace: Namespace::new(), stacks: Stacks::default(), debug_verbosity };
        context.add_predefined_objects();
        context
    }

    /// Parses and executes an AML table's top-level term list, populating the namespace with the
    /// objects it declares. `table` is the AML bytecode following the table header (see
    /// `table::AcpiTableHeader`).
    pub fn parse_table(&mut self, table: &[u8]) -> Result<(), AmlError> {
        if table.is_empty() {
            return Ok(());
        }
        if self.debug_verbosity >= DebugVerbosity::Scopes {
            log::debug!("aml: parsing table of {} bytes", table.len());
        }

        let root = self.namespace.root.clone();
        match self.load_table(table.into(), root) {
            Ok(()) => Ok(()),
            Err(err) => {
                error!("aml: failed to parse table: {:?}", err);
                Err(err)
            }
        }
    }

    /// Invokes a control method (or reads a non-method value) by absolute path (`spec.md` §4.4
    /// "Invoke"). AML frequently encodes a value that doesn't need computation (e.g. a static
    /// `_STA` integer) as a plain `Name` rather than a trivial `Method`; such names are simply
    /// read, matching the grammar treating "a control method invocation" as any object reference.
    pub fn invoke_method(&mut self, path: &AmlName, args: Args) -> Result<AmlValue, AmlError> {
        let node = self.namespace.resolve_path(path)?;
        let node = node.resolve_alias()?;
        if self.debug_verbosity >= DebugVerbosity::Scopes {
            log::debug!("aml: invoking {}", path.to_string_path());
        }
        self.evaluate_node(&node, args)
    }

    /// Reads the current value of a named object without passing any arguments - useful for
    /// objects that may validly be either a plain value or a zero-argument method (`spec.md`
    /// §4.2's `get_type`/"Invoke" distinction collapses for a no-argument read).
    pub fn eval_named(&mut self, path: &AmlName) -> Result<AmlValue, AmlError> {
        let node = self.namespace.resolve_path(path)?;
        let node = node.resolve_alias()?;
        self.evaluate_node(&node, Args::default())
    }

    /// Runs ACPI device initialization (`spec.md` §6 "Device enumeration"): unconditionally
    /// invokes `\_SB._INI` if present, then walks the namespace evaluating `_STA`/`_INI` on every
    /// `Device` node, recursing into a device's children only while it reports itself present or
    /// functional.
    pub fn initialize_objects(&mut self) -> Result<(), AmlError> {
        match self.invoke_method(&AmlName::from_str("\\_SB._INI")?, Args::default()) {
            Ok(_) => (),
            Err(AmlError::ValueDoesNotExist(_)) => (),
            Err(err) => return Err(err),
        }

        let root = self.namespace.root.clone();
        self.initialize_subtree(&root)
    }

    fn initialize_subtree(&mut self, node: &NodeHandle) -> Result<(), AmlError> {
        let is_device = matches!(node.0.borrow().kind, NodeKind::Device);
        let should_recurse = if is_device {
            let status = match node.child(NameSeg::from_str("_STA")?) {
                Some(sta) => {
                    value::StatusObject::from_integer(self.evaluate_node(&sta, Args::default())?.as_integer()?)
                }
                None => value::StatusObject::default(),
            };

            if status.present {
                if let Some(ini) = node.child(NameSeg::from_str("_INI")?) {
                    log::info!("aml: invoking _INI at {}", node.path().to_string_path());
                    self.evaluate_node(&ini, Args::default())?;
                }
            }
            status.present || status.functional
        } else {
            true
        };

        if !should_recurse {
            return Ok(());
        }

        let children: alloc::vec::Vec<NodeHandle> = node.0.borrow().children.clone();
        for child in children {
            self.initialize_subtree(&child)?;
        }
        Ok(())
    }

    /// Reports a Fatal-tier condition (`spec.md` §7) to the host via
    /// [`Handler::handle_fatal_error`] and hands back the `AmlError` a call site should propagate.
    /// The default `handle_fatal_error` panics and never returns; this only returns normally for a
    /// host-supplied `Handler` whose override chooses to come back instead of diverging.
    pub(crate) fn raise_fatal(&self, fatal_type: u8, fatal_code: u32, fatal_arg: u64) -> AmlError {
        self.handler.handle_fatal_error(fatal_type, fatal_code, fatal_arg);
        AmlError::FatalError
    }

    fn add_predefined_objects(&mut self) {
        let root = self.namespace.root.clone();

        // Scopes predefined by the ACPI spec: some tables access them without defining them
        // themselves, so they have to exist before any table is parsed.
        for scope in ["\\_GPE", "\\_SB", "\\_SI", "\\_PR", "\\_TZ"] {
            let name = AmlName::from_str(scope).expect("predefined scope name is well-formed");
            self.namespace.create(&name, &root, NodeKind::Scope).ok();
        }

        // `\_OS`: in the dark ages of ACPI 1.0, before `\_OSI`, this was how firmware was told
        // which OS was running. Modern firmware shouldn't use it, but to avoid surprises we
        // follow Linux in returning `"Microsoft Windows NT"`.
        let os_name = AmlName::from_str("\\_OS").expect("predefined name is well-formed");
        self.namespace
            .create(&os_name, &root, NodeKind::Name(AmlValue::new_string(alloc::string::String::from("Microsoft Windows NT"))))
            .ok();

        // `\_OSI`: introduced in ACPI 3.0 to let firmware query individual feature support
        // instead of OS identity, then immediately misused the same way `\_OS` was. We follow
        // Linux's answers to minimize breakage: claim every `Windows *` string, answer yes to
        // `_OSI("Darwin")`, and answer no (with a warning) to `_OSI("Linux")`.
        let osi_name = AmlName::from_str("\\_OSI").expect("predefined name is well-formed");
        let osi_method: value::NativeMethod = alloc::rc::Rc::new(|_ctx: &mut AmlContext, args: &Args| {
            let query = args.arg(0)?.as_string()?;
            let query = query.borrow();
            let supported = match query.as_str() {
                "Windows 2000" | "Windows 2001" | "Windows 2001 SP1" | "Windows 2001 SP2" | "Windows 2001.1"
                | "Windows 2001.1 SP1" | "Windows 2006" | "Windows 2006 SP1" | "Windows 2006 SP2" | "Windows 2006.1"
                | "Windows 2009" | "Windows 2012" | "Windows 2013" | "Windows 2015" | "Windows 2016" | "Windows 2017"
                | "Windows 2017.2" | "Windows 2018" | "Windows 2018.2" | "Windows 2019" => true,

                "Darwin" => true,

                "Linux" => {
                    warn!("aml: evaluated _OSI(\"Linux\"); reporting no support");
                    false
                }

                "Extended Address Space Descriptor" => true,
                "Module Device" => false,
                "3.0 Thermal Model" => true,
                "3.0 _SCP Extensions" => true,
                "Processor Aggregator Device" => false,

                _ => false,
            };
            Ok(if supported { AmlValue::ones() } else { AmlValue::zero() })
        });
        self.namespace
            .create(
                &osi_name,
                &root,
                NodeKind::Method { arg_count: 1, serialized: false, code: MethodCode::Native(osi_method) },
            )
            .ok();

        // `\_REV`: the supported ACPI specification revision. Firmware misused this to detect
        // Linux (even modern Windows reports `2`), so like everyone else we just return `2`.
        let rev_name = AmlName::from_str("\\_REV").expect("predefined name is well-formed");
        self.namespace.create(&rev_name, &root, NodeKind::Name(AmlValue::Integer(2))).ok();
    }
}

/// Trait used by [`AmlContext`] to access the memory, port I/O, and PCI configuration space of
/// the system it is interpreting AML for, and to discover ACPI tables. All accessors take `&self`
/// since implementations back them with raw volatile access to physical addresses/ports rather
/// than owned Rust state.
pub trait Handler: Send + Sync {
    fn read_u8(&self, address: usize) -> u8;
    fn read_u16(&self, address: usize) -> u16;
    fn read_u32(&self, address: usize) -> u32;
    fn read_u64(&self, address: usize) -> u64;

    fn write_u8(&self, address: usize, value: u8);
    fn write_u16(&self, address: usize, value: u16);
    fn write_u32(&self, address: usize, value: u32);
    fn write_u64(&self, address: usize, value: u64);

    fn read_io_u8(&self, port: u16) -> u8;
    fn read_io_u16(&self, port: u16) -> u16;
    fn read_io_u32(&self, port: u16) -> u32;

    fn write_io_u8(&self, port: u16, value: u8);
    fn write_io_u16(&self, port: u16, value: u16);
    fn write_io_u32(&self, port: u16, value: u32);

    fn read_pci_u8(&self, segment: u16, bus: u8, device: u8, function: u8, offset: u16) -> u8;
    fn read_pci_u16(&self, segment: u16, bus: u8, device: u8, function: u8, offset: u16) -> u16;
    fn read_pci_u32(&self, segment: u16, bus: u8, device: u8, function: u8, offset: u16) -> u32;

    fn write_pci_u8(&self, segment: u16, bus: u8, device: u8, function: u8, offset: u16, value: u8);
    fn write_pci_u16(&self, segment: u16, bus: u8, device: u8, function: u8, offset: u16, value: u16);
    fn write_pci_u32(&self, segment: u16, bus: u8, device: u8, function: u8, offset: u16, value: u32);

    /// Stall for at least the given number of **microseconds**. An implementation should not
    /// relinquish control of the processor during the stall, and for this reason firmware
    /// should not stall for periods of more than 100 microseconds.
    fn stall(&self, microseconds: u64);

    /// Sleep for at least the given number of **milliseconds**. An implementation may round to
    /// the closest sleep time supported, and should relinquish the processor.
    fn sleep(&self, milliseconds: u64);

    /// Locates the `index`-th ACPI table with the given four-byte `signature` (e.g. `b"SSDT"`),
    /// returning a pointer to its header if found. The interpreter's own `parse_table`/
    /// `invoke_method` never call this - it's surfaced for a host's table-acquisition front end
    /// (see `table::AcpiTableHeader`) and defaults to reporting nothing found.
    fn scan_table(&self, signature: [u8; 4], index: usize) -> Option<*const u8> {
        let _ = (signature, index);
        None
    }

    fn handle_fatal_error(&self, fatal_type: u8, fatal_code: u32, fatal_arg: u64) {
        panic!(
            "Fatal error while executing AML. fatal_type = {:?}, fatal_code = {:?}, fatal_arg = {:?}",
            fatal_type, fatal_code, fatal_arg
        );
    }
}

/// `fatal_type` values the interpreter itself passes to [`Handler::handle_fatal_error`] for the
/// Fatal-tier conditions `spec.md` §7 lists (unknown opcode in executable position, heterogeneous
/// comparison, undefined `Store` target). These aren't decoded from a `DefFatal` byte stream -
/// this crate doesn't dispatch that opcode - so they're chosen outside the byte range a real
/// `DefFatal`'s firmware-supplied `fatal_type` would plausibly use.
pub const FATAL_UNKNOWN_OPCODE: u8 = 0xF0;
pub const FATAL_HETEROGENEOUS_COMPARE: u8 = 0xF1;
pub const FATAL_UNDEFINED_STORE_TARGET: u8 = 0xF2;

/// The error type threaded through every fallible operation in the crate (`spec.md` §7
/// "Recoverable" and "Typed API" tiers; the "Fatal" tier instead calls
/// [`Handler::handle_fatal_error`] and does not return to the triggering entry point).
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AmlError {
    /*
     * Errors produced decoding the AML byte stream.
     */
    UnexpectedEndOfStream,
    UnexpectedByte(u8),
    /// Produced when a table's top-level parse doesn't settle into a clean "ran to completion".
    MalformedStream,
    InvalidNameSeg,
    InvalidPkgLength,
    InvalidFieldFlags,
    UnterminatedStringConstant,
    InvalidStringConstant,
    InvalidRegionSpace(u8),
    /// Emitted when a parser is clear the stream doesn't encode the construct it expected (e.g.
    /// the wrong opcode byte in a position with only one legal decoding).
    WrongParser,

    /*
     * Errors produced manipulating AML names.
     */
    EmptyNamesAreInvalid,
    /// Produced normalizing a path that climbs above the root of the namespace (e.g.
    /// `\_SB.^^PCI0`). The contained value is the name normalization was attempted upon.
    InvalidNormalizedName(AmlName),

    /*
     * Errors produced working with the namespace.
     */
    /// Produced when an intermediate segment of a name being created does not already exist.
    LevelDoesNotExist(AmlName),
    ValueDoesNotExist(AmlName),
    /// Produced when two values with the same name are added to the namespace.
    NameCollision(AmlName),
    /// An `Alias` chain looped back on itself rather than terminating.
    AliasCycle,

    /*
     * Errors produced executing control methods.
     */
    /// Produced when AML tries to do something only possible inside a control method (e.g. read
    /// an `Arg`/`Local`) while none is executing.
    NotExecutingControlMethod,
    /// Produced when a method accesses an argument it does not have.
    InvalidArgAccess(u8),
    /// Produced when a method accesses a local it has not stored into, or an out-of-range local.
    InvalidLocalAccess(u8),
    /// A `Break`/`Continue` was reached with no enclosing `While` to catch it.
    BreakOrContinueWithoutLoop,
    /// The engine's explicit stacks hit their depth ceiling - firmware-supplied AML nested
    /// constructs, or method-call chains, deeper than the interpreter permits.
    InterpreterStackOverflow,

    /*
     * Errors produced working with AML values.
     */
    IncompatibleValueConversion { current: AmlType, target: AmlType },
    InvalidStatusObject,
    FieldRegionIsNotOpRegion,
    FieldInvalidAddress,
    FieldInvalidAccessSize,
    /// A `Field`/`IndexField`/`OperationRegion` named an address space this `Handler` doesn't
    /// support (`spec.md` §9 Non-goals: only SystemMemory, SystemIO, and PciConfig are wired
    /// through to `Handler` callbacks).
    UnsupportedAddressSpace(value::RegionSpace),
    TypeCannotBeWrittenToBufferField(AmlType),
    InvalidSizeOfApplication(AmlType),
    /// `Divide`'s divisor operand evaluated to zero.
    DivideByZero,
    /// A reducer or accessor found a value it cannot act on in a position that otherwise typed
    /// correctly (e.g. `Acquire` naming a node that isn't a `Mutex`).
    UnexpectedResult,

    /// Returned by a Fatal-tier condition (`spec.md` §7) after it has already been reported via
    /// [`Handler::handle_fatal_error`] - reachable only if that call returns instead of
    /// diverging, since the default implementation panics.
    FatalError,

    /// Functionality not implemented by this interpreter.
    Unimplemented,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AmlContext>();
    }
}
