//! The namespace: a tree of named nodes addressed by 4-character segments
//! (`spec.md` §3 "Node" and §4.1 "Name Resolution").

use crate::{
    name_object::{AmlName, NameSeg},
    value::{AmlValue, MethodCode},
    AmlError,
};
use alloc::{
    rc::{Rc, Weak},
    vec::Vec,
};
use core::cell::RefCell;

/// Address-space id for an `OperationRegion` node, and the PCI routing
/// coordinates it caches once resolved (`spec.md` §4.5).
#[derive(Clone, Copy, Debug)]
pub struct OpRegionPayload {
    pub space: crate::value::RegionSpace,
    pub base: u64,
    pub length: u64,
}

#[derive(Clone, Debug)]
pub struct FieldPayload {
    pub region: NodeHandle,
    pub bit_offset: u64,
    pub bit_size: u64,
    pub flags: crate::value::FieldFlags,
}

#[derive(Clone, Debug)]
pub struct IndexFieldPayload {
    pub index: NodeHandle,
    pub data: NodeHandle,
    pub bit_offset: u64,
    pub bit_size: u64,
    pub flags: crate::value::FieldFlags,
}

#[derive(Clone, Debug)]
pub struct BufferFieldPayload {
    pub buffer: NodeHandle,
    pub bit_offset: u64,
    pub bit_size: u64,
}

#[derive(Clone, Debug)]
pub struct ProcessorPayload {
    pub proc_id: u8,
    pub pblk_addr: u32,
    pub pblk_len: u8,
}

/// The type-specific payload of a namespace node (`spec.md` §3 "Node").
pub enum NodeKind {
    Root,
    /// A plain namespace container with no payload of its own, e.g. a `Scope`
    /// construct or one of the predefined roots (`\_SB`, `\_GPE`, ...).
    Scope,
    Device,
    ThermalZone,
    PowerResource,
    Event,
    Mutex { sync_level: u8 },
    Name(AmlValue),
    Method { arg_count: u8, serialized: bool, code: MethodCode },
    Alias(NodeHandle),
    OperationRegion(OpRegionPayload),
    Field(FieldPayload),
    IndexField(IndexFieldPayload),
    BufferField(BufferFieldPayload),
    Processor(ProcessorPayload),
}

pub struct Node {
    pub name: NameSeg,
    pub parent: Option<Weak<RefCell<Node>>>,
    pub kind: NodeKind,
    pub children: Vec<NodeHandle>,
}

/// A strong reference to a namespace node. Equivalent to `spec.md`'s
/// pointer-to-node `Handle` payload; `Rc` gives us the required "stable
/// identity, cheap to copy" property without a separate arena index.
#[derive(Clone)]
pub struct NodeHandle(pub Rc<RefCell<Node>>);

impl PartialEq for NodeHandle {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for NodeHandle {}

impl NodeHandle {
    fn new(name: NameSeg, parent: Option<&NodeHandle>, kind: NodeKind) -> NodeHandle {
        NodeHandle(Rc::new(RefCell::new(Node {
            name,
            parent: parent.map(|p| Rc::downgrade(&p.0)),
            kind,
            children: Vec::new(),
        })))
    }

    /// A node with no place in the tree, used to back a `Create*Field`'s
    /// source buffer when it was produced as a bare value rather than a
    /// reference to an existing `Name` node (`spec.md` §4.4 "Node
    /// (declarative)"). Still a live `Rc`, so writes through it are visible
    /// to anyone else holding the same buffer body.
    pub(crate) fn detached(kind: NodeKind) -> NodeHandle {
        NodeHandle::new(NameSeg::EMPTY, None, kind)
    }

    pub fn name(&self) -> NameSeg {
        self.0.borrow().name
    }

    pub fn parent(&self) -> Option<NodeHandle> {
        self.0.borrow().parent.as_ref().and_then(|w| w.upgrade()).map(NodeHandle)
    }

    pub fn child(&self, seg: NameSeg) -> Option<NodeHandle> {
        self.0.borrow().children.iter().find(|c| c.name() == seg).cloned()
    }

    /// Final alias target, following a chain iteratively (not recursively)
    /// so a cyclic `Alias` chain is rejected rather than overflowing the
    /// native stack (`spec.md` §9 "Cycles").
    pub fn resolve_alias(&self) -> Result<NodeHandle, AmlError> {
        let mut current = self.clone();
        let mut hops = 0;
        loop {
            let next = match &current.0.borrow().kind {
                NodeKind::Alias(target) => target.clone(),
                _ => return Ok(current),
            };
            current = next;
            hops += 1;
            if hops > 256 {
                return Err(AmlError::AliasCycle);
            }
        }
    }

    /// Full path from the root, for diagnostics.
    pub fn path(&self) -> AmlName {
        let mut segs = Vec::new();
        let mut cur = Some(self.clone());
        while let Some(node) = cur {
            if node.parent().is_none() {
                break;
            }
            segs.push(node.name());
            cur = node.parent();
        }
        segs.reverse();
        AmlName { absolute: true, parent_climbs: 0, segments: segs }
    }
}

/// The namespace tree. Nodes created while a method is executing are also
/// recorded on that invocation's per-method node list (see `exec`), and are
/// uninstalled (unlinked from their parent) when the method returns
/// (`spec.md` §3 "Ownership and lifecycle").
pub struct Namespace {
    pub root: NodeHandle,
}

impl Namespace {
    pub fn new() -> Namespace {
        let root = NodeHandle::new(NameSeg::EMPTY, None, NodeKind::Root);
        Namespace { root }
    }

    /// Resolves a parsed name against a context node (`spec.md` §4.1).
    pub fn resolve(&self, name: &AmlName, context: &NodeHandle) -> Option<NodeHandle> {
        if name.search_scopes() {
            let seg = name.segments[0];
            let mut scope = Some(context.clone());
            while let Some(node) = scope {
                if let Some(child) = node.child(seg) {
                    return Some(child);
                }
                scope = node.parent();
            }
            None
        } else {
            let mut node = if name.absolute { self.root.clone() } else { context.clone() };
            for _ in 0..name.parent_climbs {
                node = node.parent()?;
            }
            for seg in &name.segments {
                node = node.child(*seg)?;
            }
            Some(node)
        }
    }

    pub fn resolve_path(&self, path: &AmlName) -> Result<NodeHandle, AmlError> {
        self.resolve(path, &self.root).ok_or_else(|| AmlError::ValueDoesNotExist(path.clone()))
    }

    /// Creates a new node at `name`, climbing/descending as `resolve` would
    /// but requiring every intermediate segment to already exist
    /// (`spec.md` §4.1 "Creating a new node").
    pub fn create(&self, name: &AmlName, context: &NodeHandle, kind: NodeKind) -> Result<NodeHandle, AmlError> {
        if name.segments.is_empty() {
            return Err(AmlError::EmptyNamesAreInvalid);
        }
        let mut node = if name.absolute { self.root.clone() } else { context.clone() };
        for _ in 0..name.parent_climbs {
            node = node.parent().ok_or_else(|| AmlError::InvalidNormalizedName(name.clone()))?;
        }
        for seg in &name.segments[..name.segments.len() - 1] {
            node = node.child(*seg).ok_or_else(|| AmlError::LevelDoesNotExist(name.clone()))?;
        }
        let last = *name.segments.last().unwrap();
        if node.child(last).is_some() {
            return Err(AmlError::NameCollision(name.clone()));
        }
        let new_node = NodeHandle::new(last, Some(&node), kind);
        node.0.borrow_mut().children.push(new_node.clone());
        Ok(new_node)
    }

    /// Unlinks `node` from its parent's child list (`spec.md` §3 "per-method
    /// node"). The node itself is dropped once its last `Rc` strong
    /// reference disappears.
    pub fn uninstall(&self, node: &NodeHandle) {
        if let Some(parent) = node.parent() {
            parent.0.borrow_mut().children.retain(|c| c != node);
        }
    }

    /// GPE handler methods (`_Lxx`/`_Exx`) registered directly under
    /// `\_GPE`. Pure namespace querying: dispatching a raised GPE to one of
    /// these remains a host concern, not the core's.
    pub fn gpe_methods(&self) -> Vec<NodeHandle> {
        let gpe_name = AmlName::from_str("\\_GPE").expect("predefined name is well-formed");
        let gpe = match self.resolve_path(&gpe_name) {
            Ok(node) => node,
            Err(_) => return Vec::new(),
        };
        gpe.0
            .borrow()
            .children
            .iter()
            .filter(|child| is_gpe_handler_name(child.name()) && matches!(child.0.borrow().kind, NodeKind::Method { .. }))
            .cloned()
            .collect()
    }
}

fn is_gpe_handler_name(seg: NameSeg) -> bool {
    let bytes = seg.0;
    bytes[0] == b'_' && (bytes[1] == b'L' || bytes[1] == b'E') && bytes[2].is_ascii_hexdigit() && bytes[3].is_ascii_hexdigit()
}

impl Default for Namespace {
    fn default() -> Namespace {
        Namespace::new()
    }
}
