//! The execution engine (`spec.md` §4.4): a state machine driving four
//! explicit, heap-allocated stacks in place of native recursion, because
//! recursion depth on firmware-supplied input is adversarial
//! (`spec.md` §9 "Recursive AML evaluation replaced by explicit stacks").

mod declare;
mod reduce;
mod store;

use crate::{
    name_object::{AmlName, Target},
    namespace::{NodeHandle, NodeKind},
    opcode,
    parser::{self, DecodedOpcode},
    value::{AmlValue, Args},
    AmlContext, AmlError,
};
use alloc::{boxed::Box, rc::Rc, vec::Vec};
use log::trace;

/// Hard ceiling on each stack's depth: firmware-supplied AML is adversarial
/// input, so growth is checked before every push rather than left to an
/// allocator failure or a native stack overflow (`spec.md` §4.4 "Each stack
/// starts in a small inline array and relocates to a heap buffer... The
/// engine detects overflow before pushing").
const MAX_STACK_DEPTH: usize = 4096;

/// The five ways a sub-parse can be driven (`spec.md` §4.4 "Parse modes").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ParseMode {
    Exec,
    Object,
    Data,
    Reference,
    ImmediateByte,
    ImmediateWord,
}

impl ParseMode {
    fn keeps_result(self) -> bool {
        !matches!(self, ParseMode::Exec)
    }
}

/// Interpreter-internal stack value (`spec.md` §3 "Operand").
#[derive(Clone)]
pub(crate) enum Operand {
    Value(AmlValue),
    NullName,
    UnresolvedName(AmlName, NodeHandle),
    ResolvedName(NodeHandle),
    ArgName(u8),
    LocalName(u8),
    DebugName,
}

impl Operand {
    /// Reads an `Operand` as a value, resolving/evaluating named references
    /// (used when an `OBJECT`-mode position is actually consumed as data by
    /// a reducer, e.g. the dividend of `Divide`).
    fn into_value(self, ctx: &mut AmlContext) -> Result<AmlValue, AmlError> {
        match self {
            Operand::Value(v) => Ok(v),
            Operand::ArgName(num) => ctx.current_invocation()?.args.arg(num).cloned(),
            Operand::LocalName(num) => Ok(ctx.current_invocation()?.locals[num as usize].clone()),
            Operand::ResolvedName(node) => ctx.evaluate_node(&node, Args::default()),
            Operand::UnresolvedName(name, scope) => {
                let node = ctx.namespace.resolve(&name, &scope).ok_or(AmlError::ValueDoesNotExist(name))?;
                ctx.evaluate_node(&node, Args::default())
            }
            Operand::NullName => Ok(AmlValue::Uninitialized),
            Operand::DebugName => Ok(AmlValue::Uninitialized),
        }
    }

    /// Reinterprets an `Operand` collected in `REFERENCE` mode as a store
    /// target (`spec.md` §4.4.2).
    fn into_target(self) -> Target {
        match self {
            Operand::NullName => Target::Null,
            Operand::DebugName => Target::Debug,
            Operand::ArgName(n) => Target::Arg(n),
            Operand::LocalName(n) => Target::Local(n),
            Operand::ResolvedName(node) => Target::Name(node.path()),
            Operand::UnresolvedName(name, _) => Target::Name(name),
            Operand::Value(_) => Target::Null,
        }
    }
}

pub(crate) struct Invocation {
    pub args: Args,
    pub locals: Vec<AmlValue>,
    pub created_nodes: Vec<NodeHandle>,
}

impl Invocation {
    fn new(args: Args) -> Invocation {
        Invocation { args, locals: alloc::vec![AmlValue::Uninitialized; 8], created_nodes: Vec::new() }
    }
}

/// One active AML scope frame (`spec.md` §4.4 "Context stack").
pub(crate) struct ContextFrame {
    pub code: Rc<[u8]>,
    pub context_node: NodeHandle,
    pub invocation: Option<Invocation>,
}

/// The PC bound of one block-like item (`spec.md` §4.4 "Block stack").
#[derive(Clone, Copy)]
pub(crate) struct BlockFrame {
    pub pc: usize,
    pub limit: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CondState {
    ParsingPredicate,
    Executing,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LoopState {
    NotIterating,
    Iterating,
}

pub(crate) enum NodeOpKind {
    Name,
    OpRegion,
    ByteField,
    WordField,
    DwordField,
    QwordField,
}

impl NodeOpKind {
    /// Non-trailing-name arg modes consumed via the operand stack
    /// (`spec.md` §4.4 "Node (declarative)").
    fn arg_modes(&self) -> &'static [ParseMode] {
        match self {
            NodeOpKind::Name => &[ParseMode::Data],
            NodeOpKind::OpRegion => &[ParseMode::ImmediateByte, ParseMode::Object, ParseMode::Object],
            NodeOpKind::ByteField | NodeOpKind::WordField | NodeOpKind::DwordField | NodeOpKind::QwordField => {
                &[ParseMode::Object, ParseMode::Object]
            }
        }
    }

    fn trailing_name(&self) -> bool {
        matches!(self, NodeOpKind::ByteField | NodeOpKind::WordField | NodeOpKind::DwordField | NodeOpKind::QwordField)
    }
}

/// Expression reducers of `spec.md` §4.4.1.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ExprOp {
    Store,
    Not,
    Add,
    Subtract,
    Multiply,
    And,
    Or,
    Xor,
    ShiftLeft,
    ShiftRight,
    Divide,
    Increment,
    Decrement,
    LNot,
    LAnd,
    LOr,
    LEqual,
    LLess,
    LGreater,
    Index,
    DeRefOf,
    SizeOf,
    CondRefOf,
    Sleep,
    Acquire,
    Release,
}

impl ExprOp {
    fn arg_modes(&self) -> &'static [ParseMode] {
        use ExprOp::*;
        use ParseMode::*;
        match self {
            Store => &[Object, Reference],
            Not => &[Object, Reference],
            Add | Subtract | Multiply | And | Or | Xor | ShiftLeft | ShiftRight => &[Object, Object, Reference],
            Divide => &[Object, Object, Reference, Reference],
            Increment | Decrement => &[Reference],
            LNot | SizeOf | DeRefOf | Sleep => &[Object],
            LAnd | LOr | LEqual | LLess | LGreater => &[Object, Object],
            Index => &[Object, Object, Reference],
            CondRefOf => &[Reference, Reference],
            Acquire => &[Reference, ImmediateWord],
            Release => &[Reference],
        }
    }
}

pub(crate) enum ItemKind {
    /// Runs a block in EXEC mode until `pc == limit`, then pops its context
    /// and block frames. Used both for top-level table load and for nested
    /// scope bodies (Device/Scope/Processor/PowerResource/ThermalZone).
    Populate,
    /// Like `Populate`, plus an implicit `Return(0)` on fall-through and
    /// uninstallation of per-invocation namespace nodes.
    Method,
    Buffer { declared_len: Option<u64> },
    Package { declared_count: Option<u8> },
    Node { kind: NodeOpKind, name: Option<AmlName>, trailing_name: Option<AmlName> },
    Op { op: ExprOp },
    Invoke { method: NodeHandle },
    Return,
    Loop { state: LoopState, predicate_start: usize, pkg_end: usize },
    Cond { state: CondState, resume_pc: usize, true_range: (usize, usize), false_range: Option<(usize, usize)> },
}

/// One entry of the item stack: its kind plus the operand-stack depth it
/// was pushed at (`spec.md` §4.4 "opstack_frame") and whether its result
/// should be retained when it completes.
pub(crate) struct Item {
    pub kind: ItemKind,
    pub opstack_frame: usize,
    pub want_result: bool,
}

/// Control-flow signals raised by `Return`/`Break`/`Continue`, consumed by
/// `unwind_signal` rather than by native-recursive early return, so that
/// unwinding through arbitrarily many nested expression items stays on the
/// explicit stacks (`spec.md` §4.4 "Return", "Break", "Continue").
#[derive(Default)]
pub(crate) struct Stacks {
    pub context: Vec<ContextFrame>,
    pub block: Vec<BlockFrame>,
    pub item: Vec<Item>,
    pub operand: Vec<Operand>,
    pending_return: Option<AmlValue>,
    pending_break: bool,
    pending_continue: bool,
}

impl Stacks {
    fn push_context(&mut self, frame: ContextFrame) -> Result<(), AmlError> {
        check_depth(self.context.len())?;
        self.context.push(frame);
        Ok(())
    }

    fn push_block(&mut self, frame: BlockFrame) -> Result<(), AmlError> {
        check_depth(self.block.len())?;
        self.block.push(frame);
        Ok(())
    }

    fn push_item(&mut self, item: Item) -> Result<(), AmlError> {
        check_depth(self.item.len())?;
        self.item.push(item);
        Ok(())
    }

    fn push_operand(&mut self, operand: Operand) -> Result<(), AmlError> {
        check_depth(self.operand.len())?;
        self.operand.push(operand);
        Ok(())
    }
}

fn check_depth(current: usize) -> Result<(), AmlError> {
    if current >= MAX_STACK_DEPTH {
        Err(AmlError::InterpreterStackOverflow)
    } else {
        Ok(())
    }
}

impl AmlContext {
    pub(crate) fn current_invocation(&mut self) -> Result<&mut Invocation, AmlError> {
        self.stacks
            .context
            .iter_mut()
            .rev()
            .find_map(|frame| frame.invocation.as_mut())
            .ok_or(AmlError::NotExecutingControlMethod)
    }

    fn current_code(&self) -> Rc<[u8]> {
        self.stacks.context.last().expect("no active context frame").code.clone()
    }

    fn current_scope(&self) -> NodeHandle {
        self.stacks.context.last().expect("no active context frame").context_node.clone()
    }

    /// Evaluates a resolved node to a value: invokes `Method` nodes (with no
    /// arguments), delegates `Field`/`IndexField`/`BufferField` reads to the
    /// OperationRegion engine, and otherwise reads the node's stored value or
    /// produces a `Handle` (`spec.md` §4.4 "Invoke", §4.2 `get_type`).
    pub(crate) fn evaluate_node(&mut self, node: &NodeHandle, args: Args) -> Result<AmlValue, AmlError> {
        let node = node.resolve_alias()?;
        let kind_snapshot = match &node.0.borrow().kind {
            NodeKind::Name(v) => return Ok(v.clone()),
            NodeKind::Field(f) => Some(f.clone()),
            _ => None,
        };
        if let Some(field) = kind_snapshot {
            return crate::opregion::read_field(self, &field);
        }
        let is_index_field = matches!(node.0.borrow().kind, NodeKind::IndexField(_));
        if is_index_field {
            let payload = match &node.0.borrow().kind {
                NodeKind::IndexField(f) => f.clone(),
                _ => unreachable!(),
            };
            return crate::opregion::read_index_field(self, &payload);
        }
        let is_buffer_field = matches!(node.0.borrow().kind, NodeKind::BufferField(_));
        if is_buffer_field {
            let payload = match &node.0.borrow().kind {
                NodeKind::BufferField(f) => f.clone(),
                _ => unreachable!(),
            };
            return crate::opregion::read_buffer_field(self, &payload);
        }
        let is_method = matches!(node.0.borrow().kind, NodeKind::Method { .. });
        if is_method {
            return self.invoke_node(&node, args);
        }
        Ok(AmlValue::Handle(node))
    }

    /// Invokes a `Method` node, driving the engine in method mode
    /// (`spec.md` §4.4 "Invoke"/"Method").
    pub(crate) fn invoke_node(&mut self, node: &NodeHandle, args: Args) -> Result<AmlValue, AmlError> {
        let (code, native) = match &node.0.borrow().kind {
            NodeKind::Method { code: crate::value::MethodCode::Aml { segment, offset, length }, .. } => {
                (Some((*segment, *offset, *length)), None)
            }
            NodeKind::Method { code: crate::value::MethodCode::Native(f), .. } => (None, Some(f.clone())),
            _ => return Err(AmlError::UnexpectedResult),
        };

        if let Some(native) = native {
            return (native)(self, &args);
        }

        let (_segment, offset, length) = code.unwrap();
        let opstack_frame = self.stacks.operand.len();
        self.stacks.push_context(ContextFrame {
            code: self.current_code(),
            context_node: node.clone(),
            invocation: Some(Invocation::new(args)),
        })?;
        self.stacks.push_block(BlockFrame { pc: offset, limit: offset + length })?;
        self.stacks.push_item(Item { kind: ItemKind::Method, opstack_frame, want_result: true })?;
        self.run()?;
        // `run` drains the item stack down to (and including) this Method's
        // completion, leaving exactly one Integer/value at `opstack_frame`.
        match self.stacks.operand.pop() {
            Some(Operand::Value(v)) => Ok(v),
            Some(other) => other.into_value(self),
            None => Ok(AmlValue::Integer(0)),
        }
    }

    /// Loads a top-level AML table body (or any other standalone term list,
    /// e.g. a dynamically loaded SSDT) onto the stacks rooted at `scope` and
    /// runs it to completion (`spec.md` §4.4 "Main loop", entry point for
    /// `parse_table`).
    pub(crate) fn load_table(&mut self, code: Rc<[u8]>, scope: NodeHandle) -> Result<(), AmlError> {
        let opstack_frame = self.stacks.operand.len();
        let limit = code.len();
        self.stacks.push_context(ContextFrame { code, context_node: scope, invocation: None })?;
        self.stacks.push_block(BlockFrame { pc: 0, limit })?;
        self.stacks.push_item(Item { kind: ItemKind::Populate, opstack_frame, want_result: false })?;
        self.run()
    }

    /// Runs the AML table/method currently on top of the stacks to
    /// completion (`spec.md` §4.4 "Main loop").
    pub(crate) fn run(&mut self) -> Result<(), AmlError> {
        let floor = self.stacks.item.len() - 1;
        loop {
            if self.stacks.item.len() <= floor {
                return Ok(());
            }
            self.step()?;
        }
    }

    fn step(&mut self) -> Result<(), AmlError> {
        if self.stacks.pending_return.is_some() || self.stacks.pending_break || self.stacks.pending_continue {
            return self.unwind_signal();
        }
        let top_is_complete = self.item_is_complete()?;
        if !top_is_complete {
            return self.advance();
        }
        if self.top_is_mid_transition() {
            self.transition_top()
        } else {
            self.reduce_top()
        }
    }

    fn top_is_mid_transition(&self) -> bool {
        matches!(
            self.stacks.item.last().expect("no active item").kind,
            ItemKind::Loop { .. } | ItemKind::Cond { state: CondState::ParsingPredicate, .. }
        )
    }

    fn loop_fields(&self, idx: usize) -> Option<(LoopState, usize, usize)> {
        match &self.stacks.item[idx].kind {
            ItemKind::Loop { state, predicate_start, pkg_end } => Some((*state, *predicate_start, *pkg_end)),
            _ => None,
        }
    }

    fn cond_fields(&self, idx: usize) -> Option<(usize, (usize, usize), Option<(usize, usize)>)> {
        match &self.stacks.item[idx].kind {
            ItemKind::Cond { resume_pc, true_range, false_range, .. } => Some((*resume_pc, *true_range, *false_range)),
            _ => None,
        }
    }

    /// Moves a `Loop` or `Cond` item between its predicate and body phases
    /// (or finishes it) without going through `reduce_top`'s
    /// result-producing path — neither construct yields an operand
    /// (`spec.md` §4.4 "Loop", "Cond").
    fn transition_top(&mut self) -> Result<(), AmlError> {
        let idx = self.stacks.item.len() - 1;

        if let Some((state, predicate_start, pkg_end)) = self.loop_fields(idx) {
            return match state {
                LoopState::NotIterating => {
                    let predicate = self.stacks.operand.pop().expect("loop predicate missing").into_value(self)?;
                    let truthy = predicate.as_integer()? != 0;
                    if truthy {
                        if let ItemKind::Loop { state, .. } = &mut self.stacks.item[idx].kind {
                            *state = LoopState::Iterating;
                        }
                    } else {
                        self.stacks.item.pop();
                        self.stacks.block.pop();
                        if let Some(parent) = self.stacks.block.last_mut() {
                            parent.pc = pkg_end;
                        }
                    }
                    Ok(())
                }
                LoopState::Iterating => {
                    let block = self.stacks.block.last_mut().expect("loop with no block frame");
                    block.pc = predicate_start;
                    if let ItemKind::Loop { state, .. } = &mut self.stacks.item[idx].kind {
                        *state = LoopState::NotIterating;
                    }
                    Ok(())
                }
            };
        }

        if let Some((resume_pc, true_range, false_range)) = self.cond_fields(idx) {
            let predicate = self.stacks.operand.pop().expect("if predicate missing").into_value(self)?;
            let truthy = predicate.as_integer()? != 0;
            self.stacks.block.pop();
            let active_range = if truthy { Some(true_range) } else { false_range };
            match active_range {
                Some((start, end)) => {
                    self.stacks.push_block(BlockFrame { pc: start, limit: end })?;
                    if let ItemKind::Cond { state, .. } = &mut self.stacks.item[idx].kind {
                        *state = CondState::Executing;
                    }
                }
                None => {
                    self.stacks.item.pop();
                    if let Some(parent) = self.stacks.block.last_mut() {
                        parent.pc = resume_pc;
                    }
                }
            }
            return Ok(());
        }

        unreachable!("transition_top called on a non-transitional item")
    }

    /// Consumes a pending `Return`/`Break`/`Continue` signal one frame at a
    /// time, discarding intervening item/block/context frames, until it
    /// reaches the frame that catches it (`spec.md` §9 "Cycles" sibling
    /// rule: unwinding never recurses natively).
    fn unwind_signal(&mut self) -> Result<(), AmlError> {
        let idx = self.stacks.item.len().checked_sub(1).ok_or(AmlError::NotExecutingControlMethod)?;
        let opstack_frame = self.stacks.item[idx].opstack_frame;
        let is_method = matches!(self.stacks.item[idx].kind, ItemKind::Method);
        let is_loop = matches!(self.stacks.item[idx].kind, ItemKind::Loop { .. });

        if is_method && self.stacks.pending_return.is_some() {
            let value = self.stacks.pending_return.take().unwrap();
            self.stacks.operand.truncate(opstack_frame);
            self.stacks.push_operand(Operand::Value(value))?;
            if let Some(block) = self.stacks.block.last_mut() {
                block.pc = block.limit;
            }
            return Ok(());
        }

        if is_loop && (self.stacks.pending_break || self.stacks.pending_continue) {
            self.stacks.operand.truncate(opstack_frame);
            if self.stacks.pending_break {
                self.stacks.pending_break = false;
                if let ItemKind::Loop { state, .. } = &mut self.stacks.item[idx].kind {
                    *state = LoopState::Iterating;
                }
                if let Some(block) = self.stacks.block.last_mut() {
                    block.pc = block.limit;
                }
            } else {
                self.stacks.pending_continue = false;
                let predicate_start = match self.stacks.item[idx].kind {
                    ItemKind::Loop { predicate_start, .. } => predicate_start,
                    _ => unreachable!(),
                };
                if let ItemKind::Loop { state, .. } = &mut self.stacks.item[idx].kind {
                    *state = LoopState::NotIterating;
                }
                if let Some(block) = self.stacks.block.last_mut() {
                    block.pc = predicate_start;
                }
            }
            return Ok(());
        }

        if is_method {
            // A Break/Continue with no enclosing Loop.
            return Err(AmlError::BreakOrContinueWithoutLoop);
        }
        if idx == 0 && self.stacks.pending_return.is_some() {
            return Err(AmlError::NotExecutingControlMethod);
        }

        self.stacks.operand.truncate(opstack_frame);
        self.force_close_item()
    }

    fn force_close_item(&mut self) -> Result<(), AmlError> {
        let item = self.stacks.item.pop().expect("unwind with no active item");
        let owns_block = matches!(
            item.kind,
            ItemKind::Populate
                | ItemKind::Method
                | ItemKind::Buffer { .. }
                | ItemKind::Package { .. }
                | ItemKind::Loop { .. }
                | ItemKind::Cond { .. }
        );
        if owns_block {
            self.stacks.block.pop();
        }
        if matches!(item.kind, ItemKind::Method) {
            if let Some(frame) = self.stacks.context.pop() {
                if let Some(invocation) = frame.invocation {
                    for node in invocation.created_nodes {
                        self.namespace.uninstall(&node);
                    }
                }
            }
        }
        Ok(())
    }

    fn item_is_complete(&self) -> Result<bool, AmlError> {
        let item = self.stacks.item.last().expect("no active item");
        let collected = self.stacks.operand.len() - item.opstack_frame;
        let block = self.stacks.block.last();
        Ok(match &item.kind {
            ItemKind::Populate | ItemKind::Method => block.map(|b| b.pc >= b.limit).unwrap_or(true),
            ItemKind::Buffer { declared_len } => {
                declared_len.is_some() && block.map(|b| b.pc >= b.limit).unwrap_or(true)
            }
            ItemKind::Package { declared_count } => match declared_count {
                Some(count) => collected as u8 >= *count || block.map(|b| b.pc >= b.limit).unwrap_or(true),
                None => false,
            },
            ItemKind::Node { kind, trailing_name, .. } => {
                collected >= kind.arg_modes().len() && (!kind.trailing_name() || trailing_name.is_some())
            }
            ItemKind::Op { op } => collected >= op.arg_modes().len(),
            ItemKind::Invoke { .. } => {
                // Arity is read off the method node at dispatch time and
                // cached implicitly in `opstack_frame` bookkeeping; see
                // `advance` for `Invoke`'s own completion trigger.
                self.invoke_ready()
            }
            ItemKind::Return => collected >= 1,
            // Loop completion is always handled by `transition_top`, which
            // decides between "loop again" and "pop the item" once the
            // predicate is known.
            ItemKind::Loop { state, .. } => match state {
                LoopState::NotIterating => collected >= 1,
                LoopState::Iterating => block.map(|b| b.pc >= b.limit).unwrap_or(true),
            },
            ItemKind::Cond { state, .. } => match state {
                CondState::ParsingPredicate => collected >= 1,
                CondState::Executing => block.map(|b| b.pc >= b.limit).unwrap_or(true),
            },
        })
    }

    fn invoke_ready(&self) -> bool {
        let item = self.stacks.item.last().expect("no active item");
        let method = match &item.kind {
            ItemKind::Invoke { method } => method,
            _ => return false,
        };
        let arity = match &method.0.borrow().kind {
            NodeKind::Method { arg_count, .. } => *arg_count as usize,
            _ => 0,
        };
        self.stacks.operand.len() - item.opstack_frame >= arity
    }

    /// Parses the next grammar element the top item requires, pushing an
    /// operand, a new item, or performing an immediate action.
    fn advance(&mut self) -> Result<(), AmlError> {
        let block = *self.stacks.block.last().expect("block-driven item with no block frame");
        let code = self.current_code();
        let bytes = &code[block.pc..block.limit];

        // `BufferOp`'s body is `BufferSize TermArg` followed by a raw byte
        // list, not a further TermArg, and `PackageOp`'s element count is a
        // raw byte rather than a TermArg; both are handled here rather than
        // through the general mode dispatch (`spec.md` §4.4 "Buffer",
        // "Package").
        if let ItemKind::Buffer { declared_len: Some(len) } = &self.stacks.item.last().unwrap().kind {
            let len = *len as usize;
            let available = block.limit - block.pc;
            let take = len.min(available);
            let mut data = alloc::vec![0u8; len];
            data[..take].copy_from_slice(&bytes[..take]);
            self.consume(available)?;
            return self.push_collected(Operand::Value(AmlValue::Buffer(Rc::new(core::cell::RefCell::new(data)))));
        }
        if let ItemKind::Package { declared_count: None } = &self.stacks.item.last().unwrap().kind {
            let count = *bytes.first().ok_or(AmlError::UnexpectedEndOfStream)?;
            self.consume(1)?;
            if let ItemKind::Package { declared_count } = &mut self.stacks.item.last_mut().unwrap().kind {
                *declared_count = Some(count);
            }
            return Ok(());
        }

        // The `Create*Field` node ops carry their target `NameString` after
        // both `TermArg`s rather than before, so it is parsed here once both
        // are collected rather than through the shared `arg_modes` dispatch
        // (`spec.md` §4.4 "Node (declarative)").
        {
            let item = self.stacks.item.last().unwrap();
            let collected = self.stacks.operand.len() - item.opstack_frame;
            if let ItemKind::Node { kind, trailing_name: None, .. } = &item.kind {
                if kind.trailing_name() && collected >= kind.arg_modes().len() {
                    let (name, len) = parser::name_string(bytes)?.ok_or(AmlError::InvalidNameSeg)?;
                    self.consume(len)?;
                    if let ItemKind::Node { trailing_name, .. } = &mut self.stacks.item.last_mut().unwrap().kind {
                        *trailing_name = Some(name);
                    }
                    return Ok(());
                }
            }
        }

        let mode = self.required_mode();
        trace!("aml: pc={:#x} limit={:#x} mode={:?}", block.pc, block.limit, mode);

        match mode {
            ParseMode::ImmediateByte => {
                let value = *bytes.first().ok_or(AmlError::UnexpectedEndOfStream)? as u64;
                self.consume(1)?;
                self.push_collected(Operand::Value(AmlValue::Integer(value)))
            }
            ParseMode::ImmediateWord => {
                if bytes.len() < 2 {
                    return Err(AmlError::UnexpectedEndOfStream);
                }
                let value = u16::from_le_bytes([bytes[0], bytes[1]]) as u64;
                self.consume(2)?;
                self.push_collected(Operand::Value(AmlValue::Integer(value)))
            }
            ParseMode::Reference => self.decode_reference(bytes),
            ParseMode::Data => self.decode_data(bytes),
            ParseMode::Object | ParseMode::Exec => self.decode_term(bytes, mode),
        }
    }

    /// Which `ParseMode` the top item currently requires, i.e. which of its
    /// remaining argument positions is next.
    fn required_mode(&self) -> ParseMode {
        let item = self.stacks.item.last().expect("no active item");
        let collected = self.stacks.operand.len() - item.opstack_frame;
        match &item.kind {
            ItemKind::Populate | ItemKind::Method | ItemKind::Cond { state: CondState::Executing, .. } => {
                ParseMode::Exec
            }
            ItemKind::Buffer { .. } => ParseMode::Object,
            ItemKind::Package { .. } => ParseMode::Object,
            ItemKind::Node { kind, .. } => kind.arg_modes()[collected.min(kind.arg_modes().len() - 1)],
            ItemKind::Op { op } => op.arg_modes()[collected.min(op.arg_modes().len() - 1)],
            ItemKind::Invoke { .. } => ParseMode::Object,
            ItemKind::Return => ParseMode::Object,
            ItemKind::Loop { state: LoopState::NotIterating, .. } => ParseMode::Object,
            ItemKind::Loop { state: LoopState::Iterating, .. } => ParseMode::Exec,
            ItemKind::Cond { state: CondState::ParsingPredicate, .. } => ParseMode::Object,
        }
    }

    fn consume(&mut self, n: usize) -> Result<(), AmlError> {
        self.stacks.block.last_mut().expect("no active block").pc += n;
        Ok(())
    }

    /// Pushes a collected operand onto the operand stack, unless the top
    /// item is a `Buffer` still waiting on its declared size, in which case
    /// the value is consumed directly into the item instead (`spec.md`
    /// §4.4 "Buffer").
    fn push_collected(&mut self, operand: Operand) -> Result<(), AmlError> {
        if let ItemKind::Buffer { declared_len: None } = &self.stacks.item.last().unwrap().kind {
            let len = operand.into_value(self)?.as_integer()?;
            if let ItemKind::Buffer { declared_len } = &mut self.stacks.item.last_mut().unwrap().kind {
                *declared_len = Some(len);
            }
            return Ok(());
        }
        self.stacks.push_operand(operand)
    }

    fn decode_data(&mut self, bytes: &[u8]) -> Result<(), AmlError> {
        if bytes.is_empty() {
            return Err(AmlError::UnexpectedEndOfStream);
        }
        if let Some((name, len)) = parser::name_string(bytes)? {
            self.consume(len)?;
            let scope = self.current_scope();
            return self.push_collected(Operand::Value(AmlValue::LazyHandle { name, scope: scope.path() }));
        }
        self.decode_term(bytes, ParseMode::Data)
    }

    fn decode_reference(&mut self, bytes: &[u8]) -> Result<(), AmlError> {
        if bytes.is_empty() {
            return Err(AmlError::UnexpectedEndOfStream);
        }
        match bytes[0] {
            0x00 => {
                self.consume(1)?;
                self.push_collected(Operand::NullName)
            }
            b if (opcode::LOCAL0_OP..=opcode::LOCAL7_OP).contains(&b) => {
                self.consume(1)?;
                self.push_collected(Operand::LocalName(b - opcode::LOCAL0_OP))
            }
            b if (opcode::ARG0_OP..=opcode::ARG6_OP).contains(&b) => {
                self.consume(1)?;
                self.push_collected(Operand::ArgName(b - opcode::ARG0_OP))
            }
            opcode::EXT_OP_PREFIX if bytes.get(1) == Some(&opcode::DEBUG_OP_EXT) => {
                self.consume(2)?;
                self.push_collected(Operand::DebugName)
            }
            _ => {
                if let Some((name, len)) = parser::name_string(bytes)? {
                    self.consume(len)?;
                    let scope = self.current_scope();
                    self.push_collected(Operand::UnresolvedName(name, scope))
                } else {
                    Err(self.raise_fatal(crate::FATAL_UNKNOWN_OPCODE, bytes[0] as u32, 0))
                }
            }
        }
    }

    /// Decodes one term: a literal, a name, or the head of a compound
    /// construct. `mode` is `Exec` or `Object`; `Data` falls back here for
    /// anything that isn't a bare name.
    fn decode_term(&mut self, bytes: &[u8], mode: ParseMode) -> Result<(), AmlError> {
        if bytes.is_empty() {
            return Err(AmlError::UnexpectedEndOfStream);
        }

        if let Some((name, len)) = parser::name_string(bytes)? {
            return self.decode_name_term(name, len, mode);
        }

        if let Ok((value, len)) = parser::integer_prefix(bytes) {
            self.consume(len)?;
            return self.push_collected(Operand::Value(AmlValue::Integer(value)));
        }

        if let Ok((s, len)) = parser::string_literal(bytes) {
            self.consume(len)?;
            return self.push_collected(Operand::Value(AmlValue::new_string(s)));
        }

        let decoded = parser::opcode(bytes)?;
        self.dispatch_opcode(decoded, mode)
    }

    fn decode_name_term(&mut self, name: AmlName, len: usize, mode: ParseMode) -> Result<(), AmlError> {
        self.consume(len)?;
        let scope = self.current_scope();
        match self.namespace.resolve(&name, &scope) {
            Some(node) => {
                let is_method =
                    matches!(node.resolve_alias()?.0.borrow().kind, NodeKind::Method { .. });
                if is_method {
                    // Dispatched through the `Invoke` item even in `Exec`
                    // (statement) position, so a method-calling-a-method
                    // chain never recurses natively into `run` (`spec.md`
                    // §9 "Recursive AML evaluation replaced by explicit
                    // stacks").
                    let opstack_frame = self.stacks.operand.len();
                    self.stacks.push_item(Item {
                        kind: ItemKind::Invoke { method: node.resolve_alias()? },
                        opstack_frame,
                        want_result: mode.keeps_result(),
                    })
                } else {
                    let value = self.evaluate_node(&node, Args::default())?;
                    if mode.keeps_result() {
                        self.push_collected(Operand::Value(value))
                    } else {
                        Ok(())
                    }
                }
            }
            None => Err(AmlError::ValueDoesNotExist(name)),
        }
    }

    /// Finishes the top item once `item_is_complete` reports it done,
    /// producing (or discarding) its result (`spec.md` §4.4).
    fn reduce_top(&mut self) -> Result<(), AmlError> {
        let item = self.stacks.item.pop().expect("reduce with no active item");
        let opstack_frame = item.opstack_frame;

        match item.kind {
            ItemKind::Populate => {
                self.stacks.block.pop();
                self.stacks.context.pop();
                Ok(())
            }
            ItemKind::Method => {
                if self.stacks.operand.len() == opstack_frame {
                    self.stacks.push_operand(Operand::Value(AmlValue::Integer(0)))?;
                }
                self.stacks.block.pop();
                let frame = self.stacks.context.pop().expect("method with no context frame");
                if let Some(invocation) = frame.invocation {
                    for node in invocation.created_nodes {
                        self.namespace.uninstall(&node);
                    }
                }
                if !item.want_result {
                    self.stacks.operand.pop();
                }
                Ok(())
            }
            ItemKind::Buffer { .. } => {
                self.stacks.block.pop();
                if !item.want_result {
                    self.stacks.operand.truncate(opstack_frame);
                }
                Ok(())
            }
            ItemKind::Package { .. } => {
                self.stacks.block.pop();
                let values: Vec<AmlValue> = self
                    .stacks
                    .operand
                    .split_off(opstack_frame)
                    .into_iter()
                    .map(|op| op.into_value(self))
                    .collect::<Result<_, _>>()?;
                let package = AmlValue::Package(Rc::new(core::cell::RefCell::new(values)));
                if item.want_result {
                    self.stacks.push_operand(Operand::Value(package))?;
                }
                Ok(())
            }
            ItemKind::Node { kind, name, trailing_name } => {
                let operands = self.stacks.operand.split_off(opstack_frame);
                declare::install_node(self, kind, name, trailing_name, operands)
            }
            ItemKind::Op { op } => {
                let operands = self.stacks.operand.split_off(opstack_frame);
                let result = reduce::reduce_expr(self, op, operands)?;
                if item.want_result {
                    self.stacks.push_operand(Operand::Value(result))?;
                }
                Ok(())
            }
            ItemKind::Invoke { method } => {
                let arity = match &method.0.borrow().kind {
                    NodeKind::Method { arg_count, .. } => *arg_count as usize,
                    _ => 0,
                };
                let raw_args = self.stacks.operand.split_off(self.stacks.operand.len() - arity);
                let mut values = Vec::with_capacity(arity);
                for operand in raw_args {
                    values.push(operand.into_value(self)?);
                }
                let args = Args { values };

                let (code, native) = match &method.0.borrow().kind {
                    NodeKind::Method { code: crate::value::MethodCode::Aml { offset, length, .. }, .. } => {
                        (Some((*offset, *length)), None)
                    }
                    NodeKind::Method { code: crate::value::MethodCode::Native(f), .. } => (None, Some(f.clone())),
                    _ => return Err(AmlError::UnexpectedResult),
                };

                if let Some(native) = native {
                    let result = (native)(self, &args)?;
                    if item.want_result {
                        self.stacks.push_operand(Operand::Value(result))?;
                    }
                    return Ok(());
                }

                let (offset, length) = code.unwrap();
                self.stacks.push_context(ContextFrame {
                    code: self.current_code(),
                    context_node: method,
                    invocation: Some(Invocation::new(args)),
                })?;
                self.stacks.push_block(BlockFrame { pc: offset, limit: offset + length })?;
                self.stacks.push_item(Item { kind: ItemKind::Method, opstack_frame, want_result: item.want_result })
            }
            ItemKind::Return => {
                let value = self.stacks.operand.pop().expect("return with no value").into_value(self)?;
                self.stacks.pending_return = Some(value);
                Ok(())
            }
            ItemKind::Loop { .. } | ItemKind::Cond { .. } => {
                unreachable!("Loop/Cond completion is handled by transition_top")
            }
        }
    }

    /// Decodes the opcode at `bytes[0]` (already confirmed not to be a name,
    /// integer, or string literal) and performs its effect: pushing a new
    /// item, consuming a declarative construct synchronously, or raising a
    /// control-flow signal (`spec.md` §6).
    fn dispatch_opcode(&mut self, decoded: DecodedOpcode, mode: ParseMode) -> Result<(), AmlError> {
        self.consume(decoded.len)?;
        let opstack_frame = self.stacks.operand.len();
        let keeps_result = mode.keeps_result();

        match (decoded.byte, decoded.ext) {
            (opcode::ZERO_OP, None) => self.push_collected(Operand::Value(AmlValue::zero())),
            (opcode::ONE_OP, None) => self.push_collected(Operand::Value(AmlValue::Integer(1))),
            (opcode::ONES_OP, None) => self.push_collected(Operand::Value(AmlValue::ones())),
            (opcode::NOP_OP, None) => Ok(()),

            (opcode::BUFFER_OP, None) => {
                let (start, end) = self.read_pkg_range()?;
                self.stacks.block.last_mut().unwrap().pc = end;
                self.stacks.push_block(BlockFrame { pc: start, limit: end })?;
                self.stacks.push_item(Item { kind: ItemKind::Buffer { declared_len: None }, opstack_frame, want_result: keeps_result })
            }
            (opcode::PACKAGE_OP, None) => {
                let (start, end) = self.read_pkg_range()?;
                self.stacks.block.last_mut().unwrap().pc = end;
                self.stacks.push_block(BlockFrame { pc: start, limit: end })?;
                self.stacks.push_item(Item { kind: ItemKind::Package { declared_count: None }, opstack_frame, want_result: keeps_result })
            }

            (opcode::SCOPE_OP, None) => self.dispatch_scope(),
            (opcode::METHOD_OP, None) => self.dispatch_method_decl(),
            (opcode::ALIAS_OP, None) => self.dispatch_alias(),
            (opcode::NAME_OP, None) => self.dispatch_name(),

            (opcode::CREATE_BYTE_FIELD_OP, None) => self.push_field_create(NodeOpKind::ByteField, opstack_frame),
            (opcode::CREATE_WORD_FIELD_OP, None) => self.push_field_create(NodeOpKind::WordField, opstack_frame),
            (opcode::CREATE_DWORD_FIELD_OP, None) => self.push_field_create(NodeOpKind::DwordField, opstack_frame),
            (opcode::CREATE_QWORD_FIELD_OP, None) => self.push_field_create(NodeOpKind::QwordField, opstack_frame),

            (opcode::IF_OP, None) => self.dispatch_if(),
            (opcode::WHILE_OP, None) => self.dispatch_while(),
            (opcode::RETURN_OP, None) => {
                self.stacks.push_item(Item { kind: ItemKind::Return, opstack_frame, want_result: false })
            }
            (opcode::BREAK_OP, None) => {
                self.stacks.pending_break = true;
                Ok(())
            }
            (opcode::CONTINUE_OP, None) => {
                self.stacks.pending_continue = true;
                Ok(())
            }

            (opcode::STORE_OP, None) => self.push_op(ExprOp::Store, opstack_frame, keeps_result),
            (opcode::NOT_OP, None) => self.push_op(ExprOp::Not, opstack_frame, keeps_result),
            (opcode::ADD_OP, None) => self.push_op(ExprOp::Add, opstack_frame, keeps_result),
            (opcode::SUBTRACT_OP, None) => self.push_op(ExprOp::Subtract, opstack_frame, keeps_result),
            (opcode::MULTIPLY_OP, None) => self.push_op(ExprOp::Multiply, opstack_frame, keeps_result),
            (opcode::DIVIDE_OP, None) => self.push_op(ExprOp::Divide, opstack_frame, keeps_result),
            (opcode::SHIFT_LEFT_OP, None) => self.push_op(ExprOp::ShiftLeft, opstack_frame, keeps_result),
            (opcode::SHIFT_RIGHT_OP, None) => self.push_op(ExprOp::ShiftRight, opstack_frame, keeps_result),
            (opcode::AND_OP, None) => self.push_op(ExprOp::And, opstack_frame, keeps_result),
            (opcode::OR_OP, None) => self.push_op(ExprOp::Or, opstack_frame, keeps_result),
            (opcode::XOR_OP, None) => self.push_op(ExprOp::Xor, opstack_frame, keeps_result),
            (opcode::INCREMENT_OP, None) => self.push_op(ExprOp::Increment, opstack_frame, keeps_result),
            (opcode::DECREMENT_OP, None) => self.push_op(ExprOp::Decrement, opstack_frame, keeps_result),
            (opcode::LAND_OP, None) => self.push_op(ExprOp::LAnd, opstack_frame, keeps_result),
            (opcode::LOR_OP, None) => self.push_op(ExprOp::LOr, opstack_frame, keeps_result),
            (opcode::LNOT_OP, None) => self.push_op(ExprOp::LNot, opstack_frame, keeps_result),
            (opcode::LEQUAL_OP, None) => self.push_op(ExprOp::LEqual, opstack_frame, keeps_result),
            (opcode::LGREATER_OP, None) => self.push_op(ExprOp::LGreater, opstack_frame, keeps_result),
            (opcode::LLESS_OP, None) => self.push_op(ExprOp::LLess, opstack_frame, keeps_result),
            (opcode::INDEX_OP, None) => self.push_op(ExprOp::Index, opstack_frame, keeps_result),
            (opcode::DEREF_OF_OP, None) => self.push_op(ExprOp::DeRefOf, opstack_frame, keeps_result),
            (opcode::SIZE_OF_OP, None) => self.push_op(ExprOp::SizeOf, opstack_frame, keeps_result),

            (opcode::EXT_OP_PREFIX, Some(opcode::DEVICE_OP_EXT)) => self.dispatch_device(),
            (opcode::EXT_OP_PREFIX, Some(opcode::PROCESSOR_OP_EXT)) => self.dispatch_processor(),
            (opcode::EXT_OP_PREFIX, Some(opcode::POWER_RES_OP_EXT)) => self.dispatch_power_resource(),
            (opcode::EXT_OP_PREFIX, Some(opcode::THERMAL_ZONE_OP_EXT)) => self.dispatch_thermal_zone(),
            (opcode::EXT_OP_PREFIX, Some(opcode::MUTEX_OP_EXT)) => self.dispatch_mutex(),
            (opcode::EXT_OP_PREFIX, Some(opcode::EVENT_OP_EXT)) => self.dispatch_event(),
            (opcode::EXT_OP_PREFIX, Some(opcode::OP_REGION_OP_EXT)) => self.push_op_region_create(opstack_frame),
            (opcode::EXT_OP_PREFIX, Some(opcode::FIELD_OP_EXT)) => self.dispatch_field(),
            (opcode::EXT_OP_PREFIX, Some(opcode::INDEX_FIELD_OP_EXT)) => self.dispatch_index_field(),
            (opcode::EXT_OP_PREFIX, Some(opcode::COND_REF_OF_OP_EXT)) => {
                self.push_op(ExprOp::CondRefOf, opstack_frame, keeps_result)
            }
            (opcode::EXT_OP_PREFIX, Some(opcode::SLEEP_OP_EXT)) => self.push_op(ExprOp::Sleep, opstack_frame, keeps_result),
            (opcode::EXT_OP_PREFIX, Some(opcode::ACQUIRE_OP_EXT)) => self.push_op(ExprOp::Acquire, opstack_frame, keeps_result),
            (opcode::EXT_OP_PREFIX, Some(opcode::RELEASE_OP_EXT)) => self.push_op(ExprOp::Release, opstack_frame, keeps_result),

            (byte, ext) => {
                let arg = ext.map(u64::from).unwrap_or(0);
                Err(self.raise_fatal(crate::FATAL_UNKNOWN_OPCODE, byte as u32, arg))
            }
        }
    }

    fn push_op(&mut self, op: ExprOp, opstack_frame: usize, want_result: bool) -> Result<(), AmlError> {
        self.stacks.push_item(Item { kind: ItemKind::Op { op }, opstack_frame, want_result })
    }

    fn push_field_create(&mut self, kind: NodeOpKind, opstack_frame: usize) -> Result<(), AmlError> {
        self.stacks.push_item(Item { kind: ItemKind::Node { kind, name: None, trailing_name: None }, opstack_frame, want_result: false })
    }

    fn push_op_region_create(&mut self, opstack_frame: usize) -> Result<(), AmlError> {
        let block = *self.stacks.block.last().expect("no active block");
        let code = self.current_code();
        let (name, len) = parser::name_string(&code[block.pc..block.limit])?.ok_or(AmlError::InvalidNameSeg)?;
        self.consume(len)?;
        self.stacks.push_item(Item {
            kind: ItemKind::Node { kind: NodeOpKind::OpRegion, name: Some(name), trailing_name: None },
            opstack_frame,
            want_result: false,
        })
    }

    fn dispatch_name(&mut self) -> Result<(), AmlError> {
        let opstack_frame = self.stacks.operand.len();
        let block = *self.stacks.block.last().expect("no active block");
        let code = self.current_code();
        let (name, len) = parser::name_string(&code[block.pc..block.limit])?.ok_or(AmlError::InvalidNameSeg)?;
        self.consume(len)?;
        self.stacks.push_item(Item {
            kind: ItemKind::Node { kind: NodeOpKind::Name, name: Some(name), trailing_name: None },
            opstack_frame,
            want_result: false,
        })
    }

    /// Reads and consumes a `PkgLength` at the current `pc`, returning the
    /// absolute `(body_start, body_end)` range.
    fn read_pkg_range(&mut self) -> Result<(usize, usize), AmlError> {
        let block = *self.stacks.block.last().expect("no active block");
        let code = self.current_code();
        let pkg = parser::pkg_length(&code[block.pc..block.limit])?;
        let start = block.pc + pkg.encoded_len;
        let end = block.pc + pkg.end;
        self.consume(pkg.encoded_len)?;
        Ok((start, end))
    }

    fn dispatch_scope(&mut self) -> Result<(), AmlError> {
        let (start, end) = self.read_pkg_range()?;
        let block = *self.stacks.block.last().expect("no active block");
        let code = self.current_code();
        let (name, len) = parser::name_string(&code[block.pc..end])?.ok_or(AmlError::InvalidNameSeg)?;
        self.consume(len)?;
        let scope = self.current_scope();
        let target = self.namespace.resolve(&name, &scope).ok_or_else(|| AmlError::ValueDoesNotExist(name))?;
        let body_start = self.stacks.block.last().unwrap().pc;
        self.stacks.block.last_mut().unwrap().pc = end;
        self.enter_populate(target, body_start, end)
    }

    fn enter_populate(&mut self, context_node: NodeHandle, start: usize, end: usize) -> Result<(), AmlError> {
        let code = self.current_code();
        let opstack_frame = self.stacks.operand.len();
        self.stacks.push_context(ContextFrame { code, context_node, invocation: None })?;
        self.stacks.push_block(BlockFrame { pc: start, limit: end })?;
        self.stacks.push_item(Item { kind: ItemKind::Populate, opstack_frame, want_result: false })
    }

    fn dispatch_method_decl(&mut self) -> Result<(), AmlError> {
        let (start, end) = self.read_pkg_range()?;
        let block = *self.stacks.block.last().expect("no active block");
        let code = self.current_code();
        let (name, len) = parser::name_string(&code[block.pc..end])?.ok_or(AmlError::InvalidNameSeg)?;
        self.consume(len)?;
        let flags = *code.get(self.stacks.block.last().unwrap().pc).ok_or(AmlError::UnexpectedEndOfStream)?;
        self.consume(1)?;
        let body_start = self.stacks.block.last().unwrap().pc;
        let scope = self.current_scope();
        self.namespace.create(
            &name,
            &scope,
            NodeKind::Method {
                arg_count: flags & 0x7,
                serialized: flags & 0x8 != 0,
                code: crate::value::MethodCode::Aml { segment: 0, offset: body_start, length: end - body_start },
            },
        )?;
        self.stacks.block.last_mut().unwrap().pc = end;
        let _ = start;
        Ok(())
    }

    fn dispatch_alias(&mut self) -> Result<(), AmlError> {
        let block = *self.stacks.block.last().expect("no active block");
        let code = self.current_code();
        let (source, source_len) = parser::name_string(&code[block.pc..block.limit])?.ok_or(AmlError::InvalidNameSeg)?;
        self.consume(source_len)?;
        let block = *self.stacks.block.last().unwrap();
        let (alias, alias_len) = parser::name_string(&code[block.pc..block.limit])?.ok_or(AmlError::InvalidNameSeg)?;
        self.consume(alias_len)?;
        let scope = self.current_scope();
        let target = self.namespace.resolve(&source, &scope).ok_or_else(|| AmlError::ValueDoesNotExist(source))?;
        self.namespace.create(&alias, &scope, NodeKind::Alias(target))?;
        Ok(())
    }

    fn dispatch_if(&mut self) -> Result<(), AmlError> {
        let (if_start, if_end) = self.read_pkg_range()?;
        let code = self.current_code();
        let false_range = if code.get(if_end) == Some(&opcode::ELSE_OP) {
            let after_else_op = if_end + 1;
            let pkg = parser::pkg_length(&code[after_else_op..])?;
            Some((after_else_op + pkg.encoded_len, after_else_op + pkg.end))
        } else {
            None
        };
        let resume_pc = false_range.map(|(_, end)| end).unwrap_or(if_end);
        self.stacks.block.last_mut().unwrap().pc = resume_pc;

        let opstack_frame = self.stacks.operand.len();
        self.stacks.push_block(BlockFrame { pc: if_start, limit: if_end })?;
        self.stacks.push_item(Item {
            kind: ItemKind::Cond { state: CondState::ParsingPredicate, resume_pc, true_range: (if_start, if_end), false_range },
            opstack_frame,
            want_result: false,
        })
    }

    fn dispatch_while(&mut self) -> Result<(), AmlError> {
        let (body_start, pkg_end) = self.read_pkg_range()?;
        self.stacks.block.last_mut().unwrap().pc = pkg_end;
        let opstack_frame = self.stacks.operand.len();
        self.stacks.push_block(BlockFrame { pc: body_start, limit: pkg_end })?;
        self.stacks.push_item(Item {
            kind: ItemKind::Loop { state: LoopState::NotIterating, predicate_start: body_start, pkg_end },
            opstack_frame,
            want_result: false,
        })
    }

    fn dispatch_device(&mut self) -> Result<(), AmlError> {
        let (start, end) = self.read_pkg_range()?;
        let block = *self.stacks.block.last().expect("no active block");
        let code = self.current_code();
        let (name, len) = parser::name_string(&code[block.pc..end])?.ok_or(AmlError::InvalidNameSeg)?;
        self.consume(len)?;
        let scope = self.current_scope();
        let node = self.namespace.create(&name, &scope, NodeKind::Device)?;
        declare::record_created(self, &node);
        let body_start = self.stacks.block.last().unwrap().pc;
        self.stacks.block.last_mut().unwrap().pc = end;
        self.enter_populate(node, body_start, end)
    }

    fn dispatch_processor(&mut self) -> Result<(), AmlError> {
        let (start, end) = self.read_pkg_range()?;
        let block = *self.stacks.block.last().expect("no active block");
        let code = self.current_code();
        let (name, len) = parser::name_string(&code[block.pc..end])?.ok_or(AmlError::InvalidNameSeg)?;
        self.consume(len)?;
        let pc = self.stacks.block.last().unwrap().pc;
        let proc_id = *code.get(pc).ok_or(AmlError::UnexpectedEndOfStream)?;
        let pblk_addr = u32::from_le_bytes(code[pc + 1..pc + 5].try_into().map_err(|_| AmlError::UnexpectedEndOfStream)?);
        let pblk_len = *code.get(pc + 5).ok_or(AmlError::UnexpectedEndOfStream)?;
        self.consume(6)?;
        let scope = self.current_scope();
        let node = self.namespace.create(&name, &scope, NodeKind::Processor(crate::namespace::ProcessorPayload { proc_id, pblk_addr, pblk_len }))?;
        declare::record_created(self, &node);
        let body_start = self.stacks.block.last().unwrap().pc;
        self.stacks.block.last_mut().unwrap().pc = end;
        let _ = start;
        self.enter_populate(node, body_start, end)
    }

    fn dispatch_power_resource(&mut self) -> Result<(), AmlError> {
        let (start, end) = self.read_pkg_range()?;
        let block = *self.stacks.block.last().expect("no active block");
        let code = self.current_code();
        let (name, len) = parser::name_string(&code[block.pc..end])?.ok_or(AmlError::InvalidNameSeg)?;
        self.consume(len)?;
        self.consume(3)?; // SystemLevel (byte) + ResourceOrder (word)
        let scope = self.current_scope();
        let node = self.namespace.create(&name, &scope, NodeKind::PowerResource)?;
        declare::record_created(self, &node);
        let body_start = self.stacks.block.last().unwrap().pc;
        self.stacks.block.last_mut().unwrap().pc = end;
        let _ = start;
        self.enter_populate(node, body_start, end)
    }

    fn dispatch_thermal_zone(&mut self) -> Result<(), AmlError> {
        let (start, end) = self.read_pkg_range()?;
        let block = *self.stacks.block.last().expect("no active block");
        let code = self.current_code();
        let (name, len) = parser::name_string(&code[block.pc..end])?.ok_or(AmlError::InvalidNameSeg)?;
        self.consume(len)?;
        let scope = self.current_scope();
        let node = self.namespace.create(&name, &scope, NodeKind::ThermalZone)?;
        declare::record_created(self, &node);
        let body_start = self.stacks.block.last().unwrap().pc;
        self.stacks.block.last_mut().unwrap().pc = end;
        let _ = start;
        self.enter_populate(node, body_start, end)
    }

    fn dispatch_mutex(&mut self) -> Result<(), AmlError> {
        let block = *self.stacks.block.last().expect("no active block");
        let code = self.current_code();
        let (name, len) = parser::name_string(&code[block.pc..block.limit])?.ok_or(AmlError::InvalidNameSeg)?;
        self.consume(len)?;
        let sync_level = *code.get(self.stacks.block.last().unwrap().pc).ok_or(AmlError::UnexpectedEndOfStream)?;
        self.consume(1)?;
        let scope = self.current_scope();
        let node = self.namespace.create(&name, &scope, NodeKind::Mutex { sync_level: sync_level & 0xF })?;
        declare::record_created(self, &node);
        Ok(())
    }

    fn dispatch_event(&mut self) -> Result<(), AmlError> {
        let block = *self.stacks.block.last().expect("no active block");
        let code = self.current_code();
        let (name, len) = parser::name_string(&code[block.pc..block.limit])?.ok_or(AmlError::InvalidNameSeg)?;
        self.consume(len)?;
        let scope = self.current_scope();
        let node = self.namespace.create(&name, &scope, NodeKind::Event)?;
        declare::record_created(self, &node);
        Ok(())
    }

    fn dispatch_field(&mut self) -> Result<(), AmlError> {
        let (start, end) = self.read_pkg_range()?;
        declare::parse_field_list(self, start, end)
    }

    fn dispatch_index_field(&mut self) -> Result<(), AmlError> {
        let (start, end) = self.read_pkg_range()?;
        declare::parse_index_field_list(self, start, end)
    }
}
