//! Structural typing: prototypes derived from how a subroutine uses its frame.

use std::collections::HashMap;

use crate::actions::ActionsData;
use crate::decode::{BinaryFamily, Instruction, Op, Position, Program, Subroutine, CELL};
use crate::error::{FrameError, StateError};
use crate::state::{PrototypeStatus, StateArena};
use crate::types::TypeTag;

/// The discovery and derivation steps the prototype engine drives.
pub trait StructuralTyper {
    /// Start typing `pos`. `true` means the subroutine is BeingPrototyped and
    /// ready for [`derive`](Self::derive); `false` leaves it Unprototyped.
    fn discover(&mut self, program: &Program, states: &mut StateArena, pos: Position) -> bool;

    /// Settle the prototype of a discovered subroutine, or release it.
    fn derive(&mut self, program: &Program, states: &mut StateArena, pos: Position);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSignature {
    pub param_count: usize,
    pub return_type: TypeTag,
}

/// Types subroutines by replaying their stack frame against the NCS calling
/// convention: the caller reserves the return slot, pushes the arguments and
/// the callee pops them before RETN.
pub struct FrameTyper<'a, A: ActionsData + ?Sized> {
    actions: &'a A,
}

/// A subroutine waiting on its callees during discovery.
struct Pending {
    node: Position,
    callees: Vec<Position>,
    cursor: usize,
}

impl Pending {
    fn new(program: &Program, node: Position) -> Self {
        let callees = program
            .subroutine(node)
            .map(|s| {
                s.live_call_targets()
                    .into_iter()
                    .filter(|&t| program.is_subroutine(t))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            node,
            callees,
            cursor: 0,
        }
    }
}

fn release(states: &mut StateArena, pos: Position) {
    if let Some(state) = states.get_mut(pos) {
        if state.is_being_prototyped() {
            if let Err(e) = state.stop_prototyping(false) {
                log::debug!("{}", e);
            }
        }
    }
}

fn settle(states: &mut StateArena, pos: Position, sig: &FrameSignature) -> Result<(), StateError> {
    let state = states.state_mut(pos)?;
    state.set_param_count(sig.param_count)?;
    state.set_return_type(sig.return_type)?;
    state.ensure_param_placeholders()?;
    state.stop_prototyping(true)
}

impl<'a, A: ActionsData + ?Sized> FrameTyper<'a, A> {
    pub fn new(actions: &'a A) -> Self {
        Self { actions }
    }

    /// Replay `sub` and compute its signature without touching any state.
    pub fn signature(
        &self,
        sub: &Subroutine,
        states: &StateArena,
    ) -> Result<FrameSignature, FrameError> {
        FrameWalk::new(self.actions, states).run(sub)
    }
}

impl<A: ActionsData + ?Sized> StructuralTyper for FrameTyper<'_, A> {
    fn discover(&mut self, program: &Program, states: &mut StateArena, pos: Position) -> bool {
        if states.status(pos) != Some(PrototypeStatus::Unprototyped) {
            return false;
        }
        if let Err(e) = states.state_mut(pos).and_then(|s| s.start_prototyping()) {
            log::debug!("{}", e);
            return false;
        }

        // Callees are settled before their caller, depth-first.
        let mut stack = vec![Pending::new(program, pos)];
        let mut blocked = None;

        while let Some(top) = stack.last_mut() {
            if top.cursor < top.callees.len() {
                let callee = top.callees[top.cursor];
                top.cursor += 1;
                match states.status(callee) {
                    Some(PrototypeStatus::Unprototyped) => {
                        if states
                            .state_mut(callee)
                            .and_then(|s| s.start_prototyping())
                            .is_ok()
                        {
                            stack.push(Pending::new(program, callee));
                        }
                    }
                    // On the discovery path already: a call cycle.
                    Some(PrototypeStatus::BeingPrototyped) => {
                        blocked = Some(callee);
                        break;
                    }
                    _ => {}
                }
                continue;
            }

            let node = top.node;
            if stack.len() == 1 {
                break;
            }
            stack.pop();
            self.derive(program, states, node);
            if !states.is_prototyped(node) {
                blocked = Some(node);
                break;
            }
        }

        let Some(at) = blocked else {
            return true;
        };
        log::debug!("0x{:08X}: discovery blocked at 0x{:08X}", pos, at);
        for frame in stack.iter().rev() {
            release(states, frame.node);
        }
        false
    }

    fn derive(&mut self, program: &Program, states: &mut StateArena, pos: Position) {
        let Some(sub) = program.subroutine(pos) else {
            return;
        };

        let outcome = self.signature(sub, states).and_then(|sig| {
            settle(states, pos, &sig)?;
            Ok(sig)
        });
        match outcome {
            Ok(sig) => log::debug!(
                "0x{:08X}: {} params, returns {}",
                pos,
                sig.param_count,
                sig.return_type
            ),
            Err(e) => {
                log::debug!("0x{:08X}: {}", pos, e);
                release(states, pos);
            }
        }
    }
}

/// CPDOWNSP destination, in cells relative to the entry height.
#[derive(Debug, Clone, Copy)]
struct Write {
    dest: i64,
    cells: i64,
    tag: Option<TypeTag>,
}

/// Single pass over the live instructions of one subroutine.
struct FrameWalk<'w, A: ?Sized> {
    actions: &'w A,
    states: &'w StateArena,
    height: i64,
    /// Tags of the cells pushed by this frame; index 0 is the first local.
    tags: Vec<Option<TypeTag>>,
    /// Heights recorded at forward branches, by destination.
    labels: HashMap<Position, i64>,
    reachable: bool,
    ret_height: Option<i64>,
    writes: Vec<Write>,
}

/// Upper bound on the tracked frame height. A script whose stack grows past
/// this is not typed structurally.
const MAX_FRAME_CELLS: i64 = 0x10000;

fn cells(bytes: impl Into<i64>) -> i64 {
    bytes.into() / CELL as i64
}

fn value_type(tag: Option<TypeTag>, cells: i64) -> TypeTag {
    match tag {
        Some(t) if t.cell_size() as i64 == cells => t,
        Some(TypeTag::Vector) if cells == 1 => TypeTag::Float,
        _ if cells == 1 => TypeTag::Any,
        _ => TypeTag::Struct(cells.clamp(0, u16::MAX as i64) as u16),
    }
}

impl<'w, A: ActionsData + ?Sized> FrameWalk<'w, A> {
    fn new(actions: &'w A, states: &'w StateArena) -> Self {
        Self {
            actions,
            states,
            height: 0,
            tags: Vec::new(),
            labels: HashMap::new(),
            reachable: true,
            ret_height: None,
            writes: Vec::new(),
        }
    }

    fn set_height(&mut self, height: i64) -> Result<(), FrameError> {
        if height > MAX_FRAME_CELLS {
            return Err(FrameError::Overflow { height });
        }
        self.height = height;
        self.tags.resize(height.max(0) as usize, None);
        Ok(())
    }

    fn push(&mut self, tag: Option<TypeTag>, n: i64) -> Result<(), FrameError> {
        let start = self.height.max(0) as usize;
        self.set_height(self.height + n)?;
        for slot in self.tags.iter_mut().skip(start) {
            *slot = tag;
        }
        Ok(())
    }

    fn push_tags(&mut self, tags: Vec<Option<TypeTag>>) -> Result<(), FrameError> {
        for tag in tags {
            self.push(tag, 1)?;
        }
        Ok(())
    }

    fn pop(&mut self, n: i64) -> Result<(), FrameError> {
        self.set_height(self.height - n)
    }

    fn tag_at(&self, index: i64) -> Option<TypeTag> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.tags.get(i).copied().flatten())
    }

    fn tags_from(&self, start: i64, n: i64) -> Vec<Option<TypeTag>> {
        (start..start + n).map(|i| self.tag_at(i)).collect()
    }

    fn record(&mut self, target: Position) {
        let height = self.height;
        self.labels
            .entry(target)
            .and_modify(|h| *h = (*h).max(height))
            .or_insert(height);
    }

    fn run(mut self, sub: &Subroutine) -> Result<FrameSignature, FrameError> {
        for inst in sub.live() {
            if let Some(&h) = self.labels.get(&inst.pos) {
                if !self.reachable {
                    self.set_height(h)?;
                } else if h != self.height {
                    log::trace!(
                        "0x{:08X}: join heights {} and {}",
                        inst.pos,
                        self.height,
                        h
                    );
                    self.set_height(self.height.max(h))?;
                }
            }
            self.reachable = true;
            self.step(inst)?;
        }

        let ret = self.ret_height.ok_or(FrameError::NoReturn)?;
        if ret > 0 {
            return Err(FrameError::Unbalanced { height: ret });
        }
        let params = -ret;

        let mut slot_writes = self.writes.iter().filter(|w| w.dest + w.cells == -params);
        let return_type = match slot_writes.next() {
            None => TypeTag::Void,
            Some(first) => {
                let ty = value_type(first.tag, first.cells);
                if slot_writes.all(|w| value_type(w.tag, w.cells) == ty) {
                    ty
                } else {
                    TypeTag::Any
                }
            }
        };

        Ok(FrameSignature {
            param_count: params as usize,
            return_type,
        })
    }

    fn step(&mut self, inst: &Instruction) -> Result<(), FrameError> {
        match &inst.op {
            Op::CpDownSp { offset, size } => {
                let n = cells(*size);
                self.writes.push(Write {
                    dest: self.height + cells(*offset),
                    cells: n,
                    tag: self.tag_at(self.height - n),
                });
            }
            Op::RsAdd(ty) => self.push(Some(*ty), ty.cell_size() as i64)?,
            Op::CpTopSp { offset, size } => {
                let copied = self.tags_from(self.height + cells(*offset), cells(*size));
                self.push_tags(copied)?;
            }
            Op::Const(c) => self.push(Some(c.type_tag()), 1)?,
            Op::Action { routine, argc } => {
                let ret = self
                    .actions
                    .return_type(*routine)
                    .ok_or(FrameError::UnknownAction { routine: *routine })?;
                self.pop(self.actions.removed_argument_cells(*routine, *argc) as i64)?;
                self.push(Some(ret), ret.cell_size() as i64)?;
            }
            Op::Logical(_) => {
                self.pop(2)?;
                self.push(Some(TypeTag::Int), 1)?;
            }
            Op::Binary { op, operands } => {
                let consumed = (operands.lhs.cell_size() + operands.rhs.cell_size()) as i64;
                match op.family() {
                    BinaryFamily::Equality | BinaryFamily::Scalar => {
                        self.pop(consumed)?;
                        self.push(Some(TypeTag::Int), 1)?;
                    }
                    BinaryFamily::VectorCapable => {
                        let result = operands.result();
                        self.pop(consumed)?;
                        self.push(Some(result), result.cell_size() as i64)?;
                    }
                }
            }
            Op::Unary { ty, .. } => {
                self.pop(1)?;
                self.push(Some(*ty), 1)?;
            }
            Op::MovSp(offset) => self.set_height(self.height + cells(*offset))?,
            Op::Jmp { target } => {
                if *target > inst.pos {
                    self.record(*target);
                }
                self.reachable = false;
            }
            Op::Jz { target } | Op::Jnz { target } => {
                self.pop(1)?;
                if *target > inst.pos {
                    self.record(*target);
                }
            }
            Op::Jsr { target } => {
                let callee = self
                    .states
                    .get(*target)
                    .filter(|s| s.is_prototyped())
                    .ok_or(FrameError::UnresolvedCallee { callee: *target })?;
                self.pop(callee.param_count() as i64)?;
            }
            Op::Retn => {
                match self.ret_height {
                    None => self.ret_height = Some(self.height),
                    Some(first) if first != self.height => {
                        return Err(FrameError::InconsistentReturn {
                            first,
                            other: self.height,
                        })
                    }
                    Some(_) => {}
                }
                self.reachable = false;
            }
            Op::Destruct {
                remove,
                keep_offset,
                keep,
            } => {
                let removed = cells(*remove);
                let kept =
                    self.tags_from(self.height - removed + cells(*keep_offset), cells(*keep));
                self.pop(removed)?;
                self.push_tags(kept)?;
            }
            Op::CpTopBp { size, .. } => self.push(None, cells(*size))?,
            Op::SaveBp => self.push(None, 1)?,
            Op::RestoreBp => self.pop(1)?,
            Op::StoreStateAll(_)
            | Op::DecISp(_)
            | Op::IncISp(_)
            | Op::DecIBp(_)
            | Op::IncIBp(_)
            | Op::CpDownBp { .. }
            | Op::StoreState { .. }
            | Op::Nop => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ActionTable;
    use crate::asm::Assembler;
    use crate::decode::{BinaryOp, Constant};
    use crate::types::OperandTypes;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn int(v: i32) -> Op {
        Op::Const(Constant::Int(v))
    }

    fn add_ii() -> Op {
        Op::Binary {
            op: BinaryOp::Add,
            operands: OperandTypes::from_code(0x20, 0).unwrap(),
        }
    }

    fn setup(asm: &Assembler) -> (Program, StateArena, HashMap<String, Position>) {
        let program = Program::from_instructions(asm.assemble().unwrap());
        let states = StateArena::new(&program);
        (program, states, asm.labels().unwrap())
    }

    fn type_one(program: &Program, states: &mut StateArena, pos: Position) -> bool {
        let table = ActionTable::bundled().unwrap();
        let mut typer = FrameTyper::new(&table);
        if !typer.discover(program, states, pos) {
            return false;
        }
        typer.derive(program, states, pos);
        states.is_prototyped(pos)
    }

    /// `int add(int a, int b)` called from `void main()`.
    fn add_program() -> Assembler {
        let mut asm = Assembler::new();
        asm.jsr("main").op(Op::Retn);
        asm.label("main")
            .op(Op::RsAdd(TypeTag::Int))
            .op(int(1))
            .op(int(2))
            .jsr("add")
            .op(Op::MovSp(-4))
            .op(Op::Retn);
        asm.label("add")
            .op(Op::CpTopSp { offset: -8, size: 4 })
            .op(Op::CpTopSp { offset: -8, size: 4 })
            .op(add_ii())
            .op(Op::CpDownSp {
                offset: -16,
                size: 4,
            })
            .op(Op::MovSp(-4))
            .op(Op::MovSp(-8))
            .op(Op::Retn);
        asm
    }

    #[test]
    fn settles_callees_before_caller() {
        let asm = add_program();
        let (program, mut states, l) = setup(&asm);

        assert!(type_one(&program, &mut states, l["main"]));

        let add = states.get(l["add"]).unwrap();
        assert!(add.is_prototyped());
        assert_eq!(add.param_count(), 2);
        assert_eq!(add.return_type(), Some(TypeTag::Int));
        assert_eq!(add.params(), &[TypeTag::Any, TypeTag::Any]);

        let main = states.get(l["main"]).unwrap();
        assert_eq!(main.param_count(), 0);
        assert_eq!(main.return_type(), Some(TypeTag::Void));
    }

    #[test]
    fn vector_return_from_action() {
        let mut asm = Assembler::new();
        asm.jsr("main").op(Op::Retn);
        asm.label("main")
            .op(Op::Const(Constant::Object(0)))
            .op(Op::Action { routine: 27, argc: 1 })
            .op(Op::CpDownSp {
                offset: -24,
                size: 12,
            })
            .op(Op::MovSp(-12))
            .op(Op::Retn);
        let (program, mut states, l) = setup(&asm);

        assert!(type_one(&program, &mut states, l["main"]));
        let main = states.get(l["main"]).unwrap();
        assert_eq!(main.return_type(), Some(TypeTag::Vector));
        assert_eq!(main.param_count(), 0);
    }

    #[test]
    fn forward_branches_restore_height() {
        // int pick(int a) { if (a) return 1; return 2; }
        let mut asm = Assembler::new();
        asm.jsr("main").op(Op::Retn);
        asm.label("main")
            .op(Op::CpTopSp { offset: -4, size: 4 })
            .jz("else")
            .op(int(1))
            .op(Op::CpDownSp {
                offset: -12,
                size: 4,
            })
            .op(Op::MovSp(-4))
            .jmp("end")
            .label("else")
            .op(int(2))
            .op(Op::CpDownSp {
                offset: -12,
                size: 4,
            })
            .op(Op::MovSp(-4))
            .label("end")
            .op(Op::MovSp(-4))
            .op(Op::Retn);
        let (program, states, l) = setup(&asm);

        let table = ActionTable::bundled().unwrap();
        let typer = FrameTyper::new(&table);
        let sig = typer
            .signature(program.subroutine(l["main"]).unwrap(), &states)
            .unwrap();
        assert_eq!(
            sig,
            FrameSignature {
                param_count: 1,
                return_type: TypeTag::Int
            }
        );
    }

    #[test]
    fn disagreeing_returns_fail() {
        let mut asm = Assembler::new();
        asm.jsr("main").op(Op::Retn);
        asm.label("main")
            .op(int(1))
            .jz("other")
            .op(Op::Retn)
            .label("other")
            .op(int(1))
            .op(Op::Retn);
        let (program, mut states, l) = setup(&asm);

        let table = ActionTable::bundled().unwrap();
        let typer = FrameTyper::new(&table);
        assert_eq!(
            typer.signature(program.subroutine(l["main"]).unwrap(), &states),
            Err(FrameError::InconsistentReturn { first: 0, other: 1 })
        );

        assert!(!type_one(&program, &mut states, l["main"]));
        assert_eq!(states.status(l["main"]), Some(PrototypeStatus::Unprototyped));
    }

    #[test]
    fn unknown_action_fails() {
        let mut asm = Assembler::new();
        asm.jsr("main").op(Op::Retn);
        asm.label("main")
            .op(Op::Action {
                routine: 4000,
                argc: 0,
            })
            .op(Op::Retn);
        let (program, mut states, l) = setup(&asm);
        assert!(!type_one(&program, &mut states, l["main"]));
        assert_eq!(states.status(l["main"]), Some(PrototypeStatus::Unprototyped));
    }

    #[test]
    fn call_cycle_blocks_discovery() {
        let mut asm = Assembler::new();
        asm.jsr("main").op(Op::Retn);
        asm.label("main").jsr("a").op(Op::Retn);
        asm.label("a").jsr("b").op(Op::Retn);
        asm.label("b").jsr("a").op(Op::Retn);
        let (program, mut states, l) = setup(&asm);

        let table = ActionTable::bundled().unwrap();
        let mut typer = FrameTyper::new(&table);
        assert!(!typer.discover(&program, &mut states, l["main"]));
        for name in ["main", "a", "b"] {
            assert_eq!(states.status(l[name]), Some(PrototypeStatus::Unprototyped));
        }
    }

    #[test]
    fn self_call_blocks_discovery() {
        let mut asm = Assembler::new();
        asm.jsr("main").op(Op::Retn);
        asm.label("main").jsr("main").op(Op::Retn);
        let (program, mut states, l) = setup(&asm);
        assert!(!type_one(&program, &mut states, l["main"]));
        assert_eq!(states.status(l["main"]), Some(PrototypeStatus::Unprototyped));
    }

    #[test]
    fn runaway_stack_growth_fails() {
        let mut asm = Assembler::new();
        asm.jsr("main").op(Op::Retn);
        asm.label("main");
        for _ in 0..4 {
            asm.op(Op::MovSp(0x7FFF_FFFC));
        }
        asm.op(Op::Retn);
        let (program, mut states, l) = setup(&asm);

        let table = ActionTable::bundled().unwrap();
        let typer = FrameTyper::new(&table);
        assert!(matches!(
            typer.signature(program.subroutine(l["main"]).unwrap(), &states),
            Err(FrameError::Overflow { .. })
        ));

        assert!(!type_one(&program, &mut states, l["main"]));
        assert_eq!(states.status(l["main"]), Some(PrototypeStatus::Unprototyped));
    }

    #[test]
    fn prototyped_subroutine_is_not_rediscovered() {
        let asm = add_program();
        let (program, mut states, l) = setup(&asm);
        assert!(type_one(&program, &mut states, l["add"]));

        let table = ActionTable::bundled().unwrap();
        let mut typer = FrameTyper::new(&table);
        assert!(!typer.discover(&program, &mut states, l["add"]));
        typer.derive(&program, &mut states, l["add"]);
        assert_eq!(states.get(l["add"]).unwrap().param_count(), 2);
    }
}
