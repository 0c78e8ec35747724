use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::mem::size_of;

use crate::error::DecodeError;
use crate::opcode::Opcode;
use crate::parser::{NcsFile, CODE_START};
use crate::types::{OperandTypes, TypeTag, STRUCT_PAIR};

/// Byte offset of an instruction in the NCS image.
pub type Position = u32;

/// Bytes per stack cell.
pub const CELL: i32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Float(f32),
    String(String),
    Object(i32),
}

impl Constant {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Constant::Int(_) => TypeTag::Int,
            Constant::Float(_) => TypeTag::Float,
            Constant::String(_) => TypeTag::String,
            Constant::Object(_) => TypeTag::Object,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    IncOr,
    ExcOr,
    BoolAnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Equal,
    NEqual,
    Geq,
    Gt,
    Lt,
    Leq,
    ShLeft,
    ShRight,
    UShRight,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// How a binary instruction consumes its operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryFamily {
    /// EQUAL / NEQUAL: aggregates compare at full width.
    Equality,
    /// ADD / SUB / MUL / DIV: operand and result widths follow the type byte.
    VectorCapable,
    /// Everything else: one cell per side, one cell result.
    Scalar,
}

impl BinaryOp {
    pub fn family(&self) -> BinaryFamily {
        match self {
            BinaryOp::Equal | BinaryOp::NEqual => BinaryFamily::Equality,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                BinaryFamily::VectorCapable
            }
            _ => BinaryFamily::Scalar,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Comp,
    Not,
}

/// One decoded instruction. Jump-family targets are absolute positions.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    CpDownSp { offset: i32, size: u16 },
    RsAdd(TypeTag),
    CpTopSp { offset: i32, size: u16 },
    Const(Constant),
    Action { routine: u16, argc: u8 },
    Logical(LogicalOp),
    Binary { op: BinaryOp, operands: OperandTypes },
    Unary { op: UnaryOp, ty: TypeTag },
    MovSp(i32),
    StoreStateAll(u8),
    Jmp { target: Position },
    Jsr { target: Position },
    Jz { target: Position },
    Jnz { target: Position },
    Retn,
    Destruct { remove: u16, keep_offset: u16, keep: u16 },
    DecISp(i32),
    IncISp(i32),
    DecIBp(i32),
    IncIBp(i32),
    CpDownBp { offset: i32, size: u16 },
    CpTopBp { offset: i32, size: u16 },
    SaveBp,
    RestoreBp,
    StoreState { bp: u32, sp: u32 },
    Nop,
}

impl Op {
    pub fn opcode(&self) -> Opcode {
        match self {
            Op::CpDownSp { .. } => Opcode::CpDownSp,
            Op::RsAdd(_) => Opcode::RsAdd,
            Op::CpTopSp { .. } => Opcode::CpTopSp,
            Op::Const(_) => Opcode::Const,
            Op::Action { .. } => Opcode::Action,
            Op::Logical(op) => match op {
                LogicalOp::And => Opcode::LogAnd,
                LogicalOp::Or => Opcode::LogOr,
                LogicalOp::IncOr => Opcode::IncOr,
                LogicalOp::ExcOr => Opcode::ExcOr,
                LogicalOp::BoolAnd => Opcode::BoolAnd,
            },
            Op::Binary { op, .. } => match op {
                BinaryOp::Equal => Opcode::Equal,
                BinaryOp::NEqual => Opcode::NEqual,
                BinaryOp::Geq => Opcode::Geq,
                BinaryOp::Gt => Opcode::Gt,
                BinaryOp::Lt => Opcode::Lt,
                BinaryOp::Leq => Opcode::Leq,
                BinaryOp::ShLeft => Opcode::ShLeft,
                BinaryOp::ShRight => Opcode::ShRight,
                BinaryOp::UShRight => Opcode::UShRight,
                BinaryOp::Add => Opcode::Add,
                BinaryOp::Sub => Opcode::Sub,
                BinaryOp::Mul => Opcode::Mul,
                BinaryOp::Div => Opcode::Div,
                BinaryOp::Mod => Opcode::Mod,
            },
            Op::Unary { op, .. } => match op {
                UnaryOp::Neg => Opcode::Neg,
                UnaryOp::Comp => Opcode::Comp,
                UnaryOp::Not => Opcode::Not,
            },
            Op::MovSp(_) => Opcode::MovSp,
            Op::StoreStateAll(_) => Opcode::StoreStateAll,
            Op::Jmp { .. } => Opcode::Jmp,
            Op::Jsr { .. } => Opcode::Jsr,
            Op::Jz { .. } => Opcode::Jz,
            Op::Jnz { .. } => Opcode::Jnz,
            Op::Retn => Opcode::Retn,
            Op::Destruct { .. } => Opcode::Destruct,
            Op::DecISp(_) => Opcode::DecISp,
            Op::IncISp(_) => Opcode::IncISp,
            Op::DecIBp(_) => Opcode::DecIBp,
            Op::IncIBp(_) => Opcode::IncIBp,
            Op::CpDownBp { .. } => Opcode::CpDownBp,
            Op::CpTopBp { .. } => Opcode::CpTopBp,
            Op::SaveBp => Opcode::SaveBp,
            Op::RestoreBp => Opcode::RestoreBp,
            Op::StoreState { .. } => Opcode::StoreState,
            Op::Nop => Opcode::Nop,
        }
    }

    /// The byte following the opcode.
    pub fn type_byte(&self) -> u8 {
        match self {
            Op::CpDownSp { .. } | Op::CpTopSp { .. } | Op::CpDownBp { .. } | Op::CpTopBp { .. } => {
                0x01
            }
            Op::RsAdd(ty) | Op::Unary { ty, .. } => ty.code().unwrap_or(0x03),
            Op::Const(c) => c.type_tag().code().unwrap_or(0x03),
            Op::Logical(_) => 0x20,
            Op::Binary { operands, .. } => operands.code,
            Op::StoreStateAll(v) => *v,
            Op::StoreState { .. } => 0x10,
            _ => 0x00,
        }
    }

    /// Encoded length in bytes, opcode and type byte included.
    pub fn encoded_len(&self) -> usize {
        2 + match self {
            Op::CpDownSp { .. } | Op::CpTopSp { .. } | Op::CpDownBp { .. } | Op::CpTopBp { .. } => {
                size_of::<i32>() + size_of::<u16>()
            }
            // Windows-1252 is single-byte.
            Op::Const(Constant::String(s)) => size_of::<u16>() + s.chars().count(),
            Op::Const(_) => size_of::<i32>(),
            Op::Action { .. } => size_of::<u16>() + size_of::<u8>(),
            Op::Binary { operands, .. } if operands.code == STRUCT_PAIR => size_of::<u16>(),
            Op::MovSp(_)
            | Op::Jmp { .. }
            | Op::Jsr { .. }
            | Op::Jz { .. }
            | Op::Jnz { .. }
            | Op::DecISp(_)
            | Op::IncISp(_)
            | Op::DecIBp(_)
            | Op::IncIBp(_) => size_of::<i32>(),
            Op::Destruct { .. } => 3 * size_of::<u16>(),
            Op::StoreState { .. } => 2 * size_of::<u32>(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub pos: Position,
    pub op: Op,
}

impl Instruction {
    pub fn new(pos: Position, op: Op) -> Self {
        Self { pos, op }
    }

    /// Resolved destination of a jump-family instruction (JMP, JSR, JZ, JNZ).
    pub fn destination(&self) -> Option<Position> {
        match self.op {
            Op::Jmp { target } | Op::Jsr { target } | Op::Jz { target } | Op::Jnz { target } => {
                Some(target)
            }
            _ => None,
        }
    }

    /// Destination of an intra-subroutine branch (excludes JSR).
    fn branch_destination(&self) -> Option<Position> {
        match self.op {
            Op::Jmp { target } | Op::Jz { target } | Op::Jnz { target } => Some(target),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}  {:<12}{:02X}",
            self.pos,
            self.op.opcode().mnemonic(),
            self.op.type_byte()
        )?;
        match &self.op {
            Op::CpDownSp { offset, size }
            | Op::CpTopSp { offset, size }
            | Op::CpDownBp { offset, size }
            | Op::CpTopBp { offset, size } => write!(f, " {} {}", offset, size),
            Op::Const(Constant::Int(v)) | Op::Const(Constant::Object(v)) => write!(f, " {}", v),
            Op::Const(Constant::Float(v)) => write!(f, " {}", v),
            Op::Const(Constant::String(s)) => write!(f, " {:?}", s),
            Op::Action { routine, argc } => write!(f, " {} {}", routine, argc),
            Op::Binary { operands, .. } if operands.code == STRUCT_PAIR => {
                write!(f, " {}", operands.lhs.cell_size() as i32 * CELL)
            }
            Op::MovSp(v) | Op::DecISp(v) | Op::IncISp(v) | Op::DecIBp(v) | Op::IncIBp(v) => {
                write!(f, " {}", v)
            }
            Op::Jmp { target } | Op::Jsr { target } | Op::Jz { target } | Op::Jnz { target } => {
                write!(f, " {:08X}", target)
            }
            Op::Destruct {
                remove,
                keep_offset,
                keep,
            } => write!(f, " {} {} {}", remove, keep_offset, keep),
            Op::StoreState { bp, sp } => write!(f, " {} {}", bp, sp),
            _ => Ok(()),
        }
    }
}

fn jump_target(pos: Position, offset: i32) -> Result<Position, DecodeError> {
    let target = pos as i64 + offset as i64;
    Position::try_from(target).map_err(|_| DecodeError::JumpOutOfRange { pos, offset })
}

fn decode_one(file: &NcsFile, pc: usize) -> Result<(Instruction, usize), DecodeError> {
    let pos = pc as Position;
    let opcode_u8 = file.read_u8(pc)?;
    let opcode =
        Opcode::try_from(opcode_u8).map_err(|opcode| DecodeError::InvalidOpcode { opcode, pos })?;
    let ty = file.read_u8(pc + 1)?;
    let bad_type = || DecodeError::InvalidType {
        ty,
        mnemonic: opcode.mnemonic(),
        pos,
    };

    let mut cur = pc + 2;
    let op = match opcode {
        Opcode::CpDownSp | Opcode::CpTopSp | Opcode::CpDownBp | Opcode::CpTopBp => {
            let offset = file.read_i32(cur)?;
            cur += size_of::<i32>();
            let size = file.read_u16(cur)?;
            cur += size_of::<u16>();
            match opcode {
                Opcode::CpDownSp => Op::CpDownSp { offset, size },
                Opcode::CpTopSp => Op::CpTopSp { offset, size },
                Opcode::CpDownBp => Op::CpDownBp { offset, size },
                _ => Op::CpTopBp { offset, size },
            }
        }
        Opcode::RsAdd => Op::RsAdd(TypeTag::from_code(ty).ok_or_else(bad_type)?),
        Opcode::Const => {
            let c = match ty {
                0x03 => Constant::Int(file.read_i32(cur)?),
                0x04 => Constant::Float(file.read_f32(cur)?),
                0x06 => Constant::Object(file.read_i32(cur)?),
                0x05 => {
                    let len = file.read_u16(cur)? as usize;
                    cur += size_of::<u16>();
                    let s = file.read_string(cur, len)?;
                    cur += len;
                    Constant::String(s)
                }
                _ => return Err(bad_type()),
            };
            if !matches!(c, Constant::String(_)) {
                cur += size_of::<i32>();
            }
            Op::Const(c)
        }
        Opcode::Action => {
            let routine = file.read_u16(cur)?;
            cur += size_of::<u16>();
            let argc = file.read_u8(cur)?;
            cur += size_of::<u8>();
            Op::Action { routine, argc }
        }
        Opcode::LogAnd => Op::Logical(LogicalOp::And),
        Opcode::LogOr => Op::Logical(LogicalOp::Or),
        Opcode::IncOr => Op::Logical(LogicalOp::IncOr),
        Opcode::ExcOr => Op::Logical(LogicalOp::ExcOr),
        Opcode::BoolAnd => Op::Logical(LogicalOp::BoolAnd),
        Opcode::Equal
        | Opcode::NEqual
        | Opcode::Geq
        | Opcode::Gt
        | Opcode::Lt
        | Opcode::Leq
        | Opcode::ShLeft
        | Opcode::ShRight
        | Opcode::UShRight
        | Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::Div
        | Opcode::Mod => {
            let op = match opcode {
                Opcode::Equal => BinaryOp::Equal,
                Opcode::NEqual => BinaryOp::NEqual,
                Opcode::Geq => BinaryOp::Geq,
                Opcode::Gt => BinaryOp::Gt,
                Opcode::Lt => BinaryOp::Lt,
                Opcode::Leq => BinaryOp::Leq,
                Opcode::ShLeft => BinaryOp::ShLeft,
                Opcode::ShRight => BinaryOp::ShRight,
                Opcode::UShRight => BinaryOp::UShRight,
                Opcode::Add => BinaryOp::Add,
                Opcode::Sub => BinaryOp::Sub,
                Opcode::Mul => BinaryOp::Mul,
                Opcode::Div => BinaryOp::Div,
                _ => BinaryOp::Mod,
            };
            let mut struct_cells = 0;
            if ty == STRUCT_PAIR {
                let size = file.read_u16(cur)?;
                cur += size_of::<u16>();
                struct_cells = size / CELL as u16;
            }
            let operands = OperandTypes::from_code(ty, struct_cells).ok_or_else(bad_type)?;
            Op::Binary { op, operands }
        }
        Opcode::Neg | Opcode::Comp | Opcode::Not => {
            let op = match opcode {
                Opcode::Neg => UnaryOp::Neg,
                Opcode::Comp => UnaryOp::Comp,
                _ => UnaryOp::Not,
            };
            Op::Unary {
                op,
                ty: TypeTag::from_code(ty).ok_or_else(bad_type)?,
            }
        }
        Opcode::StoreStateAll => Op::StoreStateAll(ty),
        Opcode::Retn => Op::Retn,
        Opcode::SaveBp => Op::SaveBp,
        Opcode::RestoreBp => Op::RestoreBp,
        Opcode::Nop => Op::Nop,
        Opcode::MovSp
        | Opcode::Jmp
        | Opcode::Jsr
        | Opcode::Jz
        | Opcode::Jnz
        | Opcode::DecISp
        | Opcode::IncISp
        | Opcode::DecIBp
        | Opcode::IncIBp => {
            let v = file.read_i32(cur)?;
            cur += size_of::<i32>();
            match opcode {
                Opcode::MovSp => Op::MovSp(v),
                Opcode::Jmp => Op::Jmp {
                    target: jump_target(pos, v)?,
                },
                Opcode::Jsr => Op::Jsr {
                    target: jump_target(pos, v)?,
                },
                Opcode::Jz => Op::Jz {
                    target: jump_target(pos, v)?,
                },
                Opcode::Jnz => Op::Jnz {
                    target: jump_target(pos, v)?,
                },
                Opcode::DecISp => Op::DecISp(v),
                Opcode::IncISp => Op::IncISp(v),
                Opcode::DecIBp => Op::DecIBp(v),
                _ => Op::IncIBp(v),
            }
        }
        Opcode::Destruct => {
            let remove = file.read_u16(cur)?;
            cur += size_of::<u16>();
            let keep_offset = file.read_u16(cur)?;
            cur += size_of::<u16>();
            let keep = file.read_u16(cur)?;
            cur += size_of::<u16>();
            Op::Destruct {
                remove,
                keep_offset,
                keep,
            }
        }
        Opcode::StoreState => {
            let bp = file.read_u32(cur)?;
            cur += size_of::<u32>();
            let sp = file.read_u32(cur)?;
            cur += size_of::<u32>();
            Op::StoreState { bp, sp }
        }
    };

    Ok((Instruction { pos, op }, cur))
}

/// Decode the whole code area into a flat instruction stream.
pub fn decode_instructions(file: &NcsFile) -> Result<Vec<Instruction>, DecodeError> {
    let end = file.code_end();
    let mut pc = CODE_START;
    let mut insts = Vec::new();

    while pc < end {
        let (inst, next_pc) = decode_one(file, pc)?;
        log::trace!("{}", inst);
        insts.push(inst);
        pc = next_pc;
    }

    Ok(insts)
}

/// How an instruction is reached from its subroutine's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    /// On the subroutine's own frame.
    Live,
    /// Inside a STORE_STATE body; runs later on a saved frame.
    Deferred,
    Dead,
}

/// A callable region starting at a JSR target.
#[derive(Debug, Clone)]
pub struct Subroutine {
    pub position: Position,
    pub insts: Vec<Instruction>,
    reach: Vec<Reach>,
    /// Indices where a STORE_STATE body starts, ascending.
    deferred_entries: Vec<usize>,
}

impl Subroutine {
    pub fn new(position: Position, insts: Vec<Instruction>) -> Self {
        let (reach, deferred_entries) = classify_reach(&insts);
        Self {
            position,
            insts,
            reach,
            deferred_entries,
        }
    }

    pub fn reach(&self, index: usize) -> Reach {
        self.reach.get(index).copied().unwrap_or(Reach::Dead)
    }

    /// Whether the instruction at `index` can never run.
    pub fn is_dead_code(&self, index: usize) -> bool {
        self.reach(index) == Reach::Dead
    }

    pub fn is_deferred(&self, index: usize) -> bool {
        self.reach(index) == Reach::Deferred
    }

    pub fn is_deferred_entry(&self, index: usize) -> bool {
        self.deferred_entries.binary_search(&index).is_ok()
    }

    /// Instructions paired with their classification.
    pub fn classified(&self) -> impl Iterator<Item = (&Instruction, Reach)> + '_ {
        self.insts.iter().zip(self.reach.iter().copied())
    }

    /// Instructions running on the subroutine's own frame.
    pub fn live(&self) -> impl Iterator<Item = &Instruction> + '_ {
        self.classified()
            .filter(|(_, reach)| *reach == Reach::Live)
            .map(|(inst, _)| inst)
    }

    /// Targets of every live JSR in the body.
    pub fn live_call_targets(&self) -> BTreeSet<Position> {
        self.live()
            .filter_map(|inst| match inst.op {
                Op::Jsr { target } => Some(target),
                _ => None,
            })
            .collect()
    }
}

/// Index of the body a STORE_STATE at `i` protects: the instruction after its
/// skip-JMP.
fn deferred_entry(insts: &[Instruction], i: usize) -> Option<usize> {
    match (&insts[i].op, insts.get(i + 1).map(|next| &next.op)) {
        (Op::StoreState { .. } | Op::StoreStateAll(_), Some(Op::Jmp { .. }))
            if i + 2 < insts.len() =>
        {
            Some(i + 2)
        }
        _ => None,
    }
}

/// Worklist reachability over one subroutine body. Live code is walked first
/// from the entry; every STORE_STATE body found on the way is then walked as
/// deferred code. Whatever neither walk visits is dead.
fn classify_reach(insts: &[Instruction]) -> (Vec<Reach>, Vec<usize>) {
    let index: HashMap<Position, usize> = insts
        .iter()
        .enumerate()
        .map(|(i, inst)| (inst.pos, i))
        .collect();

    let mut reach = vec![Reach::Dead; insts.len()];
    let mut entries = Vec::new();
    let mut work: Vec<usize> = Vec::new();
    let mut deferred: Vec<usize> = Vec::new();
    if !insts.is_empty() {
        work.push(0);
    }

    for kind in [Reach::Live, Reach::Deferred] {
        if kind == Reach::Deferred {
            work = deferred
                .iter()
                .copied()
                .filter(|&i| reach[i] == Reach::Dead)
                .collect();
            entries.extend(work.iter().copied());
        }
        while let Some(i) = work.pop() {
            if reach[i] != Reach::Dead {
                continue;
            }
            reach[i] = kind;

            let inst = &insts[i];
            if let Some(entry) = deferred_entry(insts, i) {
                if kind == Reach::Live {
                    deferred.push(entry);
                } else {
                    work.push(entry);
                    entries.push(entry);
                }
            }
            if let Some(dst) = inst.branch_destination() {
                if let Some(&j) = index.get(&dst) {
                    work.push(j);
                }
            }
            let falls_through = !matches!(inst.op, Op::Jmp { .. } | Op::Retn);
            if falls_through && i + 1 < insts.len() {
                work.push(i + 1);
            }
        }
    }

    entries.retain(|&i| reach[i] == Reach::Deferred);
    entries.sort_unstable();
    entries.dedup();
    (reach, entries)
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Loader stub preceding the first subroutine.
    pub bootstrap: Vec<Instruction>,
    subroutines: BTreeMap<Position, Subroutine>,
    main: Option<Position>,
    globals: Option<Position>,
}

impl Program {
    pub fn from_instructions(insts: Vec<Instruction>) -> Self {
        let positions: BTreeSet<Position> = insts.iter().map(|i| i.pos).collect();

        let mut entries: BTreeSet<Position> = BTreeSet::new();
        for inst in &insts {
            if let Op::Jsr { target } = inst.op {
                if positions.contains(&target) {
                    entries.insert(target);
                } else {
                    log::warn!(
                        "JSR at 0x{:08X} targets 0x{:08X}, which is not an instruction boundary",
                        inst.pos,
                        target
                    );
                }
            }
        }

        let mut bootstrap = Vec::new();
        let mut subroutines = BTreeMap::new();
        let mut cur: Option<(Position, Vec<Instruction>)> = None;

        for inst in insts {
            if entries.contains(&inst.pos) {
                if let Some((start, body)) = cur.take() {
                    subroutines.insert(start, Subroutine::new(start, body));
                }
                cur = Some((inst.pos, vec![inst]));
            } else if let Some((_, body)) = cur.as_mut() {
                body.push(inst);
            } else {
                bootstrap.push(inst);
            }
        }
        if let Some((start, body)) = cur.take() {
            subroutines.insert(start, Subroutine::new(start, body));
        }

        let mut program = Program {
            bootstrap,
            subroutines,
            main: None,
            globals: None,
        };
        program.detect_entries();
        program
    }

    pub fn from_file(file: &NcsFile) -> Result<Self, DecodeError> {
        Ok(Self::from_instructions(decode_instructions(file)?))
    }

    fn first_call_in<'a>(
        &self,
        insts: impl IntoIterator<Item = &'a Instruction>,
    ) -> Option<Position> {
        insts.into_iter().find_map(|inst| match inst.op {
            Op::Jsr { target } if self.subroutines.contains_key(&target) => Some(target),
            _ => None,
        })
    }

    fn detect_entries(&mut self) {
        let Some(first) = self.first_call_in(&self.bootstrap) else {
            log::warn!("no loader stub call found; main entry unknown");
            return;
        };

        let sub = &self.subroutines[&first];
        match sub.insts.iter().position(|i| matches!(i.op, Op::SaveBp)) {
            Some(save) => {
                self.main = self.first_call_in(&sub.insts[save..]);
                self.globals = Some(first);
                if self.main.is_none() {
                    log::warn!("globals initializer at 0x{:08X} never calls main", first);
                }
            }
            None => self.main = Some(first),
        }
    }

    /// All subroutines in ascending position order.
    pub fn subroutines(&self) -> impl Iterator<Item = &Subroutine> + '_ {
        self.subroutines.values()
    }

    pub fn subroutine(&self, pos: Position) -> Option<&Subroutine> {
        self.subroutines.get(&pos)
    }

    pub fn is_subroutine(&self, pos: Position) -> bool {
        self.subroutines.contains_key(&pos)
    }

    pub fn subroutine_count(&self) -> usize {
        self.subroutines.len()
    }

    pub fn main_entry(&self) -> Option<Position> {
        self.main
    }

    pub fn globals_entry(&self) -> Option<Position> {
        self.globals
    }
}
