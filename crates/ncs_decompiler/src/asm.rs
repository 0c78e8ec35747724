use std::collections::HashMap;

use anyhow::{anyhow, bail, Result};

use crate::decode::{Constant, Instruction, Op, Position};
use crate::parser::{CODE_START, PROGRAM_MARKER, SIGNATURE};
use crate::types::STRUCT_PAIR;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum JumpKind {
    Jmp,
    Jsr,
    Jz,
    Jnz,
}

#[derive(Clone, Debug)]
enum Item {
    Label(String),
    Op(Op),
    Jump { kind: JumpKind, label: String },
}

/// Two-pass NCS assembler: label positions first, then encoding.
#[derive(Clone, Debug, Default)]
pub struct Assembler {
    items: Vec<Item>,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&mut self, name: impl Into<String>) -> &mut Self {
        self.items.push(Item::Label(name.into()));
        self
    }

    pub fn op(&mut self, op: Op) -> &mut Self {
        self.items.push(Item::Op(op));
        self
    }

    fn jump(&mut self, kind: JumpKind, label: impl Into<String>) -> &mut Self {
        self.items.push(Item::Jump {
            kind,
            label: label.into(),
        });
        self
    }

    pub fn jmp(&mut self, label: impl Into<String>) -> &mut Self {
        self.jump(JumpKind::Jmp, label)
    }

    pub fn jsr(&mut self, label: impl Into<String>) -> &mut Self {
        self.jump(JumpKind::Jsr, label)
    }

    pub fn jz(&mut self, label: impl Into<String>) -> &mut Self {
        self.jump(JumpKind::Jz, label)
    }

    pub fn jnz(&mut self, label: impl Into<String>) -> &mut Self {
        self.jump(JumpKind::Jnz, label)
    }

    /// Positions of every label.
    pub fn labels(&self) -> Result<HashMap<String, Position>> {
        let mut labels = HashMap::new();
        let mut pos = CODE_START as Position;
        for it in &self.items {
            let sz = match it {
                Item::Label(name) => {
                    if labels.insert(name.clone(), pos).is_some() {
                        bail!("duplicate label: {name}");
                    }
                    continue;
                }
                Item::Op(op) => op.encoded_len(),
                Item::Jump { .. } => Op::Jmp { target: 0 }.encoded_len(),
            };
            pos = pos
                .checked_add(sz as Position)
                .ok_or_else(|| anyhow!("position overflow"))?;
        }
        Ok(labels)
    }

    /// Resolve labels into a positioned instruction stream.
    pub fn assemble(&self) -> Result<Vec<Instruction>> {
        let labels = self.labels()?;
        let mut pos = CODE_START as Position;
        let mut out = Vec::new();

        for it in &self.items {
            let op = match it {
                Item::Label(_) => continue,
                Item::Op(op) => op.clone(),
                Item::Jump { kind, label } => {
                    let target = labels
                        .get(label)
                        .copied()
                        .ok_or_else(|| anyhow!("unknown label: {label}"))?;
                    match kind {
                        JumpKind::Jmp => Op::Jmp { target },
                        JumpKind::Jsr => Op::Jsr { target },
                        JumpKind::Jz => Op::Jz { target },
                        JumpKind::Jnz => Op::Jnz { target },
                    }
                }
            };
            let sz = op.encoded_len() as Position;
            out.push(Instruction::new(pos, op));
            pos += sz;
        }

        Ok(out)
    }

    /// Encode a complete NCS image, header included.
    pub fn to_ncs_bytes(&self) -> Result<Vec<u8>> {
        let mut code: Vec<u8> = Vec::new();
        for inst in self.assemble()? {
            encode(&inst, &mut code)?;
        }

        let total = u32::try_from(CODE_START + code.len()).map_err(|_| anyhow!("code too large"))?;
        let mut out = Vec::with_capacity(total as usize);
        out.extend_from_slice(SIGNATURE);
        out.push(PROGRAM_MARKER);
        out.extend_from_slice(&total.to_be_bytes());
        out.extend_from_slice(&code);
        Ok(out)
    }
}

fn encode(inst: &Instruction, out: &mut Vec<u8>) -> Result<()> {
    out.push(inst.op.opcode() as u8);
    out.push(inst.op.type_byte());

    let rel = |target: Position| -> i32 { (target as i64 - inst.pos as i64) as i32 };

    match &inst.op {
        Op::CpDownSp { offset, size }
        | Op::CpTopSp { offset, size }
        | Op::CpDownBp { offset, size }
        | Op::CpTopBp { offset, size } => {
            out.extend_from_slice(&offset.to_be_bytes());
            out.extend_from_slice(&size.to_be_bytes());
        }
        Op::Const(Constant::Int(v)) | Op::Const(Constant::Object(v)) => {
            out.extend_from_slice(&v.to_be_bytes())
        }
        Op::Const(Constant::Float(v)) => out.extend_from_slice(&v.to_be_bytes()),
        Op::Const(Constant::String(s)) => {
            let (raw, _, had_errors) = encoding_rs::WINDOWS_1252.encode(s);
            if had_errors {
                bail!("string constant is not representable in Windows-1252: {s:?}");
            }
            let len = u16::try_from(raw.len()).map_err(|_| anyhow!("string constant too long"))?;
            out.extend_from_slice(&len.to_be_bytes());
            out.extend_from_slice(&raw);
        }
        Op::Action { routine, argc } => {
            out.extend_from_slice(&routine.to_be_bytes());
            out.push(*argc);
        }
        Op::Binary { operands, .. } if operands.code == STRUCT_PAIR => {
            let bytes = operands.lhs.cell_size() * 4;
            let bytes = u16::try_from(bytes).map_err(|_| anyhow!("struct too wide"))?;
            out.extend_from_slice(&bytes.to_be_bytes());
        }
        Op::MovSp(v) | Op::DecISp(v) | Op::IncISp(v) | Op::DecIBp(v) | Op::IncIBp(v) => {
            out.extend_from_slice(&v.to_be_bytes())
        }
        Op::Jmp { target } | Op::Jsr { target } | Op::Jz { target } | Op::Jnz { target } => {
            out.extend_from_slice(&rel(*target).to_be_bytes())
        }
        Op::Destruct {
            remove,
            keep_offset,
            keep,
        } => {
            out.extend_from_slice(&remove.to_be_bytes());
            out.extend_from_slice(&keep_offset.to_be_bytes());
            out.extend_from_slice(&keep.to_be_bytes());
        }
        Op::StoreState { bp, sp } => {
            out.extend_from_slice(&bp.to_be_bytes());
            out.extend_from_slice(&sp.to_be_bytes());
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_forward_and_backward_labels() {
        let mut asm = Assembler::new();
        asm.label("top")
            .op(Op::Const(crate::decode::Constant::Int(0)))
            .jz("out")
            .jmp("top")
            .label("out")
            .op(Op::Retn);

        let insts = asm.assemble().unwrap();
        let labels = asm.labels().unwrap();
        assert_eq!(labels["top"], CODE_START as Position);
        assert_eq!(insts[1].op, Op::Jz { target: labels["out"] });
        assert_eq!(insts[2].op, Op::Jmp { target: labels["top"] });
        // CONST int = 6 bytes, jumps = 6 bytes each.
        assert_eq!(labels["out"], CODE_START as Position + 18);
    }

    #[test]
    fn unknown_and_duplicate_labels_fail() {
        let mut asm = Assembler::new();
        asm.jmp("nowhere");
        assert!(asm.assemble().is_err());

        let mut asm = Assembler::new();
        asm.label("a").label("a");
        assert!(asm.labels().is_err());
    }

    #[test]
    fn header_declares_total_size() {
        let mut asm = Assembler::new();
        asm.op(Op::Nop).op(Op::Retn);
        let bytes = asm.to_ncs_bytes().unwrap();
        assert_eq!(bytes.len(), CODE_START + 4);
        assert_eq!(&bytes[..8], SIGNATURE);
        assert_eq!(u32::from_be_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]), 17);
    }
}
