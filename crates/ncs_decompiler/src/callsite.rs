//! Call-site stack-effect analysis.
//!
//! A single linear sweep over every subroutine that estimates, for each JSR,
//! how many argument cells the caller pushed. STORE_STATE bodies are swept
//! after the live code, each from empty counters. The estimates only feed the
//! prototype fallback.

use std::collections::BTreeMap;

use crate::actions::ActionsData;
use crate::decode::{BinaryFamily, Instruction, Op, Position, Program, Subroutine, CELL};
use crate::state::StateArena;

/// Per-subroutine stack counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Counters {
    /// Cells on the stack relative to the caller's frame base.
    height: i64,
    /// Net pushes since the last reset point.
    growth: i64,
}

impl Counters {
    fn push(&mut self, n: usize) {
        self.height += n as i64;
        self.growth += n as i64;
    }

    fn pop(&mut self, n: usize) {
        self.height = (self.height - n as i64).max(0);
        self.growth = (self.growth - n as i64).max(0);
    }

    fn reset_growth(&mut self) {
        self.growth = 0;
    }
}

pub struct CallSiteAnalyzer<'a, A: ActionsData + ?Sized> {
    program: &'a Program,
    states: &'a StateArena,
    actions: &'a A,
    inferred: BTreeMap<Position, usize>,
}

impl<'a, A: ActionsData + ?Sized> CallSiteAnalyzer<'a, A> {
    pub fn new(program: &'a Program, states: &'a StateArena, actions: &'a A) -> Self {
        Self {
            program,
            states,
            actions,
            inferred: BTreeMap::new(),
        }
    }

    /// Sweep every subroutine once; returns callee position -> inferred argument cells.
    pub fn analyze(mut self) -> BTreeMap<Position, usize> {
        for sub in self.program.subroutines() {
            self.sweep(sub);
        }
        log::debug!("call-site analysis covered {} callees", self.inferred.len());
        self.inferred
    }

    fn seed(&self, sub: &Subroutine) -> Counters {
        let (returns, params) = self
            .states
            .get(sub.position)
            .map(|s| (s.returns_value(), s.param_count()))
            .unwrap_or((false, 0));
        Counters {
            height: returns as i64 + params as i64,
            growth: 0,
        }
    }

    fn sweep(&mut self, sub: &Subroutine) {
        let mut c = self.seed(sub);
        for inst in sub.live() {
            self.apply(&mut c, inst);
        }

        // A deferred body runs on a saved frame of its own.
        let mut c = Counters::default();
        for (i, inst) in sub.insts.iter().enumerate() {
            if !sub.is_deferred(i) {
                continue;
            }
            if sub.is_deferred_entry(i) {
                c = Counters::default();
            }
            self.apply(&mut c, inst);
        }
    }

    fn apply(&mut self, c: &mut Counters, inst: &Instruction) {
        match &inst.op {
            Op::Const(_) => c.push(1),
            Op::CpTopSp { size, .. } | Op::CpTopBp { size, .. } => {
                c.push(*size as usize / CELL as usize)
            }
            Op::Action { routine, argc } => {
                c.pop(self.actions.removed_argument_cells(*routine, *argc));
                c.push(self.actions.return_cell_size(*routine).unwrap_or(1));
            }
            Op::Logical(_) => {
                c.pop(2);
                c.push(1);
            }
            Op::Binary { op, operands } => match op.family() {
                BinaryFamily::Equality => {
                    if operands.is_aggregate() {
                        c.pop(operands.lhs.cell_size() + operands.rhs.cell_size());
                    } else {
                        c.pop(2);
                    }
                    c.push(1);
                }
                BinaryFamily::VectorCapable => {
                    c.pop(operands.lhs.cell_size() + operands.rhs.cell_size());
                    c.push(operands.result().cell_size());
                }
                BinaryFamily::Scalar => {
                    c.pop(2);
                    c.push(1);
                }
            },
            Op::Jz { .. } | Op::Jnz { .. } => c.pop(1),
            Op::Jmp { target } if *target < inst.pos => c.reset_growth(),
            Op::Jsr { target } => {
                let inferred = if c.growth == 0 {
                    c.height.max(0) as usize
                } else {
                    c.growth.max(0) as usize
                };
                log::trace!(
                    "0x{:08X}: call to 0x{:08X} with {} cells (height {}, growth {})",
                    inst.pos,
                    target,
                    inferred,
                    c.height,
                    c.growth
                );
                let slot = self.inferred.entry(*target).or_insert(0);
                *slot = (*slot).max(inferred);
                c.pop(inferred);
                c.reset_growth();
            }
            Op::MovSp(offset) => {
                c.pop(offset.unsigned_abs() as usize / CELL as usize);
                c.reset_growth();
            }
            Op::Destruct { remove, keep, .. } => {
                let removed = remove.saturating_sub(*keep) as usize / CELL as usize;
                c.pop(removed);
                c.reset_growth();
            }
            _ => {}
        }
    }
}
