//! Prototype inference driver.
//!
//! Structural typing runs component by component in call-graph order; what it
//! cannot settle is finalized from call-site evidence and MOVSP operands.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::actions::ActionsData;
use crate::callgraph::{CallGraph, CallGraphBuilder};
use crate::callsite::CallSiteAnalyzer;
use crate::config::InferenceConfig;
use crate::decode::{Op, Position, Program, Subroutine, CELL};
use crate::error::{StateError, StructuralAmbiguity};
use crate::scc;
use crate::state::{PrototypeStatus, StateArena, SubroutineState};
use crate::typer::StructuralTyper;
use crate::types::TypeTag;

/// Subroutines reachable from `main`, plus those reachable from the globals
/// initializer when there is one.
pub fn reachable_subroutines(program: &Program, graph: &CallGraph) -> BTreeSet<Position> {
    let mut reachable = BTreeSet::new();
    for entry in [program.main_entry(), program.globals_entry()]
        .into_iter()
        .flatten()
    {
        reachable.extend(graph.reachable_from(entry));
    }
    reachable
}

/// Merge the two fallback parameter estimates; the smaller one wins when both
/// are available.
pub fn combine_param_estimates(inferred: usize, movsp: usize) -> usize {
    match (inferred > 0, movsp > 0) {
        (true, true) => inferred.min(movsp),
        (true, false) => inferred,
        (false, true) => movsp,
        (false, false) => 0,
    }
}

/// Largest stack release found anywhere in the body, in cells.
fn movsp_estimate(sub: &Subroutine) -> usize {
    sub.insts
        .iter()
        .filter_map(|inst| match inst.op {
            Op::MovSp(offset) if offset < 0 => {
                Some(offset.unsigned_abs() as usize / CELL as usize)
            }
            _ => None,
        })
        .max()
        .unwrap_or(0)
}

fn freeze_with(state: &mut SubroutineState, params: usize) -> Result<(), StateError> {
    if !state.is_return_type_known() {
        state.set_return_type(TypeTag::Void)?;
    }
    state.set_param_count(params)?;
    state.ensure_param_placeholders()?;
    state.stop_prototyping(true)
}

pub struct PrototypeEngine<'a, T: StructuralTyper, A: ActionsData + ?Sized> {
    program: &'a Program,
    states: &'a mut StateArena,
    typer: T,
    actions: &'a A,
    config: InferenceConfig,
    diagnostics: Vec<StructuralAmbiguity>,
}

impl<'a, T: StructuralTyper, A: ActionsData + ?Sized> PrototypeEngine<'a, T, A> {
    pub fn new(
        program: &'a Program,
        states: &'a mut StateArena,
        typer: T,
        actions: &'a A,
        config: InferenceConfig,
    ) -> Self {
        Self {
            program,
            states,
            typer,
            actions,
            config,
            diagnostics: Vec::new(),
        }
    }

    /// Strict-mode diagnostics collected so far.
    pub fn diagnostics(&self) -> &[StructuralAmbiguity] {
        &self.diagnostics
    }

    /// Prototype every reachable subroutine.
    pub fn run(&mut self) {
        let graph = CallGraphBuilder::new(self.program).build();
        let reachable = reachable_subroutines(self.program, &graph);
        if reachable.is_empty() {
            log::warn!("no entry subroutine; nothing to prototype");
        }

        let components = scc::compute(graph.adjacency());
        for component in &components {
            if !component.iter().any(|pos| reachable.contains(pos)) {
                log::trace!("skipping unreachable component {:08X?}", component);
                continue;
            }
            self.settle_component(component);
        }

        let structural = reachable
            .iter()
            .filter(|&&pos| self.states.is_prototyped(pos))
            .count();

        let inferred = CallSiteAnalyzer::new(self.program, self.states, self.actions).analyze();
        for &pos in &reachable {
            self.finalize(pos, &inferred);
        }

        log::info!(
            "{} of {} reachable subroutines typed structurally, {} by fallback, {} unreachable",
            structural,
            reachable.len(),
            reachable.len() - structural,
            self.program.subroutine_count().saturating_sub(reachable.len())
        );
    }

    fn settle_component(&mut self, component: &BTreeSet<Position>) {
        for pass in 1..=self.config.max_scc_passes {
            let mut newly = 0;
            for &pos in component {
                if self.states.is_prototyped(pos) {
                    continue;
                }
                if self.typer.discover(self.program, self.states, pos) {
                    self.typer.derive(self.program, self.states, pos);
                    if self.states.is_prototyped(pos) {
                        newly += 1;
                    }
                }
            }
            log::debug!(
                "component of {} at 0x{:08X}: pass {} prototyped {}",
                component.len(),
                component.first().copied().unwrap_or_default(),
                pass,
                newly
            );
            if newly == 0 {
                break;
            }
        }
    }

    /// Heuristic finalization of one subroutine. Prototyped subroutines are
    /// left untouched.
    pub fn finalize(&mut self, pos: Position, inferred: &BTreeMap<Position, usize>) {
        let Some(sub) = self.program.subroutine(pos) else {
            return;
        };
        let Some(state) = self.states.get_mut(pos) else {
            return;
        };
        if state.is_prototyped() {
            return;
        }

        let from_calls = inferred.get(&pos).copied().unwrap_or(0);
        let from_movsp = movsp_estimate(sub);
        let params = combine_param_estimates(from_calls, from_movsp);
        log::debug!(
            "0x{:08X}: fallback params {} (call sites {}, movsp {})",
            pos,
            params,
            from_calls,
            from_movsp
        );

        if let Err(e) = freeze_with(state, params) {
            log::warn!("0x{:08X}: {}", pos, e);
            return;
        }

        if self.config.strict {
            let diag = StructuralAmbiguity { position: pos };
            log::warn!("{}", diag);
            self.diagnostics.push(diag);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubroutineRole {
    Main,
    Globals,
    Subroutine,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrototypeEntry {
    pub position: Position,
    pub role: SubroutineRole,
    pub status: PrototypeStatus,
    pub return_type: Option<TypeTag>,
    pub param_count: usize,
    pub reachable: bool,
}

/// Serializable snapshot of the inference results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrototypeReport {
    pub subroutines: Vec<PrototypeEntry>,
}

impl PrototypeReport {
    pub fn collect(program: &Program, states: &StateArena) -> Self {
        let graph = CallGraphBuilder::new(program).build();
        let reachable = reachable_subroutines(program, &graph);

        let subroutines = program
            .subroutines()
            .filter_map(|sub| {
                let state = states.get(sub.position)?;
                let role = if program.main_entry() == Some(sub.position) {
                    SubroutineRole::Main
                } else if program.globals_entry() == Some(sub.position) {
                    SubroutineRole::Globals
                } else {
                    SubroutineRole::Subroutine
                };
                Some(PrototypeEntry {
                    position: sub.position,
                    role,
                    status: state.status(),
                    return_type: state.return_type(),
                    param_count: state.param_count(),
                    reachable: reachable.contains(&sub.position),
                })
            })
            .collect();

        Self { subroutines }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("serializing prototype report")
    }
}
