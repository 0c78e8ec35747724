//! Subroutine call graph, keyed by entry position.

use std::collections::{BTreeMap, BTreeSet};

use crate::decode::{Instruction, Op, Position, Program};

pub type Adjacency = BTreeMap<Position, BTreeSet<Position>>;

/// Immutable snapshot of caller -> callee edges. Duplicate calls collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallGraph {
    edges: Adjacency,
}

impl CallGraph {
    /// Full adjacency copy.
    pub fn edges(&self) -> Adjacency {
        self.edges.clone()
    }

    /// Borrowing view of the adjacency, for passes that only read it.
    pub fn adjacency(&self) -> &Adjacency {
        &self.edges
    }

    /// Callees of `node`; empty for an unknown node.
    pub fn successors(&self, node: Position) -> BTreeSet<Position> {
        self.edges.get(&node).cloned().unwrap_or_default()
    }

    /// Every scanned subroutine, including those without outgoing edges.
    pub fn nodes(&self) -> BTreeSet<Position> {
        self.edges.keys().copied().collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|s| s.len()).sum()
    }

    /// Depth-first closure of `start`, `start` included.
    pub fn reachable_from(&self, start: Position) -> BTreeSet<Position> {
        let mut reachable = BTreeSet::new();
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            if !reachable.insert(current) {
                continue;
            }
            if let Some(callees) = self.edges.get(&current) {
                for &callee in callees.iter().rev() {
                    if !reachable.contains(&callee) {
                        stack.push(callee);
                    }
                }
            }
        }

        reachable
    }
}

/// Scans every subroutine once, attributing each JSR to the subroutine that
/// owns it.
pub struct CallGraphBuilder<'a> {
    program: &'a Program,
    current: Position,
    edges: Adjacency,
}

impl<'a> CallGraphBuilder<'a> {
    pub fn new(program: &'a Program) -> Self {
        Self {
            program,
            current: 0,
            edges: Adjacency::new(),
        }
    }

    pub fn build(mut self) -> CallGraph {
        for sub in self.program.subroutines() {
            self.current = sub.position;
            self.edges.entry(self.current).or_default();
            // A subroutine owns only its own body, so traversal stops at the
            // next entry.
            for inst in &sub.insts {
                self.visit(inst);
            }
        }

        let graph = CallGraph { edges: self.edges };
        log::debug!(
            "call graph: {} subroutines, {} edges",
            graph.edges.len(),
            graph.edge_count()
        );
        graph
    }

    fn visit(&mut self, inst: &Instruction) {
        if !matches!(inst.op, Op::Jsr { .. }) {
            return;
        }
        let Some(dst) = inst.destination() else {
            return;
        };
        if self.program.is_subroutine(dst) {
            self.edges.entry(self.current).or_default().insert(dst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Assembler;
    use pretty_assertions::assert_eq;

    fn build(asm: &Assembler) -> (CallGraph, std::collections::HashMap<String, Position>) {
        let program = Program::from_instructions(asm.assemble().unwrap());
        (CallGraphBuilder::new(&program).build(), asm.labels().unwrap())
    }

    #[test]
    fn collects_edges_and_leaf_nodes() {
        let mut asm = Assembler::new();
        asm.jsr("main").op(Op::Retn);
        asm.label("main").jsr("a").jsr("a").jsr("b").op(Op::Retn);
        asm.label("a").jsr("b").op(Op::Retn);
        asm.label("b").op(Op::Retn);
        let (graph, l) = build(&asm);

        assert_eq!(graph.nodes(), BTreeSet::from([l["main"], l["a"], l["b"]]));
        assert_eq!(graph.successors(l["main"]), BTreeSet::from([l["a"], l["b"]]));
        assert_eq!(graph.successors(l["b"]), BTreeSet::new());
        assert_eq!(graph.edge_count(), 3);

        let nodes = graph.nodes();
        for (src, dsts) in graph.edges() {
            assert!(nodes.contains(&src));
            assert!(dsts.iter().all(|d| nodes.contains(d)));
        }
    }

    #[test]
    fn unknown_node_has_no_successors() {
        let (graph, _) = build(&Assembler::new());
        assert!(graph.nodes().is_empty());
        assert_eq!(graph.successors(0x1234), BTreeSet::new());
        assert_eq!(graph.reachable_from(0x1234), BTreeSet::from([0x1234]));
    }

    #[test]
    fn reachability_is_closed_and_handles_cycles() {
        let mut asm = Assembler::new();
        asm.jsr("main").op(Op::Retn);
        asm.label("main").jsr("a").op(Op::Retn);
        asm.label("a").jsr("b").op(Op::Retn);
        asm.label("b").jsr("a").op(Op::Retn);
        asm.label("orphan").jsr("orphan").op(Op::Retn);
        let (graph, l) = build(&asm);

        assert_eq!(
            graph.reachable_from(l["main"]),
            BTreeSet::from([l["main"], l["a"], l["b"]])
        );
        assert_eq!(graph.reachable_from(l["orphan"]), BTreeSet::from([l["orphan"]]));
    }
}
