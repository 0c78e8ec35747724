//! Strongly connected components of the call graph, in scheduling order.
//!
//! Tarjan's algorithm runs on an explicit frame stack so deep call chains
//! never touch the native stack. The components are then ordered over the
//! condensation graph with Kahn's algorithm: components nobody calls into
//! come first, seeded in Tarjan emission order.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::callgraph::Adjacency;
use crate::decode::Position;

/// Compute SCCs of `graph` and order them roots-first.
pub fn compute(graph: &Adjacency) -> Vec<BTreeSet<Position>> {
    let components = tarjan(graph);
    let order = schedule(graph, &components);

    order
        .into_iter()
        .map(|c| components[c].iter().copied().collect())
        .collect()
}

/// Saved iteration cursor of one in-progress node.
struct Frame {
    node: Position,
    succs: Vec<Position>,
    cursor: usize,
}

#[derive(Default)]
struct TarjanState {
    next_index: usize,
    index: HashMap<Position, usize>,
    low_link: HashMap<Position, usize>,
    on_stack: HashSet<Position>,
    stack: Vec<Position>,
    result: Vec<Vec<Position>>,
}

impl TarjanState {
    fn open(&mut self, graph: &Adjacency, node: Position) -> Frame {
        self.index.insert(node, self.next_index);
        self.low_link.insert(node, self.next_index);
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack.insert(node);

        let succs = graph
            .get(&node)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        Frame {
            node,
            succs,
            cursor: 0,
        }
    }

    fn lower(&mut self, node: Position, candidate: usize) {
        if let Some(low) = self.low_link.get_mut(&node) {
            *low = (*low).min(candidate);
        }
    }

    /// Pop the component rooted at `root` if `root` is one.
    fn close(&mut self, root: Position) {
        if self.low_link.get(&root) != self.index.get(&root) {
            return;
        }
        let mut component = Vec::new();
        while let Some(w) = self.stack.pop() {
            self.on_stack.remove(&w);
            component.push(w);
            if w == root {
                break;
            }
        }
        self.result.push(component);
    }
}

fn all_nodes(graph: &Adjacency) -> BTreeSet<Position> {
    let mut nodes: BTreeSet<Position> = graph.keys().copied().collect();
    for succs in graph.values() {
        nodes.extend(succs.iter().copied());
    }
    nodes
}

fn tarjan(graph: &Adjacency) -> Vec<Vec<Position>> {
    let mut state = TarjanState::default();

    for root in all_nodes(graph) {
        if state.index.contains_key(&root) {
            continue;
        }

        let mut frames = vec![state.open(graph, root)];
        while let Some(frame) = frames.last_mut() {
            let v = frame.node;
            if frame.cursor < frame.succs.len() {
                let w = frame.succs[frame.cursor];
                frame.cursor += 1;

                match state.index.get(&w).copied() {
                    None => {
                        let child = state.open(graph, w);
                        frames.push(child);
                    }
                    Some(idx_w) if state.on_stack.contains(&w) => state.lower(v, idx_w),
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            state.close(v);
            if let Some(parent) = frames.last() {
                let low_v = state.low_link.get(&v).copied().unwrap_or(usize::MAX);
                state.lower(parent.node, low_v);
            }
        }
    }

    state.result
}

/// Kahn's algorithm over the condensation; returns component indices.
fn schedule(graph: &Adjacency, components: &[Vec<Position>]) -> Vec<usize> {
    let mut comp_of: HashMap<Position, usize> = HashMap::new();
    for (i, comp) in components.iter().enumerate() {
        for &node in comp {
            comp_of.insert(node, i);
        }
    }

    let mut succs: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
    let mut in_degree = vec![0usize; components.len()];
    for (src, dsts) in graph {
        let Some(&a) = comp_of.get(src) else {
            continue;
        };
        for dst in dsts {
            let Some(&b) = comp_of.get(dst) else {
                continue;
            };
            if a != b && succs[a].insert(b) {
                in_degree[b] += 1;
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..components.len())
        .filter(|&c| in_degree[c] == 0)
        .collect();
    log::debug!(
        "condensation: {} components, {} edges, {} roots",
        components.len(),
        succs.iter().map(BTreeSet::len).sum::<usize>(),
        queue.len()
    );
    let mut order = Vec::with_capacity(components.len());

    while let Some(c) = queue.pop_front() {
        order.push(c);
        for &d in &succs[c] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                queue.push_back(d);
            }
        }
    }

    order
}
