//! Evaluation ordering and circular dependency detection for formula cells.
//!
//! A formula like `A1 = B1 + 1` with `B1 = A1 * 2` can never settle. This
//! module finds every cell that sits on such a cycle and orders the rest so
//! that each cell comes after the cells it reads. It walks the dependency
//! graph with Tarjan's strongly connected components algorithm, using an
//! explicit stack so long reference chains cannot exhaust the call stack.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::cell_ref::CellRef;

/// Dependency graph: each formula cell mapped to the cells it reads.
pub type DependencyGraph = BTreeMap<CellRef, Vec<CellRef>>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvaluationPlan {
    /// Acyclic cells, each after everything it depends on.
    pub order: Vec<CellRef>,
    /// Cells on at least one cycle, self-references included.
    pub cyclic: BTreeSet<CellRef>,
}

/// Build an evaluation plan for `graph`. Edges to cells that are not keys
/// of the graph are constants and ignored.
pub fn evaluation_plan(graph: &DependencyGraph) -> EvaluationPlan {
    let mut plan = EvaluationPlan::default();
    let mut index: HashMap<CellRef, usize> = HashMap::new();
    let mut lowlink: HashMap<CellRef, usize> = HashMap::new();
    let mut stack: Vec<CellRef> = Vec::new();
    let mut on_stack: HashSet<CellRef> = HashSet::new();

    for &root in graph.keys() {
        if index.contains_key(&root) {
            continue;
        }

        let mut work: Vec<(CellRef, usize)> = Vec::new();
        visit(root, &mut index, &mut lowlink, &mut stack, &mut on_stack);
        work.push((root, 0));

        while let Some(frame) = work.last_mut() {
            let node = frame.0;
            let deps = edges(graph, node);

            if frame.1 < deps.len() {
                let dep = deps[frame.1];
                frame.1 += 1;
                if !graph.contains_key(&dep) {
                    continue;
                }
                match index.get(&dep) {
                    None => {
                        visit(dep, &mut index, &mut lowlink, &mut stack, &mut on_stack);
                        work.push((dep, 0));
                    }
                    Some(&dep_index) if on_stack.contains(&dep) => {
                        lower(&mut lowlink, node, dep_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            work.pop();
            let node_low = lowlink[&node];
            if let Some(&(parent, _)) = work.last() {
                lower(&mut lowlink, parent, node_low);
            }

            if node_low == index[&node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack.remove(&member);
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                // Components complete dependencies-first.
                if component.len() > 1 || deps.contains(&node) {
                    plan.cyclic.extend(component);
                } else {
                    plan.order.push(node);
                }
            }
        }
    }

    plan
}

fn edges(graph: &DependencyGraph, node: CellRef) -> &[CellRef] {
    graph.get(&node).map(Vec::as_slice).unwrap_or(&[])
}

fn visit(
    node: CellRef,
    index: &mut HashMap<CellRef, usize>,
    lowlink: &mut HashMap<CellRef, usize>,
    stack: &mut Vec<CellRef>,
    on_stack: &mut HashSet<CellRef>,
) {
    let next = index.len();
    index.insert(node, next);
    lowlink.insert(node, next);
    stack.push(node);
    on_stack.insert(node);
}

fn lower(lowlink: &mut HashMap<CellRef, usize>, node: CellRef, candidate: usize) {
    if let Some(low) = lowlink.get_mut(&node)
        && candidate < *low
    {
        *low = candidate;
    }
}

/// Find a cycle through `start`, returning the path that closes it.
pub fn detect_cycle(start: CellRef, graph: &DependencyGraph) -> Option<Vec<CellRef>> {
    let mut visited: HashSet<CellRef> = HashSet::new();
    let mut work: Vec<(CellRef, usize)> = vec![(start, 0)];
    visited.insert(start);

    while let Some(frame) = work.last_mut() {
        let deps = edges(graph, frame.0);
        if frame.1 >= deps.len() {
            work.pop();
            continue;
        }
        let dep = deps[frame.1];
        frame.1 += 1;

        if dep == start {
            let mut path: Vec<CellRef> = work.iter().map(|(node, _)| *node).collect();
            path.push(start);
            return Some(path);
        }
        if visited.insert(dep) {
            work.push((dep, 0));
        }
    }

    None
}
