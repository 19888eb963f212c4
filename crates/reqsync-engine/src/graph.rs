//! Parent/child graph walks
//!
//! The graph is implicit: children are IDs resolved through the index.
//! Unresolvable children are skipped here; the validator reports them.

use reqsync_model::Index;
use std::collections::{BTreeSet, HashMap};

/// A parent/child cycle, as a closed path (`A → B → A`)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cycle detected: {}", .path.join(" → "))]
pub struct CycleDetected {
    /// IDs along the cycle; first and last are equal
    pub path: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Every cycle reachable in the canonical requirement graph
///
/// Three-color DFS in index order; each gray-to-gray back edge yields one
/// cycle. The walk keeps its own stack, so chain depth is bounded by memory
/// rather than the call stack.
#[must_use]
pub fn find_cycles(index: &Index) -> Vec<CycleDetected> {
    let mut colors: HashMap<&str, Color> = HashMap::new();
    let mut cycles = Vec::new();

    for (_, requirement) in index.canonical() {
        let root = requirement.id.as_str();
        if color_of(&colors, root) == Color::White {
            walk(index, root, &mut colors, &mut cycles);
        }
    }
    cycles
}

fn color_of(colors: &HashMap<&str, Color>, id: &str) -> Color {
    colors.get(id).copied().unwrap_or(Color::White)
}

fn walk<'a>(
    index: &'a Index,
    root: &'a str,
    colors: &mut HashMap<&'a str, Color>,
    cycles: &mut Vec<CycleDetected>,
) {
    // Gray path from the root, each with the position of its next child.
    let mut frames: Vec<(&'a str, usize)> = vec![(root, 0)];
    colors.insert(root, Color::Gray);

    while let Some(frame) = frames.last_mut() {
        let (id, next) = *frame;
        let Some(child) = index.get(id).and_then(|r| r.children.get(next)) else {
            frames.pop();
            colors.insert(id, Color::Black);
            continue;
        };
        frame.1 += 1;
        let Some(target) = index.get(child) else {
            continue;
        };
        let child = target.id.as_str();
        match color_of(colors, child) {
            Color::White => {
                colors.insert(child, Color::Gray);
                frames.push((child, 0));
            }
            Color::Gray => {
                let start = frames.iter().rposition(|(s, _)| *s == child).unwrap_or(0);
                let mut path: Vec<String> =
                    frames[start..].iter().map(|(s, _)| (*s).to_string()).collect();
                path.push(child.to_string());
                cycles.push(CycleDetected { path });
            }
            Color::Black => {}
        }
    }
}

/// IDs lying on any cycle
#[must_use]
pub fn cyclic_ids(cycles: &[CycleDetected]) -> BTreeSet<String> {
    cycles
        .iter()
        .flat_map(|c| c.path.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use reqsync_model::{Module, Requirement};

    fn index_of(edges: &[(&str, &[&str])]) -> Index {
        let module = edges.iter().fold(Module::new("/s/m.json"), |m, (id, children)| {
            m.with_requirement(Requirement::new(*id).with_children(children.iter().copied()))
        });
        let mut index = Index::new();
        index.push_module(module);
        index
    }

    #[test]
    fn two_node_cycle_reports_closed_path() {
        let index = index_of(&[("REQ-A", &["REQ-B"]), ("REQ-B", &["REQ-A"])]);
        let cycles = find_cycles(&index);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].path, vec!["REQ-A", "REQ-B", "REQ-A"]);
        assert_eq!(cycles[0].to_string(), "cycle detected: REQ-A → REQ-B → REQ-A");
    }

    #[test]
    fn self_loop_and_dag() {
        let index = index_of(&[("A", &["A"])]);
        assert_eq!(find_cycles(&index)[0].path, vec!["A", "A"]);

        let dag = index_of(&[("A", &["B", "C"]), ("B", &["C"]), ("C", &[]), ("D", &["MISSING"])]);
        assert!(find_cycles(&dag).is_empty());
    }

    #[test]
    fn deep_chain_does_not_exhaust_the_stack() {
        const DEPTH: usize = 100_000;
        let ids: Vec<String> = (0..DEPTH).map(|i| format!("R{i}")).collect();
        let chain = |closed: bool| {
            let module = ids.iter().enumerate().fold(Module::new("/s/m.json"), |m, (i, id)| {
                let next = match ids.get(i + 1) {
                    Some(next) => vec![next.clone()],
                    None if closed => vec![ids[0].clone()],
                    None => Vec::new(),
                };
                m.with_requirement(Requirement::new(id.clone()).with_children(next))
            });
            let mut index = Index::new();
            index.push_module(module);
            index
        };

        assert!(find_cycles(&chain(false)).is_empty());

        let cycles = find_cycles(&chain(true));
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].path.len(), DEPTH + 1);
        assert_eq!(cycles[0].path.first(), cycles[0].path.last());
    }

    fn reaches(index: &Index, from: &str, to: &str) -> bool {
        let mut seen = BTreeSet::new();
        let mut todo = vec![from.to_string()];
        while let Some(id) = todo.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(req) = index.get(&id) {
                for child in &req.children {
                    if child == to {
                        return true;
                    }
                    todo.push(child.clone());
                }
            }
        }
        false
    }

    proptest! {
        #[test]
        fn prop_no_cycle_reported_means_acyclic(
            edges in proptest::collection::vec((0usize..6, 0usize..6), 0..12)
        ) {
            let ids: Vec<String> = (0..6).map(|i| format!("R{i}")).collect();
            let module = ids.iter().enumerate().fold(Module::new("/s/m.json"), |m, (i, id)| {
                let children: Vec<&str> = edges
                    .iter()
                    .filter(|(p, _)| *p == i)
                    .map(|(_, c)| ids[*c].as_str())
                    .collect();
                m.with_requirement(Requirement::new(id.clone()).with_children(children))
            });
            let mut index = Index::new();
            index.push_module(module);

            let cycles = find_cycles(&index);
            let has_cycle = edges
                .iter()
                .any(|(p, c)| p == c || reaches(&index, &ids[*c], &ids[*p]));
            prop_assert_eq!(cycles.is_empty(), !has_cycle);
            for cycle in &cycles {
                prop_assert_eq!(cycle.path.first(), cycle.path.last());
            }
        }
    }
}
