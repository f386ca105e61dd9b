use super::*;
use fxhash::FxHashMap;
use std::collections::{BTreeMap, VecDeque};
use tracing::*;

/// Outcome of a cycle scan: whether a cycle exists, and if so a witness
/// path whose first and last elements are the same node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleCheck {
    pub has_cycle: bool,
    pub cycle: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    // On the current traversal path.
    Grey,
    // Fully explored.
    Black,
}

/// The DepGraph contains every target in the build, keyed by name.
///
/// It is used to answer the two questions the executor needs settled before
/// any command runs — do all dependency names resolve, and is the graph
/// acyclic — and to produce the dependency-first order the executor walks.
///
/// The map is ordered by name so traversal roots, topological tie-breaking,
/// and the first cycle found are stable from run to run.
///
#[derive(Debug, Default)]
pub struct DepGraph {
    targets: BTreeMap<String, Target>,
}

impl DepGraph {
    pub fn new() -> DepGraph {
        DepGraph::default()
    }

    /// Stores a target. Returns false without touching the map when the
    /// target has no name or the name is already taken.
    pub fn add_target(&mut self, target: Target) -> bool {
        if !target.is_valid() || self.targets.contains_key(&target.name) {
            debug!("Rejected target {:?}", target.name);
            return false;
        }
        self.targets.insert(target.name.clone(), target);
        true
    }

    /// Removes a target if present. References to it from other targets are
    /// left alone; `validate_dependencies` will report them as dangling.
    pub fn remove_target(&mut self, name: &str) -> bool {
        self.targets.remove(name).is_some()
    }

    pub fn has_target(&self, name: &str) -> bool {
        self.targets.contains_key(name)
    }

    pub fn get_target(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn clear(&mut self) {
        self.targets.clear();
    }

    /// Every dependency name that does not resolve to a known target, in
    /// first-occurrence order, deduplicated.
    pub fn validate_dependencies(&self) -> Vec<String> {
        let mut missing: Vec<String> = vec![];
        for target in self.targets.values() {
            for dep in &target.deps {
                if !self.targets.contains_key(dep) && !missing.iter().any(|m| m == dep) {
                    missing.push(dep.clone());
                }
            }
        }
        missing
    }

    fn deps_of(&self, name: &str) -> &[String] {
        // A dangling dependency name traverses as a node with no out-edges.
        self.targets.get(name).map(|t| t.deps.as_slice()).unwrap_or(&[])
    }

    /// Three-colour depth-first scan for cycles, on an explicit stack so a
    /// long dependency chain cannot overflow the call stack.
    ///
    /// The witness is the slice of the traversal path from the back-edge's
    /// target to the top, with the back-edge's target appended to close the
    /// loop; a self-dependency therefore reports as `[s, s]`.
    #[tracing::instrument(name = "DepGraph::detect_cycles", skip(self))]
    pub fn detect_cycles(&self) -> CycleCheck {
        let mut marks: FxHashMap<&str, Mark> = FxHashMap::default();

        for root in self.targets.keys() {
            if marks.contains_key(root.as_str()) {
                continue;
            }

            // Each frame is a node plus the index of the next edge to try.
            let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
            marks.insert(root.as_str(), Mark::Grey);

            while let Some(&(node, next_edge)) = stack.last() {
                let deps = self.deps_of(node);
                if next_edge >= deps.len() {
                    marks.insert(node, Mark::Black);
                    stack.pop();
                    continue;
                }
                stack.last_mut().unwrap().1 += 1;

                let dep = deps[next_edge].as_str();
                match marks.get(dep) {
                    Some(Mark::Grey) => {
                        let start = stack.iter().position(|&(name, _)| name == dep).unwrap();
                        let mut cycle: Vec<String> =
                            stack[start..].iter().map(|&(name, _)| name.to_string()).collect();
                        cycle.push(dep.to_string());
                        return CycleCheck { has_cycle: true, cycle };
                    }
                    Some(Mark::Black) => {}
                    None => {
                        marks.insert(dep, Mark::Grey);
                        stack.push((dep, 0));
                    }
                }
            }
        }

        CycleCheck::default()
    }

    /// Kahn's algorithm over a forward `dependency -> dependents` adjacency.
    ///
    /// A node's in-degree is its own dependency count, so a target whose
    /// dependency is dangling or cyclic never becomes ready and the result
    /// comes back shorter than `len()`. Callers are expected to have run
    /// `validate_dependencies` and `detect_cycles` first.
    #[tracing::instrument(name = "DepGraph::topological_sort", skip(self))]
    pub fn topological_sort(&self) -> Vec<String> {
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: FxHashMap<&str, Vec<&str>> = FxHashMap::default();

        for (name, target) in &self.targets {
            in_degree.insert(name.as_str(), target.deps.len());
            for dep in &target.deps {
                dependents.entry(dep.as_str()).or_default().push(name.as_str());
            }
        }

        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&name, _)| name)
            .collect();

        let mut order = Vec::with_capacity(self.targets.len());
        while let Some(current) = ready.pop_front() {
            order.push(current.to_string());
            if let Some(names) = dependents.get(current) {
                for &dependent in names {
                    let degree = in_degree.get_mut(dependent).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        order
    }

    /// The declared dependencies of a target, or nothing for an unknown name.
    pub fn get_dependencies(&self, name: &str) -> Vec<String> {
        self.targets
            .get(name)
            .map(|target| target.deps.clone())
            .unwrap_or_default()
    }

    /// The reverse adjacency: every target that declares `name` as a
    /// dependency.
    pub fn get_dependents(&self, name: &str) -> Vec<String> {
        self.targets
            .values()
            .filter(|target| target.deps.iter().any(|dep| dep == name))
            .map(|target| target.name.clone())
            .collect()
    }
}
