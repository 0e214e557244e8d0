//! Ordering over registered nodes.
//!
//! Pure functions over a snapshot of the node map: dependency closures,
//! dependent closures, topological sorting and cycle search. Ties between
//! nodes that could go in either order are broken by registration order, so
//! plans are deterministic.

use core::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};

use crate::error::GraphError;
use crate::node::ServiceNode;

pub(crate) type NodeMap = HashMap<String, Arc<ServiceNode>>;

/// Returns `root` and everything it transitively depends on, dependencies first.
///
/// Fails with [`GraphError::MissingDependency`] if the closure names an
/// unregistered node.
pub(crate) fn start_plan(nodes: &NodeMap, root: &str) -> Result<Vec<Arc<ServiceNode>>, GraphError> {
    let Some(node) = nodes.get(root) else {
        return Err(GraphError::UnknownNode {
            name: root.to_string(),
        });
    };

    let mut closure: Vec<Arc<ServiceNode>> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack = vec![node];
    seen.insert(root);

    while let Some(node) = stack.pop() {
        for dependency in node.dependencies() {
            let Some(dep_node) = nodes.get(dependency) else {
                return Err(GraphError::MissingDependency {
                    node: node.name().to_string(),
                    dependency: dependency.clone(),
                });
            };
            if seen.insert(dependency.as_str()) {
                stack.push(dep_node);
            }
        }
        closure.push(Arc::clone(node));
    }

    topological(closure)
}

/// Returns `root` and every node that transitively depends on it, ordered so
/// that dependents come before their dependencies (`root` last).
pub(crate) fn stop_plan(nodes: &NodeMap, root: &Arc<ServiceNode>) -> Vec<Arc<ServiceNode>> {
    let mut dependents_of: HashMap<&str, Vec<&Arc<ServiceNode>>> = HashMap::new();
    for node in nodes.values() {
        for dependency in node.dependencies() {
            dependents_of.entry(dependency.as_str()).or_default().push(node);
        }
    }

    let mut closure = vec![Arc::clone(root)];
    let mut seen: HashSet<&str> = HashSet::new();
    seen.insert(root.name());
    let mut queue = vec![root.name()];

    while let Some(name) = queue.pop() {
        for dependent in dependents_of.get(name).into_iter().flatten() {
            if seen.insert(dependent.name()) {
                closure.push(Arc::clone(dependent));
                queue.push(dependent.name());
            }
        }
    }

    // The registered relation is acyclic, so sorting cannot fail; fall back
    // to discovery order if it somehow does.
    let mut ordered = topological(closure.clone()).unwrap_or(closure);
    ordered.reverse();
    ordered
}

/// Sorts `subset` so every node comes after its dependencies within the subset.
///
/// Kahn's algorithm; among ready nodes the earliest registered goes first.
pub(crate) fn topological(subset: Vec<Arc<ServiceNode>>) -> Result<Vec<Arc<ServiceNode>>, GraphError> {
    let index: HashMap<&str, usize> = subset
        .iter()
        .enumerate()
        .map(|(i, node)| (node.name(), i))
        .collect();

    let n = subset.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, node) in subset.iter().enumerate() {
        for dependency in node.dependencies() {
            if let Some(&dep_idx) = index.get(dependency.as_str()) {
                dependents[dep_idx].push(i);
                in_degree[i] += 1;
            }
        }
    }

    let mut ready: BinaryHeap<Reverse<(u64, usize)>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, deg)| **deg == 0)
        .map(|(i, _)| Reverse((subset[i].seq(), i)))
        .collect();

    let mut sorted: Vec<usize> = Vec::with_capacity(n);
    while let Some(Reverse((_, idx))) = ready.pop() {
        sorted.push(idx);
        for &dependent_idx in &dependents[idx] {
            in_degree[dependent_idx] -= 1;
            if in_degree[dependent_idx] == 0 {
                ready.push(Reverse((subset[dependent_idx].seq(), dependent_idx)));
            }
        }
    }

    if sorted.len() != n {
        let path: Vec<String> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg > 0)
            .map(|(i, _)| subset[i].name().to_string())
            .collect();
        return Err(GraphError::Cycle { path });
    }

    Ok(sorted.into_iter().map(|i| Arc::clone(&subset[i])).collect())
}

/// Returns the cycle that registering `name` with `dependencies` would close.
///
/// The returned path starts and ends at `name`. Dependencies that are not
/// registered yet are followed as far as the registered nodes allow, so a
/// cycle through a forward reference is found once the reference resolves.
pub(crate) fn find_cycle<'a>(
    nodes: &'a NodeMap,
    name: &'a str,
    dependencies: &'a [String],
) -> Option<Vec<String>> {
    // Visited node -> the node it was first reached from.
    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut stack: Vec<(&str, &str)> = dependencies
        .iter()
        .rev()
        .map(|dependency| (dependency.as_str(), name))
        .collect();

    while let Some((current, from)) = stack.pop() {
        if current == name {
            let mut path = vec![name.to_string()];
            let mut step = from;
            while step != name {
                path.push(step.to_string());
                step = parent.get(step).copied().unwrap_or(name);
            }
            path.push(name.to_string());
            path.reverse();
            return Some(path);
        }
        if parent.contains_key(current) {
            continue;
        }
        parent.insert(current, from);
        if let Some(node) = nodes.get(current) {
            for dependency in node.dependencies().iter().rev() {
                if !parent.contains_key(dependency.as_str()) {
                    stack.push((dependency.as_str(), current));
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeDescriptor;

    fn map(edges: &[(&str, &[&str])]) -> NodeMap {
        edges
            .iter()
            .enumerate()
            .map(|(seq, (name, deps))| {
                let descriptor =
                    NodeDescriptor::new(*name, |_| Ok(())).depends_on(deps.iter().copied());
                (name.to_string(), Arc::new(ServiceNode::new(descriptor, seq as u64)))
            })
            .collect()
    }

    fn names(nodes: &[Arc<ServiceNode>]) -> Vec<&str> {
        nodes.iter().map(|node| node.name()).collect()
    }

    #[test]
    fn chain_starts_dependencies_first() {
        let nodes = map(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        let plan = start_plan(&nodes, "a").unwrap();
        assert_eq!(names(&plan), ["c", "b", "a"]);
    }

    #[test]
    fn chain_stops_dependents_first() {
        let nodes = map(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        let plan = stop_plan(&nodes, &nodes["c"]);
        assert_eq!(names(&plan), ["a", "b", "c"]);
    }

    #[test]
    fn ties_follow_registration_order() {
        let nodes = map(&[("x", &[]), ("y", &[]), ("top", &["y", "x"])]);
        let plan = start_plan(&nodes, "top").unwrap();
        assert_eq!(names(&plan), ["x", "y", "top"]);
    }

    #[test]
    fn diamond_plan_contains_shared_dependency_once() {
        let nodes = map(&[
            ("base", &[]),
            ("left", &["base"]),
            ("right", &["base"]),
            ("top", &["left", "right"]),
        ]);
        let plan = start_plan(&nodes, "top").unwrap();
        assert_eq!(names(&plan), ["base", "left", "right", "top"]);

        let stop = stop_plan(&nodes, &nodes["base"]);
        assert_eq!(names(&stop), ["top", "right", "left", "base"]);
    }

    #[test]
    fn missing_dependency_is_reported() {
        let nodes = map(&[("a", &["ghost"])]);
        let err = start_plan(&nodes, "a").unwrap_err();
        assert!(matches!(
            err,
            GraphError::MissingDependency { ref node, ref dependency } if node == "a" && dependency == "ghost"
        ));
    }

    #[test]
    fn cycle_path_starts_and_ends_at_new_node() {
        let nodes = map(&[("b", &["c"]), ("c", &["a"])]);
        let cycle = find_cycle(&nodes, "a", &["b".to_string()]);
        assert_eq!(cycle.unwrap(), ["a", "b", "c", "a"]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let nodes = map(&[]);
        let cycle = find_cycle(&nodes, "a", &["a".to_string()]);
        assert_eq!(cycle.unwrap(), ["a", "a"]);
    }

    #[test]
    fn unrelated_forward_reference_is_not_a_cycle() {
        let nodes = map(&[("b", &["later"])]);
        assert!(find_cycle(&nodes, "a", &["b".to_string()]).is_none());
    }

    #[test]
    fn cycle_search_follows_first_dependency_first() {
        let nodes = map(&[("b", &["c", "d"]), ("c", &["e"]), ("d", &["a"]), ("e", &["a"])]);
        let cycle = find_cycle(&nodes, "a", &["b".to_string()]);
        assert_eq!(cycle.unwrap(), ["a", "b", "c", "e", "a"]);
    }

    #[test]
    fn long_chains_do_not_exhaust_the_stack() {
        const LEN: usize = 100_000;
        let nodes: NodeMap = (0..LEN)
            .map(|i| {
                let next = if i + 1 == LEN { "tail".to_string() } else { format!("n{}", i + 1) };
                let descriptor = NodeDescriptor::new(format!("n{i}"), |_| Ok(())).depends_on([next]);
                (format!("n{i}"), Arc::new(ServiceNode::new(descriptor, i as u64)))
            })
            .collect();

        let cycle = find_cycle(&nodes, "tail", &["n0".to_string()]).unwrap();
        assert_eq!(cycle.len(), LEN + 2);
        assert_eq!(cycle[1], "n0");
        assert_eq!(cycle[LEN], format!("n{}", LEN - 1));
        assert_eq!(cycle.last().map(String::as_str), Some("tail"));

        assert!(find_cycle(&nodes, "other", &["n0".to_string()]).is_none());
    }
}
