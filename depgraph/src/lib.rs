//! Dependency graph engine (§4.7 of the design).
//!
//! Builds a graph from recipe declarations and produces a topological order
//! via Kahn's algorithm, breaking ties by insertion order and tolerating
//! cycles and unresolved dependency names rather than refusing to proceed.

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};

/// One node submitted to the dependency engine: a recipe's identity plus the
/// dependency *names* it declares (edges carry only names; nodes carry
/// `name@version` — see §4.7's asymmetry note).
#[derive(Debug, Clone)]
pub struct DepNode {
    pub name: String,
    pub version: String,
    pub depends: Vec<String>,
}

impl DepNode {
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Result of ordering a set of nodes.
#[derive(Debug, Clone)]
pub struct Ordering {
    /// Node ids (`name@version`) in dependency-respecting order.
    pub order: Vec<String>,
    /// True if one or more cycles were detected and broken by best-effort
    /// appending (§4.7: "the engine does not refuse to proceed").
    pub had_cycle: bool,
}

/// Builds the dependency graph for `nodes` and returns a topological order.
///
/// Edge resolution: a dependency name resolves to the first node in `nodes`
/// (by insertion order) whose `name` matches; a name with no match in the
/// input set is tolerated and simply contributes no edge (§4.7: "isolated
/// nodes ... are tolerated").
pub fn order(nodes: &[DepNode]) -> Ordering {
    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut index_of_id: IndexMap<String, NodeIndex> = IndexMap::new();
    let mut first_index_of_name: IndexMap<&str, NodeIndex> = IndexMap::new();

    for node in nodes {
        let idx = graph.add_node(node.id());
        index_of_id.insert(node.id(), idx);
        first_index_of_name.entry(node.name.as_str()).or_insert(idx);
    }

    for node in nodes {
        let dependent_idx = index_of_id[&node.id()];
        for dep_name in &node.depends {
            match first_index_of_name.get(dep_name.as_str()) {
                Some(&dep_idx) if dep_idx != dependent_idx => {
                    // Edge dependency -> dependent: the dependency must be
                    // emitted first.
                    graph.add_edge(dep_idx, dependent_idx, ());
                }
                Some(_) => {
                    // Self-dependency; ignore rather than creating a trivial cycle.
                }
                None => {
                    tracing::warn!(
                        "dependency {dep_name:?} of {} has no matching recipe in the input set",
                        node.id()
                    );
                }
            }
        }
    }

    kahn_with_insertion_order_ties(&graph)
}

fn kahn_with_insertion_order_ties(graph: &DiGraph<String, ()>) -> Ordering {
    let n = graph.node_count();
    let node_indices: Vec<NodeIndex> = graph.node_indices().collect();

    let mut indegree: IndexMap<NodeIndex, usize> = IndexMap::new();
    for &idx in &node_indices {
        indegree.insert(idx, 0);
    }
    for edge in graph.raw_edges() {
        *indegree.get_mut(&edge.target()).unwrap() += 1;
    }

    let mut visited = vec![false; node_indices.len()];
    let mut order = Vec::with_capacity(n);

    loop {
        let mut progressed = false;
        for (pos, &idx) in node_indices.iter().enumerate() {
            if visited[pos] {
                continue;
            }
            if indegree[&idx] == 0 {
                visited[pos] = true;
                order.push(graph[idx].clone());
                for edge in graph.edges(idx) {
                    let target = edge.target();
                    if let Some(deg) = indegree.get_mut(&target) {
                        *deg = deg.saturating_sub(1);
                    }
                }
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    let had_cycle = order.len() < n;
    if had_cycle {
        tracing::warn!(
            "dependency graph has a cycle among {} node(s); appending remainder in input order",
            n - order.len()
        );
        for (pos, &idx) in node_indices.iter().enumerate() {
            if !visited[pos] {
                order.push(graph[idx].clone());
            }
        }
    }

    Ordering { order, had_cycle }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, version: &str, depends: &[&str]) -> DepNode {
        DepNode {
            name: name.to_string(),
            version: version.to_string(),
            depends: depends.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn empty_depends_appears_once_with_no_predecessors() {
        let nodes = vec![node("hello", "1.0", &[])];
        let result = order(&nodes);
        assert_eq!(result.order, vec!["hello@1.0".to_string()]);
        assert!(!result.had_cycle);
    }

    #[test]
    fn linear_chain_orders_dependencies_first() {
        let nodes = vec![
            node("app", "3", &["bar"]),
            node("bar", "2", &["libfoo"]),
            node("libfoo", "1", &[]),
        ];
        let result = order(&nodes);
        assert_eq!(
            result.order,
            vec![
                "libfoo@1".to_string(),
                "bar@2".to_string(),
                "app@3".to_string(),
            ]
        );
    }

    #[test]
    fn unresolved_dependency_name_is_tolerated() {
        let nodes = vec![node("app", "1", &["does-not-exist"])];
        let result = order(&nodes);
        assert_eq!(result.order, vec!["app@1".to_string()]);
        assert!(!result.had_cycle);
    }

    #[test]
    fn cycle_is_tolerated_and_both_nodes_appear() {
        let nodes = vec![node("a", "1", &["b"]), node("b", "1", &["a"])];
        let result = order(&nodes);
        assert!(result.had_cycle);
        assert_eq!(result.order.len(), 2);
        assert!(result.order.contains(&"a@1".to_string()));
        assert!(result.order.contains(&"b@1".to_string()));
    }

    #[test]
    fn ties_broken_by_insertion_order() {
        let nodes = vec![
            node("z", "1", &[]),
            node("y", "1", &[]),
            node("x", "1", &[]),
        ];
        let result = order(&nodes);
        assert_eq!(
            result.order,
            vec!["z@1".to_string(), "y@1".to_string(), "x@1".to_string()]
        );
    }

    #[test]
    fn every_node_precedes_its_dependents() {
        let nodes = vec![
            node("d", "1", &["c"]),
            node("c", "1", &["a", "b"]),
            node("b", "1", &["a"]),
            node("a", "1", &[]),
        ];
        let result = order(&nodes);
        let pos = |id: &str| result.order.iter().position(|x| x == id).unwrap();
        assert!(pos("a@1") < pos("b@1"));
        assert!(pos("a@1") < pos("c@1"));
        assert!(pos("b@1") < pos("c@1"));
        assert!(pos("c@1") < pos("d@1"));
    }
}
