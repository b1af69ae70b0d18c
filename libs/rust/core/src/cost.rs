//! Standalone and total download cost over the lineage graph.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

use crate::lineage::{LineageGraph, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub standalone_cost: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphComputationError {
    #[error("node {0} is not part of the lineage graph")]
    UnknownNode(NodeId),
    #[error("size of node {0} cannot be resolved")]
    UnresolvedSize(NodeId),
    #[error("node {node} declares an invalid size {size}")]
    InvalidSize { node: NodeId, size: f64 },
}

pub type CostMap = BTreeMap<NodeId, CostEntry>;

#[derive(Debug, Clone, Default)]
pub struct CostResolver;

impl CostResolver {
    pub fn new() -> Self { Self }

    /// Costs for `root`. With dependencies every reachable node gets an entry
    /// whose total covers its own reachable subgraph; each node is counted once
    /// per total, so diamonds and cycles do not inflate the sum. Nodes of one
    /// cycle share a total, computed once per component.
    pub fn resolve(&self, graph: &LineageGraph, root: &NodeId, include_dependencies: bool) -> Result<CostMap, GraphComputationError> {
        let own = size_of(graph, root)?;
        let mut out = CostMap::new();
        if !include_dependencies {
            out.insert(root.clone(), CostEntry { standalone_cost: own, total_cost: own });
            return Ok(out);
        }
        let reach = graph.reachable_from(root);
        // resolve every size first so a missing one fails the whole query
        let sizes = reach.visited.iter().map(|id| size_of(graph, id)).collect::<Result<Vec<_>, _>>()?;

        let index: HashMap<&NodeId, usize> = reach.visited.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let adjacency = graph.adjacency();
        let adj: Vec<Vec<usize>> = reach.visited
            .iter()
            .map(|id| adjacency.get(id).into_iter().flatten().filter_map(|to| index.get(*to).copied()).collect())
            .collect();

        let mut dag: DiGraph<(), ()> = DiGraph::with_capacity(adj.len(), graph.edges.len());
        let handles: Vec<NodeIndex> = (0..adj.len()).map(|_| dag.add_node(())).collect();
        for (from, targets) in adj.iter().enumerate() {
            for &to in targets { dag.add_edge(handles[from], handles[to], ()); }
        }
        let components: Vec<Vec<usize>> = tarjan_scc(&dag)
            .into_iter()
            .map(|scc| scc.into_iter().map(|n| n.index()).collect())
            .collect();
        let mut component_of = vec![0; adj.len()];
        for (c, members) in components.iter().enumerate() {
            for &m in members { component_of[m] = c; }
        }
        // tarjan_scc yields sinks first, so successor components are resolved already
        let mut closure: Vec<BTreeSet<usize>> = Vec::with_capacity(components.len());
        for (c, members) in components.iter().enumerate() {
            let mut set: BTreeSet<usize> = members.iter().copied().collect();
            for &m in members {
                for &to in &adj[m] {
                    let d = component_of[to];
                    if d != c { set.extend(closure[d].iter().copied()); }
                }
            }
            closure.push(set);
        }
        let totals: Vec<f64> = closure.iter().map(|set| set.iter().map(|&i| sizes[i]).sum()).collect();

        for (i, id) in reach.visited.iter().enumerate() {
            out.insert(id.clone(), CostEntry { standalone_cost: sizes[i], total_cost: totals[component_of[i]] });
        }
        Ok(out)
    }
}

fn size_of(graph: &LineageGraph, id: &NodeId) -> Result<f64, GraphComputationError> {
    let node = graph.node(id).ok_or_else(|| GraphComputationError::UnknownNode(id.clone()))?;
    match node.size_mb {
        Some(s) if s.is_finite() && s >= 0.0 => Ok(s),
        Some(s) => Err(GraphComputationError::InvalidSize { node: id.clone(), size: s }),
        None => Err(GraphComputationError::UnresolvedSize(id.clone())),
    }
}
