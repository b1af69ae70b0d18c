//! Lineage graph extraction.
//!
//! The graph is expected to be a DAG but is never assumed to be one: metadata
//! comes from untrusted hosts, so builders keep malformed edges as declared and
//! every traversal carries an explicit visited set.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

use crate::metadata::MetadataBundle;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageNode {
    pub id: NodeId,
    pub name: String,
    /// Where the node was discovered (`registry`, `config_json`, ...).
    pub source: String,
    pub size_mb: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// `from` declares `relationship` towards `to`; `to` is the dependency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub relationship: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineageGraph {
    pub nodes: Vec<LineageNode>,
    pub edges: Vec<LineageEdge>,
}

/// Result of a bounded walk from one node.
#[derive(Debug, Clone, Default)]
pub struct Reachable {
    /// Visit order, starting with the root. Ids without a node entry are included.
    pub visited: Vec<NodeId>,
    /// True when some edge pointed back at an already visited node on the current path.
    pub cycle: bool,
}

impl LineageGraph {
    pub fn node(&self, id: &NodeId) -> Option<&LineageNode> { self.nodes.iter().find(|n| &n.id == id) }

    pub fn contains(&self, id: &NodeId) -> bool { self.node(id).is_some() }

    /// Outgoing adjacency, preserving declaration order.
    pub fn adjacency(&self) -> HashMap<&NodeId, Vec<&NodeId>> {
        let mut adj: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
        for e in &self.edges { adj.entry(&e.from).or_default().push(&e.to); }
        adj
    }

    /// Breadth-first walk over outgoing edges; each id is visited at most once.
    pub fn reachable_from(&self, root: &NodeId) -> Reachable {
        let adj = self.adjacency();
        let mut seen: HashSet<&NodeId> = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        seen.insert(root);
        queue.push_back(root);
        while let Some(cur) = queue.pop_front() {
            order.push(cur.clone());
            for next in adj.get(cur).into_iter().flatten() {
                if seen.insert(*next) { queue.push_back(*next); }
            }
        }
        Reachable { cycle: self.has_cycle_from(root, &adj), visited: order }
    }

    // iterative three-colour DFS; self loops count as cycles
    fn has_cycle_from(&self, root: &NodeId, adj: &HashMap<&NodeId, Vec<&NodeId>>) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark { OnPath, Done }
        let mut marks: HashMap<&NodeId, Mark> = HashMap::new();
        let mut stack: Vec<(&NodeId, usize)> = vec![(root, 0)];
        marks.insert(root, Mark::OnPath);
        while let Some((node, idx)) = stack.pop() {
            let children = adj.get(node).map(|v| v.as_slice()).unwrap_or(&[]);
            if idx < children.len() {
                stack.push((node, idx + 1));
                let child = children[idx];
                match marks.get(child) {
                    Some(Mark::OnPath) => return true,
                    Some(Mark::Done) => {}
                    None => { marks.insert(child, Mark::OnPath); stack.push((child, 0)); }
                }
            } else {
                marks.insert(node, Mark::Done);
            }
        }
        false
    }
}

/// Extracts a [`LineageGraph`] from a metadata bundle.
#[derive(Debug, Clone, Default)]
pub struct LineageGraphBuilder;

impl LineageGraphBuilder {
    pub fn new() -> Self { Self }

    /// One node for the artifact plus one per distinct dependency reference,
    /// one edge per declared dependency entry. Self references and edges to
    /// undeclared nodes are kept.
    pub fn build(&self, root: &NodeId, metadata: &MetadataBundle) -> LineageGraph {
        let mut nodes: BTreeMap<NodeId, LineageNode> = BTreeMap::new();
        let mut order: Vec<NodeId> = Vec::new();
        let mut edges = Vec::with_capacity(metadata.dependencies.len());

        let mut root_meta = serde_json::Map::new();
        root_meta.insert("source_url".into(), serde_json::Value::String(metadata.source_url.clone()));
        nodes.insert(root.clone(), LineageNode {
            id: root.clone(),
            name: metadata.name.clone(),
            source: "registry".into(),
            size_mb: metadata.size_mb,
            metadata: serde_json::Value::Object(root_meta),
        });
        order.push(root.clone());

        for dep in &metadata.dependencies {
            let id = NodeId::new(dep.reference.trim());
            match nodes.get_mut(&id) {
                Some(existing) => {
                    // later declarations may carry the size the first one lacked
                    if existing.size_mb.is_none() { existing.size_mb = dep.size_mb; }
                }
                None => {
                    nodes.insert(id.clone(), LineageNode {
                        id: id.clone(),
                        name: dep.name.clone().unwrap_or_else(|| dep.reference.trim().to_string()),
                        source: dep.source.clone(),
                        size_mb: dep.size_mb,
                        metadata: dep.metadata.clone(),
                    });
                    order.push(id.clone());
                }
            }
            let from = dep.declared_by.as_deref().map(|d| NodeId::new(d.trim())).unwrap_or_else(|| root.clone());
            edges.push(LineageEdge { from, to: id, relationship: dep.relationship.clone() });
        }

        let nodes = order.into_iter().filter_map(|id| nodes.remove(&id)).collect();
        LineageGraph { nodes, edges }
    }
}
