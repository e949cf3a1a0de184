//! Stable element indexing.
//!
//! Maps element names to contiguous ids and node/branch phases to matrix
//! rows. Rows are node-major: the phases of node 0 (a, b, c as connected),
//! then node 1, and so on. Every matrix built downstream uses this ordering.

use std::collections::HashMap;
use std::ops::Range;

use eg_core::{BranchId, DerId, Id, NodeId};
use eg_project::Phase;

use crate::error::{ElementCategory, GraphError, GraphResult};
use crate::grid::{Branch, Der, Node};

/// Register names of one category, rejecting duplicates.
///
/// Returns name → position in input order.
pub(crate) fn register_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
    category: ElementCategory,
) -> GraphResult<HashMap<String, usize>> {
    let mut map = HashMap::new();
    for (i, name) in names.into_iter().enumerate() {
        if map.insert(name.to_string(), i).is_some() {
            return Err(GraphError::DuplicateElement {
                category,
                name: name.to_string(),
            });
        }
    }
    Ok(map)
}

/// Index providing stable, contiguous ids and rows for grid elements.
///
/// All lookups are O(1) amortized, except phase-row lookups which scan at
/// most three phases.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementIndex {
    node_names: Vec<String>,
    node_by_name: HashMap<String, NodeId>,
    branch_names: Vec<String>,
    branch_by_name: HashMap<String, BranchId>,
    der_names: Vec<String>,
    der_by_name: HashMap<String, DerId>,

    /// Node i's rows are node_row_offsets[i]..node_row_offsets[i+1].
    node_row_offsets: Vec<usize>,
    row_nodes: Vec<NodeId>,
    row_phases: Vec<Phase>,

    /// Branch i's rows are branch_row_offsets[i]..branch_row_offsets[i+1].
    branch_row_offsets: Vec<usize>,
    branch_row_branches: Vec<BranchId>,
    branch_row_phases: Vec<Phase>,

    source_node: NodeId,
    source_rows: Vec<usize>,
    non_source_rows: Vec<usize>,
}

fn to_ids<K>(names: &[String], category: ElementCategory) -> GraphResult<HashMap<String, Id<K>>> {
    let map = register_names(names.iter().map(String::as_str), category)?;
    Ok(map
        .into_iter()
        .map(|(name, i)| (name, Id::from_index(i)))
        .collect())
}

impl ElementIndex {
    /// Build the index for a set of resolved elements.
    ///
    /// Fails with `DuplicateElement` when two elements of one category share
    /// a name, and with `InvalidTopology` when no node is a slack.
    pub fn new(nodes: &[Node], branches: &[Branch], ders: &[Der]) -> GraphResult<Self> {
        let node_names: Vec<String> = nodes.iter().map(|n| n.name.clone()).collect();
        let branch_names: Vec<String> = branches.iter().map(|b| b.name.clone()).collect();
        let der_names: Vec<String> = ders.iter().map(|d| d.name.clone()).collect();

        let node_by_name = to_ids(&node_names, ElementCategory::Node)?;
        let branch_by_name = to_ids(&branch_names, ElementCategory::Branch)?;
        let der_by_name = to_ids(&der_names, ElementCategory::Der)?;

        let source_node = nodes
            .iter()
            .find(|n| n.is_slack())
            .map(|n| n.id)
            .ok_or_else(|| GraphError::topology("no slack node"))?;

        let mut node_row_offsets = Vec::with_capacity(nodes.len() + 1);
        let mut row_nodes = Vec::new();
        let mut row_phases = Vec::new();
        node_row_offsets.push(0);
        for node in nodes {
            for &phase in &node.phases {
                row_nodes.push(node.id);
                row_phases.push(phase);
            }
            node_row_offsets.push(row_nodes.len());
        }

        let mut branch_row_offsets = Vec::with_capacity(branches.len() + 1);
        let mut branch_row_branches = Vec::new();
        let mut branch_row_phases = Vec::new();
        branch_row_offsets.push(0);
        for branch in branches {
            for &phase in &branch.phases {
                branch_row_branches.push(branch.id);
                branch_row_phases.push(phase);
            }
            branch_row_offsets.push(branch_row_branches.len());
        }

        let (source_rows, non_source_rows): (Vec<usize>, Vec<usize>) =
            (0..row_nodes.len()).partition(|&r| row_nodes[r] == source_node);

        Ok(Self {
            node_names,
            node_by_name,
            branch_names,
            branch_by_name,
            der_names,
            der_by_name,
            node_row_offsets,
            row_nodes,
            row_phases,
            branch_row_offsets,
            branch_row_branches,
            branch_row_phases,
            source_node,
            source_rows,
            non_source_rows,
        })
    }

    pub fn node_count(&self) -> usize {
        self.node_names.len()
    }

    pub fn branch_count(&self) -> usize {
        self.branch_names.len()
    }

    pub fn der_count(&self) -> usize {
        self.der_names.len()
    }

    /// Number of node-phase rows (admittance matrix dimension).
    pub fn node_dim(&self) -> usize {
        self.row_nodes.len()
    }

    /// Number of branch-phase rows.
    pub fn branch_dim(&self) -> usize {
        self.branch_row_branches.len()
    }

    pub fn node_id(&self, name: &str) -> GraphResult<NodeId> {
        self.node_by_name
            .get(name)
            .copied()
            .ok_or_else(|| unknown(ElementCategory::Node, name))
    }

    pub fn branch_id(&self, name: &str) -> GraphResult<BranchId> {
        self.branch_by_name
            .get(name)
            .copied()
            .ok_or_else(|| unknown(ElementCategory::Branch, name))
    }

    pub fn der_id(&self, name: &str) -> GraphResult<DerId> {
        self.der_by_name
            .get(name)
            .copied()
            .ok_or_else(|| unknown(ElementCategory::Der, name))
    }

    /// Node name for an id (panics if out of bounds).
    pub fn node_name(&self, id: NodeId) -> &str {
        &self.node_names[id.index()]
    }

    /// Branch name for an id (panics if out of bounds).
    pub fn branch_name(&self, id: BranchId) -> &str {
        &self.branch_names[id.index()]
    }

    /// DER name for an id (panics if out of bounds).
    pub fn der_name(&self, id: DerId) -> &str {
        &self.der_names[id.index()]
    }

    pub fn node_names(&self) -> &[String] {
        &self.node_names
    }

    pub fn branch_names(&self) -> &[String] {
        &self.branch_names
    }

    pub fn der_names(&self) -> &[String] {
        &self.der_names
    }

    /// Rows occupied by a node.
    pub fn node_rows(&self, id: NodeId) -> Range<usize> {
        let i = id.index();
        self.node_row_offsets[i]..self.node_row_offsets[i + 1]
    }

    /// Row of one phase of a node, if that phase is connected.
    pub fn node_phase_row(&self, id: NodeId, phase: Phase) -> Option<usize> {
        if id.index() >= self.node_count() {
            return None;
        }
        self.node_rows(id).find(|&r| self.row_phases[r] == phase)
    }

    pub fn row_node(&self, row: usize) -> NodeId {
        self.row_nodes[row]
    }

    pub fn row_phase(&self, row: usize) -> Phase {
        self.row_phases[row]
    }

    /// All node rows carrying a given phase, ascending.
    pub fn rows_by_phase(&self, phase: Phase) -> Vec<usize> {
        (0..self.node_dim())
            .filter(|&r| self.row_phases[r] == phase)
            .collect()
    }

    /// Rows occupied by a branch.
    pub fn branch_rows(&self, id: BranchId) -> Range<usize> {
        let i = id.index();
        self.branch_row_offsets[i]..self.branch_row_offsets[i + 1]
    }

    pub fn branch_phase_row(&self, id: BranchId, phase: Phase) -> Option<usize> {
        if id.index() >= self.branch_count() {
            return None;
        }
        self.branch_rows(id)
            .find(|&r| self.branch_row_phases[r] == phase)
    }

    pub fn branch_row_branch(&self, row: usize) -> BranchId {
        self.branch_row_branches[row]
    }

    pub fn branch_row_phase(&self, row: usize) -> Phase {
        self.branch_row_phases[row]
    }

    pub fn source_node(&self) -> NodeId {
        self.source_node
    }

    /// Rows of the slack node, ascending.
    pub fn source_rows(&self) -> &[usize] {
        &self.source_rows
    }

    /// Rows of every other node, ascending.
    pub fn non_source_rows(&self) -> &[usize] {
        &self.non_source_rows
    }

    /// Human-readable row labels, e.g. `n1.a`.
    pub fn node_row_labels(&self) -> Vec<String> {
        (0..self.node_dim())
            .map(|r| {
                format!(
                    "{}.{}",
                    self.node_name(self.row_nodes[r]),
                    self.row_phases[r].as_str()
                )
            })
            .collect()
    }
}

fn unknown(category: ElementCategory, name: &str) -> GraphError {
    GraphError::UnknownElement {
        category,
        name: name.to_string(),
    }
}
