//! Connectivity analysis: islands and elements cut off from the slack.

use eg_core::NodeId;
use petgraph::unionfind::UnionFind;

use crate::grid::Grid;

/// Island labelling of a grid's nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Islands {
    /// Island label per node, numbered in order of first appearance.
    pub assignment: Vec<usize>,
    pub count: usize,
}

impl Islands {
    pub fn island_of(&self, node: NodeId) -> usize {
        self.assignment[node.index()]
    }
}

/// Label node islands, treating every branch as a connection.
pub fn node_islands(grid: &Grid) -> Islands {
    let n = grid.nodes().len();
    let mut uf = UnionFind::<usize>::new(n);
    for branch in grid.branches() {
        uf.union(branch.from.index(), branch.to.index());
    }
    label(&mut uf, n)
}

/// Nodes with no branch path to the slack node, in id order.
pub fn nodes_disconnected_from_source(grid: &Grid) -> Vec<NodeId> {
    let islands = node_islands(grid);
    let source = islands.island_of(grid.slack());
    grid.nodes()
        .iter()
        .filter(|n| islands.island_of(n.id) != source)
        .map(|n| n.id)
        .collect()
}

/// Node-phase rows with no same-phase path to a slack row, ascending.
///
/// A three-phase node fed only by a single-phase lateral has its other two
/// phases floating; those rows are reported here.
pub fn rows_disconnected_from_source(grid: &Grid) -> Vec<usize> {
    let index = grid.index();
    let dim = index.node_dim();
    let mut uf = UnionFind::<usize>::new(dim);
    for branch in grid.branches() {
        for &phase in &branch.phases {
            if let (Some(f), Some(t)) = (
                index.node_phase_row(branch.from, phase),
                index.node_phase_row(branch.to, phase),
            ) {
                uf.union(f, t);
            }
        }
    }
    (0..dim)
        .filter(|&row| {
            !index
                .source_rows()
                .iter()
                .any(|&s| uf.equiv(s, row))
        })
        .collect()
}

fn label(uf: &mut UnionFind<usize>, n: usize) -> Islands {
    let mut root_label = vec![usize::MAX; n];
    let mut assignment = Vec::with_capacity(n);
    let mut count = 0;
    for i in 0..n {
        let root = uf.find_mut(i);
        if root_label[root] == usize::MAX {
            root_label[root] = count;
            count += 1;
        }
        assignment.push(root_label[root]);
    }
    Islands { assignment, count }
}
