//! Grid arena: nodes, branches and DERs addressed by typed index.

use eg_core::{BranchId, DerId, NodeId};
use eg_project::{DerConnection, DerKindDef, LineTypeDef, Phase, ProfileDef};

use crate::indexing::ElementIndex;

/// Electrical role of a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeType {
    /// Reference bus with fixed voltage (per-unit magnitude, angle of phase a).
    Slack {
        voltage_magnitude_pu: f64,
        voltage_angle_deg: f64,
    },
    Pq,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Connected phases, sorted a, b, c.
    pub phases: Vec<Phase>,
    pub nominal_voltage_kv: f64,
    pub node_type: NodeType,
    pub rated_capacity_kva: Option<f64>,
}

impl Node {
    pub fn is_slack(&self) -> bool {
        matches!(self.node_type, NodeType::Slack { .. })
    }
}

/// Series/shunt parameters of a line, with any line type reference resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum LineImpedance {
    PhaseMatrix {
        line_type: LineTypeDef,
        length_km: f64,
    },
    Ohms {
        resistance_ohm: f64,
        reactance_ohm: f64,
        susceptance_us: f64,
    },
    PerUnit {
        resistance_pu: f64,
        reactance_pu: f64,
        susceptance_pu: f64,
        base_voltage_kv: Option<f64>,
        base_power_mva: Option<f64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformerParams {
    pub rated_power_kva: f64,
    pub primary_voltage_kv: f64,
    pub secondary_voltage_kv: f64,
    pub resistance_percent: f64,
    pub reactance_percent: f64,
    pub tap_ratio: f64,
    pub phase_shift_deg: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BranchKind {
    Line(LineImpedance),
    Transformer(TransformerParams),
}

impl BranchKind {
    pub fn is_line(&self) -> bool {
        matches!(self, BranchKind::Line(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            BranchKind::Line(_) => "line",
            BranchKind::Transformer(_) => "transformer",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub from: NodeId,
    pub to: NodeId,
    /// Connected phases, sorted a, b, c.
    pub phases: Vec<Phase>,
    pub kind: BranchKind,
    pub rated_power_kva: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Der {
    pub id: DerId,
    pub name: String,
    pub node: NodeId,
    /// Connected phases, sorted a, b, c.
    pub phases: Vec<Phase>,
    pub connection: DerConnection,
    pub kind: DerKindDef,
    pub active_power_kw: f64,
    pub reactive_power_kvar: f64,
    pub profile: Option<ProfileDef>,
}

/// A validated, immutable grid.
///
/// Stores all elements in vectors indexed by their ids, the element index
/// shared by every downstream matrix, and compact node→branch adjacency.
#[derive(Debug, Clone)]
pub struct Grid {
    pub(crate) name: String,
    pub(crate) base_power_mva: f64,
    pub(crate) base_frequency_hz: f64,
    pub(crate) nodes: Vec<Node>,
    pub(crate) branches: Vec<Branch>,
    pub(crate) ders: Vec<Der>,
    pub(crate) slack: NodeId,
    pub(crate) index: ElementIndex,

    /// Node i's branches are in node_branches[node_branch_offsets[i]..node_branch_offsets[i+1]].
    pub(crate) node_branch_offsets: Vec<usize>,
    pub(crate) node_branches: Vec<BranchId>,
}

impl Grid {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_power_mva(&self) -> f64 {
        self.base_power_mva
    }

    pub fn base_frequency_hz(&self) -> f64 {
        self.base_frequency_hz
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub fn ders(&self) -> &[Der] {
        &self.ders
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn branch(&self, id: BranchId) -> Option<&Branch> {
        self.branches.get(id.index())
    }

    pub fn der(&self, id: DerId) -> Option<&Der> {
        self.ders.get(id.index())
    }

    /// The single slack node.
    pub fn slack(&self) -> NodeId {
        self.slack
    }

    pub fn index(&self) -> &ElementIndex {
        &self.index
    }

    /// Branches incident to a node, sorted by branch id.
    pub fn node_branches(&self, node: NodeId) -> &[BranchId] {
        let idx = node.index();
        if idx >= self.nodes.len() {
            return &[];
        }
        let start = self.node_branch_offsets[idx];
        let end = self.node_branch_offsets[idx + 1];
        &self.node_branches[start..end]
    }

    /// True when the grid contains no transformers.
    pub fn is_line_only(&self) -> bool {
        self.branches.iter().all(|b| b.kind.is_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_kind_labels() {
        let line = BranchKind::Line(LineImpedance::Ohms {
            resistance_ohm: 1.0,
            reactance_ohm: 1.0,
            susceptance_us: 0.0,
        });
        assert!(line.is_line());
        assert_eq!(line.label(), "line");
    }
}
