//! Incremental grid builder.

use std::collections::HashMap;

use eg_core::{BranchId, DerId, NodeId};
use eg_project::{
    DerConnection, DerDef, ElectricGridDef, LineDef, LineImpedanceDef, LineTypeDef, NodeDef,
    NodeKindDef, TransformerDef, triangle_dimension,
};

use crate::error::{ElementCategory, GraphError, GraphResult};
use crate::grid::{
    Branch, BranchKind, Der, Grid, LineImpedance, Node, NodeType, TransformerParams,
};
use crate::indexing::{ElementIndex, register_names};
use crate::validate;

#[derive(Debug, Clone)]
enum BranchRecord {
    Line(LineDef),
    Transformer(TransformerDef),
}

impl BranchRecord {
    fn name(&self) -> &str {
        match self {
            BranchRecord::Line(l) => &l.name,
            BranchRecord::Transformer(t) => &t.name,
        }
    }
}

/// Builder for constructing a grid incrementally from records.
///
/// Records are accepted as-is; names are resolved and checked in `build()`,
/// which either returns a complete `Grid` or an error and nothing else.
#[derive(Debug, Clone)]
pub struct GridBuilder {
    name: String,
    base_power_mva: f64,
    base_frequency_hz: f64,
    nodes: Vec<NodeDef>,
    line_types: Vec<LineTypeDef>,
    branches: Vec<BranchRecord>,
    ders: Vec<DerDef>,
}

impl GridBuilder {
    /// Create an empty builder with a 1 MVA, 60 Hz base.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_power_mva: 1.0,
            base_frequency_hz: 60.0,
            nodes: Vec::new(),
            line_types: Vec::new(),
            branches: Vec::new(),
            ders: Vec::new(),
        }
    }

    /// Seed a builder with every record of a grid definition plus its DERs.
    pub fn from_records(grid: &ElectricGridDef, ders: &[DerDef]) -> Self {
        let mut builder = Self::new(grid.name.clone())
            .with_base(grid.base_power_mva, grid.base_frequency_hz);
        for node in &grid.nodes {
            builder.add_node(node.clone());
        }
        for line_type in &grid.line_types {
            builder.add_line_type(line_type.clone());
        }
        for line in &grid.lines {
            builder.add_line(line.clone());
        }
        for transformer in &grid.transformers {
            builder.add_transformer(transformer.clone());
        }
        for der in ders {
            builder.add_der(der.clone());
        }
        builder
    }

    pub fn with_base(mut self, base_power_mva: f64, base_frequency_hz: f64) -> Self {
        self.base_power_mva = base_power_mva;
        self.base_frequency_hz = base_frequency_hz;
        self
    }

    /// Add a node and return the id it will have if the build succeeds.
    pub fn add_node(&mut self, node: NodeDef) -> NodeId {
        self.nodes.push(node);
        NodeId::from_index(self.nodes.len() - 1)
    }

    pub fn add_line_type(&mut self, line_type: LineTypeDef) {
        self.line_types.push(line_type);
    }

    /// Add a line; lines and transformers share the branch id space.
    pub fn add_line(&mut self, line: LineDef) -> BranchId {
        self.branches.push(BranchRecord::Line(line));
        BranchId::from_index(self.branches.len() - 1)
    }

    pub fn add_transformer(&mut self, transformer: TransformerDef) -> BranchId {
        self.branches.push(BranchRecord::Transformer(transformer));
        BranchId::from_index(self.branches.len() - 1)
    }

    pub fn add_der(&mut self, der: DerDef) -> DerId {
        self.ders.push(der);
        DerId::from_index(self.ders.len() - 1)
    }

    /// Resolve, validate and freeze the grid.
    pub fn build(self) -> GraphResult<Grid> {
        validate::validate_not_empty(&self.nodes)?;

        let node_lookup =
            register_names(self.nodes.iter().map(|n| n.name.as_str()), ElementCategory::Node)?;
        register_names(
            self.branches.iter().map(BranchRecord::name),
            ElementCategory::Branch,
        )?;
        register_names(self.ders.iter().map(|d| d.name.as_str()), ElementCategory::Der)?;
        let line_type_lookup = register_names(
            self.line_types.iter().map(|t| t.name.as_str()),
            ElementCategory::LineType,
        )?;

        validate::validate_single_slack(&self.nodes)?;

        let nodes = self.resolve_nodes()?;
        let branches = self.resolve_branches(&nodes, &node_lookup, &line_type_lookup)?;
        let ders = self.resolve_ders(&nodes, &node_lookup)?;

        let index = ElementIndex::new(&nodes, &branches, &ders)?;
        let slack = index.source_node();

        let (node_branch_offsets, node_branches) = Self::build_adjacency(&nodes, &branches);
        validate::validate_adjacency(&nodes, &branches, &node_branch_offsets, &node_branches)?;

        tracing::debug!(
            grid = %self.name,
            nodes = nodes.len(),
            branches = branches.len(),
            ders = ders.len(),
            node_rows = index.node_dim(),
            "grid built"
        );

        Ok(Grid {
            name: self.name,
            base_power_mva: self.base_power_mva,
            base_frequency_hz: self.base_frequency_hz,
            nodes,
            branches,
            ders,
            slack,
            index,
            node_branch_offsets,
            node_branches,
        })
    }

    fn resolve_nodes(&self) -> GraphResult<Vec<Node>> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, def)| {
                let phases = validate::resolve_phases(
                    Some(def.phases.as_slice()),
                    &eg_project::Phase::ALL,
                    &format!("node '{}'", def.name),
                )?;
                let node_type = match def.kind {
                    NodeKindDef::Slack {
                        voltage_magnitude_pu,
                        voltage_angle_deg,
                    } => NodeType::Slack {
                        voltage_magnitude_pu,
                        voltage_angle_deg,
                    },
                    NodeKindDef::Pq => NodeType::Pq,
                };
                Ok(Node {
                    id: NodeId::from_index(i),
                    name: def.name.clone(),
                    phases,
                    nominal_voltage_kv: def.nominal_voltage_kv,
                    node_type,
                    rated_capacity_kva: def.rated_capacity_kva,
                })
            })
            .collect()
    }

    fn lookup_node(
        nodes: &[Node],
        lookup: &HashMap<String, usize>,
        category: ElementCategory,
        owner: &str,
        target: &str,
    ) -> GraphResult<NodeId> {
        lookup
            .get(target)
            .map(|&i| nodes[i].id)
            .ok_or_else(|| GraphError::DanglingReference {
                category,
                name: owner.to_string(),
                target_category: ElementCategory::Node,
                target: target.to_string(),
            })
    }

    fn resolve_branches(
        &self,
        nodes: &[Node],
        node_lookup: &HashMap<String, usize>,
        line_type_lookup: &HashMap<String, usize>,
    ) -> GraphResult<Vec<Branch>> {
        let mut branches = Vec::with_capacity(self.branches.len());
        for (i, record) in self.branches.iter().enumerate() {
            let (name, from_name, to_name, phases, rated_power_kva) = match record {
                BranchRecord::Line(l) => (
                    &l.name,
                    &l.from_node,
                    &l.to_node,
                    l.phases.as_deref(),
                    l.rated_power_kva,
                ),
                BranchRecord::Transformer(t) => (
                    &t.name,
                    &t.from_node,
                    &t.to_node,
                    t.phases.as_deref(),
                    Some(t.rated_power_kva),
                ),
            };
            let from =
                Self::lookup_node(nodes, node_lookup, ElementCategory::Branch, name, from_name)?;
            let to =
                Self::lookup_node(nodes, node_lookup, ElementCategory::Branch, name, to_name)?;

            let kind = match record {
                BranchRecord::Line(l) => {
                    BranchKind::Line(self.resolve_line_impedance(l, line_type_lookup)?)
                }
                BranchRecord::Transformer(t) => BranchKind::Transformer(TransformerParams {
                    rated_power_kva: t.rated_power_kva,
                    primary_voltage_kv: t.primary_voltage_kv,
                    secondary_voltage_kv: t.secondary_voltage_kv,
                    resistance_percent: t.resistance_percent,
                    reactance_percent: t.reactance_percent,
                    tap_ratio: t.tap_ratio,
                    phase_shift_deg: t.phase_shift_deg,
                }),
            };

            let from_node = &nodes[from.index()];
            let phases = validate::resolve_phases(
                phases,
                &from_node.phases,
                &format!("{} '{}'", kind.label(), name),
            )?;

            if let BranchKind::Line(LineImpedance::PhaseMatrix { line_type, .. }) = &kind {
                // A line uses the leading block of a larger line type.
                let dim = triangle_dimension(line_type.resistance_ohm_per_km.len()).unwrap_or(0);
                if dim < phases.len() {
                    return Err(GraphError::topology(format!(
                        "line '{}' has {} phases but line type '{}' describes only {}",
                        name,
                        phases.len(),
                        line_type.name,
                        dim
                    )));
                }
            }

            let branch = Branch {
                id: BranchId::from_index(i),
                name: name.clone(),
                from,
                to,
                phases,
                kind,
                rated_power_kva,
            };
            validate::validate_branch(&branch, from_node, &nodes[to.index()])?;
            branches.push(branch);
        }
        Ok(branches)
    }

    fn resolve_line_impedance(
        &self,
        line: &LineDef,
        line_type_lookup: &HashMap<String, usize>,
    ) -> GraphResult<LineImpedance> {
        Ok(match &line.impedance {
            LineImpedanceDef::LineType {
                line_type,
                length_km,
            } => {
                let idx = line_type_lookup.get(line_type).ok_or_else(|| {
                    GraphError::DanglingReference {
                        category: ElementCategory::Branch,
                        name: line.name.clone(),
                        target_category: ElementCategory::LineType,
                        target: line_type.clone(),
                    }
                })?;
                LineImpedance::PhaseMatrix {
                    line_type: self.line_types[*idx].clone(),
                    length_km: *length_km,
                }
            }
            LineImpedanceDef::Ohms {
                resistance_ohm,
                reactance_ohm,
                susceptance_us,
            } => LineImpedance::Ohms {
                resistance_ohm: *resistance_ohm,
                reactance_ohm: *reactance_ohm,
                susceptance_us: *susceptance_us,
            },
            LineImpedanceDef::PerUnit {
                resistance_pu,
                reactance_pu,
                susceptance_pu,
                base_voltage_kv,
                base_power_mva,
            } => LineImpedance::PerUnit {
                resistance_pu: *resistance_pu,
                reactance_pu: *reactance_pu,
                susceptance_pu: *susceptance_pu,
                base_voltage_kv: *base_voltage_kv,
                base_power_mva: *base_power_mva,
            },
        })
    }

    fn resolve_ders(
        &self,
        nodes: &[Node],
        node_lookup: &HashMap<String, usize>,
    ) -> GraphResult<Vec<Der>> {
        self.ders
            .iter()
            .enumerate()
            .map(|(i, def)| {
                let node = Self::lookup_node(
                    nodes,
                    node_lookup,
                    ElementCategory::Der,
                    &def.name,
                    &def.node,
                )?;
                let phases = validate::resolve_phases(
                    def.phases.as_deref(),
                    &nodes[node.index()].phases,
                    &format!("der '{}'", def.name),
                )?;
                if def.connection == DerConnection::Delta && phases.len() < 2 {
                    return Err(GraphError::topology(format!(
                        "der '{}' is delta connected on a single phase",
                        def.name
                    )));
                }
                Ok(Der {
                    id: DerId::from_index(i),
                    name: def.name.clone(),
                    node,
                    phases,
                    connection: def.connection,
                    kind: def.kind,
                    active_power_kw: def.active_power_kw,
                    reactive_power_kvar: def.reactive_power_kvar,
                    profile: def.profile.clone(),
                })
            })
            .collect()
    }

    /// Build compact adjacency lists: for each node, its incident branches.
    fn build_adjacency(nodes: &[Node], branches: &[Branch]) -> (Vec<usize>, Vec<BranchId>) {
        let mut node_to_branches: HashMap<NodeId, Vec<BranchId>> = HashMap::new();
        for branch in branches {
            node_to_branches.entry(branch.from).or_default().push(branch.id);
            node_to_branches.entry(branch.to).or_default().push(branch.id);
        }

        // Sort each node's branch list for determinism
        for list in node_to_branches.values_mut() {
            list.sort();
        }

        let mut offsets = Vec::with_capacity(nodes.len() + 1);
        let mut flat = Vec::new();
        offsets.push(0);
        for node in nodes {
            if let Some(list) = node_to_branches.get(&node.id) {
                flat.extend_from_slice(list);
            }
            offsets.push(flat.len());
        }

        (offsets, flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eg_project::Phase;

    fn node(name: &str, slack: bool) -> NodeDef {
        NodeDef {
            name: name.to_string(),
            phases: Phase::ALL.to_vec(),
            nominal_voltage_kv: 4.16,
            kind: if slack {
                NodeKindDef::Slack {
                    voltage_magnitude_pu: 1.0,
                    voltage_angle_deg: 0.0,
                }
            } else {
                NodeKindDef::Pq
            },
            rated_capacity_kva: None,
        }
    }

    fn line(name: &str, from: &str, to: &str) -> LineDef {
        LineDef {
            name: name.to_string(),
            from_node: from.to_string(),
            to_node: to.to_string(),
            phases: None,
            impedance: LineImpedanceDef::Ohms {
                resistance_ohm: 0.2,
                reactance_ohm: 0.4,
                susceptance_us: 0.0,
            },
            rated_power_kva: None,
        }
    }

    #[test]
    fn builder_basic() {
        let mut builder = GridBuilder::new("g");
        let n1 = builder.add_node(node("s", true));
        let n2 = builder.add_node(node("n", false));
        let b1 = builder.add_line(line("l", "s", "n"));

        assert_eq!(n1.index(), 0);
        assert_eq!(n2.index(), 1);
        assert_eq!(b1.index(), 0);

        let grid = builder.build().unwrap();
        assert_eq!(grid.nodes().len(), 2);
        assert_eq!(grid.branches().len(), 1);
        assert_eq!(grid.slack(), n1);
        assert_eq!(grid.node_branches(n1), &[b1]);
        assert_eq!(grid.node_branches(n2), &[b1]);
    }

    #[test]
    fn zero_nodes_rejected() {
        let err = GridBuilder::new("empty").build().unwrap_err();
        assert!(matches!(err, GraphError::InvalidTopology { .. }));
    }

    #[test]
    fn two_slack_nodes_rejected() {
        let mut builder = GridBuilder::new("g");
        builder.add_node(node("s1", true));
        builder.add_node(node("s2", true));
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("2 slack nodes"));
    }

    #[test]
    fn self_loop_rejected() {
        let mut builder = GridBuilder::new("g");
        builder.add_node(node("s", true));
        builder.add_line(line("loop", "s", "s"));
        assert!(matches!(
            builder.build(),
            Err(GraphError::InvalidTopology { .. })
        ));
    }

    #[test]
    fn missing_line_type_is_dangling() {
        let mut builder = GridBuilder::new("g");
        builder.add_node(node("s", true));
        builder.add_node(node("n", false));
        let mut l = line("l", "s", "n");
        l.impedance = LineImpedanceDef::LineType {
            line_type: "nope".to_string(),
            length_km: 1.0,
        };
        builder.add_line(l);
        let err = builder.build().unwrap_err();
        assert!(matches!(
            err,
            GraphError::DanglingReference {
                target_category: ElementCategory::LineType,
                ..
            }
        ));
    }
}
