//! eg-graph: grid topology layer for egrid.
//!
//! Provides:
//! - Grid arena (Node, Branch, Der addressed by typed ids)
//! - Incremental grid builder with structural validation
//! - Element index shared by every downstream matrix
//! - Connectivity / island analysis
//!
//! # Example
//!
//! ```
//! use eg_graph::GridBuilder;
//! use eg_project::{LineDef, LineImpedanceDef, NodeDef, NodeKindDef, Phase};
//!
//! let mut builder = GridBuilder::new("feeder");
//! builder.add_node(NodeDef {
//!     name: "source".into(),
//!     phases: Phase::ALL.to_vec(),
//!     nominal_voltage_kv: 4.16,
//!     kind: NodeKindDef::Slack { voltage_magnitude_pu: 1.0, voltage_angle_deg: 0.0 },
//!     rated_capacity_kva: None,
//! });
//! builder.add_node(NodeDef {
//!     name: "n1".into(),
//!     phases: Phase::ALL.to_vec(),
//!     nominal_voltage_kv: 4.16,
//!     kind: NodeKindDef::Pq,
//!     rated_capacity_kva: None,
//! });
//! builder.add_line(LineDef {
//!     name: "l1".into(),
//!     from_node: "source".into(),
//!     to_node: "n1".into(),
//!     phases: None,
//!     impedance: LineImpedanceDef::Ohms { resistance_ohm: 0.1, reactance_ohm: 0.2, susceptance_us: 0.0 },
//!     rated_power_kva: None,
//! });
//! let grid = builder.build().unwrap();
//!
//! assert_eq!(grid.index().node_dim(), 6);
//! assert_eq!(grid.index().branch_dim(), 3);
//! ```

pub mod builder;
pub mod connectivity;
pub mod error;
pub mod grid;
pub mod indexing;
pub(crate) mod validate;

pub use builder::GridBuilder;
pub use connectivity::{Islands, node_islands, nodes_disconnected_from_source, rows_disconnected_from_source};
pub use error::{ElementCategory, GraphError, GraphResult};
pub use grid::{Branch, BranchKind, Der, Grid, LineImpedance, Node, NodeType, TransformerParams};
pub use indexing::ElementIndex;
pub use eg_project::Phase;
