//! Structural validation of grid records.

use eg_project::{NodeDef, NodeKindDef, Phase};

use crate::error::{GraphError, GraphResult};
use crate::grid::{Branch, Node};

/// A grid needs at least one node.
pub(crate) fn validate_not_empty(nodes: &[NodeDef]) -> GraphResult<()> {
    if nodes.is_empty() {
        return Err(GraphError::topology("grid has zero nodes"));
    }
    Ok(())
}

/// Exactly one node must be marked slack.
pub(crate) fn validate_single_slack(nodes: &[NodeDef]) -> GraphResult<()> {
    let slack: Vec<&str> = nodes
        .iter()
        .filter(|n| matches!(n.kind, NodeKindDef::Slack { .. }))
        .map(|n| n.name.as_str())
        .collect();
    match slack.len() {
        1 => Ok(()),
        0 => Err(GraphError::topology("no slack node")),
        _ => Err(GraphError::topology(format!(
            "{} slack nodes ({}), expected exactly one",
            slack.len(),
            slack.join(", ")
        ))),
    }
}

/// Resolve the phases of an element attached to `available` phases.
///
/// `None` takes all available phases. The result is sorted a, b, c.
pub(crate) fn resolve_phases(
    requested: Option<&[Phase]>,
    available: &[Phase],
    context: &str,
) -> GraphResult<Vec<Phase>> {
    let mut phases = match requested {
        Some(p) => p.to_vec(),
        None => available.to_vec(),
    };
    phases.sort();
    phases.dedup();
    if phases.is_empty() {
        return Err(GraphError::topology(format!("{context} has no phases")));
    }
    if let Some(missing) = phases.iter().find(|p| !available.contains(p)) {
        return Err(GraphError::topology(format!(
            "{context} uses phase '{}' not connected at its node",
            missing.as_str()
        )));
    }
    Ok(phases)
}

/// Endpoint checks that need both resolved nodes.
pub(crate) fn validate_branch(branch: &Branch, from: &Node, to: &Node) -> GraphResult<()> {
    if branch.from == branch.to {
        return Err(GraphError::topology(format!(
            "{} '{}' is a self-loop on node '{}'",
            branch.kind.label(),
            branch.name,
            from.name
        )));
    }
    if let Some(missing) = branch.phases.iter().find(|p| !to.phases.contains(p)) {
        return Err(GraphError::topology(format!(
            "{} '{}' uses phase '{}' not connected at node '{}'",
            branch.kind.label(),
            branch.name,
            missing.as_str(),
            to.name
        )));
    }
    if branch.kind.is_line() {
        let (a, b) = (from.nominal_voltage_kv, to.nominal_voltage_kv);
        if (a - b).abs() > 1e-9 * a.abs().max(b.abs()) {
            return Err(GraphError::topology(format!(
                "line '{}' connects nominal voltages {a} kV and {b} kV; use a transformer",
                branch.name
            )));
        }
    }
    Ok(())
}

/// Check adjacency consistency: every listed branch touches its node.
pub(crate) fn validate_adjacency(
    nodes: &[Node],
    branches: &[Branch],
    offsets: &[usize],
    flat: &[eg_core::BranchId],
) -> GraphResult<()> {
    if offsets.len() != nodes.len() + 1 {
        return Err(GraphError::topology("adjacency offsets do not match node count"));
    }
    for (i, node) in nodes.iter().enumerate() {
        for id in &flat[offsets[i]..offsets[i + 1]] {
            let branch = &branches[id.index()];
            if branch.from != node.id && branch.to != node.id {
                return Err(GraphError::topology(format!(
                    "branch '{}' listed at node '{}' but does not touch it",
                    branch.name, node.name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_defaults_to_available() {
        let phases = resolve_phases(None, &[Phase::A, Phase::C], "der 'x'").unwrap();
        assert_eq!(phases, vec![Phase::A, Phase::C]);
    }

    #[test]
    fn resolve_sorts_requested() {
        let phases =
            resolve_phases(Some(&[Phase::C, Phase::A]), &Phase::ALL, "line 'l'").unwrap();
        assert_eq!(phases, vec![Phase::A, Phase::C]);
    }

    #[test]
    fn resolve_rejects_foreign_phase() {
        let err = resolve_phases(Some(&[Phase::B]), &[Phase::A], "der 'x'").unwrap_err();
        assert!(matches!(err, GraphError::InvalidTopology { .. }));
    }
}
