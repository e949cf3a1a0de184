//! Composition of the per-scenario model set.

use eg_der::{BuildingModel, DerModel, Timesteps};
use eg_network::NetworkModel;
use eg_project::ScenarioDef;
use eg_solver::{LinearizationSettings, LinearizedModel};

use crate::error::ScenarioError;

/// Everything the optimization layer needs for one scenario.
///
/// Built in one piece: either all three models exist or none is published.
#[derive(Debug, Clone)]
pub struct ModelSet {
    pub network: NetworkModel,
    pub linearized: LinearizedModel,
    pub der: DerModel,
}

/// Build the network, linearized and DER models of one scenario.
pub fn build_models(
    scenario: &ScenarioDef,
    settings: &LinearizationSettings,
    building: &dyn BuildingModel,
) -> Result<ModelSet, ScenarioError> {
    let _span = tracing::info_span!("build_models", scenario = %scenario.name).entered();

    eg_project::validate_scenario(scenario)?;
    let network = NetworkModel::from_records(&scenario.grid, &scenario.ders)?;
    let linearized = LinearizedModel::build(&network, settings)?;
    let timesteps = Timesteps::from_def(&scenario.timesteps)?;
    let der = DerModel::build(&network, timesteps, building)?;

    tracing::info!(
        rows = network.node_dim(),
        ders = der.der_count(),
        method = linearized.method().as_str(),
        condition = linearized.condition_number(),
        "scenario models built"
    );
    Ok(ModelSet {
        network,
        linearized,
        der,
    })
}
