use clap::{Parser, Subcommand};
use eg_app::{
    AppConfig, AppError, AppResult, DirectorySource, ScenarioCoordinator, ScenarioSource,
};
use eg_network::{NetworkError, NetworkModel};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eg-cli")]
#[command(about = "egrid CLI - Grid model and power-flow linearization tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a scenario file and its grid topology
    Validate {
        /// Path to the scenario YAML file
        scenario_path: PathBuf,
    },
    /// Build (or load from cache) the models of one or more scenarios
    Build {
        /// Directory holding one <name>.yaml per scenario
        dir: PathBuf,
        /// Scenario names; every scenario in the directory when omitted
        names: Vec<String>,
        /// Application config YAML file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Dispatch scenarios on a worker pool
        #[arg(long)]
        parallel: bool,
        /// Worker threads (0 = one per core)
        #[arg(long)]
        threads: Option<usize>,
        /// Skip the model cache and always build
        #[arg(long)]
        no_cache: bool,
    },
    /// Print the voltage magnitude sensitivity rows of one node
    Sensitivity {
        /// Directory holding one <name>.yaml per scenario
        dir: PathBuf,
        /// Scenario name
        name: String,
        /// Node whose rows are printed
        #[arg(long)]
        node: String,
        /// Application config YAML file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { scenario_path } => cmd_validate(&scenario_path),
        Commands::Build {
            dir,
            names,
            config,
            parallel,
            threads,
            no_cache,
        } => {
            let mut config = load_config(config.as_deref())?;
            if parallel {
                config.parallel.enable = true;
            }
            if let Some(threads) = threads {
                config.parallel.threads = threads;
            }
            if no_cache {
                config.cache.enable = false;
            }
            cmd_build(&dir, names, config)
        }
        Commands::Sensitivity {
            dir,
            name,
            node,
            config,
        } => cmd_sensitivity(&dir, &name, &node, load_config(config.as_deref())?),
    }
}

fn load_config(path: Option<&Path>) -> AppResult<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path),
        None => Ok(AppConfig::default()),
    }
}

fn cmd_validate(scenario_path: &Path) -> AppResult<()> {
    println!("Validating scenario: {}", scenario_path.display());
    let scenario = eg_project::load_yaml(scenario_path)?;
    let network = NetworkModel::from_records(&scenario.grid, &scenario.ders)?;
    let index = network.index();
    println!("✓ Scenario '{}' is valid", scenario.name);
    println!(
        "  {} nodes, {} branches, {} DERs, {} node-phase rows",
        index.node_count(),
        index.branch_count(),
        index.der_count(),
        index.node_dim()
    );
    Ok(())
}

fn cmd_build(dir: &Path, names: Vec<String>, config: AppConfig) -> AppResult<()> {
    let source = Arc::new(DirectorySource::new(dir));
    let names = if names.is_empty() { source.list()? } else { names };
    if names.is_empty() {
        println!("No scenarios found in {}", dir.display());
        return Ok(());
    }

    let coordinator = ScenarioCoordinator::start(config, source)?;
    let outcomes = coordinator.run_all(&names);

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(models) => {
                let set = models.models();
                println!(
                    "✓ {} [{}] {} ({} rows, {} DERs, {} timesteps, cond {:.3e})",
                    outcome.name,
                    models.fingerprint.short(),
                    if models.from_cache { "cached" } else { "built" },
                    set.network.node_dim(),
                    set.der.der_count(),
                    set.der.timesteps().len(),
                    set.linearized.condition_number()
                );
            }
            Err(err) => {
                failed += 1;
                println!("✗ {} [{}] {}", outcome.name, err.kind(), err);
            }
        }
    }

    let stats = coordinator.shutdown();
    println!(
        "Cache: {} hits, {} builds, {} failures",
        stats.hits, stats.builds, stats.failures
    );

    if failed > 0 {
        return Err(AppError::ScenariosFailed {
            failed,
            total: outcomes.len(),
        });
    }
    Ok(())
}

fn cmd_sensitivity(dir: &Path, name: &str, node: &str, config: AppConfig) -> AppResult<()> {
    let source = Arc::new(DirectorySource::new(dir));
    let coordinator = ScenarioCoordinator::start(config, source)?;
    let models = coordinator.dispatch(name)?;
    let set = models.models();

    let index = set.network.index();
    let node_id = index.node_id(node).map_err(NetworkError::from)?;
    let labels = index.node_row_labels();
    let dv_dp = &set.linearized.active().voltage_magnitude;

    println!(
        "d|V|/dP for node '{}' ({}, reference {})",
        node,
        set.linearized.method().as_str(),
        set.linearized.reference()
    );
    print!("{:>10}", "");
    for label in &labels {
        print!(" {:>12}", label);
    }
    println!();
    for row in index.node_rows(node_id) {
        print!("{:>10}", labels[row]);
        for col in 0..dv_dp.ncols() {
            print!(" {:>12.5e}", dv_dp[(row, col)]);
        }
        println!();
    }
    Ok(())
}
