//! Scenario coordinator: dispatches scenarios against a shared model cache.
//!
//! The coordinator owns the cache handle for its lifetime. `start` applies
//! the configured startup reset before any scenario runs and `shutdown`
//! returns the final cache statistics.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc;

use chrono::{DateTime, Utc};
use eg_cache::{CacheEntry, CacheStats, Fingerprint, ModelCache, scenario_fingerprint};
use eg_der::{BuildingModel, RecordedBuildingProfiles};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult, ScenarioError};
use crate::models::{ModelSet, build_models};
use crate::source::{ScenarioSnapshot, ScenarioSource};

pub type SharedModelCache = ModelCache<ModelSet, ScenarioError>;

/// Models of one dispatched scenario.
#[derive(Debug, Clone)]
pub struct ScenarioModels {
    pub name: String,
    pub fingerprint: Fingerprint,
    pub models: Arc<CacheEntry<ModelSet>>,
    pub from_cache: bool,
}

impl ScenarioModels {
    pub fn models(&self) -> &ModelSet {
        self.models.value()
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.models.built_at()
    }
}

/// Outcome of one scenario in a multi-scenario run.
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub name: String,
    pub result: Result<ScenarioModels, ScenarioError>,
}

impl ScenarioOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct ScenarioCoordinator {
    config: AppConfig,
    source: Arc<dyn ScenarioSource>,
    building: Arc<dyn BuildingModel>,
    cache: Arc<SharedModelCache>,
    pool: Option<rayon::ThreadPool>,
}

impl ScenarioCoordinator {
    /// Create a fresh cache from `config.cache` and start on it.
    pub fn start(config: AppConfig, source: Arc<dyn ScenarioSource>) -> AppResult<Self> {
        let cache = Arc::new(ModelCache::new(config.cache));
        Self::with_cache(config, source, cache)
    }

    /// Start on an existing cache handle.
    ///
    /// The handle's own configuration governs caching; its startup reset is
    /// applied here unless an earlier coordinator already applied it.
    pub fn with_cache(
        config: AppConfig,
        source: Arc<dyn ScenarioSource>,
        cache: Arc<SharedModelCache>,
    ) -> AppResult<Self> {
        let reset = cache.apply_startup_reset();
        tracing::debug!(reset, entries = cache.len(), "model cache attached");

        let pool = if config.parallel.enable {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.parallel.threads)
                .thread_name(|i| format!("eg-worker-{i}"))
                .build()
                .map_err(|e| AppError::ThreadPool(e.to_string()))?;
            tracing::info!(threads = pool.current_num_threads(), "parallel scenario execution");
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            config,
            source,
            building: Arc::new(RecordedBuildingProfiles),
            cache,
            pool,
        })
    }

    /// Replace the collaborator that supplies flexible building profiles.
    pub fn with_building_model(mut self, building: Arc<dyn BuildingModel>) -> Self {
        self.building = building;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<SharedModelCache> {
        &self.cache
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    /// Load the current snapshot of `name` and its cache key.
    pub fn fingerprint(&self, name: &str) -> Result<(ScenarioSnapshot, Fingerprint), ScenarioError> {
        let snapshot = self.source.load(name)?;
        let fingerprint = scenario_fingerprint(
            name,
            &snapshot.scenario,
            &snapshot.data_version,
            &self.config.linearization,
        )
        .map_err(|e| ScenarioError::Fingerprint {
            scenario: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok((snapshot, fingerprint))
    }

    /// Cached or freshly built models of one scenario.
    pub fn dispatch(&self, name: &str) -> Result<ScenarioModels, ScenarioError> {
        let (snapshot, fingerprint) = self.fingerprint(name)?;
        let _span = tracing::info_span!("scenario", name, key = %fingerprint.short()).entered();

        let settings = self.config.linearization;
        let building = Arc::clone(&self.building);
        let lookup = self
            .cache
            .get_or_build(&fingerprint, || {
                build_models(&snapshot.scenario, &settings, building.as_ref())
            })
            .map_err(|e| ScenarioError::from_cache(name, e))?;

        tracing::info!(from_cache = lookup.from_cache, "scenario ready");
        Ok(ScenarioModels {
            name: name.to_string(),
            fingerprint,
            models: lookup.entry,
            from_cache: lookup.from_cache,
        })
    }

    /// Dispatch every scenario; outcomes come back in input order.
    ///
    /// A failing or panicking scenario only affects its own outcome.
    pub fn run_all(&self, names: &[String]) -> Vec<ScenarioOutcome> {
        let outcomes: Vec<ScenarioOutcome> = match &self.pool {
            None => names.iter().map(|name| self.guarded_dispatch(name)).collect(),
            Some(pool) => self.run_parallel(pool, names),
        };

        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        tracing::info!(
            scenarios = outcomes.len(),
            failed,
            "scenario run finished"
        );
        outcomes
    }

    fn run_parallel(&self, pool: &rayon::ThreadPool, names: &[String]) -> Vec<ScenarioOutcome> {
        let (tx, rx) = mpsc::channel();
        pool.scope(|scope| {
            for (position, name) in names.iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let outcome = self.guarded_dispatch(name);
                    // The receiver outlives the scope.
                    let _ = tx.send((position, outcome));
                });
            }
        });
        drop(tx);

        let mut slots: Vec<Option<ScenarioOutcome>> = vec![None; names.len()];
        for (position, outcome) in rx {
            slots[position] = Some(outcome);
        }
        slots
            .into_iter()
            .zip(names)
            .map(|(slot, name)| {
                slot.unwrap_or_else(|| ScenarioOutcome {
                    name: name.clone(),
                    result: Err(ScenarioError::WorkerPanic {
                        scenario: name.clone(),
                        message: "worker returned no outcome".to_string(),
                    }),
                })
            })
            .collect()
    }

    fn guarded_dispatch(&self, name: &str) -> ScenarioOutcome {
        let result = catch_unwind(AssertUnwindSafe(|| self.dispatch(name))).unwrap_or_else(
            |payload| {
                let message = panic_message(payload.as_ref());
                tracing::warn!(scenario = name, %message, "scenario worker panicked");
                Err(ScenarioError::WorkerPanic {
                    scenario: name.to_string(),
                    message,
                })
            },
        );
        if let Err(err) = &result {
            tracing::warn!(scenario = name, kind = %err.kind(), error = %err, "scenario failed");
        }
        ScenarioOutcome {
            name: name.to_string(),
            result,
        }
    }

    /// Stop the coordinator and report what the cache did.
    pub fn shutdown(self) -> CacheStats {
        let stats = self.cache.stats();
        tracing::info!(
            hits = stats.hits,
            builds = stats.builds,
            failures = stats.failures,
            expirations = stats.expirations,
            timeouts = stats.timeouts,
            "coordinator shut down"
        );
        stats
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
