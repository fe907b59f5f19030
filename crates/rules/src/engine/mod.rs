//! [`TriggerEngine`]: evaluates a telemetry batch against active triggers.
//!
//! One call to [`TriggerEngine::evaluate`] runs in stages:
//! 1. resolve generic candidate triggers for the scope
//! 2. load the commodity lookup table (cached) and the batch history
//! 3. evaluate every condition across its sources, combine with AND/OR
//! 4. skip triggers that already have an open alert for the cell/sensor
//! 5. hand candidates to the writer callback and persist them in one batch
//!
//! The open-alert check is read-then-write. Two concurrent evaluations for
//! the same trigger/cell/sensor can both pass it; the alert store's
//! `create_many` is where uniqueness has to be enforced.

mod sources;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use cellwatch_core::config::EngineConfig;
use cellwatch_core::{BallReading, GeoPoint, LookupTableData, Reading, Scope};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::alert::{build_candidate, AlertCandidate};
use crate::cache::LookupTableCache;
use crate::context::{max_windows_by_source, ContextResolver};
use crate::error::{Collaborator, EngineError, Result};
use crate::evaluator::{combine, evaluate_trigger_snapshot};
use crate::history::{HistoryLoader, HistoryRequest, LocalHistory};
use crate::metrics::MetricSnapshot;
use crate::schema::{window_start, Condition, Metric, Trigger, ValueSource};
use crate::store::{Collaborators, SensorMatchMode};

use sources::SourceContext;

// ── Inputs and options ──────────────────────────────────────────────

/// Current readings of one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationInputs {
    #[serde(default)]
    pub gateway_reading: Option<Reading>,
    #[serde(default)]
    pub outside_reading: Option<Reading>,
    #[serde(default)]
    pub ball_readings: Vec<BallReading>,
    /// External (wire) sensor id → stored sensor id.
    #[serde(default)]
    pub sensor_ids: HashMap<String, String>,
    /// Batch timestamp; history windows end here.
    pub now: DateTime<Utc>,
    /// Needed to backfill outside weather.
    #[serde(default)]
    pub site_location: Option<GeoPoint>,
}

impl EvaluationInputs {
    /// Empty batch at `now`.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            gateway_reading: None,
            outside_reading: None,
            ball_readings: Vec::new(),
            sensor_ids: HashMap::new(),
            now,
            site_location: None,
        }
    }

    /// Stored ids of the balls present in the batch, sorted and unique.
    pub fn involved_sensor_ids(&self) -> Vec<String> {
        self.ball_readings
            .iter()
            .filter_map(|ball| self.sensor_ids.get(&ball.external_id).cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Callback invoked once per new alert candidate, in trigger order.
pub type AlertWriter<'a> = &'a (dyn Fn(&AlertCandidate) + Send + Sync);

#[derive(Default)]
pub struct EvaluateOptions<'a> {
    pub alert_writer: Option<AlertWriter<'a>>,
    /// Bypass the open-alert check (simulation and testing).
    pub skip_existing_check: bool,
    /// Whether to persist candidates; `None` uses the engine config.
    pub persist_alerts: Option<bool>,
    /// In-batch readings merged into loaded history, never persisted.
    pub local_history: Option<&'a LocalHistory>,
}

/// What one evaluation did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationOutcome {
    /// New candidates in trigger evaluation order.
    pub candidates: Vec<AlertCandidate>,
    pub triggers_considered: usize,
    pub triggers_matched: usize,
    /// Matched triggers skipped because an alert is already open.
    pub suppressed_open: usize,
    pub persisted: usize,
}

// ── Engine ──────────────────────────────────────────────────────────

pub struct TriggerEngine {
    collaborators: Collaborators,
    context: ContextResolver,
    history: HistoryLoader,
    lookup_cache: LookupTableCache,
    config: EngineConfig,
}

impl TriggerEngine {
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        let context = ContextResolver::new(
            collaborators.triggers.clone(),
            collaborators.readings.clone(),
            collaborators.weather.clone(),
        );
        let history = HistoryLoader::new(
            collaborators.readings.clone(),
            collaborators.weather.clone(),
            collaborators.backfill.clone(),
            config.weather_backfill,
        );
        Self {
            lookup_cache: LookupTableCache::with_ttl_secs(config.lookup_table_ttl_secs),
            collaborators,
            context,
            history,
            config,
        }
    }

    pub fn context(&self) -> &ContextResolver {
        &self.context
    }

    /// The lookup-table cache; call `invalidate` after a table is edited.
    pub fn lookup_cache(&self) -> &LookupTableCache {
        &self.lookup_cache
    }

    /// Cached lookup table for a commodity type, loading it on a miss.
    pub async fn lookup_table(&self, commodity_type_id: &str) -> Result<Option<Arc<LookupTableData>>> {
        if let Some(table) = self.lookup_cache.get(commodity_type_id) {
            return Ok(Some(table));
        }
        let loaded = self
            .collaborators
            .lookup_tables
            .get_by_commodity_type(commodity_type_id)
            .await
            .map_err(EngineError::store(Collaborator::LookupTableStore))?;
        Ok(loaded.map(|table| self.lookup_cache.insert(commodity_type_id, table)))
    }

    /// Evaluate one batch against every generic trigger for `scope`.
    ///
    /// Missing data never fails the call; only collaborator errors do.
    pub async fn evaluate(
        &self,
        scope: &Scope,
        inputs: &EvaluationInputs,
        options: EvaluateOptions<'_>,
    ) -> Result<EvaluationOutcome> {
        let mut outcome = EvaluationOutcome::default();

        let (Some(cell_id), Some(site_id)) = (scope.cell_id.as_deref(), scope.site_id.as_deref())
        else {
            debug!("scope has no cell or site; skipping trigger evaluation");
            return Ok(outcome);
        };

        let triggers = self
            .context
            .find_candidates(scope, SensorMatchMode::Generic)
            .await?;
        if triggers.is_empty() {
            return Ok(outcome);
        }
        outcome.triggers_considered = triggers.len();

        let table = match scope.commodity_type_id.as_deref() {
            Some(id) => self.lookup_table(id).await?,
            None => None,
        };

        let sensor_ids = inputs.involved_sensor_ids();
        let request = HistoryRequest {
            now: inputs.now,
            windows: max_windows_by_source(&triggers),
            sensor_ids: &sensor_ids,
            gateway_id: scope.gateway_id.as_deref(),
            site_id,
            site_location: inputs.site_location,
        };
        let history = self.history.load(&request, options.local_history).await?;

        let ctx = SourceContext {
            inputs,
            history: &history,
            table: table.as_deref(),
        };

        for trigger in &triggers {
            let Some(matched) = self.match_trigger(&ctx, trigger) else {
                continue;
            };
            outcome.triggers_matched += 1;

            if !options.skip_existing_check {
                let existing = self
                    .collaborators
                    .alerts
                    .find_open(&trigger.id, cell_id, scope.sensor_id.as_deref())
                    .await
                    .map_err(EngineError::store(Collaborator::AlertStore))?;
                if let Some(open) = existing {
                    debug!(
                        trigger_id = %trigger.id,
                        cell_id,
                        alert_id = %open.id,
                        "alert already open; not creating another"
                    );
                    outcome.suppressed_open += 1;
                    continue;
                }
            }

            outcome
                .candidates
                .push(build_candidate(trigger, scope, &matched, inputs.now));
        }

        if let Some(writer) = options.alert_writer {
            for candidate in &outcome.candidates {
                writer(candidate);
            }
        }

        let persist = options.persist_alerts.unwrap_or(self.config.persist_alerts);
        if persist && !outcome.candidates.is_empty() {
            outcome.persisted = self
                .collaborators
                .alerts
                .create_many(&outcome.candidates)
                .await
                .map_err(EngineError::store(Collaborator::AlertStore))?;
            info!(
                cell_id,
                created = outcome.persisted,
                candidates = outcome.candidates.len(),
                "persisted trigger alerts"
            );
        }

        Ok(outcome)
    }

    /// Matched conditions of `trigger` if it fires, `None` otherwise.
    fn match_trigger<'t>(&self, ctx: &SourceContext<'_>, trigger: &'t Trigger) -> Option<Vec<&'t Condition>> {
        if ctx.table.is_none() && trigger.conditions.iter().any(|c| c.metric == Metric::Emc) {
            warn!(trigger_id = %trigger.id, "EMC condition without a lookup table never matches");
        }

        let results: Vec<bool> = trigger
            .conditions
            .iter()
            .map(|condition| ctx.condition_matches(condition))
            .collect();

        if !combine(trigger.condition_logic, &results) {
            return None;
        }
        debug!(trigger_id = %trigger.id, "trigger matched");
        Some(
            trigger
                .conditions
                .iter()
                .zip(results)
                .filter_map(|(condition, matched)| matched.then_some(condition))
                .collect(),
        )
    }

    /// Single-reading variant: decide whether `trigger` matches one
    /// sensor's current metric map, loading CHANGE baselines from storage.
    pub async fn evaluate_sensor_snapshot(
        &self,
        trigger: &Trigger,
        sensor_id: &str,
        commodity_type_id: Option<&str>,
        current: &MetricSnapshot,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let table = match commodity_type_id {
            Some(id) => self.lookup_table(id).await?,
            None => None,
        };

        let mut baselines = HashMap::new();
        for condition in &trigger.conditions {
            if !condition.sources().contains(&ValueSource::Sensor) {
                continue;
            }
            let Some(window) = condition.as_change().and_then(|spec| spec.window()) else {
                continue;
            };
            let baseline = self
                .context
                .load_baseline(
                    ValueSource::Sensor,
                    sensor_id,
                    window_start(now, window),
                    Some(now),
                    &[condition.metric],
                    table.as_deref(),
                )
                .await?;
            if !baseline.is_empty() {
                baselines.insert(condition.id.clone(), baseline);
            }
        }

        Ok(evaluate_trigger_snapshot(trigger, current, &baselines))
    }
}
