//! Trigger context resolution: candidate triggers for a scope, the history
//! windows they need, and on-demand baseline lookups.

use std::sync::Arc;

use cellwatch_core::{LookupTableData, Scope};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::{Collaborator, EngineError, Result};
use crate::history::{find_baseline_reading, HistoryWindows};
use crate::metrics::MetricSnapshot;
use crate::schema::{Metric, Trigger, ValueSource};
use crate::store::{ReadingStore, SensorMatchMode, TriggerQuery, TriggerStore, WeatherStore};

/// For every CHANGE condition in `triggers`, widen the window of each
/// source the condition reads from.
pub fn max_windows_by_source(triggers: &[Trigger]) -> HistoryWindows {
    let mut windows = HistoryWindows::default();
    for trigger in triggers {
        for condition in &trigger.conditions {
            let Some(hours) = condition
                .as_change()
                .and_then(|spec| spec.window_hours)
                .filter(|h| h.is_finite() && *h > 0.0)
            else {
                continue;
            };
            for source in condition.sources() {
                windows.include(source, hours);
            }
        }
    }
    windows
}

pub struct ContextResolver {
    triggers: Arc<dyn TriggerStore>,
    readings: Arc<dyn ReadingStore>,
    weather: Arc<dyn WeatherStore>,
}

impl ContextResolver {
    pub fn new(
        triggers: Arc<dyn TriggerStore>,
        readings: Arc<dyn ReadingStore>,
        weather: Arc<dyn WeatherStore>,
    ) -> Self {
        Self {
            triggers,
            readings,
            weather,
        }
    }

    /// Build the store query for a scope.
    pub fn query_for(scope: &Scope, sensor_match: SensorMatchMode) -> TriggerQuery {
        TriggerQuery {
            active_only: true,
            organization_id: scope.organization_id.clone(),
            commodity_type_id: scope.commodity_type_id.clone(),
            sensor_match,
            sensor_id: scope.sensor_id.clone(),
        }
    }

    /// Live triggers that apply to `scope` under `sensor_match`.
    ///
    /// The store's result is re-checked against [`TriggerQuery::matches`]
    /// so the filter semantics do not depend on the store.
    pub async fn find_candidates(
        &self,
        scope: &Scope,
        sensor_match: SensorMatchMode,
    ) -> Result<Vec<Trigger>> {
        if sensor_match == SensorMatchMode::Specific && scope.sensor_id.is_none() {
            return Ok(Vec::new());
        }
        let query = Self::query_for(scope, sensor_match);
        let mut triggers = self
            .triggers
            .query(&query)
            .await
            .map_err(EngineError::store(Collaborator::TriggerStore))?;
        triggers.retain(|t| query.matches(t));
        debug!(
            candidates = triggers.len(),
            cell_id = scope.cell_id.as_deref().unwrap_or("-"),
            "resolved candidate triggers"
        );
        Ok(triggers)
    }

    /// Metric values of the earliest reading at/after `since` (and before
    /// `before`, if given) for one source. Empty when there is none.
    ///
    /// `source_id` is the sensor id, gateway id or site id respectively.
    pub async fn load_baseline(
        &self,
        source: ValueSource,
        source_id: &str,
        since: DateTime<Utc>,
        before: Option<DateTime<Utc>>,
        metrics: &[Metric],
        table: Option<&LookupTableData>,
    ) -> Result<MetricSnapshot> {
        let to = before.unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut readings = match source {
            ValueSource::Sensor => self
                .readings
                .query_sensor(&[source_id.to_string()], since, to)
                .await
                .map_err(EngineError::store(Collaborator::ReadingStore))?
                .into_iter()
                .filter(|row| row.sensor_id == source_id)
                .map(|row| row.reading)
                .collect(),
            ValueSource::Gateway => self
                .readings
                .query_gateway(source_id, since, to)
                .await
                .map_err(EngineError::store(Collaborator::ReadingStore))?,
            ValueSource::Outside => self
                .weather
                .query(source_id, since, to)
                .await
                .map_err(EngineError::store(Collaborator::WeatherStore))?,
        };
        if let Some(before) = before {
            readings.retain(|r| r.recorded_at < before);
        }
        readings.sort_by_key(|r| r.recorded_at);

        Ok(find_baseline_reading(&readings, since)
            .map(|r| MetricSnapshot::select(r, metrics, table))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn windows_follow_resolved_sources() {
        let triggers: Vec<Trigger> = serde_json::from_value(json!([
            {"id": "a", "name": "a", "conditions": [
                {"id": "1", "metric": "TEMPERATURE", "type": "CHANGE", "timeWindowHours": 3},
                {"id": "2", "metric": "TEMPERATURE", "type": "CHANGE", "timeWindowHours": 12,
                 "valueSources": ["GATEWAY", "OUTSIDE"]},
                {"id": "3", "metric": "TEMPERATURE", "type": "THRESHOLD", "timeWindowHours": 48}
            ]},
            {"id": "b", "name": "b", "conditions": [
                {"id": "4", "metric": "HUMIDITY", "type": "CHANGE", "timeWindowHours": 6},
                {"id": "5", "metric": "HUMIDITY", "type": "CHANGE", "sourceType": "GATEWAY",
                 "timeWindowHours": 24},
                {"id": "6", "metric": "HUMIDITY", "type": "CHANGE", "sourceType": "OUTSIDE"}
            ]}
        ]))
        .unwrap();

        let windows = max_windows_by_source(&triggers);
        assert_eq!(windows.sensor_hours, 6.0);
        assert_eq!(windows.gateway_hours, 24.0);
        assert_eq!(windows.outside_hours, 12.0);
    }

    #[test]
    fn query_carries_scope() {
        let scope = Scope {
            organization_id: Some("org".to_string()),
            commodity_type_id: Some("wheat".to_string()),
            sensor_id: Some("s-1".to_string()),
            ..Scope::default()
        };
        let q = ContextResolver::query_for(&scope, SensorMatchMode::Any);
        assert!(q.active_only);
        assert_eq!(q.commodity_type_id.as_deref(), Some("wheat"));
        assert_eq!(q.sensor_id.as_deref(), Some("s-1"));
    }
}
