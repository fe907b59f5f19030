//! In-memory implementations of every collaborator contract.
//!
//! Backs the `trigger-sim` binary and the engine tests. The alert store
//! enforces open-alert uniqueness inside `create_many`, the way a database
//! unique index over (trigger, cell, sensor, open status) would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use cellwatch_core::{LookupTableData, Reading, SensorReading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::alert::{AlertCandidate, AlertStatus, OpenAlert};
use crate::schema::Trigger;
use crate::store::{
    AlertStore, LookupTableStore, ReadingStore, StoreError, TriggerQuery, TriggerStore,
    WeatherBackfill, WeatherStore,
};

/// Serializable seed data for a [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySeed {
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub sensor_readings: Vec<SensorReading>,
    /// Keyed by gateway id.
    #[serde(default)]
    pub gateway_readings: HashMap<String, Vec<Reading>>,
    /// Keyed by site id.
    #[serde(default)]
    pub weather: HashMap<String, Vec<Reading>>,
    /// Observations the backfill "fetches" into `weather`, keyed by site id.
    #[serde(default)]
    pub weather_upstream: HashMap<String, Vec<Reading>>,
    /// Keyed by commodity type id.
    #[serde(default)]
    pub lookup_tables: HashMap<String, LookupTableData>,
    #[serde(default)]
    pub alerts: Vec<OpenAlert>,
}

#[derive(Default)]
pub struct MemoryStore {
    triggers: RwLock<Vec<Trigger>>,
    sensor_readings: RwLock<Vec<SensorReading>>,
    gateway_readings: RwLock<HashMap<String, Vec<Reading>>>,
    weather: RwLock<HashMap<String, Vec<Reading>>>,
    weather_upstream: RwLock<HashMap<String, Vec<Reading>>>,
    lookup_tables: RwLock<HashMap<String, LookupTableData>>,
    alerts: RwLock<Vec<OpenAlert>>,
    backfill_calls: AtomicUsize,
    lookup_loads: AtomicUsize,
    next_alert_id: AtomicUsize,
}

fn in_range(reading: &Reading, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    reading.recorded_at >= from && reading.recorded_at <= to
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: MemorySeed) -> Self {
        let next_alert_id = AtomicUsize::new(seed.alerts.len());
        Self {
            triggers: RwLock::new(seed.triggers),
            sensor_readings: RwLock::new(seed.sensor_readings),
            gateway_readings: RwLock::new(seed.gateway_readings),
            weather: RwLock::new(seed.weather),
            weather_upstream: RwLock::new(seed.weather_upstream),
            lookup_tables: RwLock::new(seed.lookup_tables),
            alerts: RwLock::new(seed.alerts),
            backfill_calls: AtomicUsize::new(0),
            lookup_loads: AtomicUsize::new(0),
            next_alert_id,
        }
    }

    pub async fn add_trigger(&self, trigger: Trigger) {
        self.triggers.write().await.push(trigger);
    }

    pub async fn add_sensor_reading(&self, sensor_id: &str, reading: Reading) {
        self.sensor_readings.write().await.push(SensorReading {
            sensor_id: sensor_id.to_string(),
            reading,
        });
    }

    pub async fn add_gateway_reading(&self, gateway_id: &str, reading: Reading) {
        self.gateway_readings
            .write()
            .await
            .entry(gateway_id.to_string())
            .or_default()
            .push(reading);
    }

    pub async fn add_weather(&self, site_id: &str, reading: Reading) {
        self.weather
            .write()
            .await
            .entry(site_id.to_string())
            .or_default()
            .push(reading);
    }

    /// Stage an observation that only becomes visible after a backfill.
    pub async fn add_upstream_weather(&self, site_id: &str, reading: Reading) {
        self.weather_upstream
            .write()
            .await
            .entry(site_id.to_string())
            .or_default()
            .push(reading);
    }

    pub async fn set_lookup_table(&self, commodity_type_id: &str, table: LookupTableData) {
        self.lookup_tables
            .write()
            .await
            .insert(commodity_type_id.to_string(), table);
    }

    pub async fn alerts(&self) -> Vec<OpenAlert> {
        self.alerts.read().await.clone()
    }

    pub async fn set_alert_status(&self, alert_id: &str, status: AlertStatus) -> bool {
        let mut alerts = self.alerts.write().await;
        match alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.status = status;
                true
            }
            None => false,
        }
    }

    pub fn backfill_calls(&self) -> usize {
        self.backfill_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_loads(&self) -> usize {
        self.lookup_loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TriggerStore for MemoryStore {
    async fn query(&self, query: &TriggerQuery) -> Result<Vec<Trigger>, StoreError> {
        Ok(self
            .triggers
            .read()
            .await
            .iter()
            .filter(|t| query.matches(t))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn query_sensor(
        &self,
        sensor_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>, StoreError> {
        Ok(self
            .sensor_readings
            .read()
            .await
            .iter()
            .filter(|row| sensor_ids.contains(&row.sensor_id) && in_range(&row.reading, from, to))
            .cloned()
            .collect())
    }

    async fn query_gateway(
        &self,
        gateway_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StoreError> {
        Ok(self
            .gateway_readings
            .read()
            .await
            .get(gateway_id)
            .map(|rows| rows.iter().filter(|r| in_range(r, from, to)).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl WeatherStore for MemoryStore {
    async fn query(
        &self,
        site_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StoreError> {
        Ok(self
            .weather
            .read()
            .await
            .get(site_id)
            .map(|rows| rows.iter().filter(|r| in_range(r, from, to)).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl WeatherBackfill for MemoryStore {
    async fn ensure_range(
        &self,
        site_id: &str,
        lat: f64,
        lon: f64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) {
        self.backfill_calls.fetch_add(1, Ordering::SeqCst);
        let fetched: Vec<Reading> = self
            .weather_upstream
            .read()
            .await
            .get(site_id)
            .map(|rows| rows.iter().filter(|r| in_range(r, from, to)).cloned().collect())
            .unwrap_or_default();
        debug!(site_id, lat, lon, fetched = fetched.len(), "weather backfill");
        if !fetched.is_empty() {
            self.weather
                .write()
                .await
                .entry(site_id.to_string())
                .or_default()
                .extend(fetched);
        }
    }
}

#[async_trait]
impl LookupTableStore for MemoryStore {
    async fn get_by_commodity_type(
        &self,
        commodity_type_id: &str,
    ) -> Result<Option<LookupTableData>, StoreError> {
        self.lookup_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.lookup_tables.read().await.get(commodity_type_id).cloned())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn find_open(
        &self,
        trigger_id: &str,
        cell_id: &str,
        sensor_id: Option<&str>,
    ) -> Result<Option<OpenAlert>, StoreError> {
        Ok(self
            .alerts
            .read()
            .await
            .iter()
            .find(|a| {
                a.status.is_open()
                    && a.trigger_id == trigger_id
                    && a.cell_id == cell_id
                    && a.sensor_id.as_deref() == sensor_id
            })
            .cloned())
    }

    async fn create_many(&self, candidates: &[AlertCandidate]) -> Result<usize, StoreError> {
        // Reject the whole batch before touching the table.
        if let Some(orphan) = candidates.iter().find(|c| c.scope.cell_id.is_none()) {
            return Err(StoreError::Write(format!(
                "alert for trigger {} has no cell id",
                orphan.trigger_id
            )));
        }

        let mut alerts = self.alerts.write().await;
        let mut inserted = 0;
        for candidate in candidates {
            let Some(cell_id) = candidate.scope.cell_id.clone() else {
                continue;
            };
            let duplicate = alerts.iter().any(|a| {
                a.status.is_open()
                    && a.trigger_id == candidate.trigger_id
                    && a.cell_id == cell_id
                    && a.sensor_id == candidate.scope.sensor_id
            });
            if duplicate {
                continue;
            }
            let id = self.next_alert_id.fetch_add(1, Ordering::SeqCst) + 1;
            alerts.push(OpenAlert {
                id: format!("alert-{}", id),
                trigger_id: candidate.trigger_id.clone(),
                cell_id,
                sensor_id: candidate.scope.sensor_id.clone(),
                status: AlertStatus::Open,
            });
            inserted += 1;
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::build_candidate;
    use cellwatch_core::Scope;
    use chrono::TimeZone;
    use serde_json::json;

    fn candidate(trigger_id: &str, cell_id: Option<&str>) -> AlertCandidate {
        let trigger: Trigger = serde_json::from_value(json!({
            "id": trigger_id,
            "name": "Hot cell",
        }))
        .unwrap();
        let scope = Scope {
            cell_id: cell_id.map(str::to_string),
            ..Scope::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        build_candidate(&trigger, &scope, &[], now)
    }

    #[tokio::test]
    async fn create_many_skips_already_open() {
        let store = MemoryStore::new();
        let batch = [candidate("t-1", Some("cell-1")), candidate("t-1", Some("cell-1"))];
        assert_eq!(store.create_many(&batch).await.unwrap(), 1);
        assert_eq!(store.create_many(&batch[..1]).await.unwrap(), 0);
        assert_eq!(store.alerts().await[0].id, "alert-1");
    }

    #[tokio::test]
    async fn create_many_rejects_batch_without_partial_write() {
        let store = MemoryStore::new();
        let batch = [candidate("t-1", Some("cell-1")), candidate("t-2", None)];
        let err = store.create_many(&batch).await.unwrap_err();
        assert!(matches!(err, StoreError::Write(ref msg) if msg.contains("t-2")));
        assert!(store.alerts().await.is_empty());
    }
}
