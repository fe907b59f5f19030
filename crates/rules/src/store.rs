//! Collaborator contracts consumed by the trigger engine.
//!
//! Persistence for triggers, readings, weather, lookup tables and alerts
//! lives outside this crate. Implementations plug in through these traits;
//! [`crate::memory::MemoryStore`] implements all of them in memory.

use std::sync::Arc;

use async_trait::async_trait;
use cellwatch_core::{LookupTableData, Reading, SensorReading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::{AlertCandidate, OpenAlert};
use crate::schema::{ScopeType, Trigger};

/// Errors a collaborator can report. The engine propagates them unchanged.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("write failed: {0}")]
    Write(String),
}

// ── Trigger query ───────────────────────────────────────────────────

/// How a trigger's `sensorId` must relate to the evaluation scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorMatchMode {
    /// Only triggers bound to the scope's sensor.
    Specific,
    /// Only triggers with no sensor binding.
    Generic,
    /// Unbound triggers, plus those bound to the scope's sensor if it has one.
    Any,
}

/// Filter the trigger store applies when listing candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerQuery {
    pub active_only: bool,
    pub organization_id: Option<String>,
    pub commodity_type_id: Option<String>,
    pub sensor_match: SensorMatchMode,
    pub sensor_id: Option<String>,
}

impl TriggerQuery {
    /// Reference implementation of the filter, usable by any store.
    pub fn matches(&self, trigger: &Trigger) -> bool {
        if self.active_only && !trigger.is_live() {
            return false;
        }

        if let Some(commodity) = &self.commodity_type_id {
            if trigger.commodity_type_id.as_ref() != Some(commodity) {
                return false;
            }
        }

        let in_scope = match trigger.scope_type {
            ScopeType::All => true,
            ScopeType::Organization => {
                self.organization_id.is_some()
                    && trigger.organization_id == self.organization_id
            }
        };
        if !in_scope {
            return false;
        }

        match self.sensor_match {
            SensorMatchMode::Specific => {
                self.sensor_id.is_some() && trigger.sensor_id == self.sensor_id
            }
            SensorMatchMode::Generic => trigger.sensor_id.is_none(),
            SensorMatchMode::Any => match (&trigger.sensor_id, &self.sensor_id) {
                (None, _) => true,
                (Some(bound), Some(scope)) => bound == scope,
                (Some(_), None) => false,
            },
        }
    }
}

// ── Contracts ───────────────────────────────────────────────────────

#[async_trait]
pub trait TriggerStore: Send + Sync {
    async fn query(&self, query: &TriggerQuery) -> Result<Vec<Trigger>, StoreError>;
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Sensor readings for any of `sensor_ids` recorded within `[from, to]`.
    async fn query_sensor(
        &self,
        sensor_ids: &[String],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>, StoreError>;

    /// Gateway readings recorded within `[from, to]`.
    async fn query_gateway(
        &self,
        gateway_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StoreError>;
}

#[async_trait]
pub trait WeatherStore: Send + Sync {
    /// Cached outside observations for a site within `[from, to]`.
    async fn query(
        &self,
        site_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>, StoreError>;
}

/// Fetches missing weather observations into the [`WeatherStore`].
///
/// Best effort: implementations swallow their own failures.
#[async_trait]
pub trait WeatherBackfill: Send + Sync {
    async fn ensure_range(
        &self,
        site_id: &str,
        lat: f64,
        lon: f64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    );
}

#[async_trait]
pub trait LookupTableStore: Send + Sync {
    async fn get_by_commodity_type(
        &self,
        commodity_type_id: &str,
    ) -> Result<Option<LookupTableData>, StoreError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// The open alert (OPEN, ACKNOWLEDGED or IN_PROGRESS) for this key, if any.
    async fn find_open(
        &self,
        trigger_id: &str,
        cell_id: &str,
        sensor_id: Option<&str>,
    ) -> Result<Option<OpenAlert>, StoreError>;

    /// Persist candidates in one batch; returns how many were inserted.
    async fn create_many(&self, candidates: &[AlertCandidate]) -> Result<usize, StoreError>;
}

/// The full set of collaborators an engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub triggers: Arc<dyn TriggerStore>,
    pub readings: Arc<dyn ReadingStore>,
    pub weather: Arc<dyn WeatherStore>,
    pub backfill: Arc<dyn WeatherBackfill>,
    pub lookup_tables: Arc<dyn LookupTableStore>,
    pub alerts: Arc<dyn AlertStore>,
}

impl Collaborators {
    /// Use one store for every contract.
    pub fn uniform<S>(store: Arc<S>) -> Self
    where
        S: TriggerStore
            + ReadingStore
            + WeatherStore
            + WeatherBackfill
            + LookupTableStore
            + AlertStore
            + 'static,
    {
        Self {
            triggers: store.clone(),
            readings: store.clone(),
            weather: store.clone(),
            backfill: store.clone(),
            lookup_tables: store.clone(),
            alerts: store,
        }
    }
}
