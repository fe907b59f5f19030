//! History loading and merging for CHANGE conditions.
//!
//! History is loaded once per evaluation batch, bounded by the largest
//! window any candidate trigger needs per source, and optionally merged
//! with in-batch readings that have not been persisted yet.

use std::collections::HashMap;
use std::sync::Arc;

use cellwatch_core::{GeoPoint, Reading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Collaborator, EngineError, Result};
use crate::schema::{hours_to_duration, window_start, ValueSource};
use crate::store::{ReadingStore, WeatherBackfill, WeatherStore};

/// Largest look-back window, in hours, needed per source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryWindows {
    pub sensor_hours: f64,
    pub gateway_hours: f64,
    pub outside_hours: f64,
}

impl HistoryWindows {
    pub fn hours(&self, source: ValueSource) -> f64 {
        match source {
            ValueSource::Sensor => self.sensor_hours,
            ValueSource::Gateway => self.gateway_hours,
            ValueSource::Outside => self.outside_hours,
        }
    }

    /// Widen the window for `source` to at least `hours`.
    pub fn include(&mut self, source: ValueSource, hours: f64) {
        let slot = match source {
            ValueSource::Sensor => &mut self.sensor_hours,
            ValueSource::Gateway => &mut self.gateway_hours,
            ValueSource::Outside => &mut self.outside_hours,
        };
        if hours > *slot {
            *slot = hours;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sensor_hours <= 0.0 && self.gateway_hours <= 0.0 && self.outside_hours <= 0.0
    }
}

/// Per-source readings, each list ascending by `recorded_at`.
///
/// Built per evaluation call and never persisted. The same shape carries
/// caller-supplied in-batch readings ([`LocalHistory`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryCache {
    /// Keyed by stored sensor id.
    #[serde(default)]
    pub sensor: HashMap<String, Vec<Reading>>,
    #[serde(default)]
    pub gateway: Vec<Reading>,
    #[serde(default)]
    pub outside: Vec<Reading>,
}

/// In-batch readings not yet persisted (simulation and testing).
pub type LocalHistory = HistoryCache;

impl HistoryCache {
    pub fn sensor(&self, sensor_id: &str) -> &[Reading] {
        self.sensor.get(sensor_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn gateway(&self) -> &[Reading] {
        &self.gateway
    }

    pub fn outside(&self) -> &[Reading] {
        &self.outside
    }
}

/// First reading at or after `window_start` in an ascending list.
pub fn find_baseline_reading(readings: &[Reading], window_start: DateTime<Utc>) -> Option<&Reading> {
    readings.iter().find(|r| r.recorded_at >= window_start)
}

/// Merge local readings inside `[start, now]` into persisted ones, re-sorted.
pub fn merge_readings(
    mut persisted: Vec<Reading>,
    local: &[Reading],
    start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<Reading> {
    persisted.extend(
        local
            .iter()
            .filter(|r| r.recorded_at >= start && r.recorded_at <= now)
            .cloned(),
    );
    persisted.sort_by_key(|r| r.recorded_at);
    persisted
}

// ── Loader ──────────────────────────────────────────────────────────

/// What one batch needs loaded.
#[derive(Debug, Clone)]
pub struct HistoryRequest<'a> {
    pub now: DateTime<Utc>,
    pub windows: HistoryWindows,
    /// Stored ids of the sensors present in the batch.
    pub sensor_ids: &'a [String],
    pub gateway_id: Option<&'a str>,
    pub site_id: &'a str,
    pub site_location: Option<GeoPoint>,
}

pub struct HistoryLoader {
    readings: Arc<dyn ReadingStore>,
    weather: Arc<dyn WeatherStore>,
    backfill: Arc<dyn WeatherBackfill>,
    backfill_enabled: bool,
}

impl HistoryLoader {
    pub fn new(
        readings: Arc<dyn ReadingStore>,
        weather: Arc<dyn WeatherStore>,
        backfill: Arc<dyn WeatherBackfill>,
        backfill_enabled: bool,
    ) -> Self {
        Self {
            readings,
            weather,
            backfill,
            backfill_enabled,
        }
    }

    /// Load sensor, gateway and outside history concurrently, then merge
    /// `local` into each.
    pub async fn load(
        &self,
        request: &HistoryRequest<'_>,
        local: Option<&LocalHistory>,
    ) -> Result<HistoryCache> {
        let (sensor, gateway, outside) = tokio::try_join!(
            self.load_sensor(request),
            self.load_gateway(request),
            self.load_outside(request),
        )?;

        let mut cache = HistoryCache {
            sensor,
            gateway,
            outside,
        };
        if let Some(local) = local {
            merge_local(&mut cache, local, request);
        }
        Ok(cache)
    }

    async fn load_sensor(&self, request: &HistoryRequest<'_>) -> Result<HashMap<String, Vec<Reading>>> {
        let mut grouped: HashMap<String, Vec<Reading>> = HashMap::new();
        if request.windows.sensor_hours <= 0.0 || request.sensor_ids.is_empty() {
            return Ok(grouped);
        }
        let start = window_start(request.now, hours_to_duration(request.windows.sensor_hours));
        let rows = self
            .readings
            .query_sensor(request.sensor_ids, start, request.now)
            .await
            .map_err(EngineError::store(Collaborator::ReadingStore))?;

        for row in rows {
            grouped.entry(row.sensor_id).or_default().push(row.reading);
        }
        for readings in grouped.values_mut() {
            readings.sort_by_key(|r| r.recorded_at);
        }
        debug!(sensors = grouped.len(), "loaded sensor history");
        Ok(grouped)
    }

    async fn load_gateway(&self, request: &HistoryRequest<'_>) -> Result<Vec<Reading>> {
        let Some(gateway_id) = request.gateway_id else {
            return Ok(Vec::new());
        };
        if request.windows.gateway_hours <= 0.0 {
            return Ok(Vec::new());
        }
        let start = window_start(request.now, hours_to_duration(request.windows.gateway_hours));
        let mut readings = self
            .readings
            .query_gateway(gateway_id, start, request.now)
            .await
            .map_err(EngineError::store(Collaborator::ReadingStore))?;
        readings.sort_by_key(|r| r.recorded_at);
        Ok(readings)
    }

    async fn load_outside(&self, request: &HistoryRequest<'_>) -> Result<Vec<Reading>> {
        if request.windows.outside_hours <= 0.0 {
            return Ok(Vec::new());
        }
        let start = window_start(request.now, hours_to_duration(request.windows.outside_hours));
        let mut readings = self.query_weather(request.site_id, start, request.now).await?;

        if readings.is_empty() && self.backfill_enabled {
            if let Some(location) = request.site_location {
                self.backfill
                    .ensure_range(request.site_id, location.lat, location.lon, start, request.now)
                    .await;
                readings = self.query_weather(request.site_id, start, request.now).await?;
                if readings.is_empty() {
                    warn!(site_id = %request.site_id, "no outside observations after backfill");
                }
            }
        }

        readings.sort_by_key(|r| r.recorded_at);
        Ok(readings)
    }

    async fn query_weather(
        &self,
        site_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Reading>> {
        self.weather
            .query(site_id, from, to)
            .await
            .map_err(EngineError::store(Collaborator::WeatherStore))
    }
}

fn merge_local(cache: &mut HistoryCache, local: &LocalHistory, request: &HistoryRequest<'_>) {
    let now = request.now;
    let windows = request.windows;

    if windows.sensor_hours > 0.0 {
        let start = window_start(now, hours_to_duration(windows.sensor_hours));
        for (sensor_id, readings) in &local.sensor {
            let persisted = cache.sensor.remove(sensor_id).unwrap_or_default();
            let merged = merge_readings(persisted, readings, start, now);
            if !merged.is_empty() {
                cache.sensor.insert(sensor_id.clone(), merged);
            }
        }
    }
    if windows.gateway_hours > 0.0 {
        let start = window_start(now, hours_to_duration(windows.gateway_hours));
        let persisted = std::mem::take(&mut cache.gateway);
        cache.gateway = merge_readings(persisted, &local.gateway, start, now);
    }
    if windows.outside_hours > 0.0 {
        let start = window_start(now, hours_to_duration(windows.outside_hours));
        let persisted = std::mem::take(&mut cache.outside);
        cache.outside = merge_readings(persisted, &local.outside, start, now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(now: DateTime<Utc>, minutes_ago: i64, temperature: f64) -> Reading {
        Reading::new(temperature, 50.0, now - Duration::minutes(minutes_ago))
    }

    #[test]
    fn baseline_is_first_reading_in_window() {
        let now = Utc::now();
        let readings = vec![at(now, 180, 18.0), at(now, 90, 20.0), at(now, 30, 22.0)];
        let baseline = find_baseline_reading(&readings, now - Duration::hours(2)).unwrap();
        assert_eq!(baseline.temperature, Some(20.0));
        assert!(find_baseline_reading(&readings, now).is_none());
    }

    #[test]
    fn baseline_includes_exact_window_start() {
        let now = Utc::now();
        let readings = vec![at(now, 120, 19.0), at(now, 60, 20.0)];
        let baseline = find_baseline_reading(&readings, now - Duration::hours(2)).unwrap();
        assert_eq!(baseline.temperature, Some(19.0));
    }

    #[test]
    fn merge_filters_window_and_sorts() {
        let now = Utc::now();
        let persisted = vec![at(now, 60, 20.0)];
        let local = vec![at(now, 300, 1.0), at(now, 90, 19.0), at(now, -5, 99.0)];
        let merged = merge_readings(persisted, &local, now - Duration::hours(2), now);
        let temps: Vec<f64> = merged.iter().filter_map(|r| r.temperature).collect();
        assert_eq!(temps, vec![19.0, 20.0]);
    }

    #[test]
    fn windows_take_maximum() {
        let mut windows = HistoryWindows::default();
        assert!(windows.is_empty());
        windows.include(ValueSource::Gateway, 2.0);
        windows.include(ValueSource::Gateway, 1.0);
        windows.include(ValueSource::Outside, 6.0);
        assert_eq!(windows.hours(ValueSource::Gateway), 2.0);
        assert_eq!(windows.hours(ValueSource::Outside), 6.0);
        assert_eq!(windows.hours(ValueSource::Sensor), 0.0);
    }

    #[test]
    fn local_merge_respects_per_source_windows() {
        let now = Utc::now();
        let mut cache = HistoryCache::default();
        cache.gateway.push(at(now, 30, 21.0));
        let mut local = LocalHistory::default();
        local.gateway.push(at(now, 45, 20.0));
        local.outside.push(at(now, 10, 5.0));
        local.sensor.insert("s-1".to_string(), vec![at(now, 20, 18.0)]);

        let sensor_ids: Vec<String> = Vec::new();
        let request = HistoryRequest {
            now,
            windows: HistoryWindows {
                sensor_hours: 1.0,
                gateway_hours: 1.0,
                outside_hours: 0.0,
            },
            sensor_ids: &sensor_ids,
            gateway_id: Some("gw-1"),
            site_id: "site-1",
            site_location: None,
        };
        merge_local(&mut cache, &local, &request);

        assert_eq!(cache.gateway().len(), 2);
        assert_eq!(cache.gateway()[0].temperature, Some(20.0));
        assert!(cache.outside().is_empty());
        assert_eq!(cache.sensor("s-1").len(), 1);
        assert!(cache.sensor("s-2").is_empty());
    }
}
