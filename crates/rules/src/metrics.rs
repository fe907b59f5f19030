//! Metric resolution: reading → numeric value for a condition metric.
//!
//! Includes EMC band lookup and the median aggregate used by the
//! `MEDIAN_*` metrics. Everything here is pure.

use cellwatch_core::{LookupTableData, Reading};
use serde::{Deserialize, Serialize};

use crate::schema::Metric;

/// Resolve `metric` from a reading. EMC needs the commodity lookup table.
pub fn value_of(metric: Metric, reading: &Reading, table: Option<&LookupTableData>) -> Option<f64> {
    match metric {
        Metric::Temperature | Metric::MedianTemperature => reading.temperature,
        Metric::Humidity | Metric::MedianHumidity => reading.humidity,
        Metric::Emc => {
            let table = table?;
            emc(table, reading.temperature?, reading.humidity?)
        }
    }
}

/// Equilibrium moisture content by floor-banding.
///
/// Each axis picks the greatest band whose lower edge is `<=` the value,
/// clamped to the first band below the table. No interpolation.
pub fn emc(table: &LookupTableData, temperature: f64, humidity: f64) -> Option<f64> {
    let temp_index = band_index(&table.temp_ranges, temperature)?;
    let humidity_index = band_index(&table.humidity_ranges, humidity)?;
    table.values.get(humidity_index)?.get(temp_index).copied()
}

fn band_index(edges: &[f64], value: f64) -> Option<usize> {
    if edges.is_empty() {
        return None;
    }
    Some(edges.iter().rposition(|edge| *edge <= value).unwrap_or(0))
}

/// Median of the values; the mean of the two middle values for even counts.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Display unit for a metric.
pub fn unit(metric: Metric) -> &'static str {
    match metric {
        Metric::Temperature | Metric::MedianTemperature => "°C",
        Metric::Humidity | Metric::MedianHumidity | Metric::Emc => "%",
    }
}

// ── Snapshots ───────────────────────────────────────────────────────

/// Partial metric map for one sensor at one instant.
///
/// Used by the single-reading evaluation path, where callers already hold
/// a sensor's current and baseline values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub emc: Option<f64>,
}

impl MetricSnapshot {
    /// Capture every metric a reading can resolve.
    pub fn from_reading(reading: &Reading, table: Option<&LookupTableData>) -> Self {
        Self {
            temperature: reading.temperature,
            humidity: reading.humidity,
            emc: value_of(Metric::Emc, reading, table),
        }
    }

    /// Capture only the requested metrics.
    pub fn select(reading: &Reading, metrics: &[Metric], table: Option<&LookupTableData>) -> Self {
        let mut snapshot = Self::default();
        for &metric in metrics {
            let value = value_of(metric, reading, table);
            match metric {
                Metric::Temperature | Metric::MedianTemperature => snapshot.temperature = value,
                Metric::Humidity | Metric::MedianHumidity => snapshot.humidity = value,
                Metric::Emc => snapshot.emc = value,
            }
        }
        snapshot
    }

    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Temperature | Metric::MedianTemperature => self.temperature,
            Metric::Humidity | Metric::MedianHumidity => self.humidity,
            Metric::Emc => self.emc,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.humidity.is_none() && self.emc.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn wheat_table() -> LookupTableData {
        LookupTableData {
            temp_ranges: vec![0.0, 20.0, 40.0],
            humidity_ranges: vec![0.0, 50.0, 100.0],
            values: vec![
                vec![8.0, 10.0, 12.0],
                vec![12.0, 15.0, 18.0],
                vec![14.0, 17.0, 20.0],
            ],
        }
    }

    #[test]
    fn median_odd_even_empty() {
        assert_eq!(median(&[1.0, 2.0, 3.0]), Some(2.0));
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[9.0, 1.0, 5.0]), Some(5.0));
    }

    #[test]
    fn emc_floor_bands() {
        let table = wheat_table();
        assert_eq!(emc(&table, 25.0, 40.0), Some(10.0));
        assert_eq!(emc(&table, 20.0, 50.0), Some(15.0));
        assert_eq!(emc(&table, 39.9, 99.9), Some(15.0));
    }

    #[test]
    fn emc_clamps_outside_table() {
        let table = wheat_table();
        assert_eq!(emc(&table, -5.0, -1.0), Some(8.0));
        assert_eq!(emc(&table, 80.0, 120.0), Some(20.0));
    }

    #[test]
    fn emc_handles_ragged_or_empty_tables() {
        let empty = LookupTableData {
            temp_ranges: vec![],
            humidity_ranges: vec![0.0],
            values: vec![vec![1.0]],
        };
        assert_eq!(emc(&empty, 10.0, 10.0), None);

        let ragged = LookupTableData {
            temp_ranges: vec![0.0, 10.0],
            humidity_ranges: vec![0.0],
            values: vec![vec![1.0]],
        };
        assert_eq!(emc(&ragged, 15.0, 10.0), None);
    }

    #[test]
    fn value_of_maps_metrics() {
        let reading = Reading::new(25.0, 40.0, Utc::now());
        let table = wheat_table();
        assert_eq!(value_of(Metric::MedianTemperature, &reading, None), Some(25.0));
        assert_eq!(value_of(Metric::Humidity, &reading, None), Some(40.0));
        assert_eq!(value_of(Metric::Emc, &reading, None), None);
        assert_eq!(value_of(Metric::Emc, &reading, Some(&table)), Some(10.0));
    }

    #[test]
    fn units() {
        assert_eq!(unit(Metric::MedianTemperature), "°C");
        assert_eq!(unit(Metric::Emc), "%");
        assert_eq!(unit(Metric::Humidity), "%");
    }

    #[test]
    fn snapshot_select_is_partial() {
        let reading = Reading::new(25.0, 40.0, Utc::now());
        let snapshot = MetricSnapshot::select(&reading, &[Metric::Humidity], None);
        assert_eq!(snapshot.humidity, Some(40.0));
        assert_eq!(snapshot.temperature, None);
        assert_eq!(snapshot.get(Metric::MedianHumidity), Some(40.0));
    }
}
