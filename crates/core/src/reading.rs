use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single temperature/humidity sample.
///
/// Readings are immutable once recorded; either value may be absent when a
/// device reported only one of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(temperature: f64, humidity: f64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            temperature: Some(temperature),
            humidity: Some(humidity),
            recorded_at,
        }
    }
}

/// A reading from one in-cell sensor ("ball"), keyed by the id the device
/// reports on the wire rather than the stored sensor id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BallReading {
    pub external_id: String,
    #[serde(flatten)]
    pub reading: Reading,
}

/// A persisted sensor reading tagged with the stored sensor id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    pub sensor_id: String,
    #[serde(flatten)]
    pub reading: Reading,
}

/// Site coordinates, needed to backfill weather observations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Per-commodity-type equilibrium moisture content table.
///
/// `values` is indexed as `values[humidity_band][temperature_band]`; both
/// range lists hold ascending lower band edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupTableData {
    pub temp_ranges: Vec<f64>,
    pub humidity_ranges: Vec<f64>,
    pub values: Vec<Vec<f64>>,
}
