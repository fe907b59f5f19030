//! Enumerations used by trigger conditions.
//!
//! Every enum serializes in SCREAMING_SNAKE_CASE to match stored trigger
//! documents and parses from the same spelling via [`FromStr`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The quantity a condition observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Metric {
    Temperature,
    Humidity,
    /// Equilibrium moisture content, derived from a commodity lookup table.
    Emc,
    MedianTemperature,
    MedianHumidity,
}

impl Metric {
    /// Median metrics aggregate across every ball in a cell.
    pub fn is_median(self) -> bool {
        matches!(self, Metric::MedianTemperature | Metric::MedianHumidity)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Temperature => "TEMPERATURE",
            Metric::Humidity => "HUMIDITY",
            Metric::Emc => "EMC",
            Metric::MedianTemperature => "MEDIAN_TEMPERATURE",
            Metric::MedianHumidity => "MEDIAN_HUMIDITY",
        }
    }

    /// Label used in human-readable alert descriptions.
    pub fn label(self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature",
            Metric::Humidity => "Humidity",
            Metric::Emc => "EMC",
            Metric::MedianTemperature => "Median temperature",
            Metric::MedianHumidity => "Median humidity",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TEMPERATURE" => Ok(Metric::Temperature),
            "HUMIDITY" => Ok(Metric::Humidity),
            "EMC" => Ok(Metric::Emc),
            "MEDIAN_TEMPERATURE" => Ok(Metric::MedianTemperature),
            "MEDIAN_HUMIDITY" => Ok(Metric::MedianHumidity),
            other => Err(format!("unknown metric: '{}'", other)),
        }
    }
}

/// Discriminant of a condition: static bound or delta over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionType {
    Threshold,
    Change,
}

impl FromStr for ConditionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "THRESHOLD" => Ok(ConditionType::Threshold),
            "CHANGE" => Ok(ConditionType::Change),
            other => Err(format!("unknown condition type: '{}'", other)),
        }
    }
}

/// Where a condition's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueSource {
    /// Individual in-cell sensors ("balls").
    Sensor,
    /// The cell's aggregate gateway reading.
    Gateway,
    /// Outside weather observations for the site.
    Outside,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueSource::Sensor => "SENSOR",
            ValueSource::Gateway => "GATEWAY",
            ValueSource::Outside => "OUTSIDE",
        }
    }
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENSOR" => Ok(ValueSource::Sensor),
            "GATEWAY" => Ok(ValueSource::Gateway),
            "OUTSIDE" => Ok(ValueSource::Outside),
            other => Err(format!("unknown value source: '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThresholdOperator {
    Above,
    Below,
    Equals,
    Between,
}

impl ThresholdOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdOperator::Above => "ABOVE",
            ThresholdOperator::Below => "BELOW",
            ThresholdOperator::Equals => "EQUALS",
            ThresholdOperator::Between => "BETWEEN",
        }
    }
}

impl FromStr for ThresholdOperator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ABOVE" => Ok(ThresholdOperator::Above),
            "BELOW" => Ok(ThresholdOperator::Below),
            "EQUALS" => Ok(ThresholdOperator::Equals),
            "BETWEEN" => Ok(ThresholdOperator::Between),
            other => Err(format!("unknown threshold operator: '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeDirection {
    Increase,
    Decrease,
    #[default]
    Any,
}

impl ChangeDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeDirection::Increase => "INCREASE",
            ChangeDirection::Decrease => "DECREASE",
            ChangeDirection::Any => "ANY",
        }
    }
}

impl FromStr for ChangeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INCREASE" => Ok(ChangeDirection::Increase),
            "DECREASE" => Ok(ChangeDirection::Decrease),
            "ANY" => Ok(ChangeDirection::Any),
            other => Err(format!("unknown change direction: '{}'", other)),
        }
    }
}
