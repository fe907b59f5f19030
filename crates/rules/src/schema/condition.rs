//! Trigger conditions and their permissive parser.
//!
//! Stored conditions are loosely shaped JSON: every field is optional and
//! which ones matter depends on `type` and `sourceType`. Parsing goes
//! through [`RawCondition`] and produces a typed [`Condition`], or a
//! [`DropReason`] when the entry lacks an id, metric or type. Dropped
//! entries are never an error for the trigger that carries them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::kind::{ChangeDirection, ConditionType, Metric, ThresholdOperator, ValueSource};

// ── Typed condition ─────────────────────────────────────────────────

/// One validated clause of a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RawCondition", try_from = "RawCondition")]
pub struct Condition {
    pub id: String,
    pub metric: Metric,
    pub source: SourceSelector,
    pub rule: ConditionRule,
}

/// Type-specific part of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionRule {
    Threshold(ThresholdSpec),
    Change(ChangeSpec),
}

/// A static bound. Operator and value stay optional: a threshold missing
/// either never matches, but the condition itself is still valid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdSpec {
    pub operator: Option<ThresholdOperator>,
    pub value: Option<f64>,
    pub secondary_value: Option<f64>,
}

/// A delta between the current value and the window's baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSpec {
    pub direction: ChangeDirection,
    /// Minimum magnitude of the delta; 0 when unset.
    pub amount: f64,
    pub window_hours: Option<f64>,
}

impl ChangeSpec {
    /// The look-back window, if the condition carries a usable one.
    pub fn window(&self) -> Option<Duration> {
        self.window_hours
            .filter(|h| h.is_finite() && *h > 0.0)
            .map(hours_to_duration)
    }
}

/// Convert fractional hours to a chrono duration (millisecond precision).
///
/// Out-of-range values saturate instead of panicking.
pub fn hours_to_duration(hours: f64) -> Duration {
    let millis = (hours * 3_600_000.0).round() as i64;
    Duration::try_milliseconds(millis).unwrap_or_else(|| {
        if millis < 0 {
            Duration::zero()
        } else {
            Duration::MAX
        }
    })
}

/// Start of a look-back window ending at `now`. Windows reaching past the
/// earliest representable instant start there.
pub fn window_start(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Which sources a condition reads from, as stored.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSelector {
    /// `sourceType` set explicitly.
    Explicit(ValueSource),
    /// Legacy `valueSources` list; sources are OR'd together.
    Legacy(Vec<ValueSource>),
    /// Neither field present: in-cell sensors.
    Default,
}

impl SourceSelector {
    /// Resolve to the concrete list of sources to evaluate, in order.
    pub fn resolve(&self) -> Vec<ValueSource> {
        match self {
            SourceSelector::Explicit(source) => vec![*source],
            SourceSelector::Legacy(sources) if !sources.is_empty() => sources.clone(),
            SourceSelector::Legacy(_) | SourceSelector::Default => vec![ValueSource::Sensor],
        }
    }
}

impl Condition {
    pub fn condition_type(&self) -> ConditionType {
        match self.rule {
            ConditionRule::Threshold(_) => ConditionType::Threshold,
            ConditionRule::Change(_) => ConditionType::Change,
        }
    }

    pub fn sources(&self) -> Vec<ValueSource> {
        self.source.resolve()
    }

    pub fn as_change(&self) -> Option<&ChangeSpec> {
        match &self.rule {
            ConditionRule::Change(spec) => Some(spec),
            ConditionRule::Threshold(_) => None,
        }
    }

    pub fn as_threshold(&self) -> Option<&ThresholdSpec> {
        match &self.rule {
            ConditionRule::Threshold(spec) => Some(spec),
            ConditionRule::Change(_) => None,
        }
    }
}

// ── Raw (stored) shape ──────────────────────────────────────────────

/// The stored, all-optional shape of a condition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub condition_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_sources: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window_hours: Option<f64>,
}

/// Why a stored condition entry was dropped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DropReason {
    #[error("malformed condition: {0}")]
    Malformed(String),
    #[error("condition has no id")]
    MissingId,
    #[error("condition has no metric")]
    MissingMetric,
    #[error("{0}")]
    UnknownMetric(String),
    #[error("condition has no type")]
    MissingType,
    #[error("{0}")]
    UnknownType(String),
}

impl TryFrom<RawCondition> for Condition {
    type Error = DropReason;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .filter(|s| !s.trim().is_empty())
            .ok_or(DropReason::MissingId)?;
        let metric: Metric = raw
            .metric
            .as_deref()
            .ok_or(DropReason::MissingMetric)?
            .parse()
            .map_err(DropReason::UnknownMetric)?;
        let condition_type: ConditionType = raw
            .condition_type
            .as_deref()
            .ok_or(DropReason::MissingType)?
            .parse()
            .map_err(DropReason::UnknownType)?;

        let source = parse_source_selector(raw.source_type.as_deref(), raw.value_sources.as_deref());

        let rule = match condition_type {
            ConditionType::Threshold => ConditionRule::Threshold(ThresholdSpec {
                operator: raw.operator.as_deref().and_then(|op| op.parse().ok()),
                value: raw.value,
                secondary_value: raw.secondary_value,
            }),
            ConditionType::Change => ConditionRule::Change(ChangeSpec {
                direction: raw
                    .change_direction
                    .as_deref()
                    .and_then(|d| d.parse().ok())
                    .unwrap_or_default(),
                amount: raw.change_amount.unwrap_or(0.0),
                window_hours: raw.time_window_hours,
            }),
        };

        Ok(Condition {
            id,
            metric,
            source,
            rule,
        })
    }
}

impl From<Condition> for RawCondition {
    fn from(c: Condition) -> Self {
        let (source_type, value_sources) = match &c.source {
            SourceSelector::Explicit(s) => (Some(s.as_str().to_string()), None),
            SourceSelector::Legacy(list) => (
                None,
                Some(list.iter().map(|s| s.as_str().to_string()).collect()),
            ),
            SourceSelector::Default => (None, None),
        };
        let mut raw = RawCondition {
            id: Some(c.id),
            metric: Some(c.metric.as_str().to_string()),
            source_type,
            value_sources,
            ..RawCondition::default()
        };
        match c.rule {
            ConditionRule::Threshold(spec) => {
                raw.condition_type = Some("THRESHOLD".to_string());
                raw.operator = spec.operator.map(|op| op.as_str().to_string());
                raw.value = spec.value;
                raw.secondary_value = spec.secondary_value;
            }
            ConditionRule::Change(spec) => {
                raw.condition_type = Some("CHANGE".to_string());
                raw.change_direction = Some(spec.direction.as_str().to_string());
                raw.change_amount = Some(spec.amount);
                raw.time_window_hours = spec.window_hours;
            }
        }
        raw
    }
}

/// `sourceType` wins over the legacy list. Legacy entries only ever named
/// GATEWAY or OUTSIDE; anything else is ignored.
fn parse_source_selector(source_type: Option<&str>, value_sources: Option<&[String]>) -> SourceSelector {
    if let Some(explicit) = source_type.and_then(|s| s.parse::<ValueSource>().ok()) {
        return SourceSelector::Explicit(explicit);
    }
    if let Some(list) = value_sources {
        let mapped: Vec<ValueSource> = list
            .iter()
            .filter_map(|s| match s.parse::<ValueSource>() {
                Ok(ValueSource::Gateway) => Some(ValueSource::Gateway),
                Ok(ValueSource::Outside) => Some(ValueSource::Outside),
                _ => None,
            })
            .collect();
        if !mapped.is_empty() {
            return SourceSelector::Legacy(mapped);
        }
    }
    SourceSelector::Default
}

// ── Permissive list parsing ─────────────────────────────────────────

/// Outcome of parsing one entry of a stored condition array.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCondition {
    Valid(Condition),
    Dropped { index: usize, reason: DropReason },
}

/// Parse a single stored condition value.
pub fn parse_condition(value: &serde_json::Value) -> Result<Condition, DropReason> {
    let raw: RawCondition = serde_json::from_value(value.clone())
        .map_err(|e| DropReason::Malformed(e.to_string()))?;
    Condition::try_from(raw)
}

/// Parse every entry of a stored condition array, keeping the outcome of each.
///
/// A value that is not an array (including `null`) yields no entries.
pub fn parse_conditions(value: &serde_json::Value) -> Vec<ParsedCondition> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| match parse_condition(item) {
            Ok(condition) => ParsedCondition::Valid(condition),
            Err(reason) => ParsedCondition::Dropped { index, reason },
        })
        .collect()
}

/// Keep only the valid conditions, dropping the rest with a debug log.
pub fn retain_valid_conditions(value: &serde_json::Value) -> Vec<Condition> {
    parse_conditions(value)
        .into_iter()
        .filter_map(|parsed| match parsed {
            ParsedCondition::Valid(c) => Some(c),
            ParsedCondition::Dropped { index, reason } => {
                debug!(index, reason = %reason, "dropping invalid trigger condition");
                None
            }
        })
        .collect()
}

/// serde adapter: accept any value for a condition list and keep the valid entries.
pub(crate) fn deserialize_conditions<'de, D>(deserializer: D) -> Result<Vec<Condition>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(retain_valid_conditions(&value))
}
