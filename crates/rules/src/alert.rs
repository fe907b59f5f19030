//! Alert candidates and their localization-ready description payload.

use cellwatch_core::{Scope, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::unit;
use crate::schema::{
    ChangeDirection, Condition, ConditionLogic, ConditionRule, ConditionType, Metric,
    ThresholdOperator, Trigger, ValueSource,
};

/// Translation key for the alert title.
pub const TITLE_KEY: &str = "alerts.trigger.title";
/// Translation key for the alert description.
pub const DESCRIPTION_KEY: &str = "alerts.trigger.description";

// ── Stored alerts ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    InProgress,
    Resolved,
    Dismissed,
}

impl AlertStatus {
    /// Statuses that block a new alert for the same trigger/cell/sensor.
    pub fn is_open(self) -> bool {
        matches!(
            self,
            AlertStatus::Open | AlertStatus::Acknowledged | AlertStatus::InProgress
        )
    }
}

/// The part of a persisted alert the engine needs for deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAlert {
    pub id: String,
    pub trigger_id: String,
    pub cell_id: String,
    #[serde(default)]
    pub sensor_id: Option<String>,
    pub status: AlertStatus,
}

// ── Candidates ──────────────────────────────────────────────────────

/// A proposed alert, persisted at most once per trigger per batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertCandidate {
    pub trigger_id: String,
    #[serde(flatten)]
    pub scope: Scope,
    pub title: String,
    pub description: String,
    pub title_key: String,
    pub description_key: String,
    pub description_params: DescriptionParams,
    pub severity: Severity,
    /// Value of the first matched THRESHOLD condition, if any.
    pub threshold_value: Option<f64>,
    pub unit: Option<String>,
    pub triggered_at: DateTime<Utc>,
}

impl AlertCandidate {
    /// Deduplication key: (trigger, cell, sensor).
    pub fn dedup_key(&self) -> (String, Option<String>, Option<String>) {
        (
            self.trigger_id.clone(),
            self.scope.cell_id.clone(),
            self.scope.sensor_id.clone(),
        )
    }
}

/// Parameters a client substitutes into [`DESCRIPTION_KEY`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionParams {
    pub trigger_name: String,
    pub condition_logic: ConditionLogic,
    pub conditions: Vec<ConditionSummary>,
}

/// One matched condition, flattened for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionSummary {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub metric: Metric,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<ThresholdOperator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<ChangeDirection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_hours: Option<f64>,
    pub unit: String,
    pub sources: Vec<ValueSource>,
}

impl ConditionSummary {
    pub fn from_condition(condition: &Condition) -> Self {
        let mut summary = ConditionSummary {
            condition_type: condition.condition_type(),
            metric: condition.metric,
            operator: None,
            value: None,
            secondary_value: None,
            direction: None,
            amount: None,
            window_hours: None,
            unit: unit(condition.metric).to_string(),
            sources: condition.sources(),
        };
        match &condition.rule {
            ConditionRule::Threshold(spec) => {
                summary.operator = spec.operator;
                summary.value = spec.value;
                summary.secondary_value = spec.secondary_value;
            }
            ConditionRule::Change(spec) => {
                summary.direction = Some(spec.direction);
                summary.amount = Some(spec.amount);
                summary.window_hours = spec.window_hours;
            }
        }
        summary
    }

    /// English rendering, used as the fallback description text.
    pub fn describe(&self) -> String {
        let label = self.metric.label();
        let u = &self.unit;
        let mut text = match self.condition_type {
            ConditionType::Threshold => match (self.operator, self.value) {
                (Some(ThresholdOperator::Between), Some(v)) => match self.secondary_value {
                    Some(s) => format!("{} between {}{} and {}{}", label, v.min(s), u, v.max(s), u),
                    None => format!("{} between {}{} and ?", label, v, u),
                },
                (Some(op), Some(v)) => {
                    let word = match op {
                        ThresholdOperator::Above => "above",
                        ThresholdOperator::Below => "below",
                        _ => "equal to",
                    };
                    format!("{} {} {}{}", label, word, v, u)
                }
                _ => format!("{} threshold", label),
            },
            ConditionType::Change => {
                let verb = match self.direction.unwrap_or_default() {
                    ChangeDirection::Increase => "increased",
                    ChangeDirection::Decrease => "decreased",
                    ChangeDirection::Any => "changed",
                };
                let amount = self.amount.unwrap_or(0.0);
                match self.window_hours {
                    Some(h) => format!("{} {} by at least {}{} within {}h", label, verb, amount, u, h),
                    None => format!("{} {} by at least {}{}", label, verb, amount, u),
                }
            }
        };
        if self.sources != [ValueSource::Sensor] {
            let names: Vec<String> = self
                .sources
                .iter()
                .map(|s| s.as_str().to_ascii_lowercase())
                .collect();
            text.push_str(&format!(" ({})", names.join(", ")));
        }
        text
    }
}

/// Build the candidate for a matched trigger from its matched conditions.
pub fn build_candidate(
    trigger: &Trigger,
    scope: &Scope,
    matched: &[&Condition],
    now: DateTime<Utc>,
) -> AlertCandidate {
    let summaries: Vec<ConditionSummary> = matched
        .iter()
        .map(|c| ConditionSummary::from_condition(c))
        .collect();

    let joiner = match trigger.condition_logic {
        ConditionLogic::And => " and ",
        ConditionLogic::Or => " or ",
    };
    let description = format!(
        "{}: {}",
        trigger.name,
        summaries
            .iter()
            .map(ConditionSummary::describe)
            .collect::<Vec<_>>()
            .join(joiner)
    );

    let representative = matched.iter().find_map(|c| {
        let spec = c.as_threshold()?;
        spec.value.map(|v| (v, unit(c.metric).to_string()))
    });

    AlertCandidate {
        trigger_id: trigger.id.clone(),
        scope: scope.clone(),
        title: trigger.name.clone(),
        description,
        title_key: TITLE_KEY.to_string(),
        description_key: DESCRIPTION_KEY.to_string(),
        description_params: DescriptionParams {
            trigger_name: trigger.name.clone(),
            condition_logic: trigger.condition_logic,
            conditions: summaries,
        },
        severity: trigger.severity,
        threshold_value: representative.as_ref().map(|(v, _)| *v),
        unit: representative.map(|(_, u)| u),
        triggered_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trigger() -> Trigger {
        serde_json::from_value(json!({
            "id": "trg-1",
            "name": "Cell overheating",
            "severity": "CRITICAL",
            "conditionLogic": "AND",
            "conditions": [
                {"id": "c1", "metric": "TEMPERATURE", "type": "CHANGE",
                 "changeDirection": "INCREASE", "changeAmount": 3, "timeWindowHours": 2,
                 "sourceType": "GATEWAY"},
                {"id": "c2", "metric": "HUMIDITY", "type": "THRESHOLD",
                 "operator": "BETWEEN", "value": 80, "secondaryValue": 60}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn candidate_carries_representative_threshold() {
        let t = trigger();
        let matched: Vec<&Condition> = t.conditions.iter().collect();
        let scope = Scope {
            cell_id: Some("cell-1".to_string()),
            site_id: Some("site-1".to_string()),
            ..Scope::default()
        };
        let candidate = build_candidate(&t, &scope, &matched, Utc::now());

        assert_eq!(candidate.trigger_id, "trg-1");
        assert_eq!(candidate.severity, Severity::Critical);
        assert_eq!(candidate.threshold_value, Some(80.0));
        assert_eq!(candidate.unit.as_deref(), Some("%"));
        assert_eq!(candidate.description_params.conditions.len(), 2);
        assert_eq!(
            candidate.description,
            "Cell overheating: Temperature increased by at least 3°C within 2h (gateway) \
             and Humidity between 60% and 80%"
        );
        assert_eq!(
            candidate.dedup_key(),
            ("trg-1".to_string(), Some("cell-1".to_string()), None)
        );
    }

    #[test]
    fn candidate_without_threshold_has_no_representative() {
        let t = trigger();
        let matched = vec![&t.conditions[0]];
        let candidate = build_candidate(&t, &Scope::default(), &matched, Utc::now());
        assert_eq!(candidate.threshold_value, None);
        assert_eq!(candidate.unit, None);
    }

    #[test]
    fn params_serialize_for_localization() {
        let t = trigger();
        let matched: Vec<&Condition> = t.conditions.iter().collect();
        let candidate = build_candidate(&t, &Scope::default(), &matched, Utc::now());
        let value = serde_json::to_value(&candidate).unwrap();

        assert_eq!(value["descriptionKey"], DESCRIPTION_KEY);
        let first = &value["descriptionParams"]["conditions"][0];
        assert_eq!(first["type"], "CHANGE");
        assert_eq!(first["direction"], "INCREASE");
        assert_eq!(first["sources"], json!(["GATEWAY"]));
        assert!(first.get("operator").is_none());
    }

    #[test]
    fn open_statuses() {
        assert!(AlertStatus::Open.is_open());
        assert!(AlertStatus::InProgress.is_open());
        assert!(!AlertStatus::Resolved.is_open());
    }
}
