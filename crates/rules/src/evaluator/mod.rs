//! Condition evaluation.
//!
//! [`evaluate`] is the one primitive that decides THRESHOLD and CHANGE
//! semantics. The multi-source engine and the single-reading path
//! ([`evaluate_snapshot`], [`evaluate_trigger_snapshot`]) both go through
//! it, so the arithmetic cannot drift between them.

mod composition;

use std::collections::HashMap;

use crate::metrics::MetricSnapshot;
use crate::schema::{
    ChangeDirection, ChangeSpec, Condition, ConditionRule, ThresholdOperator, ThresholdSpec,
    Trigger, ValueSource,
};

pub use composition::combine;

// ── Core primitive ──────────────────────────────────────────────────

/// Decide whether `condition` holds for `current` (and `previous` for CHANGE).
///
/// Missing or NaN inputs never match; this function never panics.
pub fn evaluate(condition: &Condition, current: Option<f64>, previous: Option<f64>) -> bool {
    let Some(current) = current.filter(|v| !v.is_nan()) else {
        return false;
    };
    match &condition.rule {
        ConditionRule::Threshold(spec) => check_threshold(spec, current),
        ConditionRule::Change(spec) => match previous.filter(|v| !v.is_nan()) {
            Some(previous) => check_change(spec, current, previous),
            None => false,
        },
    }
}

fn check_threshold(spec: &ThresholdSpec, current: f64) -> bool {
    let (Some(operator), Some(value)) = (spec.operator, spec.value) else {
        return false;
    };
    match operator {
        ThresholdOperator::Above => current > value,
        ThresholdOperator::Below => current < value,
        ThresholdOperator::Equals => current == value,
        ThresholdOperator::Between => match spec.secondary_value {
            Some(secondary) => {
                let low = value.min(secondary);
                let high = value.max(secondary);
                current >= low && current <= high
            }
            None => false,
        },
    }
}

fn check_change(spec: &ChangeSpec, current: f64, previous: f64) -> bool {
    let delta = current - previous;
    match spec.direction {
        ChangeDirection::Increase => delta >= spec.amount,
        ChangeDirection::Decrease => delta <= -spec.amount,
        ChangeDirection::Any => delta.abs() >= spec.amount,
    }
}

// ── Single-reading path ─────────────────────────────────────────────

/// Evaluate a condition against one sensor's current and baseline metric maps.
pub fn evaluate_snapshot(
    condition: &Condition,
    current: &MetricSnapshot,
    baseline: Option<&MetricSnapshot>,
) -> bool {
    evaluate(
        condition,
        current.get(condition.metric),
        baseline.and_then(|b| b.get(condition.metric)),
    )
}

/// Decide whether a whole trigger matches one sensor's pre-resolved values.
///
/// `baselines` is keyed by condition id. Only conditions that read from
/// in-cell sensors can match here; gateway/outside clauses count as
/// unmatched because a single sensor snapshot carries no such values.
pub fn evaluate_trigger_snapshot(
    trigger: &Trigger,
    current: &MetricSnapshot,
    baselines: &HashMap<String, MetricSnapshot>,
) -> bool {
    let results: Vec<bool> = trigger
        .conditions
        .iter()
        .map(|condition| {
            condition.sources().contains(&ValueSource::Sensor)
                && evaluate_snapshot(condition, current, baselines.get(&condition.id))
        })
        .collect();
    combine(trigger.condition_logic, &results)
}

// ── Tests ───────────────────────────────────────────────────────────
