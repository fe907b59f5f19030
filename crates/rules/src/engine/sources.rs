//! Per-source condition evaluation for one batch.
//!
//! A condition matches if any of its resolved sources satisfies it. Within
//! the SENSOR source, non-median metrics match if any ball does, median
//! metrics compare the median across balls.

use cellwatch_core::{LookupTableData, Reading};
use chrono::DateTime;
use chrono::Utc;

use crate::evaluator::evaluate;
use crate::history::{find_baseline_reading, HistoryCache};
use crate::metrics::{median, value_of};
use crate::schema::{window_start, Condition, ConditionRule, ValueSource};

use super::EvaluationInputs;

pub(crate) struct SourceContext<'a> {
    pub inputs: &'a EvaluationInputs,
    pub history: &'a HistoryCache,
    pub table: Option<&'a LookupTableData>,
}

impl SourceContext<'_> {
    fn now(&self) -> DateTime<Utc> {
        self.inputs.now
    }

    /// OR across the condition's sources.
    pub fn condition_matches(&self, condition: &Condition) -> bool {
        condition
            .sources()
            .into_iter()
            .any(|source| self.source_matches(condition, source))
    }

    fn source_matches(&self, condition: &Condition, source: ValueSource) -> bool {
        match source {
            ValueSource::Sensor => self.sensor_matches(condition),
            ValueSource::Gateway => self.scalar_matches(
                condition,
                self.inputs.gateway_reading.as_ref(),
                self.history.gateway(),
            ),
            ValueSource::Outside => self.scalar_matches(
                condition,
                self.inputs.outside_reading.as_ref(),
                self.history.outside(),
            ),
        }
    }

    fn value(&self, condition: &Condition, reading: &Reading) -> Option<f64> {
        value_of(condition.metric, reading, self.table)
    }

    /// Gateway and outside sources carry a single current reading.
    fn scalar_matches(
        &self,
        condition: &Condition,
        reading: Option<&Reading>,
        history: &[Reading],
    ) -> bool {
        let Some(reading) = reading else {
            return false;
        };
        let current = self.value(condition, reading);
        match &condition.rule {
            ConditionRule::Threshold(_) => evaluate(condition, current, None),
            ConditionRule::Change(spec) => {
                let Some(window) = spec.window() else {
                    return false;
                };
                let baseline = find_baseline_reading(history, window_start(self.now(), window))
                    .and_then(|r| self.value(condition, r));
                evaluate(condition, current, baseline)
            }
        }
    }

    fn sensor_matches(&self, condition: &Condition) -> bool {
        let balls = &self.inputs.ball_readings;
        if balls.is_empty() {
            return false;
        }

        match (&condition.rule, condition.metric.is_median()) {
            (ConditionRule::Threshold(_), false) => balls
                .iter()
                .any(|ball| evaluate(condition, self.value(condition, &ball.reading), None)),

            (ConditionRule::Threshold(_), true) => {
                let current = median(&self.current_values(condition));
                evaluate(condition, current, None)
            }

            (ConditionRule::Change(spec), is_median) => {
                let Some(window) = spec.window() else {
                    return false;
                };
                let start = window_start(self.now(), window);

                // (current, baseline) for every ball whose stored id and
                // baseline reading both resolve.
                let pairs: Vec<(Option<f64>, f64)> = balls
                    .iter()
                    .filter_map(|ball| {
                        let sensor_id = self.inputs.sensor_ids.get(&ball.external_id)?;
                        let baseline = find_baseline_reading(self.history.sensor(sensor_id), start)?;
                        let baseline_value = self.value(condition, baseline)?;
                        Some((self.value(condition, &ball.reading), baseline_value))
                    })
                    .collect();

                if is_median {
                    let baselines: Vec<f64> = pairs.iter().map(|(_, b)| *b).collect();
                    let current = median(&self.current_values(condition));
                    evaluate(condition, current, median(&baselines))
                } else {
                    pairs
                        .iter()
                        .any(|(current, baseline)| evaluate(condition, *current, Some(*baseline)))
                }
            }
        }
    }

    fn current_values(&self, condition: &Condition) -> Vec<f64> {
        self.inputs
            .ball_readings
            .iter()
            .filter_map(|ball| self.value(condition, &ball.reading))
            .filter(|v| !v.is_nan())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::parse_condition;
    use cellwatch_core::BallReading;
    use chrono::Duration;
    use serde_json::json;
    use std::collections::HashMap;

    fn ball(external: &str, temperature: f64, now: DateTime<Utc>) -> BallReading {
        BallReading {
            external_id: external.to_string(),
            reading: Reading::new(temperature, 50.0, now),
        }
    }

    fn inputs(now: DateTime<Utc>, temps: &[(&str, f64)]) -> EvaluationInputs {
        let mut inputs = EvaluationInputs::at(now);
        for (external, t) in temps {
            inputs.ball_readings.push(ball(external, *t, now));
            inputs
                .sensor_ids
                .insert(external.to_string(), format!("sensor-{}", external));
        }
        inputs
    }

    fn history_for(now: DateTime<Utc>, rows: &[(&str, f64)]) -> HistoryCache {
        let mut sensor = HashMap::new();
        for (external, t) in rows {
            sensor.insert(
                format!("sensor-{}", external),
                vec![Reading::new(*t, 50.0, now - Duration::minutes(50))],
            );
        }
        HistoryCache {
            sensor,
            ..HistoryCache::default()
        }
    }

    #[test]
    fn sensor_threshold_matches_any_ball() {
        let now = Utc::now();
        let inputs = inputs(now, &[("a", 20.0), ("b", 31.0)]);
        let history = HistoryCache::default();
        let ctx = SourceContext { inputs: &inputs, history: &history, table: None };
        let c = parse_condition(&json!({
            "id": "t", "metric": "TEMPERATURE", "type": "THRESHOLD", "operator": "ABOVE", "value": 30
        }))
        .unwrap();
        assert!(ctx.condition_matches(&c));
    }

    #[test]
    fn sensor_threshold_median() {
        let now = Utc::now();
        let inputs = inputs(now, &[("a", 20.0), ("b", 31.0), ("c", 22.0)]);
        let history = HistoryCache::default();
        let ctx = SourceContext { inputs: &inputs, history: &history, table: None };
        let c = parse_condition(&json!({
            "id": "t", "metric": "MEDIAN_TEMPERATURE", "type": "THRESHOLD", "operator": "ABOVE", "value": 30
        }))
        .unwrap();
        assert!(!ctx.condition_matches(&c));
    }

    #[test]
    fn sensor_change_per_ball_and_median() {
        let now = Utc::now();
        let inputs = inputs(now, &[("a", 24.0), ("b", 20.0), ("c", 21.0)]);
        // "c" has no baseline and is skipped for change.
        let history = history_for(now, &[("a", 20.0), ("b", 20.0)]);
        let ctx = SourceContext { inputs: &inputs, history: &history, table: None };

        let per_ball = parse_condition(&json!({
            "id": "c", "metric": "TEMPERATURE", "type": "CHANGE",
            "changeDirection": "INCREASE", "changeAmount": 3, "timeWindowHours": 1
        }))
        .unwrap();
        assert!(ctx.condition_matches(&per_ball));

        // median current = 21, median baseline = 20 → delta 1 < 3
        let med = parse_condition(&json!({
            "id": "m", "metric": "MEDIAN_TEMPERATURE", "type": "CHANGE",
            "changeDirection": "INCREASE", "changeAmount": 3, "timeWindowHours": 1
        }))
        .unwrap();
        assert!(!ctx.condition_matches(&med));
    }

    #[test]
    fn unmapped_ball_is_skipped_for_change() {
        let now = Utc::now();
        let mut inputs = inputs(now, &[("a", 30.0)]);
        inputs.sensor_ids.clear();
        let history = history_for(now, &[("a", 20.0)]);
        let ctx = SourceContext { inputs: &inputs, history: &history, table: None };
        let c = parse_condition(&json!({
            "id": "c", "metric": "TEMPERATURE", "type": "CHANGE", "changeAmount": 1, "timeWindowHours": 1
        }))
        .unwrap();
        assert!(!ctx.condition_matches(&c));
    }

    #[test]
    fn missing_scalar_reading_does_not_match() {
        let now = Utc::now();
        let inputs = EvaluationInputs::at(now);
        let history = HistoryCache::default();
        let ctx = SourceContext { inputs: &inputs, history: &history, table: None };
        let c = parse_condition(&json!({
            "id": "g", "metric": "TEMPERATURE", "type": "THRESHOLD",
            "valueSources": ["GATEWAY", "OUTSIDE"], "operator": "BELOW", "value": 100
        }))
        .unwrap();
        assert!(!ctx.condition_matches(&c));
    }

    #[test]
    fn emc_without_table_does_not_match() {
        let now = Utc::now();
        let inputs = inputs(now, &[("a", 25.0)]);
        let history = HistoryCache::default();
        let ctx = SourceContext { inputs: &inputs, history: &history, table: None };
        let c = parse_condition(&json!({
            "id": "e", "metric": "EMC", "type": "THRESHOLD", "operator": "ABOVE", "value": 0
        }))
        .unwrap();
        assert!(!ctx.condition_matches(&c));

        let table = LookupTableData {
            temp_ranges: vec![0.0],
            humidity_ranges: vec![0.0],
            values: vec![vec![13.0]],
        };
        let ctx = SourceContext { inputs: &inputs, history: &history, table: Some(&table) };
        assert!(ctx.condition_matches(&c));
    }
}
