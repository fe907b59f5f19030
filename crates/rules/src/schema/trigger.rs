//! Stored monitoring triggers.

use cellwatch_core::Severity;
use serde::{Deserialize, Serialize};

use super::composition::ConditionLogic;
use super::condition::{deserialize_conditions, Condition};

/// Which organizations a trigger applies to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeType {
    #[default]
    All,
    Organization,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerStatus {
    #[default]
    Active,
    Deleted,
}

/// A stored rule: conditions, their boolean combination, scope and actions.
///
/// Triggers are authored elsewhere; the engine only reads them. The
/// `conditions` field accepts any stored value and keeps the entries that
/// parse (see [`super::retain_valid_conditions`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub id: String,
    pub name: String,
    #[serde(default = "default_severity")]
    pub severity: Severity,
    #[serde(default)]
    pub scope_type: ScopeType,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub commodity_type_id: Option<String>,
    /// `None` means the trigger applies to any sensor.
    #[serde(default)]
    pub sensor_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_conditions")]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub condition_logic: ConditionLogic,
    /// Action metadata, opaque to the engine.
    #[serde(default)]
    pub actions: serde_json::Value,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub status: TriggerStatus,
}

fn default_severity() -> Severity {
    Severity::Medium
}

fn default_true() -> bool {
    true
}

impl Trigger {
    /// Active flag set and not soft-deleted.
    pub fn is_live(&self) -> bool {
        self.is_active && self.status == TriggerStatus::Active
    }
}
