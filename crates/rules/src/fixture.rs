//! Simulation fixtures: one evaluation batch plus the stored state it runs against.
//!
//! Fixtures are YAML or JSON (picked by file extension) and feed the
//! `trigger-sim` binary.

use std::path::Path;

use cellwatch_core::{CellwatchError, Scope};
use serde::{Deserialize, Serialize};

use crate::engine::EvaluationInputs;
use crate::history::LocalHistory;
use crate::memory::MemorySeed;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationFixture {
    #[serde(flatten)]
    pub seed: MemorySeed,
    pub scope: Scope,
    pub inputs: EvaluationInputs,
    #[serde(default)]
    pub local_history: Option<LocalHistory>,
}

impl SimulationFixture {
    pub fn from_path(path: &Path) -> Result<Self, CellwatchError> {
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&raw)
        } else {
            Self::from_yaml(&raw)
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, CellwatchError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, CellwatchError> {
        serde_yaml::from_str(raw).map_err(|e| CellwatchError::Serialize(e.to_string()))
    }
}
