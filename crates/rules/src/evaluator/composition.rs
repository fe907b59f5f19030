//! AND/OR combination of per-condition results.

use crate::schema::ConditionLogic;

/// Combine condition results under the trigger's logic.
///
/// AND needs at least one condition and all of them matched; OR needs any.
pub fn combine(logic: ConditionLogic, results: &[bool]) -> bool {
    match logic {
        ConditionLogic::And => !results.is_empty() && results.iter().all(|matched| *matched),
        ConditionLogic::Or => results.iter().any(|matched| *matched),
    }
}
