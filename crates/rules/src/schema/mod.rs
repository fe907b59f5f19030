//! Trigger document types with serde deserialization.
//!
//! - `Trigger`: a stored monitoring rule (scope, severity, logic, conditions)
//! - `Condition`: one clause, a sum type over THRESHOLD and CHANGE rules
//! - permissive condition parsing that drops malformed entries

mod composition;
mod condition;
mod kind;
mod trigger;

pub use composition::*;
pub use condition::*;
pub use kind::*;
pub use trigger::*;
