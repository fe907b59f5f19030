//! Engine error type.

use std::fmt;

use crate::store::StoreError;

/// Which collaborator a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    TriggerStore,
    ReadingStore,
    WeatherStore,
    LookupTableStore,
    AlertStore,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collaborator::TriggerStore => write!(f, "trigger store"),
            Collaborator::ReadingStore => write!(f, "reading store"),
            Collaborator::WeatherStore => write!(f, "weather store"),
            Collaborator::LookupTableStore => write!(f, "lookup-table store"),
            Collaborator::AlertStore => write!(f, "alert store"),
        }
    }
}

/// Errors surfaced by [`crate::engine::TriggerEngine`].
///
/// Only collaborator failures propagate; missing data never does.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{collaborator} error: {source}")]
    Store {
        collaborator: Collaborator,
        #[source]
        source: StoreError,
    },
}

impl EngineError {
    /// Adapter for `map_err`: tag a store error with its collaborator.
    pub fn store(collaborator: Collaborator) -> impl FnOnce(StoreError) -> EngineError {
        move |source| EngineError::Store {
            collaborator,
            source,
        }
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
