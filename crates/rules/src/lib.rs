//! Trigger evaluation engine for storage-cell telemetry.
//!
//! This crate provides:
//! - Trigger/condition schema with permissive condition parsing
//! - Metric resolution (EMC band lookup, cross-sensor median)
//! - A pure condition evaluator shared by the batch and single-reading paths
//! - History loading bounded by the windows CHANGE conditions need
//! - [`TriggerEngine`], which turns a batch into deduplicated alert candidates
//! - In-memory collaborators and fixtures for simulation

pub mod alert;
pub mod cache;
pub mod context;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod fixture;
pub mod history;
pub mod memory;
pub mod metrics;
pub mod schema;
pub mod store;

pub use engine::{EvaluateOptions, EvaluationInputs, EvaluationOutcome, TriggerEngine};
pub use error::{EngineError, Result};
