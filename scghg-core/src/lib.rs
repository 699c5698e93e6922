//! Aggregation of Social Cost of Greenhouse Gases (SC-GHG) estimates.
//!
//! Marginal damages and discount factors produced by a valuation engine are
//! reduced to SC-GHG values for every cell of a parameter sweep, merged with
//! their provenance and written per gas.

pub mod adjustment;
pub mod combine;
pub mod config;
pub mod engine;
pub mod gases;
pub mod labeled;
pub mod output;
pub mod provenance;
pub mod sectors;
pub mod sweep;

pub mod errors;

pub use errors::{EngineError, ScghgError, ScghgResult};
