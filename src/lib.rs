// src/lib.rs

//! Cohort analysis of wiki contribution histories.
//!
//! Rows of per-contributor activity are streamed once through a
//! [`CohortEngine`], which sums them into cohort × time-bucket matrices.
//! The matrices are saved as flat text and drawn as WikiPride charts.

pub mod analyzer;
pub mod bots;
pub mod cohort;
pub mod config;
pub mod error;
pub mod model;
pub mod renderer;
pub mod report;
pub mod source;
pub mod store;
pub mod time_index;

pub use cohort::{CohortEngine, CohortKind};
pub use config::{EngineConfig, Settings};
pub use error::CohortError;
