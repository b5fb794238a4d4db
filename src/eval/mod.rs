//! Evaluation loop and run reports.
//!
//! This module provides the core evaluation infrastructure:
//!
//! - [`session::EvalSession`]: one full pass over a labeled dataset
//!   against an external predictor
//! - [`session::EvalConfig`]: configuration for the transform pipeline
//!   and metric accumulation
//! - [`report`]: serde report types and JSON/CSV writers

pub mod report;
pub mod session;

pub use report::{RunReport, SampleResult};
pub use session::{EvalConfig, EvalSession, SampleProgress, ScoreMap, argmax_classes};
