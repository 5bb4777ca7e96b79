//! # ams-core
//!
//! Core types for AMS material-state evaluation.
//!
//! This crate provides:
//! - [`Error`] / [`Result`] shared by every crate in the workspace
//! - Element traits ([`Element`], [`Scalar`]) and the working type [`Real`]
//! - [`Residency`] tags for host/device buffers
//! - [`EvaluationConfig`], the configuration surface of one evaluation
//! - Collaborator traits consumed by the orchestrator
//!
//! ## Architecture
//!
//! The orchestrator (ams-workflow) depends on the collaborator traits
//! defined here, NOT on concrete surrogate, classifier or solver
//! implementations.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{EosOutputs, OfflineStore, PhysicsSolver, SurrogateModel, UncertaintyClassifier};
pub use types::{DeviceBound, Element, EvaluationConfig, Real, Residency, Scalar};
