//! # ams-workflow
//!
//! One evaluation cycle of AMS across all materials.
//!
//! This crate provides:
//! - Field tensors and the indicator matrix ([`tensor`])
//! - Per-material dense/sparse [`Strategy`] selection
//! - The [`Evaluator`] orchestrator: uncertainty check, surrogate
//!   inference, filtered physics fallback, scatter back
//! - [`filtered::evaluate_filtered_by_packing`], the filtered physics
//!   contract built on an unconditional solver
//! - [`store::MemoryStore`], an in-memory offline store
//!
//! ## Architecture
//!
//! The orchestrator depends on the collaborator traits from ams-core and
//! on the broker/packer from ams-compute, NOT on concrete models.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Filtered physics evaluation on top of an unconditional solver.
pub mod filtered;
/// Evaluation orchestrator and per-material collaborator slots.
pub mod orchestrator;
/// In-memory offline store.
pub mod store;
/// Dense/sparse strategy selection and evaluation reports.
pub mod strategy;
/// Field tensors and the indicator matrix.
pub mod tensor;

pub use filtered::evaluate_filtered_by_packing;
pub use orchestrator::{Evaluator, MaterialSlot};
pub use store::MemoryStore;
pub use strategy::{EvaluationReport, MaterialReport, Strategy};
pub use tensor::{EosFields, FieldTensor, IndicatorMatrix};
