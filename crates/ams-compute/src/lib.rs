//! # ams-compute
//!
//! Memory and packing backends for AMS.
//!
//! This crate provides:
//! - **Memory broker** ([`MemoryBroker`]): residency-tagged allocation,
//!   cross-residency copies, type casts, feature linearization and
//!   partition sizing
//! - **Sparsity packer** ([`pack`]): predicate-driven compaction of
//!   parallel arrays into a dense subset and back
//! - **CUDA backend** (NVIDIA) - feature-gated behind `cuda`
//!
//! ## Architecture
//!
//! Every [`Buffer`] carries its residency in its variant. Host/device
//! dispatch is a single runtime decision made on that tag; whether a
//! device exists at all is resolved once, when the broker is built.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod pack;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use memory::{Buffer, CopyKind, MemoryBroker, cast, cast_back, linearize_host, partition_size};
pub use pack::SparseIndex;
