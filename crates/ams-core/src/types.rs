//! Common data types for AMS

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Working numeric type of the evaluation pipeline.
pub type Real = f64;

/// Default memory budget for partitioned processing (16 MiB).
pub const DEFAULT_PARTITION_BYTES: usize = 1 << 24;

/// Extra bounds required to place a type in device memory.
///
/// Empty without the `cuda` feature, so host-only builds accept any type.
#[cfg(feature = "cuda")]
pub trait DeviceBound: cudarc::driver::DeviceRepr + cudarc::driver::ValidAsZeroBits {}

#[cfg(feature = "cuda")]
impl<T: cudarc::driver::DeviceRepr + cudarc::driver::ValidAsZeroBits> DeviceBound for T {}

/// Extra bounds required to place a type in device memory.
#[cfg(not(feature = "cuda"))]
pub trait DeviceBound {}

#[cfg(not(feature = "cuda"))]
impl<T> DeviceBound for T {}

/// A plain value that can live in a host or device buffer.
pub trait Element: Copy + Default + Send + Sync + fmt::Debug + 'static + DeviceBound {}

impl Element for bool {}
impl Element for i32 {}
impl Element for u32 {}
impl Element for f32 {}
impl Element for f64 {}

/// A numeric element that converts to and from the working type.
pub trait Scalar: Element + PartialOrd {
    /// Suffix of the device kernels instantiated for this type.
    const DEVICE_SUFFIX: &'static str;

    /// Convert from `f64` (truncating for integers).
    fn from_f64(v: f64) -> Self;

    /// Widen to `f64`.
    fn to_f64(self) -> f64;
}

impl Scalar for f64 {
    const DEVICE_SUFFIX: &'static str = "f64";

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

impl Scalar for f32 {
    const DEVICE_SUFFIX: &'static str = "f32";

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl Scalar for i32 {
    const DEVICE_SUFFIX: &'static str = "i32";

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as i32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

/// Where a buffer's storage lives. Assigned at allocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Residency {
    /// Host (CPU) memory.
    Host,
    /// Accelerator memory.
    Device,
}

impl fmt::Display for Residency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Residency::Host => f.write_str("host"),
            Residency::Device => f.write_str("device"),
        }
    }
}

/// Configuration consumed by one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Execute on an accelerator. Disables the sparse branch.
    pub device_execution: bool,

    /// Pack partially-populated materials before evaluation.
    pub pack_sparse: bool,

    /// Number of materials.
    pub num_materials: usize,

    /// Number of spatial elements.
    pub num_elements: usize,

    /// Quadrature points per element.
    pub num_qpts: usize,

    /// Memory budget (bytes) for one streamed scratch partition.
    pub partition_budget_bytes: usize,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            device_execution: false,
            pack_sparse: true,
            num_materials: 5,
            num_elements: 10_000,
            num_qpts: 64,
            partition_budget_bytes: DEFAULT_PARTITION_BYTES,
        }
    }
}

impl EvaluationConfig {
    /// Configuration for the given problem shape with default flags.
    pub fn with_shape(num_materials: usize, num_elements: usize, num_qpts: usize) -> Self {
        Self { num_materials, num_elements, num_qpts, ..Self::default() }
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject zero counts and an empty partition budget.
    pub fn validate(&self) -> Result<()> {
        if self.num_materials == 0 {
            return Err(Error::Validation("num_materials must be > 0".into()));
        }
        if self.num_elements == 0 {
            return Err(Error::Validation("num_elements must be > 0".into()));
        }
        if self.num_qpts == 0 {
            return Err(Error::Validation("num_qpts must be > 0".into()));
        }
        if self.partition_budget_bytes == 0 {
            return Err(Error::Validation("partition_budget_bytes must be > 0".into()));
        }
        Ok(())
    }

    /// Values per material slab (`num_qpts × num_elements`).
    pub fn samples_per_material(&self) -> usize {
        self.num_qpts * self.num_elements
    }
}
