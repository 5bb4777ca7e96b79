//! Dense/sparse strategy selection and evaluation reports.

use ams_core::EvaluationConfig;
use serde::Serialize;

/// How one material is evaluated in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// No active element: nothing allocated, no collaborator called.
    Skipped,
    /// Active elements are compacted, evaluated, and scattered back.
    Sparse,
    /// Every element of the material slab is evaluated in place.
    Dense,
}

impl Strategy {
    /// Pick the strategy for a material with `active` of `total` elements present.
    pub fn choose(config: &EvaluationConfig, active: usize, total: usize) -> Self {
        if active == 0 {
            Strategy::Skipped
        } else if !config.device_execution && config.pack_sparse && active < total {
            Strategy::Sparse
        } else {
            Strategy::Dense
        }
    }
}

/// Outcome for one material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaterialReport {
    /// Material index.
    pub material: usize,
    /// Strategy applied.
    pub strategy: Strategy,
    /// Elements where the material is present.
    pub active_elements: usize,
}

/// Outcome of one [`crate::Evaluator::evaluate`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationReport {
    /// One entry per material, in material order.
    pub materials: Vec<MaterialReport>,
}

impl EvaluationReport {
    /// Number of materials evaluated with `strategy`.
    pub fn count(&self, strategy: Strategy) -> usize {
        self.materials.iter().filter(|r| r.strategy == strategy).count()
    }

    /// Total active elements over all materials.
    pub fn active_elements(&self) -> usize {
        self.materials.iter().map(|r| r.active_elements).sum()
    }
}
