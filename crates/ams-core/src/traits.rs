//! Collaborator traits consumed by the orchestrator
//!
//! The orchestrator drives three collaborators per material (uncertainty
//! classifier, surrogate, physics solver) plus an optional offline store.
//! Only their call contracts live here; all buffers are host slices whose
//! length is the sample count of the call.

use crate::{Real, Result};

/// The four state quantities written by a surrogate or physics evaluation.
#[derive(Debug)]
pub struct EosOutputs<'a> {
    /// Pressure.
    pub pressure: &'a mut [Real],
    /// Squared sound speed.
    pub soundspeed2: &'a mut [Real],
    /// Bulk modulus.
    pub bulkmod: &'a mut [Real],
    /// Temperature.
    pub temperature: &'a mut [Real],
}

impl<'a> EosOutputs<'a> {
    /// Number of output fields.
    pub const FIELDS: usize = 4;

    /// Bundle four output slices.
    pub fn new(
        pressure: &'a mut [Real],
        soundspeed2: &'a mut [Real],
        bulkmod: &'a mut [Real],
        temperature: &'a mut [Real],
    ) -> Self {
        Self { pressure, soundspeed2, bulkmod, temperature }
    }

    /// Length shared by all four slices, or `None` if they disagree.
    pub fn common_len(&self) -> Option<usize> {
        let n = self.pressure.len();
        (self.soundspeed2.len() == n && self.bulkmod.len() == n && self.temperature.len() == n)
            .then_some(n)
    }

    /// Shorter-lived view of the same slices.
    pub fn reborrow(&mut self) -> EosOutputs<'_> {
        EosOutputs {
            pressure: &mut *self.pressure,
            soundspeed2: &mut *self.soundspeed2,
            bulkmod: &mut *self.bulkmod,
            temperature: &mut *self.temperature,
        }
    }

    /// The four slices as an array, in declaration order.
    pub fn as_array(&mut self) -> [&mut [Real]; 4] {
        [
            &mut *self.pressure,
            &mut *self.soundspeed2,
            &mut *self.bulkmod,
            &mut *self.temperature,
        ]
    }
}

/// Cheap classifier flagging samples where the surrogate cannot be trusted.
pub trait UncertaintyClassifier: Send {
    /// Write `true` into `uncertain[i]` for every untrustworthy sample.
    ///
    /// `uncertain` is cleared to `false` before the call.
    fn evaluate(&mut self, density: &[Real], energy: &[Real], uncertain: &mut [bool])
    -> Result<()>;
}

/// Trained approximation: generic N-input / M-output elementwise model.
pub trait SurrogateModel: Send {
    /// Evaluate every sample. All slices share one length.
    fn evaluate(&mut self, inputs: &[&[Real]], outputs: &mut [&mut [Real]]) -> Result<()>;
}

/// Expensive physics (equation of state) solver.
pub trait PhysicsSolver: Send {
    /// Unconditional evaluation of every sample.
    fn evaluate(&mut self, density: &[Real], energy: &[Real], outputs: EosOutputs<'_>)
    -> Result<()>;

    /// Evaluate only where `flags[i]` is true; other outputs stay untouched.
    fn evaluate_filtered(
        &mut self,
        density: &[Real],
        energy: &[Real],
        flags: &[bool],
        outputs: EosOutputs<'_>,
    ) -> Result<()>;
}

/// Persistence of evaluated samples. Must not influence evaluation results.
pub trait OfflineStore: Send {
    /// Record one batch of samples.
    fn store(&mut self, inputs: &[&[Real]], outputs: &[&[Real]]) -> Result<()>;
}
