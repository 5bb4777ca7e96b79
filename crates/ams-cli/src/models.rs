//! Closed-form stand-in collaborators for the mini-app.
//!
//! The physics is an ideal gas; the surrogate is the same law with a
//! relative bias; the classifier distrusts densities outside a window.

use ams_core::{EosOutputs, PhysicsSolver, Real, Result, SurrogateModel, UncertaintyClassifier};
use ams_workflow::evaluate_filtered_by_packing;

/// Ideal-gas equation of state.
#[derive(Debug, Clone)]
pub struct IdealGas {
    /// Adiabatic index.
    pub gamma: Real,
    /// Specific heat at constant volume.
    pub cv: Real,
    /// Scratch budget for filtered evaluation.
    pub budget_bytes: usize,
}

impl IdealGas {
    /// `(p, c², K, T)` of one sample.
    pub fn state(&self, rho: Real, e: Real) -> [Real; 4] {
        let p = (self.gamma - 1.0) * rho * e;
        [p, self.gamma * p / rho, self.gamma * p, e / self.cv]
    }
}

impl PhysicsSolver for IdealGas {
    fn evaluate(&mut self, density: &[Real], energy: &[Real], mut out: EosOutputs<'_>) -> Result<()> {
        let [p, c2, k, t] = out.as_array();
        for i in 0..density.len() {
            let state = self.state(density[i], energy[i]);
            p[i] = state[0];
            c2[i] = state[1];
            k[i] = state[2];
            t[i] = state[3];
        }
        Ok(())
    }

    fn evaluate_filtered(
        &mut self,
        density: &[Real],
        energy: &[Real],
        flags: &[bool],
        out: EosOutputs<'_>,
    ) -> Result<()> {
        let budget = self.budget_bytes;
        evaluate_filtered_by_packing(self, budget, density, energy, flags, out)
    }
}

/// Ideal-gas law scaled by `1 + bias`.
#[derive(Debug, Clone)]
pub struct BiasedSurrogate {
    /// Exact law being approximated.
    pub law: IdealGas,
    /// Relative error of every output.
    pub bias: Real,
}

impl SurrogateModel for BiasedSurrogate {
    fn evaluate(&mut self, inputs: &[&[Real]], outputs: &mut [&mut [Real]]) -> Result<()> {
        let (density, energy) = (inputs[0], inputs[1]);
        for i in 0..density.len() {
            let state = self.law.state(density[i], energy[i]);
            for (out, v) in outputs.iter_mut().zip(state) {
                out[i] = v * (1.0 + self.bias);
            }
        }
        Ok(())
    }
}

/// Flags samples whose density leaves `[lo, hi]`.
#[derive(Debug, Clone)]
pub struct DensityWindow {
    /// Lowest trusted density.
    pub lo: Real,
    /// Highest trusted density.
    pub hi: Real,
}

impl UncertaintyClassifier for DensityWindow {
    fn evaluate(&mut self, density: &[Real], _energy: &[Real], uncertain: &mut [bool]) -> Result<()> {
        for (u, &rho) in uncertain.iter_mut().zip(density) {
            *u = rho < self.lo || rho > self.hi;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn gas() -> IdealGas {
        IdealGas { gamma: 1.4, cv: 2.0, budget_bytes: 1 << 20 }
    }

    #[test]
    fn test_ideal_gas_state() {
        let [p, c2, k, t] = gas().state(2.0, 5.0);
        assert_relative_eq!(p, 0.4 * 10.0, epsilon = 1e-12);
        assert_relative_eq!(c2, 1.4 * 4.0 / 2.0, epsilon = 1e-12);
        assert_relative_eq!(k, 1.4 * 4.0, epsilon = 1e-12);
        assert_relative_eq!(t, 2.5);
    }

    #[test]
    fn test_filtered_keeps_surrogate_values() {
        let mut physics = gas();
        let mut surrogate = BiasedSurrogate { law: gas(), bias: 0.1 };
        let mut uq = DensityWindow { lo: 1.0, hi: 3.0 };
        let rho = [0.5, 2.0, 4.0];
        let e = [1.0, 1.0, 1.0];
        let mut flags = [false; 3];
        uq.evaluate(&rho, &e, &mut flags).unwrap();
        assert_eq!(flags, [true, false, true]);

        let mut out = [[0.0; 3]; 4];
        {
            let [p, c2, k, t] = &mut out;
            let mut outs: [&mut [Real]; 4] = [p, c2, k, t];
            surrogate.evaluate(&[&rho, &e], &mut outs).unwrap();
        }
        let [p, c2, k, t] = &mut out;
        physics.evaluate_filtered(&rho, &e, &flags, EosOutputs::new(p, c2, k, t)).unwrap();

        assert_relative_eq!(out[0][0], 0.4 * 0.5, epsilon = 1e-12);
        assert_relative_eq!(out[0][1], 0.4 * 2.0 * 1.1, epsilon = 1e-12);
        assert_relative_eq!(out[0][2], 0.4 * 4.0, epsilon = 1e-12);
    }
}
