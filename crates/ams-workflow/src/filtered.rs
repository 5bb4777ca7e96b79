//! Filtered physics evaluation by packing.
//!
//! A solver that can only evaluate every sample it is given gets the
//! filtered contract by compacting the flagged samples, evaluating them
//! densely, and scattering the results back:
//!
//! - all flagged samples fit one partition: index-free [`pack`] / [`unpack`];
//! - otherwise the range is streamed in partition-sized blocks with
//!   [`pack_with_index`] / [`unpack_with_index`], so scratch never exceeds
//!   the budget.
//!
//! [`pack`]: ams_compute::pack::pack
//! [`unpack`]: ams_compute::pack::unpack
//! [`pack_with_index`]: ams_compute::pack::pack_with_index
//! [`unpack_with_index`]: ams_compute::pack::unpack_with_index

use ams_compute::pack::{self, SparseIndex};
use ams_compute::partition_size;
use ams_core::{EosOutputs, Error, PhysicsSolver, Real, Result};

/// Input fields packed per sample (density, energy).
const INPUT_FIELDS: usize = 2;
const OUTPUT_FIELDS: usize = EosOutputs::FIELDS;

/// Dense scratch for one partition.
struct Scratch {
    density: Vec<Real>,
    energy: Vec<Real>,
    outputs: [Vec<Real>; OUTPUT_FIELDS],
}

impl Scratch {
    fn new(len: usize) -> Self {
        Self {
            density: vec![0.0; len],
            energy: vec![0.0; len],
            outputs: std::array::from_fn(|_| vec![0.0; len]),
        }
    }

    fn evaluate<S: PhysicsSolver + ?Sized>(&mut self, solver: &mut S, count: usize) -> Result<()> {
        let [p, c2, k, t] = &mut self.outputs;
        solver.evaluate(
            &self.density[..count],
            &self.energy[..count],
            EosOutputs::new(&mut p[..count], &mut c2[..count], &mut k[..count], &mut t[..count]),
        )
    }

    fn outputs(&self) -> [&[Real]; OUTPUT_FIELDS] {
        let [p, c2, k, t] = &self.outputs;
        [p.as_slice(), c2.as_slice(), k.as_slice(), t.as_slice()]
    }
}

/// Evaluate `solver` only where `flags[i]` is true.
///
/// Outputs at unflagged positions are left untouched. `budget_bytes` bounds
/// the scratch used per partition (see [`partition_size`]).
pub fn evaluate_filtered_by_packing<S: PhysicsSolver + ?Sized>(
    solver: &mut S,
    budget_bytes: usize,
    density: &[Real],
    energy: &[Real],
    flags: &[bool],
    mut outputs: EosOutputs<'_>,
) -> Result<()> {
    let n = flags.len();
    for (what, len) in [("filtered density", density.len()), ("filtered energy", energy.len())] {
        if len != n {
            return Err(Error::SizeMismatch { what, expected: n, actual: len });
        }
    }
    match outputs.common_len() {
        Some(len) if len == n => {}
        other => {
            return Err(Error::SizeMismatch {
                what: "filtered outputs",
                expected: n,
                actual: other.unwrap_or(outputs.pressure.len()),
            });
        }
    }

    let flagged = flags.iter().filter(|&&f| f).count();
    if flagged == 0 {
        return Ok(());
    }
    let chunk = partition_size::<Real>(INPUT_FIELDS, OUTPUT_FIELDS, true, budget_bytes);
    if chunk == 0 {
        return Err(Error::Validation(format!(
            "partition budget of {budget_bytes} bytes cannot hold a single sample"
        )));
    }

    if flagged <= chunk {
        let mut scratch = Scratch::new(flagged);
        let count = pack::pack(
            flags,
            &[density, energy],
            &mut [&mut scratch.density[..], &mut scratch.energy[..]],
            true,
        )?;
        scratch.evaluate(solver, count)?;
        return pack::unpack(flags, &scratch.outputs(), &mut outputs.as_array(), true);
    }

    log::trace!("filtered physics: streaming {flagged} samples in blocks of {chunk}");
    let mut scratch = Scratch::new(chunk);
    let mut index: Vec<SparseIndex> = vec![0; chunk];
    let mut start = 0;
    while start < n {
        let end = (start + chunk).min(n);
        let count = pack::pack_with_index(
            &flags[start..end],
            &mut index,
            &[&density[start..end], &energy[start..end]],
            &mut [&mut scratch.density[..], &mut scratch.energy[..]],
            true,
        )?;
        if count > 0 {
            scratch.evaluate(solver, count)?;
            let mut block = outputs.as_array().map(|field| &mut field[start..end]);
            pack::unpack_with_index(&index, count, &scratch.outputs(), &mut block)?;
        }
        start = end;
    }
    Ok(())
}
