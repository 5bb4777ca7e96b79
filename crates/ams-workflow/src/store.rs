//! In-memory offline store.

use ams_compute::linearize_host;
use ams_core::{Error, OfflineStore, Real, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Table {
    width: Option<usize>,
    rows: Vec<Real>,
    batches: usize,
}

/// Keeps every stored sample as one `[inputs..., outputs...]` row.
///
/// Cloning yields another handle to the same table, so a caller can keep a
/// handle while the evaluator owns the boxed store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    table: Arc<Mutex<Table>>,
    max_samples: Option<usize>,
}

impl MemoryStore {
    /// Unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects batches once `max_samples` rows are held.
    pub fn with_max_samples(max_samples: usize) -> Self {
        Self { max_samples: Some(max_samples), ..Self::default() }
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored samples.
    pub fn samples(&self) -> usize {
        let table = self.table();
        table.width.map_or(0, |w| table.rows.len() / w)
    }

    /// Values per row (inputs + outputs), once the first batch arrived.
    pub fn width(&self) -> Option<usize> {
        self.table().width
    }

    /// Number of accepted batches.
    pub fn batches(&self) -> usize {
        self.table().batches
    }

    /// Copy of row `i`.
    pub fn row(&self, i: usize) -> Option<Vec<Real>> {
        let table = self.table();
        let w = table.width?;
        table.rows.get(i * w..(i + 1) * w).map(<[Real]>::to_vec)
    }

    /// Copy of every row, flattened.
    pub fn rows(&self) -> Vec<Real> {
        self.table().rows.clone()
    }
}

impl OfflineStore for MemoryStore {
    fn store(&mut self, inputs: &[&[Real]], outputs: &[&[Real]]) -> Result<()> {
        let features: Vec<&[Real]> = inputs.iter().chain(outputs).copied().collect();
        let n = features.first().map_or(0, |f| f.len());
        if let Some(bad) = features.iter().find(|f| f.len() != n) {
            return Err(Error::SizeMismatch { what: "stored feature", expected: n, actual: bad.len() });
        }

        let mut table = self.table();
        let width = features.len();
        match table.width {
            Some(w) if w != width => {
                return Err(Error::Validation(format!(
                    "offline store holds rows of {w} values, got {width}"
                )));
            }
            _ => {}
        }
        let held = if width == 0 { 0 } else { table.rows.len() / width };
        if let Some(max) = self.max_samples {
            if held + n > max {
                return Err(Error::Validation(format!(
                    "offline store full: {held} of {max} samples held, {n} offered"
                )));
            }
        }

        let rows: Vec<Real> = linearize_host(n, &features)?;
        table.width = Some(width);
        table.rows.extend_from_slice(&rows);
        table.batches += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_linearized() {
        let mut store = MemoryStore::new();
        let handle = store.clone();
        store.store(&[&[1.0, 2.0], &[3.0, 4.0]], &[&[5.0, 6.0]]).unwrap();
        assert_eq!(handle.samples(), 2);
        assert_eq!(handle.width(), Some(3));
        assert_eq!(handle.row(0).unwrap(), vec![1.0, 3.0, 5.0]);
        assert_eq!(handle.row(1).unwrap(), vec![2.0, 4.0, 6.0]);
        assert!(handle.row(2).is_none());
    }

    #[test]
    fn test_rejects_ragged_and_width_change() {
        let mut store = MemoryStore::new();
        assert!(matches!(
            store.store(&[&[1.0, 2.0]], &[&[1.0]]),
            Err(Error::SizeMismatch { .. })
        ));
        store.store(&[&[1.0]], &[&[2.0]]).unwrap();
        assert!(matches!(store.store(&[&[1.0]], &[]), Err(Error::Validation(_))));
        assert_eq!(store.batches(), 1);
    }

    #[test]
    fn test_capacity() {
        let mut store = MemoryStore::with_max_samples(3);
        store.store(&[&[1.0, 2.0]], &[&[0.0, 0.0]]).unwrap();
        assert!(store.store(&[&[1.0, 2.0]], &[&[0.0, 0.0]]).is_err());
        assert_eq!(store.samples(), 2);
    }
}
