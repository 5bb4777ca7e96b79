//! Predicate-driven packing of parallel arrays (host path).
//!
//! A boolean predicate selects which positions of a group of parallel
//! "sparse" arrays are copied into the front of matching "dense" arrays.
//! Compaction is stable: packed positions keep their original relative
//! order, so the recorded index map is strictly increasing.
//!
//! Two modes are provided:
//! - index-free ([`pack`] / [`unpack`]): the reverse direction re-scans the
//!   same predicate;
//! - index-cached ([`pack_with_index`] / [`unpack_with_index`]): the forward
//!   direction records the original position of every packed value, and the
//!   reverse direction only needs that map.
//!
//! [`build_index`], [`gather_rows`] and [`scatter_rows`] apply the same idea
//! to whole rows of `width` values (all quadrature points of one element).
//!
//! Every function validates all sizes before writing anything.

use ams_core::{Error, Result};
use rayon::prelude::*;

/// Compacted position → original position.
pub type SparseIndex = u32;

pub(crate) fn check_groups(sparse: usize, dense: usize) -> Result<()> {
    if sparse != dense {
        return Err(Error::SizeMismatch { what: "packing array groups", expected: sparse, actual: dense });
    }
    Ok(())
}

pub(crate) fn check_min_len(what: &'static str, required: usize, lens: impl Iterator<Item = usize>) -> Result<()> {
    for len in lens {
        if len < required {
            return Err(Error::SizeMismatch { what, expected: required, actual: len });
        }
    }
    Ok(())
}

fn count_matches(predicate: &[bool], match_value: bool) -> usize {
    predicate.iter().filter(|&&p| p == match_value).count()
}

/// Pack every `sparse[j][i]` with `predicate[i] == match_value` into `dense[j]`.
///
/// Returns the number of packed positions.
pub fn pack<T: Copy>(
    predicate: &[bool],
    sparse: &[&[T]],
    dense: &mut [&mut [T]],
    match_value: bool,
) -> Result<usize> {
    check_groups(sparse.len(), dense.len())?;
    let n = predicate.len();
    check_min_len("sparse array", n, sparse.iter().map(|a| a.len()))?;
    let count = count_matches(predicate, match_value);
    check_min_len("dense array", count, dense.iter().map(|a| a.len()))?;

    let mut npacked = 0;
    for (i, &p) in predicate.iter().enumerate() {
        if p == match_value {
            for (d, s) in dense.iter_mut().zip(sparse) {
                d[npacked] = s[i];
            }
            npacked += 1;
        }
    }
    Ok(npacked)
}

/// [`pack`], additionally recording the original position of every packed value.
///
/// `index[k]` receives the position `i` whose values landed in `dense[_][k]`.
pub fn pack_with_index<T: Copy>(
    predicate: &[bool],
    index: &mut [SparseIndex],
    sparse: &[&[T]],
    dense: &mut [&mut [T]],
    match_value: bool,
) -> Result<usize> {
    check_groups(sparse.len(), dense.len())?;
    let n = predicate.len();
    check_index_range(n)?;
    check_min_len("sparse array", n, sparse.iter().map(|a| a.len()))?;
    let count = count_matches(predicate, match_value);
    check_min_len("dense array", count, dense.iter().map(|a| a.len()))?;
    check_min_len("sparse index", count, std::iter::once(index.len()))?;

    let mut npacked = 0;
    for (i, &p) in predicate.iter().enumerate() {
        if p == match_value {
            for (d, s) in dense.iter_mut().zip(sparse) {
                d[npacked] = s[i];
            }
            index[npacked] = i as SparseIndex;
            npacked += 1;
        }
    }
    Ok(npacked)
}

/// Inverse of [`pack`]: `sparse[j][i] = dense[j][k]` for the k-th matching position.
///
/// `predicate` must be identical to the one used when packing.
pub fn unpack<T: Copy>(
    predicate: &[bool],
    dense: &[&[T]],
    sparse: &mut [&mut [T]],
    match_value: bool,
) -> Result<()> {
    check_groups(sparse.len(), dense.len())?;
    let n = predicate.len();
    check_min_len("sparse array", n, sparse.iter().map(|a| a.len()))?;
    let count = count_matches(predicate, match_value);
    check_min_len("dense array", count, dense.iter().map(|a| a.len()))?;

    let mut npacked = 0;
    for (i, &p) in predicate.iter().enumerate() {
        if p == match_value {
            for (s, d) in sparse.iter_mut().zip(dense) {
                s[i] = d[npacked];
            }
            npacked += 1;
        }
    }
    Ok(())
}

/// Inverse of [`pack_with_index`]: `sparse[j][index[k]] = dense[j][k]` for `k < npacked`.
///
/// Does not need the predicate, so it tolerates one that has since changed.
pub fn unpack_with_index<T: Copy>(
    index: &[SparseIndex],
    npacked: usize,
    dense: &[&[T]],
    sparse: &mut [&mut [T]],
) -> Result<()> {
    check_groups(sparse.len(), dense.len())?;
    check_min_len("sparse index", npacked, std::iter::once(index.len()))?;
    check_min_len("dense array", npacked, dense.iter().map(|a| a.len()))?;
    let index = &index[..npacked];
    if let Some(&max) = index.iter().max() {
        check_min_len("sparse array", max as usize + 1, sparse.iter().map(|a| a.len()))?;
    }

    for (k, &i) in index.iter().enumerate() {
        for (s, d) in sparse.iter_mut().zip(dense) {
            s[i as usize] = d[k];
        }
    }
    Ok(())
}

pub(crate) fn check_index_range(n: usize) -> Result<()> {
    if n > SparseIndex::MAX as usize + 1 {
        return Err(Error::Validation(format!(
            "{n} positions exceed the range of the sparse index type"
        )));
    }
    Ok(())
}

/// Sparse index map of a predicate: every position equal to `match_value`, in order.
pub fn build_index(predicate: &[bool], match_value: bool) -> Result<Vec<SparseIndex>> {
    check_index_range(predicate.len())?;
    Ok(predicate
        .iter()
        .enumerate()
        .filter(|&(_, &p)| p == match_value)
        .map(|(i, _)| i as SparseIndex)
        .collect())
}

fn check_rows(index: &[SparseIndex], width: usize, sparse_len: usize, dense_len: usize) -> Result<()> {
    if width == 0 {
        return Err(Error::Validation("row width must be > 0".into()));
    }
    let needed = index.len() * width;
    if dense_len < needed {
        return Err(Error::SizeMismatch { what: "dense rows", expected: needed, actual: dense_len });
    }
    if let Some(&max) = index.iter().max() {
        let needed = (max as usize + 1) * width;
        if sparse_len < needed {
            return Err(Error::SizeMismatch { what: "sparse rows", expected: needed, actual: sparse_len });
        }
    }
    Ok(())
}

/// Copy row `index[k]` of `sparse` (rows of `width` values) into row `k` of `dense`.
pub fn gather_rows<T: Copy + Send + Sync>(
    index: &[SparseIndex],
    width: usize,
    sparse: &[T],
    dense: &mut [T],
) -> Result<()> {
    check_rows(index, width, sparse.len(), dense.len())?;
    dense[..index.len() * width].par_chunks_mut(width).zip(index.par_iter()).for_each(
        |(row, &e)| {
            let start = e as usize * width;
            row.copy_from_slice(&sparse[start..start + width]);
        },
    );
    Ok(())
}

/// Copy row `k` of `dense` back into row `index[k]` of `sparse`.
///
/// `index` must be strictly increasing (as produced by [`build_index`]);
/// rows of `sparse` not named in `index` are left untouched.
pub fn scatter_rows<T: Copy + Send + Sync>(
    index: &[SparseIndex],
    width: usize,
    dense: &[T],
    sparse: &mut [T],
) -> Result<()> {
    check_rows(index, width, sparse.len(), dense.len())?;
    if index.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Error::Validation("sparse index must be strictly increasing".into()));
    }
    sparse.par_chunks_mut(width).enumerate().for_each(|(e, row)| {
        if let Ok(k) = index.binary_search(&(e as SparseIndex)) {
            row.copy_from_slice(&dense[k * width..(k + 1) * width]);
        }
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_counts_and_orders() {
        let pred = [true, false, true, true, false];
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [10.0, 20.0, 30.0, 40.0, 50.0];
        let mut da = [0.0; 3];
        let mut db = [0.0; 3];
        let n = pack(&pred, &[&a, &b], &mut [&mut da, &mut db], true).unwrap();
        assert_eq!(n, 3);
        assert_eq!(da, [1.0, 3.0, 4.0]);
        assert_eq!(db, [10.0, 30.0, 40.0]);
    }

    #[test]
    fn test_pack_false_match_value() {
        let pred = [true, false, true, true, false];
        let a = [1, 2, 3, 4, 5];
        let mut d = [0; 5];
        let n = pack(&pred, &[&a], &mut [&mut d], false).unwrap();
        assert_eq!(n, 2);
        assert_eq!(&d[..n], &[2, 5]);
    }

    #[test]
    fn test_group_mismatch_leaves_buffers_untouched() {
        let pred = [true, true];
        let a = [1.0, 2.0];
        let mut d1 = [9.0; 2];
        let mut d2 = [9.0; 2];
        let err = pack(&pred, &[&a], &mut [&mut d1, &mut d2], true).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { expected: 1, actual: 2, .. }));
        assert_eq!(d1, [9.0; 2]);
        assert_eq!(d2, [9.0; 2]);
    }

    #[test]
    fn test_short_dense_rejected_before_write() {
        let pred = [true, true, true];
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        let mut da = [0.0; 3];
        let mut db = [0.0; 2];
        let err = pack(&pred, &[&a, &b], &mut [&mut da, &mut db], true).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { what: "dense array", .. }));
        assert_eq!(da, [0.0; 3]);
    }

    #[test]
    fn test_unpack_restores_matched_only() {
        let pred = [false, true, false, true];
        let dense = [7.0, 8.0];
        let mut sparse = [1.0, 2.0, 3.0, 4.0];
        unpack(&pred, &[&dense], &mut [&mut sparse], true).unwrap();
        assert_eq!(sparse, [1.0, 7.0, 3.0, 8.0]);
    }

    #[test]
    fn test_index_round_trip_survives_predicate_change() {
        let mut pred = vec![true, false, true, false, true];
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mut dense = [0.0; 5];
        let mut index = [0; 5];
        let n = pack_with_index(&pred, &mut index, &[&a], &mut [&mut dense], true).unwrap();
        assert_eq!(&index[..n], &[0, 2, 4]);

        pred.iter_mut().for_each(|p| *p = false);
        for v in &mut dense[..n] {
            *v *= 10.0;
        }
        let mut out = [0.0; 5];
        unpack_with_index(&index, n, &[&dense], &mut [&mut out]).unwrap();
        assert_eq!(out, [10.0, 0.0, 30.0, 0.0, 50.0]);
    }

    #[test]
    fn test_unpack_with_index_out_of_range() {
        let index = [0, 9];
        let dense = [1.0, 2.0];
        let mut sparse = [0.0; 4];
        let err = unpack_with_index(&index, 2, &[&dense], &mut [&mut sparse]).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { what: "sparse array", expected: 10, .. }));
        assert_eq!(sparse, [0.0; 4]);
    }

    #[test]
    fn test_empty_predicate() {
        let a: [f64; 0] = [];
        let mut d: [f64; 0] = [];
        assert_eq!(pack(&[], &[&a], &mut [&mut d], true).unwrap(), 0);
        assert!(build_index(&[], true).unwrap().is_empty());
    }

    #[test]
    fn test_gather_scatter_rows() {
        // 4 elements x 2 quadrature points, element-major rows.
        let sparse = [0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5];
        let index = build_index(&[true, false, true, false], true).unwrap();
        assert_eq!(index, vec![0, 2]);

        let mut dense = vec![0.0; 4];
        gather_rows(&index, 2, &sparse, &mut dense).unwrap();
        assert_eq!(dense, vec![0.0, 0.5, 2.0, 2.5]);

        let mut out = vec![-1.0; 8];
        let results = [10.0, 11.0, 20.0, 21.0];
        scatter_rows(&index, 2, &results, &mut out).unwrap();
        assert_eq!(out, vec![10.0, 11.0, -1.0, -1.0, 20.0, 21.0, -1.0, -1.0]);
    }

    #[test]
    fn test_rows_validation() {
        let mut dense = vec![0.0; 2];
        assert!(matches!(
            gather_rows(&[0, 3], 1, &[0.0; 3], &mut dense),
            Err(Error::SizeMismatch { what: "sparse rows", .. })
        ));
        assert!(matches!(gather_rows(&[0], 0, &[0.0; 3], &mut dense), Err(Error::Validation(_))));
        let mut sparse = vec![0.0; 4];
        assert!(matches!(
            scatter_rows(&[2, 1], 1, &[1.0, 2.0], &mut sparse),
            Err(Error::Validation(_))
        ));
    }
}
