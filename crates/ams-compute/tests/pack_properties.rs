//! Property tests for the host sparsity packer.

use ams_compute::pack::{
    build_index, gather_rows, pack, pack_with_index, scatter_rows, unpack, unpack_with_index,
};
use proptest::prelude::*;

fn predicate_and_values() -> impl Strategy<Value = (Vec<bool>, Vec<f64>)> {
    (0usize..200).prop_flat_map(|n| {
        (prop::collection::vec(any::<bool>(), n), prop::collection::vec(-1e6f64..1e6, n))
    })
}

proptest! {
    #[test]
    fn prop_pack_is_stable_and_counts_matches(
        (pred, values) in predicate_and_values(),
        match_value in any::<bool>(),
    ) {
        let mut dense = vec![0.0; values.len()];
        let count = pack(&pred, &[&values[..]], &mut [&mut dense[..]], match_value).unwrap();

        let expected: Vec<f64> = pred
            .iter()
            .zip(&values)
            .filter(|(p, _)| **p == match_value)
            .map(|(_, v)| *v)
            .collect();
        prop_assert_eq!(count, expected.len());
        prop_assert_eq!(&dense[..count], &expected[..]);
    }

    #[test]
    fn prop_unpack_restores_matching_positions(
        (pred, values) in predicate_and_values(),
    ) {
        let mut dense = vec![0.0; values.len()];
        pack(&pred, &[&values[..]], &mut [&mut dense[..]], true).unwrap();

        let mut restored = vec![f64::NAN; values.len()];
        unpack(&pred, &[&dense[..]], &mut [&mut restored[..]], true).unwrap();
        for i in 0..values.len() {
            if pred[i] {
                prop_assert_eq!(restored[i], values[i]);
            } else {
                prop_assert!(restored[i].is_nan());
            }
        }
    }

    #[test]
    fn prop_index_is_strictly_increasing_and_matches_build_index(
        (pred, values) in predicate_and_values(),
    ) {
        let mut dense = vec![0.0; values.len()];
        let mut index = vec![0u32; values.len()];
        let count =
            pack_with_index(&pred, &mut index, &[&values[..]], &mut [&mut dense[..]], true).unwrap();

        prop_assert!(index[..count].windows(2).all(|w| w[0] < w[1]));
        prop_assert_eq!(&index[..count], &build_index(&pred, true).unwrap()[..]);

        let mut restored = values.clone();
        restored.iter_mut().for_each(|v| *v = -*v);
        unpack_with_index(&index, count, &[&dense[..]], &mut [&mut restored[..]]).unwrap();
        for i in 0..values.len() {
            let expected = if pred[i] { values[i] } else { -values[i] };
            prop_assert_eq!(restored[i], expected);
        }
    }

    #[test]
    fn prop_gather_then_scatter_rows_is_identity_on_active_rows(
        pred in prop::collection::vec(any::<bool>(), 0..64),
        width in 1usize..8,
    ) {
        let index = build_index(&pred, true).unwrap();
        let sparse: Vec<i32> = (0..(pred.len() * width) as i32).collect();
        let mut dense = vec![0; index.len() * width];
        gather_rows(&index, width, &sparse, &mut dense).unwrap();

        let mut target = vec![-1; sparse.len()];
        scatter_rows(&index, width, &dense, &mut target).unwrap();
        for (e, active) in pred.iter().enumerate() {
            let row = &target[e * width..(e + 1) * width];
            if *active {
                prop_assert_eq!(row, &sparse[e * width..(e + 1) * width]);
            } else {
                prop_assert!(row.iter().all(|&v| v == -1));
            }
        }
    }
}
