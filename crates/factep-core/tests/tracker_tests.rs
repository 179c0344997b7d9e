mod tracker_tests {
    use factep_core::prelude::*;
    use rand::prelude::*;
    use rstest::*;

    /// Dense bipartite fixture: every potential touches every variable.
    fn dense_fixture(
        n: usize,
        m: usize,
        rng: &mut StdRng,
    ) -> (Vec<usize>, Vec<usize>, Vec<usize>, Vec<usize>, Vec<f64>, Vec<f64>) {
        let rows: Vec<Vec<(usize, f64)>> = (0..m)
            .map(|_| (0..n).map(|i| (i, 1.0)).collect())
            .collect();
        let (row_off, row_vars, col_off, col_data, b_vals) = build_layout(n, &rows);
        let pi: Vec<f64> = (0..n * m).map(|_| rng.random_range(0.01..10.0)).collect();
        (row_off, row_vars, col_off, col_data, b_vals, pi)
    }

    fn brute_force_max(repr: &FactorizedRepr<'_>, i: usize) -> f64 {
        let col = repr.col(i).unwrap();
        col.links
            .iter()
            .map(|&l| col.pi[l])
            .fold(f64::NEG_INFINITY, f64::max)
    }

    #[rstest]
    #[case(3, 8, 1, 11)]
    #[case(3, 8, 3, 97)]
    #[case(5, 20, 2, 7)]
    #[case(4, 12, 5, 23)]
    fn tracker_matches_brute_force_under_random_updates(
        #[case] n: usize,
        #[case] m: usize,
        #[case] k: usize,
        #[case] seed: u64,
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let (row_off, row_vars, col_off, col_data, b_vals, mut pi) = dense_fixture(n, m, &mut rng);
        let mut beta = vec![0.0; pi.len()];
        let mut repr = FactorizedRepr::new(
            n, m, &row_off, &row_vars, &col_off, &col_data, &b_vals, &mut beta, &mut pi,
        )
        .unwrap();

        let (mut nv, mut ti, mut tv) = alloc_tracker_arrays(n, k);
        let mut tracker =
            MaxValueTracker::new(n, m, k, &mut nv, &mut ti, &mut tv, None, false).unwrap();
        tracker.recompute_all(&PiColumns(&repr)).unwrap();

        for _ in 0..500 {
            let i = rng.random_range(0..n);
            let j = rng.random_range(0..m);
            let val = rng.random_range(0.01..10.0);
            // Write the value through the representation, then notify.
            {
                let row = repr.row_mut(j).unwrap();
                let pos = row.vars.iter().position(|&v| v == i).unwrap();
                row.pi[pos] = val;
            }
            tracker.update(&PiColumns(&repr), i, j, val).unwrap();
            assert_eq!(tracker.max(i), brute_force_max(&repr, i));
        }
        // Every variable, not just the touched ones.
        for i in 0..n {
            assert_eq!(tracker.max(i), brute_force_max(&repr, i));
        }
        let (nupd, nrec) = tracker.stats();
        assert_eq!(nupd, 500);
        assert!(nrec <= nupd);
    }

    #[rstest]
    #[case(false, 31)]
    #[case(true, 57)]
    fn tracker_respects_subset_under_random_updates(#[case] exclude: bool, #[case] seed: u64) {
        let (n, m, k) = (3, 10, 2);
        let mut rng = StdRng::seed_from_u64(seed);
        let (row_off, row_vars, col_off, col_data, b_vals, mut pi) = dense_fixture(n, m, &mut rng);
        let mut beta = vec![0.0; pi.len()];
        let mut repr = FactorizedRepr::new(
            n, m, &row_off, &row_vars, &col_off, &col_data, &b_vals, &mut beta, &mut pi,
        )
        .unwrap();

        let subset: Vec<usize> = vec![0, 3, 4, 7, 9];
        let eligible: Vec<usize> = (0..m)
            .filter(|j| subset.binary_search(j).is_ok() != exclude)
            .collect();

        let (mut nv, mut ti, mut tv) = alloc_tracker_arrays(n, k);
        let mut tracker =
            MaxValueTracker::new(n, m, k, &mut nv, &mut ti, &mut tv, Some(&subset), exclude)
                .unwrap();
        tracker.recompute_all(&PiColumns(&repr)).unwrap();

        for _ in 0..300 {
            let i = rng.random_range(0..n);
            let j = *eligible.choose(&mut rng).unwrap();
            let val = rng.random_range(0.01..10.0);
            {
                let row = repr.row_mut(j).unwrap();
                let pos = row.vars.iter().position(|&v| v == i).unwrap();
                row.pi[pos] = val;
            }
            tracker.update(&PiColumns(&repr), i, j, val).unwrap();

            let col = repr.col(i).unwrap();
            let expect = col
                .entries()
                .filter(|(j, _)| eligible.binary_search(j).is_ok())
                .map(|(_, l)| col.pi[l])
                .fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(tracker.max(i), expect);
        }
    }
}
