use ndarray::{array, Array1, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// One flower per iris class; the second row is the target class.
pub fn three_flowers() -> (Array2<f64>, Array1<bool>) {
    let x = array![
        [5.1, 3.5, 1.4, 0.2],
        [7.0, 3.2, 4.7, 1.4],
        [6.3, 3.3, 6.0, 2.5],
    ];
    let y = array![false, true, false];
    (x, y)
}

/// Seeded two-class problem on uniform features in [-1, 1).
///
/// The label depends on the first two columns plus noise; any further
/// columns are pure noise.
pub fn synthetic(n_rows: usize, n_features: usize, seed: u64) -> (Array2<f64>, Array1<bool>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen_range(-1.0..1.0));
    let y = x
        .rows()
        .into_iter()
        .map(|row| {
            let signal: f64 = row.iter().take(2).sum();
            signal + rng.gen_range(-0.5..0.5) > 0.0
        })
        .collect();
    (x, y)
}
