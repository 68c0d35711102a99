use rand::{seq::index::sample, Rng};

/// Draws the rows used to grow one tree: uniformly without replacement,
/// `max(1, floor(fraction * n_rows))` of them, returned in ascending order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowSampler {
    fraction: f64,
}

impl RowSampler {
    pub fn new(fraction: f64) -> Self {
        Self { fraction }
    }

    pub fn sample_size(&self, n_rows: usize) -> usize {
        ((self.fraction * n_rows as f64).floor() as usize).clamp(1usize.min(n_rows), n_rows)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, n_rows: usize) -> Vec<usize> {
        let mut rows = sample(rng, n_rows, self.sample_size(n_rows)).into_vec();
        rows.sort_unstable();
        rows
    }
}
