//! Binomial log-likelihood on scores `F` with labels mapped to `y = ±1`.
//!
//! The calibrated probability is `1 / (1 + exp(-2F))`.

#[inline]
fn signed(label: bool) -> f64 {
    if label {
        1.0
    } else {
        -1.0
    }
}

/// Pseudo-residual (negative gradient) and curvature of one row.
#[inline]
pub fn residual_and_curvature(label: bool, score: f64) -> (f64, f64) {
    let y = signed(label);
    let residual = 2.0 * y / (1.0 + (2.0 * y * score).exp());
    let abs = residual.abs();
    (residual, abs * (2.0 - abs))
}

/// Fills `gradients`/`hessians` with the weighted pseudo-residuals and
/// curvatures of every row.
pub fn compute_gradients(
    labels: &[bool],
    scores: &[f64],
    weights: &[f64],
    gradients: &mut [f64],
    hessians: &mut [f64],
) {
    for i in 0..labels.len() {
        let (residual, curvature) = residual_and_curvature(labels[i], scores[i]);
        gradients[i] = weights[i] * residual;
        hessians[i] = weights[i] * curvature;
    }
}

#[inline]
pub fn probability(score: f64) -> f64 {
    1.0 / (1.0 + (-2.0 * score).exp())
}

/// Weighted mean deviance `log(1 + exp(-2yF))`.
pub fn mean_deviance(labels: &[bool], scores: &[f64], weights: &[f64]) -> f64 {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let loss: f64 = labels
        .iter()
        .zip(scores)
        .zip(weights)
        .map(|((&label, &score), &w)| w * (-2.0 * signed(label) * score).exp().ln_1p())
        .sum();
    loss / total
}
