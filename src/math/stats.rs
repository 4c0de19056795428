//! Count-weighted moments over histogram bins.

/// Weighted mean of `x`; `None` when the weights do not sum to a positive value.
pub fn weighted_mean(x: &[f64], w: &[f64]) -> Option<f64> {
    let (sum_w, sum_wx) = x
        .iter()
        .zip(w)
        .fold((0.0, 0.0), |(sw, swx), (&xi, &wi)| (sw + wi, swx + wi * xi));
    if !(sum_w > 0.0) {
        return None;
    }
    let mean = sum_wx / sum_w;
    mean.is_finite().then_some(mean)
}

/// Weighted standard deviation (population form, matching a weighted second
/// central moment).
pub fn weighted_std(x: &[f64], w: &[f64]) -> Option<f64> {
    let mean = weighted_mean(x, w)?;
    let sq: Vec<f64> = x.iter().map(|&xi| (xi - mean) * (xi - mean)).collect();
    let var = weighted_mean(&sq, w)?;
    Some(var.max(0.0).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn moments_of_symmetric_counts() {
        let x = [1.0, 2.0, 3.0];
        let w = [1.0, 2.0, 1.0];
        assert_relative_eq!(weighted_mean(&x, &w).unwrap(), 2.0);
        assert_relative_eq!(weighted_std(&x, &w).unwrap(), 0.5f64.sqrt());
    }

    #[test]
    fn zero_weights_are_rejected() {
        assert!(weighted_mean(&[1.0, 2.0], &[0.0, 0.0]).is_none());
        assert!(weighted_std(&[], &[]).is_none());
    }
}
