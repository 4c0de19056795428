//! Peak finding on a 1-D count series.
//!
//! Local maxima above a relative threshold, then greedy suppression of weaker
//! maxima closer than `min_dist` bins to a stronger one.

/// Indices of peaks in `y`, in increasing order.
///
/// `threshold` is relative: a peak must exceed
/// `min(y) + threshold * (max(y) - min(y))`.
pub fn find_peaks(y: &[f64], threshold: f64, min_dist: usize) -> Vec<usize> {
    let n = y.len();
    if n < 3 {
        return Vec::new();
    }

    let (lo, hi) = y
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if !(hi > lo) {
        return Vec::new();
    }
    let cut = lo + threshold * (hi - lo);

    // Local maxima; ties go to the leftmost sample of a plateau.
    let mut candidates: Vec<usize> = (1..n - 1)
        .filter(|&i| y[i] > y[i - 1] && y[i] >= y[i + 1] && y[i] > cut)
        .collect();

    if min_dist > 1 && candidates.len() > 1 {
        candidates.sort_by(|&a, &b| {
            y[b].partial_cmp(&y[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(&b))
        });
        let mut kept: Vec<usize> = Vec::with_capacity(candidates.len());
        for c in candidates {
            if kept.iter().all(|&k| k.abs_diff(c) > min_dist) {
                kept.push(c);
            }
        }
        candidates = kept;
    }

    candidates.sort_unstable();
    candidates
}
