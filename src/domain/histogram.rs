//! Per-channel amplitude histograms.
//!
//! All channels share one ordered set of bin centers; each channel owns its
//! own counts. The shape is fixed at construction.

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    bin_centers: Vec<f64>,
    counts: Vec<Vec<f64>>,
}

/// Read-only view of one channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelHistogram<'a> {
    pub bin_centers: &'a [f64],
    pub counts: &'a [f64],
}

impl Histogram {
    /// Build a histogram from shared bin centers and per-channel counts.
    ///
    /// Bin centers must be finite and strictly increasing; every channel must
    /// have one finite, non-negative count per bin.
    pub fn new(bin_centers: Vec<f64>, counts: Vec<Vec<f64>>) -> Result<Self, AppError> {
        if bin_centers.is_empty() {
            return Err(AppError::invalid_input("Histogram has no bins."));
        }
        if bin_centers.iter().any(|x| !x.is_finite()) {
            return Err(AppError::invalid_input("Histogram bin centers must be finite."));
        }
        if bin_centers.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::invalid_input(
                "Histogram bin centers must be strictly increasing.",
            ));
        }
        for (channel, row) in counts.iter().enumerate() {
            if row.len() != bin_centers.len() {
                return Err(AppError::invalid_input(format!(
                    "Channel {channel} has {} counts for {} bins.",
                    row.len(),
                    bin_centers.len()
                )));
            }
            if row.iter().any(|c| !c.is_finite() || *c < 0.0) {
                return Err(AppError::invalid_input(format!(
                    "Channel {channel} has negative or non-finite counts."
                )));
            }
        }
        Ok(Self {
            bin_centers,
            counts,
        })
    }

    /// Empty histogram with centers `min, min + width, ..., max`.
    pub fn uniform(
        bin_center_min: f64,
        bin_center_max: f64,
        bin_width: f64,
        n_channels: usize,
    ) -> Result<Self, AppError> {
        if !(bin_width.is_finite() && bin_width > 0.0) {
            return Err(AppError::invalid_input(format!(
                "Invalid bin width {bin_width}."
            )));
        }
        if !(bin_center_min.is_finite()
            && bin_center_max.is_finite()
            && bin_center_max >= bin_center_min)
        {
            return Err(AppError::invalid_input(format!(
                "Invalid bin range {bin_center_min}..{bin_center_max}."
            )));
        }
        let n_bins = ((bin_center_max - bin_center_min) / bin_width).round() as usize + 1;
        let bin_centers: Vec<f64> = (0..n_bins)
            .map(|i| bin_center_min + i as f64 * bin_width)
            .collect();
        let counts = vec![vec![0.0; n_bins]; n_channels];
        Self::new(bin_centers, counts)
    }

    pub fn n_channels(&self) -> usize {
        self.counts.len()
    }

    pub fn n_bins(&self) -> usize {
        self.bin_centers.len()
    }

    pub fn bin_centers(&self) -> &[f64] {
        &self.bin_centers
    }

    pub fn counts(&self, channel: usize) -> Option<&[f64]> {
        self.counts.get(channel).map(Vec::as_slice)
    }

    pub fn all_counts(&self) -> &[Vec<f64>] {
        &self.counts
    }

    pub fn channel(&self, channel: usize) -> Option<ChannelHistogram<'_>> {
        self.counts(channel).map(|counts| ChannelHistogram {
            bin_centers: &self.bin_centers,
            counts,
        })
    }

    /// Index of the bin whose center is closest to `value`, if `value` falls
    /// within half a bin of the histogram range.
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        if !value.is_finite() {
            return None;
        }
        let idx = self.bin_centers.partition_point(|&c| c < value);
        let candidates = [idx.checked_sub(1), (idx < self.n_bins()).then_some(idx)];
        let best = candidates
            .into_iter()
            .flatten()
            .min_by(|&a, &b| {
                let da = (self.bin_centers[a] - value).abs();
                let db = (self.bin_centers[b] - value).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })?;

        let half_width = self.half_width_at(best);
        ((self.bin_centers[best] - value).abs() <= half_width).then_some(best)
    }

    /// Add `weight` to the bin containing `value`. Returns `false` when the
    /// value falls outside the histogram or the channel does not exist.
    pub fn fill(&mut self, channel: usize, value: f64, weight: f64) -> bool {
        let Some(bin) = self.bin_index(value) else {
            return false;
        };
        match self.counts.get_mut(channel) {
            Some(row) => {
                row[bin] += weight;
                true
            }
            None => false,
        }
    }

    /// Overwrite one channel's counts.
    pub fn set_counts(&mut self, channel: usize, counts: Vec<f64>) -> Result<(), AppError> {
        if counts.len() != self.n_bins() {
            return Err(AppError::invalid_input(format!(
                "Expected {} counts for channel {channel}, got {}.",
                self.n_bins(),
                counts.len()
            )));
        }
        if counts.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(AppError::invalid_input(format!(
                "Channel {channel} has negative or non-finite counts."
            )));
        }
        let row = self
            .counts
            .get_mut(channel)
            .ok_or_else(|| AppError::invalid_input(format!("No channel {channel}.")))?;
        *row = counts;
        Ok(())
    }

    fn half_width_at(&self, idx: usize) -> f64 {
        let n = self.n_bins();
        if n == 1 {
            return 0.5;
        }
        let width = if idx + 1 < n {
            self.bin_centers[idx + 1] - self.bin_centers[idx]
        } else {
            self.bin_centers[idx] - self.bin_centers[idx - 1]
        };
        width / 2.0
    }
}

impl ChannelHistogram<'_> {
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Indices of bins with non-zero counts, in order.
    pub fn nonzero_indices(&self) -> Vec<usize> {
        self.counts
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| (c != 0.0).then_some(i))
            .collect()
    }

    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Center of the last bin; counts there are treated as ADC saturation.
    pub fn upper_edge(&self) -> Option<f64> {
        self.bin_centers.last().copied()
    }

    /// Nominal bin width (spacing of the first two centers).
    pub fn bin_width(&self) -> f64 {
        match self.bin_centers {
            [a, b, ..] => b - a,
            _ => 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_histogram_covers_adc_range() {
        let h = Histogram::uniform(0.0, 4095.0, 1.0, 3).unwrap();
        assert_eq!(h.n_bins(), 4096);
        assert_eq!(h.n_channels(), 3);
        assert_eq!(h.bin_centers()[4095], 4095.0);
    }

    #[test]
    fn rejects_unsorted_centers_and_ragged_counts() {
        assert!(Histogram::new(vec![0.0, 2.0, 1.0], vec![vec![0.0; 3]]).is_err());
        assert!(Histogram::new(vec![0.0, 1.0, 2.0], vec![vec![0.0; 2]]).is_err());
        assert!(Histogram::new(vec![0.0, 1.0], vec![vec![-1.0, 0.0]]).is_err());
    }

    #[test]
    fn fill_lands_in_nearest_bin() {
        let mut h = Histogram::uniform(0.0, 9.0, 1.0, 1).unwrap();
        assert!(h.fill(0, 3.4, 1.0));
        assert!(h.fill(0, 3.6, 2.0));
        assert!(!h.fill(0, 12.0, 1.0));
        assert!(!h.fill(1, 3.0, 1.0));
        let counts = h.counts(0).unwrap();
        assert_eq!(counts[3], 1.0);
        assert_eq!(counts[4], 2.0);
    }

    #[test]
    fn channel_view_reports_nonzero_bins() {
        let h = Histogram::new(vec![0.0, 1.0, 2.0, 3.0], vec![vec![0.0, 5.0, 0.0, 2.0]]).unwrap();
        let ch = h.channel(0).unwrap();
        assert_eq!(ch.nonzero_indices(), vec![1, 3]);
        assert_eq!(ch.total(), 7.0);
        assert_eq!(ch.upper_edge(), Some(3.0));
    }
}
