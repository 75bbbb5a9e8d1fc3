use super::{check_rank, QuantileEstimator, SketchError};

/// Exact order statistics over every inserted value.
///
/// Memory grows linearly with the number of bins; this is the baseline the
/// sketch is measured against, not something to run on whole genomes.
#[derive(Debug, Clone, Default)]
pub struct ExactQuantiles {
    values: Vec<f64>,
}

impl ExactQuantiles {
    /// Create an empty estimator.
    pub fn new() -> Self {
        Self::default()
    }

    /// All inserted values in ascending order.
    pub fn sorted_values(&self) -> Vec<f64> {
        let mut sorted = self.values.clone();
        sorted.sort_unstable_by(f64::total_cmp);
        sorted
    }

    /// Append every value of `other`.
    pub fn merge(&mut self, other: &ExactQuantiles) {
        self.values.extend_from_slice(&other.values);
    }
}

impl QuantileEstimator for ExactQuantiles {
    fn update(&mut self, value: f64) {
        if !value.is_nan() {
            self.values.push(value);
        }
    }

    /// Nearest-rank value at index `floor(q * (n - 1))`.
    fn quantile(&self, q: f64) -> Result<f64, SketchError> {
        check_rank(q)?;
        if self.values.is_empty() {
            return Err(SketchError::Empty);
        }
        let sorted = self.sorted_values();
        let idx = (q * (sorted.len() - 1) as f64).floor() as usize;
        Ok(sorted[idx])
    }

    fn rank(&self, value: f64, inclusive: bool) -> Result<f64, SketchError> {
        if self.values.is_empty() {
            return Err(SketchError::Empty);
        }
        let hits = self
            .values
            .iter()
            .filter(|&&v| if inclusive { v <= value } else { v < value })
            .count();
        Ok(hits as f64 / self.values.len() as f64)
    }

    fn min(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::min)
    }

    fn max(&self) -> Option<f64> {
        self.values.iter().copied().reduce(f64::max)
    }

    fn count(&self) -> u64 {
        self.values.len() as u64
    }

    fn retained_count(&self) -> usize {
        self.values.len()
    }

    fn serialized_size(&self) -> usize {
        self.values.len() * std::mem::size_of::<f64>()
    }

    fn accuracy_parameter(&self) -> u32 {
        0
    }
}

/// Normalized rank error of `value` as an estimate of quantile `q`.
///
/// `sorted` must be in ascending order. The estimate's rank is its lower
/// bound position in `sorted`; the expected rank is `floor(q * n)`.
pub fn rank_error(sorted: &[f64], value: f64, q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len() as f64;
    let observed = sorted.partition_point(|&v| v < value) as f64;
    let expected = (q * n).floor();
    (observed - expected).abs() / n
}
