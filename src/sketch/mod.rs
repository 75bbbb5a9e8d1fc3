//! Bounded-memory order statistics over bin coverage values.
//!
//! The baseline pass summarises every covered bin of the genome through a
//! [`QuantileEstimator`]. [`KllSketch`] keeps O(k) items regardless of input
//! size; [`ExactQuantiles`] materialises everything and exists to measure the
//! sketch's rank error.

mod exact;
mod kll;

pub use exact::{rank_error, ExactQuantiles};
pub use kll::{KllSketch, DEFAULT_K, MIN_K};

use thiserror::Error;

/// Errors reported by quantile estimators.
#[derive(Debug, Error, PartialEq)]
pub enum SketchError {
    /// Query issued before any value was inserted.
    #[error("estimator is empty")]
    Empty,

    /// Rank outside `[0, 1]`.
    #[error("rank {0} outside [0, 1]")]
    InvalidRank(f64),

    /// Sketches built with different accuracy parameters.
    #[error("cannot merge sketches with k={left} and k={right}")]
    IncompatibleMerge {
        /// Accuracy parameter of the receiving sketch.
        left: u32,
        /// Accuracy parameter of the merged-in sketch.
        right: u32,
    },
}

/// Streaming approximate order-statistics contract.
pub trait QuantileEstimator {
    /// Insert one value. NaN is ignored.
    fn update(&mut self, value: f64);

    /// Value at normalized rank `q` in `[0, 1]`.
    fn quantile(&self, q: f64) -> Result<f64, SketchError>;

    /// Fraction of inserted values strictly below `value`, or at or below it
    /// when `inclusive` is set.
    fn rank(&self, value: f64, inclusive: bool) -> Result<f64, SketchError>;

    /// Smallest value seen.
    fn min(&self) -> Option<f64>;

    /// Largest value seen.
    fn max(&self) -> Option<f64>;

    /// Number of values inserted.
    fn count(&self) -> u64;

    /// Number of values currently held in memory.
    fn retained_count(&self) -> usize;

    /// Bytes needed to serialize the current state.
    fn serialized_size(&self) -> usize;

    /// Accuracy parameter (`k`); 0 for exact estimators.
    fn accuracy_parameter(&self) -> u32;

    /// Whether no value has been inserted.
    fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

pub(crate) fn check_rank(q: f64) -> Result<(), SketchError> {
    if (0.0..=1.0).contains(&q) {
        Ok(())
    } else {
        Err(SketchError::InvalidRank(q))
    }
}
