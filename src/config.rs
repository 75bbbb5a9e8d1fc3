//! Pipeline configuration shared by the baseline and detection passes.

use thiserror::Error;

use crate::baseline::BaselineComputer;
use crate::genomics::FlagFilter;
use crate::sketch::{DEFAULT_K, MIN_K};

/// Default deletion ratio `D`: deletion threshold = p50 × D.
pub const DEFAULT_DELETION_RATIO: f64 = 0.5;
/// Default duplication ratio `U`: duplication threshold = p50 × U.
pub const DEFAULT_DUPLICATION_RATIO: f64 = 1.5;

/// Invalid configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A field is out of range.
    #[error("invalid pipeline configuration: {0}")]
    Invalid(String),
}

/// Tunables for both passes. Both passes must use the same `bin_size`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Bin width in bases.
    pub bin_size: u64,
    /// KLL accuracy parameter `k`.
    pub sketch_k: u32,
    /// Deletion ratio `D`.
    pub deletion_ratio: f64,
    /// Duplication ratio `U`.
    pub duplication_ratio: f64,
    /// Minimum run length (in bins) kept after segmentation.
    pub min_bins: u64,
    /// Alignments dropped before binning.
    pub flag_filter: FlagFilter,
}

impl PipelineConfig {
    /// Configuration with defaults for everything except the bin width.
    pub fn new(bin_size: u64) -> Self {
        Self {
            bin_size,
            sketch_k: DEFAULT_K,
            deletion_ratio: DEFAULT_DELETION_RATIO,
            duplication_ratio: DEFAULT_DUPLICATION_RATIO,
            min_bins: 1,
            flag_filter: FlagFilter::default(),
        }
    }

    /// Set the sketch accuracy parameter.
    pub fn with_sketch_k(mut self, k: u32) -> Self {
        self.sketch_k = k;
        self
    }

    /// Set the deletion and duplication ratios.
    pub fn with_ratios(mut self, deletion_ratio: f64, duplication_ratio: f64) -> Self {
        self.deletion_ratio = deletion_ratio;
        self.duplication_ratio = duplication_ratio;
        self
    }

    /// Set the minimum call length in bins.
    pub fn with_min_bins(mut self, min_bins: u64) -> Self {
        self.min_bins = min_bins;
        self
    }

    /// Replace the pre-binning flag filter.
    pub fn with_flag_filter(mut self, flag_filter: FlagFilter) -> Self {
        self.flag_filter = flag_filter;
        self
    }

    /// Check ranges and the ordering of the ratios.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bin_size == 0 {
            return Err(ConfigError::Invalid("bin size must be > 0".to_string()));
        }
        if self.sketch_k < MIN_K {
            return Err(ConfigError::Invalid(format!(
                "sketch k must be >= {MIN_K}, got {}",
                self.sketch_k
            )));
        }
        for (name, ratio) in [
            ("deletion ratio", self.deletion_ratio),
            ("duplication ratio", self.duplication_ratio),
        ] {
            if !ratio.is_finite() || ratio < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a finite non-negative number, got {ratio}"
                )));
            }
        }
        if self.deletion_ratio >= self.duplication_ratio {
            return Err(ConfigError::Invalid(format!(
                "deletion ratio {} must be below duplication ratio {}",
                self.deletion_ratio, self.duplication_ratio
            )));
        }
        Ok(())
    }

    /// Baseline computer using this configuration's ratios.
    pub fn baseline_computer(&self) -> BaselineComputer {
        BaselineComputer::new(self.deletion_ratio, self.duplication_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::FLAG_DUPLICATE;

    #[test]
    fn defaults_match_documented_tunables() {
        let config = PipelineConfig::new(1000);
        assert_eq!(config.sketch_k, 200);
        assert_eq!(config.deletion_ratio, 0.5);
        assert_eq!(config.duplication_ratio, 1.5);
        assert_eq!(config.min_bins, 1);
        assert_eq!(config.flag_filter, FlagFilter::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builders_override_fields() {
        let config = PipelineConfig::new(500)
            .with_sketch_k(400)
            .with_ratios(0.3, 2.0)
            .with_min_bins(3)
            .with_flag_filter(FlagFilter::new(FLAG_DUPLICATE));
        assert_eq!(config.sketch_k, 400);
        assert_eq!((config.deletion_ratio, config.duplication_ratio), (0.3, 2.0));
        assert_eq!(config.min_bins, 3);
        assert_eq!(config.flag_filter.exclude_mask(), FLAG_DUPLICATE);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(PipelineConfig::new(0).validate().is_err());
        assert!(PipelineConfig::new(100).with_sketch_k(4).validate().is_err());
        assert!(PipelineConfig::new(100).with_ratios(1.5, 0.5).validate().is_err());
        assert!(PipelineConfig::new(100).with_ratios(f64::NAN, 1.5).validate().is_err());
        assert!(PipelineConfig::new(100).with_ratios(-0.1, 1.5).validate().is_err());
    }
}
