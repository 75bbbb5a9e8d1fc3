use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use super::{check_rank, QuantileEstimator, SketchError};

/// Default accuracy parameter (~1.65% normalized rank error).
pub const DEFAULT_K: u32 = 200;
/// Smallest accepted accuracy parameter; also the floor on level capacity.
pub const MIN_K: u32 = 8;

const SEED: u64 = 0x6b6c_6c5f_636e_7673;

/// KLL quantile sketch.
///
/// Items live in a hierarchy of compactors; an item at level `h` stands for
/// `2^h` inserted values. When the sketch exceeds its total capacity the
/// lowest full level is sorted and a random half of it (odd or even
/// positions) is promoted one level up.
#[derive(Debug, Clone)]
pub struct KllSketch {
    k: u32,
    levels: Vec<Vec<f64>>,
    n: u64,
    min: f64,
    max: f64,
    rng: SmallRng,
}

impl KllSketch {
    /// Create an empty sketch. `k` is clamped to at least [`MIN_K`].
    pub fn new(k: u32) -> Self {
        Self {
            k: k.max(MIN_K),
            levels: vec![Vec::new()],
            n: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            rng: SmallRng::seed_from_u64(SEED),
        }
    }

    /// Accuracy parameter.
    pub fn k(&self) -> u32 {
        self.k
    }

    /// Number of compactor levels.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Capacity of `level` given the current height of the hierarchy.
    fn level_capacity(&self, level: usize) -> usize {
        let depth = (self.levels.len() - level - 1) as i32;
        let cap = (self.k as f64 * (2.0f64 / 3.0).powi(depth)).ceil() as usize;
        cap.max(MIN_K as usize)
    }

    fn total_capacity(&self) -> usize {
        (0..self.levels.len()).map(|h| self.level_capacity(h)).sum()
    }

    fn retained(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Merge another sketch into this one.
    pub fn merge(&mut self, other: &KllSketch) -> Result<(), SketchError> {
        if other.k != self.k {
            return Err(SketchError::IncompatibleMerge {
                left: self.k,
                right: other.k,
            });
        }
        if other.n == 0 {
            return Ok(());
        }

        while self.levels.len() < other.levels.len() {
            self.levels.push(Vec::new());
        }
        for (level, items) in other.levels.iter().enumerate() {
            self.levels[level].extend_from_slice(items);
        }
        self.n += other.n;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);

        self.compress_while_over();
        Ok(())
    }

    fn compress_while_over(&mut self) {
        while self.retained() > self.total_capacity() {
            self.compact_lowest_full_level();
        }
    }

    fn compact_lowest_full_level(&mut self) {
        let level = (0..self.levels.len())
            .find(|&h| self.levels[h].len() >= self.level_capacity(h))
            .unwrap_or(0);
        if level + 1 == self.levels.len() {
            self.levels.push(Vec::new());
        }

        let mut items = std::mem::take(&mut self.levels[level]);
        items.sort_unstable_by(f64::total_cmp);

        // An odd leftover stays behind so that total weight is preserved.
        let keep = items.len() % 2;
        let offset = usize::from(self.rng.gen::<bool>());
        let promoted: Vec<f64> = items[keep..]
            .iter()
            .skip(offset)
            .step_by(2)
            .copied()
            .collect();

        items.truncate(keep);
        self.levels[level] = items;
        self.levels[level + 1].extend(promoted);
    }

    /// `(item, weight)` pairs sorted by item.
    fn weighted_items(&self) -> Vec<(f64, u64)> {
        let mut weighted: Vec<(f64, u64)> = self
            .levels
            .iter()
            .enumerate()
            .flat_map(|(level, items)| items.iter().map(move |&item| (item, 1u64 << level)))
            .collect();
        weighted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
        weighted
    }
}

impl Default for KllSketch {
    fn default() -> Self {
        Self::new(DEFAULT_K)
    }
}

impl QuantileEstimator for KllSketch {
    fn update(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.levels[0].push(value);
        self.n += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.compress_while_over();
    }

    fn quantile(&self, q: f64) -> Result<f64, SketchError> {
        check_rank(q)?;
        if self.n == 0 {
            return Err(SketchError::Empty);
        }
        if q == 0.0 {
            return Ok(self.min);
        }
        if q == 1.0 {
            return Ok(self.max);
        }

        let weighted = self.weighted_items();
        let total: u64 = weighted.iter().map(|&(_, w)| w).sum();
        let target = target_weight(q, total);

        let mut cumulative = 0u64;
        for &(item, weight) in &weighted {
            cumulative += weight;
            if cumulative >= target {
                return Ok(item);
            }
        }
        Ok(self.max)
    }

    fn rank(&self, value: f64, inclusive: bool) -> Result<f64, SketchError> {
        if self.n == 0 {
            return Err(SketchError::Empty);
        }
        let mut below = 0u64;
        let mut total = 0u64;
        for (level, items) in self.levels.iter().enumerate() {
            let weight = 1u64 << level;
            total += weight * items.len() as u64;
            let hits = items
                .iter()
                .filter(|&&item| if inclusive { item <= value } else { item < value })
                .count() as u64;
            below += weight * hits;
        }
        Ok(below as f64 / total as f64)
    }

    fn min(&self) -> Option<f64> {
        (self.n > 0).then_some(self.min)
    }

    fn max(&self) -> Option<f64> {
        (self.n > 0).then_some(self.max)
    }

    fn count(&self) -> u64 {
        self.n
    }

    fn retained_count(&self) -> usize {
        self.retained()
    }

    fn serialized_size(&self) -> usize {
        const ITEM: usize = std::mem::size_of::<f64>();
        match self.n {
            0 => 8,
            1 => 8 + ITEM,
            _ => 20 + 4 * (self.levels.len() + 1) + 2 * ITEM + ITEM * self.retained(),
        }
    }

    fn accuracy_parameter(&self) -> u32 {
        self.k
    }
}

/// Smallest cumulative weight that satisfies inclusive rank `q`.
fn target_weight(q: f64, total: u64) -> u64 {
    let raw = q * total as f64;
    let rounded = raw.round();
    let target = if (raw - rounded).abs() < 1e-9 {
        rounded
    } else {
        raw.ceil()
    };
    (target as u64).max(1)
}
