//! Sampling plan (spec.md §4.3): the sorted set of block indices a
//! sampling-mode run visits.

use std::collections::BTreeSet;

use rand::Rng;

use crate::error::EngineError;

/// Density above which rejection sampling degrades to quadratic
/// behavior; denser sampling needs a different sampler and is refused.
pub const MAX_SAMPLING_FRACTION: f64 = 0.2;

/// An immutable, ascending set of block indices to visit.
#[derive(Debug, Clone)]
pub struct SamplingPlan {
    blocks: Vec<u64>,
}

impl SamplingPlan {
    /// Draw uniform integers in `[0, max_blocks)` via rejection sampling
    /// into an ordered set until its size reaches `ceil(f * max_blocks)`.
    /// Iteration order is ascending index, not draw order.
    pub fn build<R: Rng>(max_blocks: u64, fraction: f64, rng: &mut R) -> Result<Self, EngineError> {
        validate_fraction(fraction)?;
        if max_blocks == 0 {
            return Ok(Self { blocks: Vec::new() });
        }

        let target = (fraction * max_blocks as f64).ceil() as u64;
        let target = target.min(max_blocks);
        let mut set = BTreeSet::new();
        while (set.len() as u64) < target {
            set.insert(rng.random_range(0..max_blocks));
        }

        Ok(Self { blocks: set.into_iter().collect() })
    }

    pub fn cardinality(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[u64] {
        &self.blocks
    }
}

pub fn validate_fraction(fraction: f64) -> Result<(), EngineError> {
    if !(fraction > 0.0 && fraction < 1.0) {
        return Err(EngineError::Configuration(format!(
            "sampling_fraction must be in (0, 1), got {fraction}"
        )));
    }
    if fraction >= MAX_SAMPLING_FRACTION {
        return Err(EngineError::Configuration(format!(
            "sampling_fraction {fraction} >= {MAX_SAMPLING_FRACTION}: rejection sampling is \
             quadratic at this density, use a lower fraction"
        )));
    }
    Ok(())
}

pub fn validate_passes(passes: u32) -> Result<(), EngineError> {
    if passes == 0 {
        return Err(EngineError::Configuration("sampling_passes must be >= 1".into()));
    }
    Ok(())
}
