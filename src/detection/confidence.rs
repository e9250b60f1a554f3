use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{ConfidenceMode, ConfidenceRange};
use crate::models::{BoundingBox, DetectionMethod};

const GOLDEN: u64 = 0x9E37_79B9_7F4A_7C15;

/// Turns a detector's unit score into a confidence in the method's range.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceScorer {
    mode: ConfidenceMode,
    range: ConfidenceRange,
    salt: u64,
}

impl ConfidenceScorer {
    pub fn new(mode: ConfidenceMode, range: ConfidenceRange, method: DetectionMethod) -> Self {
        Self {
            mode,
            range,
            salt: (method.priority() as u64 + 1).wrapping_mul(GOLDEN),
        }
    }

    pub fn range(&self) -> ConfidenceRange {
        self.range
    }

    /// Confidence for a candidate at `bbox` whose geometric score is `derived`.
    ///
    /// In sampled mode the draw depends only on the seed, the method and the
    /// box, so the same frame always yields the same confidences.
    pub fn score(&self, bbox: &BoundingBox, derived: f32) -> f32 {
        match self.mode {
            ConfidenceMode::Derived => self.range.scale(derived),
            ConfidenceMode::Sampled { seed } => {
                if self.range.high <= self.range.low {
                    return self.range.low;
                }
                let mut rng = StdRng::seed_from_u64(seed ^ self.salt ^ bbox_key(bbox));
                rng.random_range(self.range.low..=self.range.high)
            }
        }
    }
}

fn bbox_key(bbox: &BoundingBox) -> u64 {
    let packed = ((bbox.x1 as u64) << 48)
        ^ ((bbox.y1 as u64) << 32)
        ^ ((bbox.x2 as u64) << 16)
        ^ bbox.y2 as u64;
    mix64(packed)
}

/// SplitMix64 finalizer.
pub(crate) fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(GOLDEN);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
