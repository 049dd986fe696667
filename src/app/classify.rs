//! Top-K classification results.
//!
//! Output tensors are reduced to a short, ordered list of `(id, score)`
//! pairs with the same rules the Coral classify adapter uses: drop scores
//! below the threshold, highest score first, at most `top_k` entries.

use heapless::Vec;

use crate::config::MAX_TOP_K;

/// One labelled score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Class {
    pub id: u16,
    /// Confidence in `[0, 1]`.
    pub score: f32,
}

/// Ordered (best first) classification, at most [`MAX_TOP_K`] long.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassificationResult {
    classes: Vec<Class, MAX_TOP_K>,
}

impl ClassificationResult {
    /// Build from a full score vector indexed by class id.
    pub fn from_scores(scores: &[f32], top_k: usize, threshold: f32) -> Self {
        let top_k = top_k.min(MAX_TOP_K);
        let mut best: Vec<Class, MAX_TOP_K> = Vec::new();

        for (id, &raw) in scores.iter().enumerate() {
            if raw.is_nan() {
                continue;
            }
            let score = raw.clamp(0.0, 1.0);
            if score < threshold {
                continue;
            }
            let candidate = Class { id: id as u16, score };

            // Insertion into a short sorted list; ids arrive ascending so
            // equal scores keep the lower id first.
            let pos = best
                .iter()
                .position(|c| c.score < candidate.score)
                .unwrap_or(best.len());
            if pos >= top_k {
                continue;
            }
            if best.len() == top_k {
                best.pop();
            }
            // Capacity was just ensured above.
            let _ = best.insert(pos, candidate);
        }

        Self { classes: best }
    }

    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    pub fn top(&self) -> Option<Class> {
        self.classes.first().copied()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Quantised `u8` output to a real score.
pub fn dequantize(q: u8, scale: f32, zero_point: i32) -> f32 {
    scale * (i32::from(q) - zero_point) as f32
}
