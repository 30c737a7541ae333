/// Result aggregation module
///
/// Turns a probability vector into a ranked candidate list and applies the
/// three-tier confidence policy: silent skip, zero-confidence placeholder,
/// or full top-K emission with word counting and a debounce cooldown.

use std::time::Duration;
use tracing::debug;

/// Label used for the placeholder result when the best candidate clears the
/// probability threshold but is not confident enough to count as a word.
pub const NO_MATCH_LABEL: &str = "no-match";

/// Top confidence above which a detection is counted and debounced.
const DETECTION_CONFIDENCE: f32 = 0.5;

/// One ranked candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub label: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
}

/// Outcome of aggregating one cycle's probabilities.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Best candidate at or below the probability threshold: the pipeline
    /// stays silent for this cycle.
    Silent,

    /// Best candidate above the threshold but not confident enough: a single
    /// zero-confidence placeholder, word count unchanged, no cooldown.
    NoMatch(ClassificationResult),

    /// Confident detection: the full top-K set, word count incremented, and
    /// the cooldown delay applies before the next cycle.
    Detected(Vec<ClassificationResult>),
}

/// Aggregates probabilities into ranked results and tracks the word count.
pub struct ResultAggregator {
    probability_threshold: f32,
    top_k: usize,
    cooldown: Duration,
    word_count: u64,
}

impl ResultAggregator {
    pub fn new(probability_threshold: f32, top_k: usize, cooldown: Duration) -> Self {
        Self {
            probability_threshold,
            top_k,
            cooldown,
            word_count: 0,
        }
    }

    /// Pair probabilities with labels, rank descending, truncate to top-K,
    /// and apply the confidence tiers.
    pub fn aggregate(&mut self, probabilities: &[f32], labels: &[String]) -> CycleOutcome {
        let mut candidates: Vec<ClassificationResult> = labels
            .iter()
            .zip(probabilities)
            .map(|(label, &confidence)| ClassificationResult {
                label: label.clone(),
                confidence,
            })
            .collect();

        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        candidates.truncate(self.top_k);

        let top = candidates.first().map(|r| r.confidence).unwrap_or(0.0);

        if top <= self.probability_threshold {
            debug!(top, threshold = self.probability_threshold, "below threshold");
            return CycleOutcome::Silent;
        }

        if top <= DETECTION_CONFIDENCE {
            debug!(top, "low-confidence candidate, emitting placeholder");
            return CycleOutcome::NoMatch(ClassificationResult {
                label: NO_MATCH_LABEL.to_string(),
                confidence: 0.0,
            });
        }

        self.word_count += 1;
        debug!(
            top,
            word_count = self.word_count,
            best = %candidates[0].label,
            "detection"
        );
        CycleOutcome::Detected(candidates)
    }

    /// Words detected since the session started.
    pub fn word_count(&self) -> u64 {
        self.word_count
    }

    /// Debounce delay applied after a confident detection.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
