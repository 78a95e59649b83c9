//! crates/companion_core/src/scoring.rs
//!
//! Maps a fused emotion to a depression score and a three-tier risk level.
//!
//! The mapping is a transparent linear model: `indicator_weight[label] * confidence`,
//! rounded to two decimals, then a fixed-threshold step function. The weights and
//! thresholds live in a `ScoringPolicy` so they can be calibrated without code changes.

use std::collections::HashMap;

use crate::domain::{
    DepressionAnalysis, DepressionLevel, EmotionLabel, EmotionalEvent, FusedEmotion, RiskSummary,
};

/// Number of most recent events behind the live risk badge.
pub const RISK_WINDOW: usize = 5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("indicator weight for '{0}' must lie in [0, 1], got {1}")]
    WeightOutOfRange(String, f64),
    #[error("threshold {0} must lie in [0, 1], got {1}")]
    ThresholdOutOfRange(&'static str, f64),
    #[error("moderate threshold {0} exceeds high threshold {1}")]
    ThresholdsInverted(f64, f64),
}

/// Indicator weights and level thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPolicy {
    indicator_weights: HashMap<EmotionLabel, f64>,
    default_weight: f64,
    moderate_threshold: f64,
    high_threshold: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        let indicator_weights = HashMap::from([
            (EmotionLabel::Sadness, 0.8),
            (EmotionLabel::Fear, 0.6),
            (EmotionLabel::Disgust, 0.5),
            (EmotionLabel::Anger, 0.4),
            (EmotionLabel::Neutral, 0.2),
            (EmotionLabel::Surprise, 0.1),
            (EmotionLabel::Joy, 0.0),
        ]);
        Self {
            indicator_weights,
            default_weight: 0.3,
            moderate_threshold: 0.3,
            high_threshold: 0.6,
        }
    }
}

impl ScoringPolicy {
    /// Builds a validated policy. Labels missing from `indicator_weights` use `default_weight`.
    pub fn new(
        indicator_weights: HashMap<EmotionLabel, f64>,
        default_weight: f64,
        moderate_threshold: f64,
        high_threshold: f64,
    ) -> Result<Self, PolicyError> {
        for (label, weight) in &indicator_weights {
            if !(0.0..=1.0).contains(weight) {
                return Err(PolicyError::WeightOutOfRange(label.to_string(), *weight));
            }
        }
        if !(0.0..=1.0).contains(&default_weight) {
            return Err(PolicyError::WeightOutOfRange("default".to_string(), default_weight));
        }
        if !(0.0..=1.0).contains(&moderate_threshold) {
            return Err(PolicyError::ThresholdOutOfRange("moderate", moderate_threshold));
        }
        if !(0.0..=1.0).contains(&high_threshold) {
            return Err(PolicyError::ThresholdOutOfRange("high", high_threshold));
        }
        if moderate_threshold > high_threshold {
            return Err(PolicyError::ThresholdsInverted(moderate_threshold, high_threshold));
        }
        Ok(Self {
            indicator_weights,
            default_weight,
            moderate_threshold,
            high_threshold,
        })
    }

    pub fn indicator_weight(&self, label: EmotionLabel) -> f64 {
        self.indicator_weights
            .get(&label)
            .copied()
            .unwrap_or(self.default_weight)
    }

    pub fn indicator_weights(&self) -> &HashMap<EmotionLabel, f64> {
        &self.indicator_weights
    }

    pub fn default_weight(&self) -> f64 {
        self.default_weight
    }

    pub fn moderate_threshold(&self) -> f64 {
        self.moderate_threshold
    }

    pub fn high_threshold(&self) -> f64 {
        self.high_threshold
    }

    /// `score < moderate → low`, `moderate ≤ score < high → moderate`, `score ≥ high → high`.
    pub fn classify(&self, score: f64) -> DepressionLevel {
        if score >= self.high_threshold {
            DepressionLevel::High
        } else if score >= self.moderate_threshold {
            DepressionLevel::Moderate
        } else {
            DepressionLevel::Low
        }
    }

    /// Scores one fused emotion. The level is derived from the rounded score.
    pub fn score(&self, fused: &FusedEmotion) -> DepressionAnalysis {
        let raw = self.indicator_weight(fused.label) * fused.score;
        let depression_score = round2(raw.clamp(0.0, 1.0));
        DepressionAnalysis {
            depression_score,
            depression_level: self.classify(depression_score),
        }
    }

    /// Mean depression score over the most recent `RISK_WINDOW` events
    /// (`events` ordered newest first).
    pub fn risk_summary(&self, events: &[EmotionalEvent]) -> RiskSummary {
        let window = &events[..events.len().min(RISK_WINDOW)];
        let average_score = round2(mean_score(window));
        RiskSummary {
            average_score,
            level: self.classify(average_score),
            sample_size: window.len(),
        }
    }
}

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Mean `depression_score` of the given events; 0 for an empty slice.
pub fn mean_score(events: &[EmotionalEvent]) -> f64 {
    if events.is_empty() {
        return 0.0;
    }
    events.iter().map(|e| e.depression_score).sum::<f64>() / events.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EmotionEstimate, EventSource};
    use chrono::Utc;
    use EmotionLabel::*;

    fn event(score: f64) -> EmotionalEvent {
        EmotionalEvent {
            timestamp: Utc::now(),
            source: EventSource::Chat,
            raw_emotion: EmotionEstimate::new(Neutral, 0.5),
            depression_score: score,
        }
    }

    #[test]
    fn sadness_scenario_is_high() {
        let policy = ScoringPolicy::default();
        let analysis = policy.score(&EmotionEstimate::new(Sadness, 0.9));
        assert_eq!(analysis.depression_score, 0.72);
        assert_eq!(analysis.depression_level, DepressionLevel::High);
    }

    #[test]
    fn unknown_label_uses_default_weight() {
        let policy = ScoringPolicy::default();
        let analysis = policy.score(&EmotionEstimate::new(Unknown, 1.0));
        assert_eq!(analysis.depression_score, 0.3);
        assert_eq!(analysis.depression_level, DepressionLevel::Moderate);
        assert_eq!(policy.score(&EmotionEstimate::unknown()).depression_score, 0.0);
    }

    #[test]
    fn levels_are_stable_at_boundaries() {
        let policy = ScoringPolicy::default();
        assert_eq!(policy.classify(0.29), DepressionLevel::Low);
        assert_eq!(policy.classify(0.3), DepressionLevel::Moderate);
        assert_eq!(policy.classify(0.59), DepressionLevel::Moderate);
        assert_eq!(policy.classify(0.6), DepressionLevel::High);
        assert_eq!(policy.classify(1.0), DepressionLevel::High);
        assert_eq!(policy.classify(0.0), DepressionLevel::Low);
    }

    #[test]
    fn score_is_monotonic_in_confidence() {
        let policy = ScoringPolicy::default();
        for label in EmotionLabel::ALL {
            let mut previous = -1.0;
            for step in 0..=20 {
                let confidence = step as f64 / 20.0;
                let score = policy.score(&EmotionEstimate::new(label, confidence)).depression_score;
                assert!(score >= previous, "{label} not monotonic at {confidence}");
                assert!((0.0..=1.0).contains(&score));
                previous = score;
            }
        }
    }

    #[test]
    fn indicator_ordering_holds_for_equal_confidence() {
        let policy = ScoringPolicy::default();
        let ordered = [Sadness, Fear, Disgust, Anger, Neutral, Surprise, Joy];
        for confidence in [0.1, 0.5, 0.77, 1.0] {
            let scores: Vec<f64> = ordered
                .iter()
                .map(|l| policy.score(&EmotionEstimate::new(*l, confidence)).depression_score)
                .collect();
            assert!(scores.windows(2).all(|w| w[0] >= w[1]), "{scores:?}");
        }
    }

    #[test]
    fn custom_policy_is_validated() {
        assert!(ScoringPolicy::new(HashMap::new(), 0.3, 0.7, 0.4).is_err());
        assert!(ScoringPolicy::new(HashMap::from([(Joy, 1.5)]), 0.3, 0.3, 0.6).is_err());

        let policy = ScoringPolicy::new(HashMap::from([(Joy, 0.5)]), 0.1, 0.2, 0.4).unwrap();
        let analysis = policy.score(&EmotionEstimate::new(Joy, 0.8));
        assert_eq!(analysis.depression_score, 0.4);
        assert_eq!(analysis.depression_level, DepressionLevel::High);
        assert_eq!(policy.indicator_weight(Sadness), 0.1);
    }

    #[test]
    fn risk_summary_uses_five_most_recent() {
        let policy = ScoringPolicy::default();
        let events: Vec<EmotionalEvent> =
            [0.8, 0.7, 0.6, 0.7, 0.7, 0.0, 0.0].into_iter().map(event).collect();
        let summary = policy.risk_summary(&events);
        assert_eq!(summary.sample_size, 5);
        assert_eq!(summary.average_score, 0.7);
        assert_eq!(summary.level, DepressionLevel::High);
    }

    #[test]
    fn risk_summary_of_nothing_is_low() {
        let summary = ScoringPolicy::default().risk_summary(&[]);
        assert_eq!(summary.average_score, 0.0);
        assert_eq!(summary.level, DepressionLevel::Low);
        assert_eq!(summary.sample_size, 0);
    }
}
