//! crates/companion_core/src/report.rs
//!
//! Builds the narrative depression report from a user's recent emotional events.
//! Reports are derived on demand; the event log stays the source of truth.

use chrono::{DateTime, Utc};

use crate::domain::{
    DepressionLevel, DepressionReport, EmotionBreakdown, EmotionLabel, EmotionalEvent,
    Recommendation,
};
use crate::scoring::{mean_score, ScoringPolicy};

/// Number of most recent events a narrative report covers.
pub const REPORT_WINDOW: usize = 20;

/// Number of most recent depression records in the time-series view.
pub const TREND_WINDOW: usize = 30;

const SUMMARY_HIGH: &str = "Based on your conversation patterns, there are indicators of significant depressive symptoms. The analysis shows persistent negative emotional expressions and language patterns associated with depression.";
const SUMMARY_MODERATE: &str = "Your conversation patterns show some indicators of mild to moderate depressive symptoms. While there are some positive emotions present, there are also notable periods of negative emotional expression.";
const SUMMARY_LOW: &str = "Based on your conversation patterns, your depression risk appears to be low. The analysis shows generally balanced emotional responses with predominantly positive or neutral expressions.";

pub const NOT_ENOUGH_DATA: &str =
    "There isn't enough emotional data to provide a detailed analysis.";

const MINDFULNESS: Recommendation = Recommendation {
    title: "Practice Mindfulness",
    text: "Take 5-10 minutes each day for mindful breathing or meditation to center yourself and reduce stress.",
    icon: "fa-leaf",
};

const HIGH_RISK_RECOMMENDATIONS: [Recommendation; 2] = [
    Recommendation {
        title: "Seek Professional Support",
        text: "Consider reaching out to a mental health professional to discuss your feelings and explore treatment options.",
        icon: "fa-user-md",
    },
    Recommendation {
        title: "Establish Daily Routine",
        text: "Create and maintain a structured daily routine, including regular sleep times, meals, and activities.",
        icon: "fa-calendar",
    },
];

const MODERATE_RISK_RECOMMENDATIONS: [Recommendation; 2] = [
    Recommendation {
        title: "Physical Activity",
        text: "Aim for 30 minutes of moderate exercise at least 3 times a week to boost mood and energy levels.",
        icon: "fa-walking",
    },
    Recommendation {
        title: "Social Connection",
        text: "Schedule time to connect with supportive friends or family members, even if briefly.",
        icon: "fa-users",
    },
];

const LOW_RISK_RECOMMENDATIONS: [Recommendation; 2] = [
    Recommendation {
        title: "Maintain Healthy Habits",
        text: "Continue with activities that bring you joy and maintain your well-being.",
        icon: "fa-heart",
    },
    Recommendation {
        title: "Preventive Self-Care",
        text: "Practice regular self-care activities to maintain your emotional resilience.",
        icon: "fa-spa",
    },
];

/// Builds a report over `events` (newest first); only the first `REPORT_WINDOW` are used.
pub fn build_report(
    events: &[EmotionalEvent],
    policy: &ScoringPolicy,
    generated_at: DateTime<Utc>,
) -> DepressionReport {
    let window = &events[..events.len().min(REPORT_WINDOW)];
    let depression_score = mean_score(window);
    let level = policy.classify(depression_score);
    let emotions = emotion_breakdown(window);

    DepressionReport {
        depression_score,
        level,
        emotion_analysis: describe_emotions(&emotions),
        emotions,
        summary: summary_for(level),
        recommendations: recommendations_for(level),
        generated_at,
    }
}

/// Groups events by label; sorted by mean confidence, highest first.
/// Equal means keep first-seen order.
pub fn emotion_breakdown(events: &[EmotionalEvent]) -> Vec<EmotionBreakdown> {
    let mut totals: Vec<(EmotionLabel, usize, f64)> = Vec::new();
    for event in events {
        let label = event.raw_emotion.label;
        match totals.iter_mut().find(|(l, _, _)| *l == label) {
            Some((_, count, sum)) => {
                *count += 1;
                *sum += event.raw_emotion.score;
            }
            None => totals.push((label, 1, event.raw_emotion.score)),
        }
    }

    let mut breakdown: Vec<EmotionBreakdown> = totals
        .into_iter()
        .map(|(label, count, sum)| EmotionBreakdown {
            label,
            count,
            average_confidence: sum / count as f64,
        })
        .collect();
    breakdown.sort_by(|a, b| b.average_confidence.total_cmp(&a.average_confidence));
    breakdown
}

fn summary_for(level: DepressionLevel) -> &'static str {
    match level {
        DepressionLevel::High => SUMMARY_HIGH,
        DepressionLevel::Moderate => SUMMARY_MODERATE,
        DepressionLevel::Low => SUMMARY_LOW,
    }
}

/// The "dominant emotion" sentence driven by the top breakdown entry.
fn describe_emotions(emotions: &[EmotionBreakdown]) -> String {
    let Some(dominant) = emotions.first() else {
        return NOT_ENOUGH_DATA.to_string();
    };

    match dominant.label {
        EmotionLabel::Joy => "Your conversations show predominantly positive emotions, with joy being the most frequent. This suggests a generally positive outlook.".to_string(),
        EmotionLabel::Sadness | EmotionLabel::Fear | EmotionLabel::Anger => {
            let secondary = emotions
                .get(1)
                .map(|e| e.label.as_str())
                .unwrap_or("other emotions");
            format!(
                "Your conversations show a significant presence of {}, which can be associated with depressive states when persistent. There are also signs of {}.",
                dominant.label, secondary
            )
        }
        other => format!(
            "Your conversations show a mix of emotions, with {} being most prominent. The emotional variety suggests normal emotional fluctuations.",
            other
        ),
    }
}

/// One universal item plus the tier-specific pair.
pub fn recommendations_for(level: DepressionLevel) -> Vec<Recommendation> {
    let tier = match level {
        DepressionLevel::High => HIGH_RISK_RECOMMENDATIONS,
        DepressionLevel::Moderate => MODERATE_RISK_RECOMMENDATIONS,
        DepressionLevel::Low => LOW_RISK_RECOMMENDATIONS,
    };
    let mut recommendations = vec![MINDFULNESS];
    recommendations.extend(tier);
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EmotionEstimate, EventSource};
    use EmotionLabel::*;

    fn event(label: EmotionLabel, confidence: f64, score: f64) -> EmotionalEvent {
        EmotionalEvent {
            timestamp: Utc::now(),
            source: EventSource::Chat,
            raw_emotion: EmotionEstimate::new(label, confidence),
            depression_score: score,
        }
    }

    #[test]
    fn empty_history_reports_low_with_no_data() {
        let report = build_report(&[], &ScoringPolicy::default(), Utc::now());
        assert_eq!(report.depression_score, 0.0);
        assert_eq!(report.level, DepressionLevel::Low);
        assert!(report.emotions.is_empty());
        assert_eq!(report.emotion_analysis, NOT_ENOUGH_DATA);
        let titles: Vec<&str> = report.recommendations.iter().map(|r| r.title).collect();
        assert_eq!(
            titles,
            vec!["Practice Mindfulness", "Maintain Healthy Habits", "Preventive Self-Care"]
        );
    }

    #[test]
    fn high_risk_report_mentions_secondary_emotion() {
        let events = vec![
            event(Sadness, 0.9, 0.72),
            event(Sadness, 0.8, 0.64),
            event(Fear, 0.7, 0.42),
            event(Sadness, 1.0, 0.8),
        ];
        let report = build_report(&events, &ScoringPolicy::default(), Utc::now());
        assert_eq!(report.level, DepressionLevel::High);
        assert_eq!(report.summary, SUMMARY_HIGH);
        assert_eq!(report.emotions[0].label, Sadness);
        assert_eq!(report.emotions[0].count, 3);
        assert!((report.emotions[0].average_confidence - 0.9).abs() < 1e-9);
        assert!(report.emotion_analysis.contains("presence of sadness"));
        assert!(report.emotion_analysis.contains("signs of fear"));
        assert_eq!(report.recommendations[1].title, "Seek Professional Support");
    }

    #[test]
    fn breakdown_sorts_by_mean_confidence_not_count() {
        let events = vec![
            event(Neutral, 0.4, 0.08),
            event(Neutral, 0.5, 0.1),
            event(Joy, 0.95, 0.0),
        ];
        let breakdown = emotion_breakdown(&events);
        assert_eq!(breakdown[0].label, Joy);
        assert_eq!(breakdown[1].label, Neutral);
        assert_eq!(breakdown[1].count, 2);

        let report = build_report(&events, &ScoringPolicy::default(), Utc::now());
        assert!(report.emotion_analysis.contains("predominantly positive"));
    }

    #[test]
    fn lone_negative_emotion_falls_back_to_other_emotions() {
        let report = build_report(
            &[event(Anger, 0.9, 0.36)],
            &ScoringPolicy::default(),
            Utc::now(),
        );
        assert_eq!(report.level, DepressionLevel::Moderate);
        assert!(report.emotion_analysis.ends_with("signs of other emotions."));
        assert_eq!(report.recommendations[1].title, "Physical Activity");
    }

    #[test]
    fn other_dominant_emotion_uses_mixed_template() {
        let report = build_report(
            &[event(Surprise, 0.8, 0.08)],
            &ScoringPolicy::default(),
            Utc::now(),
        );
        assert!(report.emotion_analysis.contains("with surprise being most prominent"));
    }

    #[test]
    fn only_twenty_most_recent_events_count() {
        let mut events: Vec<EmotionalEvent> = (0..20).map(|_| event(Joy, 0.9, 0.0)).collect();
        events.extend((0..10).map(|_| event(Sadness, 1.0, 0.8)));
        let report = build_report(&events, &ScoringPolicy::default(), Utc::now());
        assert_eq!(report.depression_score, 0.0);
        assert_eq!(report.emotions.len(), 1);
    }
}
