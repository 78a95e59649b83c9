//! crates/companion_core/src/fusion.rs
//!
//! Reconciles independent per-modality classifications into one estimate.
//!
//! Weights encode a reliability prior: text is the most diagnostic modality and the
//! facial image the least. When two modalities agree their weighted evidence is summed;
//! when they disagree the larger weighted score wins outright.

use crate::domain::{EmotionEstimate, EmotionLabel, FusedEmotion};

pub const TEXT_IMAGE_WEIGHTS: (f64, f64) = (0.7, 0.3);
pub const AUDIO_IMAGE_WEIGHTS: (f64, f64) = (0.6, 0.4);
/// (text, audio, image)
pub const TRIMODAL_WEIGHTS: (f64, f64, f64) = (0.5, 0.3, 0.2);

/// Fuses whichever modality estimates are present for the current input.
///
/// text+audio without an image has no pairwise rule; the text estimate passes
/// through, following the text > audio > image precedence of the single-input case.
pub fn fuse(
    text: Option<EmotionEstimate>,
    audio: Option<EmotionEstimate>,
    image: Option<EmotionEstimate>,
) -> FusedEmotion {
    match (text, audio, image) {
        (None, None, None) => EmotionEstimate::unknown(),
        (Some(t), None, Some(i)) => fuse_pair(t, i, TEXT_IMAGE_WEIGHTS),
        (None, Some(a), Some(i)) => fuse_pair(a, i, AUDIO_IMAGE_WEIGHTS),
        (Some(t), Some(a), Some(i)) => fuse_trimodal(t, a, i),
        (Some(t), _, None) => t,
        (None, Some(a), None) => a,
        (None, None, Some(i)) => i,
    }
}

/// Two-input rule. On a weighted tie across differing labels the first input wins.
fn fuse_pair(a: EmotionEstimate, b: EmotionEstimate, (wa, wb): (f64, f64)) -> FusedEmotion {
    let weighted_a = a.score * wa;
    let weighted_b = b.score * wb;

    if a.label == b.label {
        return EmotionEstimate::new(a.label, weighted_a + weighted_b);
    }

    if weighted_a >= weighted_b {
        EmotionEstimate::new(a.label, weighted_a)
    } else {
        EmotionEstimate::new(b.label, weighted_b)
    }
}

/// Three-input rule: weighted scores accumulate per distinct label and the
/// label with the largest total wins. Ties go to the label seen first
/// (text, then audio, then image).
fn fuse_trimodal(text: EmotionEstimate, audio: EmotionEstimate, image: EmotionEstimate) -> FusedEmotion {
    let (wt, wa, wi) = TRIMODAL_WEIGHTS;
    let mut totals: Vec<(EmotionLabel, f64)> = Vec::with_capacity(3);

    for (estimate, weight) in [(text, wt), (audio, wa), (image, wi)] {
        let weighted = estimate.score * weight;
        match totals.iter_mut().find(|(label, _)| *label == estimate.label) {
            Some((_, total)) => *total += weighted,
            None => totals.push((estimate.label, weighted)),
        }
    }

    let mut best = totals[0];
    for &(label, total) in &totals[1..] {
        if total > best.1 {
            best = (label, total);
        }
    }

    EmotionEstimate::new(best.0, best.1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use EmotionLabel::*;

    fn est(label: EmotionLabel, score: f64) -> EmotionEstimate {
        EmotionEstimate::new(label, score)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn no_inputs_is_unknown() {
        let fused = fuse(None, None, None);
        assert_eq!(fused.label, Unknown);
        assert_eq!(fused.score, 0.0);
    }

    #[test]
    fn single_input_passes_through() {
        assert_eq!(fuse(Some(est(Fear, 0.42)), None, None), est(Fear, 0.42));
        assert_eq!(fuse(None, Some(est(Anger, 0.9)), None), est(Anger, 0.9));
        assert_eq!(fuse(None, None, Some(est(Joy, 0.1))), est(Joy, 0.1));
    }

    #[test]
    fn agreeing_pairs_sum_weighted_evidence() {
        for (a, b) in [(0.0, 0.0), (0.3, 0.9), (1.0, 1.0), (0.55, 0.12)] {
            let fused = fuse(Some(est(Sadness, a)), None, Some(est(Sadness, b)));
            assert_eq!(fused.label, Sadness);
            assert!(close(fused.score, a * 0.7 + b * 0.3));

            let fused = fuse(None, Some(est(Joy, a)), Some(est(Joy, b)));
            assert_eq!(fused.label, Joy);
            assert!(close(fused.score, a * 0.6 + b * 0.4));
        }
    }

    #[test]
    fn disagreeing_pair_takes_weighted_maximum() {
        // text joy 0.4 -> 0.28, image sadness 0.95 -> 0.285
        let fused = fuse(Some(est(Joy, 0.4)), None, Some(est(Sadness, 0.95)));
        assert_eq!(fused.label, Sadness);
        assert!(close(fused.score, 0.95 * 0.3));
        assert!(!close(fused.score, 0.95));

        // audio anger 0.8 -> 0.48, image fear 0.9 -> 0.36
        let fused = fuse(None, Some(est(Anger, 0.8)), Some(est(Fear, 0.9)));
        assert_eq!(fused.label, Anger);
        assert!(close(fused.score, 0.48));
    }

    #[test]
    fn disagreeing_pair_tie_prefers_first_modality() {
        // 0.3 * 0.7 == 0.7 * 0.3
        let fused = fuse(Some(est(Joy, 0.3)), None, Some(est(Anger, 0.7)));
        assert_eq!(fused.label, Joy);
    }

    #[test]
    fn trimodal_accumulates_agreeing_labels() {
        let fused = fuse(
            Some(est(Joy, 0.9)),
            Some(est(Joy, 0.6)),
            Some(est(Sadness, 0.8)),
        );
        assert_eq!(fused.label, Joy);
        assert!(close(fused.score, 0.63));
    }

    #[test]
    fn trimodal_all_different_takes_largest_weighted() {
        // text 0.2*0.5=0.10, audio 0.5*0.3=0.15, image 0.9*0.2=0.18
        let fused = fuse(
            Some(est(Joy, 0.2)),
            Some(est(Anger, 0.5)),
            Some(est(Fear, 0.9)),
        );
        assert_eq!(fused.label, Fear);
        assert!(close(fused.score, 0.18));
    }

    #[test]
    fn trimodal_image_and_audio_can_outvote_text() {
        // text joy 0.5*0.5=0.25 vs fear 0.6*0.3 + 0.5*0.2 = 0.28
        let fused = fuse(
            Some(est(Joy, 0.5)),
            Some(est(Fear, 0.6)),
            Some(est(Fear, 0.5)),
        );
        assert_eq!(fused.label, Fear);
        assert!(close(fused.score, 0.28));
    }

    #[test]
    fn text_and_audio_without_image_keeps_text() {
        let fused = fuse(Some(est(Neutral, 0.7)), Some(est(Anger, 0.99)), None);
        assert_eq!(fused, est(Neutral, 0.7));
    }
}
