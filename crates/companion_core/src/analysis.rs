//! crates/companion_core/src/analysis.rs
//!
//! The affect pipeline shared by foreground turns and background captures:
//! classify each available modality, fuse, score, and append the results to the sink.
//!
//! No failure in here is fatal. A missing or failing classifier contributes
//! `unknown/0.0`, and a failed append is logged and otherwise ignored.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::domain::{
    DepressionAnalysis, DepressionRecord, DepressionReport, EmotionEstimate, EmotionalEvent,
    EventSource, FusedEmotion, ImageRecord, ReplyContext, RiskSummary,
};
use crate::fusion::fuse;
use crate::ports::{
    ImageEmotionClassifier, PersistenceSink, PortResult, SpeechToTextService,
    TextEmotionClassifier,
};
use crate::report::{build_report, REPORT_WINDOW, TREND_WINDOW};
use crate::scoring::{ScoringPolicy, RISK_WINDOW};

/// The modality classifiers available to this process. `None` means not configured.
#[derive(Clone, Default)]
pub struct Classifiers {
    pub text: Option<Arc<dyn TextEmotionClassifier>>,
    pub image: Option<Arc<dyn ImageEmotionClassifier>>,
    pub speech: Option<Arc<dyn SpeechToTextService>>,
}

/// Per-modality estimates computed for one input.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ModalityEstimates {
    pub text: Option<EmotionEstimate>,
    pub audio: Option<EmotionEstimate>,
    pub image: Option<EmotionEstimate>,
}

/// A fused emotion together with its risk scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffectAnalysis {
    pub fused: FusedEmotion,
    pub depression: DepressionAnalysis,
}

impl AffectAnalysis {
    pub fn reply_context(&self) -> ReplyContext {
        ReplyContext {
            dominant_label: self.fused.label,
            confidence: self.fused.score,
            risk_level: self.depression.depression_level,
            risk_score: self.depression.depression_score,
        }
    }
}

/// Transcript plus the emotion classified from it.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClassification {
    pub transcript: Option<String>,
    pub emotion: EmotionEstimate,
}

pub struct AffectAnalyzer {
    classifiers: Classifiers,
    sink: Arc<dyn PersistenceSink>,
    policy: ScoringPolicy,
}

impl AffectAnalyzer {
    pub fn new(classifiers: Classifiers, sink: Arc<dyn PersistenceSink>, policy: ScoringPolicy) -> Self {
        Self {
            classifiers,
            sink,
            policy,
        }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn sink(&self) -> &Arc<dyn PersistenceSink> {
        &self.sink
    }

    //-------------------------------------------------------------------------------------
    // Classification
    //-------------------------------------------------------------------------------------

    pub async fn classify_text(&self, text: &str) -> EmotionEstimate {
        let Some(classifier) = &self.classifiers.text else {
            debug!("Text classifier unavailable; contributing unknown.");
            return EmotionEstimate::unknown();
        };
        match classifier.classify_text(text).await {
            Ok(estimate) => estimate,
            Err(e) => {
                warn!("Text emotion classification failed: {}", e);
                EmotionEstimate::unknown()
            }
        }
    }

    pub async fn classify_image(&self, image: &[u8]) -> EmotionEstimate {
        let Some(classifier) = &self.classifiers.image else {
            debug!("Image classifier unavailable; contributing unknown.");
            return EmotionEstimate::unknown();
        };
        match classifier.classify_image(image).await {
            Ok(estimate) => estimate,
            Err(e) => {
                warn!("Image emotion classification failed: {}", e);
                EmotionEstimate::unknown()
            }
        }
    }

    /// Returns the trimmed transcript, or `None` when speech-to-text is missing,
    /// fails, or hears nothing.
    pub async fn transcribe(&self, audio: &[u8]) -> Option<String> {
        let Some(speech) = &self.classifiers.speech else {
            debug!("Speech-to-text unavailable.");
            return None;
        };
        match speech.transcribe_audio(audio).await {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!("Audio transcription failed: {}", e);
                None
            }
        }
    }

    /// Speech-to-text followed by text classification. A transcription failure yields `unknown`.
    pub async fn transcribe_and_classify_audio(&self, audio: &[u8]) -> AudioClassification {
        match self.transcribe(audio).await {
            Some(transcript) => {
                let emotion = self.classify_text(&transcript).await;
                AudioClassification {
                    transcript: Some(transcript),
                    emotion,
                }
            }
            None => AudioClassification {
                transcript: None,
                emotion: EmotionEstimate::unknown(),
            },
        }
    }

    //-------------------------------------------------------------------------------------
    // Fuse, Score, Persist
    //-------------------------------------------------------------------------------------

    pub fn evaluate(&self, estimates: ModalityEstimates) -> AffectAnalysis {
        let fused = fuse(estimates.text, estimates.audio, estimates.image);
        AffectAnalysis {
            fused,
            depression: self.policy.score(&fused),
        }
    }

    /// Appends one event and one depression record, plus image metadata when the
    /// input carried an image of `image_len` bytes.
    pub async fn record(
        &self,
        user_id: Uuid,
        source: EventSource,
        analysis: &AffectAnalysis,
        image_len: Option<usize>,
    ) {
        let timestamp = Utc::now();
        let event = EmotionalEvent {
            timestamp,
            source,
            raw_emotion: analysis.fused,
            depression_score: analysis.depression.depression_score,
        };
        let record = DepressionRecord {
            timestamp,
            score: analysis.depression.depression_score,
            level: analysis.depression.depression_level,
        };

        if let Err(e) = self.sink.persist_event(user_id, &event).await {
            error!("Failed to persist emotional event for user {}: {}", user_id, e);
        }
        if let Err(e) = self.sink.persist_score(user_id, &record).await {
            error!("Failed to persist depression score for user {}: {}", user_id, e);
        }
        if let Some(byte_len) = image_len {
            let image = ImageRecord {
                id: Uuid::new_v4(),
                timestamp,
                source,
                byte_len,
                emotion: analysis.fused,
                analysis: analysis.depression,
            };
            if let Err(e) = self.sink.persist_image_metadata(user_id, &image).await {
                error!("Failed to persist image metadata for user {}: {}", user_id, e);
            }
        }
    }

    /// Standalone text analysis outside any chat session.
    pub async fn analyze_text(&self, user_id: Uuid, text: &str) -> AffectAnalysis {
        let estimates = ModalityEstimates {
            text: Some(self.classify_text(text).await),
            ..Default::default()
        };
        let analysis = self.evaluate(estimates);
        self.record(user_id, EventSource::Text, &analysis, None).await;
        analysis
    }

    /// Analyzes a single image (upload, chat snapshot or background capture).
    pub async fn analyze_image(&self, user_id: Uuid, image: &[u8], source: EventSource) -> AffectAnalysis {
        let estimates = ModalityEstimates {
            image: Some(self.classify_image(image).await),
            ..Default::default()
        };
        let analysis = self.evaluate(estimates);
        self.record(user_id, source, &analysis, Some(image.len())).await;
        analysis
    }

    //-------------------------------------------------------------------------------------
    // Trend & Reports
    //-------------------------------------------------------------------------------------

    /// Builds a report over the last `REPORT_WINDOW` events and archives it.
    /// Archiving failures are logged; the report is still returned.
    pub async fn generate_report(&self, user_id: Uuid) -> PortResult<DepressionReport> {
        let events = self.sink.read_recent_events(user_id, REPORT_WINDOW).await?;
        let report = build_report(&events, &self.policy, Utc::now());
        if let Err(e) = self.sink.archive_report(user_id, &report).await {
            error!("Failed to archive depression report for user {}: {}", user_id, e);
        }
        Ok(report)
    }

    pub async fn risk_summary(&self, user_id: Uuid) -> PortResult<RiskSummary> {
        let events = self.sink.read_recent_events(user_id, RISK_WINDOW).await?;
        Ok(self.policy.risk_summary(&events))
    }

    /// Most recent depression records first.
    pub async fn trend(&self, user_id: Uuid) -> PortResult<Vec<DepressionRecord>> {
        self.sink.read_recent_scores(user_id, TREND_WINDOW).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DepressionLevel, EmotionLabel};
    use crate::ports::PortError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records every append in memory; optionally fails all writes.
    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Mutex<Vec<(Uuid, EmotionalEvent)>>,
        pub scores: Mutex<Vec<(Uuid, DepressionRecord)>>,
        pub images: Mutex<Vec<(Uuid, ImageRecord)>>,
        pub reports: Mutex<Vec<(Uuid, DepressionReport)>>,
        pub fail_writes: bool,
    }

    impl RecordingSink {
        fn check(&self) -> PortResult<()> {
            if self.fail_writes {
                Err(PortError::Unexpected("disk full".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl PersistenceSink for RecordingSink {
        async fn persist_event(&self, user_id: Uuid, event: &EmotionalEvent) -> PortResult<()> {
            self.check()?;
            self.events.lock().unwrap().push((user_id, event.clone()));
            Ok(())
        }

        async fn persist_score(&self, user_id: Uuid, record: &DepressionRecord) -> PortResult<()> {
            self.check()?;
            self.scores.lock().unwrap().push((user_id, record.clone()));
            Ok(())
        }

        async fn persist_image_metadata(&self, user_id: Uuid, record: &ImageRecord) -> PortResult<()> {
            self.check()?;
            self.images.lock().unwrap().push((user_id, record.clone()));
            Ok(())
        }

        async fn archive_report(&self, user_id: Uuid, report: &DepressionReport) -> PortResult<()> {
            self.check()?;
            self.reports.lock().unwrap().push((user_id, report.clone()));
            Ok(())
        }

        async fn read_recent_events(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<EmotionalEvent>> {
            let events = self.events.lock().unwrap();
            Ok(events
                .iter()
                .rev()
                .filter(|(u, _)| *u == user_id)
                .take(limit)
                .map(|(_, e)| e.clone())
                .collect())
        }

        async fn read_recent_scores(&self, user_id: Uuid, limit: usize) -> PortResult<Vec<DepressionRecord>> {
            let scores = self.scores.lock().unwrap();
            Ok(scores
                .iter()
                .rev()
                .filter(|(u, _)| *u == user_id)
                .take(limit)
                .map(|(_, r)| r.clone())
                .collect())
        }
    }

    struct FixedText(EmotionEstimate);

    #[async_trait]
    impl TextEmotionClassifier for FixedText {
        async fn classify_text(&self, _text: &str) -> PortResult<EmotionEstimate> {
            Ok(self.0)
        }
    }

    struct BrokenImage;

    #[async_trait]
    impl ImageEmotionClassifier for BrokenImage {
        async fn classify_image(&self, _image: &[u8]) -> PortResult<EmotionEstimate> {
            Err(PortError::Unexpected("bad frame".to_string()))
        }
    }

    struct Transcriber(Option<&'static str>);

    #[async_trait]
    impl SpeechToTextService for Transcriber {
        async fn transcribe_audio(&self, _audio: &[u8]) -> PortResult<String> {
            self.0
                .map(str::to_string)
                .ok_or_else(|| PortError::Unavailable("recognizer offline".to_string()))
        }
    }

    fn analyzer(classifiers: Classifiers, sink: Arc<RecordingSink>) -> AffectAnalyzer {
        AffectAnalyzer::new(classifiers, sink, ScoringPolicy::default())
    }

    #[tokio::test]
    async fn text_analysis_persists_event_and_score() {
        let sink = Arc::new(RecordingSink::default());
        let classifiers = Classifiers {
            text: Some(Arc::new(FixedText(EmotionEstimate::new(EmotionLabel::Sadness, 0.9)))),
            ..Default::default()
        };
        let user = Uuid::new_v4();
        let analysis = analyzer(classifiers, sink.clone()).analyze_text(user, "rough day").await;

        assert_eq!(analysis.depression.depression_score, 0.72);
        assert_eq!(analysis.depression.depression_level, DepressionLevel::High);
        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1.source, EventSource::Text);
        assert_eq!(sink.scores.lock().unwrap()[0].1.level, DepressionLevel::High);
        assert!(sink.images.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_and_failing_classifiers_degrade_to_unknown() {
        let sink = Arc::new(RecordingSink::default());
        let classifiers = Classifiers {
            image: Some(Arc::new(BrokenImage)),
            ..Default::default()
        };
        let analyzer = analyzer(classifiers, sink.clone());
        assert!(analyzer.classify_text("hello").await.is_unknown());

        let user = Uuid::new_v4();
        let analysis = analyzer.analyze_image(user, &[1, 2, 3], EventSource::Image).await;
        assert!(analysis.fused.is_unknown());
        assert_eq!(analysis.depression.depression_score, 0.0);
        assert_eq!(sink.images.lock().unwrap()[0].1.byte_len, 3);
    }

    #[tokio::test]
    async fn failed_transcription_yields_unknown() {
        let sink = Arc::new(RecordingSink::default());
        let classifiers = Classifiers {
            text: Some(Arc::new(FixedText(EmotionEstimate::new(EmotionLabel::Joy, 0.8)))),
            speech: Some(Arc::new(Transcriber(None))),
            ..Default::default()
        };
        let result = analyzer(classifiers, sink).transcribe_and_classify_audio(b"pcm").await;
        assert_eq!(result.transcript, None);
        assert!(result.emotion.is_unknown());
    }

    #[tokio::test]
    async fn audio_is_transcribed_then_classified() {
        let sink = Arc::new(RecordingSink::default());
        let classifiers = Classifiers {
            text: Some(Arc::new(FixedText(EmotionEstimate::new(EmotionLabel::Joy, 0.8)))),
            speech: Some(Arc::new(Transcriber(Some("  what a day  ")))),
            ..Default::default()
        };
        let result = analyzer(classifiers, sink).transcribe_and_classify_audio(b"pcm").await;
        assert_eq!(result.transcript.as_deref(), Some("what a day"));
        assert_eq!(result.emotion.label, EmotionLabel::Joy);
    }

    #[tokio::test]
    async fn persistence_failure_does_not_fail_analysis() {
        let sink = Arc::new(RecordingSink {
            fail_writes: true,
            ..Default::default()
        });
        let classifiers = Classifiers {
            text: Some(Arc::new(FixedText(EmotionEstimate::new(EmotionLabel::Fear, 1.0)))),
            ..Default::default()
        };
        let analysis = analyzer(classifiers, sink.clone()).analyze_text(Uuid::new_v4(), "eek").await;
        assert_eq!(analysis.depression.depression_score, 0.6);
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn report_is_built_and_archived() {
        let sink = Arc::new(RecordingSink::default());
        let classifiers = Classifiers {
            text: Some(Arc::new(FixedText(EmotionEstimate::new(EmotionLabel::Sadness, 1.0)))),
            ..Default::default()
        };
        let analyzer = analyzer(classifiers, sink.clone());
        let user = Uuid::new_v4();
        for _ in 0..3 {
            analyzer.analyze_text(user, "low").await;
        }
        analyzer.analyze_text(Uuid::new_v4(), "someone else").await;

        let report = analyzer.generate_report(user).await.unwrap();
        assert_eq!(report.level, DepressionLevel::High);
        assert_eq!(report.emotions[0].count, 3);
        assert_eq!(sink.reports.lock().unwrap().len(), 1);

        let risk = analyzer.risk_summary(user).await.unwrap();
        assert_eq!(risk.sample_size, 3);
        assert_eq!(risk.average_score, 0.8);
        assert_eq!(analyzer.trend(user).await.unwrap().len(), 3);
    }
}
