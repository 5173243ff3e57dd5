use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::{Instant, timeout_at};
use tracing::{info, warn};

use crate::classifier::Classifier;
use crate::decode::decode_image;
use crate::error::{ErrorRecord, InferenceError, Result};
use crate::report::{DiagnosticReport, ReportAssembler};

/// Hard cap on images per batch request.
pub const MAX_BATCH_SIZE: usize = 10;

const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// One submitted image: display name plus raw bytes.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

/// Tuning knobs for batch processing.
///
/// `timeout` is a single deadline shared by the whole batch; items that have
/// not finished when it elapses are recorded as timed out while completed
/// items keep their reports.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_batch_size: usize,
    pub max_concurrency: usize,
    pub timeout: Option<Duration>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            timeout: None,
        }
    }
}

/// Success or failure of one batch slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Success { report: DiagnosticReport },
    Failure { error: ErrorRecord },
}

/// Result slot for one submitted image. Slot `file_index` always matches the
/// image's position in the request, regardless of completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemOutcome {
    pub file_index: usize,
    pub filename: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

impl BatchItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Success { .. })
    }
}

/// Ordered outcomes for a whole batch, one slot per submitted image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<BatchItemOutcome>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timestamp: DateTime<Utc>,
}

impl BatchResult {
    /// Counts are derived from the outcome sequence so they can never drift
    /// from the slots themselves.
    pub fn from_outcomes(results: Vec<BatchItemOutcome>) -> Self {
        let total = results.len();
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            total,
            succeeded,
            failed: total - succeeded,
            results,
            timestamp: Utc::now(),
        }
    }
}

/// Runs the decode → classify → assemble pipeline over one image or a
/// bounded batch of images, isolating per-item failures.
pub struct BatchOrchestrator {
    classifier: Arc<dyn Classifier>,
    assembler: Arc<ReportAssembler>,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(classifier: Arc<dyn Classifier>, assembler: ReportAssembler) -> Self {
        Self::with_config(classifier, assembler, BatchConfig::default())
    }

    pub fn with_config(
        classifier: Arc<dyn Classifier>,
        assembler: ReportAssembler,
        config: BatchConfig,
    ) -> Self {
        Self {
            classifier,
            assembler: Arc::new(assembler),
            config,
        }
    }

    /// Process a single image end to end.
    pub async fn analyze(&self, payload: ImagePayload) -> Result<DiagnosticReport> {
        process_item(self.classifier.clone(), self.assembler.clone(), payload).await
    }

    /// Process a batch of images, one result slot per input.
    ///
    /// Admission failures (`EmptyBatch`, `BatchTooLarge`) reject the request
    /// before any per-item work starts. After admission, a failure in one
    /// item never aborts its siblings; it lands in that item's slot as an
    /// `ErrorRecord`.
    pub async fn run_batch(&self, images: Vec<ImagePayload>) -> Result<BatchResult> {
        if images.is_empty() {
            return Err(InferenceError::EmptyBatch);
        }
        if images.len() > self.config.max_batch_size {
            return Err(InferenceError::BatchTooLarge {
                limit: self.config.max_batch_size,
                actual: images.len(),
            });
        }

        info!(batch_size = images.len(), "starting batch inference");

        let deadline = self.config.timeout.map(|t| Instant::now() + t);
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));

        let mut handles = Vec::with_capacity(images.len());
        for payload in images {
            let filename = payload.filename.clone();
            let classifier = self.classifier.clone();
            let assembler = self.assembler.clone();
            let semaphore = semaphore.clone();

            let handle = tokio::spawn(async move {
                // Time spent queued for a permit counts against the batch
                // deadline as well.
                let work = async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| InferenceError::Internal(e.to_string()))?;
                    process_item(classifier, assembler, payload).await
                };
                match deadline {
                    Some(deadline) => match timeout_at(deadline, work).await {
                        Ok(result) => result,
                        Err(_) => Err(InferenceError::Timeout),
                    },
                    None => work.await,
                }
            });
            handles.push((filename, handle));
        }

        // Awaiting in submission order keeps slot i bound to input i no
        // matter which items finish first.
        let mut outcomes = Vec::with_capacity(handles.len());
        for (file_index, (filename, handle)) in handles.into_iter().enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(InferenceError::Internal(format!(
                    "item task failed: {join_err}"
                ))),
            };
            let outcome = match result {
                Ok(report) => ItemOutcome::Success { report },
                Err(err) => {
                    warn!(file_index, filename = %filename, error = %err, "batch item failed");
                    ItemOutcome::Failure { error: err.into() }
                }
            };
            outcomes.push(BatchItemOutcome {
                file_index,
                filename,
                outcome,
            });
        }

        let result = BatchResult::from_outcomes(outcomes);
        info!(
            total = result.total,
            succeeded = result.succeeded,
            failed = result.failed,
            "batch inference finished"
        );
        Ok(result)
    }
}

async fn process_item(
    classifier: Arc<dyn Classifier>,
    assembler: Arc<ReportAssembler>,
    payload: ImagePayload,
) -> Result<DiagnosticReport> {
    let bytes = payload.bytes;
    let image = tokio::task::spawn_blocking(move || decode_image(&bytes))
        .await
        .map_err(|e| InferenceError::Internal(format!("decode task failed: {e}")))??;

    let classification = classifier.classify(&image).await?;
    assembler.assemble(&classification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassificationResult, FixedClassifier, TumorLabel};
    use crate::error::ErrorKind;
    use crate::simulate::GrowthSimulator;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat};
    use std::collections::BTreeMap;
    use std::io::Cursor;

    fn png_payload_sized(name: &str, width: u32) -> ImagePayload {
        let img = DynamicImage::new_rgb8(width, width);
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        ImagePayload::new(name, buffer)
    }

    fn png_payload(name: &str) -> ImagePayload {
        png_payload_sized(name, 4)
    }

    fn glioma_classification() -> ClassificationResult {
        ClassificationResult::new(
            TumorLabel::Glioma,
            BTreeMap::from([
                (TumorLabel::Glioma, 0.91),
                (TumorLabel::Meningioma, 0.05),
                (TumorLabel::Pituitary, 0.02),
                (TumorLabel::NoTumor, 0.02),
            ]),
        )
    }

    fn orchestrator() -> BatchOrchestrator {
        BatchOrchestrator::new(
            Arc::new(FixedClassifier::new(glioma_classification())),
            ReportAssembler::new(GrowthSimulator::seeded(3)),
        )
    }

    struct SlowClassifier;

    #[async_trait]
    impl Classifier for SlowClassifier {
        async fn classify(&self, _image: &DynamicImage) -> Result<ClassificationResult> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(glioma_classification())
        }
    }

    #[tokio::test]
    async fn empty_batch_is_rejected_at_admission() {
        let err = orchestrator().run_batch(Vec::new()).await.unwrap_err();
        assert!(matches!(err, InferenceError::EmptyBatch));
        assert!(err.is_admission());
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_at_admission() {
        let images = (0..11).map(|i| png_payload(&format!("scan-{i}.png"))).collect();
        let err = orchestrator().run_batch(images).await.unwrap_err();
        assert!(matches!(
            err,
            InferenceError::BatchTooLarge {
                limit: 10,
                actual: 11
            }
        ));
    }

    #[tokio::test]
    async fn full_batch_succeeds_in_submission_order() {
        let images: Vec<ImagePayload> = (0..10)
            .map(|i| png_payload(&format!("scan-{i}.png")))
            .collect();
        let result = orchestrator().run_batch(images).await.unwrap();

        assert_eq!(result.total, 10);
        assert_eq!(result.succeeded, 10);
        assert_eq!(result.failed, 0);
        for (i, slot) in result.results.iter().enumerate() {
            assert_eq!(slot.file_index, i);
            assert_eq!(slot.filename, format!("scan-{i}.png"));
            assert!(slot.is_success());
        }
    }

    #[tokio::test]
    async fn one_bad_image_does_not_abort_siblings() {
        let images = vec![
            png_payload("first.png"),
            ImagePayload::new("broken.bin", b"not an image at all".to_vec()),
            png_payload("third.png"),
        ];
        let result = orchestrator().run_batch(images).await.unwrap();

        assert_eq!(result.total, 3);
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 1);

        assert!(result.results[0].is_success());
        assert!(result.results[2].is_success());
        let ItemOutcome::Failure { error } = &result.results[1].outcome else {
            panic!("expected slot 1 to fail");
        };
        assert_eq!(error.kind, ErrorKind::UnsupportedFormat);
        assert_eq!(result.results[1].filename, "broken.bin");
    }

    #[tokio::test]
    async fn classifier_failure_lands_in_its_own_slot() {
        struct FailingClassifier;

        #[async_trait]
        impl Classifier for FailingClassifier {
            async fn classify(&self, _image: &DynamicImage) -> Result<ClassificationResult> {
                Err(InferenceError::Classifier("inference backend down".into()))
            }
        }

        let orchestrator = BatchOrchestrator::new(
            Arc::new(FailingClassifier),
            ReportAssembler::new(GrowthSimulator::seeded(3)),
        );
        let result = orchestrator
            .run_batch(vec![png_payload("a.png"), png_payload("b.png")])
            .await
            .unwrap();

        assert_eq!(result.failed, 2);
        for slot in &result.results {
            let ItemOutcome::Failure { error } = &slot.outcome else {
                panic!("expected failure");
            };
            assert_eq!(error.kind, ErrorKind::Classifier);
        }
    }

    #[tokio::test]
    async fn batch_deadline_records_pending_items_as_timed_out() {
        let orchestrator = BatchOrchestrator::with_config(
            Arc::new(SlowClassifier),
            ReportAssembler::new(GrowthSimulator::seeded(3)),
            BatchConfig {
                timeout: Some(Duration::from_millis(20)),
                ..BatchConfig::default()
            },
        );
        let result = orchestrator
            .run_batch(vec![png_payload("a.png"), png_payload("b.png")])
            .await
            .unwrap();

        assert_eq!(result.total, 2);
        assert_eq!(result.failed, 2);
        for slot in &result.results {
            let ItemOutcome::Failure { error } = &slot.outcome else {
                panic!("expected timeout failure");
            };
            assert_eq!(error.kind, ErrorKind::Timeout);
        }
    }

    #[tokio::test]
    async fn batch_deadline_keeps_reports_of_completed_items() {
        // Slow only for images wider than 4px, so one item beats the
        // deadline and one loses to it.
        struct SizeGatedClassifier;

        #[async_trait]
        impl Classifier for SizeGatedClassifier {
            async fn classify(&self, image: &DynamicImage) -> Result<ClassificationResult> {
                if image.width() > 4 {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Ok(glioma_classification())
            }
        }

        let orchestrator = BatchOrchestrator::with_config(
            Arc::new(SizeGatedClassifier),
            ReportAssembler::new(GrowthSimulator::seeded(3)),
            BatchConfig {
                timeout: Some(Duration::from_millis(100)),
                ..BatchConfig::default()
            },
        );
        let result = orchestrator
            .run_batch(vec![
                png_payload_sized("fast.png", 4),
                png_payload_sized("slow.png", 8),
            ])
            .await
            .unwrap();

        assert_eq!(result.total, 2);
        assert_eq!(result.succeeded, 1);
        assert_eq!(result.failed, 1);

        assert!(result.results[0].is_success());
        assert_eq!(result.results[0].filename, "fast.png");
        let ItemOutcome::Failure { error } = &result.results[1].outcome else {
            panic!("expected the slow item to time out");
        };
        assert_eq!(error.kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn single_image_analysis_returns_a_tumor_report() {
        let report = orchestrator().analyze(png_payload("scan.png")).await.unwrap();
        assert!(report.tumor_detected());
        assert!((report.confidence() - 0.91).abs() < f64::EPSILON);
    }

    #[test]
    fn batch_outcome_wire_shape_tags_success_and_failure() {
        let failure = BatchItemOutcome {
            file_index: 1,
            filename: "bad.bin".to_string(),
            outcome: ItemOutcome::Failure {
                error: ErrorRecord {
                    kind: ErrorKind::UnsupportedFormat,
                    message: "nope".to_string(),
                },
            },
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["file_index"], 1);
        assert_eq!(json["error"]["kind"], "unsupported_format");
    }
}
