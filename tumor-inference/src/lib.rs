pub mod batch;
pub mod classifier;
pub mod decode;
pub mod error;
pub mod report;
pub mod simulate;

// Re-export commonly used types
pub use batch::{
    BatchConfig, BatchItemOutcome, BatchOrchestrator, BatchResult, ImagePayload, ItemOutcome,
    MAX_BATCH_SIZE,
};
pub use classifier::{Classifier, ClassificationResult, FixedClassifier, TumorLabel};
pub use decode::decode_image;
pub use error::{ErrorKind, ErrorRecord, InferenceError, Result};
pub use report::{AnalysisNotes, DiagnosticReport, NoTumorReport, ReportAssembler, TumorReport};
pub use simulate::{
    FORECAST_HORIZON_MONTHS, GROWTH_RATE_CM2_PER_MONTH, GrowthForecast, GrowthSimulator,
    expected_symptoms,
};
