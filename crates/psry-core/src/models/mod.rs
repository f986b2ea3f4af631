pub mod detection;
pub mod face;
pub mod record;
pub mod stage;

pub use detection::{LanguageScore, ObjectLocation, TextDetection, TextDetectionKind};
pub use face::{AttributeValue, Detection, EmotionScore, FaceSummary, RawFaceDetail};
pub use record::{ProcessingRecord, RecordId, StageUpdate};
pub use stage::{validate_transition, ProcessStage, TransitionError};
