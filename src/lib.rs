pub mod annotate;
pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod region;
pub mod stream;

pub use config::{ConfidenceMode, PlateConfig, RecognizerConfig};
pub use detection::{PlateDetector, TextExtractor, TextRecognizer};
pub use error::{PlateError, Result};
pub use models::{BoundingBox, Detection, DetectionMethod};
pub use pipeline::PlatePipeline;
pub use region::{RegionInfo, RegionLookup};
pub use stream::{DropPolicy, FrameInput, FrameProcessor, FrameQueue, FrameReport, SessionStats};
