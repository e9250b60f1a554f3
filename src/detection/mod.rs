pub mod cascade;
pub mod confidence;
pub mod contour_detector;
pub mod contours;
pub mod edge_detector;
pub mod fusion;
pub mod ocr;
pub mod preprocessing;

use image::RgbImage;

use crate::models::{Detection, DetectionMethod};

pub use cascade::{CascadeClassifier, CascadeDetector, CascadeModel};
pub use contour_detector::ContourDetector;
pub use edge_detector::EdgePolygonDetector;
pub use fusion::fuse;
pub use ocr::{DisabledRecognizer, SampleRecognizer, TextExtractor, TextRecognizer};

/// A region-proposal strategy.
///
/// Implementations read the frame only and keep no state between calls, so a
/// single instance can serve many frames on many threads.
pub trait PlateDetector: Send + Sync {
    /// Propose plate candidates. Every returned box already passed the shape filter.
    fn detect(&self, frame: &RgbImage) -> Vec<Detection>;

    /// Tag attached to every detection this strategy produces
    fn method(&self) -> DetectionMethod;

    /// Human-readable name (used in logs)
    fn name(&self) -> &str {
        self.method().as_str()
    }
}
