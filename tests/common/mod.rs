#![allow(dead_code, unused_imports)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from platescan for tests
pub use platescan::config::{AreaRange, ConfidenceMode, PlateConfig, RecognizerConfig, ShapeFilter};
pub use platescan::detection::PlateDetector;
pub use platescan::models::{BoundingBox, Detection, DetectionMethod};
