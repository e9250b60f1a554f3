use std::sync::Arc;
use std::sync::mpsc;

use image::RgbImage;
use tracing::debug;

use crate::config::PlateConfig;
use crate::detection::fusion::{self, DEFAULT_OVERLAP_THRESHOLD};
use crate::detection::ocr::{DisabledRecognizer, TextExtractor, TextRecognizer};
use crate::detection::{CascadeDetector, ContourDetector, EdgePolygonDetector, PlateDetector};
use crate::error::{PlateError, Result};
use crate::models::Detection;

/// Detection orchestrator: detectors → fusion → text extraction.
///
/// Holds no per-frame state; share it behind an `Arc` to process frames
/// from several workers at once.
pub struct PlatePipeline {
    detectors: Vec<Arc<dyn PlateDetector>>,
    extractor: TextExtractor,
    overlap_threshold: f64,
    parallel: bool,
}

impl PlatePipeline {
    /// Create a pipeline with no detectors and text recognition disabled
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
            extractor: TextExtractor::new(Arc::new(DisabledRecognizer), 50),
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            parallel: true,
        }
    }

    /// The reference pipeline: cascade, contour and edge-polygon detectors
    /// plus the configured recognizer. Models are loaded here, once.
    pub fn from_config(config: &PlateConfig) -> Self {
        Self::new()
            .add_detector(Arc::new(CascadeDetector::from_config(config)))
            .add_detector(Arc::new(ContourDetector::from_config(config)))
            .add_detector(Arc::new(EdgePolygonDetector::from_config(config)))
            .with_extractor(TextExtractor::from_config(&config.text))
            .with_overlap_threshold(config.fusion.overlap_threshold)
            .with_parallel(config.parallel)
    }

    /// Add a detection strategy
    pub fn add_detector(mut self, detector: Arc<dyn PlateDetector>) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Helper method to add a detector from a Box (for convenience)
    pub fn add_detector_boxed(mut self, detector: Box<dyn PlateDetector>) -> Self {
        self.detectors.push(Arc::from(detector));
        self
    }

    pub fn with_extractor(mut self, extractor: TextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Swap the recognizer, keeping the crop preparation settings
    pub fn with_recognizer(self, recognizer: Arc<dyn TextRecognizer>, min_height: u32) -> Self {
        self.with_extractor(TextExtractor::new(recognizer, min_height))
    }

    pub fn with_overlap_threshold(mut self, threshold: f64) -> Self {
        self.overlap_threshold = threshold;
        self
    }

    /// Run detectors on scoped threads (`true`) or one after another
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn detector_names(&self) -> Vec<&str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn extractor(&self) -> &TextExtractor {
        &self.extractor
    }

    /// Raw candidates from every detector, concatenated in detector order.
    pub fn propose(&self, frame: &RgbImage) -> Vec<Detection> {
        let per_detector = if self.parallel && self.detectors.len() > 1 {
            self.propose_parallel(frame)
        } else {
            self.detectors.iter().map(|d| d.detect(frame)).collect()
        };

        for (detector, found) in self.detectors.iter().zip(&per_detector) {
            debug!(detector = detector.name(), candidates = found.len(), "detector finished");
        }
        per_detector.into_iter().flatten().collect()
    }

    fn propose_parallel(&self, frame: &RgbImage) -> Vec<Vec<Detection>> {
        let (sender, receiver) = mpsc::channel();

        std::thread::scope(|scope| {
            for (idx, detector) in self.detectors.iter().enumerate() {
                let sender = sender.clone();
                scope.spawn(move || {
                    // The receiver outlives the scope, so the send cannot fail.
                    let _ = sender.send((idx, detector.detect(frame)));
                });
            }
        });
        drop(sender);

        let mut per_detector = vec![Vec::new(); self.detectors.len()];
        for (idx, found) in receiver {
            per_detector[idx] = found;
        }
        per_detector
    }

    /// Detect, deduplicate and read the plates in one frame.
    ///
    /// Fails only for a frame with a zero dimension.
    pub fn detect_plates(&self, frame: &RgbImage) -> Result<Vec<Detection>> {
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            return Err(PlateError::InvalidFrame { width, height });
        }

        let candidates = self.propose(frame);
        let total = candidates.len();
        let fused = fusion::fuse(candidates, self.overlap_threshold);
        debug!(candidates = total, survivors = fused.len(), "fusion finished");

        Ok(fused
            .into_iter()
            .map(|detection| {
                let text = self.extractor.extract_region(frame, &detection.bbox);
                detection.with_text(text)
            })
            .collect())
    }
}

impl Default for PlatePipeline {
    fn default() -> Self {
        Self::from_config(&PlateConfig::default())
    }
}
