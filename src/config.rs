use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PlateError, Result};
use crate::models::BoundingBox;

/// Plate-like shape constraint shared by all detectors.
///
/// Thresholds are absolute pixels, so detection is resolution dependent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeFilter {
    pub min_aspect: f32,
    pub max_aspect: f32,
    pub min_width: u32,
    pub min_height: u32,
}

impl ShapeFilter {
    pub fn accepts(&self, bbox: &BoundingBox) -> bool {
        let aspect = bbox.aspect_ratio();
        aspect > self.min_aspect
            && aspect < self.max_aspect
            && bbox.width() > self.min_width
            && bbox.height() > self.min_height
    }
}

impl Default for ShapeFilter {
    fn default() -> Self {
        Self {
            min_aspect: 2.0,
            max_aspect: 5.0,
            min_width: 80,
            min_height: 20,
        }
    }
}

/// Inclusive contour-area bounds in square pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaRange {
    pub min: f64,
    pub max: f64,
}

impl AreaRange {
    pub fn contains(&self, area: f64) -> bool {
        area >= self.min && area <= self.max
    }
}

impl Default for AreaRange {
    fn default() -> Self {
        Self {
            min: 500.0,
            max: 50_000.0,
        }
    }
}

/// Interval a detector's confidence is mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceRange {
    pub low: f32,
    pub high: f32,
}

impl ConfidenceRange {
    pub const fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }

    /// Map a unit score onto the range. Scores outside [0, 1] are clamped.
    pub fn scale(&self, score: f32) -> f32 {
        let score = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
        self.low + (self.high - self.low) * score
    }

    pub fn contains(&self, confidence: f32) -> bool {
        confidence >= self.low && confidence <= self.high
    }

    /// `0 <= low <= high <= 1`; NaN bounds are invalid.
    pub fn is_valid(&self) -> bool {
        0.0 <= self.low && self.low <= self.high && self.high <= 1.0
    }
}

/// How detectors assign confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConfidenceMode {
    /// Score derived from the candidate's own geometry or classifier votes.
    #[default]
    Derived,
    /// Uniform draw from the method's range, seeded per candidate.
    Sampled { seed: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Tried in order; the first model that loads is used.
    pub model_paths: Vec<PathBuf>,
    pub scale_factor: f64,
    pub min_neighbors: usize,
    pub grouping_eps: f64,
    pub min_variance: f64,
    pub confidence: ConfidenceRange,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            model_paths: vec![
                PathBuf::from("models/haarcascade_russian_plate_number.xml"),
                PathBuf::from("/usr/share/opencv4/haarcascades/haarcascade_russian_plate_number.xml"),
                PathBuf::from("models/haarcascade_frontalface_default.xml"),
                PathBuf::from("/usr/share/opencv4/haarcascades/haarcascade_frontalface_default.xml"),
            ],
            scale_factor: 1.1,
            min_neighbors: 4,
            grouping_eps: 0.2,
            min_variance: 1.0,
            confidence: ConfidenceRange::new(0.70, 0.95),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourConfig {
    pub bilateral_window: u32,
    pub sigma_color: f32,
    pub sigma_space: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Closing uses a (2r+1)x(2r+1) square.
    pub closing_radius: u8,
    pub confidence: ConfidenceRange,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            bilateral_window: 11,
            sigma_color: 17.0,
            sigma_space: 17.0,
            canny_low: 30.0,
            canny_high: 200.0,
            closing_radius: 1,
            confidence: ConfidenceRange::new(0.60, 0.85),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub blur_kernel: u32,
    pub block_size: u32,
    pub offset: f32,
    /// Polygon tolerance as a fraction of the closed contour perimeter.
    pub polygon_epsilon: f64,
    pub confidence: ConfidenceRange,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            block_size: 11,
            offset: 2.0,
            polygon_epsilon: 0.02,
            confidence: ConfidenceRange::new(0.65, 0.90),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub overlap_threshold: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.5,
        }
    }
}

/// Which recognizer backs the text extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecognizerConfig {
    Sample { seed: u64, success_rate: f64 },
    Disabled,
    Ocrs { model_dir: Option<PathBuf> },
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        RecognizerConfig::Sample {
            seed: 0,
            success_rate: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Crops shorter than this are upscaled to it before binarization.
    pub min_height: u32,
    pub recognizer: RecognizerConfig,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            min_height: 50,
            recognizer: RecognizerConfig::default(),
        }
    }
}

/// Every tunable of the detection pipeline. `Default` is the reference behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateConfig {
    pub shape: ShapeFilter,
    pub area: AreaRange,
    pub confidence_mode: ConfidenceMode,
    pub cascade: CascadeConfig,
    pub contour: ContourConfig,
    pub edge: EdgeConfig,
    pub fusion: FusionConfig,
    pub text: TextConfig,
    /// Run the three detectors on separate threads.
    pub parallel: bool,
}

impl Default for PlateConfig {
    fn default() -> Self {
        Self {
            shape: ShapeFilter::default(),
            area: AreaRange::default(),
            confidence_mode: ConfidenceMode::default(),
            cascade: CascadeConfig::default(),
            contour: ContourConfig::default(),
            edge: EdgeConfig::default(),
            fusion: FusionConfig::default(),
            text: TextConfig::default(),
            parallel: true,
        }
    }
}

impl PlateConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PlateError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: PlateConfig =
            serde_yaml::from_str(contents).map_err(|e| PlateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the image operators cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.shape.min_aspect >= self.shape.max_aspect {
            return Err(PlateError::Config("shape.min_aspect must be below max_aspect".into()));
        }
        if self.area.min > self.area.max {
            return Err(PlateError::Config("area.min must not exceed area.max".into()));
        }
        let ranges = [
            ("cascade.confidence", self.cascade.confidence),
            ("contour.confidence", self.contour.confidence),
            ("edge.confidence", self.edge.confidence),
        ];
        for (name, range) in ranges {
            if !range.is_valid() {
                return Err(PlateError::Config(format!("{} must satisfy 0 <= low <= high <= 1", name)));
            }
        }
        if !(self.cascade.min_variance >= 0.0) {
            return Err(PlateError::Config("cascade.min_variance must not be negative".into()));
        }
        if self.cascade.scale_factor <= 1.0 {
            return Err(PlateError::Config("cascade.scale_factor must be greater than 1".into()));
        }
        if self.contour.canny_low > self.contour.canny_high {
            return Err(PlateError::Config("contour.canny_low must not exceed canny_high".into()));
        }
        if self.contour.bilateral_window == 0 {
            return Err(PlateError::Config("contour.bilateral_window must be positive".into()));
        }
        if self.edge.blur_kernel == 0 || self.edge.block_size < 3 || self.edge.block_size % 2 == 0 {
            return Err(PlateError::Config(
                "edge.blur_kernel must be positive and edge.block_size odd and at least 3".into(),
            ));
        }
        if !(self.edge.polygon_epsilon > 0.0) {
            return Err(PlateError::Config("edge.polygon_epsilon must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.fusion.overlap_threshold) {
            return Err(PlateError::Config("fusion.overlap_threshold must be within [0, 1]".into()));
        }
        if let RecognizerConfig::Sample { success_rate, .. } = self.text.recognizer {
            if !(0.0..=1.0).contains(&success_rate) {
                return Err(PlateError::Config("text.recognizer.success_rate must be within [0, 1]".into()));
            }
        }
        Ok(())
    }
}
