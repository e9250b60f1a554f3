use std::sync::Arc;

use image::{GrayImage, RgbImage, imageops};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::config::{RecognizerConfig, TextConfig};
use crate::detection::confidence::mix64;
use crate::detection::preprocessing;
use crate::error::{PlateError, Result};
use crate::models::BoundingBox;

/// Recognition backend behind the text extractor.
///
/// Receives a binarized single-channel plate crop and returns the plate
/// string, or `None` when nothing could be read.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, plate: &GrayImage) -> Option<String>;

    fn name(&self) -> &str;
}

/// Never reads anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledRecognizer;

impl TextRecognizer for DisabledRecognizer {
    fn recognize(&self, _plate: &GrayImage) -> Option<String> {
        None
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

/// Plates returned by [`SampleRecognizer`].
pub const SAMPLE_PLATES: [&str; 16] = [
    "MH09AB1234", "DL01BC5678", "KA05MN9012", "TN07PQ3456",
    "GJ02RS7890", "RJ14UV2345", "UP16XY6789", "WB19CD0123",
    "MP04EF4567", "HR26GH8901", "PB03IJ2345", "AP28KL6789",
    "TS09MN0123", "KL08OP4567", "OR21QR8901", "JH20ST2345",
];

/// Stand-in recognizer: answers with a sample plate `success_rate` of the time.
///
/// The draw is seeded from `seed` and a fingerprint of the crop, so the same
/// crop always gets the same answer.
#[derive(Debug, Clone, Copy)]
pub struct SampleRecognizer {
    seed: u64,
    success_rate: f64,
}

impl SampleRecognizer {
    pub fn new(seed: u64, success_rate: f64) -> Self {
        Self {
            seed,
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }
}

impl Default for SampleRecognizer {
    fn default() -> Self {
        Self::new(0, 0.7)
    }
}

impl TextRecognizer for SampleRecognizer {
    fn recognize(&self, plate: &GrayImage) -> Option<String> {
        let mut rng = StdRng::seed_from_u64(self.seed ^ fingerprint(plate));
        if !rng.random_bool(self.success_rate) {
            return None;
        }
        SAMPLE_PLATES.choose(&mut rng).map(|s| s.to_string())
    }

    fn name(&self) -> &str {
        "sample"
    }
}

fn fingerprint(img: &GrayImage) -> u64 {
    let mut h = mix64(((img.width() as u64) << 32) | img.height() as u64);
    for chunk in img.as_raw().chunks(8) {
        let mut word = 0u64;
        for (i, b) in chunk.iter().enumerate() {
            word |= (*b as u64) << (8 * i);
        }
        h = mix64(h ^ word);
    }
    h
}

#[cfg(feature = "ocr")]
pub use self::engine::OcrsRecognizer;

#[cfg(feature = "ocr")]
mod engine {
    use std::path::{Path, PathBuf};

    use image::{DynamicImage, GrayImage};
    use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
    use rten::Model;

    use super::TextRecognizer;
    use crate::error::{PlateError, Result};

    /// Recognizer backed by the `ocrs` engine.
    pub struct OcrsRecognizer {
        engine: OcrEngine,
    }

    impl OcrsRecognizer {
        /// Standard model cache location (`$HOME/.cache/ocrs`).
        pub fn default_model_dir() -> Option<PathBuf> {
            let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            Some(Path::new(&home).join(".cache/ocrs"))
        }

        /// Load `text-detection.rten` and `text-recognition.rten` from `dir`.
        pub fn from_model_dir(dir: impl AsRef<Path>) -> Result<Self> {
            let dir = dir.as_ref();
            let detection_path = dir.join("text-detection.rten");
            let recognition_path = dir.join("text-recognition.rten");

            for path in [&detection_path, &recognition_path] {
                if !path.exists() {
                    return Err(PlateError::model_unavailable(path, "file not found"));
                }
            }

            let detection_model =
                Model::load_file(&detection_path).map_err(|e| PlateError::model_unavailable(&detection_path, e))?;
            let recognition_model =
                Model::load_file(&recognition_path).map_err(|e| PlateError::model_unavailable(&recognition_path, e))?;

            let engine = OcrEngine::new(OcrEngineParams {
                detection_model: Some(detection_model),
                recognition_model: Some(recognition_model),
                ..Default::default()
            })
            .map_err(|e| PlateError::model_unavailable(dir, e))?;

            Ok(Self { engine })
        }
    }

    impl TextRecognizer for OcrsRecognizer {
        fn recognize(&self, plate: &GrayImage) -> Option<String> {
            let rgb = DynamicImage::ImageLuma8(plate.clone()).to_rgb8();
            let source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions()).ok()?;
            let input = self.engine.prepare_input(source).ok()?;
            let text = self.engine.get_text(&input).ok()?;

            let normalized: String = text
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .map(|c| c.to_ascii_uppercase())
                .collect();
            if normalized.is_empty() { None } else { Some(normalized) }
        }

        fn name(&self) -> &str {
            "ocrs"
        }
    }
}

/// Build the recognizer a configuration asks for.
///
/// An OCR backend that cannot be loaded (or is not compiled in) falls back
/// to [`DisabledRecognizer`].
pub fn recognizer_from_config(config: &RecognizerConfig) -> Arc<dyn TextRecognizer> {
    match config {
        RecognizerConfig::Sample { seed, success_rate } => Arc::new(SampleRecognizer::new(*seed, *success_rate)),
        RecognizerConfig::Disabled => Arc::new(DisabledRecognizer),
        RecognizerConfig::Ocrs { model_dir } => ocrs_recognizer(model_dir.as_deref()),
    }
}

#[cfg(feature = "ocr")]
fn ocrs_recognizer(model_dir: Option<&std::path::Path>) -> Arc<dyn TextRecognizer> {
    let Some(dir) = model_dir.map(|d| d.to_path_buf()).or_else(OcrsRecognizer::default_model_dir) else {
        warn!("no OCR model directory could be determined; text recognition disabled");
        return Arc::new(DisabledRecognizer);
    };
    match OcrsRecognizer::from_model_dir(&dir) {
        Ok(recognizer) => Arc::new(recognizer),
        Err(e) => {
            warn!(error = %e, "OCR engine unavailable; text recognition disabled");
            Arc::new(DisabledRecognizer)
        }
    }
}

#[cfg(not(feature = "ocr"))]
fn ocrs_recognizer(_model_dir: Option<&std::path::Path>) -> Arc<dyn TextRecognizer> {
    warn!("built without the `ocr` feature; text recognition disabled");
    Arc::new(DisabledRecognizer)
}

/// Crop preparation plus a pluggable recognizer.
#[derive(Clone)]
pub struct TextExtractor {
    recognizer: Arc<dyn TextRecognizer>,
    min_height: u32,
}

impl TextExtractor {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, min_height: u32) -> Self {
        Self { recognizer, min_height }
    }

    pub fn from_config(config: &TextConfig) -> Self {
        Self::new(recognizer_from_config(&config.recognizer), config.min_height)
    }

    pub fn recognizer_name(&self) -> &str {
        self.recognizer.name()
    }

    /// Grayscale, upscale short crops, Otsu-binarize.
    pub fn prepare(&self, crop: &GrayImage) -> GrayImage {
        let scaled = preprocessing::upscale_to_height(crop, self.min_height);
        preprocessing::binarize_otsu(&scaled)
    }

    /// Read the plate in `crop`, reporting why nothing was read.
    pub fn try_extract(&self, crop: &GrayImage) -> Result<String> {
        if crop.width() == 0 || crop.height() == 0 {
            return Err(PlateError::EmptyOrDegenerateCrop);
        }
        let prepared = self.prepare(crop);
        self.recognizer
            .recognize(&prepared)
            .ok_or_else(|| PlateError::RecognitionFailure(format!("{} read nothing", self.recognizer.name())))
    }

    /// Read the plate in `crop`. Failures yield an empty string.
    pub fn extract(&self, crop: &GrayImage) -> String {
        self.try_extract(crop).unwrap_or_else(|e| {
            debug!(error = %e, "no plate text");
            String::new()
        })
    }

    /// Clamp `bbox` to the frame, crop, and read it.
    pub fn extract_region(&self, frame: &RgbImage, bbox: &BoundingBox) -> String {
        let clamped = bbox.clamp_to(frame.width(), frame.height());
        if clamped.is_empty() {
            return String::new();
        }
        let crop = imageops::crop_imm(frame, clamped.x1, clamped.y1, clamped.width(), clamped.height()).to_image();
        self.extract(&preprocessing::to_grayscale(&crop))
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::from_config(&TextConfig::default())
    }
}
