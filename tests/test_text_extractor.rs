//! Integration tests for plate text extraction.
//!
//! Tests cover:
//! - Crop preparation (upscaling and binarization)
//! - Empty and out-of-frame regions
//! - The sample and disabled recognizers
//! - Falling back when an OCR backend cannot be loaded

mod common;

use std::sync::{Arc, Mutex};

use image::GrayImage;
use platescan::detection::ocr::{SAMPLE_PLATES, recognizer_from_config};
use platescan::detection::{DisabledRecognizer, SampleRecognizer, TextExtractor, TextRecognizer};

use common::*;

/// Records the crops it is handed and answers with a fixed string.
#[derive(Default)]
struct RecordingRecognizer {
    seen: Mutex<Vec<GrayImage>>,
}

impl TextRecognizer for RecordingRecognizer {
    fn recognize(&self, plate: &GrayImage) -> Option<String> {
        self.seen.lock().unwrap().push(plate.clone());
        Some("KA05MN9012".to_string())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[test]
fn test_short_crops_are_upscaled_and_binarized() {
    let recognizer = Arc::new(RecordingRecognizer::default());
    let extractor = TextExtractor::new(recognizer.clone(), 50);

    let text = extractor.extract(&glyph_crop(96, 25));

    assert_eq!(text, "KA05MN9012");
    let seen = recognizer.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].height(), 50);
    assert_eq!(seen[0].width(), 192);
    assert!(seen[0].pixels().all(|p| p[0] == 0 || p[0] == 255));
}

#[test]
fn test_tall_crops_keep_their_size() {
    let extractor = TextExtractor::new(Arc::new(DisabledRecognizer), 50);

    let prepared = extractor.prepare(&glyph_crop(180, 60));

    assert_eq!(prepared.dimensions(), (180, 60));
}

#[test]
fn test_empty_crop_yields_empty_text() {
    let extractor = TextExtractor::new(Arc::new(SampleRecognizer::new(1, 1.0)), 50);

    assert_eq!(extractor.extract(&GrayImage::new(0, 0)), "");
    assert_eq!(extractor.extract_region(&plate_frame(), &BoundingBox::new(50, 50, 50, 50)), "");
    assert_eq!(extractor.extract_region(&plate_frame(), &BoundingBox::new(500, 400, 600, 450)), "");
}

#[test]
fn test_region_partly_outside_frame_is_clamped() {
    let recognizer = Arc::new(RecordingRecognizer::default());
    let extractor = TextExtractor::new(recognizer.clone(), 10);

    let text = extractor.extract_region(&plate_frame(), &BoundingBox::new(350, 280, 450, 330));

    assert_eq!(text, "KA05MN9012");
    let seen = recognizer.seen.lock().unwrap();
    assert_eq!(seen[0].dimensions(), (50, 20));
}

#[test]
fn test_sample_recognizer_is_deterministic() {
    let always = SampleRecognizer::new(7, 1.0);
    let crop = glyph_crop(120, 40);

    let first = always.recognize(&crop).expect("success rate 1.0 always reads");
    assert!(SAMPLE_PLATES.contains(&first.as_str()));
    assert_eq!(always.recognize(&crop), Some(first));

    let never = SampleRecognizer::new(7, 0.0);
    assert_eq!(never.recognize(&crop), None);
}

#[test]
fn test_disabled_recognizer_reads_nothing() {
    let extractor = TextExtractor::new(Arc::new(DisabledRecognizer), 50);

    assert_eq!(extractor.recognizer_name(), "disabled");
    assert_eq!(extractor.extract_region(&plate_frame(), &plate_bbox()), "");
}

#[test]
fn test_unloadable_ocr_backend_falls_back_to_disabled() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let recognizer = recognizer_from_config(&RecognizerConfig::Ocrs {
        model_dir: Some(dir.path().join("no-models-here")),
    });

    assert_eq!(recognizer.name(), "disabled");
}

#[test]
fn test_recognizer_from_config() {
    assert_eq!(recognizer_from_config(&RecognizerConfig::default()).name(), "sample");
    assert_eq!(recognizer_from_config(&RecognizerConfig::Disabled).name(), "disabled");
}

#[test]
fn test_try_extract_reports_failure_kind() {
    let disabled = TextExtractor::new(Arc::new(DisabledRecognizer), 50);

    assert!(matches!(
        disabled.try_extract(&GrayImage::new(0, 12)),
        Err(platescan::PlateError::EmptyOrDegenerateCrop)
    ));
    assert!(matches!(
        disabled.try_extract(&glyph_crop(120, 40)),
        Err(platescan::PlateError::RecognitionFailure(_))
    ));
}
