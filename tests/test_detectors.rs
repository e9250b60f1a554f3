//! Integration tests for the three region-proposal strategies.
//!
//! Tests cover:
//! - Contour and edge-polygon detectors finding a synthetic plate
//! - The cascade detector with a small hand-built model
//! - Flat frames producing no candidates
//! - Confidence staying inside each method's range
//! - Model loading failures and OpenCV cascade XML
//! - Grouped boxes staying inside the frame

mod common;

use platescan::config::{CascadeConfig, ContourConfig, EdgeConfig};
use platescan::detection::cascade::{CascadeClassifier, CascadeModel, MultiScaleParams, group_rectangles};
use platescan::detection::{CascadeDetector, ContourDetector, EdgePolygonDetector};
use platescan::PlateError;

use common::*;

fn contour_detector() -> ContourDetector {
    ContourDetector::from_config(&PlateConfig::default())
}

fn edge_detector() -> EdgePolygonDetector {
    EdgePolygonDetector::from_config(&PlateConfig::default())
}

fn cascade_detector() -> CascadeDetector {
    let classifier = CascadeClassifier::new(test_cascade_model()).expect("valid model");
    CascadeDetector::new(
        Some(classifier),
        &CascadeConfig::default(),
        ShapeFilter::default(),
        ConfidenceMode::Derived,
    )
}

fn assert_plate_like(detections: &[Detection], target: &BoundingBox, method: DetectionMethod, range: (f32, f32)) {
    let shape = ShapeFilter::default();
    for d in detections {
        assert_eq!(d.method, method);
        assert!(shape.accepts(&d.bbox), "{:?} is not plate shaped", d.bbox);
        assert!(d.bbox.intersection_area(target) > 0, "{:?} misses {:?}", d.bbox, target);
        assert!(
            d.confidence >= range.0 && d.confidence <= range.1,
            "confidence {} outside {:?}",
            d.confidence,
            range
        );
        assert!(d.text.is_empty());
    }
}

#[test]
fn test_contour_detector_finds_plate() {
    let detections = contour_detector().detect(&plate_frame());

    assert!(!detections.is_empty(), "the plate outline should be found");
    assert_plate_like(&detections, &plate_bbox(), DetectionMethod::Contour, (0.60, 0.85));
}

#[test]
fn test_edge_detector_finds_plate() {
    let detections = edge_detector().detect(&plate_frame());

    assert!(!detections.is_empty(), "the plate should approximate to a quadrilateral");
    assert_plate_like(&detections, &plate_bbox(), DetectionMethod::Edge, (0.65, 0.90));
}

#[test]
fn test_cascade_detector_finds_block() {
    let detections = cascade_detector().detect(&cascade_frame());

    assert!(!detections.is_empty(), "the dark block should collect enough votes");
    assert_plate_like(&detections, &cascade_block(), DetectionMethod::Cascade, (0.70, 0.95));
}

#[test]
fn test_flat_frames_yield_nothing() {
    let cascade = cascade_detector();
    for value in [0u8, 128, 255] {
        let frame = uniform_frame(320, 240, value);
        assert!(contour_detector().detect(&frame).is_empty());
        assert!(edge_detector().detect(&frame).is_empty());
        assert!(cascade.detect(&frame).is_empty());
    }
}

#[test]
fn test_frames_smaller_than_a_plate_yield_nothing() {
    let frame = uniform_frame(40, 10, 90);
    assert!(contour_detector().detect(&frame).is_empty());
    assert!(edge_detector().detect(&frame).is_empty());
    assert!(cascade_detector().detect(&frame).is_empty());
}

#[test]
fn test_shape_filter_rejects_square_blob() {
    let mut frame = uniform_frame(400, 300, 255);
    imageproc::drawing::draw_filled_rect_mut(
        &mut frame,
        imageproc::rect::Rect::at(100, 80).of_size(100, 100),
        image::Rgb([0, 0, 0]),
    );

    assert!(contour_detector().detect(&frame).is_empty());
    assert!(edge_detector().detect(&frame).is_empty());
}

#[test]
fn test_sampled_confidence_is_reproducible() {
    let config = PlateConfig {
        confidence_mode: ConfidenceMode::Sampled { seed: 42 },
        ..PlateConfig::default()
    };
    let detector = ContourDetector::new(
        ContourConfig::default(),
        config.shape.clone(),
        AreaRange::default(),
        config.confidence_mode,
    );

    let first = detector.detect(&plate_frame());
    let second = detector.detect(&plate_frame());

    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_plate_like(&first, &plate_bbox(), DetectionMethod::Contour, (0.60, 0.85));
}

#[test]
fn test_area_range_filters_contours() {
    let detector = EdgePolygonDetector::new(
        EdgeConfig::default(),
        ShapeFilter::default(),
        AreaRange { min: 500.0, max: 1_000.0 },
        ConfidenceMode::Derived,
    );

    assert!(detector.detect(&plate_frame()).is_empty());
}

#[test]
fn test_cascade_without_model_is_inert() {
    let detector = CascadeDetector::new(None, &CascadeConfig::default(), ShapeFilter::default(), ConfidenceMode::Derived);

    assert!(!detector.is_available());
    assert!(detector.detect(&cascade_frame()).is_empty());
}

#[test]
fn test_cascade_window_minimum_follows_shape_filter() {
    assert_eq!(cascade_detector().params().min_size, (81, 21));
}

#[test]
fn test_cascade_model_loading_failures() {
    let dir = tempfile::TempDir::new().expect("temp dir");

    let missing = dir.path().join("missing.json");
    assert!(matches!(
        CascadeClassifier::load(&missing),
        Err(PlateError::ModelUnavailable { .. })
    ));

    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, "{ \"window_width\": 0 }").expect("write");
    assert!(matches!(
        CascadeClassifier::load(&broken),
        Err(PlateError::ModelUnavailable { .. })
    ));

    let good = write_test_cascade(dir.path());
    let loaded = CascadeClassifier::load_first(&[missing, broken, good]).expect("fallback model should load");
    assert_eq!(loaded.model().name, "dark-centre");
}

#[test]
fn test_group_rectangles_requires_neighbors() {
    let cluster: Vec<BoundingBox> = (0..5).map(|i| BoundingBox::from_xywh(100 + i, 50, 90, 30)).collect();
    let mut hits = cluster.clone();
    hits.push(BoundingBox::from_xywh(300, 200, 90, 30));

    let grouped = group_rectangles(&hits, 4, 0.2);

    assert_eq!(grouped.len(), 1, "the lone window lacks neighbors");
    assert_eq!(grouped[0].neighbors, 5);
    assert_eq!(grouped[0].bbox, BoundingBox::from_xywh(102, 50, 90, 30));

    assert!(group_rectangles(&cluster, 5, 0.2).is_empty());
}

#[test]
fn test_detect_multi_scale_respects_min_size() {
    let classifier = CascadeClassifier::new(test_cascade_model()).expect("valid model");
    let gray = image::imageops::grayscale(&cascade_frame());
    let params = MultiScaleParams {
        min_size: (81, 21),
        ..MultiScaleParams::default()
    };

    let grouped = classifier.detect_multi_scale(&gray, &params);

    assert!(!grouped.is_empty());
    for g in &grouped {
        assert!(g.neighbors > params.min_neighbors);
    }
}

#[test]
fn test_grouped_box_never_exceeds_its_members() {
    // Every member ends at x = 101 or earlier.
    let hits: Vec<BoundingBox> = (0..6)
        .map(|i| {
            if i % 2 == 0 {
                BoundingBox::from_xywh(0, 0, 101, 30)
            } else {
                BoundingBox::from_xywh(1, 0, 100, 30)
            }
        })
        .collect();

    let grouped = group_rectangles(&hits, 4, 0.2);

    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped[0].neighbors, 6);
    assert!(grouped[0].bbox.x2 <= 101, "{:?} grew past its members", grouped[0].bbox);
    assert_eq!(grouped[0].bbox, BoundingBox::new(1, 0, 101, 30));
}

#[test]
fn test_boxes_flush_with_the_frame_edge_stay_inside() {
    let mut frame = uniform_frame(400, 200, 128);
    imageproc::drawing::draw_filled_rect_mut(
        &mut frame,
        imageproc::rect::Rect::at(280, 80).of_size(120, 36),
        image::Rgb([0, 0, 0]),
    );
    let gray = image::imageops::grayscale(&frame);
    let classifier = CascadeClassifier::new(test_cascade_model()).expect("valid model");

    let grouped = classifier.detect_multi_scale(&gray, &MultiScaleParams::default());
    for g in &grouped {
        assert!(g.bbox.x2 <= 400 && g.bbox.y2 <= 200, "{:?} leaves the frame", g.bbox);
        assert!(!g.bbox.is_empty());
    }

    for d in cascade_detector().detect(&frame) {
        assert!(d.bbox.x2 <= 400 && d.bbox.y2 <= 200, "{:?} leaves the frame", d.bbox);
    }
}

#[test]
fn test_opencv_xml_matches_json_model() {
    let from_xml = CascadeModel::from_opencv_xml(TEST_CASCADE_XML).expect("xml cascade should parse");
    let from_json = test_cascade_model();

    assert_eq!(from_xml.window_width, 30);
    assert_eq!(from_xml.window_height, 10);
    assert_eq!(from_xml.features, from_json.features);
    assert_eq!(from_xml.stages, from_json.stages);
}

#[test]
fn test_cascade_loaded_from_xml_finds_block() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = write_cascade_xml(dir.path(), "haarcascade_dark_centre.xml", TEST_CASCADE_XML);

    let classifier = CascadeClassifier::load(&path).expect("xml cascade should load");
    assert_eq!(classifier.model().name, "haarcascade_dark_centre");

    let detector = CascadeDetector::new(
        Some(classifier),
        &CascadeConfig::default(),
        ShapeFilter::default(),
        ConfidenceMode::Derived,
    );
    let detections = detector.detect(&cascade_frame());

    assert!(!detections.is_empty(), "the dark block should be found");
    assert_plate_like(&detections, &cascade_block(), DetectionMethod::Cascade, (0.70, 0.95));
}

#[test]
fn test_unsupported_opencv_cascades_are_unavailable() {
    let dir = tempfile::TempDir::new().expect("temp dir");

    let tilted = TEST_CASCADE_XML.replace("<tilted>0</tilted>", "<tilted>1</tilted>");
    let deep_tree = TEST_CASCADE_XML
        .replace("0 -1 0 -1.0000000149011612e-01", "1 -1 0 -0.1 0 -2 0 0.2")
        .replace("1. -1.</leafValues>", "1. -1. 0.5</leafValues>");
    let lbp = TEST_CASCADE_XML.replace("<featureType>HAAR</featureType>", "<featureType>LBP</featureType>");
    let legacy = r#"<?xml version="1.0"?>
<opencv_storage>
<haarcascade_plate type_id="opencv-haar-classifier">
  <size>30 10</size>
  <stages></stages>
</haarcascade_plate>
</opencv_storage>
"#;

    for (name, xml) in [
        ("tilted.xml", tilted.as_str()),
        ("deep_tree.xml", deep_tree.as_str()),
        ("lbp.xml", lbp.as_str()),
        ("legacy.xml", legacy),
        ("truncated.xml", &TEST_CASCADE_XML[..200]),
    ] {
        let path = write_cascade_xml(dir.path(), name, xml);
        assert!(
            matches!(CascadeClassifier::load(&path), Err(PlateError::ModelUnavailable { .. })),
            "{} should be rejected",
            name
        );
    }
}

#[test]
fn test_default_models_fall_back_from_plate_to_generic_cascade() {
    let paths = CascadeConfig::default().model_paths;
    let names: Vec<_> = paths
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .collect();
    let plate = names
        .iter()
        .position(|n| *n == "haarcascade_russian_plate_number.xml")
        .expect("plate cascade is configured");
    let generic = names
        .iter()
        .position(|n| *n == "haarcascade_frontalface_default.xml")
        .expect("generic cascade is configured");
    assert!(plate < generic);

    let dir = tempfile::TempDir::new().expect("temp dir");
    let missing_plate = dir.path().join("haarcascade_russian_plate_number.xml");
    let generic_path = write_cascade_xml(dir.path(), "haarcascade_frontalface_default.xml", TEST_CASCADE_XML);
    let loaded = CascadeClassifier::load_first(&[missing_plate, generic_path]).expect("generic cascade should load");
    assert_eq!(loaded.model().name, "haarcascade_frontalface_default");
}
