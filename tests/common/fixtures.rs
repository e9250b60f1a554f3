use std::path::{Path, PathBuf};

use image::{Luma, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use platescan::detection::CascadeModel;
use platescan::models::{BoundingBox, Detection, DetectionMethod};
use platescan::stream::FrameInput;

/// Dark plate drawn by [`plate_frame`]: 150x45 at (120, 100).
pub fn plate_bbox() -> BoundingBox {
    BoundingBox::from_xywh(120, 100, 150, 45)
}

/// A 400x300 white frame with one black plate-shaped rectangle.
pub fn plate_frame() -> RgbImage {
    let mut img = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
    let b = plate_bbox();
    draw_filled_rect_mut(
        &mut img,
        Rect::at(b.x1 as i32, b.y1 as i32).of_size(b.width(), b.height()),
        Rgb([0, 0, 0]),
    );
    img
}

/// A frame of a single flat color.
pub fn uniform_frame(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
}

/// Dark block drawn by [`cascade_frame`]: 120x36 at (100, 80).
pub fn cascade_block() -> BoundingBox {
    BoundingBox::from_xywh(100, 80, 120, 36)
}

/// A 400x200 mid-gray frame with one black block the test cascade fires on.
pub fn cascade_frame() -> RgbImage {
    let mut img = uniform_frame(400, 200, 128);
    let b = cascade_block();
    draw_filled_rect_mut(
        &mut img,
        Rect::at(b.x1 as i32, b.y1 as i32).of_size(b.width(), b.height()),
        Rgb([0, 0, 0]),
    );
    img
}

/// Single-stage cascade over a 30x10 window that fires when the centre of
/// the window is darker than its border.
pub const TEST_CASCADE_JSON: &str = r#"{
  "name": "dark-centre",
  "window_width": 30,
  "window_height": 10,
  "features": [
    { "rects": [
      { "x": 0, "y": 0, "width": 30, "height": 10, "weight": -1.0 },
      { "x": 3, "y": 2, "width": 24, "height": 6, "weight": 2.0833333 }
    ] }
  ],
  "stages": [
    { "threshold": 0.0,
      "stumps": [{ "feature": 0, "threshold": -0.1, "left": 1.0, "right": -1.0 }] }
  ]
}"#;

pub fn test_cascade_model() -> CascadeModel {
    CascadeModel::from_json_str(TEST_CASCADE_JSON).expect("test cascade model should parse")
}

/// Write the test cascade into `dir` and return its path.
pub fn write_test_cascade(dir: &Path) -> PathBuf {
    let path = dir.join("dark_centre.json");
    std::fs::write(&path, TEST_CASCADE_JSON).expect("Failed to write test cascade");
    path
}

/// [`TEST_CASCADE_JSON`] in OpenCV's traincascade XML layout.
pub const TEST_CASCADE_XML: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade>
  <stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>10</height>
  <width>30</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <!-- stage 0 -->
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>0.</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 -1.0000000149011612e-01</internalNodes>
          <leafValues>
            1. -1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 30 10 -1.</_>
        <_>
          3 2 24 6 2.0833333</_></rects>
      <tilted>0</tilted></_></features></cascade>
</opencv_storage>
"#;

/// Write `xml` into `dir` under `name` and return its path.
pub fn write_cascade_xml(dir: &Path, name: &str, xml: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, xml).expect("Failed to write cascade xml");
    path
}

/// Shorthand for a detection with no text.
pub fn det(x1: u32, y1: u32, x2: u32, y2: u32, confidence: f32, method: DetectionMethod) -> Detection {
    Detection::new(BoundingBox::new(x1, y1, x2, y2), confidence, method)
}

pub fn frame_input(index: usize, image: RgbImage) -> FrameInput {
    FrameInput::new(index, format!("frame_{:04}.png", index), image)
}

/// Gray crop with dark glyph-like bars on a light background.
pub fn glyph_crop(width: u32, height: u32) -> image::GrayImage {
    image::GrayImage::from_fn(width, height, |x, _| {
        if (x / 6) % 2 == 0 { Luma([30]) } else { Luma([220]) }
    })
}
