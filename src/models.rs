use std::fmt;

use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in frame pixels. `x2`/`y2` are exclusive.
///
/// Serializes as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_xywh(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn aspect_ratio(&self) -> f32 {
        let h = self.height() as f32;
        if h == 0.0 {
            return 0.0;
        }
        self.width() as f32 / h
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Area of the intersection with `other`, zero when they are disjoint.
    pub fn intersection_area(&self, other: &BoundingBox) -> u64 {
        let overlap_x = self.x2.min(other.x2).saturating_sub(self.x1.max(other.x1));
        let overlap_y = self.y2.min(other.y2).saturating_sub(self.y1.max(other.y1));
        overlap_x as u64 * overlap_y as u64
    }

    /// Intersection area divided by the area of the smaller box.
    pub fn overlap_ratio(&self, other: &BoundingBox) -> f64 {
        let smaller = self.area().min(other.area());
        if smaller == 0 {
            return 0.0;
        }
        self.intersection_area(other) as f64 / smaller as f64
    }

    /// Clip the box to a `width` x `height` frame. The result may be empty.
    pub fn clamp_to(&self, width: u32, height: u32) -> BoundingBox {
        let x1 = self.x1.min(width);
        let y1 = self.y1.min(height);
        BoundingBox {
            x1,
            y1,
            x2: self.x2.min(width).max(x1),
            y2: self.y2.min(height).max(y1),
        }
    }

    pub fn center(&self) -> (u32, u32) {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }
}

impl From<[u32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [u32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [u32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Which strategy proposed a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    Cascade,
    Contour,
    Edge,
}

impl DetectionMethod {
    pub const ALL: [DetectionMethod; 3] = [
        DetectionMethod::Cascade,
        DetectionMethod::Contour,
        DetectionMethod::Edge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Cascade => "cascade",
            DetectionMethod::Contour => "contour",
            DetectionMethod::Edge => "edge",
        }
    }

    /// Rank used to order candidates of equal confidence; higher wins.
    pub fn priority(&self) -> u8 {
        match self {
            DetectionMethod::Cascade => 2,
            DetectionMethod::Edge => 1,
            DetectionMethod::Contour => 0,
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One plate candidate. `text` is empty until (and unless) recognition succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub method: DetectionMethod,
    #[serde(default)]
    pub text: String,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f32, method: DetectionMethod) -> Self {
        Self {
            bbox,
            confidence,
            method,
            text: String::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }
}

/// Outer border of a foreground region, with the geometry the detectors filter on.
#[derive(Debug, Clone)]
pub struct PlateContour {
    pub points: Vec<Point<i32>>,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl PlateContour {
    /// Build from border points. Returns `None` for an empty point list.
    pub fn from_points(points: Vec<Point<i32>>) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }

        Some(Self {
            points,
            min_x: min_x.max(0) as u32,
            min_y: min_y.max(0) as u32,
            max_x: max_x.max(0) as u32,
            max_y: max_y.max(0) as u32,
        })
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Polygon (shoelace) area enclosed by the border points.
    pub fn area(&self) -> f64 {
        imageproc::geometry::contour_area(&self.points).abs()
    }

    pub fn perimeter(&self) -> f64 {
        imageproc::geometry::arc_length(&self.points, true)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width() as f32 / self.height() as f32
    }

    /// Bounding rectangle in the same convention as `BoundingBox` (exclusive max).
    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_xywh(self.min_x, self.min_y, self.width(), self.height())
    }

    /// Fraction of the bounding rectangle covered by the polygon, in [0, 1].
    pub fn extent(&self) -> f32 {
        let rect = self.bounding_box().area();
        if rect == 0 {
            return 0.0;
        }
        (self.area() / rect as f64).clamp(0.0, 1.0) as f32
    }
}
