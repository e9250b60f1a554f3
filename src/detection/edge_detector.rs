use image::RgbImage;
use imageproc::geometry::approximate_polygon_dp;

use crate::config::{AreaRange, ConfidenceMode, EdgeConfig, PlateConfig, ShapeFilter};
use crate::detection::confidence::ConfidenceScorer;
use crate::detection::{PlateDetector, contours, preprocessing};
use crate::models::{Detection, DetectionMethod, PlateContour};

/// Adaptive threshold + quadrilateral polygon approximation.
pub struct EdgePolygonDetector {
    params: EdgeConfig,
    shape: ShapeFilter,
    area: AreaRange,
    scorer: ConfidenceScorer,
}

impl EdgePolygonDetector {
    pub fn new(params: EdgeConfig, shape: ShapeFilter, area: AreaRange, mode: ConfidenceMode) -> Self {
        let scorer = ConfidenceScorer::new(mode, params.confidence, DetectionMethod::Edge);
        Self {
            params,
            shape,
            area,
            scorer,
        }
    }

    pub fn from_config(config: &PlateConfig) -> Self {
        Self::new(
            config.edge.clone(),
            config.shape.clone(),
            config.area.clone(),
            config.confidence_mode,
        )
    }

    /// Approximate the contour and keep it only if it collapses to four corners.
    fn quadrilateral(&self, contour: &PlateContour) -> Option<PlateContour> {
        if contour.points.len() < 4 {
            return None;
        }
        let epsilon = self.params.polygon_epsilon * contour.perimeter();
        if epsilon <= 0.0 {
            return None;
        }
        let approx = approximate_polygon_dp(&contour.points, epsilon, true);
        if approx.len() != 4 {
            return None;
        }
        PlateContour::from_points(approx)
    }
}

impl PlateDetector for EdgePolygonDetector {
    fn detect(&self, frame: &RgbImage) -> Vec<Detection> {
        let gray = preprocessing::to_grayscale(frame);
        let blurred = preprocessing::apply_blur(&gray, preprocessing::kernel_sigma(self.params.blur_kernel));
        let binary = preprocessing::adaptive_threshold_gaussian_inv(
            &blurred,
            self.params.block_size,
            self.params.offset,
        );

        contours::find_external_contours(&binary)
            .into_iter()
            .filter_map(|contour| {
                let quad = self.quadrilateral(&contour)?;
                let bbox = quad.bounding_box();
                if !self.shape.accepts(&bbox) || !self.area.contains(contour.area()) {
                    return None;
                }
                let confidence = self.scorer.score(&bbox, quad.extent());
                Some(Detection::new(bbox, confidence, DetectionMethod::Edge))
            })
            .collect()
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Edge
    }
}
