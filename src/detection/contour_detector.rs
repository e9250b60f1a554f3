use image::RgbImage;

use crate::config::{AreaRange, ConfidenceMode, ContourConfig, PlateConfig, ShapeFilter};
use crate::detection::confidence::ConfidenceScorer;
use crate::detection::{PlateDetector, contours, preprocessing};
use crate::models::{Detection, DetectionMethod};

/// Edge map + closing + external contours.
pub struct ContourDetector {
    params: ContourConfig,
    shape: ShapeFilter,
    area: AreaRange,
    scorer: ConfidenceScorer,
}

impl ContourDetector {
    pub fn new(params: ContourConfig, shape: ShapeFilter, area: AreaRange, mode: ConfidenceMode) -> Self {
        let scorer = ConfidenceScorer::new(mode, params.confidence, DetectionMethod::Contour);
        Self {
            params,
            shape,
            area,
            scorer,
        }
    }

    pub fn from_config(config: &PlateConfig) -> Self {
        Self::new(
            config.contour.clone(),
            config.shape.clone(),
            config.area.clone(),
            config.confidence_mode,
        )
    }
}

impl PlateDetector for ContourDetector {
    fn detect(&self, frame: &RgbImage) -> Vec<Detection> {
        let gray = preprocessing::to_grayscale(frame);
        let filtered = preprocessing::apply_bilateral(
            &gray,
            self.params.bilateral_window,
            self.params.sigma_color,
            self.params.sigma_space,
        );
        let edges = preprocessing::detect_edges(&filtered, self.params.canny_low, self.params.canny_high);
        let closed = preprocessing::close_gaps(&edges, self.params.closing_radius);

        contours::find_external_contours(&closed)
            .into_iter()
            .filter(|c| self.area.contains(c.area()))
            .filter_map(|c| {
                let bbox = c.bounding_box();
                if !self.shape.accepts(&bbox) {
                    return None;
                }
                let confidence = self.scorer.score(&bbox, c.extent());
                Some(Detection::new(bbox, confidence, DetectionMethod::Contour))
            })
            .collect()
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Contour
    }
}
