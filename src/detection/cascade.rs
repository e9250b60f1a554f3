//! Boosted Haar-feature cascade evaluated over an integral image.
//!
//! Models are read from OpenCV cascade XML (as shipped in OpenCV's
//! `data/haarcascades`) or from an equivalent JSON document describing the
//! detection window, a list of weighted-rectangle features and the stages of
//! decision stumps:
//!
//! ```json
//! {
//!   "name": "plate",
//!   "window_width": 30, "window_height": 10,
//!   "features": [{ "rects": [{ "x": 0, "y": 0, "width": 30, "height": 10, "weight": -1.0 }] }],
//!   "stages": [{ "threshold": 0.0,
//!                "stumps": [{ "feature": 0, "threshold": -0.1, "left": 1.0, "right": -1.0 }] }]
//! }
//! ```
//!
//! A feature value is the weighted sum of its rectangle sums divided by
//! `area * stddev` of the window. A stump contributes `left` when the value
//! is below its threshold and `right` otherwise; a stage passes when the sum
//! of its stumps reaches the stage threshold.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::integral_image::{integral_image, integral_squared_image, sum_image_pixels};
use imageproc::union_find::DisjointSetForest;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{CascadeConfig, ConfidenceMode, PlateConfig, ShapeFilter};
use crate::detection::confidence::ConfidenceScorer;
use crate::detection::{PlateDetector, preprocessing};
use crate::error::{PlateError, Result};
use crate::models::{BoundingBox, Detection, DetectionMethod};

type Integral = ImageBuffer<Luma<u64>, Vec<u64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub weight: f32,
}

impl WeightedRect {
    fn area(&self) -> f64 {
        self.width as f64 * self.height as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaarFeature {
    pub rects: Vec<WeightedRect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stump {
    pub feature: usize,
    pub threshold: f32,
    pub left: f32,
    pub right: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub threshold: f32,
    pub stumps: Vec<Stump>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeModel {
    #[serde(default)]
    pub name: String,
    pub window_width: u32,
    pub window_height: u32,
    pub features: Vec<HaarFeature>,
    pub stages: Vec<Stage>,
}

impl CascadeModel {
    pub fn from_json_str(json: &str) -> std::result::Result<Self, String> {
        let model: CascadeModel = serde_json::from_str(json).map_err(|e| e.to_string())?;
        model.validate()?;
        Ok(model)
    }

    /// Parse a boosted Haar cascade in the XML layout OpenCV's
    /// `CascadeClassifier` reads (`opencv_traincascade` output).
    ///
    /// Only depth-one weak classifiers and upright features are supported;
    /// the legacy `opencv-haar-classifier` layout is rejected.
    pub fn from_opencv_xml(xml: &str) -> std::result::Result<Self, String> {
        let doc = roxmltree::Document::parse(xml).map_err(|e| e.to_string())?;
        let cascade = elements(doc.root_element())
            .find(|n| n.has_tag_name("cascade"))
            .ok_or("no <cascade> element (legacy haar cascades are not supported)")?;

        let stage_type = text_of(child(cascade, "stageType")?);
        let feature_type = text_of(child(cascade, "featureType")?);
        if stage_type != "BOOST" || feature_type != "HAAR" {
            return Err(format!("unsupported cascade {} / {}", stage_type, feature_type));
        }

        let features = elements(child(cascade, "features")?)
            .map(xml_feature)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let stages = elements(child(cascade, "stages")?)
            .map(xml_stage)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let model = CascadeModel {
            name: String::new(),
            window_width: single(child(cascade, "width")?)?,
            window_height: single(child(cascade, "height")?)?,
            features,
            stages,
        };
        model.validate()?;
        Ok(model)
    }

    /// Check that every stump references a feature and every rectangle fits the window.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err("window size must be non-zero".into());
        }
        if self.stages.is_empty() {
            return Err("model has no stages".into());
        }
        for (i, feature) in self.features.iter().enumerate() {
            if feature.rects.is_empty() {
                return Err(format!("feature {} has no rectangles", i));
            }
            for r in &feature.rects {
                if r.width == 0
                    || r.height == 0
                    || r.x + r.width > self.window_width
                    || r.y + r.height > self.window_height
                {
                    return Err(format!("feature {} has a rectangle outside the window", i));
                }
            }
        }
        for (i, stage) in self.stages.iter().enumerate() {
            if stage.stumps.is_empty() {
                return Err(format!("stage {} has no stumps", i));
            }
            if let Some(stump) = stage.stumps.iter().find(|s| s.feature >= self.features.len()) {
                return Err(format!("stage {} references missing feature {}", i, stump.feature));
            }
        }
        Ok(())
    }
}

type XmlNode<'a, 'input> = roxmltree::Node<'a, 'input>;

fn elements<'a, 'input>(node: XmlNode<'a, 'input>) -> impl Iterator<Item = XmlNode<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn child<'a, 'input>(node: XmlNode<'a, 'input>, name: &str) -> std::result::Result<XmlNode<'a, 'input>, String> {
    elements(node)
        .find(|n| n.has_tag_name(name))
        .ok_or_else(|| format!("missing <{}> in <{}>", name, node.tag_name().name()))
}

fn text_of<'a>(node: XmlNode<'a, '_>) -> &'a str {
    node.text().map(str::trim).unwrap_or_default()
}

fn numbers<T: FromStr>(node: XmlNode<'_, '_>) -> std::result::Result<Vec<T>, String> {
    text_of(node)
        .split_whitespace()
        .map(|token| {
            token
                .parse::<T>()
                .map_err(|_| format!("bad number {:?} in <{}>", token, node.tag_name().name()))
        })
        .collect()
}

fn single<T: FromStr>(node: XmlNode<'_, '_>) -> std::result::Result<T, String> {
    let mut values = numbers::<T>(node)?;
    match values.len() {
        1 => Ok(values.remove(0)),
        n => Err(format!("expected one value in <{}>, found {}", node.tag_name().name(), n)),
    }
}

fn xml_stage(node: XmlNode<'_, '_>) -> std::result::Result<Stage, String> {
    let stumps = elements(child(node, "weakClassifiers")?)
        .map(xml_stump)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Stage {
        threshold: single(child(node, "stageThreshold")?)?,
        stumps,
    })
}

/// `internalNodes` is `left right feature threshold`; non-positive children
/// are leaf indices into `leafValues`.
fn xml_stump(node: XmlNode<'_, '_>) -> std::result::Result<Stump, String> {
    let internal: Vec<f64> = numbers(child(node, "internalNodes")?)?;
    let leaves: Vec<f32> = numbers(child(node, "leafValues")?)?;
    if internal.len() != 4 || leaves.len() != 2 || internal[0] != 0.0 || internal[1] != -1.0 {
        return Err("only depth-one weak classifiers are supported".into());
    }
    if internal[2] < 0.0 || internal[2].fract() != 0.0 {
        return Err(format!("bad feature index {}", internal[2]));
    }
    Ok(Stump {
        feature: internal[2] as usize,
        threshold: internal[3] as f32,
        left: leaves[0],
        right: leaves[1],
    })
}

fn xml_feature(node: XmlNode<'_, '_>) -> std::result::Result<HaarFeature, String> {
    if let Ok(tilted) = child(node, "tilted") {
        if single::<i32>(tilted)? != 0 {
            return Err("tilted haar features are not supported".into());
        }
    }
    let rects = elements(child(node, "rects")?)
        .map(|r| {
            let v: Vec<f32> = numbers(r)?;
            if v.len() != 5 || v[..4].iter().any(|c| *c < 0.0 || c.fract() != 0.0) {
                return Err(format!("bad feature rectangle {:?}", text_of(r)));
            }
            Ok(WeightedRect {
                x: v[0] as u32,
                y: v[1] as u32,
                width: v[2] as u32,
                height: v[3] as u32,
                weight: v[4],
            })
        })
        .collect::<std::result::Result<Vec<_>, String>>()?;
    Ok(HaarFeature { rects })
}

/// Sliding-window search parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiScaleParams {
    pub scale_factor: f64,
    pub min_neighbors: usize,
    pub grouping_eps: f64,
    pub min_variance: f64,
    /// Smallest window evaluated, in pixels.
    pub min_size: (u32, u32),
}

impl Default for MultiScaleParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 4,
            grouping_eps: 0.2,
            min_variance: 1.0,
            min_size: (0, 0),
        }
    }
}

/// A grouped proposal and how many raw windows voted for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupedRect {
    pub bbox: BoundingBox,
    pub neighbors: usize,
}

#[derive(Debug, Clone, Copy)]
struct ScaledRect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    weight: f64,
}

/// A loaded, validated cascade.
#[derive(Debug, Clone)]
pub struct CascadeClassifier {
    model: CascadeModel,
}

impl CascadeClassifier {
    pub fn new(model: CascadeModel) -> Result<Self> {
        model
            .validate()
            .map_err(|reason| PlateError::model_unavailable("<memory>", reason))?;
        Ok(Self { model })
    }

    /// Load an OpenCV cascade XML file or a JSON model, chosen by content.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| PlateError::model_unavailable(path, e))?;
        let parsed = if contents.trim_start().starts_with('<') {
            CascadeModel::from_opencv_xml(&contents)
        } else {
            CascadeModel::from_json_str(&contents)
        };
        let mut model = parsed.map_err(|reason| PlateError::model_unavailable(path, reason))?;
        if model.name.is_empty() {
            model.name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        Ok(Self { model })
    }

    /// Load the first model in `paths` that is readable and valid.
    pub fn load_first(paths: &[PathBuf]) -> Option<Self> {
        for path in paths {
            match Self::load(path) {
                Ok(classifier) => {
                    info!(path = %path.display(), model = %classifier.model.name, "cascade model loaded");
                    return Some(classifier);
                }
                Err(e) => warn!(error = %e, "cascade model rejected, trying next fallback"),
            }
        }
        None
    }

    pub fn model(&self) -> &CascadeModel {
        &self.model
    }

    /// Scan the image at every scale and group the raw hits.
    pub fn detect_multi_scale(&self, gray: &GrayImage, params: &MultiScaleParams) -> Vec<GroupedRect> {
        let hits = self.raw_hits(gray, params);
        debug!(raw_hits = hits.len(), "cascade scan finished");
        let (width, height) = gray.dimensions();
        group_rectangles(&hits, params.min_neighbors, params.grouping_eps)
            .into_iter()
            .map(|g| GroupedRect {
                bbox: g.bbox.clamp_to(width, height),
                neighbors: g.neighbors,
            })
            .filter(|g| !g.bbox.is_empty())
            .collect()
    }

    fn raw_hits(&self, gray: &GrayImage, params: &MultiScaleParams) -> Vec<BoundingBox> {
        let (width, height) = gray.dimensions();
        let mut hits = Vec::new();
        if width == 0 || height == 0 {
            return hits;
        }

        let integral: Integral = integral_image::<_, u64>(gray);
        let squared: Integral = integral_squared_image::<_, u64>(gray);
        let scale_factor = params.scale_factor.max(1.01);

        let mut factor = 1.0f64;
        loop {
            let win_w = ((self.model.window_width as f64 * factor).round() as u32).max(1);
            let win_h = ((self.model.window_height as f64 * factor).round() as u32).max(1);
            if win_w > width || win_h > height {
                break;
            }

            if win_w >= params.min_size.0 && win_h >= params.min_size.1 {
                let features: Vec<Vec<ScaledRect>> = self
                    .model
                    .features
                    .iter()
                    .map(|f| scale_feature(f, factor, win_w, win_h))
                    .collect();
                let step = if factor > 2.0 { factor } else { 2.0 * factor };
                let step = step.round().max(1.0) as u32;

                let mut y = 0;
                while y + win_h <= height {
                    let mut x = 0;
                    while x + win_w <= width {
                        if self.window_passes(&integral, &squared, &features, x, y, win_w, win_h, params.min_variance) {
                            hits.push(BoundingBox::from_xywh(x, y, win_w, win_h));
                        }
                        x += step;
                    }
                    y += step;
                }
            }

            factor *= scale_factor;
        }

        hits
    }

    #[allow(clippy::too_many_arguments)]
    fn window_passes(
        &self,
        integral: &Integral,
        squared: &Integral,
        features: &[Vec<ScaledRect>],
        x: u32,
        y: u32,
        win_w: u32,
        win_h: u32,
        min_variance: f64,
    ) -> bool {
        let area = win_w as f64 * win_h as f64;
        let sum = sum_image_pixels(integral, x, y, x + win_w - 1, y + win_h - 1)[0] as f64;
        let sq_sum = sum_image_pixels(squared, x, y, x + win_w - 1, y + win_h - 1)[0] as f64;
        let mean = sum / area;
        let variance = sq_sum / area - mean * mean;
        if variance < min_variance {
            return false;
        }
        let norm = area * variance.sqrt();

        for stage in &self.model.stages {
            let mut stage_sum = 0.0f32;
            for stump in &stage.stumps {
                let raw: f64 = features[stump.feature]
                    .iter()
                    .map(|r| {
                        let s = sum_image_pixels(
                            integral,
                            x + r.x,
                            y + r.y,
                            x + r.x + r.width - 1,
                            y + r.y + r.height - 1,
                        )[0] as f64;
                        r.weight * s
                    })
                    .sum();
                let value = (raw / norm) as f32;
                stage_sum += if value < stump.threshold { stump.left } else { stump.right };
            }
            if stage_sum < stage.threshold {
                return false;
            }
        }
        true
    }
}

/// Scale a feature to a `win_w` x `win_h` window.
///
/// Features whose weighted areas cancel out keep doing so after rounding:
/// the first rectangle's weight is recomputed from the others.
fn scale_feature(feature: &HaarFeature, factor: f64, win_w: u32, win_h: u32) -> Vec<ScaledRect> {
    let mut rects: Vec<ScaledRect> = feature
        .rects
        .iter()
        .map(|r| {
            let x = ((r.x as f64 * factor).round() as u32).min(win_w - 1);
            let y = ((r.y as f64 * factor).round() as u32).min(win_h - 1);
            let width = ((r.width as f64 * factor).round() as u32).clamp(1, win_w - x);
            let height = ((r.height as f64 * factor).round() as u32).clamp(1, win_h - y);
            ScaledRect {
                x,
                y,
                width,
                height,
                weight: r.weight as f64,
            }
        })
        .collect();

    let balance: f64 = feature.rects.iter().map(|r| r.weight as f64 * r.area()).sum();
    let magnitude: f64 = feature.rects.iter().map(|r| (r.weight as f64 * r.area()).abs()).sum();
    if rects.len() > 1 && balance.abs() <= 1e-6 * magnitude {
        let rest: f64 = rects[1..]
            .iter()
            .map(|r| r.weight * r.width as f64 * r.height as f64)
            .sum();
        let first_area = rects[0].width as f64 * rects[0].height as f64;
        rects[0].weight = -rest / first_area;
    }
    rects
}

fn similar(a: &BoundingBox, b: &BoundingBox, eps: f64) -> bool {
    let delta = eps * (a.width().min(b.width()) + a.height().min(b.height())) as f64 * 0.5;
    let close = |p: u32, q: u32| (p as f64 - q as f64).abs() <= delta;
    close(a.x1, b.x1) && close(a.y1, b.y1) && close(a.x2, b.x2) && close(a.y2, b.y2)
}

/// Cluster similar windows, average each cluster and keep those with more
/// than `min_neighbors` members. Small clusters nested inside a stronger
/// one are dropped.
pub fn group_rectangles(hits: &[BoundingBox], min_neighbors: usize, eps: f64) -> Vec<GroupedRect> {
    if min_neighbors == 0 {
        return hits
            .iter()
            .map(|&bbox| GroupedRect { bbox, neighbors: 1 })
            .collect();
    }
    if hits.is_empty() {
        return Vec::new();
    }

    let mut forest = DisjointSetForest::new(hits.len());
    for i in 0..hits.len() {
        for j in (i + 1)..hits.len() {
            if similar(&hits[i], &hits[j], eps) {
                forest.union(i, j);
            }
        }
    }

    let clusters: Vec<GroupedRect> = forest
        .trees()
        .into_iter()
        .filter(|members| members.len() > min_neighbors)
        .map(|members| {
            let n = members.len() as f64;
            // Corners are averaged, not sizes, so the mean never leaves the
            // hull of its members.
            let (mut x1, mut y1, mut x2, mut y2) = (0.0, 0.0, 0.0, 0.0);
            for &m in &members {
                x1 += hits[m].x1 as f64;
                y1 += hits[m].y1 as f64;
                x2 += hits[m].x2 as f64;
                y2 += hits[m].y2 as f64;
            }
            GroupedRect {
                bbox: BoundingBox::new(
                    (x1 / n).round() as u32,
                    (y1 / n).round() as u32,
                    (x2 / n).round() as u32,
                    (y2 / n).round() as u32,
                ),
                neighbors: members.len(),
            }
        })
        .collect();

    clusters
        .iter()
        .enumerate()
        .filter(|(i, inner)| {
            !clusters.iter().enumerate().any(|(j, outer)| {
                if *i == j {
                    return false;
                }
                let dx = (outer.bbox.width() as f64 * eps).round() as i64;
                let dy = (outer.bbox.height() as f64 * eps).round() as i64;
                let (r1, r2) = (&inner.bbox, &outer.bbox);
                r1.x1 as i64 >= r2.x1 as i64 - dx
                    && r1.y1 as i64 >= r2.y1 as i64 - dy
                    && r1.x2 as i64 <= r2.x2 as i64 + dx
                    && r1.y2 as i64 <= r2.y2 as i64 + dy
                    && (outer.neighbors > inner.neighbors.max(3) || inner.neighbors < 3)
            })
        })
        .map(|(_, g)| *g)
        .collect()
}

/// Classifier-based region proposal.
///
/// Without a loaded model the detector proposes nothing.
pub struct CascadeDetector {
    classifier: Option<CascadeClassifier>,
    params: MultiScaleParams,
    shape: ShapeFilter,
    scorer: ConfidenceScorer,
}

impl CascadeDetector {
    pub fn new(
        classifier: Option<CascadeClassifier>,
        cascade: &CascadeConfig,
        shape: ShapeFilter,
        mode: ConfidenceMode,
    ) -> Self {
        let params = MultiScaleParams {
            scale_factor: cascade.scale_factor,
            min_neighbors: cascade.min_neighbors,
            grouping_eps: cascade.grouping_eps,
            min_variance: cascade.min_variance,
            min_size: (shape.min_width + 1, shape.min_height + 1),
        };
        Self {
            classifier,
            params,
            shape,
            scorer: ConfidenceScorer::new(mode, cascade.confidence, DetectionMethod::Cascade),
        }
    }

    /// Load the first usable model from `config.cascade.model_paths`.
    pub fn from_config(config: &PlateConfig) -> Self {
        let classifier = CascadeClassifier::load_first(&config.cascade.model_paths);
        if classifier.is_none() {
            warn!("no cascade model available; cascade detector will propose nothing");
        }
        Self::new(classifier, &config.cascade, config.shape.clone(), config.confidence_mode)
    }

    pub fn is_available(&self) -> bool {
        self.classifier.is_some()
    }

    pub fn params(&self) -> &MultiScaleParams {
        &self.params
    }

    /// Unit score from the vote count: just enough neighbors scores 0,
    /// many more approaches 1.
    fn vote_score(&self, neighbors: usize) -> f32 {
        let required = (self.params.min_neighbors + 1) as f32;
        (1.0 - required / neighbors.max(1) as f32).max(0.0)
    }
}

impl PlateDetector for CascadeDetector {
    fn detect(&self, frame: &RgbImage) -> Vec<Detection> {
        let Some(classifier) = &self.classifier else {
            return Vec::new();
        };
        let gray = preprocessing::to_grayscale(frame);

        classifier
            .detect_multi_scale(&gray, &self.params)
            .into_iter()
            .filter(|g| self.shape.accepts(&g.bbox))
            .map(|g| {
                let confidence = self.scorer.score(&g.bbox, self.vote_score(g.neighbors));
                Detection::new(g.bbox, confidence, DetectionMethod::Cascade)
            })
            .collect()
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::Cascade
    }
}
