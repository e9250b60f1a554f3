use std::cmp::Ordering;

use crate::models::Detection;

/// Default duplicate cutoff: intersection over the smaller box's area.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.5;

/// Merge candidates from all detectors and drop overlapping duplicates.
///
/// Candidates are visited from most to least confident and kept unless they
/// cover more than `overlap_threshold` of the smaller box with a survivor.
/// This is area-ratio suppression, not IoU: a small box sitting inside a
/// large one is a duplicate even though their IoU is low.
pub fn fuse(candidates: Vec<Detection>, overlap_threshold: f64) -> Vec<Detection> {
    let mut ordered = candidates;
    ordered.sort_by(rank);

    let mut kept: Vec<Detection> = Vec::with_capacity(ordered.len());
    for candidate in ordered {
        let duplicate = kept.iter().any(|existing| {
            let overlap = candidate.bbox.intersection_area(&existing.bbox) as f64;
            let smaller = candidate.bbox.area().min(existing.bbox.area()) as f64;
            overlap > overlap_threshold * smaller
        });
        if !duplicate {
            kept.push(candidate);
        }
    }
    kept
}

/// Total order: confidence descending, then method priority, then larger
/// box, then box coordinates. Input order never decides a tie.
fn rank(a: &Detection, b: &Detection) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| b.method.priority().cmp(&a.method.priority()))
        .then_with(|| b.bbox.area().cmp(&a.bbox.area()))
        .then_with(|| <[u32; 4]>::from(a.bbox).cmp(&<[u32; 4]>::from(b.bbox)))
}
