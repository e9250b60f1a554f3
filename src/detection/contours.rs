use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};

use crate::models::PlateContour;

/// Find the outermost borders of foreground regions in a binary image.
///
/// Borders nested inside another region (holes and the regions inside
/// them) are skipped.
pub fn find_external_contours(binary: &GrayImage) -> Vec<PlateContour> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| PlateContour::from_points(c.points))
        .collect()
}
