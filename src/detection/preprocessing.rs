use image::{GrayImage, Luma, RgbImage, imageops};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::{bilateral_filter, gaussian_blur_f32};
use imageproc::morphology::close;

/// Convert a color frame to single-channel intensity
pub fn to_grayscale(frame: &RgbImage) -> GrayImage {
    imageops::grayscale(frame)
}

/// Gaussian sigma matching an odd `ksize` x `ksize` kernel with unspecified sigma.
pub fn kernel_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return img.clone();
    }
    gaussian_blur_f32(img, sigma)
}

/// Edge-preserving smoothing
pub fn apply_bilateral(img: &GrayImage, window: u32, sigma_color: f32, sigma_space: f32) -> GrayImage {
    bilateral_filter(img, window, sigma_color, sigma_space)
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

/// Morphological closing with a square structuring element of the given radius.
pub fn close_gaps(img: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return img.clone();
    }
    close(img, Norm::LInf, radius)
}

/// Inverted adaptive threshold against a Gaussian-weighted local mean.
///
/// A pixel becomes foreground (255) when it is at least `offset` darker than
/// the weighted mean of its `block_size` neighborhood.
pub fn adaptive_threshold_gaussian_inv(img: &GrayImage, block_size: u32, offset: f32) -> GrayImage {
    let local_mean = gaussian_blur_f32(img, kernel_sigma(block_size));
    let mut out = GrayImage::new(img.width(), img.height());
    for (x, y, pixel) in img.enumerate_pixels() {
        let mean = local_mean.get_pixel(x, y)[0] as f32;
        let value = if (pixel[0] as f32) > mean - offset { 0 } else { 255 };
        out.put_pixel(x, y, Luma([value]));
    }
    out
}

/// Global binarization at the Otsu level
pub fn binarize_otsu(img: &GrayImage) -> GrayImage {
    let level = otsu_level(img);
    threshold(img, level, ThresholdType::Binary)
}

/// Upscale so the height is at least `min_height`, keeping the aspect ratio.
pub fn upscale_to_height(img: &GrayImage, min_height: u32) -> GrayImage {
    let (width, height) = img.dimensions();
    if height == 0 || height >= min_height {
        return img.clone();
    }
    let scale = min_height as f32 / height as f32;
    let new_width = ((width as f32 * scale) as u32).max(1);
    imageops::resize(img, new_width, min_height, imageops::FilterType::Triangle)
}
