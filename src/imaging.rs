//! Image primitives built on OpenCV
//!
//! Every helper takes its inputs by reference and returns a freshly allocated
//! `Mat`, so callers never observe an image being modified in place.

use opencv::{
    boxed_ref::BoxedRef,
    core::{self, Mat, Point, Rect, Size, Vector},
    imgproc,
    prelude::*,
};
use tracing::trace;
use crate::common::{AdSplitError, Result};

/// Side of the square structuring element used by [`open_morphology`]
const MORPH_KERNEL_SIZE: i32 = 3;

/// Gaussian kernel used to suppress encoding noise before edge detection
const BLUR_KERNEL_SIZE: i32 = 3;

/// Canny aperture shared by both edge maps
const CANNY_APERTURE: i32 = 3;

/// Borrow a rectangular region of `image` without copying its pixels
pub fn crop_view(image: &Mat, rect: Rect) -> Result<BoxedRef<'_, Mat>> {
    Mat::roi(image, rect).map_err(|e| {
        AdSplitError::internal_error(format!(
            "Crop {:?} outside {}x{} image: {}", rect, image.cols(), image.rows(), e
        ))
    })
}

/// Copy a rectangular region out of `image`
pub fn crop(image: &Mat, rect: Rect) -> Result<Mat> {
    Ok(crop_view(image, rect)?.try_clone()?)
}

/// Mean intensity over all channels of `image`
///
/// An empty image has no brightness and reports 0.
pub fn mean_brightness(image: &Mat) -> Result<f64> {
    if image.empty() {
        return Ok(0.0);
    }
    let channels = image.channels().clamp(1, 4) as usize;
    let mean = core::mean_def(image)?;
    let total: f64 = (0..channels).map(|c| mean[c]).sum();
    Ok(total / channels as f64)
}

/// Mean intensity over all channels of `rect` within `image`, without copying
pub fn region_brightness(image: &Mat, rect: Rect) -> Result<f64> {
    if rect.width <= 0 || rect.height <= 0 {
        return Ok(0.0);
    }
    let channels = image.channels().clamp(1, 4) as usize;
    let view = Mat::roi(image, rect)?;
    let mean = core::mean_def(&view)?;
    let total: f64 = (0..channels).map(|c| mean[c]).sum();
    Ok(total / channels as f64)
}

/// Reduce a BGR image to a single gray channel; gray input is copied as-is
pub fn grayscale(image: &Mat) -> Result<Mat> {
    if image.channels() == 1 {
        return Ok(image.try_clone()?);
    }
    let mut gray = Mat::default();
    imgproc::cvt_color_def(image, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}

/// Gray copy of `rect` within `image`, converted straight from the borrowed region
pub fn grayscale_region(image: &Mat, rect: Rect) -> Result<Mat> {
    let view = crop_view(image, rect)?;
    if image.channels() == 1 {
        return Ok(view.try_clone()?);
    }
    let mut gray = Mat::default();
    imgproc::cvt_color_def(&view, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    Ok(gray)
}

/// Bitwise AND of two same-shaped images
pub fn bitwise_and(left: &Mat, right: &Mat) -> Result<Mat> {
    let left_size = left.size()?;
    let right_size = right.size()?;
    if left_size != right_size || left.typ() != right.typ() {
        return Err(AdSplitError::internal_error(format!(
            "Cannot intersect images of different shape: left={:?}, right={:?}",
            left_size, right_size
        )));
    }
    let mut out = Mat::default();
    core::bitwise_and_def(left, right, &mut out)?;
    Ok(out)
}

/// Bitwise NOT of an image
pub fn invert(image: &Mat) -> Result<Mat> {
    let mut out = Mat::default();
    core::bitwise_not_def(image, &mut out)?;
    Ok(out)
}

/// Binarize a gray image with an automatically chosen (Otsu) threshold
pub fn binarize_otsu(gray: &Mat) -> Result<Mat> {
    let mut binary = Mat::default();
    let chosen = imgproc::threshold(
        gray,
        &mut binary,
        0.0,
        255.0,
        imgproc::THRESH_BINARY | imgproc::THRESH_OTSU,
    )?;
    trace!("Otsu threshold chosen: {:.1}", chosen);
    Ok(binary)
}

/// Erode then dilate with a small rectangular kernel, removing isolated speckle
pub fn open_morphology(binary: &Mat) -> Result<Mat> {
    let kernel = imgproc::get_structuring_element_def(
        imgproc::MORPH_RECT,
        Size::new(MORPH_KERNEL_SIZE, MORPH_KERNEL_SIZE),
    )?;
    let mut eroded = Mat::default();
    imgproc::erode_def(binary, &mut eroded, &kernel)?;
    let mut opened = Mat::default();
    imgproc::dilate_def(&eroded, &mut opened, &kernel)?;
    Ok(opened)
}

/// Gaussian blur with the fixed 3x3 kernel
pub fn blur(image: &Mat) -> Result<Mat> {
    let mut out = Mat::default();
    imgproc::gaussian_blur_def(
        image,
        &mut out,
        Size::new(BLUR_KERNEL_SIZE, BLUR_KERNEL_SIZE),
        0.0,
    )?;
    Ok(out)
}

/// Canny edge map with independent low/high thresholds
pub fn edges(gray: &Mat, low: f64, high: f64, l2_gradient: bool) -> Result<Mat> {
    let mut out = Mat::default();
    imgproc::canny(gray, &mut out, low, high, CANNY_APERTURE, l2_gradient)?;
    Ok(out)
}

/// Tight bounding box of all non-zero pixels, or `None` for an all-zero image
pub fn non_zero_bounds(binary: &Mat) -> Result<Option<Rect>> {
    if binary.empty() || core::count_non_zero(binary)? == 0 {
        return Ok(None);
    }
    let mut points = Vector::<Point>::new();
    core::find_non_zero(binary, &mut points)?;
    let bounds = imgproc::bounding_rect(&points)?;
    trace!("Non-zero bounds: {:?} from {} pixels", bounds, points.len());
    Ok(Some(bounds))
}
