//! Logo pattern matching
//!
//! A frame shows a known logo when the edges found at the logo's location
//! coincide with the edges of the logo's reference crop.

use opencv::{core::Mat, prelude::*};
use tracing::{instrument, trace};
use crate::{
    common::Result,
    imaging,
    logo::Logo,
};

// The frame crop and the reference use different Canny settings.
const FRAME_CANNY_LOW: f64 = 50.0;
const FRAME_CANNY_HIGH: f64 = 60.0;
const FRAME_CANNY_L2: bool = true;
const REFERENCE_CANNY_LOW: f64 = 50.0;
const REFERENCE_CANNY_HIGH: f64 = 100.0;
const REFERENCE_CANNY_L2: bool = false;

/// Mean intensity of the coinciding edge map between `frame` at the logo's
/// location and the logo's reference image
///
/// A logo whose box does not fit inside `frame` scores 0.
pub fn match_score(frame: &Mat, logo: &Logo) -> Result<f64> {
    let frame_box = logo.frame_box();
    if frame_box.is_empty()
        || frame_box.x < 0
        || frame_box.y < 0
        || frame_box.x + frame_box.width > frame.cols()
        || frame_box.y + frame_box.height > frame.rows()
    {
        trace!("Logo {} box {:?} does not fit the frame", logo.id(), frame_box);
        return Ok(0.0);
    }

    let crop = imaging::grayscale_region(frame, frame_box.to_rect())?;
    let crop_edges = edge_map(&crop, FRAME_CANNY_LOW, FRAME_CANNY_HIGH, FRAME_CANNY_L2)?;
    let reference_edges = edge_map(
        &imaging::grayscale(logo.reference())?,
        REFERENCE_CANNY_LOW,
        REFERENCE_CANNY_HIGH,
        REFERENCE_CANNY_L2,
    )?;

    let overlap = imaging::bitwise_and(&crop_edges, &reference_edges)?;
    imaging::mean_brightness(&overlap)
}

/// True when the edge overlap reaches `threshold`
#[instrument(skip(frame, logo), fields(logo = logo.id()))]
pub fn matches(frame: &Mat, logo: &Logo, threshold: f64) -> Result<bool> {
    let score = match_score(frame, logo)?;
    trace!("Logo {} edge overlap {:.2} (threshold {})", logo.id(), score, threshold);
    Ok(score >= threshold)
}

/// Id of the first logo, in registration order, present in `frame`
pub fn first_match(frame: &Mat, logos: &[Logo], threshold: f64) -> Result<Option<u32>> {
    for logo in logos {
        if matches(frame, logo, threshold)? {
            return Ok(Some(logo.id()));
        }
    }
    Ok(None)
}

fn edge_map(gray: &Mat, low: f64, high: f64, l2_gradient: bool) -> Result<Mat> {
    let blurred = imaging::blur(gray)?;
    imaging::edges(&blurred, low, high, l2_gradient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::Rect;
    use crate::{
        geometry::{Corner, ScreenGeometry},
        imaging::test_support::*,
        logo::{extract_logo, Logo},
    };

    const W: i32 = 140;
    const H: i32 = 100;

    fn logo_frame(at: Rect) -> Mat {
        let mut frame = solid_frame(W, H, 0x55);
        draw_checkerboard(&mut frame, at, 4);
        frame
    }

    fn discover(frame: &Mat, at: Rect, corner: Corner, id: u32) -> Logo {
        let geometry = ScreenGeometry::new(W, H);
        let mut rolling = solid_frame(W, H, 0);
        draw_checkerboard(&mut rolling, at, 4);
        let candidate = extract_logo(frame, &rolling, corner, &geometry, 5).unwrap();
        assert!(!candidate.is_empty());
        Logo::from_candidate(id, candidate)
    }

    #[test]
    fn test_matches_source_frame() {
        let at = Rect::new(10, 10, 20, 20);
        let frame = logo_frame(at);
        let logo = discover(&frame, at, Corner::TopLeft, 1);

        assert!(matches(&frame, &logo, 15.0).unwrap());
    }

    #[test]
    fn test_rejects_unrelated_frame() {
        let at = Rect::new(10, 10, 20, 20);
        let logo = discover(&logo_frame(at), at, Corner::TopLeft, 1);

        let flat = solid_frame(W, H, 0x55);
        assert!(!matches(&flat, &logo, 15.0).unwrap());
        assert_eq!(match_score(&flat, &logo).unwrap(), 0.0);

        // the pattern elsewhere on screen does not count
        let moved = logo_frame(Rect::new(60, 50, 20, 20));
        assert!(!matches(&moved, &logo, 15.0).unwrap());
    }

    #[test]
    fn test_match_is_deterministic() {
        let at = Rect::new(10, 10, 20, 20);
        let frame = logo_frame(at);
        let logo = discover(&frame, at, Corner::TopLeft, 1);

        let first = match_score(&frame, &logo).unwrap();
        let second = match_score(&frame, &logo).unwrap();
        assert_eq!(first, second);
        assert!(first >= 15.0);
    }

    #[test]
    fn test_non_origin_corner_matches_in_frame_coordinates() {
        let at = Rect::new(110, 75, 20, 20);
        let frame = logo_frame(at);
        let logo = discover(&frame, at, Corner::BottomRight, 1);

        assert_ne!(logo.bounding_box(), logo.frame_box());
        assert!(matches(&frame, &logo, 15.0).unwrap());
    }

    #[test]
    fn test_logo_outside_smaller_frame_scores_zero() {
        let at = Rect::new(110, 75, 20, 20);
        let logo = discover(&logo_frame(at), at, Corner::BottomRight, 1);

        let small = solid_frame(64, 48, 0x55);
        assert_eq!(match_score(&small, &logo).unwrap(), 0.0);
    }

    #[test]
    fn test_first_match_uses_registration_order() {
        let at = Rect::new(10, 10, 20, 20);
        let frame = logo_frame(at);
        let logos = vec![
            discover(&logo_frame(Rect::new(110, 75, 20, 20)), Rect::new(110, 75, 20, 20), Corner::BottomRight, 1),
            discover(&frame, at, Corner::TopLeft, 2),
            discover(&frame, at, Corner::TopLeft, 3),
        ];

        assert_eq!(first_match(&frame, &logos, 15.0).unwrap(), Some(2));
        assert_eq!(first_match(&solid_frame(W, H, 0x55), &logos, 15.0).unwrap(), None);
        assert_eq!(first_match(&frame, &[], 15.0).unwrap(), None);
    }
}
