//! Logo discovery
//!
//! When a corner has stayed still long enough, its region in the current frame
//! is intersected with the same region of the rolling image. What survives is
//! the persistent overlay; it is binarized, cleaned of speckle, and boxed.

use opencv::{
    core::{Mat, Rect},
    prelude::*,
};
use serde::Serialize;
use tracing::{debug, instrument};
use crate::{
    common::Result,
    geometry::{Corner, ScreenGeometry},
    imaging,
};

/// Binary images above this mean are mostly lit; the subject is then the dark class
const POLARITY_MIDPOINT: f64 = 127.5;

/// Axis-aligned box in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }

    /// A box without area marks a failed extraction
    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }

    /// The same box shifted by (`dx`, `dy`)
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self { x: self.x + dx, y: self.y + dy, ..*self }
    }

    /// Grow `rect` by `margin` on every side, clamped to a `width` x `height` area
    pub fn expanded(rect: Rect, margin: i32, width: i32, height: i32) -> Self {
        let x0 = (rect.x - margin).max(0);
        let y0 = (rect.y - margin).max(0);
        let x1 = (rect.x + rect.width + margin).min(width);
        let y1 = (rect.y + rect.height + margin).min(height);
        Self {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0),
            height: (y1 - y0).max(0),
        }
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

impl From<Rect> for BoundingBox {
    fn from(rect: Rect) -> Self {
        Self::new(rect.x, rect.y, rect.width, rect.height)
    }
}

/// Output of an extraction attempt, not yet registered
pub struct LogoCandidate {
    pub corner: Corner,
    /// Box relative to the corner region
    pub bounding_box: BoundingBox,
    /// Box in full-frame coordinates
    pub frame_box: BoundingBox,
    /// Original-frame pixels inside the box
    pub reference: Mat,
}

impl LogoCandidate {
    /// Degenerate candidates must not be registered
    pub fn is_empty(&self) -> bool {
        self.bounding_box.is_empty()
    }
}

/// A registered logo; immutable once created
pub struct Logo {
    id: u32,
    corner: Corner,
    bounding_box: BoundingBox,
    frame_box: BoundingBox,
    reference: Mat,
}

impl Logo {
    pub(crate) fn from_candidate(id: u32, candidate: LogoCandidate) -> Self {
        Self {
            id,
            corner: candidate.corner,
            bounding_box: candidate.bounding_box,
            frame_box: candidate.frame_box,
            reference: candidate.reference,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Corner the logo was discovered in
    pub fn corner(&self) -> Corner {
        self.corner
    }

    /// Box relative to the corner region it was discovered in
    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }

    /// Box in full-frame coordinates, used for matching
    pub fn frame_box(&self) -> BoundingBox {
        self.frame_box
    }

    pub fn reference(&self) -> &Mat {
        &self.reference
    }
}

impl std::fmt::Debug for Logo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logo")
            .field("id", &self.id)
            .field("corner", &self.corner)
            .field("bounding_box", &self.bounding_box)
            .field("frame_box", &self.frame_box)
            .finish()
    }
}

/// Extract a logo candidate from `corner` of `frame`, using the rolling
/// intersection image to isolate the persistent pixels
#[instrument(skip(frame, rolling, geometry))]
pub fn extract_logo(
    frame: &Mat,
    rolling: &Mat,
    corner: Corner,
    geometry: &ScreenGeometry,
    margin: i32,
) -> Result<LogoCandidate> {
    let region = geometry.region(corner);
    let original = imaging::crop(frame, region)?;
    let persistent = imaging::crop(rolling, region)?;

    let bounding_box = locate_logo(&original, &persistent, margin)?;
    let reference = if bounding_box.is_empty() {
        Mat::default()
    } else {
        imaging::crop(&original, bounding_box.to_rect())?
    };

    debug!("Extracted {} candidate: box={:?}", corner, bounding_box);

    Ok(LogoCandidate {
        corner,
        bounding_box,
        frame_box: bounding_box.offset(region.x, region.y),
        reference,
    })
}

/// Find the box around the persistent overlay within one corner region
///
/// Both inputs are crops of the same region. Returns an empty box when
/// nothing survives binarization and cleaning.
pub fn locate_logo(original: &Mat, persistent: &Mat, margin: i32) -> Result<BoundingBox> {
    let overlap = imaging::bitwise_and(original, persistent)?;
    let gray = imaging::grayscale(&overlap)?;
    let mut binary = imaging::binarize_otsu(&gray)?;

    // keep the minority class lit
    if imaging::mean_brightness(&binary)? > POLARITY_MIDPOINT {
        binary = imaging::invert(&binary)?;
    }

    let cleaned = imaging::open_morphology(&binary)?;

    Ok(match imaging::non_zero_bounds(&cleaned)? {
        Some(bounds) => BoundingBox::expanded(bounds, margin, original.cols(), original.rows()),
        None => BoundingBox::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::test_support::*;

    #[test]
    fn test_bounding_box_expansion_is_clamped() {
        let b = BoundingBox::expanded(Rect::new(2, 3, 10, 10), 5, 100, 100);
        assert_eq!(b, BoundingBox::new(0, 0, 17, 18));

        let b = BoundingBox::expanded(Rect::new(90, 90, 8, 8), 5, 100, 100);
        assert_eq!(b, BoundingBox::new(85, 85, 15, 15));

        let b = BoundingBox::expanded(Rect::new(40, 40, 10, 10), 5, 100, 100);
        assert_eq!(b, BoundingBox::new(35, 35, 20, 20));
    }

    #[test]
    fn test_bounding_box_helpers() {
        let b = BoundingBox::new(5, 6, 7, 8);
        assert_eq!(b.area(), 56);
        assert!(!b.is_empty());
        assert!(BoundingBox::default().is_empty());
        assert_eq!(b.offset(10, 20), BoundingBox::new(15, 26, 7, 8));
        assert_eq!(BoundingBox::from(b.to_rect()), b);
    }

    #[test]
    fn test_locate_logo_on_dark_background() {
        let mut original = solid_frame(120, 80, 0x55);
        draw_checkerboard(&mut original, Rect::new(10, 10, 20, 20), 4);
        // rolling image: background eroded to black, logo intact
        let mut persistent = solid_frame(120, 80, 0);
        draw_checkerboard(&mut persistent, Rect::new(10, 10, 20, 20), 4);

        let b = locate_logo(&original, &persistent, 5).unwrap();
        assert_eq!(b, BoundingBox::new(5, 5, 30, 30));
    }

    #[test]
    fn test_locate_logo_inverts_bright_majority() {
        // mostly white overlap with a dark mark: the mark is the subject
        let mut original = solid_frame(60, 60, 255);
        fill_rect(&mut original, Rect::new(20, 20, 10, 10), 0);
        let persistent = original.try_clone().unwrap();

        let b = locate_logo(&original, &persistent, 5).unwrap();
        assert_eq!(b, BoundingBox::new(15, 15, 20, 20));
    }

    #[test]
    fn test_locate_logo_degenerate() {
        let original = solid_frame(60, 60, 0x55);
        let persistent = solid_frame(60, 60, 0);
        let b = locate_logo(&original, &persistent, 5).unwrap();
        assert!(b.is_empty());

        // isolated speckle is removed by the opening pass
        let mut speckled = solid_frame(60, 60, 0);
        fill_rect(&mut speckled, Rect::new(30, 30, 1, 1), 255);
        let b = locate_logo(&speckled, &speckled, 5).unwrap();
        assert!(b.is_empty());
    }

    #[test]
    fn test_extract_logo_records_both_boxes() {
        let geometry = ScreenGeometry::new(140, 100);
        // logo near the bottom-right corner
        let mut frame = solid_frame(140, 100, 0x55);
        draw_checkerboard(&mut frame, Rect::new(110, 75, 20, 20), 4);
        let mut rolling = solid_frame(140, 100, 0);
        draw_checkerboard(&mut rolling, Rect::new(110, 75, 20, 20), 4);

        let candidate = extract_logo(&frame, &rolling, Corner::BottomRight, &geometry, 5).unwrap();
        assert!(!candidate.is_empty());
        assert_eq!(candidate.corner, Corner::BottomRight);

        // region starts at (20, 20) and is 120x80
        assert_eq!(candidate.bounding_box, BoundingBox::new(85, 50, 30, 30));
        assert_eq!(candidate.frame_box, BoundingBox::new(105, 70, 30, 30));
        assert_eq!(candidate.reference.cols(), 30);
        assert_eq!(candidate.reference.rows(), 30);

        let region = geometry.region(Corner::BottomRight);
        let b = candidate.bounding_box;
        assert!(b.x >= 0 && b.y >= 0);
        assert!(b.x + b.width <= region.width && b.y + b.height <= region.height);
    }

    #[test]
    fn test_extract_logo_empty_region() {
        let geometry = ScreenGeometry::new(140, 100);
        let frame = solid_frame(140, 100, 0x55);
        let rolling = solid_frame(140, 100, 0);

        let candidate = extract_logo(&frame, &rolling, Corner::TopLeft, &geometry, 5).unwrap();
        assert!(candidate.is_empty());
        assert!(candidate.reference.empty());
    }
}
