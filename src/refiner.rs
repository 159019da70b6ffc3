//! Boundary refinement (second pass)
//!
//! PROGRAM segments are opened at the first non-black frame and closed at the
//! next black frame, so their edges often include frames where the logo has
//! not appeared yet or has already left. This pass rescans each PROGRAM
//! segment and narrows it to the span where a registered logo is visible.

use tracing::{debug, info, instrument};
use crate::{
    common::{format_timestamp, Result},
    frame_source::FrameSource,
    matcher,
    segment::{Channel, Segment},
};

/// Refined bounds for one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefinedBounds {
    pub id: u32,
    pub start_ms: i64,
    pub end_ms: i64,
    /// Whether any frame in the segment matched a logo
    pub matched: bool,
}

/// Scan `segment`'s frames and find the first and last that show any logo
///
/// Without a single match both bounds collapse to the original start.
pub fn refine_bounds<S: FrameSource>(
    source: &mut S,
    channel: &Channel,
    segment: &Segment,
) -> Result<RefinedBounds> {
    source.seek_ms(segment.start_ms)?;
    let threshold = channel.config().match_threshold;

    let mut first: Option<i64> = None;
    let mut last: Option<i64> = None;
    let mut scanned = 0u64;

    while let Some(frame) = source.next_frame()? {
        if frame.timestamp_ms > segment.end_ms {
            break;
        }
        scanned += 1;
        if matcher::first_match(&frame.image, channel.logos(), threshold)?.is_some() {
            first.get_or_insert(frame.timestamp_ms);
            last = Some(frame.timestamp_ms);
        }
    }

    debug!("Segment {}: scanned {} frames, first match {:?}, last match {:?}",
           segment.id, scanned, first, last);

    Ok(RefinedBounds {
        id: segment.id,
        start_ms: first.unwrap_or(segment.start_ms),
        end_ms: last.unwrap_or(segment.start_ms),
        matched: first.is_some(),
    })
}

/// Narrow every PROGRAM segment of `channel` to its logo-visible span
#[instrument(skip(source, channel))]
pub fn refine_segments<S: FrameSource>(source: &mut S, channel: &mut Channel) -> Result<Vec<RefinedBounds>> {
    let program: Vec<Segment> = channel
        .segments()
        .iter()
        .filter(|s| s.is_program())
        .cloned()
        .collect();

    let mut refined = Vec::with_capacity(program.len());
    for segment in &program {
        let bounds = refine_bounds(source, channel, segment)?;
        info!("Refined segment {}: [{} - {}] -> [{} - {}]",
              segment.id,
              format_timestamp(segment.start_ms), format_timestamp(segment.end_ms),
              format_timestamp(bounds.start_ms), format_timestamp(bounds.end_ms));
        channel.update_bounds(bounds.id, bounds.start_ms, bounds.end_ms);
        refined.push(bounds);
    }

    info!("Refinement finished: {} PROGRAM segments", refined.len());
    Ok(refined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Mat, Rect};
    use crate::{
        config::AnalyzerConfig,
        frame_source::MemoryFrameSource,
        geometry::Corner,
        imaging::test_support::*,
        segment::SegmentKind,
    };

    const W: i32 = 140;
    const H: i32 = 100;
    const AT: Rect = Rect { x: 10, y: 10, width: 20, height: 20 };

    fn frame(with_logo: bool) -> Mat {
        let mut frame = solid_frame(W, H, 0x55);
        if with_logo {
            draw_checkerboard(&mut frame, AT, 4);
        }
        frame
    }

    /// Channel with one registered top-left logo and the given closed segments
    fn channel_with(segments: &[Segment]) -> Channel {
        let mut channel = Channel::new(W, H, 1.0, AnalyzerConfig::with_minimum_program_seconds(60)).unwrap();
        let mut rolling = solid_frame(W, H, 0);
        draw_checkerboard(&mut rolling, AT, 4);
        channel.sample_stillness(&rolling).unwrap();
        assert_eq!(channel.discover_logo(&frame(true), Corner::TopLeft).unwrap(), Some(1));

        for segment in segments {
            assert_eq!(channel.next_segment_id(), segment.id);
            channel.push_segment(segment.clone());
        }
        channel
    }

    fn program(id: u32, start_ms: i64, end_ms: i64) -> Segment {
        Segment { id, start_ms, end_ms, kind: SegmentKind::Program, logo: Some(1) }
    }

    #[test]
    fn test_program_segment_narrowed_to_logo_span() {
        // 1 fps: logo visible from 3s to 6s inside a 1s..8s segment
        let frames = (0..10).map(|i| frame((3..=6).contains(&i))).collect();
        let mut source = MemoryFrameSource::new(frames, 1.0).unwrap();
        let mut channel = channel_with(&[program(1, 1000, 8000)]);

        let refined = refine_segments(&mut source, &mut channel).unwrap();
        assert_eq!(refined, vec![RefinedBounds { id: 1, start_ms: 3000, end_ms: 6000, matched: true }]);
        assert_eq!(channel.segments()[0].start_ms, 3000);
        assert_eq!(channel.segments()[0].end_ms, 6000);
    }

    #[test]
    fn test_no_match_collapses_to_start() {
        let frames = (0..10).map(|_| frame(false)).collect();
        let mut source = MemoryFrameSource::new(frames, 1.0).unwrap();
        let mut channel = channel_with(&[program(1, 2000, 7000)]);

        refine_segments(&mut source, &mut channel).unwrap();
        let segment = &channel.segments()[0];
        assert_eq!((segment.start_ms, segment.end_ms), (2000, 2000));
    }

    #[test]
    fn test_ad_segments_untouched_and_scan_stays_inside_bounds() {
        // logo everywhere except inside the second segment's window
        let frames = (0..12).map(|i| frame(!(6..=9).contains(&i))).collect();
        let mut source = MemoryFrameSource::new(frames, 1.0).unwrap();
        let ad = Segment { id: 1, start_ms: 0, end_ms: 4000, kind: SegmentKind::Ad, logo: None };
        let mut channel = channel_with(&[ad.clone(), program(2, 5000, 9000)]);

        let refined = refine_segments(&mut source, &mut channel).unwrap();
        assert_eq!(refined.len(), 1);
        // only 5s shows the logo within [5s, 9s]
        assert_eq!(refined[0], RefinedBounds { id: 2, start_ms: 5000, end_ms: 5000, matched: true });
        assert_eq!(channel.segments()[0], ad);
    }

    #[test]
    fn test_refine_bounds_is_repeatable() {
        let frames = (0..6).map(|i| frame(i >= 2)).collect();
        let mut source = MemoryFrameSource::new(frames, 1.0).unwrap();
        let channel = channel_with(&[program(1, 0, 5000)]);
        let segment = channel.segments()[0].clone();

        let first = refine_bounds(&mut source, &channel, &segment).unwrap();
        let second = refine_bounds(&mut source, &channel, &segment).unwrap();
        assert_eq!(first, second);
        assert_eq!((first.start_ms, first.end_ms), (2000, 5000));
    }
}
