//! Segment classification state machine (first pass)
//!
//! Frames are consumed in timestamp order. Black frames close the open
//! segment; the first non-black frame after them opens a new AD segment.
//! While a segment is open it is promoted to PROGRAM when a registered logo
//! is seen, when a new logo is discovered through corner stillness, or when
//! it has run for the minimum program duration.

use tracing::{debug, info, instrument, trace};
use crate::{
    common::{format_timestamp, Result},
    frame_source::{Frame, FrameSource},
    geometry,
    matcher,
    segment::{Channel, Segment, SegmentKind},
    stillness::SampleOutcome,
};

/// What a single frame did to the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Black frame with no open segment
    Idle,
    /// A new segment was opened with this id
    Opened(u32),
    /// The open segment continues
    Continued,
    /// The segment with this id was closed and appended to the channel
    Closed(u32),
}

#[derive(Debug)]
enum State {
    Closed,
    Open {
        segment: Segment,
        logo_found: bool,
    },
}

#[derive(Debug)]
pub struct SegmentClassifier {
    state: State,
    sample_interval: u64,
    last_timestamp: Option<i64>,
    frames_processed: u64,
}

impl SegmentClassifier {
    /// Create a classifier sampling stillness at the channel's cadence
    pub fn new(channel: &Channel) -> Self {
        let sample_interval = channel.config().sample_interval(channel.fps());
        debug!("Created SegmentClassifier sampling every {} frames", sample_interval);

        Self {
            state: State::Closed,
            sample_interval,
            last_timestamp: None,
            frames_processed: 0,
        }
    }

    /// Process one frame
    #[instrument(skip(self, channel, frame), fields(index = frame.index, ts = frame.timestamp_ms))]
    pub fn process_frame(&mut self, channel: &mut Channel, frame: &Frame) -> Result<Transition> {
        self.frames_processed += 1;
        self.last_timestamp = Some(frame.timestamp_ms);

        let black = geometry::is_black(&frame.image, channel.config().black_threshold)?;

        if black {
            return Ok(match self.close(channel, frame.timestamp_ms) {
                Some(id) => Transition::Closed(id),
                None => Transition::Idle,
            });
        }

        let opened = match self.state {
            State::Closed => {
                let id = channel.next_segment_id();
                info!("Start of segment {} at {}", id, format_timestamp(frame.timestamp_ms));
                self.state = State::Open {
                    segment: Segment::open(id, frame.timestamp_ms),
                    logo_found: false,
                };
                Some(id)
            }
            State::Open { .. } => None,
        };

        self.advance_open(channel, frame)?;

        Ok(match opened {
            Some(id) => Transition::Opened(id),
            None => Transition::Continued,
        })
    }

    /// Close the open segment at the last seen timestamp (end of stream)
    pub fn finish(&mut self, channel: &mut Channel) -> Option<u32> {
        let timestamp = self.last_timestamp?;
        let closed = self.close(channel, timestamp);
        if closed.is_some() {
            debug!("Stream ended with an open segment");
        }
        closed
    }

    /// The segment currently being built, if any
    pub fn open_segment(&self) -> Option<&Segment> {
        match &self.state {
            State::Open { segment, .. } => Some(segment),
            State::Closed => None,
        }
    }

    /// Whether the open segment has an active logo
    pub fn logo_found(&self) -> bool {
        matches!(self.state, State::Open { logo_found: true, .. })
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Matching, time promotion and stillness for a non-black frame of the open segment
    fn advance_open(&mut self, channel: &mut Channel, frame: &Frame) -> Result<()> {
        let State::Open { segment, logo_found } = &mut self.state else {
            return Ok(());
        };
        let timestamp = frame.timestamp_ms;

        if !*logo_found && segment.kind != SegmentKind::Program {
            let threshold = channel.config().match_threshold;
            if let Some(id) = matcher::first_match(&frame.image, channel.logos(), threshold)? {
                info!("Segment {} shows logo {} at {}", segment.id, id, format_timestamp(timestamp));
                segment.kind = SegmentKind::Program;
                segment.logo = Some(id);
                *logo_found = true;
            }
        }

        if segment.kind != SegmentKind::Program
            && timestamp - segment.start_ms >= channel.config().minimum_program_ms()
        {
            info!("Segment {} promoted to PROGRAM after {}ms without a break",
                  segment.id, timestamp - segment.start_ms);
            segment.kind = SegmentKind::Program;
        }

        if frame.index % self.sample_interval != 0 {
            return Ok(());
        }

        let outcome = channel.sample_stillness(&frame.image)?;
        trace!("Stillness sample at {}: {:?} counters={:?}",
               timestamp, outcome, channel.stillness().counters());
        if outcome == SampleOutcome::Seeded {
            return Ok(());
        }

        if !*logo_found {
            if let Some(corner) = channel.logo_candidate_corner() {
                debug!("Found potential logo in {} corner", corner);
                if let Some(id) = channel.discover_logo(&frame.image, corner)? {
                    *logo_found = true;
                    if segment.kind != SegmentKind::Program {
                        info!("Segment {} promoted to PROGRAM by new logo {}", segment.id, id);
                        segment.kind = SegmentKind::Program;
                    }
                    if segment.logo.is_none() {
                        segment.logo = Some(id);
                    }
                }
            }
        } else if channel.stillness().total() == 0 {
            debug!("Logo region of segment {} no longer steady at {}",
                   segment.id, format_timestamp(timestamp));
            segment.end_ms = timestamp;
            *logo_found = false;
        }

        Ok(())
    }

    /// Finalize the open segment at `timestamp` and append it to the channel
    fn close(&mut self, channel: &mut Channel, timestamp: i64) -> Option<u32> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Open { mut segment, .. } => {
                info!("End of segment {} at {}", segment.id, format_timestamp(timestamp));
                segment.end_ms = timestamp;
                let id = segment.id;
                channel.push_segment(segment);
                Some(id)
            }
            State::Closed => None,
        }
    }
}

/// Run the classification pass over `source` until it is exhausted
///
/// A source that stops yielding frames early is treated like the end of the
/// stream: the open segment is closed at the last timestamp seen.
#[instrument(skip(source, channel))]
pub fn classify<S: FrameSource>(source: &mut S, channel: &mut Channel) -> Result<()> {
    let mut classifier = SegmentClassifier::new(channel);

    while let Some(frame) = source.next_frame()? {
        classifier.process_frame(channel, &frame)?;

        if classifier.frames_processed() % 1000 == 0 {
            match source.progress_percent() {
                Some(progress) => debug!("Classified {} frames ({}, {:.1}%)",
                                         classifier.frames_processed(),
                                         format_timestamp(frame.timestamp_ms), progress),
                None => debug!("Classified {} frames ({})", classifier.frames_processed(),
                               format_timestamp(frame.timestamp_ms)),
            }
        }
    }

    classifier.finish(channel);

    info!("Classification finished: {} frames, {} segments, {} logos",
          classifier.frames_processed(), channel.segments().len(), channel.logos().len());
    Ok(())
}
