//! Output artifacts
//!
//! Export writes, under an output root:
//! - `videos/segment{id}.mp4`: the frames of every segment, re-encoded
//! - `logos/logo{id}.jpg`: the reference crop of every registered logo
//! - `metadata.json`: segments and logos as a JSON document

use std::{fs, path::{Path, PathBuf}};
use opencv::{core::{Size, Vector}, imgcodecs, videoio::VideoWriter, prelude::*};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use crate::{
    common::{AdSplitError, Result},
    frame_source::FrameSource,
    geometry::Corner,
    logo::BoundingBox,
    segment::{Channel, Segment, SegmentKind},
};

pub const VIDEOS_DIR: &str = "videos";
pub const LOGOS_DIR: &str = "logos";
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogoRecord {
    pub id: u32,
    pub corner: Corner,
    /// Relative to the corner region
    pub bounding_box: BoundingBox,
    /// Relative to the full frame
    pub frame_box: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRecord {
    pub id: u32,
    pub start_ms: i64,
    pub end_ms: i64,
    pub kind: SegmentKind,
    pub logo: Option<u32>,
}

impl From<&Segment> for SegmentRecord {
    fn from(segment: &Segment) -> Self {
        Self {
            id: segment.id,
            start_ms: segment.start_ms,
            end_ms: segment.end_ms,
            kind: segment.kind,
            logo: segment.logo,
        }
    }
}

/// Everything learned about one stream, as written to `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    pub source: String,
    pub fps: f64,
    pub width: i32,
    pub height: i32,
    pub minimum_program_seconds: u32,
    pub logos: Vec<LogoRecord>,
    pub segments: Vec<SegmentRecord>,
}

pub fn build_metadata(channel: &Channel, source: &str) -> Metadata {
    Metadata {
        source: source.to_string(),
        fps: channel.fps(),
        width: channel.geometry().width(),
        height: channel.geometry().height(),
        minimum_program_seconds: channel.config().minimum_program_seconds,
        logos: channel
            .logos()
            .iter()
            .map(|logo| LogoRecord {
                id: logo.id(),
                corner: logo.corner(),
                bounding_box: logo.bounding_box(),
                frame_box: logo.frame_box(),
            })
            .collect(),
        segments: channel.segments().iter().map(SegmentRecord::from).collect(),
    }
}

pub fn write_metadata(metadata: &Metadata, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(metadata)?;
    fs::write(path, json)?;
    debug!("Wrote metadata to {}", path.display());
    Ok(())
}

/// What an export run produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportSummary {
    pub segments_written: Vec<u32>,
    /// Segments whose writer could not be opened
    pub segments_skipped: Vec<u32>,
    pub logos_written: usize,
    pub metadata_path: Option<PathBuf>,
}

/// Remove and recreate the `videos/` and `logos/` directories under `root`
pub fn prepare_output_dirs(root: &Path) -> Result<()> {
    fs::create_dir_all(root)?;
    for dir in [VIDEOS_DIR, LOGOS_DIR] {
        let path = root.join(dir);
        if path.exists() {
            debug!("Removing stale {}", path.display());
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;
    }
    Ok(())
}

pub fn segment_video_path(root: &Path, id: u32) -> PathBuf {
    root.join(VIDEOS_DIR).join(format!("segment{}.mp4", id))
}

pub fn logo_image_path(root: &Path, id: u32) -> PathBuf {
    root.join(LOGOS_DIR).join(format!("logo{}.jpg", id))
}

/// Index of the segment whose inclusive interval holds `timestamp_ms`
pub fn segment_index_for(segments: &[Segment], timestamp_ms: i64) -> Option<usize> {
    segments.iter().position(|s| s.contains(timestamp_ms))
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        AdSplitError::export_error(path.display().to_string(), "path is not valid UTF-8")
    })
}

/// Write every logo's reference crop as a JPEG
pub fn write_logos(channel: &Channel, root: &Path) -> Result<usize> {
    let mut written = 0;
    for logo in channel.logos() {
        let path = logo_image_path(root, logo.id());
        let path_str = path_str(&path)?;
        if !imgcodecs::imwrite(path_str, logo.reference(), &Vector::<i32>::new())? {
            return Err(AdSplitError::export_error(path_str, "image encoder refused the logo"));
        }
        debug!("Wrote logo {} to {}", logo.id(), path_str);
        written += 1;
    }
    Ok(written)
}

fn open_writer(path: &Path, fps: f64, width: i32, height: i32) -> Result<Option<VideoWriter>> {
    let fourcc = VideoWriter::fourcc('a', 'v', 'c', '1')?;
    let writer = VideoWriter::new(path_str(path)?, fourcc, fps, Size::new(width, height), true)?;
    Ok(if writer.is_opened()? { Some(writer) } else { None })
}

/// Write each segment's frames to its own video in one pass over `source`
///
/// A segment whose writer cannot be created or opened is logged and skipped;
/// the remaining segments are still written.
#[instrument(skip(source, channel))]
pub fn write_segment_videos<S: FrameSource>(
    source: &mut S,
    channel: &Channel,
    root: &Path,
) -> Result<(Vec<u32>, Vec<u32>)> {
    let segments = channel.segments();
    let (fps, width, height) = (source.fps(), source.width(), source.height());

    let mut written: Vec<u32> = Vec::new();
    let mut skipped: Vec<u32> = Vec::new();
    // (segment index, writer); the writer is None when opening it failed
    let mut active: Option<(usize, Option<VideoWriter>)> = None;

    source.rewind()?;
    while let Some(frame) = source.next_frame()? {
        let Some(index) = segment_index_for(segments, frame.timestamp_ms) else {
            continue;
        };

        if active.as_ref().map(|(i, _)| *i) != Some(index) {
            if let Some((_, Some(mut previous))) = active.take() {
                previous.release()?;
            }

            let segment = &segments[index];
            let path = segment_video_path(root, segment.id);
            let writer = open_writer(&path, fps, width, height).unwrap_or_else(|e| {
                debug!("Video writer for {} failed: {}", path.display(), e);
                None
            });
            match writer {
                Some(_) => {
                    info!("Writing segment {} to {}", segment.id, path.display());
                    written.push(segment.id);
                }
                None => {
                    warn!("Could not open video writer for {}, skipping segment {}",
                          path.display(), segment.id);
                    skipped.push(segment.id);
                }
            }
            active = Some((index, writer));
        }

        if let Some((_, Some(writer))) = active.as_mut() {
            writer.write(&frame.image)?;
        }
    }

    if let Some((_, Some(mut writer))) = active {
        writer.release()?;
    }

    Ok((written, skipped))
}

/// Produce every output artifact for `channel` under `root`
#[instrument(skip(source, channel))]
pub fn export<S: FrameSource>(
    source: &mut S,
    channel: &Channel,
    source_name: &str,
    root: &Path,
) -> Result<ExportSummary> {
    prepare_output_dirs(root)?;

    let logos_written = write_logos(channel, root)?;
    let (segments_written, segments_skipped) = write_segment_videos(source, channel, root)?;

    let metadata_path = root.join(METADATA_FILE);
    write_metadata(&build_metadata(channel, source_name), &metadata_path)?;

    info!("Export finished: {} segment videos, {} skipped, {} logos",
          segments_written.len(), segments_skipped.len(), logos_written);

    Ok(ExportSummary {
        segments_written,
        segments_skipped,
        logos_written,
        metadata_path: Some(metadata_path),
    })
}
