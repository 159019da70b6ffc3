//! Command-line interface for broadcast ad segmentation
//!
//! Splits a recording into AD and PROGRAM segments, prints them and, unless
//! told otherwise, writes the segment videos, logo crops and metadata.

use std::path::PathBuf;
use std::time::{Duration, Instant};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn, debug};
use rust_adsplit::{
    build_metadata, format_timestamp, get_video_info, init_tracing, run_pipeline,
    AnalyzerConfig, Channel, PipelineOptions,
    DEFAULT_BLACK_THRESHOLD, DEFAULT_LOGO_MARGIN, DEFAULT_MATCH_THRESHOLD,
    DEFAULT_MINIMUM_PROGRAM_SECONDS, DEFAULT_STILLNESS_THRESHOLD,
};

#[derive(Parser, Debug)]
#[command(name = "rust-adsplit")]
#[command(about = "Split broadcast recordings into ads and programs by channel logo")]
#[command(version)]
struct Args {
    /// Input video file
    video_path: String,

    /// Directory receiving videos/, logos/ and metadata.json
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Seconds of corner stillness or uninterrupted content that make a program
    #[arg(long, default_value_t = DEFAULT_MINIMUM_PROGRAM_SECONDS)]
    minimum_program_seconds: u32,

    /// Mean brightness at or below which a frame is black
    #[arg(long, default_value_t = DEFAULT_BLACK_THRESHOLD)]
    black_threshold: f64,

    /// Mean brightness a corner must keep to count as still
    #[arg(long, default_value_t = DEFAULT_STILLNESS_THRESHOLD)]
    stillness_threshold: f64,

    /// Mean edge overlap at which a frame shows a logo
    #[arg(long, default_value_t = DEFAULT_MATCH_THRESHOLD)]
    match_threshold: f64,

    /// Pixels added around a discovered logo
    #[arg(long, default_value_t = DEFAULT_LOGO_MARGIN)]
    logo_margin: i32,

    /// Frames between stillness samples (default: the rounded framerate)
    #[arg(long)]
    sample_interval: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Simple)]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// Show video information only
    #[arg(long, default_value_t = false)]
    info: bool,

    /// Keep segment bounds from the first pass
    #[arg(long, default_value_t = false)]
    skip_refine: bool,

    /// Do not write videos, logos or metadata
    #[arg(long, default_value_t = false)]
    skip_export: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One line per segment
    Simple,
    /// Timestamps, durations and logos
    Detailed,
    /// The metadata document
    Json,
}

impl Args {
    fn config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            minimum_program_seconds: self.minimum_program_seconds,
            black_threshold: self.black_threshold,
            stillness_threshold: self.stillness_threshold,
            match_threshold: self.match_threshold,
            logo_margin: self.logo_margin,
            sample_interval_frames: self.sample_interval,
        }
    }

    fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            output_dir: self.output.clone(),
            refine: !self.skip_refine,
            export: !self.skip_export,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    init_tracing(log_level);

    info!("Ad segmentation CLI v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if args.info {
        return show_video_info(&args.video_path);
    }

    let config = args.config();
    config.validate().context("Invalid analyzer settings")?;

    let start_time = Instant::now();
    let channel = run_pipeline(&args.video_path, config, &args.pipeline_options())
        .with_context(|| format!("Segmentation of {} failed", args.video_path))?;
    let elapsed = start_time.elapsed();

    output_results(&channel, &args, elapsed)
}

fn show_video_info(video_path: &str) -> Result<()> {
    info!("Analyzing video: {}", video_path);

    let video_info = get_video_info(video_path)
        .context("Failed to get video info")?;

    println!("Video Information:");
    println!("  Path: {}", video_info.path);
    println!("  Dimensions: {}x{}", video_info.width, video_info.height);
    println!("  Frame Rate: {:.2} fps", video_info.fps);
    println!("  Frame Count: {}", video_info.frame_count);
    println!("  Duration: {:.2} seconds", video_info.duration_seconds);
    println!("  Stillness sampled every {} frames",
             video_info.sample_interval(&AnalyzerConfig::default()));
    println!("  Description: {}", video_info.description());

    if !video_info.is_valid() {
        warn!("Video properties appear invalid - segmentation may fail");
    }

    Ok(())
}

fn render_results(channel: &Channel, args: &Args, elapsed: Duration) -> Result<String> {
    let mut out = String::new();
    match args.format {
        OutputFormat::Simple => {
            for segment in channel.segments() {
                out.push_str(&format!("{} {} {} {}\n",
                                      segment.id, segment.start_ms, segment.end_ms, segment.kind));
            }
        }
        OutputFormat::Detailed => {
            out.push_str("Segmentation Results:\n");
            out.push_str(&format!("  Processing time: {}ms\n", elapsed.as_millis()));
            out.push_str(&format!("  Segments found: {}\n", channel.segments().len()));
            out.push_str(&format!("  Logos found: {}\n", channel.logos().len()));

            for logo in channel.logos() {
                out.push_str(&format!("    Logo {}: {} corner, box {:?}\n",
                                      logo.id(), logo.corner(), logo.frame_box()));
            }

            if channel.segments().is_empty() {
                out.push_str("  No segments detected\n");
            }
            for segment in channel.segments() {
                out.push_str(&format!("    Segment {}: {} - {} ({}s) {}",
                                      segment.id,
                                      format_timestamp(segment.start_ms),
                                      format_timestamp(segment.end_ms),
                                      segment.duration_ms() / 1000,
                                      segment.kind));
                if let Some(logo) = segment.logo.and_then(|id| channel.logo(id)) {
                    out.push_str(&format!(" logo {} ({} corner)", logo.id(), logo.corner()));
                }
                out.push('\n');
            }
        }
        OutputFormat::Json => {
            let metadata = build_metadata(channel, &args.video_path);
            out.push_str(&serde_json::to_string_pretty(&metadata)
                .context("JSON serialization failed")?);
            out.push('\n');
        }
    }
    Ok(out)
}

fn output_results(channel: &Channel, args: &Args, elapsed: Duration) -> Result<()> {
    print!("{}", render_results(channel, args, elapsed)?);

    info!("Segmentation completed in {}ms, found {} segments",
          elapsed.as_millis(), channel.segments().len());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults_match_library_config() {
        let args = parse(&["rust-adsplit", "recording.mp4"]);
        assert_eq!(args.video_path, "recording.mp4");
        assert_eq!(args.format, OutputFormat::Simple);
        assert_eq!(args.config(), AnalyzerConfig::default());

        let options = args.pipeline_options();
        assert!(options.refine && options.export);
        assert_eq!(options.output_dir, PathBuf::from("."));
    }

    #[test]
    fn test_flags_flow_into_config_and_options() {
        let args = parse(&[
            "rust-adsplit", "recording.mp4",
            "--output", "/tmp/out",
            "--minimum-program-seconds", "90",
            "--match-threshold", "20.5",
            "--sample-interval", "10",
            "--format", "json",
            "--skip-refine",
        ]);

        let config = args.config();
        assert_eq!(config.minimum_program_seconds, 90);
        assert_eq!(config.match_threshold, 20.5);
        assert_eq!(config.sample_interval_frames, Some(10));
        assert_eq!(args.format, OutputFormat::Json);

        let options = args.pipeline_options();
        assert!(!options.refine);
        assert!(options.export);
        assert_eq!(options.output_dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Args::try_parse_from(["rust-adsplit", "a.mp4", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_render_empty_channel() {
        let channel = Channel::new(64, 48, 25.0, AnalyzerConfig::default()).unwrap();

        let simple = parse(&["rust-adsplit", "a.mp4"]);
        assert_eq!(render_results(&channel, &simple, Duration::from_millis(5)).unwrap(), "");

        let detailed = parse(&["rust-adsplit", "a.mp4", "--format", "detailed"]);
        let text = render_results(&channel, &detailed, Duration::from_millis(5)).unwrap();
        assert!(text.contains("Segments found: 0"));
        assert!(text.contains("No segments detected"));

        let json = parse(&["rust-adsplit", "a.mp4", "--format", "json"]);
        let text = render_results(&channel, &json, Duration::from_millis(5)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["source"], "a.mp4");
        assert_eq!(value["fps"], 25.0);
        assert!(value["segments"].as_array().unwrap().is_empty());
    }
}
