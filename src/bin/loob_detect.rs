//! loob_detect - run the detection pipeline over a frame source
//!
//! Loads `PipelineConfig` (LOOB_CONFIG + LOOB_* overrides), selects a model,
//! opens the frame source and prints one JSON line per processed frame on
//! stdout. Frames the source fails to read are logged and skipped. Stops on
//! Ctrl-C, at the end of the source, after --max-frames, or once the source
//! fails too many reads in a row.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use loob_vision::{
    next_good_frame, open_source, DetectionPipeline, FrameOutcome, FrameReport, Interpolation,
    PipelineConfig,
};

/// Failed reads in a row before the source is given up on.
const MAX_CONSECUTIVE_SOURCE_ERRORS: u32 = 10;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Model id to activate (defaults to the configured default model).
    #[arg(long)]
    model: Option<String>,
    /// Frame source URI (stub://name, an image or directory, /dev/videoN, a video file).
    #[arg(long)]
    source: Option<String>,
    /// Resize interpolation: bilinear or nearest.
    #[arg(long)]
    interpolation: Option<Interpolation>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Do not sleep between frames to hold the configured frame rate.
    #[arg(long)]
    no_pacing: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = PipelineConfig::load().context("load pipeline configuration")?;
    if let Some(uri) = args.source {
        config.source.uri = uri;
    }
    if let Some(interpolation) = args.interpolation {
        config.interpolation = interpolation;
    }
    let max_frames = args.max_frames.or(config.max_frames);
    let model_id = args.model.unwrap_or_else(|| config.default_model.clone());

    let mut pipeline = DetectionPipeline::from_config(&config)?;
    pipeline
        .set_model(&model_id)
        .with_context(|| format!("activate model '{}'", model_id))?;

    pipeline.register_frame_processor(|report: &FrameReport| -> Result<()> {
        let line = serde_json::to_string(report)?;
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", line)?;
        Ok(())
    })?;

    let mut source = open_source(&config.source.uri, &config.source)?;
    source.connect()?;

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
        .context("install Ctrl-C handler")?;

    let frame_interval = if args.no_pacing {
        Duration::ZERO
    } else {
        Duration::from_millis(1000 / u64::from(config.source.target_fps.max(1)))
    };

    log::info!(
        "loob_detect running: model '{}', source {}, {} interpolation",
        model_id,
        config.source.uri,
        config.interpolation
    );

    let mut handled = 0u64;
    while running.load(Ordering::SeqCst) {
        if max_frames.is_some_and(|limit| handled >= limit) {
            break;
        }
        let started = Instant::now();
        let Some(frame) = next_good_frame(source.as_mut(), MAX_CONSECUTIVE_SOURCE_ERRORS)? else {
            log::info!("source exhausted");
            break;
        };
        handled += 1;

        match pipeline.process_frame(&frame)? {
            FrameOutcome::Processed(_) => {}
            FrameOutcome::Skipped(err) => log::debug!("frame {} skipped: {}", frame.index, err),
        }

        if !source.is_healthy() {
            log::warn!("frame source {} reports unhealthy", source.stats().source);
        }
        if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    let stats = pipeline.stats();
    log::info!(
        "loob_detect stopping: {} frames processed, {} skipped, {} processor failures",
        stats.frames_processed,
        stats.frames_skipped,
        stats.processor_failures
    );
    pipeline.dispose();
    Ok(())
}
