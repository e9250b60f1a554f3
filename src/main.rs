use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use image::ImageReader;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use platescan::annotate::draw_detections;
use platescan::stream::OfferOutcome;
use platescan::{
    DropPolicy, FrameInput, FrameProcessor, FrameQueue, FrameReport, PlateConfig, PlatePipeline,
    RecognizerConfig, SessionStats,
};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

#[derive(Parser)]
#[command(name = "platescan")]
#[command(about = "Detect and read vehicle registration plates in images and frame sequences")]
struct Cli {
    /// Image files, or directories of frames processed in file-name order
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// YAML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print one JSON report per frame
    #[arg(long)]
    json: bool,

    /// Write annotated frames to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    annotate_out: Option<PathBuf>,

    /// Number of frames processed concurrently
    #[arg(long, default_value_t = 2)]
    workers: usize,

    /// Frames buffered between the reader and the workers
    #[arg(long, default_value_t = 8)]
    queue_capacity: usize,

    /// Drop frames when the queue is full instead of waiting
    #[arg(long)]
    realtime: bool,

    /// Which frame a full queue gives up in realtime mode
    #[arg(long, value_enum, default_value_t = DropPolicy::DropNewest)]
    drop_policy: DropPolicy,

    /// Skip text recognition (detection only)
    #[arg(long)]
    skip_text: bool,

    /// Cascade model to try before the configured ones (repeatable)
    #[arg(long, value_name = "FILE")]
    cascade_model: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let default_filter = if args.verbose { "platescan=debug" } else { "platescan=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    let frames = collect_frames(&args.inputs)?;
    if frames.is_empty() {
        return Err(anyhow!("No image files found in the given inputs"));
    }
    if let Some(dir) = &args.annotate_out {
        prepare_output_dir(dir)?;
    }
    info!(frames = frames.len(), workers = args.workers, "starting");

    let pipeline = Arc::new(PlatePipeline::from_config(&config));
    debug!(detectors = ?pipeline.detector_names(), recognizer = pipeline.extractor().recognizer_name(), "pipeline ready");

    let queue = Arc::new(FrameQueue::new(args.queue_capacity, args.drop_policy));
    let producer = tokio::spawn(feed_frames(Arc::clone(&queue), frames, args.realtime));

    let processor = FrameProcessor::new(pipeline, args.workers);
    let reports = processor.run(Arc::clone(&queue)).await?;
    let unreadable = producer.await??;

    for report in &reports {
        if args.json {
            println!("{}", serde_json::to_string(report)?);
        } else {
            print_report(report);
        }
        if let Some(dir) = &args.annotate_out {
            save_annotated(dir, report)?;
        }
    }

    let mut stats = SessionStats::from_reports(&reports, queue.dropped_count());
    stats.frames_failed += unreadable;
    if args.json {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        println!("\n=== Session ===");
        println!("{}", stats);
    }

    Ok(())
}

fn load_config(args: &Cli) -> Result<PlateConfig> {
    let mut config = match &args.config {
        Some(path) => PlateConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PlateConfig::default(),
    };
    if !args.cascade_model.is_empty() {
        let mut paths = args.cascade_model.clone();
        paths.append(&mut config.cascade.model_paths);
        config.cascade.model_paths = paths;
    }
    if args.skip_text {
        config.text.recognizer = RecognizerConfig::Disabled;
    }
    Ok(config)
}

/// Expand directories into their image files, sorted by name.
fn collect_frames(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries = std::fs::read_dir(input)
                .with_context(|| format!("Failed to read directory {}", input.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && has_image_extension(path))
                .collect::<Vec<_>>();
            entries.sort();
            frames.extend(entries);
        } else if input.is_file() {
            frames.push(input.clone());
        } else {
            return Err(anyhow!("Input not found: {}", input.display()));
        }
    }
    Ok(frames)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn prepare_output_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        let entries = std::fs::read_dir(dir)?;
        if entries.count() > 0 {
            return Err(anyhow!("Annotation directory is not empty: {}", dir.display()));
        }
    } else {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Decode every frame into the queue, then close it. Returns the number of
/// files that could not be decoded.
async fn feed_frames(queue: Arc<FrameQueue>, frames: Vec<PathBuf>, realtime: bool) -> Result<usize> {
    let mut unreadable = 0;
    for (index, path) in frames.into_iter().enumerate() {
        let image = match ImageReader::open(&path).map_err(anyhow::Error::from).and_then(|r| Ok(r.decode()?)) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to decode image");
                unreadable += 1;
                continue;
            }
        };
        let frame = FrameInput::new(index, path.display().to_string(), image);

        if realtime {
            if let OfferOutcome::Closed = queue.offer(frame) {
                break;
            }
        } else if let Err(e) = queue.push(frame).await {
            queue.close();
            return Err(e);
        }
    }
    queue.close();
    Ok(unreadable)
}

fn print_report(report: &FrameReport) {
    if let Some(error) = &report.error {
        println!("[{:04}] {}: error: {}", report.index, report.source, error);
        return;
    }
    println!("[{:04}] {}: {} plate(s)", report.index, report.source, report.detections.len());
    for reported in &report.detections {
        let d = &reported.detection;
        let text = if d.has_text() { d.text.as_str() } else { "-" };
        let b = d.bbox;
        print!(
            "  {:<12} {:<8} {:.2} [{}, {}, {}, {}]",
            text, d.method.as_str(), d.confidence, b.x1, b.y1, b.x2, b.y2
        );
        match &reported.region {
            Some(region) => println!("  {} / {}", region.region_name, region.subregion),
            None => println!(),
        }
    }
}

fn save_annotated(dir: &Path, report: &FrameReport) -> Result<()> {
    let frame = ImageReader::open(&report.source)?
        .decode()
        .map_err(|e| anyhow!("Failed to decode image: {}", e))?
        .to_rgb8();
    let detections: Vec<_> = report.detections.iter().map(|r| r.detection.clone()).collect();
    let annotated = draw_detections(&frame, &detections);

    let stem = Path::new(&report.source)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("frame");
    let out = dir.join(format!("{:04}_{}.png", report.index, stem));
    annotated.save(&out)?;
    debug!(path = %out.display(), "saved annotated frame");
    Ok(())
}
