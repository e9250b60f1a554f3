//! Frame-sequence processing: a bounded frame queue, a worker pool that runs
//! the detection pipeline on the blocking thread pool, and per-frame reports.

use std::collections::VecDeque;
use std::fmt;
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, bail};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::PlateError;
use crate::models::Detection;
use crate::pipeline::PlatePipeline;
use crate::region::{RegionInfo, RegionLookup};

/// What a full queue discards when a new frame is offered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// Evict the frame that has waited longest
    #[value(name = "oldest")]
    DropOldest,
    /// Discard the frame being offered
    #[default]
    #[value(name = "newest")]
    DropNewest,
}

/// One frame waiting for detection.
#[derive(Debug, Clone)]
pub struct FrameInput {
    pub index: usize,
    pub source: String,
    pub image: RgbImage,
}

impl FrameInput {
    pub fn new(index: usize, source: impl Into<String>, image: RgbImage) -> Self {
        Self {
            index,
            source: source.into(),
            image,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    Queued,
    /// The queue was full; the frame with this index was discarded
    Dropped { index: usize },
    Closed,
}

struct QueueState {
    frames: VecDeque<FrameInput>,
    closed: bool,
    dropped: usize,
}

/// Bounded multi-producer multi-consumer frame queue.
pub struct FrameQueue {
    capacity: usize,
    policy: DropPolicy,
    state: Mutex<QueueState>,
    not_empty: Notify,
    not_full: Notify,
}

impl FrameQueue {
    /// `capacity` is raised to at least one.
    pub fn new(capacity: usize, policy: DropPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            policy,
            state: Mutex::new(QueueState {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
                dropped: 0,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> DropPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Frames discarded by [`offer`](Self::offer) so far.
    pub fn dropped_count(&self) -> usize {
        self.lock().dropped
    }

    /// Enqueue without waiting, applying the drop policy when full.
    pub fn offer(&self, frame: FrameInput) -> OfferOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return OfferOutcome::Closed;
            }
            if state.frames.len() < self.capacity {
                state.frames.push_back(frame);
                OfferOutcome::Queued
            } else {
                state.dropped += 1;
                match self.policy {
                    DropPolicy::DropNewest => OfferOutcome::Dropped { index: frame.index },
                    DropPolicy::DropOldest => {
                        let evicted = state.frames.pop_front().map(|f| f.index);
                        state.frames.push_back(frame);
                        OfferOutcome::Dropped {
                            index: evicted.unwrap_or_default(),
                        }
                    }
                }
            }
        };

        if let OfferOutcome::Dropped { index } = outcome {
            debug!(frame = index, policy = ?self.policy, "frame queue full, dropped frame");
        }
        self.not_empty.notify_one();
        outcome
    }

    /// Enqueue, waiting for space. Fails once the queue is closed.
    pub async fn push(&self, frame: FrameInput) -> Result<()> {
        let mut frame = Some(frame);
        loop {
            let mut notified = pin!(self.not_full.notified());
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if state.closed {
                    bail!("frame queue is closed");
                }
                if state.frames.len() < self.capacity {
                    if let Some(frame) = frame.take() {
                        state.frames.push_back(frame);
                    }
                    drop(state);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Next frame in arrival order; `None` once closed and drained.
    pub async fn pop(&self) -> Option<FrameInput> {
        loop {
            let mut notified = pin!(self.not_empty.notified());
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if let Some(frame) = state.frames.pop_front() {
                    drop(state);
                    self.not_full.notify_one();
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Stop accepting frames and wake every waiter. Queued frames stay poppable.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }
}

/// A detection plus where its plate was issued, when the text was read.
#[derive(Debug, Clone, Serialize)]
pub struct ReportedDetection {
    #[serde(flatten)]
    pub detection: Detection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<RegionInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub index: usize,
    pub source: String,
    pub processed_at: String,
    pub detections: Vec<ReportedDetection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FrameReport {
    pub fn new(
        index: usize,
        source: impl Into<String>,
        result: std::result::Result<Vec<Detection>, PlateError>,
        regions: &RegionLookup,
    ) -> Self {
        let (detections, error) = match result {
            Ok(found) => (
                found
                    .into_iter()
                    .map(|detection| {
                        let region = detection.has_text().then(|| regions.lookup(&detection.text));
                        ReportedDetection { detection, region }
                    })
                    .collect(),
                None,
            ),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };

        Self {
            index,
            source: source.into(),
            processed_at: timestamp(),
            detections,
            error,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    pub fn plates_read(&self) -> usize {
        self.detections.iter().filter(|d| d.detection.has_text()).count()
    }
}

fn timestamp() -> String {
    OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
}

/// Running totals over a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames_processed: usize,
    pub frames_dropped: usize,
    pub frames_failed: usize,
    pub plates_detected: usize,
    pub plates_read: usize,
}

impl SessionStats {
    pub fn from_reports<'a>(reports: impl IntoIterator<Item = &'a FrameReport>, dropped: usize) -> Self {
        let mut stats = Self::default();
        for report in reports {
            stats.record(report);
        }
        stats.record_dropped(dropped);
        stats
    }

    pub fn record(&mut self, report: &FrameReport) {
        if report.is_failure() {
            self.frames_failed += 1;
            return;
        }
        self.frames_processed += 1;
        self.plates_detected += report.detections.len();
        self.plates_read += report.plates_read();
    }

    pub fn record_dropped(&mut self, count: usize) {
        self.frames_dropped += count;
    }

    /// Percentage of detections that came back with text.
    pub fn read_rate(&self) -> f64 {
        if self.plates_detected == 0 {
            return 0.0;
        }
        self.plates_read as f64 * 100.0 / self.plates_detected as f64
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames: {} processed, {} dropped, {} failed | plates: {} detected, {} read ({:.1}%)",
            self.frames_processed,
            self.frames_dropped,
            self.frames_failed,
            self.plates_detected,
            self.plates_read,
            self.read_rate()
        )
    }
}

/// Pops frames off a [`FrameQueue`] and runs the pipeline on each.
pub struct FrameProcessor {
    pipeline: Arc<PlatePipeline>,
    regions: Arc<RegionLookup>,
    workers: usize,
}

impl FrameProcessor {
    pub fn new(pipeline: Arc<PlatePipeline>, workers: usize) -> Self {
        Self {
            pipeline,
            regions: Arc::new(RegionLookup::default()),
            workers: workers.max(1),
        }
    }

    pub fn with_regions(mut self, regions: RegionLookup) -> Self {
        self.regions = Arc::new(regions);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process frames until `queue` is closed and drained.
    ///
    /// Reports come back sorted by frame index.
    pub async fn run(&self, queue: Arc<FrameQueue>) -> Result<Vec<FrameReport>> {
        let mut handles = Vec::with_capacity(self.workers);
        for worker in 0..self.workers {
            let queue = Arc::clone(&queue);
            let pipeline = Arc::clone(&self.pipeline);
            let regions = Arc::clone(&self.regions);
            handles.push(tokio::spawn(async move {
                let mut reports = Vec::new();
                while let Some(frame) = queue.pop().await {
                    let pipeline = Arc::clone(&pipeline);
                    let FrameInput { index, source, image } = frame;
                    let result = tokio::task::spawn_blocking(move || pipeline.detect_plates(&image)).await?;
                    if let Err(e) = &result {
                        warn!(worker, frame = index, error = %e, "frame rejected");
                    }
                    let report = FrameReport::new(index, source, result, &regions);
                    debug!(worker, frame = index, plates = report.detections.len(), "frame processed");
                    reports.push(report);
                }
                anyhow::Ok(reports)
            }));
        }

        let mut reports = Vec::new();
        for handle in handles {
            reports.extend(handle.await??);
        }
        reports.sort_by_key(|r| r.index);
        Ok(reports)
    }
}
