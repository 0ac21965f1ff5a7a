//! Pipeline diagnostics: timing and counts for each stage.
//!
//! Every [`SegmentationPipeline::run`](crate::SegmentationPipeline::run)
//! collects diagnostics alongside its results. Timestamps come from an
//! injected [`Clock`] so tests can run without wall-clock time.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque timestamp.
    type Instant;

    /// Current timestamp.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Splitting the source into tiles.
    pub split: StageDiagnostics,
    /// Per-tile model inference and binarization.
    pub inference: StageDiagnostics,
    /// OR-merging tile masks.
    pub merge: StageDiagnostics,
    /// Rendering the highlighted overlay.
    pub overlay: StageDiagnostics,
    /// Counting pixels and converting to area.
    pub estimate: StageDiagnostics,
    /// Removing scratch tiles.
    pub cleanup: StageDiagnostics,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary of the run.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Tile grid layout.
    Split {
        /// Tile columns.
        columns: usize,
        /// Tile rows.
        rows: usize,
        /// Tile width in pixels.
        tile_width: u32,
        /// Tile height in pixels.
        tile_height: u32,
        /// Nominal overlap fraction.
        overlap: f64,
    },
    /// Inference counts.
    Inference {
        /// Tiles sent to the model.
        tile_count: usize,
        /// Tiles with at least one positive pixel.
        positive_tile_count: usize,
        /// Binarization threshold.
        threshold: f32,
    },
    /// Merged mask coverage.
    Merge {
        /// Positive pixels in the merged mask.
        positive_pixel_count: u64,
        /// Total pixels in the merged mask.
        total_pixel_count: u64,
    },
    /// Overlay blend weights.
    Overlay {
        /// Weight of the source image.
        source_weight: f32,
        /// Weight of the highlight layer.
        mask_weight: f32,
    },
    /// Area conversion.
    Estimate {
        /// Calibration constant in cm² per pixel.
        area_per_pixel: f64,
        /// Resulting area in cm².
        area_cm2: f64,
    },
    /// Scratch cleanup outcome.
    Cleanup {
        /// Whether scratch storage was removed.
        removed: bool,
    },
}

/// High-level summary of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Number of tiles processed.
    pub tile_count: usize,
    /// Positive pixels in the final mask.
    pub positive_pixel_count: u64,
    /// Honey area in cm².
    pub area_cm2: f64,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<16} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Split", &self.split),
            ("Inference", &self.inference),
            ("Merge", &self.merge),
            ("Overlay", &self.overlay),
            ("Estimate", &self.estimate),
            ("Cleanup", &self.cleanup),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<16} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Tiles: {}  |  Honey pixels: {}  |  Area: {:.4} cm²",
            self.summary.tile_count, self.summary.positive_pixel_count, self.summary.area_cm2,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Split {
            columns,
            rows,
            tile_width,
            tile_height,
            overlap,
        } => format!("{columns}x{rows} tiles of {tile_width}x{tile_height}, overlap {overlap:.2}"),
        StageMetrics::Inference {
            tile_count,
            positive_tile_count,
            threshold,
        } => format!("{positive_tile_count}/{tile_count} tiles positive (p > {threshold:.2})"),
        StageMetrics::Merge {
            positive_pixel_count,
            total_pixel_count,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let coverage = if *total_pixel_count > 0 {
                *positive_pixel_count as f64 / *total_pixel_count as f64 * 100.0
            } else {
                0.0
            };
            format!("{positive_pixel_count} positive px ({coverage:.1}%)")
        }
        StageMetrics::Overlay {
            source_weight,
            mask_weight,
        } => format!("weights {source_weight:.2}/{mask_weight:.2}"),
        StageMetrics::Estimate {
            area_per_pixel,
            area_cm2,
        } => format!("{area_per_pixel:.6} cm²/px -> {area_cm2:.4} cm²"),
        StageMetrics::Cleanup { removed } => {
            if *removed {
                "scratch removed".to_owned()
            } else {
                "scratch left behind".to_owned()
            }
        }
    }
}
