//! The segmentation orchestrator.
//!
//! One call to [`SegmentationPipeline::run`] takes a source image through
//! every stage in a fixed order:
//!
//! ```text
//! Idle -> Splitting -> Inferring -> Merging -> Overlaying -> Estimating -> Cleanup -> Done
//! ```
//!
//! Any error moves the run to `Failed`. Scratch storage is cleaned up on
//! both `Done` and `Failed` once splitting has started; a cleanup failure
//! is logged and does not change the outcome.
//!
//! All intermediates of a run live in a [`RunContext`] created and
//! dropped inside that one call.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::calibration::AreaPerPixel;
use crate::diagnostics::{
    Clock, PipelineDiagnostics, PipelineSummary, StageDiagnostics, StageMetrics,
};
use crate::inference::{CancelFlag, SegmentationModel};
use crate::store::TileStore;
use crate::tiling::TileGrid;
use crate::types::{Dimensions, GrayImage, PipelineConfig, PipelineError, RgbImage};
use crate::{area, inference, merge, overlay, tiler};

/// Pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Not started; configuration and calibration checks happen here.
    Idle,
    /// Cutting the source into tiles.
    Splitting,
    /// Running the model per tile.
    Inferring,
    /// OR-merging tile masks.
    Merging,
    /// Rendering the highlighted overlay.
    Overlaying,
    /// Converting the mask to an area.
    Estimating,
    /// Removing scratch storage.
    Cleanup,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
}

impl Stage {
    /// Share of overall progress owned by this stage, as `(start, end)`.
    #[must_use]
    pub const fn progress_range(self) -> (f64, f64) {
        match self {
            Self::Idle => (0.0, 0.0),
            Self::Splitting => (0.0, 0.1),
            Self::Inferring => (0.1, 0.8),
            Self::Merging => (0.8, 0.9),
            Self::Overlaying => (0.9, 0.95),
            Self::Estimating => (0.95, 1.0),
            Self::Cleanup | Self::Done | Self::Failed => (1.0, 1.0),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Splitting => "splitting",
            Self::Inferring => "inference",
            Self::Merging => "merging",
            Self::Overlaying => "overlay",
            Self::Estimating => "estimation",
            Self::Cleanup => "cleanup",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// A progress report: the current stage and overall completion in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Stage being executed.
    pub stage: Stage,
    /// Overall fraction complete.
    pub fraction: f64,
}

impl Progress {
    /// Map a fraction local to `stage` onto the overall range.
    #[must_use]
    pub fn within(stage: Stage, local: f64) -> Self {
        let (start, end) = stage.progress_range();
        Self {
            stage,
            fraction: (end - start).mul_add(local.clamp(0.0, 1.0), start),
        }
    }
}

/// A failed run: which stage failed and why.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {error}")]
pub struct PipelineFailure {
    /// Stage that was executing when the error occurred.
    pub stage: Stage,
    /// The underlying error.
    #[source]
    pub error: PipelineError,
}

impl PipelineFailure {
    /// A failure detected before any work started.
    #[must_use]
    pub fn before_start(error: impl Into<PipelineError>) -> Self {
        Self {
            stage: Stage::Idle,
            error: error.into(),
        }
    }
}

/// Everything a successful run produces.
#[derive(Debug, Clone)]
pub struct SegmentationOutcome {
    /// Full-resolution binary mask (0 or 255).
    pub mask: GrayImage,
    /// Source image with honey highlighted.
    pub overlay: RgbImage,
    /// Honey area in cm², rounded to 4 decimals.
    pub area_cm2: f64,
    /// Positive pixels in `mask`.
    pub positive_pixels: u64,
    /// Tile grid the run used.
    pub grid: TileGrid,
    /// Per-stage timing and counts.
    pub diagnostics: PipelineDiagnostics,
}

/// Inputs shared by every stage of one run.
struct RunContext<'s> {
    source: &'s RgbImage,
    grid: TileGrid,
    area_per_pixel: AreaPerPixel,
}

/// Stage outputs collected on the way to [`SegmentationOutcome`].
struct Completed {
    mask: GrayImage,
    overlay: RgbImage,
    area_cm2: f64,
    positive_pixels: u64,
    split: StageDiagnostics,
    inference: StageDiagnostics,
    merge: StageDiagnostics,
    overlay_diag: StageDiagnostics,
    estimate: StageDiagnostics,
}

/// Forwards progress to the caller's sink, remembering the last value.
struct Reporter<'a> {
    sink: Option<&'a mut dyn FnMut(Progress)>,
    last: f64,
}

impl Reporter<'_> {
    fn emit(&mut self, stage: Stage, local: f64) {
        let progress = Progress::within(stage, local);
        self.last = progress.fraction;
        if let Some(sink) = self.sink.as_mut() {
            sink(progress);
        }
    }

    fn fail(&mut self) {
        let fraction = self.last;
        if let Some(sink) = self.sink.as_mut() {
            sink(Progress {
                stage: Stage::Failed,
                fraction,
            });
        }
    }
}

/// Configured pipeline, ready to [`run`](Self::run) once.
#[must_use = "a pipeline does nothing until .run() is called"]
pub struct SegmentationPipeline<'a> {
    config: PipelineConfig,
    progress: Option<&'a mut dyn FnMut(Progress)>,
    cancel: Option<CancelFlag>,
}

impl<'a> SegmentationPipeline<'a> {
    /// A pipeline with the given configuration.
    pub const fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            progress: None,
            cancel: None,
        }
    }

    /// Receive a [`Progress`] report at every stage boundary and after
    /// every tile.
    pub fn on_progress(mut self, sink: &'a mut dyn FnMut(Progress)) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Check `flag` between tiles and abort when it is set.
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// The pipeline configuration.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage over `source`.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineFailure`] naming the failed stage. Configuration
    /// errors are reported from [`Stage::Idle`] before any tile is stored.
    pub fn run<M, S, C>(
        self,
        source: &RgbImage,
        area_per_pixel: AreaPerPixel,
        model: &mut M,
        store: &mut S,
        clock: &C,
    ) -> Result<SegmentationOutcome, PipelineFailure>
    where
        M: SegmentationModel + ?Sized,
        S: TileStore + ?Sized,
        C: Clock,
    {
        let Self {
            config,
            progress,
            cancel,
        } = self;
        let mut reporter = Reporter {
            sink: progress,
            last: 0.0,
        };
        let started = clock.now();

        let grid = match plan(&config, source) {
            Ok(grid) => grid,
            Err(error) => {
                reporter.fail();
                return Err(PipelineFailure::before_start(error));
            }
        };
        log::debug!(
            "planned {}x{} grid of {} tiles over {}",
            grid.columns(),
            grid.rows(),
            grid.tile_size(),
            grid.source()
        );

        let ctx = RunContext {
            source,
            grid,
            area_per_pixel,
        };
        let result = execute(
            &config,
            cancel.as_ref(),
            &mut reporter,
            &ctx,
            model,
            store,
            clock,
        );

        // A failed run keeps its last fraction; only a finished one reaches
        // the cleanup range.
        if result.is_ok() {
            reporter.emit(Stage::Cleanup, 0.0);
        }
        let cleanup_started = clock.now();
        let removed = match store.cleanup() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("could not remove scratch storage: {e}");
                false
            }
        };
        let cleanup = StageDiagnostics {
            duration: clock.elapsed(&cleanup_started),
            metrics: StageMetrics::Cleanup { removed },
        };

        match result {
            Ok(done) => {
                reporter.emit(Stage::Done, 1.0);
                let total_duration = clock.elapsed(&started);
                Ok(finish(ctx, done, cleanup, total_duration))
            }
            Err((stage, error)) => {
                log::debug!("{stage} stage failed: {error}");
                reporter.fail();
                Err(PipelineFailure { stage, error })
            }
        }
    }
}

fn plan(config: &PipelineConfig, source: &RgbImage) -> Result<TileGrid, PipelineError> {
    config.validate()?;
    TileGrid::plan(
        Dimensions::of(source),
        config.tile_dimensions(),
        config.overlap,
    )
}

fn at(stage: Stage) -> impl Fn(PipelineError) -> (Stage, PipelineError) {
    move |error| (stage, error)
}

fn execute<M, S, C>(
    config: &PipelineConfig,
    cancel: Option<&CancelFlag>,
    reporter: &mut Reporter<'_>,
    ctx: &RunContext<'_>,
    model: &mut M,
    store: &mut S,
    clock: &C,
) -> Result<Completed, (Stage, PipelineError)>
where
    M: SegmentationModel + ?Sized,
    S: TileStore + ?Sized,
    C: Clock,
{
    let grid = &ctx.grid;

    reporter.emit(Stage::Splitting, 0.0);
    let t = clock.now();
    tiler::split_into(ctx.source, grid, store, &mut |f| {
        reporter.emit(Stage::Splitting, f);
    })
    .map_err(at(Stage::Splitting))?;
    let split = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Split {
            columns: grid.columns(),
            rows: grid.rows(),
            tile_width: grid.tile_size().width,
            tile_height: grid.tile_size().height,
            overlap: config.overlap,
        },
    };

    reporter.emit(Stage::Inferring, 0.0);
    let t = clock.now();
    let positive_tiles =
        inference::run_inference(grid, model, store, config.threshold, cancel, &mut |f| {
            reporter.emit(Stage::Inferring, f);
        })
        .map_err(at(Stage::Inferring))?;
    let inference = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Inference {
            tile_count: grid.len(),
            positive_tile_count: positive_tiles,
            threshold: config.threshold,
        },
    };

    reporter.emit(Stage::Merging, 0.0);
    let t = clock.now();
    let mask = merge::merge_from_store(grid, store, &mut |f| {
        reporter.emit(Stage::Merging, f);
    })
    .map_err(at(Stage::Merging))?;
    let positive_pixels = area::count_positive(&mask);
    let merge = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Merge {
            positive_pixel_count: positive_pixels,
            total_pixel_count: grid.source().pixel_count(),
        },
    };

    reporter.emit(Stage::Overlaying, 0.0);
    let t = clock.now();
    let overlay = overlay::blend(
        ctx.source,
        &mask,
        config.highlight,
        config.source_weight,
        config.mask_weight,
    )
    .map_err(at(Stage::Overlaying))?;
    let overlay_diag = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Overlay {
            source_weight: config.source_weight,
            mask_weight: config.mask_weight,
        },
    };

    reporter.emit(Stage::Estimating, 0.0);
    let t = clock.now();
    let area_cm2 = area::estimate(&mask, ctx.area_per_pixel);
    let estimate = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Estimate {
            area_per_pixel: ctx.area_per_pixel.get(),
            area_cm2,
        },
    };
    reporter.emit(Stage::Estimating, 1.0);
    log::debug!("{positive_pixels} honey pixels, {area_cm2:.4} cm²");

    Ok(Completed {
        mask,
        overlay,
        area_cm2,
        positive_pixels,
        split,
        inference,
        merge,
        overlay_diag,
        estimate,
    })
}

fn finish(
    ctx: RunContext<'_>,
    done: Completed,
    cleanup: StageDiagnostics,
    total_duration: Duration,
) -> SegmentationOutcome {
    let source = ctx.grid.source();
    let summary = PipelineSummary {
        image_width: source.width,
        image_height: source.height,
        pixel_count: source.pixel_count(),
        tile_count: ctx.grid.len(),
        positive_pixel_count: done.positive_pixels,
        area_cm2: done.area_cm2,
    };
    SegmentationOutcome {
        mask: done.mask,
        overlay: done.overlay,
        area_cm2: done.area_cm2,
        positive_pixels: done.positive_pixels,
        grid: ctx.grid,
        diagnostics: PipelineDiagnostics {
            split: done.split,
            inference: done.inference,
            merge: done.merge,
            overlay: done.overlay_diag,
            estimate: done.estimate,
            cleanup,
            total_duration,
            summary,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use image::{Luma, Rgb};

    use super::*;
    use crate::store::MemoryTileStore;
    use crate::types::{ModelError, ProbabilityMap, StorageError};

    /// Clock that advances one millisecond per reading.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn clock() -> TickClock {
        TickClock(Cell::new(0))
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            tile_width: 8,
            tile_height: 8,
            ..PipelineConfig::default()
        }
    }

    /// Model that marks pure white pixels as honey.
    fn white_is_honey(tile: &RgbImage) -> Result<ProbabilityMap, ModelError> {
        Ok(ProbabilityMap::from_fn(tile.width(), tile.height(), |x, y| {
            Luma([if tile.get_pixel(x, y).0 == [255, 255, 255] {
                1.0
            } else {
                0.0
            }])
        }))
    }

    fn app(v: f64) -> AreaPerPixel {
        AreaPerPixel::new(v).unwrap()
    }

    #[test]
    fn run_produces_mask_overlay_and_area() {
        // 20x12 image with a 6x4 white rectangle at (5, 3).
        let source = RgbImage::from_fn(20, 12, |x, y| {
            if (5..11).contains(&x) && (3..7).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([10, 20, 30])
            }
        });
        let mut store = MemoryTileStore::default();
        let mut model = white_is_honey;
        let outcome = SegmentationPipeline::new(small_config())
            .run(&source, app(0.5), &mut model, &mut store, &clock())
            .unwrap();

        assert_eq!(outcome.positive_pixels, 24);
        assert!((outcome.area_cm2 - 12.0).abs() < 1e-12);
        assert_eq!(Dimensions::of(&outcome.mask), Dimensions::new(20, 12));
        assert_eq!(outcome.mask.get_pixel(5, 3).0[0], 255);
        assert_eq!(outcome.mask.get_pixel(4, 3).0[0], 0);
        assert_eq!(outcome.overlay.get_pixel(0, 0), &Rgb([10, 20, 30]));
        assert_eq!(outcome.overlay.get_pixel(5, 3), &Rgb([255, 153, 153]));
        assert_eq!(outcome.diagnostics.summary.tile_count, outcome.grid.len());
        assert_eq!(store.tile_count(), 0, "scratch should be cleaned up");
    }

    #[test]
    fn progress_visits_stages_in_order() {
        let source = RgbImage::new(16, 16);
        let mut store = MemoryTileStore::default();
        let mut model = white_is_honey;
        let mut events = Vec::new();
        let mut sink = |p: Progress| events.push(p);
        SegmentationPipeline::new(small_config())
            .on_progress(&mut sink)
            .run(&source, app(1.0), &mut model, &mut store, &clock())
            .unwrap();

        let mut stages: Vec<Stage> = events.iter().map(|p| p.stage).collect();
        stages.dedup();
        assert_eq!(
            stages,
            vec![
                Stage::Splitting,
                Stage::Inferring,
                Stage::Merging,
                Stage::Overlaying,
                Stage::Estimating,
                Stage::Cleanup,
                Stage::Done
            ]
        );
        assert!(events.windows(2).all(|w| w[0].fraction <= w[1].fraction));
        let inferring: Vec<f64> = events
            .iter()
            .filter(|p| p.stage == Stage::Inferring)
            .map(|p| p.fraction)
            .collect();
        assert!((inferring[0] - 0.1).abs() < 1e-12);
        assert!((inferring[inferring.len() - 1] - 0.8).abs() < 1e-12);
        assert!((events[events.len() - 1].fraction - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_config_fails_before_splitting() {
        let source = RgbImage::new(16, 16);
        let mut store = MemoryTileStore::default();
        let mut model = white_is_honey;
        let failure = SegmentationPipeline::new(PipelineConfig {
            overlap: 1.5,
            ..small_config()
        })
        .run(&source, app(1.0), &mut model, &mut store, &clock())
        .unwrap_err();
        assert_eq!(failure.stage, Stage::Idle);
        assert!(matches!(failure.error, PipelineError::InvalidConfig(_)));
    }

    #[test]
    fn image_smaller_than_tile_is_a_config_error() {
        let source = RgbImage::new(4, 4);
        let mut store = MemoryTileStore::default();
        let mut model = white_is_honey;
        let failure = SegmentationPipeline::new(small_config())
            .run(&source, app(1.0), &mut model, &mut store, &clock())
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Idle);
    }

    #[test]
    fn model_failure_fails_inference_and_cleans_up() {
        let source = RgbImage::new(16, 16);
        let mut store = MemoryTileStore::default();
        let mut model = |_: &RgbImage| -> Result<ProbabilityMap, ModelError> {
            Err(ModelError("no session".to_owned()))
        };
        let mut last = None;
        let mut sink = |p: Progress| last = Some(p);
        let failure = SegmentationPipeline::new(small_config())
            .on_progress(&mut sink)
            .run(&source, app(1.0), &mut model, &mut store, &clock())
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Inferring);
        assert!(matches!(
            failure.error,
            PipelineError::Inference { index: 0, .. }
        ));
        assert_eq!(
            failure.to_string(),
            "inference stage failed: inference failed on tile 0: no session"
        );
        assert_eq!(store.tile_count(), 0);
        assert_eq!(last.unwrap().stage, Stage::Failed);
    }

    #[test]
    fn failed_run_reports_progress_from_before_cleanup() {
        let source = RgbImage::new(24, 8);
        let mut store = MemoryTileStore::default();
        let mut calls = 0;
        let mut model = |tile: &RgbImage| -> Result<ProbabilityMap, ModelError> {
            calls += 1;
            if calls == 3 {
                Err(ModelError("out of memory".to_owned()))
            } else {
                white_is_honey(tile)
            }
        };
        let mut events = Vec::new();
        let mut sink = |p: Progress| events.push(p);
        SegmentationPipeline::new(small_config())
            .on_progress(&mut sink)
            .run(&source, app(1.0), &mut model, &mut store, &clock())
            .unwrap_err();

        assert!(events.iter().all(|p| p.stage != Stage::Cleanup));
        let failed = events[events.len() - 1];
        let before = events[events.len() - 2];
        assert_eq!(failed.stage, Stage::Failed);
        assert_eq!(before.stage, Stage::Inferring);
        assert!((failed.fraction - before.fraction).abs() < f64::EPSILON);
        assert!(failed.fraction < 0.8);
    }

    /// Store whose scratch area can never be created.
    #[derive(Default)]
    struct UnwritableStore {
        cleanups: usize,
    }

    impl TileStore for UnwritableStore {
        fn prepare(&mut self, _grid: &TileGrid) -> Result<(), StorageError> {
            Err(StorageError::new("creating scratch directory", "read-only file system"))
        }
        fn put_tile(&mut self, index: usize, _tile: &RgbImage) -> Result<(), StorageError> {
            Err(StorageError::new(format!("writing tile {index}"), "not prepared"))
        }
        fn get_tile(&self, index: usize) -> Result<RgbImage, StorageError> {
            Err(StorageError::new(format!("reading tile {index}"), "not prepared"))
        }
        fn put_mask(&mut self, index: usize, _mask: &GrayImage) -> Result<(), StorageError> {
            Err(StorageError::new(format!("writing mask {index}"), "not prepared"))
        }
        fn get_mask(&self, index: usize) -> Result<GrayImage, StorageError> {
            Err(StorageError::new(format!("reading mask {index}"), "not prepared"))
        }
        fn has_mask(&self, _index: usize) -> bool {
            false
        }
        fn cleanup(&mut self) -> Result<(), StorageError> {
            self.cleanups += 1;
            Ok(())
        }
    }

    #[test]
    fn scratch_creation_failure_fails_splitting_and_still_cleans_up() {
        let source = RgbImage::new(16, 16);
        let mut store = UnwritableStore::default();
        let mut model_calls = 0;
        let mut model = |tile: &RgbImage| {
            model_calls += 1;
            white_is_honey(tile)
        };
        let mut last = None;
        let mut sink = |p: Progress| last = Some(p);
        let failure = SegmentationPipeline::new(small_config())
            .on_progress(&mut sink)
            .run(&source, app(1.0), &mut model, &mut store, &clock())
            .unwrap_err();

        assert_eq!(failure.stage, Stage::Splitting);
        assert!(matches!(failure.error, PipelineError::Storage(_)));
        assert_eq!(
            failure.to_string(),
            "splitting stage failed: creating scratch directory failed: read-only file system"
        );
        assert_eq!(store.cleanups, 1);
        assert_eq!(model_calls, 0);
        let last = last.unwrap();
        assert_eq!(last.stage, Stage::Failed);
        assert!(last.fraction.abs() < f64::EPSILON);
    }

    #[test]
    fn cancellation_aborts_inference() {
        let source = RgbImage::new(16, 16);
        let mut store = MemoryTileStore::default();
        let mut model = white_is_honey;
        let cancel = CancelFlag::default();
        cancel.cancel();
        let failure = SegmentationPipeline::new(small_config())
            .with_cancel(cancel)
            .run(&source, app(1.0), &mut model, &mut store, &clock())
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Inferring);
        assert!(matches!(failure.error, PipelineError::Cancelled));
    }

    /// Store whose cleanup always fails.
    #[derive(Default)]
    struct StickyStore(MemoryTileStore);

    impl TileStore for StickyStore {
        fn prepare(&mut self, grid: &TileGrid) -> Result<(), StorageError> {
            self.0.prepare(grid)
        }
        fn put_tile(&mut self, index: usize, tile: &RgbImage) -> Result<(), StorageError> {
            self.0.put_tile(index, tile)
        }
        fn get_tile(&self, index: usize) -> Result<RgbImage, StorageError> {
            self.0.get_tile(index)
        }
        fn put_mask(&mut self, index: usize, mask: &GrayImage) -> Result<(), StorageError> {
            self.0.put_mask(index, mask)
        }
        fn get_mask(&self, index: usize) -> Result<GrayImage, StorageError> {
            self.0.get_mask(index)
        }
        fn has_mask(&self, index: usize) -> bool {
            self.0.has_mask(index)
        }
        fn cleanup(&mut self) -> Result<(), StorageError> {
            Err(StorageError::new("removing scratch", "permission denied"))
        }
    }

    #[test]
    fn cleanup_failure_is_not_fatal() {
        let source = RgbImage::new(16, 16);
        let mut store = StickyStore::default();
        let mut model = white_is_honey;
        let outcome = SegmentationPipeline::new(small_config())
            .run(&source, app(1.0), &mut model, &mut store, &clock())
            .unwrap();
        assert!(matches!(
            outcome.diagnostics.cleanup.metrics,
            StageMetrics::Cleanup { removed: false }
        ));
    }

    #[test]
    fn progress_within_maps_into_stage_range() {
        let p = Progress::within(Stage::Inferring, 0.5);
        assert!((p.fraction - 0.45).abs() < 1e-12);
        let p = Progress::within(Stage::Merging, 2.0);
        assert!((p.fraction - 0.9).abs() < 1e-12);
    }

    #[test]
    fn stage_display_names() {
        assert_eq!(Stage::Inferring.to_string(), "inference");
        assert_eq!(Stage::Splitting.to_string(), "splitting");
    }
}
