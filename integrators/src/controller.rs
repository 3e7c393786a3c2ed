//! Adaptive Controller

use crate::candidate::*;
use crate::cost::*;
use crate::estimator::*;
use crate::knobs::*;
use crate::optimizer::*;
use crate::stats::*;
use arc_swap::ArcSwap;
use common::image::{RgbImage, ScalarImage};
use common::image_io::{write_layered_exr, write_rgb_exr};
use common::math::*;
use filters::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Maps a noisy rendering to a smooth estimate of the converged image.
pub trait Denoiser {
    /// Returns the denoised image.
    ///
    /// * `color`   - Noisy color image.
    /// * `albedo`  - Optional albedo feature buffer.
    /// * `normals` - Optional normal feature buffer.
    fn denoise(&self, color: &RgbImage, albedo: Option<&RgbImage>, normals: Option<&RgbImage>) -> RgbImage;
}

/// Sampling configuration used before the first optimisation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PilotConfiguration {
    /// Light path count as a fraction of the pixel count.
    pub light_path_fraction: Float,

    /// Connections per camera vertex.
    pub num_connections: u32,

    /// Merging on or off.
    pub merge: bool,
}

impl Default for PilotConfiguration {
    fn default() -> Self {
        Self {
            light_path_fraction: 1.0,
            num_connections: 1,
            merge: true,
        }
    }
}

/// Settings of the adaptive controller.
#[derive(Clone, Debug, PartialEq)]
pub struct AdaptiveSettings {
    /// Light path count candidates as fractions of the pixel count.
    pub light_path_fractions: Vec<Float>,

    /// Connection count candidates.
    pub connection_counts: Vec<u32>,

    /// Optimise the merge decision per pixel.
    pub per_pixel_merge: bool,

    /// Optimise the connection count per pixel.
    pub per_pixel_connect: bool,

    /// Number of optimisations before the configuration is frozen. With 0,
    /// moments are estimated for the whole render but never used.
    pub max_updates: usize,

    /// Base of the geometric update schedule.
    pub update_frequency: usize,

    /// Use correlation-aware merge weights for the proxy strategy.
    pub correlation_aware: bool,

    /// Merges at the primary hit are enabled in the renderer.
    pub merge_primary: bool,

    /// Filter strategy for the moment buffers.
    pub estimate_filter: EstimateFilter,

    /// Post-filter for the merge mask.
    pub merge_filter: MaskFilter,

    /// Post-filter for the connection mask.
    pub connect_filter: MaskFilter,

    /// Start with a small global-only candidate set and expand it once a
    /// bidirectional technique pays off.
    pub on_demand: bool,

    /// Configuration used until the first optimisation.
    pub pilot: PilotConfiguration,

    /// Cost model hyper-parameters.
    pub cost: CostParameters,

    /// Number of worker threads, 0 for all cores.
    pub num_threads: usize,

    /// Render time budget.
    pub max_render_time: Option<Duration>,

    /// Basename for moment and mask images written by `finish_render`.
    pub debug_basename: Option<String>,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            light_path_fractions: vec![0.00001, 0.001, 0.01, 0.1, 0.25, 0.5, 0.75, 1.0, 2.0],
            connection_counts: vec![0, 1, 2, 4, 8, 16],
            per_pixel_merge: true,
            per_pixel_connect: true,
            max_updates: 1,
            update_frequency: 4,
            correlation_aware: true,
            merge_primary: false,
            estimate_filter: EstimateFilter::default(),
            merge_filter: MaskFilter::default(),
            connect_filter: MaskFilter::default(),
            on_demand: false,
            pilot: PilotConfiguration::default(),
            cost: CostParameters::default(),
            num_threads: 0,
            max_render_time: None,
            debug_basename: None,
        }
    }
}

/// Lifecycle of the controller within one render.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControllerState {
    /// `start_render` has not been called.
    Uninitialized,

    /// Samples are accumulated into the moment buffers.
    PilotAccumulating,

    /// The update budget is spent; estimation has stopped.
    Converged,
}

/// What the renderer has to do after an iteration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Keep accumulating into the frame buffer.
    Continue,

    /// Discard the frame buffer; the sampling configuration changed.
    ClearFrameBuffer,
}

/// One optimisation pass.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DecisionRecord {
    /// Iteration after which the pass ran.
    pub iteration: usize,

    /// Chosen per-image candidate.
    pub candidate: GlobalCandidate,

    /// Work of the chosen candidate.
    pub work: f64,

    /// Rejected outlier contributions.
    pub num_outliers: usize,

    /// Time spent in the pass.
    pub elapsed: Duration,
}

/// Candidate arrays and per-pixel flags of the current optimisation phase.
#[derive(Clone, Debug, PartialEq)]
struct Phase {
    light_path_fractions: Vec<Float>,
    connection_counts: Vec<u32>,
    per_pixel_merge: bool,
    per_pixel_connect: bool,
}

impl Phase {
    fn from_settings(settings: &AdaptiveSettings) -> Self {
        Self {
            light_path_fractions: settings.light_path_fractions.clone(),
            connection_counts: settings.connection_counts.clone(),
            per_pixel_merge: settings.per_pixel_merge,
            per_pixel_connect: settings.per_pixel_connect,
        }
    }

    /// Two cheap global candidates, evaluated before committing to VCM.
    fn on_demand_pilot() -> Self {
        Self {
            light_path_fractions: vec![0.5, 1.0],
            connection_counts: vec![0, 1],
            per_pixel_merge: false,
            per_pixel_connect: false,
        }
    }

    fn on_demand_expanded() -> Self {
        Self {
            light_path_fractions: vec![0.25, 0.5, 0.75, 1.0, 2.0],
            connection_counts: vec![0, 1, 2, 4, 8],
            per_pixel_merge: true,
            per_pixel_connect: false,
        }
    }
}

/// Drives moment estimation and periodic re-optimisation over the
/// iterations of a render, and publishes the resulting sampling knobs.
///
/// The renderer calls `pre_iteration`, then the sample callbacks from any
/// number of threads, then `post_iteration`. Knobs published by
/// `post_iteration` take effect with the next `pre_iteration`.
pub struct AdaptiveController {
    settings: AdaptiveSettings,
    phase: Phase,
    state: ControllerState,
    width: usize,
    height: usize,
    candidates: Option<CandidateSet>,
    estimator: Option<ProxyMomentEstimator>,
    cost: CostModel,
    stats: PathStatistics,

    /// Knobs for the next iteration.
    knobs: ArcSwap<SamplingKnobs>,

    /// Knobs of the running iteration.
    current: Arc<SamplingKnobs>,

    /// Running mean weight of the running iteration.
    sample_scale: Float,

    /// Denoised frame the reference intensity was computed from.
    denoised: Option<RgbImage>,

    reference: Option<ScalarImage>,
    round_start: usize,
    updates_done: usize,
    in_pilot_phase: bool,
    history: Vec<DecisionRecord>,
    optimizer_time: Duration,
}

impl AdaptiveController {
    /// Create a new `AdaptiveController`.
    ///
    /// * `settings` - Controller settings.
    pub fn new(settings: AdaptiveSettings) -> Self {
        assert!(
            !settings.connection_counts.is_empty(),
            "AdaptiveController::new(): no connection counts"
        );
        assert!(
            settings.update_frequency > 0,
            "AdaptiveController::new(): update frequency must be positive"
        );
        let phase = Phase::from_settings(&settings);
        let cost = CostModel::new(settings.cost);
        Self {
            settings,
            phase,
            state: ControllerState::Uninitialized,
            width: 0,
            height: 0,
            candidates: None,
            estimator: None,
            cost,
            stats: PathStatistics::default(),
            knobs: ArcSwap::from_pointee(SamplingKnobs::default()),
            current: Arc::new(SamplingKnobs::default()),
            sample_scale: 1.0,
            denoised: None,
            reference: None,
            round_start: 0,
            updates_done: 0,
            in_pilot_phase: false,
            history: Vec::new(),
            optimizer_time: Duration::ZERO,
        }
    }

    /// Resets all per-render state and allocates the moment buffers.
    ///
    /// * `width`  - Frame buffer width.
    /// * `height` - Frame buffer height.
    pub fn start_render(&mut self, width: usize, height: usize) {
        assert!(width > 0 && height > 0, "start_render(): empty frame buffer");
        self.width = width;
        self.height = height;
        self.cost = CostModel::new(self.settings.cost);
        self.stats.reset();
        self.denoised = None;
        self.reference = None;
        self.history.clear();
        self.optimizer_time = Duration::ZERO;

        let knobs = if self.settings.on_demand {
            self.phase = Phase::on_demand_pilot();
            self.in_pilot_phase = true;
            SamplingKnobs::new(0, 0, false)
        } else {
            self.phase = Phase::from_settings(&self.settings);
            self.in_pilot_phase = false;
            let pilot = &self.settings.pilot;
            let n = (self.num_pixels() as f64 * pilot.light_path_fraction as f64) as u32;
            SamplingKnobs::new(n, pilot.num_connections, pilot.merge)
        };
        self.knobs.store(Arc::new(knobs));
        self.current = self.knobs.load_full();

        self.init_candidates();
        self.round_start = 0;
        self.updates_done = 0;
    }

    /// Builds the candidate set of the current phase and fresh moment buffers.
    fn init_candidates(&mut self) {
        let candidates = CandidateSet::new(
            self.num_pixels(),
            &self.phase.light_path_fractions,
            &self.phase.connection_counts,
        );
        info!(
            "Estimating moments of {} candidates at {}x{}",
            candidates.len(),
            self.width,
            self.height
        );

        let estimator = ProxyMomentEstimator::new(
            &candidates,
            self.settings.estimate_filter,
            self.width,
            self.height,
            self.settings.merge_primary,
            self.settings.correlation_aware,
        );
        self.candidates = Some(candidates);
        self.estimator = Some(estimator);
        self.state = ControllerState::PilotAccumulating;
    }

    fn num_pixels(&self) -> usize {
        self.width * self.height
    }

    /// Returns `true` while sample callbacks update the moment buffers.
    pub fn is_estimating(&self) -> bool {
        self.state == ControllerState::PilotAccumulating
    }

    /// Prepares an iteration: resets the path statistics, takes the knobs
    /// snapshot for the iteration and rescales the moment buffers so they
    /// keep holding the mean over the iterations of the round.
    ///
    /// * `iteration` - Zero based iteration index.
    pub fn pre_iteration(&mut self, iteration: usize) {
        assert!(
            self.state != ControllerState::Uninitialized,
            "pre_iteration(): start_render() was not called"
        );
        self.stats.reset();
        self.current = self.knobs.load_full();

        if !self.is_estimating() {
            return;
        }
        let local = iteration.saturating_sub(self.round_start);
        self.sample_scale = 1.0 / (local + 1) as Float;
        if local > 0 {
            if let Some(estimator) = self.estimator.as_mut() {
                estimator.scale(local as Float / (local + 1) as Float);
            }
        }
    }

    /// Returns `true` if an optimisation is due after the given iteration of
    /// the current round.
    fn update_due(&self, local: usize) -> bool {
        if self.updates_done >= self.settings.max_updates {
            return false;
        }
        u32::try_from(self.updates_done)
            .ok()
            .and_then(|k| self.settings.update_frequency.checked_pow(k))
            .map_or(false, |due| local + 1 == due)
    }

    /// Finishes an iteration: refreshes the statistics and, if the schedule
    /// says so, runs both optimisers and publishes new knobs.
    ///
    /// * `iteration` - Zero based iteration index.
    /// * `frame`     - Current frame buffer.
    /// * `denoiser`  - Denoiser for the reference image.
    /// * `albedo`    - Optional albedo feature buffer.
    /// * `normals`   - Optional normal feature buffer.
    pub fn post_iteration(
        &mut self,
        iteration: usize,
        frame: &RgbImage,
        denoiser: &dyn Denoiser,
        albedo: Option<&RgbImage>,
        normals: Option<&RgbImage>,
    ) -> IterationOutcome {
        if !self.is_estimating() {
            return IterationOutcome::Continue;
        }

        let num_pixels = self.num_pixels();
        let averages = self.stats.averages(num_pixels);
        self.cost.update_stats(
            num_pixels,
            self.current.num_light_paths,
            averages.camera_path_length,
            averages.light_path_length,
            averages.photons_per_query,
        );
        if let Some(estimator) = self.estimator.as_mut() {
            estimator.update_path_lengths(averages.camera_path_length, averages.light_path_length);
        }

        let local = iteration.saturating_sub(self.round_start);
        if !self.update_due(local) {
            return IterationOutcome::Continue;
        }

        let timer = Instant::now();

        if self.reference.is_none() {
            assert!(
                frame.width() == self.width && frame.height() == self.height,
                "post_iteration(): frame buffer size changed"
            );
            let denoised = denoiser.denoise(frame, albedo, normals);
            self.reference = Some(ScalarImage::from_rgb(&denoised));
            self.denoised = Some(denoised);
        }

        let Some(decision) = self.optimize() else {
            return IterationOutcome::Continue;
        };
        let elapsed = timer.elapsed();
        self.optimizer_time += elapsed;
        self.updates_done += 1;

        info!(
            "Iteration {}: chose {} (work {:.4e}, {} outliers) in {:.1} ms",
            iteration,
            decision.candidate(),
            decision.work,
            decision.num_outliers,
            elapsed.as_secs_f64() * 1000.0
        );
        self.history.push(DecisionRecord {
            iteration,
            candidate: decision.candidate(),
            work: decision.work,
            num_outliers: decision.num_outliers,
            elapsed,
        });

        if self.in_pilot_phase && decision.num_light_paths != 0 {
            info!("Bidirectional sampling pays off, expanding the candidate set");
            self.in_pilot_phase = false;
            self.phase = Phase::on_demand_expanded();
            self.init_candidates();
            self.round_start = iteration + 1;
            self.updates_done = 0;
            return IterationOutcome::ClearFrameBuffer;
        }

        if self.updates_done >= self.settings.max_updates {
            info!("Sampling configuration converged after {} updates", self.updates_done);
            self.state = ControllerState::Converged;
        } else {
            self.state = ControllerState::PilotAccumulating;
        }
        IterationOutcome::Continue
    }

    /// Runs the per-pixel and per-image optimisers on the current moments
    /// and publishes the resulting knobs.
    fn optimize(&mut self) -> Option<PerImageDecision> {
        let (Some(estimator), Some(candidates), Some(reference)) =
            (self.estimator.as_mut(), self.candidates.as_ref(), self.reference.as_ref())
        else {
            return None;
        };
        estimator.prepare();

        let masks = optimize_per_pixel(
            estimator.buffers(),
            self.width,
            self.height,
            &self.cost,
            &PerPixelSettings {
                per_pixel_merge: self.phase.per_pixel_merge,
                per_pixel_connect: self.phase.per_pixel_connect,
                merge_filter: self.settings.merge_filter,
                connect_filter: self.settings.connect_filter,
                num_threads: self.settings.num_threads,
            },
        );

        let mut knobs = SamplingKnobs::clone(&self.current);
        if let Some(mask) = masks.merge {
            knobs.merge_mask = Some(mask);
            knobs.merge_enabled = true;
        }
        if let Some(mask) = masks.connect {
            knobs.connect_mask = Some(mask);
        }

        let decision = optimize_per_image(
            estimator.buffers(),
            reference,
            candidates.connection_counts(),
            &self.cost,
            &knobs,
            &PerImageSettings {
                per_pixel_connect: self.phase.per_pixel_connect,
                per_pixel_merge: self.phase.per_pixel_merge,
                num_threads: self.settings.num_threads,
            },
        );

        knobs.num_light_paths = decision.num_light_paths;
        if let Some(c) = decision.num_connections {
            knobs.num_connections = c;
        }
        if let Some(m) = decision.merge {
            knobs.merge_enabled = m;
        }
        self.knobs.store(Arc::new(knobs));

        Some(decision)
    }

    /// Returns `false` once the render time plus the time spent optimising
    /// exceeds the budget.
    ///
    /// * `render_time` - Time spent rendering so far.
    pub fn should_continue(&self, render_time: Duration) -> bool {
        self.settings
            .max_render_time
            .map_or(true, |budget| render_time.saturating_add(self.optimizer_time) < budget)
    }

    /// Writes the debug images if a basename is configured: the candidate
    /// moments, the decision masks and the denoised reference.
    pub fn finish_render(&mut self) -> Result<(), String> {
        let Some(basename) = self.settings.debug_basename.clone() else {
            return Ok(());
        };

        if let Some(denoised) = self.denoised.as_ref() {
            let path = format!("{basename}Reference.exr");
            write_rgb_exr(&path, denoised)?;
            info!("Wrote denoised reference to {path}");
        }

        if let Some(estimator) = self.estimator.as_mut() {
            estimator.prepare();
            let layers = estimator.to_layers();
            let refs: Vec<(String, &ScalarImage)> = layers.iter().map(|(n, img)| (n.clone(), img)).collect();
            let path = format!("{basename}Moments.exr");
            write_layered_exr(&path, &refs)?;
            info!("Wrote {} moment layers to {path}", refs.len());
        }

        let knobs = self.knobs.load_full();
        let mut masks: Vec<(String, &ScalarImage)> = Vec::new();
        if let Some(mask) = knobs.merge_mask.as_ref() {
            masks.push(("merge".to_string(), mask));
        }
        if let Some(mask) = knobs.connect_mask.as_ref() {
            masks.push(("connect".to_string(), mask));
        }
        if !masks.is_empty() {
            let path = format!("{basename}Masks.exr");
            write_layered_exr(&path, &masks)?;
            info!("Wrote {} masks to {path}", masks.len());
        }
        Ok(())
    }

    /// Returns the knobs for the next iteration.
    pub fn knobs(&self) -> Arc<SamplingKnobs> {
        self.knobs.load_full()
    }

    /// Returns the path statistics the renderer records into.
    pub fn stats(&self) -> &PathStatistics {
        &self.stats
    }

    /// Returns all optimisation passes of this render.
    pub fn history(&self) -> &[DecisionRecord] {
        &self.history
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Returns the total time spent optimising.
    pub fn optimizer_time(&self) -> Duration {
        self.optimizer_time
    }

    /// Returns the candidate set of the current phase.
    pub fn candidates(&self) -> Option<&CandidateSet> {
        self.candidates.as_ref()
    }

    /// Forwards a sample to the estimator with the pilot counts at its pixel.
    fn add_sample(&self, sample: &PathSample, kernel_weight: Float) {
        if !self.is_estimating() {
            return;
        }
        let Some(estimator) = self.estimator.as_ref() else {
            return;
        };
        let x = min(sample.pixel.0.max(0.0) as usize, self.width - 1);
        let y = min(sample.pixel.1.max(0.0) as usize, self.height - 1);
        let pilot = PilotCounts {
            num_light_paths: self.current.num_light_paths as Float,
            num_connections: self.current.connection_count(x, y),
            merge_probability: self.current.merge_probability(x, y),
        };
        estimator.add_sample(sample, kernel_weight, &pilot, self.sample_scale);
    }

    /// Light tracer sample (connection of a light vertex to the camera).
    pub fn on_light_tracer_sample(&self, sample: &PathSample) {
        self.add_sample(sample, 1.0);
    }

    /// Next event estimation sample.
    pub fn on_next_event_sample(&self, sample: &PathSample) {
        self.add_sample(sample, 1.0);
    }

    /// Camera path hitting an emitter. Directly visible emitters have no
    /// competing technique and are ignored.
    pub fn on_emitter_hit_sample(&self, sample: &PathSample) {
        if sample.pdfs.num_pdfs() == 1 {
            return;
        }
        self.add_sample(sample, 1.0);
    }

    /// Bidirectional connection sample.
    pub fn on_connect_sample(&self, sample: &PathSample) {
        self.add_sample(sample, 1.0);
    }

    /// Merge sample. Counts the photon for the cost statistics.
    ///
    /// * `sample`        - The sample.
    /// * `kernel_weight` - Photon kernel value of the merge.
    pub fn on_merge_sample(&self, sample: &PathSample, kernel_weight: Float) {
        self.stats.record_merged_photon();
        self.add_sample(sample, kernel_weight);
    }
}

impl std::fmt::Debug for AdaptiveController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveController")
            .field("state", &self.state)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("updates_done", &self.updates_done)
            .field("round_start", &self.round_start)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
