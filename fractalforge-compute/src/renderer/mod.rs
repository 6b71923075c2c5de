//! Progressive, multithreaded tile renderer.
//!
//! A render request runs on its own thread. Each pass evaluates the pixels
//! on a grid of decreasing stride and fills the rest of each grid cell with
//! the computed color, so every pass leaves a complete preview. The working
//! buffer is split into row bands with `chunks_mut`; a pool of scoped worker
//! threads pulls bands from a shared iterator, so writes never overlap.
//!
//! A band that fails (evaluation error or panic) is dropped from later
//! passes; the other bands carry on.

mod band;
mod progress;
mod strategy;

pub use band::Sample;
pub use progress::{ProgressListener, UNFINISHED_CEILING};
pub use strategy::{Mirror, RendererStrategy};

use crate::cancellation::{AbortSignal, CancellationChecker};
use crate::runtime::{ColorFactory, OrbitFactory};
use band::{Band, Frame, Programs};
use fractalforge_core::{
    ComplexNumber, Diagnostic, ErrorList, EvaluationError, PixelMapper, PixelRect, RenderHints,
    Tile, View, RENDERER_CONFIG,
};
use parking_lot::Mutex;
use progress::{PassWeights, Progress};
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RenderState {
    #[default]
    Idle,
    Initializing,
    /// Pass index, coarsest first.
    Running(usize),
    Completed,
    Aborted,
    Failed,
}

impl RenderState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RenderState::Completed | RenderState::Aborted | RenderState::Failed
        )
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("band {band} (rows {rows:?}) failed: {source}")]
    Evaluation {
        band: usize,
        rows: Range<u32>,
        #[source]
        source: EvaluationError,
    },

    #[error("band {band} (rows {rows:?}) panicked: {message}")]
    Panic {
        band: usize,
        rows: Range<u32>,
        message: String,
    },

    #[error("render thread panicked")]
    Thread,

    #[error("failed to start render thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl RenderError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            RenderError::Evaluation { source, .. } => {
                let mut diagnostic = source.to_diagnostic();
                diagnostic.message = self.to_string();
                diagnostic
            }
            _ => Diagnostic::render(self.to_string()),
        }
    }
}

impl From<&RenderError> for Diagnostic {
    fn from(error: &RenderError) -> Self {
        error.to_diagnostic()
    }
}

/// Continuous parameters of a render. They take effect on the next `run`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderParameters {
    pub view: View,
    pub time: f64,
    pub julia: bool,
    /// Julia constant in Julia mode, initial orbit point otherwise.
    pub point: ComplexNumber,
}

impl Default for RenderParameters {
    fn default() -> Self {
        Self {
            view: View::default(),
            time: 0.0,
            julia: false,
            point: ComplexNumber::ZERO,
        }
    }
}

/// Everything a render thread needs, captured when `run` is called.
#[derive(Clone)]
struct Request {
    orbit: Arc<dyn OrbitFactory>,
    color: Arc<dyn ColorFactory>,
    hints: RenderHints,
    tile: Tile,
    params: RenderParameters,
}

/// Shared state of one render request.
struct Job {
    state: Mutex<RenderState>,
    pixels: Mutex<Vec<u32>>,
    errors: Mutex<ErrorList>,
    progress: Progress,
    abort: AbortSignal,
}

impl Job {
    fn new(buffer_len: usize, listener: Option<ProgressListener>) -> Self {
        Self {
            state: Mutex::new(RenderState::Idle),
            pixels: Mutex::new(vec![0; buffer_len]),
            errors: Mutex::new(ErrorList::new()),
            progress: Progress::new(listener),
            abort: AbortSignal::new(),
        }
    }

    fn set_state(&self, state: RenderState) {
        *self.state.lock() = state;
    }

    fn report(&self, error: RenderError) {
        log::warn!("{}", error);
        self.errors.lock().push(error.to_diagnostic());
    }

    fn publish(&self, samples: &[Sample]) {
        let mut pixels = self.pixels.lock();
        pixels.clear();
        pixels.extend(samples.iter().map(|s| s.color.to_argb()));
    }
}

pub struct Renderer {
    orbit: Arc<dyn OrbitFactory>,
    color: Arc<dyn ColorFactory>,
    hints: RenderHints,
    tile: Tile,
    params: RenderParameters,
    listener: Option<ProgressListener>,
    job: Arc<Job>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Renderer {
    pub fn new(orbit: Arc<dyn OrbitFactory>, color: Arc<dyn ColorFactory>, hints: RenderHints) -> Self {
        let tile = Tile::whole(0, 0);
        Self {
            orbit,
            color,
            hints,
            tile,
            params: RenderParameters::default(),
            listener: None,
            job: Arc::new(Job::new(tile.buffer_len(), None)),
            worker: Mutex::new(None),
        }
    }

    pub fn hints(&self) -> RenderHints {
        self.hints
    }

    pub fn tile(&self) -> Tile {
        self.tile
    }

    pub fn parameters(&self) -> RenderParameters {
        self.params
    }

    pub fn set_tile(&mut self, tile: Tile) {
        self.tile = tile;
    }

    pub fn set_view(&mut self, view: View) {
        self.params.view = view;
    }

    pub fn set_time(&mut self, time: f64) {
        self.params.time = time;
    }

    pub fn set_julia(&mut self, julia: bool) {
        self.params.julia = julia;
    }

    pub fn set_point(&mut self, point: ComplexNumber) {
        self.params.point = point;
    }

    /// Listener for renders started after this call.
    pub fn set_progress_listener(&mut self, listener: Option<ProgressListener>) {
        self.listener = listener;
    }

    /// Start a render of the current tile and parameters. A render still in
    /// flight is aborted and joined first.
    pub fn run(&mut self) -> Result<(), RenderError> {
        self.abort();
        self.wait_for();

        let job = Arc::new(Job::new(self.tile.buffer_len(), self.listener.clone()));
        let request = Request {
            orbit: Arc::clone(&self.orbit),
            color: Arc::clone(&self.color),
            hints: self.hints,
            tile: self.tile,
            params: self.params,
        };
        self.job = Arc::clone(&job);
        job.set_state(RenderState::Initializing);

        let thread_job = Arc::clone(&job);
        let handle = std::thread::Builder::new()
            .name("fractalforge-render".to_string())
            .spawn(move || execute(&request, &thread_job));
        match handle {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                Ok(())
            }
            Err(err) => {
                let error = RenderError::Spawn(err);
                job.errors.lock().push(error.to_diagnostic());
                job.set_state(RenderState::Failed);
                Err(error)
            }
        }
    }

    /// Block until the current render reaches a terminal state.
    pub fn wait_for(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                self.job.report(RenderError::Thread);
                self.job.set_state(RenderState::Failed);
            }
        }
    }

    /// Ask the current render to stop. Returns immediately.
    pub fn abort(&self) {
        self.job.abort.abort();
    }

    pub fn is_interrupted(&self) -> bool {
        self.job.abort.is_aborted()
    }

    /// ARGB32 buffer of the last published pass, border included.
    pub fn pixels(&self) -> Vec<u32> {
        self.job.pixels.lock().clone()
    }

    pub fn progress(&self) -> f32 {
        self.job.progress.get()
    }

    pub fn state(&self) -> RenderState {
        *self.job.state.lock()
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.job.errors.lock().as_slice().to_vec()
    }

    /// State vector after every iteration of the orbit at buffer pixel
    /// `(bx, by)`, with the current parameters.
    pub fn orbit_trace(&self, bx: u32, by: u32) -> Result<Vec<Vec<ComplexNumber>>, EvaluationError> {
        let mut programs = Programs::new(self.orbit.as_ref(), self.color.as_ref(), &self.params);
        let mapper = PixelMapper::new(&programs.orbit().region(), &self.params.view, &self.tile);
        programs.trace(mapper.map(bx, by))
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.abort();
        self.wait_for();
    }
}

// ============================================================================
// Render thread
// ============================================================================

fn execute(request: &Request, job: &Job) {
    let tile = request.tile;
    let width = tile.buffer_width();
    let height = tile.buffer_height();

    let sampler = Programs::new(request.orbit.as_ref(), request.color.as_ref(), &request.params);
    let mapper = PixelMapper::new(&sampler.orbit().region(), &request.params.view, &tile);
    let strategy = RendererStrategy::new(&request.hints, sampler.orbit(), sampler.color(), &mapper);
    let mirror = if strategy.is_vertical_symmetry_supported() {
        mapper.real_axis_row().and_then(|axis| Mirror::new(axis, height))
    } else {
        None
    };
    let loop_end = sampler.orbit().loop_end();
    drop(sampler);

    let strides = RENDERER_CONFIG.strides(request.hints.progress);
    let weights = PassWeights::new(&strides, width, height);
    let band_height = RENDERER_CONFIG.band_height;
    let rects = tile.buffer_rect().split_rows(band_height);
    let band_count = rects.len();
    let workers = RENDERER_CONFIG.worker_count(request.hints.multithread, num_cpus::get(), band_count);
    log::debug!(
        "render {}x{}: {} band(s), {} worker(s), strides {:?}, solid guess {}, mirror {:?}",
        width,
        height,
        band_count,
        workers,
        strides,
        strategy.is_solid_guess_supported(),
        mirror
    );

    let mut samples = vec![Sample::default(); tile.buffer_len()];
    let failed: Vec<AtomicBool> = (0..band_count).map(|_| AtomicBool::new(false)).collect();

    for (pass, &stride) in strides.iter().enumerate() {
        if job.abort.is_aborted() {
            break;
        }
        job.set_state(RenderState::Running(pass));
        let frame = Frame {
            mapper: &mapper,
            width,
            stride,
            coarser: pass.checked_sub(1).map(|p| strides[p]),
            solid_block: strategy
                .is_solid_guess_supported()
                .then_some(RENDERER_CONFIG.solid_block),
            mirror,
            loop_end,
        };

        log::debug!("pass {} (stride {}) started", pass, stride);
        run_pass(request, job, &frame, &mut samples, &rects, &failed, |done, total| {
            job.progress.advance(weights.at(pass, done, total));
        });

        if let Some(mirror) = mirror {
            mirror_rows(&mut samples, width, height, &mirror);
        }
        job.publish(&samples);
        log::debug!("pass {} (stride {}) finished", pass, stride);
    }

    let succeeded = failed
        .iter()
        .filter(|f| !f.load(Ordering::Relaxed))
        .count();
    let state = if job.abort.is_aborted() {
        RenderState::Aborted
    } else if band_count > 0 && succeeded == 0 {
        RenderState::Failed
    } else {
        job.progress.complete();
        RenderState::Completed
    };
    job.publish(&samples);
    job.set_state(state);
    log::info!(
        "render finished {:?} at {:.1}% with {} error(s)",
        state,
        job.progress.get() * 100.0,
        job.errors.lock().len()
    );
}

/// Evaluate one pass over every band that has not failed.
fn run_pass(
    request: &Request,
    job: &Job,
    frame: &Frame<'_>,
    samples: &mut [Sample],
    rects: &[PixelRect],
    failed: &[AtomicBool],
    on_band: impl Fn(usize, usize) + Sync,
) {
    let Some(band_len) = rects.first().map(|r| r.area() as usize).filter(|&len| len > 0) else {
        return;
    };
    let bands: Vec<Band<'_>> = samples
        .chunks_mut(band_len)
        .zip(rects)
        .enumerate()
        .filter(|(index, _)| !failed[*index].load(Ordering::Relaxed))
        .map(|(index, (samples, rect))| Band {
            index,
            top: rect.y,
            samples,
        })
        .collect();
    let total = bands.len();
    let workers =
        RENDERER_CONFIG.worker_count(request.hints.multithread, num_cpus::get(), total);
    let queue = Mutex::new(bands.into_iter());
    let completed = Mutex::new(0usize);

    let scope = crossbeam::scope(|spawner| {
        for _ in 0..workers {
            spawner.spawn(|_| {
                let cancel = job.abort.checker();
                let mut programs =
                    Programs::new(request.orbit.as_ref(), request.color.as_ref(), &request.params);
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let Some(mut band) = queue.lock().next() else {
                        break;
                    };
                    let rows = band.top..band.top + band.rows(frame.width);
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        band.render(frame, &mut programs, &cancel)
                    }));
                    let error = match outcome {
                        Ok(Ok(true)) => None,
                        Ok(Ok(false)) => break,
                        Ok(Err(source)) => Some(RenderError::Evaluation {
                            band: band.index,
                            rows,
                            source,
                        }),
                        Err(payload) => {
                            // The instances may be half way through an update.
                            programs = Programs::new(
                                request.orbit.as_ref(),
                                request.color.as_ref(),
                                &request.params,
                            );
                            Some(RenderError::Panic {
                                band: band.index,
                                rows,
                                message: panic_message(payload.as_ref()),
                            })
                        }
                    };
                    if let Some(error) = error {
                        failed[band.index].store(true, Ordering::Relaxed);
                        job.report(error);
                    }
                    let done = {
                        let mut completed = completed.lock();
                        *completed += 1;
                        *completed
                    };
                    on_band(done, total);
                }
            });
        }
    });
    if scope.is_err() {
        log::error!("render worker panicked outside a band");
    }
}

/// Copy every mirrored row from its source row.
fn mirror_rows(samples: &mut [Sample], width: u32, height: u32, mirror: &Mirror) {
    let width = width as usize;
    for y in 0..height {
        if let Some(source) = mirror.source(y) {
            let (from, to) = (source as usize * width, y as usize * width);
            samples.copy_within(from..from + width, to);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
