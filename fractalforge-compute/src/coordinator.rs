//! Binds one compiled fractal to one renderer.
//!
//! Structural parameters (tile, Julia mode) rebuild the renderer; continuous
//! ones (view, time, point) are forwarded to the existing one. Programs are
//! never recompiled here.

use crate::compiler::CompiledFractal;
use crate::renderer::{
    ProgressListener, RenderError, RenderParameters, RenderState, Renderer,
};
use fractalforge_core::{ComplexNumber, Diagnostic, EvaluationError, RenderHints, Tile, View};

/// Best available buffer of a render, with its error list.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderOutput {
    pub pixels: Vec<u32>,
    pub errors: Vec<Diagnostic>,
    pub progress: f32,
    pub state: RenderState,
}

pub struct Coordinator {
    compiled: CompiledFractal,
    hints: RenderHints,
    tile: Tile,
    params: RenderParameters,
    listener: Option<ProgressListener>,
    renderer: Renderer,
    rebuilds: usize,
}

impl Coordinator {
    pub fn new(compiled: CompiledFractal, hints: RenderHints, tile: Tile) -> Self {
        let params = RenderParameters::default();
        let renderer = build(&compiled, hints, tile, params, None);
        Self {
            compiled,
            hints,
            tile,
            params,
            listener: None,
            renderer,
            rebuilds: 0,
        }
    }

    pub fn compiled(&self) -> &CompiledFractal {
        &self.compiled
    }

    /// Number of times the renderer was rebuilt for a structural change.
    pub fn rebuilds(&self) -> usize {
        self.rebuilds
    }

    pub fn parameters(&self) -> RenderParameters {
        self.params
    }

    pub fn set_point(&mut self, point: ComplexNumber) {
        self.params.point = point;
        self.renderer.set_point(point);
    }

    /// Does not start a render; see [`Coordinator::needs_redraw_for_time`].
    pub fn set_time(&mut self, time: f64) {
        self.params.time = time;
        self.renderer.set_time(time);
    }

    pub fn set_view(&mut self, view: View) {
        self.params.view = view;
        self.renderer.set_view(view);
    }

    pub fn set_julia(&mut self, julia: bool) {
        if self.params.julia != julia {
            self.params.julia = julia;
            self.rebuild();
        }
    }

    pub fn set_tile(&mut self, tile: Tile) {
        if self.tile != tile {
            self.tile = tile;
            self.rebuild();
        }
    }

    pub fn set_progress_listener(&mut self, listener: Option<ProgressListener>) {
        self.listener = listener.clone();
        self.renderer.set_progress_listener(listener);
    }

    /// Whether a change of time alone changes the image.
    pub fn needs_redraw_for_time(&self) -> bool {
        self.compiled.use_time()
    }

    pub fn run(&mut self) -> Result<(), RenderError> {
        self.renderer.run()
    }

    pub fn wait_for(&self) {
        self.renderer.wait_for();
    }

    pub fn abort(&self) {
        self.renderer.abort();
    }

    pub fn pixels(&self) -> Vec<u32> {
        self.renderer.pixels()
    }

    pub fn progress(&self) -> f32 {
        self.renderer.progress()
    }

    pub fn errors(&self) -> Vec<Diagnostic> {
        self.renderer.errors()
    }

    pub fn state(&self) -> RenderState {
        self.renderer.state()
    }

    pub fn output(&self) -> RenderOutput {
        RenderOutput {
            pixels: self.pixels(),
            errors: self.errors(),
            progress: self.progress(),
            state: self.state(),
        }
    }

    pub fn orbit_trace(&self, bx: u32, by: u32) -> Result<Vec<Vec<ComplexNumber>>, EvaluationError> {
        self.renderer.orbit_trace(bx, by)
    }

    fn rebuild(&mut self) {
        self.renderer.abort();
        self.renderer.wait_for();
        self.renderer = build(
            &self.compiled,
            self.hints,
            self.tile,
            self.params,
            self.listener.clone(),
        );
        self.rebuilds += 1;
        log::debug!("renderer rebuilt ({} so far)", self.rebuilds);
    }
}

fn build(
    compiled: &CompiledFractal,
    hints: RenderHints,
    tile: Tile,
    params: RenderParameters,
    listener: Option<ProgressListener>,
) -> Renderer {
    let mut renderer = Renderer::new(compiled.orbit.clone(), compiled.color.clone(), hints);
    renderer.set_tile(tile);
    renderer.set_view(params.view);
    renderer.set_time(params.time);
    renderer.set_julia(params.julia);
    renderer.set_point(params.point);
    renderer.set_progress_listener(listener);
    renderer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{ProgramCompiler, Strategy};
    use fractalforge_core::AstFractal;

    fn coordinator() -> Coordinator {
        let compiled = ProgramCompiler::default()
            .compile(&AstFractal::mandelbrot(100), Strategy::Interpreter)
            .unwrap();
        Coordinator::new(compiled, RenderHints::default(), Tile::whole(16, 16))
    }

    #[test]
    fn structural_changes_rebuild_the_renderer() {
        let mut coordinator = coordinator();
        coordinator.set_julia(false);
        coordinator.set_tile(Tile::whole(16, 16));
        assert_eq!(coordinator.rebuilds(), 0, "unchanged values are no-ops");

        coordinator.set_julia(true);
        coordinator.set_tile(Tile::whole(8, 8));
        assert_eq!(coordinator.rebuilds(), 2);
        assert!(coordinator.parameters().julia);
    }

    #[test]
    fn continuous_changes_are_forwarded() {
        let mut coordinator = coordinator();
        coordinator.set_view(View::new(ComplexNumber::new(0.5, 0.0), 2.0, 0.0));
        coordinator.set_point(ComplexNumber::new(-0.4, 0.6));
        coordinator.set_time(3.0);
        assert_eq!(coordinator.rebuilds(), 0);
        assert_eq!(coordinator.renderer.parameters(), coordinator.parameters());
        assert!(!coordinator.needs_redraw_for_time());
    }

    #[test]
    fn output_after_run_is_complete() {
        let mut coordinator = coordinator();
        coordinator.set_julia(true);
        coordinator.set_point(ComplexNumber::new(-0.4, 0.6));
        coordinator.run().unwrap();
        coordinator.wait_for();

        let output = coordinator.output();
        assert_eq!(output.state, RenderState::Completed);
        assert_eq!(output.progress, 1.0);
        assert_eq!(output.pixels.len(), 256);
        assert!(output.errors.is_empty());
    }
}
