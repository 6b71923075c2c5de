use fractalforge_compute::{
    AstFractal, AstRegion, AstRule, AstStateVariable, Color, ColorExpression, ComplexNumber,
    Condition, Coordinator, DiagnosticKind, Expression, Function, PixelMapper, ProgramCompiler,
    Region, RenderHints, RenderState, Renderer, Statement, Strategy, Tile, View,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn mandelbrot_renderer(max_iterations: u32, hints: RenderHints, size: u32) -> Renderer {
    let compiled = ProgramCompiler::default()
        .compile(&AstFractal::mandelbrot(max_iterations), Strategy::Interpreter)
        .expect("mandelbrot compiles");
    let mut renderer = Renderer::new(compiled.orbit, compiled.color, hints);
    renderer.set_tile(Tile::whole(size, size));
    renderer
}

/// Mandelbrot whose color rule indexes a palette with `1 / im(w)`, which is
/// not finite on the real axis.
fn axis_failing_fractal() -> AstFractal {
    let mut fractal = AstFractal::mandelbrot(20);
    fractal.orbit.states.push(AstStateVariable::new("k", true));
    fractal.orbit.begin.push(Statement::assign(
        "k",
        Expression::div(
            Expression::number(1.0),
            Expression::call(Function::Im, vec![Expression::var("w")]),
        ),
    ));
    fractal.color.rules = vec![AstRule::new(
        Condition::literal(true),
        Expression::number(1.0),
        ColorExpression::palette("gradient", Expression::var("k")),
    )];
    fractal
}

#[test]
fn test_end_to_end_mandelbrot_16x16() {
    init_logging();
    let compiled = ProgramCompiler::default()
        .compile(&AstFractal::mandelbrot(100), Strategy::Interpreter)
        .unwrap();
    let tile = Tile::whole(16, 16);
    let mut coordinator = Coordinator::new(compiled.clone(), RenderHints::default(), tile);
    coordinator.run().unwrap();
    coordinator.wait_for();

    let output = coordinator.output();
    assert_eq!(output.state, RenderState::Completed);
    assert_eq!(output.progress, 1.0);
    assert!(output.errors.is_empty(), "errors: {:?}", output.errors);
    assert_eq!(output.pixels.len(), 256);
    assert_eq!(output.pixels[8 * 16 + 8], Color::BLACK.to_argb());

    // The center pixel is the origin, which never escapes.
    let mut orbit = compiled.orbit.create();
    let mapper = PixelMapper::new(&orbit.region(), &View::default(), &tile);
    assert_eq!(mapper.map(8, 8), ComplexNumber::ZERO);
    let mut states = vec![ComplexNumber::ZERO; orbit.state_len()];
    let outcome = orbit.render_pixel(mapper.map(8, 8), &mut states, None).unwrap();
    assert_eq!(outcome.iterations, 100);
    assert!(!outcome.escaped);
    assert_eq!(coordinator.orbit_trace(8, 8).unwrap().len(), 100);
}

#[test]
fn test_repeated_renders_are_identical() {
    let mut renderer = mandelbrot_renderer(200, RenderHints::default(), 64);
    renderer.set_view(View::new(ComplexNumber::new(-0.5, 0.25), 1.5, 0.3));
    renderer.run().unwrap();
    renderer.wait_for();
    let first = renderer.pixels();

    renderer.run().unwrap();
    renderer.wait_for();
    assert_eq!(renderer.state(), RenderState::Completed);
    assert_eq!(first, renderer.pixels());

    let mut single = mandelbrot_renderer(200, RenderHints::default().single_threaded(), 64);
    single.set_view(View::new(ComplexNumber::new(-0.5, 0.25), 1.5, 0.3));
    single.run().unwrap();
    single.wait_for();
    assert_eq!(first, single.pixels(), "thread count does not change the image");
}

#[test]
fn test_progress_is_monotonic_and_ends_at_one() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut renderer = mandelbrot_renderer(100, RenderHints::default(), 64);
    renderer.set_progress_listener(Some(Arc::new(move |p| sink.lock().push(p))));
    renderer.run().unwrap();
    renderer.wait_for();

    let seen = seen.lock();
    assert!(seen.len() > 1);
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went down: {:?}", seen);
    assert_eq!(seen.last(), Some(&1.0));
    assert!(seen[..seen.len() - 1].iter().all(|p| *p < 1.0));
}

#[test]
fn test_abort_returns_quickly_with_partial_progress() {
    init_logging();
    let mut renderer = mandelbrot_renderer(20_000, RenderHints::default(), 512);
    renderer.run().unwrap();
    renderer.abort();

    let started = Instant::now();
    renderer.wait_for();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(renderer.state(), RenderState::Aborted);
    assert!(renderer.is_interrupted());
    assert!(renderer.progress() < 1.0);
    assert_eq!(renderer.pixels().len(), 512 * 512);
}

#[test]
fn test_failing_band_keeps_other_bands() {
    init_logging();
    let compiled = ProgramCompiler::default()
        .compile(&axis_failing_fractal(), Strategy::Interpreter)
        .unwrap();
    // 32 rows: band 0 covers rows 0..16, band 1 starts at the real axis.
    let mut renderer = Renderer::new(compiled.orbit, compiled.color, RenderHints::default());
    renderer.set_tile(Tile::whole(32, 32));
    renderer.run().unwrap();
    renderer.wait_for();

    assert_eq!(renderer.state(), RenderState::Completed);
    assert_eq!(renderer.progress(), 1.0);
    let errors = renderer.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, DiagnosticKind::Evaluation);
    assert!(errors[0].message.contains("band 1"), "{}", errors[0].message);

    let pixels = renderer.pixels();
    assert_ne!(pixels[0], 0, "band 0 is rendered");
}

#[test]
fn test_all_bands_failing_is_fatal() {
    let compiled = ProgramCompiler::default()
        .compile(&axis_failing_fractal(), Strategy::Interpreter)
        .unwrap();
    let mut renderer = Renderer::new(compiled.orbit, compiled.color, RenderHints::default());
    renderer.set_tile(Tile::whole(16, 16));
    renderer.run().unwrap();
    renderer.wait_for();

    assert_eq!(renderer.state(), RenderState::Failed);
    assert!(renderer.progress() < 1.0);
    assert_eq!(renderer.errors().len(), 1);
}

#[test]
fn test_julia_mode_uses_point_as_constant() {
    let compiled = ProgramCompiler::default()
        .compile(&AstFractal::mandelbrot(50), Strategy::Interpreter)
        .unwrap();
    let mut orbit = compiled.orbit.create();
    let mut states = vec![ComplexNumber::ZERO; orbit.state_len()];

    // c = 0: the unit disc is the filled Julia set.
    orbit.set_julia(true);
    orbit.set_point(ComplexNumber::ZERO);
    let inside = orbit
        .render_pixel(ComplexNumber::new(0.5, 0.5), &mut states, None)
        .unwrap();
    assert!(!inside.escaped);
    let outside = orbit
        .render_pixel(ComplexNumber::new(1.5, 0.0), &mut states, None)
        .unwrap();
    assert!(outside.escaped);
}

#[test]
fn test_region_and_tile_offset_map_pixels() {
    let compiled = ProgramCompiler::default()
        .compile(&AstFractal::mandelbrot(50), Strategy::Interpreter)
        .unwrap();
    let orbit = compiled.orbit.create();
    assert_eq!(orbit.region(), Region::from(&AstRegion::default()));

    let tile = Tile::new(
        fractalforge_compute::Dimensions::new(32, 32),
        fractalforge_compute::Dimensions::new(16, 16),
        (16, 16),
        2,
    );
    let mapper = PixelMapper::new(&orbit.region(), &View::default(), &tile);
    // Buffer pixel (2, 2) is virtual pixel (16, 16), the image center.
    assert_eq!(mapper.map(2, 2), ComplexNumber::ZERO);

    let mut renderer = Renderer::new(compiled.orbit, compiled.color, RenderHints::default());
    renderer.set_tile(tile);
    renderer.run().unwrap();
    renderer.wait_for();
    let tiled = renderer.pixels();
    assert_eq!(tiled.len(), 20 * 20);

    // The exposed part of the tile is the lower right quarter of the image.
    let whole = {
        let mut renderer = mandelbrot_renderer(50, RenderHints::default(), 32);
        renderer.run().unwrap();
        renderer.wait_for();
        renderer.pixels()
    };
    let exposed = tile.exposed_rect();
    for by in exposed.y..exposed.bottom() {
        for bx in exposed.x..exposed.right() {
            let (vx, vy) = tile.virtual_pixel(bx, by);
            let image = vy as usize * 32 + vx as usize;
            assert_eq!(tiled[(by * 20 + bx) as usize], whole[image], "pixel ({}, {})", bx, by);
        }
    }
}
