//! Work of one band in one pass.

use super::strategy::Mirror;
use super::RenderParameters;
use crate::cancellation::CancellationChecker;
use crate::runtime::{ColorFactory, ColorProgram, OrbitFactory, OrbitProgram};
use fractalforge_core::{Color, ComplexNumber, EvaluationError, PixelMapper};

/// Evaluated pixel of the working buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Sample {
    pub color: Color,
    pub iterations: u32,
    pub escaped: bool,
}

impl Sample {
    fn is_interior(&self, loop_end: u32) -> bool {
        !self.escaped && self.iterations == loop_end
    }
}

/// Program instances owned by one worker.
pub struct Programs {
    orbit: Box<dyn OrbitProgram>,
    color: Box<dyn ColorProgram>,
    states: Vec<ComplexNumber>,
}

impl Programs {
    pub fn new(orbit: &dyn OrbitFactory, color: &dyn ColorFactory, params: &RenderParameters) -> Self {
        let mut orbit = orbit.create();
        let mut color = color.create();
        orbit.set_julia(params.julia);
        orbit.set_point(params.point);
        orbit.set_time(params.time);
        color.set_julia(params.julia);
        color.set_time(params.time);
        let states = vec![ComplexNumber::ZERO; orbit.state_len()];
        Self {
            orbit,
            color,
            states,
        }
    }

    pub fn orbit(&self) -> &dyn OrbitProgram {
        self.orbit.as_ref()
    }

    pub fn color(&self) -> &dyn ColorProgram {
        self.color.as_ref()
    }

    pub fn evaluate(&mut self, pixel: ComplexNumber) -> Result<Sample, EvaluationError> {
        let outcome = self.orbit.render_pixel(pixel, &mut self.states, None)?;
        let color = self.color.render(&self.states)?;
        Ok(Sample {
            color,
            iterations: outcome.iterations,
            escaped: outcome.escaped,
        })
    }

    /// State vector after every iteration of the orbit at `pixel`.
    pub fn trace(&mut self, pixel: ComplexNumber) -> Result<Vec<Vec<ComplexNumber>>, EvaluationError> {
        let mut trace = Vec::new();
        self.orbit
            .render_pixel(pixel, &mut self.states, Some(&mut trace))?;
        Ok(trace)
    }
}

/// Read-only description of one pass.
pub struct Frame<'a> {
    pub mapper: &'a PixelMapper,
    pub width: u32,
    pub stride: u32,
    /// Stride of the previous pass; its grid points are already computed.
    pub coarser: Option<u32>,
    /// Side of a solid-guess block in grid points, when guessing is enabled.
    pub solid_block: Option<u32>,
    pub mirror: Option<Mirror>,
    pub loop_end: u32,
}

/// Rows `top..top + samples.len() / width` of the working buffer.
pub struct Band<'a> {
    pub index: usize,
    pub top: u32,
    pub samples: &'a mut [Sample],
}

impl Band<'_> {
    pub fn rows(&self, width: u32) -> u32 {
        if width == 0 {
            0
        } else {
            (self.samples.len() / width as usize) as u32
        }
    }

    fn at(&self, width: u32, x: u32, y: u32) -> Sample {
        self.samples[(y * width + x) as usize]
    }

    /// Fill the `size × size` block at band-local `(x, y)`, clipped to the band.
    fn fill(&mut self, width: u32, x: u32, y: u32, size: u32, sample: Sample) {
        let rows = self.rows(width);
        let x_end = (x + size).min(width) as usize;
        for fy in y..(y + size).min(rows) {
            let row = (fy * width) as usize;
            self.samples[row + x as usize..row + x_end].fill(sample);
        }
    }

    /// Evaluate the grid points of `frame` inside this band. Returns `false`
    /// when cancelled before finishing.
    pub fn render<C: CancellationChecker>(
        &mut self,
        frame: &Frame<'_>,
        programs: &mut Programs,
        cancel: &C,
    ) -> Result<bool, EvaluationError> {
        let width = frame.width;
        let stride = frame.stride;
        let rows = self.rows(width);

        for y in (0..rows).step_by(stride as usize) {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let by = self.top + y;
            if frame.skips_block_row(by, (by + stride).min(self.top + rows)) {
                continue;
            }
            for x in (0..width).step_by(stride as usize) {
                if frame.coarser.is_some_and(|p| x % p == 0 && by % p == 0) {
                    continue;
                }
                let sample = match frame.guess(self, x, y) {
                    Some(sample) => sample,
                    None => programs.evaluate(frame.mapper.map(x, by))?,
                };
                self.fill(width, x, y, stride, sample);
            }
        }
        Ok(true)
    }
}

impl Frame<'_> {
    /// A grid row is left to the mirror only when every row its blocks
    /// cover, `by..end`, is mirrored. Otherwise unmirrored rows beside the
    /// axis would keep the previous pass's preview.
    fn skips_block_row(&self, by: u32, end: u32) -> bool {
        self.mirror
            .is_some_and(|m| (by..end).all(|row| m.is_mirrored(row)))
    }

    /// Corner sample of the enclosing solid block, if all four corners are
    /// interior with the same color. Corners lie on the previous pass's grid
    /// and inside the band.
    fn guess(&self, band: &Band<'_>, x: u32, y: u32) -> Option<Sample> {
        self.coarser?;
        let block = self.solid_block? * self.stride;
        let (x0, y0) = (x / block * block, y / block * block);
        let (x1, y1) = (x0 + block, y0 + block);
        if x1 >= self.width || y1 >= band.rows(self.width) {
            return None;
        }

        let first = band.at(self.width, x0, y0);
        let solid = [(x1, y0), (x0, y1), (x1, y1)]
            .into_iter()
            .map(|(cx, cy)| band.at(self.width, cx, cy))
            .all(|corner| corner == first);
        (solid && first.is_interior(self.loop_end)).then_some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::NeverCancel;
    use crate::compiler::{ProgramCompiler, Strategy};
    use fractalforge_core::{AstFractal, AstRegion, Region, Tile, View};

    fn mapper() -> PixelMapper {
        let region = Region::from(&AstRegion::default());
        PixelMapper::new(&region, &View::default(), &Tile::whole(16, 16))
    }

    fn programs(max_iterations: u32) -> Programs {
        let compiled = ProgramCompiler::default()
            .compile(&AstFractal::mandelbrot(max_iterations), Strategy::Interpreter)
            .unwrap();
        Programs::new(
            compiled.orbit.as_ref(),
            compiled.color.as_ref(),
            &RenderParameters::default(),
        )
    }

    fn frame<'a>(mapper: &'a PixelMapper, stride: u32, coarser: Option<u32>) -> Frame<'a> {
        Frame {
            mapper,
            width: 16,
            stride,
            coarser,
            solid_block: None,
            mirror: None,
            loop_end: 50,
        }
    }

    #[test]
    fn coarse_pass_fills_blocks() {
        let mapper = mapper();
        let mut samples = vec![Sample::default(); 16 * 16];
        let mut band = Band {
            index: 0,
            top: 0,
            samples: &mut samples,
        };
        let mut programs = programs(50);

        let done = band
            .render(&frame(&mapper, 8, None), &mut programs, &NeverCancel)
            .unwrap();
        assert!(done);
        // (8, 8) is the origin and never escapes.
        assert_eq!(samples[8 * 16 + 8].iterations, 50);
        assert_eq!(samples[15 * 16 + 15], samples[8 * 16 + 8]);
        assert!(samples[0].escaped);
        assert_eq!(samples[7 * 16 + 7], samples[0]);
    }

    #[test]
    fn finer_pass_keeps_coarse_grid_points() {
        let mapper = mapper();
        let mut samples = vec![Sample::default(); 16 * 16];
        let marker = Sample {
            color: Color::WHITE,
            iterations: 7,
            escaped: true,
        };
        samples[0] = marker;
        let mut band = Band {
            index: 0,
            top: 0,
            samples: &mut samples,
        };
        band.render(&frame(&mapper, 4, Some(8)), &mut programs(50), &NeverCancel)
            .unwrap();
        assert_eq!(samples[0], marker);
        assert_ne!(samples[4], Sample::default());
    }

    #[test]
    fn solid_corners_skip_evaluation() {
        let mapper = mapper();
        let interior = Sample {
            color: Color::BLACK,
            iterations: 50,
            escaped: false,
        };
        // Every even grid point is "interior", whatever the program says.
        let mut samples = vec![Sample::default(); 16 * 16];
        for y in (0..16).step_by(2) {
            for x in (0..16).step_by(2) {
                samples[y * 16 + x] = interior;
            }
        }
        let mut band = Band {
            index: 0,
            top: 0,
            samples: &mut samples,
        };
        let mut frame = frame(&mapper, 1, Some(2));
        frame.solid_block = Some(4);
        band.render(&frame, &mut programs(50), &NeverCancel).unwrap();

        // (1, 1) lies in the block with corners (0,0)-(4,4): guessed.
        assert_eq!(samples[16 + 1], interior);
        // Row 13 has no lower corner inside the band: evaluated, and escapes.
        assert!(samples[13 * 16 + 1].escaped);
    }

    #[test]
    fn mirrored_grid_rows_are_skipped_only_when_their_block_is_mirrored() {
        let mapper = mapper();
        let mut samples = vec![Sample::default(); 16 * 16];
        let mut band = Band {
            index: 0,
            top: 0,
            samples: &mut samples,
        };
        // Rows 0..4 mirror rows 7..4. The stride 8 block of row 0 also
        // covers rows 4..8, so row 0 is evaluated anyway.
        let mut coarse = frame(&mapper, 8, None);
        coarse.mirror = Mirror::new(3.5, 16);
        band.render(&coarse, &mut programs(50), &NeverCancel).unwrap();
        assert_ne!(samples[4 * 16], Sample::default());
        assert_eq!(samples[7 * 16], samples[0]);

        let mut samples = vec![Sample::default(); 16 * 16];
        let mut band = Band {
            index: 0,
            top: 0,
            samples: &mut samples,
        };
        // Rows 9..16 mirror rows 7..0: the block of row 8 holds the axis
        // and row 9, the block of row 10 is entirely mirrored.
        let mut fine = frame(&mapper, 2, None);
        fine.mirror = Mirror::new(8.0, 16);
        band.render(&fine, &mut programs(50), &NeverCancel).unwrap();
        assert_ne!(samples[9 * 16], Sample::default());
        assert_eq!(samples[10 * 16], Sample::default());
        assert_eq!(samples[15 * 16 + 15], Sample::default());
    }

    #[test]
    fn cancelled_band_stops_early() {
        #[derive(Clone)]
        struct Cancelled;
        impl CancellationChecker for Cancelled {
            fn is_cancelled(&self) -> bool {
                true
            }
        }

        let mapper = mapper();
        let mut samples = vec![Sample::default(); 16 * 16];
        let mut band = Band {
            index: 0,
            top: 0,
            samples: &mut samples,
        };
        let done = band
            .render(&frame(&mapper, 1, None), &mut programs(50), &Cancelled)
            .unwrap();
        assert!(!done);
        assert!(samples.iter().all(|s| *s == Sample::default()));
    }
}
