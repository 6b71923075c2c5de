//! Orbit traps: closed 2-D paths anchored at a center point.
//!
//! Paths are built from absolute and relative operators. Containment is an
//! even-odd test against a polygon approximation of the path, so curves and
//! arcs are sampled at a fixed resolution.

use crate::ComplexNumber;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Samples per curved segment used for containment.
pub const DEFAULT_SAMPLES: usize = 16;

/// Full turns an arc is sampled for. Longer sweeps only retrace the circle.
pub const MAX_ARC_TURNS: f64 = 4.0;

/// Path operator. Relative variants are offsets from the current point.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum PathOp {
    MoveTo(ComplexNumber),
    LineTo(ComplexNumber),
    /// Arc around `center`, sweeping `angle` radians from the current point.
    ArcTo { center: ComplexNumber, angle: f64 },
    QuadTo {
        control: ComplexNumber,
        to: ComplexNumber,
    },
    CurveTo {
        control1: ComplexNumber,
        control2: ComplexNumber,
        to: ComplexNumber,
    },
    MoveRel(ComplexNumber),
    LineRel(ComplexNumber),
    ArcRel { center: ComplexNumber, angle: f64 },
    QuadRel {
        control: ComplexNumber,
        to: ComplexNumber,
    },
    CurveRel {
        control1: ComplexNumber,
        control2: ComplexNumber,
        to: ComplexNumber,
    },
    Close,
}

/// Runtime trap. The polygon outline is rebuilt whenever a subpath closes.
#[derive(Clone, Debug, PartialEq)]
pub struct Trap {
    name: String,
    center: ComplexNumber,
    ops: Vec<PathOp>,
    outline: Vec<Vec<ComplexNumber>>,
}

impl Trap {
    pub fn new(name: impl Into<String>, center: ComplexNumber) -> Self {
        Self {
            name: name.into(),
            center,
            ops: Vec::new(),
            outline: Vec::new(),
        }
    }

    /// Build from a list of operators; closing ops included in `ops` close
    /// the trap.
    pub fn from_ops(name: impl Into<String>, center: ComplexNumber, ops: &[PathOp]) -> Self {
        let mut trap = Self::new(name, center);
        for op in ops {
            trap.push(*op);
        }
        trap
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn center(&self) -> ComplexNumber {
        self.center
    }

    pub fn ops(&self) -> &[PathOp] {
        &self.ops
    }

    pub fn push(&mut self, op: PathOp) -> &mut Self {
        self.ops.push(op);
        if op == PathOp::Close {
            self.outline = self.polygon(DEFAULT_SAMPLES);
        }
        self
    }

    pub fn move_to(&mut self, re: f64, im: f64) -> &mut Self {
        self.push(PathOp::MoveTo(ComplexNumber::new(re, im)))
    }

    pub fn line_to(&mut self, re: f64, im: f64) -> &mut Self {
        self.push(PathOp::LineTo(ComplexNumber::new(re, im)))
    }

    pub fn arc_to(&mut self, center: ComplexNumber, angle: f64) -> &mut Self {
        self.push(PathOp::ArcTo { center, angle })
    }

    pub fn quad_to(&mut self, control: ComplexNumber, to: ComplexNumber) -> &mut Self {
        self.push(PathOp::QuadTo { control, to })
    }

    pub fn curve_to(
        &mut self,
        control1: ComplexNumber,
        control2: ComplexNumber,
        to: ComplexNumber,
    ) -> &mut Self {
        self.push(PathOp::CurveTo {
            control1,
            control2,
            to,
        })
    }

    pub fn move_rel(&mut self, re: f64, im: f64) -> &mut Self {
        self.push(PathOp::MoveRel(ComplexNumber::new(re, im)))
    }

    pub fn line_rel(&mut self, re: f64, im: f64) -> &mut Self {
        self.push(PathOp::LineRel(ComplexNumber::new(re, im)))
    }

    pub fn close(&mut self) -> &mut Self {
        self.push(PathOp::Close)
    }

    /// A trap is closed when its last operator is `Close`.
    pub fn is_closed(&self) -> bool {
        self.ops.last() == Some(&PathOp::Close)
    }

    /// Even-odd containment of `point` relative to the trap center. Always
    /// false until the path is closed.
    pub fn contains(&self, point: ComplexNumber) -> bool {
        if !self.is_closed() {
            return false;
        }
        let p = point - self.center;
        let mut inside = false;
        for ring in &self.outline {
            if ring.len() < 3 {
                continue;
            }
            let mut j = ring.len() - 1;
            for i in 0..ring.len() {
                let (a, b) = (ring[i], ring[j]);
                if (a.im > p.im) != (b.im > p.im)
                    && p.re < (b.re - a.re) * (p.im - a.im) / (b.im - a.im) + a.re
                {
                    inside = !inside;
                }
                j = i;
            }
        }
        inside
    }

    /// Polygon approximation of the path, one ring per subpath. Curves and
    /// arcs contribute `samples` points each.
    pub fn polygon(&self, samples: usize) -> Vec<Vec<ComplexNumber>> {
        let samples = samples.max(1);
        let mut rings = Vec::new();
        let mut ring: Vec<ComplexNumber> = Vec::new();
        let mut current = ComplexNumber::ZERO;
        let mut start = ComplexNumber::ZERO;

        for op in &self.ops {
            match *op {
                PathOp::MoveTo(p) | PathOp::MoveRel(p) => {
                    if ring.len() > 1 {
                        rings.push(std::mem::take(&mut ring));
                    }
                    ring.clear();
                    current = if matches!(op, PathOp::MoveRel(_)) {
                        current + p
                    } else {
                        p
                    };
                    start = current;
                    ring.push(current);
                }
                PathOp::LineTo(p) | PathOp::LineRel(p) => {
                    if ring.is_empty() {
                        ring.push(current);
                    }
                    current = if matches!(op, PathOp::LineRel(_)) {
                        current + p
                    } else {
                        p
                    };
                    ring.push(current);
                }
                PathOp::ArcTo { center, angle } | PathOp::ArcRel { center, angle } => {
                    if ring.is_empty() {
                        ring.push(current);
                    }
                    let center = if matches!(op, PathOp::ArcRel { .. }) {
                        current + center
                    } else {
                        center
                    };
                    if !angle.is_finite() {
                        continue;
                    }
                    let radius = (current - center).modulus();
                    let start_angle = (current - center).phase();
                    let turns = (angle.abs() / TAU).clamp(1.0 / samples as f64, MAX_ARC_TURNS);
                    let steps = ((samples as f64) * turns).ceil() as usize;
                    for s in 1..=steps {
                        let theta = start_angle + angle * s as f64 / steps as f64;
                        ring.push(
                            center
                                + ComplexNumber::new(
                                    radius * libm::cos(theta),
                                    radius * libm::sin(theta),
                                ),
                        );
                    }
                    current = ring.last().copied().unwrap_or(current);
                }
                PathOp::QuadTo { control, to } | PathOp::QuadRel { control, to } => {
                    if ring.is_empty() {
                        ring.push(current);
                    }
                    let (control, to) = if matches!(op, PathOp::QuadRel { .. }) {
                        (current + control, current + to)
                    } else {
                        (control, to)
                    };
                    let from = current;
                    for s in 1..=samples {
                        let t = s as f64 / samples as f64;
                        let u = 1.0 - t;
                        ring.push(from * (u * u) + control * (2.0 * u * t) + to * (t * t));
                    }
                    current = to;
                }
                PathOp::CurveTo {
                    control1,
                    control2,
                    to,
                }
                | PathOp::CurveRel {
                    control1,
                    control2,
                    to,
                } => {
                    if ring.is_empty() {
                        ring.push(current);
                    }
                    let (c1, c2, to) = if matches!(op, PathOp::CurveRel { .. }) {
                        (current + control1, current + control2, current + to)
                    } else {
                        (control1, control2, to)
                    };
                    let from = current;
                    for s in 1..=samples {
                        let t = s as f64 / samples as f64;
                        let u = 1.0 - t;
                        ring.push(
                            from * (u * u * u)
                                + c1 * (3.0 * u * u * t)
                                + c2 * (3.0 * u * t * t)
                                + to * (t * t * t),
                        );
                    }
                    current = to;
                }
                PathOp::Close => {
                    if ring.len() > 1 {
                        rings.push(std::mem::take(&mut ring));
                    }
                    ring.clear();
                    current = start;
                }
            }
        }
        if ring.len() > 1 {
            rings.push(ring);
        }
        rings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square() -> Trap {
        let mut trap = Trap::new("square", ComplexNumber::ZERO);
        trap.move_to(-0.5, -0.5)
            .line_to(0.5, -0.5)
            .line_to(0.5, 0.5)
            .line_to(-0.5, 0.5)
            .close();
        trap
    }

    #[test]
    fn unit_square_contains_origin_but_not_far_point() {
        let trap = unit_square();
        assert!(trap.contains(ComplexNumber::ZERO));
        assert!(!trap.contains(ComplexNumber::new(2.0, 2.0)));
    }

    #[test]
    fn open_path_contains_nothing() {
        let mut trap = Trap::new("open", ComplexNumber::ZERO);
        trap.move_to(-1.0, -1.0).line_to(1.0, -1.0).line_to(1.0, 1.0);
        assert!(!trap.is_closed());
        assert!(!trap.contains(ComplexNumber::new(0.5, -0.5)));
    }

    #[test]
    fn containment_is_relative_to_center() {
        let mut trap = unit_square();
        trap.center = ComplexNumber::new(3.0, 0.0);
        assert!(trap.contains(ComplexNumber::new(3.0, 0.0)));
        assert!(!trap.contains(ComplexNumber::ZERO));
    }

    #[test]
    fn relative_square_matches_absolute_square() {
        let mut trap = Trap::new("rel", ComplexNumber::ZERO);
        trap.move_to(-0.5, -0.5)
            .line_rel(1.0, 0.0)
            .line_rel(0.0, 1.0)
            .line_rel(-1.0, 0.0)
            .close();
        assert_eq!(trap.polygon(4), unit_square().polygon(4));
    }

    #[test]
    fn full_arc_approximates_circle() {
        let mut trap = Trap::new("circle", ComplexNumber::ZERO);
        trap.move_to(1.0, 0.0).arc_to(ComplexNumber::ZERO, TAU).close();
        assert!(trap.contains(ComplexNumber::new(0.9, 0.0)));
        assert!(trap.contains(ComplexNumber::new(0.0, -0.9)));
        assert!(!trap.contains(ComplexNumber::new(0.75, 0.75)));
        let rings = trap.polygon(32);
        assert_eq!(rings.len(), 1);
        assert!(rings[0]
            .iter()
            .all(|p| (p.modulus() - 1.0).abs() < 1e-12));
    }

    #[test]
    fn huge_arc_sweeps_are_sampled_boundedly() {
        let mut trap = Trap::new("spin", ComplexNumber::ZERO);
        trap.move_to(1.0, 0.0).arc_to(ComplexNumber::ZERO, 1e12).close();
        assert!(trap.is_closed());
        let rings = trap.polygon(DEFAULT_SAMPLES);
        assert_eq!(rings.len(), 1);
        let bound = 1 + (DEFAULT_SAMPLES as f64 * MAX_ARC_TURNS) as usize;
        assert!(rings[0].len() <= bound, "{} points", rings[0].len());
        assert!(rings[0].iter().all(|p| (p.modulus() - 1.0).abs() < 1e-9));
    }

    #[test]
    fn non_finite_arc_is_skipped() {
        let mut trap = Trap::new("nan", ComplexNumber::ZERO);
        trap.move_to(-0.5, -0.5)
            .line_to(0.5, -0.5)
            .arc_to(ComplexNumber::ZERO, f64::INFINITY)
            .arc_to(ComplexNumber::ZERO, f64::NAN)
            .line_to(0.5, 0.5)
            .line_to(-0.5, 0.5)
            .close();
        assert_eq!(trap.polygon(4), unit_square().polygon(4));
    }

    #[test]
    fn even_odd_rule_punches_holes() {
        let mut trap = Trap::new("ring", ComplexNumber::ZERO);
        trap.move_to(-2.0, -2.0)
            .line_to(2.0, -2.0)
            .line_to(2.0, 2.0)
            .line_to(-2.0, 2.0)
            .close()
            .move_to(-1.0, -1.0)
            .line_to(1.0, -1.0)
            .line_to(1.0, 1.0)
            .line_to(-1.0, 1.0)
            .close();
        assert!(!trap.contains(ComplexNumber::ZERO));
        assert!(trap.contains(ComplexNumber::new(1.5, 0.0)));
    }
}
