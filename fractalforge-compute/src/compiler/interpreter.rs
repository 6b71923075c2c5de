//! Tree-walking execution strategy.
//!
//! Resolved IR is turned into evaluator nodes once per compile; program
//! instances share the nodes through an `Arc` and only own their registers.
//! Every value is carried as a full complex pair, including real ones, so
//! the native backend can reproduce the exact same operation sequence.

use super::ir::{ArithOp, ColorExpr, ColorIr, Cond, Expr, ExprKind, OrbitIr, StateSlot, Stmt};
use super::ir::{BUILTIN_REGISTERS, N, W, X};
use crate::runtime::{
    color_from_components, palette_color, ColorProgram, OrbitOutcome, OrbitProgram, ProgramState,
};
use fractalforge_core::{
    Color, CompareOp, ComplexNumber, EvaluationError, Function, NumberHandle, NumberPool, Palette,
    Region, Scope, Trap,
};
use std::sync::Arc;

/// Read-only view of the instance state handed to evaluator nodes.
pub struct EvalContext<'a> {
    pub pool: &'a NumberPool,
    pub time: f64,
    pub traps: &'a [Trap],
}

// ============================================================================
// Evaluator nodes
// ============================================================================

#[derive(Debug)]
pub enum Node {
    Constant(ComplexNumber, bool),
    Load(usize, bool),
    Time,
    Negate(Box<Node>, bool),
    Add(Box<Node>, Box<Node>, bool),
    Subtract(Box<Node>, Box<Node>, bool),
    Multiply(Box<Node>, Box<Node>, bool),
    Divide(Box<Node>, Box<Node>, bool),
    /// Real form of a function; arguments are read through their real part.
    RealCall(Function, Vec<Node>),
    ComplexCall(Function, Vec<Node>, bool),
}

impl Node {
    fn build(expr: &Expr) -> Node {
        let real = expr.real;
        let boxed = |e: &Expr| Box::new(Node::build(e));
        match &expr.kind {
            ExprKind::Const(c) => Node::Constant(*c, real),
            ExprKind::Load(h) => Node::Load(h.index(), real),
            ExprKind::Time => Node::Time,
            ExprKind::Neg(inner) => Node::Negate(boxed(inner), real),
            ExprKind::Arith(op, l, r) => match op {
                ArithOp::Add => Node::Add(boxed(l), boxed(r), real),
                ArithOp::Sub => Node::Subtract(boxed(l), boxed(r), real),
                ArithOp::Mul => Node::Multiply(boxed(l), boxed(r), real),
                ArithOp::Div => Node::Divide(boxed(l), boxed(r), real),
            },
            ExprKind::Call(function, args) => {
                let nodes = args.iter().map(Node::build).collect();
                if Expr::uses_real_form(args) {
                    Node::RealCall(*function, nodes)
                } else {
                    Node::ComplexCall(*function, nodes, real)
                }
            }
        }
    }

    pub fn evaluate(&self, ctx: &EvalContext) -> ComplexNumber {
        match self {
            Node::Constant(c, _) => *c,
            Node::Load(index, _) => ctx.pool.as_slice()[*index].get(),
            Node::Time => ComplexNumber::real(ctx.time),
            Node::Negate(inner, _) => -inner.evaluate(ctx),
            Node::Add(l, r, _) => l.evaluate(ctx) + r.evaluate(ctx),
            Node::Subtract(l, r, _) => l.evaluate(ctx) - r.evaluate(ctx),
            Node::Multiply(l, r, _) => l.evaluate(ctx) * r.evaluate(ctx),
            Node::Divide(l, r, _) => l.evaluate(ctx) / r.evaluate(ctx),
            Node::RealCall(function, args) => {
                let a = args.first().map_or(0.0, |n| n.evaluate(ctx).re);
                let b = args.get(1).map_or(0.0, |n| n.evaluate(ctx).re);
                ComplexNumber::real(function.apply_real(a, b))
            }
            Node::ComplexCall(function, args, _) => {
                let a = args.first().map_or(ComplexNumber::ZERO, |n| n.evaluate(ctx));
                let b = args.get(1).map_or(ComplexNumber::ZERO, |n| n.evaluate(ctx));
                function.apply_complex(a, b)
            }
        }
    }

    pub fn is_real(&self) -> bool {
        match self {
            Node::Time | Node::RealCall(..) => true,
            Node::Constant(_, real)
            | Node::Load(_, real)
            | Node::Negate(_, real)
            | Node::Add(_, _, real)
            | Node::Subtract(_, _, real)
            | Node::Multiply(_, _, real)
            | Node::Divide(_, _, real)
            | Node::ComplexCall(_, _, real) => *real,
        }
    }
}

#[derive(Debug)]
enum Test {
    Compare(CompareOp, Node, Node),
    And(Box<Test>, Box<Test>),
    Or(Box<Test>, Box<Test>),
    Xor(Box<Test>, Box<Test>),
    Not(Box<Test>),
    Literal(bool),
    Trap(usize, Node),
}

impl Test {
    fn build(cond: &Cond) -> Test {
        let boxed = |c: &Cond| Box::new(Test::build(c));
        match cond {
            Cond::Compare(op, l, r) => Test::Compare(*op, Node::build(l), Node::build(r)),
            Cond::And(l, r) => Test::And(boxed(l), boxed(r)),
            Cond::Or(l, r) => Test::Or(boxed(l), boxed(r)),
            Cond::Xor(l, r) => Test::Xor(boxed(l), boxed(r)),
            Cond::Not(c) => Test::Not(boxed(c)),
            Cond::Literal(v) => Test::Literal(*v),
            Cond::Trap(index, point) => Test::Trap(*index, Node::build(point)),
        }
    }

    fn holds(&self, ctx: &EvalContext) -> bool {
        match self {
            Test::Compare(op, l, r) => op.apply(l.evaluate(ctx).re, r.evaluate(ctx).re),
            Test::And(l, r) => l.holds(ctx) && r.holds(ctx),
            Test::Or(l, r) => l.holds(ctx) || r.holds(ctx),
            Test::Xor(l, r) => l.holds(ctx) != r.holds(ctx),
            Test::Not(c) => !c.holds(ctx),
            Test::Literal(v) => *v,
            Test::Trap(index, point) => ctx
                .traps
                .get(*index)
                .is_some_and(|trap| trap.contains(point.evaluate(ctx))),
        }
    }
}

#[derive(Debug)]
enum Op {
    Assign(NumberHandle, Node),
    If(Test, Vec<Op>, Vec<Op>),
    Stop,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

fn build_block(stmts: &[Stmt]) -> Vec<Op> {
    stmts
        .iter()
        .map(|s| match s {
            Stmt::Assign(h, e) => Op::Assign(*h, Node::build(e)),
            Stmt::If(c, then, otherwise) => {
                Op::If(Test::build(c), build_block(then), build_block(otherwise))
            }
            Stmt::Stop => Op::Stop,
        })
        .collect()
}

fn run_block(ops: &[Op], state: &mut ProgramState) -> Flow {
    for op in ops {
        let flow = match op {
            Op::Assign(handle, node) => {
                let value = node.evaluate(&context(state));
                state.pool.set(*handle, value);
                Flow::Continue
            }
            Op::If(test, then, otherwise) => {
                if test.holds(&context(state)) {
                    run_block(then, state)
                } else {
                    run_block(otherwise, state)
                }
            }
            Op::Stop => Flow::Stop,
        };
        if flow == Flow::Stop {
            return Flow::Stop;
        }
    }
    Flow::Continue
}

fn context(state: &ProgramState) -> EvalContext<'_> {
    EvalContext {
        pool: &state.pool,
        time: state.time,
        traps: &state.traps,
    }
}

// ============================================================================
// Orbit program
// ============================================================================

struct OrbitCode {
    prelude: Vec<Op>,
    begin: Vec<Op>,
    body: Vec<Op>,
    condition: Test,
    end: Vec<Op>,
    loop_begin: u32,
    loop_end: u32,
    pure_start: usize,
    states: Scope,
    region: Region,
    uses_time: bool,
    conjugation_symmetric: bool,
}

#[derive(Clone)]
pub struct InterpretedOrbit {
    code: Arc<OrbitCode>,
    state: ProgramState,
}

impl InterpretedOrbit {
    pub(crate) fn new(ir: &OrbitIr) -> Self {
        let code = OrbitCode {
            prelude: build_block(&ir.prelude),
            begin: build_block(&ir.begin),
            body: build_block(&ir.body),
            condition: Test::build(&ir.condition),
            end: build_block(&ir.end),
            loop_begin: ir.loop_begin,
            loop_end: ir.loop_end,
            pure_start: ir.pure_start,
            states: ir.states.clone(),
            region: ir.region,
            uses_time: ir.uses_time,
            conjugation_symmetric: ir.conjugation_symmetric,
        };
        Self {
            code: Arc::new(code),
            state: ProgramState::new(
                ir.registers,
                Arc::from(ir.traps.clone()),
                Arc::from(Vec::new()),
            ),
        }
    }
}

impl OrbitProgram for InterpretedOrbit {
    fn init(&mut self) {
        run_block(&self.code.prelude, &mut self.state);
    }

    fn region(&self) -> Region {
        self.code.region
    }

    fn set_time(&mut self, time: f64) {
        self.state.time = time;
        if self.code.uses_time {
            self.init();
        }
    }

    fn set_julia(&mut self, julia: bool) {
        self.state.julia = julia;
    }

    fn is_julia(&self) -> bool {
        self.state.julia
    }

    fn set_point(&mut self, point: ComplexNumber) {
        self.state.point = point;
    }

    fn point(&self) -> ComplexNumber {
        self.state.point
    }

    fn render(
        &mut self,
        x: ComplexNumber,
        w: ComplexNumber,
        states: &mut [ComplexNumber],
        mut trace: Option<&mut Vec<Vec<ComplexNumber>>>,
    ) -> Result<OrbitOutcome, EvaluationError> {
        let code = &self.code;
        let state = &mut self.state;
        state
            .pool
            .reset_range(BUILTIN_REGISTERS as usize, code.pure_start);
        state.pool.set(X, x);
        state.pool.set(W, w);
        state.pool.set(N, ComplexNumber::real(code.loop_begin as f64));

        run_block(&code.begin, state);

        let mut outcome = OrbitOutcome {
            iterations: code.loop_end,
            escaped: false,
        };
        for i in code.loop_begin.saturating_add(1)..=code.loop_end {
            state.pool.set(N, ComplexNumber::real(i as f64));
            let flow = run_block(&code.body, state);
            if let Some(trace) = trace.as_deref_mut() {
                trace.push(state.snapshot(&code.states));
            }
            if flow == Flow::Stop || code.condition.holds(&context(state)) {
                outcome = OrbitOutcome {
                    iterations: i,
                    escaped: true,
                };
                break;
            }
        }

        run_block(&code.end, state);
        state.export_states(&code.states, states);
        Ok(outcome)
    }

    fn use_time(&self) -> bool {
        self.code.uses_time
    }

    fn state_len(&self) -> usize {
        self.code.states.len()
    }

    fn loop_end(&self) -> u32 {
        self.code.loop_end
    }

    fn is_conjugation_symmetric(&self) -> bool {
        self.code.conjugation_symmetric
    }
}

// ============================================================================
// Color program
// ============================================================================

enum Shade {
    Literal(Color),
    Palette(usize, Node),
    Components([Node; 4]),
}

impl Shade {
    fn build(color: &ColorExpr) -> Shade {
        match color {
            ColorExpr::Literal(c) => Shade::Literal(*c),
            ColorExpr::Palette(index, e) => Shade::Palette(*index, Node::build(e)),
            ColorExpr::Components(channels) => {
                Shade::Components(channels.each_ref().map(Node::build))
            }
        }
    }

    fn color(
        &self,
        ctx: &EvalContext,
        palettes: &[Palette],
        names: &[String],
    ) -> Result<Color, EvaluationError> {
        match self {
            Shade::Literal(c) => Ok(*c),
            Shade::Palette(index, node) => {
                let position = node.evaluate(ctx).re;
                match (palettes.get(*index), names.get(*index)) {
                    (Some(palette), Some(name)) => palette_color(palette, name, position),
                    _ => Ok(Color::TRANSPARENT),
                }
            }
            Shade::Components([a, r, g, b]) => Ok(color_from_components(
                a.evaluate(ctx).re,
                r.evaluate(ctx).re,
                g.evaluate(ctx).re,
                b.evaluate(ctx).re,
            )),
        }
    }
}

struct Blend {
    test: Test,
    opacity: Node,
    shade: Shade,
}

struct ColorCode {
    prelude: Vec<Op>,
    init: Vec<Op>,
    background: Shade,
    rules: Vec<Blend>,
    imports: Vec<StateSlot>,
    palette_names: Vec<String>,
    pure_start: usize,
    uses_time: bool,
    conjugation_symmetric: bool,
}

#[derive(Clone)]
pub struct InterpretedColor {
    code: Arc<ColorCode>,
    state: ProgramState,
}

impl InterpretedColor {
    pub(crate) fn new(ir: &ColorIr) -> Self {
        let code = ColorCode {
            prelude: build_block(&ir.prelude),
            init: build_block(&ir.init),
            background: Shade::build(&ir.background),
            rules: ir
                .rules
                .iter()
                .map(|rule| Blend {
                    test: Test::build(&rule.condition),
                    opacity: Node::build(&rule.opacity),
                    shade: Shade::build(&rule.color),
                })
                .collect(),
            imports: ir.imports.clone(),
            palette_names: ir.palette_names.clone(),
            pure_start: ir.pure_start,
            uses_time: ir.uses_time,
            conjugation_symmetric: ir.conjugation_symmetric,
        };
        Self {
            code: Arc::new(code),
            state: ProgramState::new(
                ir.registers,
                Arc::from(ir.traps.clone()),
                Arc::from(ir.palettes.clone()),
            ),
        }
    }
}

impl ColorProgram for InterpretedColor {
    fn init(&mut self) {
        run_block(&self.code.prelude, &mut self.state);
    }

    fn set_time(&mut self, time: f64) {
        self.state.time = time;
        if self.code.uses_time {
            self.init();
        }
    }

    fn set_julia(&mut self, julia: bool) {
        self.state.julia = julia;
    }

    fn render(&mut self, states: &[ComplexNumber]) -> Result<Color, EvaluationError> {
        let code = &self.code;
        let state = &mut self.state;
        state.pool.reset_range(0, code.pure_start);
        state.import_states(&code.imports, states)?;
        run_block(&code.init, state);

        let ctx = context(state);
        let palettes = &state.palettes;
        let mut color = code.background.color(&ctx, palettes, &code.palette_names)?;
        for rule in &code.rules {
            if !rule.test.holds(&ctx) {
                continue;
            }
            let opacity = rule.opacity.evaluate(&ctx).re;
            let shade = rule.shade.color(&ctx, palettes, &code.palette_names)?;
            color.blend(&shade, opacity as f32);
        }
        Ok(color)
    }

    fn use_time(&self) -> bool {
        self.code.uses_time
    }

    fn is_conjugation_symmetric(&self) -> bool {
        self.code.conjugation_symmetric
    }
}
