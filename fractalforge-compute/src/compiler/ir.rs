//! Resolved program representation shared by both execution strategies.
//!
//! Names are replaced by register handles, every expression carries its
//! static type (real or complex) and pure assignments have been hoisted into
//! a prelude. The interpreter builds evaluator nodes from this tree, the
//! native backend lowers it to machine code; neither looks at the AST.

use fractalforge_core::{
    Color, CompareOp, CompilerVariable, ComplexNumber, Function, NumberHandle, Palette, Region,
    Scope, Trap,
};
use std::fmt;

/// Register of the orbit point `x`.
pub const X: NumberHandle = NumberHandle(0);
/// Register of the constant `w`.
pub const W: NumberHandle = NumberHandle(1);
/// Register of the iteration counter `n`.
pub const N: NumberHandle = NumberHandle(2);
/// Registers reserved for builtins in orbit programs.
pub const BUILTIN_REGISTERS: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    /// Static type: real expressions always evaluate with a zero imaginary part.
    pub real: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Const(ComplexNumber),
    Load(NumberHandle),
    Time,
    Neg(Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    /// Uses the real form of `function` when every argument is real.
    Call(Function, Vec<Expr>),
}

impl Expr {
    pub fn new(kind: ExprKind, real: bool) -> Self {
        Self { kind, real }
    }

    pub fn constant(value: ComplexNumber) -> Self {
        Self::new(ExprKind::Const(value), value.is_real())
    }

    /// True when every argument of this call is real, i.e. the real form applies.
    pub fn uses_real_form(arguments: &[Expr]) -> bool {
        arguments.iter().all(|a| a.real)
    }

    pub(crate) fn visit(&self, f: &mut impl FnMut(&Expr)) {
        f(self);
        match &self.kind {
            ExprKind::Neg(inner) => inner.visit(f),
            ExprKind::Arith(_, l, r) => {
                l.visit(f);
                r.visit(f);
            }
            ExprKind::Call(_, args) => args.iter().for_each(|a| a.visit(f)),
            ExprKind::Const(_) | ExprKind::Load(_) | ExprKind::Time => {}
        }
    }

    pub(crate) fn remap(&mut self, map: &dyn Fn(NumberHandle) -> NumberHandle) {
        match &mut self.kind {
            ExprKind::Load(h) => *h = map(*h),
            ExprKind::Neg(inner) => inner.remap(map),
            ExprKind::Arith(_, l, r) => {
                l.remap(map);
                r.remap(map);
            }
            ExprKind::Call(_, args) => args.iter_mut().for_each(|a| a.remap(map)),
            ExprKind::Const(_) | ExprKind::Time => {}
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Cond {
    Compare(CompareOp, Expr, Expr),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
    Xor(Box<Cond>, Box<Cond>),
    Not(Box<Cond>),
    Literal(bool),
    /// Containment of `point` in trap number `trap`.
    Trap(usize, Expr),
}

impl Cond {
    pub(crate) fn visit_exprs(&self, f: &mut impl FnMut(&Expr)) {
        match self {
            Cond::Compare(_, l, r) => {
                l.visit(f);
                r.visit(f);
            }
            Cond::And(l, r) | Cond::Or(l, r) | Cond::Xor(l, r) => {
                l.visit_exprs(f);
                r.visit_exprs(f);
            }
            Cond::Not(c) => c.visit_exprs(f),
            Cond::Literal(_) => {}
            Cond::Trap(_, p) => p.visit(f),
        }
    }

    pub(crate) fn uses_trap(&self) -> bool {
        match self {
            Cond::Trap(..) => true,
            Cond::And(l, r) | Cond::Or(l, r) | Cond::Xor(l, r) => l.uses_trap() || r.uses_trap(),
            Cond::Not(c) => c.uses_trap(),
            Cond::Compare(..) | Cond::Literal(_) => false,
        }
    }

    pub(crate) fn remap(&mut self, map: &dyn Fn(NumberHandle) -> NumberHandle) {
        match self {
            Cond::Compare(_, l, r) => {
                l.remap(map);
                r.remap(map);
            }
            Cond::And(l, r) | Cond::Or(l, r) | Cond::Xor(l, r) => {
                l.remap(map);
                r.remap(map);
            }
            Cond::Not(c) => c.remap(map),
            Cond::Literal(_) => {}
            Cond::Trap(_, p) => p.remap(map),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    /// Store into a register. A real value stored into a complex register
    /// gets a zero imaginary part.
    Assign(NumberHandle, Expr),
    If(Cond, Vec<Stmt>, Vec<Stmt>),
    Stop,
}

impl Stmt {
    pub(crate) fn visit_exprs(&self, f: &mut impl FnMut(&Expr)) {
        match self {
            Stmt::Assign(_, e) => e.visit(f),
            Stmt::If(c, then, otherwise) => {
                c.visit_exprs(f);
                then.iter().chain(otherwise).for_each(|s| s.visit_exprs(f));
            }
            Stmt::Stop => {}
        }
    }

    pub(crate) fn uses_trap(&self) -> bool {
        match self {
            Stmt::If(c, then, otherwise) => {
                c.uses_trap() || then.iter().chain(otherwise).any(Stmt::uses_trap)
            }
            Stmt::Assign(..) | Stmt::Stop => false,
        }
    }

    pub(crate) fn remap(&mut self, map: &dyn Fn(NumberHandle) -> NumberHandle) {
        match self {
            Stmt::Assign(h, e) => {
                *h = map(*h);
                e.remap(map);
            }
            Stmt::If(c, then, otherwise) => {
                c.remap(map);
                then.iter_mut().chain(otherwise.iter_mut()).for_each(|s| s.remap(map));
            }
            Stmt::Stop => {}
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ColorExpr {
    Literal(Color),
    Palette(usize, Expr),
    /// Alpha, red, green, blue.
    Components([Expr; 4]),
}

impl ColorExpr {
    pub(crate) fn visit_exprs(&self, f: &mut impl FnMut(&Expr)) {
        match self {
            ColorExpr::Literal(_) => {}
            ColorExpr::Palette(_, index) => index.visit(f),
            ColorExpr::Components(channels) => channels.iter().for_each(|c| c.visit(f)),
        }
    }

    pub(crate) fn remap(&mut self, map: &dyn Fn(NumberHandle) -> NumberHandle) {
        match self {
            ColorExpr::Literal(_) => {}
            ColorExpr::Palette(_, index) => index.remap(map),
            ColorExpr::Components(channels) => channels.iter_mut().for_each(|c| c.remap(map)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub condition: Cond,
    pub opacity: Expr,
    pub color: ColorExpr,
}

/// Register receiving (or exporting) one orbit state value.
#[derive(Clone, Debug, PartialEq)]
pub struct StateSlot {
    pub name: String,
    pub real: bool,
    pub handle: NumberHandle,
    /// Index in the orbit's state list.
    pub position: usize,
}

#[derive(Clone, Debug)]
pub struct OrbitIr {
    pub registers: usize,
    /// Registers in `BUILTIN_REGISTERS..pure_start` are zeroed before each pixel.
    pub pure_start: usize,
    pub prelude: Vec<Stmt>,
    pub begin: Vec<Stmt>,
    pub body: Vec<Stmt>,
    pub condition: Cond,
    pub end: Vec<Stmt>,
    pub loop_begin: u32,
    pub loop_end: u32,
    /// Exported state, in declaration order.
    pub states: Scope,
    pub variables: Vec<CompilerVariable>,
    pub traps: Vec<Trap>,
    pub region: Region,
    pub uses_time: bool,
    pub conjugation_symmetric: bool,
}

#[derive(Clone, Debug)]
pub struct ColorIr {
    pub registers: usize,
    /// Registers in `0..pure_start` are zeroed before each pixel.
    pub pure_start: usize,
    pub prelude: Vec<Stmt>,
    pub init: Vec<Stmt>,
    pub background: ColorExpr,
    pub rules: Vec<Rule>,
    /// Registers filled from the orbit's state vector.
    pub imports: Vec<StateSlot>,
    pub variables: Vec<CompilerVariable>,
    pub palettes: Vec<Palette>,
    pub palette_names: Vec<String>,
    pub traps: Vec<Trap>,
    pub uses_time: bool,
    pub conjugation_symmetric: bool,
}

// ============================================================================
// Textual dump
// ============================================================================

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Const(c) if c.is_real() => write!(f, "{}", c.re),
            ExprKind::Const(c) => write!(f, "({})", c),
            ExprKind::Load(h) => write!(f, "r{}", h.0),
            ExprKind::Time => f.write_str("time"),
            ExprKind::Neg(inner) => write!(f, "-{}", inner),
            ExprKind::Arith(op, l, r) => {
                let symbol = match op {
                    ArithOp::Add => "+",
                    ArithOp::Sub => "-",
                    ArithOp::Mul => "*",
                    ArithOp::Div => "/",
                };
                write!(f, "({} {} {})", l, symbol, r)
            }
            ExprKind::Call(function, args) => {
                write!(f, "{}(", function.name())?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                f.write_str(")")
            }
        }
    }
}
