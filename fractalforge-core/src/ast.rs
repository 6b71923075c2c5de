//! Abstract syntax tree of fractal programs.
//!
//! The tree is produced by an external parser (or built by hand with the
//! helper constructors below). Every node carries the [`SourceLocation`] it
//! came from so compile errors can point back into the source text.

use crate::{ComplexNumber, Function, PaletteMapping, PathOp};
use serde::{Deserialize, Serialize};

/// Position of a node in the source text. Zeroed for hand-built trees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
    pub offset: u32,
    pub length: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32, offset: u32, length: u32) -> Self {
        Self {
            line,
            column,
            offset,
            length,
        }
    }
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ExpressionKind {
    Number(ComplexNumber),
    Variable(String),
    /// Animation time.
    Time,
    Negate(Box<Expression>),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Function(Function, Vec<Expression>),
}

impl Expression {
    pub fn new(kind: ExpressionKind) -> Self {
        Self {
            kind,
            location: SourceLocation::default(),
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    pub fn number(value: f64) -> Self {
        Self::new(ExpressionKind::Number(ComplexNumber::real(value)))
    }

    pub fn complex(re: f64, im: f64) -> Self {
        Self::new(ExpressionKind::Number(ComplexNumber::new(re, im)))
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::new(ExpressionKind::Variable(name.into()))
    }

    pub fn time() -> Self {
        Self::new(ExpressionKind::Time)
    }

    pub fn negate(operand: Expression) -> Self {
        Self::new(ExpressionKind::Negate(Box::new(operand)))
    }

    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Self::new(ExpressionKind::Binary(op, Box::new(left), Box::new(right)))
    }

    pub fn add(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::Add, left, right)
    }

    pub fn sub(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::Sub, left, right)
    }

    pub fn mul(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::Mul, left, right)
    }

    pub fn div(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::Div, left, right)
    }

    pub fn pow(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOp::Pow, left, right)
    }

    pub fn call(function: Function, arguments: Vec<Expression>) -> Self {
        Self::new(ExpressionKind::Function(function, arguments))
    }
}

// ============================================================================
// Conditions
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    pub fn apply(self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Gt => left > right,
            CompareOp::Lt => left < right,
            CompareOp::Ge => left >= right,
            CompareOp::Le => left <= right,
            CompareOp::Eq => left == right,
            CompareOp::Ne => left != right,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub kind: ConditionKind,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConditionKind {
    Compare(CompareOp, Box<Expression>, Box<Expression>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Xor(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Literal(bool),
    /// True when `point` lies inside the named trap.
    TrapContains { trap: String, point: Box<Expression> },
}

impl Condition {
    pub fn new(kind: ConditionKind) -> Self {
        Self {
            kind,
            location: SourceLocation::default(),
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Self::new(ConditionKind::Compare(op, Box::new(left), Box::new(right)))
    }

    pub fn gt(left: Expression, right: Expression) -> Self {
        Self::compare(CompareOp::Gt, left, right)
    }

    pub fn lt(left: Expression, right: Expression) -> Self {
        Self::compare(CompareOp::Lt, left, right)
    }

    pub fn and(left: Condition, right: Condition) -> Self {
        Self::new(ConditionKind::And(Box::new(left), Box::new(right)))
    }

    pub fn or(left: Condition, right: Condition) -> Self {
        Self::new(ConditionKind::Or(Box::new(left), Box::new(right)))
    }

    pub fn xor(left: Condition, right: Condition) -> Self {
        Self::new(ConditionKind::Xor(Box::new(left), Box::new(right)))
    }

    pub fn not(operand: Condition) -> Self {
        Self::new(ConditionKind::Not(Box::new(operand)))
    }

    pub fn literal(value: bool) -> Self {
        Self::new(ConditionKind::Literal(value))
    }

    pub fn trap(trap: impl Into<String>, point: Expression) -> Self {
        Self::new(ConditionKind::TrapContains {
            trap: trap.into(),
            point: Box::new(point),
        })
    }
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum StatementKind {
    /// Assignment. The first assignment declares the variable; `real` set
    /// to `Some` makes the declaration explicit.
    Assign {
        name: String,
        real: Option<bool>,
        value: Expression,
    },
    If {
        condition: Condition,
        then: Vec<Statement>,
        otherwise: Vec<Statement>,
    },
    /// Leave the orbit loop as if the escape condition held.
    Stop,
}

impl Statement {
    pub fn new(kind: StatementKind) -> Self {
        Self {
            kind,
            location: SourceLocation::default(),
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    pub fn assign(name: impl Into<String>, value: Expression) -> Self {
        Self::new(StatementKind::Assign {
            name: name.into(),
            real: None,
            value,
        })
    }

    pub fn declare(name: impl Into<String>, real: bool, value: Expression) -> Self {
        Self::new(StatementKind::Assign {
            name: name.into(),
            real: Some(real),
            value,
        })
    }

    pub fn if_then(condition: Condition, then: Vec<Statement>, otherwise: Vec<Statement>) -> Self {
        Self::new(StatementKind::If {
            condition,
            then,
            otherwise,
        })
    }

    pub fn stop() -> Self {
        Self::new(StatementKind::Stop)
    }
}

// ============================================================================
// Color expressions
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColorExpression {
    pub kind: ColorExpressionKind,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ColorExpressionKind {
    /// Constant ARGB32 color.
    Literal(u32),
    /// Palette lookup by step index.
    Palette { name: String, index: Expression },
    /// Three (RGB, opaque) or four (ARGB) real channel expressions in `[0, 1]`.
    Components(Vec<Expression>),
}

impl ColorExpression {
    pub fn new(kind: ColorExpressionKind) -> Self {
        Self {
            kind,
            location: SourceLocation::default(),
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = location;
        self
    }

    pub fn literal(argb: u32) -> Self {
        Self::new(ColorExpressionKind::Literal(argb))
    }

    pub fn palette(name: impl Into<String>, index: Expression) -> Self {
        Self::new(ColorExpressionKind::Palette {
            name: name.into(),
            index,
        })
    }

    pub fn components(channels: Vec<Expression>) -> Self {
        Self::new(ColorExpressionKind::Components(channels))
    }
}

// ============================================================================
// Program structure
// ============================================================================

/// Initial viewing region, given by two opposite corners.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AstRegion {
    pub a: ComplexNumber,
    pub b: ComplexNumber,
}

impl AstRegion {
    pub fn new(a: ComplexNumber, b: ComplexNumber) -> Self {
        Self { a, b }
    }

    pub fn center(&self) -> ComplexNumber {
        (self.a + self.b) * 0.5
    }

    pub fn width(&self) -> f64 {
        (self.b.re - self.a.re).abs()
    }

    pub fn height(&self) -> f64 {
        (self.b.im - self.a.im).abs()
    }
}

impl Default for AstRegion {
    fn default() -> Self {
        Self::new(ComplexNumber::new(-2.0, -2.0), ComplexNumber::new(2.0, 2.0))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AstStateVariable {
    pub name: String,
    pub real: bool,
    pub location: SourceLocation,
}

impl AstStateVariable {
    pub fn new(name: impl Into<String>, real: bool) -> Self {
        Self {
            name: name.into(),
            real,
            location: SourceLocation::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AstOrbitTrap {
    pub name: String,
    pub center: ComplexNumber,
    pub path: Vec<PathOp>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AstOrbitLoop {
    pub begin: u32,
    pub end: u32,
    pub condition: Condition,
    pub statements: Vec<Statement>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AstOrbit {
    pub region: AstRegion,
    pub states: Vec<AstStateVariable>,
    pub traps: Vec<AstOrbitTrap>,
    pub begin: Vec<Statement>,
    pub orbit_loop: AstOrbitLoop,
    pub end: Vec<Statement>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AstPaletteElement {
    pub begin: u32,
    pub end: u32,
    pub steps: u32,
    pub mapping: PaletteMapping,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AstPalette {
    pub name: String,
    pub elements: Vec<AstPaletteElement>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AstRule {
    pub condition: Condition,
    pub opacity: Expression,
    pub color: ColorExpression,
    pub location: SourceLocation,
}

impl AstRule {
    pub fn new(condition: Condition, opacity: Expression, color: ColorExpression) -> Self {
        Self {
            condition,
            opacity,
            color,
            location: SourceLocation::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AstColor {
    /// Base color every pixel starts from.
    pub background: ColorExpression,
    pub palettes: Vec<AstPalette>,
    pub init: Vec<Statement>,
    pub rules: Vec<AstRule>,
    pub location: SourceLocation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AstFractal {
    pub orbit: AstOrbit,
    pub color: AstColor,
}

impl AstFractal {
    /// The classic `x ← x² + w` program escaping at `|x| > 2`, colored by
    /// iteration count through a blue-to-white palette with a black
    /// interior.
    pub fn mandelbrot(max_iterations: u32) -> Self {
        let orbit = AstOrbit {
            region: AstRegion::default(),
            states: vec![
                AstStateVariable::new("x", false),
                AstStateVariable::new("n", true),
            ],
            traps: Vec::new(),
            begin: Vec::new(),
            orbit_loop: AstOrbitLoop {
                begin: 0,
                end: max_iterations,
                condition: Condition::gt(
                    Expression::call(Function::Mod2, vec![Expression::var("x")]),
                    Expression::number(4.0),
                ),
                statements: vec![Statement::assign(
                    "x",
                    Expression::add(
                        Expression::mul(Expression::var("x"), Expression::var("x")),
                        Expression::var("w"),
                    ),
                )],
                location: SourceLocation::default(),
            },
            end: Vec::new(),
            location: SourceLocation::default(),
        };

        let color = AstColor {
            background: ColorExpression::literal(0xff000000),
            palettes: vec![AstPalette {
                name: "gradient".to_string(),
                elements: vec![
                    AstPaletteElement {
                        begin: 0xff000033,
                        end: 0xff3366ff,
                        steps: 32,
                        mapping: PaletteMapping::Linear,
                        location: SourceLocation::default(),
                    },
                    AstPaletteElement {
                        begin: 0xff3366ff,
                        end: 0xffffffff,
                        steps: 32,
                        mapping: PaletteMapping::Smooth,
                        location: SourceLocation::default(),
                    },
                ],
                location: SourceLocation::default(),
            }],
            init: Vec::new(),
            rules: vec![AstRule::new(
                Condition::lt(Expression::var("n"), Expression::number(max_iterations as f64)),
                Expression::number(1.0),
                ColorExpression::palette("gradient", Expression::var("n")),
            )],
            location: SourceLocation::default(),
        };

        Self { orbit, color }
    }
}
