//! Builtin functions of the formula language.
//!
//! Every function has a real and a complex form. The compiler picks the form
//! statically from the argument types: when all arguments are real the real
//! form is used and the result stays real. Both execution backends evaluate
//! functions through [`Function::apply_real`] and [`Function::apply_complex`],
//! which keeps their results identical.

use crate::ComplexNumber;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Function {
    /// `|z|`
    Mod,
    /// `|z|²`
    Mod2,
    /// Argument of `z`.
    Pha,
    Re,
    Im,
    Conj,
    /// Component-wise absolute value.
    Abs,
    Exp,
    Log,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Pow,
    Floor,
    Ceil,
    Min,
    Max,
    Hypot,
    Atan2,
    Square,
}

impl Function {
    pub const ALL: [Function; 27] = [
        Function::Mod,
        Function::Mod2,
        Function::Pha,
        Function::Re,
        Function::Im,
        Function::Conj,
        Function::Abs,
        Function::Exp,
        Function::Log,
        Function::Sqrt,
        Function::Sin,
        Function::Cos,
        Function::Tan,
        Function::Asin,
        Function::Acos,
        Function::Atan,
        Function::Sinh,
        Function::Cosh,
        Function::Tanh,
        Function::Pow,
        Function::Floor,
        Function::Ceil,
        Function::Min,
        Function::Max,
        Function::Hypot,
        Function::Atan2,
        Function::Square,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Function::Mod => "mod",
            Function::Mod2 => "mod2",
            Function::Pha => "pha",
            Function::Re => "re",
            Function::Im => "im",
            Function::Conj => "conj",
            Function::Abs => "abs",
            Function::Exp => "exp",
            Function::Log => "log",
            Function::Sqrt => "sqrt",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Asin => "asin",
            Function::Acos => "acos",
            Function::Atan => "atan",
            Function::Sinh => "sinh",
            Function::Cosh => "cosh",
            Function::Tanh => "tanh",
            Function::Pow => "pow",
            Function::Floor => "floor",
            Function::Ceil => "ceil",
            Function::Min => "min",
            Function::Max => "max",
            Function::Hypot => "hypot",
            Function::Atan2 => "atan2",
            Function::Square => "square",
        }
    }

    pub fn from_name(name: &str) -> Option<Function> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Stable numeric id, used by generated code to select a function.
    pub fn id(self) -> u32 {
        Self::ALL
            .iter()
            .position(|f| *f == self)
            .map(|p| p as u32)
            .unwrap_or(u32::MAX)
    }

    pub fn from_id(id: u32) -> Option<Function> {
        Self::ALL.get(id as usize).copied()
    }

    pub fn arity(self) -> usize {
        match self {
            Function::Pow | Function::Min | Function::Max | Function::Hypot | Function::Atan2 => 2,
            _ => 1,
        }
    }

    /// Functions that only accept real arguments.
    pub fn requires_real_arguments(self) -> bool {
        matches!(
            self,
            Function::Min | Function::Max | Function::Hypot | Function::Atan2
        )
    }

    /// Functions whose result is real whatever the argument type.
    pub fn always_real(self) -> bool {
        matches!(
            self,
            Function::Mod
                | Function::Mod2
                | Function::Pha
                | Function::Re
                | Function::Im
                | Function::Min
                | Function::Max
                | Function::Hypot
                | Function::Atan2
        )
    }

    /// Static result type given the static argument types.
    pub fn returns_real(self, arguments_real: &[bool]) -> bool {
        self.always_real() || arguments_real.iter().all(|r| *r)
    }

    /// True when the complex form satisfies `f(conj(z)) == conj(f(z))`, which
    /// is what makes a formula symmetric about the real axis. `im` and `pha`
    /// flip sign under conjugation; `abs`, `floor` and `ceil` act on the
    /// imaginary part componentwise and do not commute with its negation.
    /// Real forms always commute, since a real argument is its own conjugate.
    pub fn preserves_conjugation(self) -> bool {
        !matches!(
            self,
            Function::Im | Function::Pha | Function::Abs | Function::Floor | Function::Ceil
        )
    }

    /// Real form. Missing arguments read as zero.
    pub fn apply_real(self, a: f64, b: f64) -> f64 {
        match self {
            Function::Mod => a.abs(),
            Function::Mod2 => a * a,
            Function::Pha => libm::atan2(0.0, a),
            Function::Re => a,
            Function::Im => 0.0,
            Function::Conj => a,
            Function::Abs => a.abs(),
            Function::Exp => libm::exp(a),
            Function::Log => libm::log(a),
            Function::Sqrt => libm::sqrt(a),
            Function::Sin => libm::sin(a),
            Function::Cos => libm::cos(a),
            Function::Tan => libm::tan(a),
            Function::Asin => libm::asin(a),
            Function::Acos => libm::acos(a),
            Function::Atan => libm::atan(a),
            Function::Sinh => libm::sinh(a),
            Function::Cosh => libm::cosh(a),
            Function::Tanh => libm::tanh(a),
            Function::Pow => libm::pow(a, b),
            Function::Floor => libm::floor(a),
            Function::Ceil => libm::ceil(a),
            Function::Min => libm::fmin(a, b),
            Function::Max => libm::fmax(a, b),
            Function::Hypot => libm::hypot(a, b),
            Function::Atan2 => libm::atan2(a, b),
            Function::Square => a * a,
        }
    }

    /// Complex form. Missing arguments read as zero.
    pub fn apply_complex(self, a: ComplexNumber, b: ComplexNumber) -> ComplexNumber {
        match self {
            Function::Mod => ComplexNumber::real(a.modulus()),
            Function::Mod2 => ComplexNumber::real(a.modulus_sq()),
            Function::Pha => ComplexNumber::real(a.phase()),
            Function::Re => ComplexNumber::real(a.re),
            Function::Im => ComplexNumber::real(a.im),
            Function::Conj => a.conj(),
            Function::Abs => a.abs(),
            Function::Exp => a.exp(),
            Function::Log => a.log(),
            Function::Sqrt => a.sqrt(),
            Function::Sin => a.sin(),
            Function::Cos => a.cos(),
            Function::Tan => a.tan(),
            Function::Asin => a.asin(),
            Function::Acos => a.acos(),
            Function::Atan => a.atan(),
            Function::Sinh => a.sinh(),
            Function::Cosh => a.cosh(),
            Function::Tanh => a.tanh(),
            Function::Pow => a.pow(b),
            Function::Floor => a.floor(),
            Function::Ceil => a.ceil(),
            Function::Min => ComplexNumber::real(libm::fmin(a.re, b.re)),
            Function::Max => ComplexNumber::real(libm::fmax(a.re, b.re)),
            Function::Hypot => ComplexNumber::real(libm::hypot(a.re, b.re)),
            Function::Atan2 => ComplexNumber::real(libm::atan2(a.re, b.re)),
            Function::Square => a.square(),
        }
    }
}
