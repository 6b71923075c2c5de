//! Variables and scopes shared between the compiler and the runtime.

use crate::ast::SourceLocation;
use crate::NumberHandle;
use serde::{Deserialize, Serialize};

/// Locality/purity classification used to decide when a variable has to be
/// recomputed.
///
/// * non-local: declared at program level (orbit `begin`/`end`, color `init`)
///   or builtin; local: declared inside the orbit loop or a color rule.
/// * pure: assigned exactly once, unconditionally, from constants, time and
///   other pure variables. Pure variables are evaluated once per program
///   instance (and again when time changes), never per pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableKind {
    UnknownLocal,
    ImpureNonLocal,
    PureNonLocal,
    PureLocal,
}

impl VariableKind {
    pub fn classify(local: bool, pure: bool) -> Self {
        match (local, pure) {
            (false, false) => VariableKind::ImpureNonLocal,
            (false, true) => VariableKind::PureNonLocal,
            (true, true) => VariableKind::PureLocal,
            (true, false) => VariableKind::UnknownLocal,
        }
    }

    pub fn is_pure(self) -> bool {
        matches!(self, VariableKind::PureLocal | VariableKind::PureNonLocal)
    }

    pub fn is_local(self) -> bool {
        matches!(self, VariableKind::PureLocal | VariableKind::UnknownLocal)
    }
}

/// Named binding visible at runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub real: bool,
    pub handle: NumberHandle,
}

/// Variable as seen by the compiler, with its classification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompilerVariable {
    pub name: String,
    pub real: bool,
    pub kind: VariableKind,
    pub handle: NumberHandle,
    pub location: SourceLocation,
}

impl CompilerVariable {
    pub fn to_variable(&self) -> Variable {
        Variable {
            name: self.name.clone(),
            real: self.real,
            handle: self.handle,
        }
    }
}

/// Ordered list of variable slots.
///
/// The orbit's state variables occupy the first positions of the scope the
/// color program sees; state crosses the orbit/color boundary by position.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    slots: Vec<Variable>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a slot; returns its position.
    pub fn push(&mut self, variable: Variable) -> usize {
        self.slots.push(variable);
        self.slots.len() - 1
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|v| v.name == name)
    }

    pub fn get(&self, position: usize) -> Option<&Variable> {
        self.slots.get(position)
    }

    pub fn find(&self, name: &str) -> Option<&Variable> {
        self.slots.iter().find(|v| v.name == name)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.slots.iter()
    }
}
