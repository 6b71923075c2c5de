//! Structured error reporting shared by parsing, compilation and rendering.

use crate::ast::{AstFractal, SourceLocation};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    Parse,
    Compile,
    Evaluation,
    Render,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::Parse => "parse",
            DiagnosticKind::Compile => "compile",
            DiagnosticKind::Evaluation => "evaluation",
            DiagnosticKind::Render => "render",
        };
        f.write_str(name)
    }
}

/// One reported problem with its position in the source, when known.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub line: u32,
    pub column: u32,
    pub offset: u32,
    pub length: u32,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, location: SourceLocation, message: impl Into<String>) -> Self {
        Self {
            kind,
            line: location.line,
            column: location.column,
            offset: location.offset,
            length: location.length,
            message: message.into(),
        }
    }

    pub fn parse(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Parse, location, message)
    }

    pub fn compile(location: SourceLocation, message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Compile, location, message)
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Evaluation, SourceLocation::default(), message)
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Render, SourceLocation::default(), message)
    }

    pub fn location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column, self.offset, self.length)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error [{}:{}]: {}",
            self.kind, self.line, self.column, self.message
        )
    }
}

/// What the external parser hands over: a tree, or the reasons there is none.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseOutcome {
    pub fractal: Option<AstFractal>,
    pub errors: Vec<Diagnostic>,
}

impl ParseOutcome {
    pub fn parsed(fractal: AstFractal) -> Self {
        Self {
            fractal: Some(fractal),
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<Diagnostic>) -> Self {
        Self {
            fractal: None,
            errors,
        }
    }
}

/// Runtime fault inside a program instance.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("palette `{palette}` indexed with non-finite value {index}")]
    NonFiniteIndex { palette: String, index: f64 },

    #[error("state `{name}` is declared real but received {value}")]
    NotReal { name: String, value: crate::ComplexNumber },

    #[error("state slot {position} is missing (got {available} values)")]
    UnknownSlot { position: usize, available: usize },

    #[error("native program returned status {0}")]
    Native(i32),
}

impl EvaluationError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::evaluation(self.to_string())
    }
}

impl From<EvaluationError> for Diagnostic {
    fn from(error: EvaluationError) -> Self {
        error.to_diagnostic()
    }
}

/// Diagnostics collected over one render request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorList(Vec<Diagnostic>);

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        !self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(move |d| d.kind == kind)
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.0
    }
}

impl Extend<Diagnostic> for ErrorList {
    fn extend<T: IntoIterator<Item = Diagnostic>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}
