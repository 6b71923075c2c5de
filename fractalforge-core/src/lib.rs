pub mod ast;
pub mod color;
pub mod complex;
pub mod config;
pub mod diagnostics;
pub mod functions;
pub mod number_pool;
pub mod palette;
pub mod pixel_rect;
pub mod tile;
pub mod trap;
pub mod variable;
pub mod view;

pub use ast::{
    AstColor, AstFractal, AstOrbit, AstOrbitLoop, AstOrbitTrap, AstPalette, AstPaletteElement,
    AstRegion, AstRule, AstStateVariable, BinaryOp, ColorExpression, ColorExpressionKind,
    CompareOp, Condition, ConditionKind, Expression, ExpressionKind, SourceLocation, Statement,
    StatementKind,
};
pub use color::Color;
pub use complex::{ComplexNumber, MutableNumber};
pub use config::{
    ConfigError, ProgressMode, RenderHints, RendererConfig, RendererKind, RENDERER_CONFIG,
};
pub use diagnostics::{Diagnostic, DiagnosticKind, ErrorList, EvaluationError, ParseOutcome};
pub use functions::Function;
pub use number_pool::{NumberHandle, NumberPool};
pub use palette::{Palette, PaletteElement, PaletteMapping};
pub use pixel_rect::PixelRect;
pub use tile::{Dimensions, Tile};
pub use trap::{PathOp, Trap};
pub use variable::{CompilerVariable, Scope, Variable, VariableKind};
pub use view::{PixelMapper, Region, View};
