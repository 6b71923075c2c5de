//! Name resolution, type checking and variable classification.
//!
//! Turns the AST of one fractal into [`OrbitIr`] and [`ColorIr`]. Every
//! problem found is reported; resolution does not stop at the first error.
//! The namespace of each program is flat: a variable is declared by its
//! first assignment in source order (begin block, loop body, loop condition,
//! end block for orbits; init block then rules for colors) and is visible
//! everywhere after that.

use super::ir::{
    ArithOp, ColorExpr, ColorIr, Cond, Expr, ExprKind, OrbitIr, Rule, StateSlot, Stmt,
    BUILTIN_REGISTERS, N, W, X,
};
use fractalforge_core::{
    AstColor, AstOrbit, AstPalette, BinaryOp, Color, ColorExpression, ColorExpressionKind,
    CompilerVariable, Condition, ConditionKind, Diagnostic, Expression, ExpressionKind, Function,
    NumberHandle, Palette, PaletteElement, PathOp, Region, Scope, SourceLocation, Statement,
    StatementKind, Trap, Variable, VariableKind,
};
use std::collections::{HashMap, HashSet};

struct VarInfo {
    name: String,
    real: bool,
    local: bool,
    location: SourceLocation,
    assignments: u32,
    /// Declared by an assignment outside any conditional.
    unconditional: bool,
    /// Variables read by the declaring assignment.
    deps: Vec<usize>,
    /// Builtins and imported state change per pixel and are never pure.
    fixed: bool,
    writable: bool,
}

#[derive(Default)]
struct Resolver {
    diagnostics: Vec<Diagnostic>,
    vars: Vec<VarInfo>,
    by_name: HashMap<String, usize>,
    /// Names assigned anywhere, to tell "used before declaration" apart.
    assigned: HashSet<String>,
    traps: HashMap<String, usize>,
    palettes: HashMap<String, usize>,
    reads: Vec<usize>,
    local: bool,
    conditional_depth: u32,
    uses_time: bool,
}

impl Resolver {
    fn error(&mut self, location: SourceLocation, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::compile(location, message));
    }

    fn declare(&mut self, name: &str, real: bool, location: SourceLocation, fixed: bool) -> usize {
        let id = self.vars.len();
        self.vars.push(VarInfo {
            name: name.to_string(),
            real,
            local: self.local,
            location,
            assignments: 0,
            unconditional: self.conditional_depth == 0,
            deps: Vec::new(),
            fixed,
            writable: true,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    fn collect_assigned(&mut self, statements: &[Statement]) {
        for statement in statements {
            match &statement.kind {
                StatementKind::Assign { name, .. } => {
                    self.assigned.insert(name.clone());
                }
                StatementKind::If {
                    then, otherwise, ..
                } => {
                    self.collect_assigned(then);
                    self.collect_assigned(otherwise);
                }
                StatementKind::Stop => {}
            }
        }
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn expr(&mut self, expression: &Expression) -> Option<Expr> {
        let location = expression.location;
        match &expression.kind {
            ExpressionKind::Number(value) => Some(Expr::constant(*value)),
            ExpressionKind::Time => {
                self.uses_time = true;
                Some(Expr::new(ExprKind::Time, true))
            }
            ExpressionKind::Variable(name) => match self.by_name.get(name) {
                Some(&id) => {
                    self.reads.push(id);
                    Some(Expr::new(
                        ExprKind::Load(NumberHandle(id as u32)),
                        self.vars[id].real,
                    ))
                }
                None => {
                    if self.assigned.contains(name) {
                        self.error(location, format!("variable `{}` used before declaration", name));
                    } else {
                        self.error(location, format!("unknown variable `{}`", name));
                    }
                    None
                }
            },
            ExpressionKind::Negate(inner) => {
                let inner = self.expr(inner)?;
                let real = inner.real;
                Some(Expr::new(ExprKind::Neg(Box::new(inner)), real))
            }
            ExpressionKind::Binary(op, left, right) => {
                let left = self.expr(left);
                let right = self.expr(right);
                let (left, right) = (left?, right?);
                let real = left.real && right.real;
                let arith = match op {
                    BinaryOp::Add => ArithOp::Add,
                    BinaryOp::Sub => ArithOp::Sub,
                    BinaryOp::Mul => ArithOp::Mul,
                    BinaryOp::Div => ArithOp::Div,
                    BinaryOp::Pow => {
                        return Some(Expr::new(
                            ExprKind::Call(Function::Pow, vec![left, right]),
                            real,
                        ))
                    }
                };
                Some(Expr::new(
                    ExprKind::Arith(arith, Box::new(left), Box::new(right)),
                    real,
                ))
            }
            ExpressionKind::Function(function, arguments) => {
                let resolved: Vec<Option<Expr>> = arguments.iter().map(|a| self.expr(a)).collect();
                if arguments.len() != function.arity() {
                    self.error(
                        location,
                        format!(
                            "function `{}` expects {} argument(s), got {}",
                            function.name(),
                            function.arity(),
                            arguments.len()
                        ),
                    );
                    return None;
                }
                let arguments: Vec<Expr> = resolved.into_iter().collect::<Option<_>>()?;
                let reals: Vec<bool> = arguments.iter().map(|a| a.real).collect();
                if function.requires_real_arguments() && reals.iter().any(|r| !r) {
                    self.error(
                        location,
                        format!("function `{}` needs real arguments", function.name()),
                    );
                    return None;
                }
                let real = function.returns_real(&reals);
                Some(Expr::new(ExprKind::Call(*function, arguments), real))
            }
        }
    }

    fn real_expr(&mut self, expression: &Expression, what: &str) -> Option<Expr> {
        let expr = self.expr(expression)?;
        if !expr.real {
            self.error(expression.location, format!("{} must be a real expression", what));
            return None;
        }
        Some(expr)
    }

    // ------------------------------------------------------------------------
    // Conditions and statements
    // ------------------------------------------------------------------------

    fn cond(&mut self, condition: &Condition) -> Option<Cond> {
        match &condition.kind {
            ConditionKind::Compare(op, left, right) => {
                let left = self.real_expr(left, "comparison operand");
                let right = self.real_expr(right, "comparison operand");
                Some(Cond::Compare(*op, left?, right?))
            }
            ConditionKind::And(l, r) => {
                let (l, r) = (self.cond(l), self.cond(r));
                Some(Cond::And(Box::new(l?), Box::new(r?)))
            }
            ConditionKind::Or(l, r) => {
                let (l, r) = (self.cond(l), self.cond(r));
                Some(Cond::Or(Box::new(l?), Box::new(r?)))
            }
            ConditionKind::Xor(l, r) => {
                let (l, r) = (self.cond(l), self.cond(r));
                Some(Cond::Xor(Box::new(l?), Box::new(r?)))
            }
            ConditionKind::Not(inner) => Some(Cond::Not(Box::new(self.cond(inner)?))),
            ConditionKind::Literal(value) => Some(Cond::Literal(*value)),
            ConditionKind::TrapContains { trap, point } => {
                let point = self.expr(point);
                match self.traps.get(trap) {
                    Some(&index) => Some(Cond::Trap(index, point?)),
                    None => {
                        self.error(condition.location, format!("unknown trap `{}`", trap));
                        None
                    }
                }
            }
        }
    }

    fn statements(&mut self, statements: &[Statement]) -> Vec<Stmt> {
        statements.iter().filter_map(|s| self.statement(s)).collect()
    }

    fn statement(&mut self, statement: &Statement) -> Option<Stmt> {
        let location = statement.location;
        match &statement.kind {
            StatementKind::Assign { name, real, value } => {
                self.reads.clear();
                let value = self.expr(value);
                let deps = std::mem::take(&mut self.reads);
                let value = value?;

                let id = match self.by_name.get(name) {
                    Some(&id) => {
                        if real.is_some() {
                            self.error(location, format!("variable `{}` is already declared", name));
                            return None;
                        }
                        if !self.vars[id].writable {
                            self.error(location, format!("cannot assign to builtin `{}`", name));
                            return None;
                        }
                        id
                    }
                    None => {
                        let declared_real = real.unwrap_or(value.real);
                        let id = self.declare(name, declared_real, location, false);
                        self.vars[id].deps = deps;
                        id
                    }
                };
                if self.vars[id].real && !value.real {
                    self.error(
                        location,
                        format!("complex value assigned to real variable `{}`", name),
                    );
                    return None;
                }
                self.vars[id].assignments += 1;
                Some(Stmt::Assign(NumberHandle(id as u32), value))
            }
            StatementKind::If {
                condition,
                then,
                otherwise,
            } => {
                let condition = self.cond(condition);
                self.conditional_depth += 1;
                let then = self.statements(then);
                let otherwise = self.statements(otherwise);
                self.conditional_depth -= 1;
                Some(Stmt::If(condition?, then, otherwise))
            }
            StatementKind::Stop => Some(Stmt::Stop),
        }
    }

    // ------------------------------------------------------------------------
    // Classification and register layout
    // ------------------------------------------------------------------------

    /// Purity per variable: a single unconditional assignment whose inputs
    /// are constants, time and other pure variables.
    fn purity(&self) -> Vec<bool> {
        let mut pure: Vec<bool> = self
            .vars
            .iter()
            .map(|v| !v.fixed && v.assignments == 1 && v.unconditional)
            .collect();
        loop {
            let mut changed = false;
            for (i, var) in self.vars.iter().enumerate() {
                if pure[i] && var.deps.iter().any(|d| !pure[*d]) {
                    pure[i] = false;
                    changed = true;
                }
            }
            if !changed {
                return pure;
            }
        }
    }

    /// Final register of every variable: the first `keep` ids stay in
    /// place, impure variables follow, pure variables come last. Returns the
    /// mapping and the first pure register.
    fn layout(&self, pure: &[bool], keep: usize) -> (Vec<NumberHandle>, usize) {
        let mut map = vec![NumberHandle(0); self.vars.len()];
        let mut next = 0u32;
        for id in 0..keep.min(self.vars.len()) {
            map[id] = NumberHandle(next);
            next += 1;
        }
        for (id, _) in self.vars.iter().enumerate().skip(keep).filter(|(id, _)| !pure[*id]) {
            map[id] = NumberHandle(next);
            next += 1;
        }
        let pure_start = next as usize;
        for (id, _) in self.vars.iter().enumerate().skip(keep).filter(|(id, _)| pure[*id]) {
            map[id] = NumberHandle(next);
            next += 1;
        }
        (map, pure_start)
    }

    fn compiler_variables(&self, pure: &[bool], map: &[NumberHandle]) -> Vec<CompilerVariable> {
        self.vars
            .iter()
            .enumerate()
            .map(|(id, v)| CompilerVariable {
                name: v.name.clone(),
                real: v.real,
                kind: VariableKind::classify(v.local, pure[id]),
                handle: map[id],
                location: v.location,
            })
            .collect()
    }
}

/// Move top-level assignments to pure registers out of `block`.
fn hoist(block: &mut Vec<Stmt>, pure_start: usize, prelude: &mut Vec<Stmt>) {
    let (hoisted, kept): (Vec<Stmt>, Vec<Stmt>) = std::mem::take(block)
        .into_iter()
        .partition(|s| matches!(s, Stmt::Assign(h, _) if h.index() >= pure_start));
    prelude.extend(hoisted);
    *block = kept;
}

fn breaks_conjugation(e: &Expr) -> bool {
    match &e.kind {
        ExprKind::Const(c) => !c.is_real(),
        ExprKind::Call(f, args) => !f.preserves_conjugation() && !Expr::uses_real_form(args),
        _ => false,
    }
}

/// Tracks whether a program commutes with complex conjugation. Complex
/// constants, sign-flipping functions and orbit traps break the symmetry.
#[derive(Default)]
struct Symmetry {
    broken: bool,
}

impl Symmetry {
    fn expr(&mut self, e: &Expr) {
        e.visit(&mut |e| self.broken |= breaks_conjugation(e));
    }

    fn cond(&mut self, c: &Cond) {
        self.broken |= c.uses_trap();
        c.visit_exprs(&mut |e| self.broken |= breaks_conjugation(e));
    }

    fn stmts<'a>(&mut self, stmts: impl IntoIterator<Item = &'a Stmt>) {
        for s in stmts {
            self.broken |= s.uses_trap();
            s.visit_exprs(&mut |e| self.broken |= breaks_conjugation(e));
        }
    }

    fn color(&mut self, c: &ColorExpr) {
        c.visit_exprs(&mut |e| self.broken |= breaks_conjugation(e));
    }

    fn holds(&self) -> bool {
        !self.broken
    }
}

fn build_traps(resolver: &mut Resolver, orbit: &AstOrbit) -> Vec<Trap> {
    let mut traps = Vec::with_capacity(orbit.traps.len());
    for ast in &orbit.traps {
        if resolver.traps.contains_key(&ast.name) {
            resolver.error(ast.location, format!("duplicate trap `{}`", ast.name));
            continue;
        }
        let non_finite_arc = ast.path.iter().any(|op| match op {
            PathOp::ArcTo { angle, .. } | PathOp::ArcRel { angle, .. } => !angle.is_finite(),
            _ => false,
        });
        if non_finite_arc {
            resolver.error(
                ast.location,
                format!("trap `{}` has a non-finite arc angle", ast.name),
            );
        }
        let trap = Trap::from_ops(ast.name.clone(), ast.center, &ast.path);
        if !trap.is_closed() {
            resolver.error(ast.location, format!("trap `{}` path is not closed", ast.name));
        }
        resolver.traps.insert(ast.name.clone(), traps.len());
        traps.push(trap);
    }
    traps
}

pub(crate) fn resolve_orbit(orbit: &AstOrbit) -> Result<OrbitIr, Vec<Diagnostic>> {
    let mut r = Resolver::default();
    let traps = build_traps(&mut r, orbit);

    let x = r.declare("x", false, SourceLocation::default(), true);
    let w = r.declare("w", false, SourceLocation::default(), true);
    let n = r.declare("n", true, SourceLocation::default(), true);
    debug_assert_eq!((x, w, n), (X.index(), W.index(), N.index()));
    r.vars[w].writable = false;
    r.vars[n].writable = false;

    r.collect_assigned(&orbit.begin);
    r.collect_assigned(&orbit.orbit_loop.statements);
    r.collect_assigned(&orbit.end);

    let lp = &orbit.orbit_loop;
    if lp.end < lp.begin {
        r.error(
            lp.location,
            format!("loop end {} is before loop begin {}", lp.end, lp.begin),
        );
    }

    let mut begin = r.statements(&orbit.begin);
    r.local = true;
    let mut body = r.statements(&lp.statements);
    let condition = r.cond(&lp.condition);
    r.local = false;
    let mut end = r.statements(&orbit.end);

    // State list: exported by position.
    let mut seen = HashSet::new();
    let mut state_ids = Vec::new();
    for state in &orbit.states {
        if !seen.insert(state.name.as_str()) {
            r.error(state.location, format!("duplicate state `{}`", state.name));
            continue;
        }
        if state.name == "w" {
            r.error(state.location, "state `w` shadows the builtin constant");
            continue;
        }
        match r.by_name.get(&state.name) {
            Some(&id) if state.real && !r.vars[id].real => r.error(
                state.location,
                format!("state `{}` is declared real but holds a complex value", state.name),
            ),
            Some(&id) => state_ids.push((id, state.real)),
            None => r.error(
                state.location,
                format!("state `{}` is never assigned", state.name),
            ),
        }
    }

    let condition = match condition {
        Some(c) if r.diagnostics.is_empty() => c,
        _ => return Err(r.diagnostics),
    };

    let pure = r.purity();
    let (map, pure_start) = r.layout(&pure, BUILTIN_REGISTERS as usize);
    let remap = |h: NumberHandle| map[h.index()];
    let mut condition = condition;
    for s in begin.iter_mut().chain(body.iter_mut()).chain(end.iter_mut()) {
        s.remap(&remap);
    }
    condition.remap(&remap);

    let mut prelude = Vec::new();
    hoist(&mut begin, pure_start, &mut prelude);
    hoist(&mut body, pure_start, &mut prelude);
    hoist(&mut end, pure_start, &mut prelude);

    let mut states = Scope::new();
    for (id, real) in state_ids {
        states.push(Variable {
            name: r.vars[id].name.clone(),
            real,
            handle: map[id],
        });
    }

    let mut symmetry = Symmetry::default();
    symmetry.stmts(prelude.iter().chain(&begin).chain(&body).chain(&end));
    symmetry.cond(&condition);

    Ok(OrbitIr {
        registers: r.vars.len(),
        pure_start,
        variables: r.compiler_variables(&pure, &map),
        prelude,
        begin,
        body,
        condition,
        end,
        loop_begin: lp.begin,
        loop_end: lp.end,
        states,
        traps,
        region: Region::from(&orbit.region),
        uses_time: r.uses_time,
        conjugation_symmetric: symmetry.holds(),
    })
}

fn build_palette(r: &mut Resolver, ast: &AstPalette) -> Option<Palette> {
    if ast.elements.is_empty() {
        r.error(ast.location, format!("palette `{}` is empty", ast.name));
        return None;
    }
    let mut elements = Vec::with_capacity(ast.elements.len());
    for element in &ast.elements {
        if element.steps == 0 {
            r.error(
                element.location,
                format!("palette `{}` has an element with zero steps", ast.name),
            );
            return None;
        }
        elements.push(PaletteElement::new(
            Color::from_argb(element.begin),
            Color::from_argb(element.end),
            element.steps,
            element.mapping,
        ));
    }
    Some(Palette::build(elements))
}

fn color_expr(r: &mut Resolver, color: &ColorExpression) -> Option<ColorExpr> {
    match &color.kind {
        ColorExpressionKind::Literal(argb) => Some(ColorExpr::Literal(Color::from_argb(*argb))),
        ColorExpressionKind::Palette { name, index } => {
            let index = r.real_expr(index, "palette index");
            match r.palettes.get(name) {
                Some(&palette) => Some(ColorExpr::Palette(palette, index?)),
                None => {
                    r.error(color.location, format!("unknown palette `{}`", name));
                    None
                }
            }
        }
        ColorExpressionKind::Components(channels) => {
            if channels.len() != 3 && channels.len() != 4 {
                r.error(
                    color.location,
                    format!("color needs 3 or 4 components, got {}", channels.len()),
                );
                return None;
            }
            let resolved: Vec<Option<Expr>> = channels
                .iter()
                .map(|c| r.real_expr(c, "color component"))
                .collect();
            let mut resolved: Vec<Expr> = resolved.into_iter().collect::<Option<_>>()?;
            if resolved.len() == 3 {
                resolved.insert(0, Expr::constant(1.0.into()));
            }
            Some(ColorExpr::Components(resolved.try_into().ok()?))
        }
    }
}

pub(crate) fn resolve_color(color: &AstColor, orbit: &OrbitIr) -> Result<ColorIr, Vec<Diagnostic>> {
    let mut r = Resolver::default();

    for (index, trap) in orbit.traps.iter().enumerate() {
        r.traps.insert(trap.name().to_string(), index);
    }

    let mut palettes = Vec::new();
    let mut palette_names = Vec::new();
    for ast in &color.palettes {
        if r.palettes.contains_key(&ast.name) {
            r.error(ast.location, format!("duplicate palette `{}`", ast.name));
            continue;
        }
        if let Some(palette) = build_palette(&mut r, ast) {
            r.palettes.insert(ast.name.clone(), palettes.len());
            palettes.push(palette);
            palette_names.push(ast.name.clone());
        }
    }

    // Orbit state arrives first, by position.
    let mut import_ids = Vec::new();
    for (position, state) in orbit.states.iter().enumerate() {
        let id = r.declare(&state.name, state.real, SourceLocation::default(), true);
        import_ids.push((id, position));
    }
    let imported = import_ids.len();

    r.collect_assigned(&color.init);
    let mut init = r.statements(&color.init);
    let background = color_expr(&mut r, &color.background);

    r.local = true;
    let mut rules = Vec::with_capacity(color.rules.len());
    for rule in &color.rules {
        let condition = r.cond(&rule.condition);
        let opacity = r.real_expr(&rule.opacity, "opacity");
        let shade = color_expr(&mut r, &rule.color);
        if let (Some(condition), Some(opacity), Some(color)) = (condition, opacity, shade) {
            rules.push(Rule {
                condition,
                opacity,
                color,
            });
        }
    }

    let mut background = match background {
        Some(b) if r.diagnostics.is_empty() => b,
        _ => return Err(r.diagnostics),
    };

    let pure = r.purity();
    let (map, pure_start) = r.layout(&pure, imported);
    let remap = |h: NumberHandle| map[h.index()];
    init.iter_mut().for_each(|s| s.remap(&remap));
    background.remap(&remap);
    for rule in &mut rules {
        rule.condition.remap(&remap);
        rule.opacity.remap(&remap);
        rule.color.remap(&remap);
    }

    let mut prelude = Vec::new();
    hoist(&mut init, pure_start, &mut prelude);

    let imports = import_ids
        .into_iter()
        .map(|(id, position)| StateSlot {
            name: r.vars[id].name.clone(),
            real: r.vars[id].real,
            handle: map[id],
            position,
        })
        .collect();

    let mut symmetry = Symmetry::default();
    symmetry.stmts(prelude.iter().chain(&init));
    symmetry.color(&background);
    for rule in &rules {
        symmetry.cond(&rule.condition);
        symmetry.expr(&rule.opacity);
        symmetry.color(&rule.color);
    }

    Ok(ColorIr {
        registers: r.vars.len(),
        pure_start,
        variables: r.compiler_variables(&pure, &map),
        prelude,
        init,
        background,
        rules,
        imports,
        palettes,
        palette_names,
        traps: orbit.traps.clone(),
        uses_time: r.uses_time,
        conjugation_symmetric: symmetry.holds(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fractalforge_core::{AstFractal, CompareOp};

    fn mandelbrot() -> AstFractal {
        AstFractal::mandelbrot(50)
    }

    fn messages(errors: &[Diagnostic]) -> Vec<String> {
        errors.iter().map(|d| d.message.clone()).collect()
    }

    #[test]
    fn mandelbrot_resolves_with_builtin_layout() {
        let fractal = mandelbrot();
        let orbit = resolve_orbit(&fractal.orbit).unwrap();
        assert_eq!(orbit.registers, 3);
        assert_eq!(orbit.states.len(), 2);
        assert_eq!(orbit.states.get(0).unwrap().handle, X);
        assert_eq!(orbit.states.get(1).unwrap().handle, N);
        assert!(orbit.conjugation_symmetric);
        assert!(!orbit.uses_time);

        let color = resolve_color(&fractal.color, &orbit).unwrap();
        assert_eq!(color.imports.len(), 2);
        assert_eq!(color.imports[1].name, "n");
        assert_eq!(color.palettes.len(), 1);
    }

    #[test]
    fn pure_assignments_move_to_prelude() {
        let mut fractal = mandelbrot();
        fractal.orbit.begin = vec![
            Statement::assign("k", Expression::mul(Expression::number(2.0), Expression::time())),
            Statement::assign("z", Expression::var("x")),
        ];
        fractal.orbit.orbit_loop.statements.push(Statement::assign(
            "x",
            Expression::add(Expression::var("x"), Expression::var("k")),
        ));
        let orbit = resolve_orbit(&fractal.orbit).unwrap();

        assert_eq!(orbit.prelude.len(), 1);
        assert_eq!(orbit.begin.len(), 1, "only the impure assignment stays");
        assert!(orbit.uses_time);

        let k = orbit.variables.iter().find(|v| v.name == "k").unwrap();
        let z = orbit.variables.iter().find(|v| v.name == "z").unwrap();
        assert_eq!(k.kind, VariableKind::PureNonLocal);
        assert_eq!(z.kind, VariableKind::ImpureNonLocal);
        assert!(k.handle.index() >= orbit.pure_start);
        assert!(z.handle.index() < orbit.pure_start);
    }

    #[test]
    fn reassigned_or_conditional_variables_stay_impure() {
        let mut fractal = mandelbrot();
        fractal.orbit.begin = vec![
            Statement::assign("a", Expression::number(1.0)),
            Statement::assign("b", Expression::var("a")),
            Statement::assign("a", Expression::number(3.0)),
        ];
        fractal.orbit.orbit_loop.statements.push(Statement::if_then(
            Condition::literal(true),
            vec![Statement::assign("c", Expression::number(1.0))],
            Vec::new(),
        ));
        let orbit = resolve_orbit(&fractal.orbit).unwrap();
        let kind = |name: &str| orbit.variables.iter().find(|v| v.name == name).unwrap().kind;
        assert_eq!(kind("a"), VariableKind::ImpureNonLocal);
        assert_eq!(kind("b"), VariableKind::ImpureNonLocal);
        assert_eq!(kind("c"), VariableKind::UnknownLocal);
        assert!(orbit.prelude.is_empty());
    }

    #[test]
    fn all_errors_are_reported() {
        let mut fractal = mandelbrot();
        fractal.orbit.begin = vec![
            Statement::assign("a", Expression::var("later")),
            Statement::declare("r", true, Expression::var("x")),
            Statement::assign("q", Expression::call(Function::Pow, vec![Expression::var("x")])),
            Statement::assign("n", Expression::number(1.0)),
            Statement::assign("later", Expression::number(0.0)),
        ];
        fractal.orbit.orbit_loop.condition = Condition::compare(
            CompareOp::Gt,
            Expression::var("x"),
            Expression::number(4.0),
        );
        fractal.orbit.orbit_loop.end = 0;
        fractal.orbit.orbit_loop.begin = 5;

        let errors = resolve_orbit(&fractal.orbit).unwrap_err();
        let messages = messages(&errors);
        assert!(messages.contains(&"variable `later` used before declaration".to_string()));
        assert!(messages.contains(&"complex value assigned to real variable `r`".to_string()));
        assert!(messages.contains(&"function `pow` expects 2 argument(s), got 1".to_string()));
        assert!(messages.contains(&"cannot assign to builtin `n`".to_string()));
        assert!(messages.contains(&"comparison operand must be a real expression".to_string()));
        assert!(messages.contains(&"loop end 0 is before loop begin 5".to_string()));
    }

    #[test]
    fn state_declarations_are_checked() {
        let mut fractal = mandelbrot();
        fractal.orbit.states.push(fractalforge_core::AstStateVariable::new("x", false));
        fractal.orbit.states.push(fractalforge_core::AstStateVariable::new("ghost", true));
        fractal.orbit.states.push(fractalforge_core::AstStateVariable::new("w", false));
        let messages = messages(&resolve_orbit(&fractal.orbit).unwrap_err());
        assert_eq!(
            messages,
            vec![
                "duplicate state `x`".to_string(),
                "state `ghost` is never assigned".to_string(),
                "state `w` shadows the builtin constant".to_string(),
            ]
        );
    }

    #[test]
    fn open_trap_and_unknown_trap_are_errors() {
        let mut fractal = mandelbrot();
        fractal.orbit.traps.push(fractalforge_core::AstOrbitTrap {
            name: "line".into(),
            center: fractalforge_core::ComplexNumber::ZERO,
            path: vec![
                fractalforge_core::PathOp::MoveTo(0.0.into()),
                fractalforge_core::PathOp::LineTo(1.0.into()),
            ],
            location: SourceLocation::default(),
        });
        fractal.orbit.orbit_loop.condition = Condition::trap("circle", Expression::var("x"));
        let messages = messages(&resolve_orbit(&fractal.orbit).unwrap_err());
        assert!(messages.contains(&"trap `line` path is not closed".to_string()));
        assert!(messages.contains(&"unknown trap `circle`".to_string()));
    }

    #[test]
    fn non_finite_arc_angle_is_an_error() {
        let mut fractal = mandelbrot();
        fractal.orbit.traps.push(fractalforge_core::AstOrbitTrap {
            name: "spin".into(),
            center: fractalforge_core::ComplexNumber::ZERO,
            path: vec![
                PathOp::MoveTo(1.0.into()),
                PathOp::ArcTo {
                    center: 0.0.into(),
                    angle: f64::INFINITY,
                },
                PathOp::Close,
            ],
            location: SourceLocation::new(4, 3, 60, 12),
        });
        let errors = resolve_orbit(&fractal.orbit).unwrap_err();
        assert_eq!(
            messages(&errors),
            vec!["trap `spin` has a non-finite arc angle".to_string()]
        );
        assert_eq!(errors[0].line, 4);
    }

    #[test]
    fn color_errors_cover_palettes_and_types() {
        let mut fractal = mandelbrot();
        let orbit = resolve_orbit(&fractal.orbit).unwrap();
        fractal.color.palettes.push(AstPalette {
            name: "empty".into(),
            elements: Vec::new(),
            location: SourceLocation::default(),
        });
        fractal.color.rules.push(fractalforge_core::AstRule::new(
            Condition::literal(true),
            Expression::var("x"),
            ColorExpression::palette("missing", Expression::var("n")),
        ));
        fractal.color.rules.push(fractalforge_core::AstRule::new(
            Condition::literal(true),
            Expression::number(1.0),
            ColorExpression::components(vec![Expression::number(1.0)]),
        ));
        let messages = messages(&resolve_color(&fractal.color, &orbit).unwrap_err());
        assert!(messages.contains(&"palette `empty` is empty".to_string()));
        assert!(messages.contains(&"opacity must be a real expression".to_string()));
        assert!(messages.contains(&"unknown palette `missing`".to_string()));
        assert!(messages.contains(&"color needs 3 or 4 components, got 1".to_string()));
    }

    #[test]
    fn complex_constants_and_im_break_symmetry() {
        let mut fractal = mandelbrot();
        fractal.orbit.orbit_loop.statements = vec![Statement::assign(
            "x",
            Expression::add(
                Expression::mul(Expression::var("x"), Expression::var("x")),
                Expression::complex(0.0, 0.5),
            ),
        )];
        assert!(!resolve_orbit(&fractal.orbit).unwrap().conjugation_symmetric);

        let mut fractal = mandelbrot();
        fractal.color.rules[0].opacity =
            Expression::call(Function::Im, vec![Expression::var("x")]);
        let orbit = resolve_orbit(&fractal.orbit).unwrap();
        assert!(orbit.conjugation_symmetric);
        assert!(!resolve_color(&fractal.color, &orbit).unwrap().conjugation_symmetric);
    }

    #[test]
    fn componentwise_functions_break_symmetry_on_complex_arguments() {
        for function in [Function::Abs, Function::Floor, Function::Ceil] {
            let mut fractal = mandelbrot();
            let folded = Expression::call(function, vec![Expression::var("x")]);
            fractal.orbit.orbit_loop.statements = vec![Statement::assign(
                "x",
                Expression::add(Expression::mul(folded.clone(), folded), Expression::var("w")),
            )];
            let orbit = resolve_orbit(&fractal.orbit).unwrap();
            assert!(!orbit.conjugation_symmetric, "{} kept symmetry", function.name());
        }

        // On real values they are harmless.
        let mut fractal = mandelbrot();
        fractal.orbit.orbit_loop.statements.push(Statement::assign(
            "k",
            Expression::call(Function::Abs, vec![Expression::var("n")]),
        ));
        assert!(resolve_orbit(&fractal.orbit).unwrap().conjugation_symmetric);
    }
}
