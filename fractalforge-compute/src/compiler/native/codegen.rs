//! Lowering of resolved programs to Cranelift IR.
//!
//! Every value is a pair of `f64` SSA values, mirroring the interpreter which
//! evaluates real expressions as complex numbers with a zero imaginary part.
//! Arithmetic is emitted inline in the same operation order as the
//! `ComplexNumber` operators; everything else goes through the helpers in
//! [`super::context`].

use super::context::{symbols, NativeContext};
use super::error::NativeError;
use crate::compiler::ir::{ArithOp, ColorExpr, Cond, Expr, ExprKind, Rule, Stmt};
use cranelift::prelude::{
    settings, types, AbiParam, Block, Configurable, FloatCC, FunctionBuilder,
    FunctionBuilderContext, InstBuilder, IntCC, MemFlags, Type, Value,
};
use cranelift_codegen::ir::{FuncRef, Function, UserFuncName};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, FuncId, Linkage, Module};
use fractalforge_core::{CompareOp, NumberHandle};
use std::mem::offset_of;

type Pair = (Value, Value);

/// Bytes per register: real and imaginary `f64`.
const REGISTER_SIZE: i32 = 16;

fn float_cc(op: CompareOp) -> FloatCC {
    match op {
        CompareOp::Gt => FloatCC::GreaterThan,
        CompareOp::Lt => FloatCC::LessThan,
        CompareOp::Ge => FloatCC::GreaterThanOrEqual,
        CompareOp::Le => FloatCC::LessThanOrEqual,
        CompareOp::Eq => FloatCC::Equal,
        CompareOp::Ne => FloatCC::NotEqual,
    }
}

fn field(offset: usize) -> i32 {
    offset as i32
}

// ============================================================================
// Helper declarations
// ============================================================================

#[derive(Clone, Copy)]
struct Helpers {
    real: FuncId,
    complex: FuncId,
    trap: FuncId,
    components: FuncId,
    palette: FuncId,
    base: FuncId,
    blend: FuncId,
}

#[derive(Clone, Copy)]
struct HelperRefs {
    real: FuncRef,
    complex: FuncRef,
    trap: FuncRef,
    components: FuncRef,
    palette: FuncRef,
    base: FuncRef,
    blend: FuncRef,
}

impl Helpers {
    fn declare(module: &mut JITModule) -> Result<Self, NativeError> {
        let ptr = module.target_config().pointer_type();
        let f64 = types::F64;
        let i32 = types::I32;
        let mut declare = |name: &str, params: &[Type], returns: &[Type]| {
            let mut sig = module.make_signature();
            sig.params.extend(params.iter().map(|t| AbiParam::new(*t)));
            sig.returns.extend(returns.iter().map(|t| AbiParam::new(*t)));
            module.declare_function(name, Linkage::Import, &sig)
        };
        Ok(Self {
            real: declare("ff_real", &[i32, f64, f64], &[f64])?,
            complex: declare("ff_complex", &[ptr, i32, f64, f64, f64, f64], &[])?,
            trap: declare("ff_trap", &[ptr, i32, f64, f64], &[i32])?,
            components: declare("ff_color_components", &[ptr, f64, f64, f64, f64], &[])?,
            palette: declare("ff_color_palette", &[ptr, i32, f64], &[i32])?,
            base: declare("ff_color_base", &[ptr], &[])?,
            blend: declare("ff_color_blend", &[ptr, f64], &[])?,
        })
    }

    fn import(&self, module: &mut JITModule, func: &mut Function) -> HelperRefs {
        HelperRefs {
            real: module.declare_func_in_func(self.real, func),
            complex: module.declare_func_in_func(self.complex, func),
            trap: module.declare_func_in_func(self.trap, func),
            components: module.declare_func_in_func(self.components, func),
            palette: module.declare_func_in_func(self.palette, func),
            base: module.declare_func_in_func(self.base, func),
            blend: module.declare_func_in_func(self.blend, func),
        }
    }
}

// ============================================================================
// Module
// ============================================================================

pub(super) struct Codegen {
    pub module: JITModule,
    helpers: Helpers,
    builder_context: FunctionBuilderContext,
    ir: String,
}

impl Codegen {
    pub fn new() -> Result<Self, NativeError> {
        let mut flag_builder = settings::builder();
        flag_builder.set("use_colocated_libcalls", "false")?;
        flag_builder.set("is_pic", "false")?;
        flag_builder.set("opt_level", "speed")?;
        let isa_builder =
            cranelift_native::builder().map_err(|e| NativeError::UnsupportedHost(e.to_string()))?;
        let isa = isa_builder.finish(settings::Flags::new(flag_builder))?;

        let mut jit_builder = JITBuilder::with_isa(isa, default_libcall_names());
        for (name, pointer) in symbols() {
            jit_builder.symbol(name, pointer);
        }
        let mut module = JITModule::new(jit_builder);
        let helpers = Helpers::declare(&mut module)?;
        Ok(Self {
            module,
            helpers,
            builder_context: FunctionBuilderContext::new(),
            ir: String::new(),
        })
    }

    /// Textual Cranelift IR of every function defined so far.
    pub fn ir(&self) -> &str {
        &self.ir
    }

    /// Define `fn name(ctx: *mut NativeContext) -> i32` with `body` as its
    /// contents. `body` must terminate the block it is left in.
    pub fn define(
        &mut self,
        name: &str,
        body: impl FnOnce(&mut Emitter<'_>),
    ) -> Result<FuncId, NativeError> {
        let ptr = self.module.target_config().pointer_type();
        let mut sig = self.module.make_signature();
        sig.params.push(AbiParam::new(ptr));
        sig.returns.push(AbiParam::new(types::I32));
        let id = self.module.declare_function(name, Linkage::Local, &sig)?;

        let mut func = Function::with_name_signature(UserFuncName::user(0, id.as_u32()), sig);
        let helpers = self.helpers.import(&mut self.module, &mut func);
        {
            let mut builder = FunctionBuilder::new(&mut func, &mut self.builder_context);
            let entry = builder.create_block();
            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            let ctx = builder.block_params(entry)[0];
            let registers = builder.ins().load(
                ptr,
                MemFlags::trusted(),
                ctx,
                field(offset_of!(NativeContext, registers)),
            );
            let mut emitter = Emitter {
                builder,
                helpers,
                ctx,
                registers,
            };
            body(&mut emitter);
            emitter.builder.seal_all_blocks();
            emitter.builder.finalize();
        }

        self.ir.push_str(&func.display().to_string());
        self.ir.push('\n');
        log::debug!("native function {} has {} blocks", name, func.layout.blocks().count());

        let mut context = self.module.make_context();
        context.func = func;
        self.module.define_function(id, &mut context)?;
        self.module.clear_context(&mut context);
        Ok(id)
    }
}

// ============================================================================
// Function bodies
// ============================================================================

pub(super) struct Emitter<'f> {
    builder: FunctionBuilder<'f>,
    helpers: HelperRefs,
    ctx: Value,
    registers: Value,
}

impl Emitter<'_> {
    fn status(&mut self, code: i64) {
        let value = self.builder.ins().iconst(types::I32, code);
        self.builder.ins().return_(&[value]);
    }

    /// A block whose statements run to completion; `stop` ends it early.
    /// Returns 0 either way.
    pub fn plain(&mut self, stmts: &[Stmt]) {
        let done = self.builder.create_block();
        self.statements(stmts, done);
        self.builder.ins().jump(done, &[]);
        self.builder.switch_to_block(done);
        self.status(0);
    }

    /// One loop iteration: returns 1 when the body stops or the condition
    /// holds afterwards, 0 otherwise.
    pub fn step(&mut self, body: &[Stmt], condition: &Cond) {
        let stopped = self.builder.create_block();
        self.statements(body, stopped);
        let holds = self.condition(condition);
        let status = self.builder.ins().uextend(types::I32, holds);
        self.builder.ins().return_(&[status]);
        self.builder.switch_to_block(stopped);
        self.status(1);
    }

    /// Background, then every matching rule blended over it. The result
    /// lands in the context accumulator; a failed palette lookup returns 1.
    pub fn shade(&mut self, background: &ColorExpr, rules: &[Rule]) {
        self.color(background);
        let base = self.helpers.base;
        self.builder.ins().call(base, &[self.ctx]);

        for rule in rules {
            let holds = self.condition(&rule.condition);
            let apply = self.builder.create_block();
            let next = self.builder.create_block();
            self.builder.ins().brif(holds, apply, &[], next, &[]);

            self.builder.switch_to_block(apply);
            let (opacity, _) = self.expr(&rule.opacity);
            self.color(&rule.color);
            let blend = self.helpers.blend;
            self.builder.ins().call(blend, &[self.ctx, opacity]);
            self.builder.ins().jump(next, &[]);

            self.builder.switch_to_block(next);
        }
        self.status(0);
    }

    fn statements(&mut self, stmts: &[Stmt], stop: Block) {
        for stmt in stmts {
            match stmt {
                Stmt::Assign(handle, value) => {
                    let (re, im) = self.expr(value);
                    let offset = register_offset(*handle);
                    self.builder
                        .ins()
                        .store(MemFlags::trusted(), re, self.registers, offset);
                    self.builder
                        .ins()
                        .store(MemFlags::trusted(), im, self.registers, offset + 8);
                }
                Stmt::If(condition, then, otherwise) => {
                    let holds = self.condition(condition);
                    let then_block = self.builder.create_block();
                    let else_block = self.builder.create_block();
                    let merge = self.builder.create_block();
                    self.builder
                        .ins()
                        .brif(holds, then_block, &[], else_block, &[]);

                    self.builder.switch_to_block(then_block);
                    self.statements(then, stop);
                    self.builder.ins().jump(merge, &[]);

                    self.builder.switch_to_block(else_block);
                    self.statements(otherwise, stop);
                    self.builder.ins().jump(merge, &[]);

                    self.builder.switch_to_block(merge);
                }
                Stmt::Stop => {
                    self.builder.ins().jump(stop, &[]);
                    // Anything after `stop` is unreachable but still needs a block.
                    let dead = self.builder.create_block();
                    self.builder.switch_to_block(dead);
                }
            }
        }
    }

    fn condition(&mut self, condition: &Cond) -> Value {
        match condition {
            Cond::Compare(op, left, right) => {
                let (l, _) = self.expr(left);
                let (r, _) = self.expr(right);
                self.builder.ins().fcmp(float_cc(*op), l, r)
            }
            Cond::And(l, r) => {
                let (l, r) = (self.condition(l), self.condition(r));
                self.builder.ins().band(l, r)
            }
            Cond::Or(l, r) => {
                let (l, r) = (self.condition(l), self.condition(r));
                self.builder.ins().bor(l, r)
            }
            Cond::Xor(l, r) => {
                let (l, r) = (self.condition(l), self.condition(r));
                self.builder.ins().bxor(l, r)
            }
            Cond::Not(inner) => {
                let value = self.condition(inner);
                self.builder.ins().bxor_imm(value, 1)
            }
            Cond::Literal(value) => self.builder.ins().iconst(types::I8, *value as i64),
            Cond::Trap(index, point) => {
                let (re, im) = self.expr(point);
                let index = self.builder.ins().iconst(types::I32, *index as i64);
                let trap = self.helpers.trap;
                let call = self.builder.ins().call(trap, &[self.ctx, index, re, im]);
                let inside = self.builder.inst_results(call)[0];
                self.builder.ins().icmp_imm(IntCC::NotEqual, inside, 0)
            }
        }
    }

    fn color(&mut self, color: &ColorExpr) {
        match color {
            ColorExpr::Literal(c) => {
                let [a, r, g, b] = c.0.map(|channel| self.builder.ins().f64const(channel as f64));
                let components = self.helpers.components;
                self.builder.ins().call(components, &[self.ctx, a, r, g, b]);
            }
            ColorExpr::Components(channels) => {
                let mut values = [self.ctx; 5];
                for (slot, channel) in values[1..].iter_mut().zip(channels.iter()) {
                    *slot = self.expr(channel).0;
                }
                let components = self.helpers.components;
                self.builder.ins().call(components, &values);
            }
            ColorExpr::Palette(palette, index) => {
                let (index, _) = self.expr(index);
                let palette = self.builder.ins().iconst(types::I32, *palette as i64);
                let lookup = self.helpers.palette;
                let call = self.builder.ins().call(lookup, &[self.ctx, palette, index]);
                let status = self.builder.inst_results(call)[0];

                let failed = self.builder.create_block();
                let ok = self.builder.create_block();
                self.builder.ins().brif(status, failed, &[], ok, &[]);
                self.builder.switch_to_block(failed);
                self.builder.ins().return_(&[status]);
                self.builder.switch_to_block(ok);
            }
        }
    }

    fn expr(&mut self, expr: &Expr) -> Pair {
        match &expr.kind {
            ExprKind::Const(c) => (
                self.builder.ins().f64const(c.re),
                self.builder.ins().f64const(c.im),
            ),
            ExprKind::Load(handle) => {
                let offset = register_offset(*handle);
                let flags = MemFlags::trusted();
                (
                    self.builder
                        .ins()
                        .load(types::F64, flags, self.registers, offset),
                    self.builder
                        .ins()
                        .load(types::F64, flags, self.registers, offset + 8),
                )
            }
            ExprKind::Time => (
                self.builder.ins().load(
                    types::F64,
                    MemFlags::trusted(),
                    self.ctx,
                    field(offset_of!(NativeContext, time)),
                ),
                self.builder.ins().f64const(0.0),
            ),
            ExprKind::Neg(inner) => {
                let (re, im) = self.expr(inner);
                (self.builder.ins().fneg(re), self.builder.ins().fneg(im))
            }
            ExprKind::Arith(op, left, right) => {
                let a = self.expr(left);
                let b = self.expr(right);
                self.arith(*op, a, b)
            }
            ExprKind::Call(function, args) => {
                let id = self.builder.ins().iconst(types::I32, function.id() as i64);
                if Expr::uses_real_form(args) {
                    let mut operands = [id, self.zero(), self.zero()];
                    for (slot, arg) in operands[1..].iter_mut().zip(args) {
                        *slot = self.expr(arg).0;
                    }
                    let real = self.helpers.real;
                    let call = self.builder.ins().call(real, &operands);
                    (self.builder.inst_results(call)[0], self.zero())
                } else {
                    let zero = self.zero();
                    let mut operands = [self.ctx, id, zero, zero, zero, zero];
                    for (i, arg) in args.iter().take(2).enumerate() {
                        let (re, im) = self.expr(arg);
                        operands[2 + 2 * i] = re;
                        operands[3 + 2 * i] = im;
                    }
                    let complex = self.helpers.complex;
                    self.builder.ins().call(complex, &operands);
                    let result = field(offset_of!(NativeContext, result));
                    let flags = MemFlags::trusted();
                    (
                        self.builder.ins().load(types::F64, flags, self.ctx, result),
                        self.builder
                            .ins()
                            .load(types::F64, flags, self.ctx, result + 8),
                    )
                }
            }
        }
    }

    fn arith(&mut self, op: ArithOp, (a_re, a_im): Pair, (b_re, b_im): Pair) -> Pair {
        match op {
            ArithOp::Add => (
                self.builder.ins().fadd(a_re, b_re),
                self.builder.ins().fadd(a_im, b_im),
            ),
            ArithOp::Sub => (
                self.builder.ins().fsub(a_re, b_re),
                self.builder.ins().fsub(a_im, b_im),
            ),
            ArithOp::Mul => {
                let rr = self.builder.ins().fmul(a_re, b_re);
                let ii = self.builder.ins().fmul(a_im, b_im);
                let ri = self.builder.ins().fmul(a_re, b_im);
                let ir = self.builder.ins().fmul(a_im, b_re);
                (
                    self.builder.ins().fsub(rr, ii),
                    self.builder.ins().fadd(ri, ir),
                )
            }
            ArithOp::Div => {
                let cc = self.builder.ins().fmul(b_re, b_re);
                let dd = self.builder.ins().fmul(b_im, b_im);
                let d = self.builder.ins().fadd(cc, dd);
                let ac = self.builder.ins().fmul(a_re, b_re);
                let bd = self.builder.ins().fmul(a_im, b_im);
                let bc = self.builder.ins().fmul(a_im, b_re);
                let ad = self.builder.ins().fmul(a_re, b_im);
                let re = self.builder.ins().fadd(ac, bd);
                let im = self.builder.ins().fsub(bc, ad);
                (
                    self.builder.ins().fdiv(re, d),
                    self.builder.ins().fdiv(im, d),
                )
            }
        }
    }

    fn zero(&mut self) -> Value {
        self.builder.ins().f64const(0.0)
    }
}

fn register_offset(handle: NumberHandle) -> i32 {
    handle.0 as i32 * REGISTER_SIZE
}
