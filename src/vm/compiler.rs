//! Continuation-style code generator.
//!
//! `compile(expr, c)` is handed the code that runs after `expr` and returns
//! `expr`'s instructions prepended to it. The whole stream is assembled by
//! nested calls; nothing is appended.

use super::bytecode::{Keyword, Module, Opcode, ProgramShape};
use super::value::{MAX_CALLABLE_ARITY, Symbol, Value};
use crate::builtins::Prelude;
use crate::parser::SourceMap;
use crate::semantic::{NamedClosures, ScopeStack, check_binders, is_lambda_form};
use crate::types::Span;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    #[error("undeclared identifier '{0}'")]
    UndeclaredIdentifier(String),
    #[error("{name} expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("a function of {params} parameters cannot be passed to a primitive (at most 4)")]
    ExcessArity { params: usize },
    #[error("malformed form: {0}")]
    MalformedForm(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub span: Option<Span>,
}

/// An expression together with the span it was read from, if known.
type Located = (Value, Option<Span>);

fn prepend<const N: usize>(op: Opcode, operands: [Value; N], c: Value) -> Value {
    Value::cons(op.value(), Value::dotted(operands, c))
}

pub struct Compiler<'a> {
    scopes: ScopeStack,
    named: NamedClosures,
    source_map: Option<&'a SourceMap>,
    prelude: Option<&'a Prelude>,
    errors: Vec<CompileError>,
}

impl<'a> Compiler<'a> {
    pub fn new() -> Self {
        Self {
            scopes: ScopeStack::new(),
            named: NamedClosures::new(),
            source_map: None,
            prelude: None,
            errors: Vec::new(),
        }
    }

    /// Source spans for diagnostics.
    pub fn with_source_map(mut self, map: &'a SourceMap) -> Self {
        self.source_map = Some(map);
        self
    }

    /// Makes the prelude names the outermost frame.
    pub fn with_prelude(mut self, prelude: &'a Prelude) -> Self {
        self.prelude = Some(prelude);
        self
    }

    /// Compiles with continuation `(STOP)`.
    pub fn compile_program(self, expr: &Value) -> Result<Module, Vec<CompileError>> {
        self.finish(expr, ProgramShape::Expression)
    }

    /// Compiles with continuation `(AP STOP)`: `expr` must evaluate to a
    /// function, which is applied to the argument list on the stack.
    pub fn compile_applied(self, expr: &Value) -> Result<Module, Vec<CompileError>> {
        self.finish(expr, ProgramShape::Applied)
    }

    fn finish(mut self, expr: &Value, shape: ProgramShape) -> Result<Module, Vec<CompileError>> {
        if let Some(prelude) = self.prelude {
            self.scopes.push(prelude.names());
        }
        let tail = match shape {
            ProgramShape::Expression => Value::list([Opcode::Stop.value()]),
            ProgramShape::Applied => Value::list([Opcode::Ap.value(), Opcode::Stop.value()]),
        };
        let span = self.source_map.and_then(SourceMap::root);
        let code = self.compile(expr, span, tail);

        if !self.errors.is_empty() {
            let mut errors = self.errors;
            errors.sort_by_key(|e| e.span.as_ref().map_or(usize::MAX, |s| s.start));
            debug!(count = errors.len(), "compilation failed");
            return Err(errors);
        }

        debug!(?shape, "compiled program");
        let mut module = Module::new(code, shape);
        module.uses_prelude = self.prelude.is_some();
        module.named_closures = self.named.into_entries();
        Ok(module)
    }

    fn error(&mut self, kind: CompileErrorKind, span: Option<Span>) {
        self.errors.push(CompileError { kind, span });
    }

    fn malformed(&mut self, message: String, span: Option<Span>) {
        self.error(CompileErrorKind::MalformedForm(message), span);
    }

    /// Elements of a proper list with their spans; `None` for an improper list.
    fn elements(&self, list: &Value) -> Option<Vec<Located>> {
        let mut out = Vec::new();
        let mut end = list.clone();
        for cell in list.cells() {
            let span = self.source_map.and_then(|m| m.head_span(&cell));
            out.push((cell.head().ok()?, span));
            end = cell.tail().ok()?;
        }
        end.is_nil().then_some(out)
    }

    // ========== 식 컴파일 ==========

    fn compile(&mut self, expr: &Value, span: Option<Span>, c: Value) -> Value {
        match expr {
            Value::Symbol(name) => self.compile_variable(name, span, c),
            Value::Int(_) | Value::Nil | Value::Callable(_) => {
                prepend(Opcode::Ldc, [expr.clone()], c)
            }
            Value::Pair(p) => match Keyword::from_value(&p.head()) {
                Some(kw) => self.compile_form(kw, expr, span, c),
                None => self.compile_application(expr, span, c),
            },
        }
    }

    fn compile_variable(&mut self, name: &Symbol, span: Option<Span>, c: Value) -> Value {
        match self.scopes.locate(name.name()) {
            Some(addr) => prepend(Opcode::Ld, [addr.to_value()], c),
            None => {
                self.error(
                    CompileErrorKind::UndeclaredIdentifier(name.name().to_string()),
                    span,
                );
                c
            }
        }
    }

    fn compile_form(&mut self, kw: Keyword, expr: &Value, span: Option<Span>, c: Value) -> Value {
        let Some(items) = self.elements(expr) else {
            self.malformed(format!("{} form is not a proper list", kw), span);
            return c;
        };
        let operands = &items[1..];
        if operands.len() != kw.operand_count() {
            self.malformed(
                format!(
                    "{} expects {} operand(s), got {}",
                    kw,
                    kw.operand_count(),
                    operands.len()
                ),
                span,
            );
            return c;
        }

        match kw {
            Keyword::Quote => prepend(Opcode::Ldc, [operands[0].0.clone()], c),
            Keyword::Add | Keyword::Sub | Keyword::Mul | Keyword::Div | Keyword::Rem => {
                let (a, b) = (&operands[0], &operands[1]);
                let c = Value::cons(self.primitive(kw), c);
                let c = self.compile(&b.0, b.1.clone(), c);
                self.compile(&a.0, a.1.clone(), c)
            }
            // second operand first, so the first ends up on top
            Keyword::Eq | Keyword::Leq | Keyword::Cons => {
                let (a, b) = (&operands[0], &operands[1]);
                let c = Value::cons(self.primitive(kw), c);
                let c = self.compile(&a.0, a.1.clone(), c);
                self.compile(&b.0, b.1.clone(), c)
            }
            Keyword::Car | Keyword::Cdr | Keyword::Atom => {
                let a = &operands[0];
                let c = Value::cons(self.primitive(kw), c);
                self.compile(&a.0, a.1.clone(), c)
            }
            Keyword::If => {
                let (p, t, e) = (&operands[0], &operands[1], &operands[2]);
                let join = || Value::list([Opcode::Join.value()]);
                let ct = self.compile(&t.0, t.1.clone(), join());
                let cf = self.compile(&e.0, e.1.clone(), join());
                let c = prepend(Opcode::Sel, [ct, cf], c);
                self.compile(&p.0, p.1.clone(), c)
            }
            Keyword::Lambda => self.compile_lambda(&operands[0], &operands[1], c),
            Keyword::Let => self.compile_let(&operands[0], &operands[1], c),
            Keyword::Letrec => self.compile_letrec(&operands[0], &operands[1], c),
        }
    }

    fn primitive(&self, kw: Keyword) -> Value {
        // only called for keywords that have an opcode
        kw.opcode().map_or(Value::Nil, Opcode::value)
    }

    /// `LDF (body RTN)`; `None` if the parameter list is malformed.
    fn lambda_block(&mut self, params: &Located, body: &Located) -> Option<Value> {
        let frame = match check_binders(&params.0) {
            Ok(frame) => frame,
            Err(message) => {
                self.malformed(message, params.1.clone());
                return None;
            }
        };
        self.scopes.push(frame);
        let code = self.compile(&body.0, body.1.clone(), Value::list([Opcode::Rtn.value()]));
        self.scopes.pop();
        Some(code)
    }

    fn compile_lambda(&mut self, params: &Located, body: &Located, c: Value) -> Value {
        match self.lambda_block(params, body) {
            Some(block) => prepend(Opcode::Ldf, [block], c),
            None => c,
        }
    }

    /// `((x e) ...)` → binder names (as a list Value) and initializers.
    fn bindings(&mut self, bindings: &Located) -> Option<(Value, Vec<Located>)> {
        let Some(arms) = self.elements(&bindings.0) else {
            self.malformed("binding list is not a proper list".into(), bindings.1.clone());
            return None;
        };
        let mut names = Vec::with_capacity(arms.len());
        let mut inits = Vec::with_capacity(arms.len());
        for (arm, arm_span) in arms {
            match self.elements(&arm).as_deref() {
                Some([name, init]) => {
                    names.push(name.0.clone());
                    inits.push(init.clone());
                }
                _ => {
                    self.malformed(format!("binding must be (name expr), found {}", arm), arm_span);
                    return None;
                }
            }
        }
        Some((Value::list(names), inits))
    }

    /// `(LET ((x e) ...) body)` → `complis(e ...) LDF (body RTN) AP`.
    fn compile_let(&mut self, bindings: &Located, body: &Located, c: Value) -> Value {
        let Some((names, inits)) = self.bindings(bindings) else {
            return c;
        };
        let Some(block) = self.lambda_block(&(names, bindings.1.clone()), body) else {
            return c;
        };
        let c = prepend(Opcode::Ldf, [block], Value::cons(Opcode::Ap.value(), c));
        self.complis(&inits, c)
    }

    /// `(LETREC ((x e) ...) body)` → `DUM complis(e ...) LDF (body RTN) RAP`,
    /// with the initializers compiled inside the new frame.
    fn compile_letrec(&mut self, bindings: &Located, body: &Located, c: Value) -> Value {
        let Some((names, inits)) = self.bindings(bindings) else {
            return c;
        };
        let frame = match check_binders(&names) {
            Ok(frame) => frame,
            Err(message) => {
                self.malformed(message, bindings.1.clone());
                return c;
            }
        };

        self.scopes.push(frame.clone());
        let block = self.compile(&body.0, body.1.clone(), Value::list([Opcode::Rtn.value()]));
        let mut code = prepend(Opcode::Ldf, [block], Value::cons(Opcode::Rap.value(), c));
        for (name, (init, span)) in frame.iter().zip(&inits) {
            code = self.compile(init, span.clone(), Value::cons(Opcode::Cons.value(), code));
            // a well-formed LAMBDA initializer compiles to `LDF block ...`
            let emitted_ldf = code.head().is_ok_and(|op| op == Opcode::Ldf.value());
            if is_lambda_form(init) && emitted_ldf {
                if let Ok(block) = code.second() {
                    self.named.record(name, block);
                }
            }
        }
        self.scopes.pop();

        let code = prepend(Opcode::Ldc, [Value::Nil], code);
        Value::cons(Opcode::Dum.value(), code)
    }

    /// Builds the list `(e1 ... en)` on the stack: `LDC NIL en CONS ... e1 CONS`.
    fn complis(&mut self, exprs: &[Located], c: Value) -> Value {
        let mut code = c;
        for (expr, span) in exprs {
            code = self.compile(expr, span.clone(), Value::cons(Opcode::Cons.value(), code));
        }
        prepend(Opcode::Ldc, [Value::Nil], code)
    }

    /// `(f a ...)` → `complis(a ...) f AP`.
    fn compile_application(&mut self, expr: &Value, span: Option<Span>, c: Value) -> Value {
        let Some(items) = self.elements(expr) else {
            self.malformed(format!("application is not a proper list: {}", expr), span);
            return c;
        };
        let (func, args) = (&items[0], &items[1..]);
        self.check_primitive_call(func, args);

        let c = Value::cons(Opcode::Ap.value(), c);
        let c = self.compile(&func.0, func.1.clone(), c);
        self.complis(args, c)
    }

    /// Direct calls of prelude primitives have a statically known arity.
    fn check_primitive_call(&mut self, func: &Located, args: &[Located]) {
        let (Some(prelude), Value::Symbol(name)) = (self.prelude, &func.0) else {
            return;
        };
        let Some(addr) = self.scopes.locate(name.name()) else {
            return;
        };
        if !self.scopes.is_outermost(addr) {
            return;
        }
        if let Some(expected) = prelude.arity_of(name.name()) {
            if expected != args.len() {
                self.error(
                    CompileErrorKind::ArityMismatch {
                        name: name.name().to_string(),
                        expected,
                        got: args.len(),
                    },
                    func.1.clone(),
                );
            }
        }
        for (arg, span) in args {
            if !is_lambda_form(arg) {
                continue;
            }
            let params = arg.second().and_then(|p| p.list_len()).unwrap_or(0);
            if params > MAX_CALLABLE_ARITY {
                self.error(CompileErrorKind::ExcessArity { params }, span.clone());
            }
        }
    }
}

impl Default for Compiler<'_> {
    fn default() -> Self {
        Self::new()
    }
}
