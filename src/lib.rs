pub mod builtins;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod runtime_io;
pub mod semantic;
pub mod types;
pub mod vm;

use ariadne::{Color, Label, Report, ReportKind, Source};
use builtins::Prelude;
use chumsky::Parser;
use chumsky::input::{Input, Stream};
use chumsky::span::SimpleSpan;
use lexer::Token;
use parser::{DatumS, SourceMap};
use thiserror::Error;
use tracing::debug;
use vm::{Compiler, MachineConfig, Module, Outcome, ProgramShape, Value, Vm};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub span: std::ops::Range<usize>,
}

impl Diagnostic {
    pub fn format(&self, path: &str, src: &str, kind: &str, code: usize) -> String {
        let mut buffer = Vec::new();
        Report::build(ReportKind::Error, (path, self.span.clone()))
            .with_config(ariadne::Config::new().with_index_type(ariadne::IndexType::Byte))
            .with_code(code)
            .with_message(kind)
            .with_label(
                Label::new((path, self.span.clone()))
                    .with_message(&self.message)
                    .with_color(Color::Red),
            )
            .finish()
            .write((path, Source::from(src)), &mut buffer)
            .ok();
        String::from_utf8_lossy(&buffer).to_string()
    }

    /// 1-based line and column (in characters) of the span start.
    pub fn line_col(&self, src: &str) -> (usize, usize) {
        let start = self.span.start.min(src.len());
        let prefix = src.get(..start).unwrap_or(src);
        let line = prefix.matches('\n').count() + 1;
        let line_start = prefix.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let col = prefix[line_start..].chars().count() + 1;
        (line, col)
    }
}

// ========== Reader ==========

/// Lexes and parses a sequence of datums.
pub fn parse_source(src: &str) -> Result<Vec<DatumS>, Vec<Diagnostic>> {
    let tokens = lexer::Lexer::tokenize(src);
    let lex_errors: Vec<Diagnostic> = tokens
        .iter()
        .filter_map(|(t, span)| match t {
            Token::Error(message) => Some(Diagnostic {
                message: message.clone(),
                span: span.clone(),
            }),
            _ => None,
        })
        .collect();
    if !lex_errors.is_empty() {
        return Err(lex_errors);
    }

    let token_iter = tokens
        .into_iter()
        .map(|(t, span)| (t, SimpleSpan::new(span.start, span.end)));
    let eoi_span = SimpleSpan::new(src.len(), src.len());
    let token_stream = Stream::from_iter(token_iter).map(eoi_span, |(t, s)| (t, s));
    match parser::program_parser().parse(token_stream).into_result() {
        Ok(program) => Ok(program),
        Err(errors) => {
            let mut errors = errors;
            errors.sort_by(|x1, x2| {
                let x1 = (x1.span().start, x1.span().end);
                let x2 = (x2.span().start, x2.span().end);
                x1.cmp(&x2)
            });
            let diagnostics = errors
                .into_iter()
                .map(|e| Diagnostic {
                    message: e.reason().to_string(),
                    span: e.span().into_range(),
                })
                .collect();
            Err(diagnostics)
        }
    }
}

/// Reads every datum in `src`, each with its own source map.
pub fn read_datums(src: &str) -> Result<Vec<(Value, SourceMap)>, Vec<Diagnostic>> {
    let program = parse_source(src)?;
    Ok(program
        .iter()
        .map(|datum| {
            let mut map = SourceMap::new();
            let value = parser::lower(datum, &mut map);
            (value, map)
        })
        .collect())
}

/// Reads exactly one datum.
pub fn read_source(src: &str) -> Result<(Value, SourceMap), Vec<Diagnostic>> {
    let mut program = parse_source(src)?;
    match program.len() {
        1 => {
            let mut map = SourceMap::new();
            let value = parser::lower(&program.remove(0), &mut map);
            Ok((value, map))
        }
        0 => Err(vec![Diagnostic {
            message: "expected a datum, found end of input".into(),
            span: src.len()..src.len(),
        }]),
        n => Err(vec![Diagnostic {
            message: format!("expected exactly one datum, found {}", n),
            span: program[1].1.clone(),
        }]),
    }
}

pub fn read_value(src: &str) -> Result<Value, Vec<Diagnostic>> {
    read_source(src).map(|(value, _)| value)
}

// ========== Compile / Run ==========

/// Reads and compiles one program.
pub fn compile_source(
    src: &str,
    shape: ProgramShape,
    prelude: Option<&Prelude>,
) -> Result<Module, Vec<Diagnostic>> {
    let (expr, map) = read_source(src)?;
    let mut compiler = Compiler::new().with_source_map(&map);
    if let Some(prelude) = prelude {
        compiler = compiler.with_prelude(prelude);
    }
    let result = match shape {
        ProgramShape::Expression => compiler.compile_program(&expr),
        ProgramShape::Applied => compiler.compile_applied(&expr),
    };
    result.map_err(|errors| {
        errors
            .into_iter()
            .map(|e| Diagnostic {
                message: e.kind.to_string(),
                span: e.span.or_else(|| map.root()).unwrap_or(0..0),
            })
            .collect()
    })
}

/// A machine loaded with `module`; the standard prelude frame is installed
/// when the module was compiled against it.
pub fn load_machine(module: &Module, args: Value, config: MachineConfig) -> Vm {
    let env = if module.uses_prelude {
        Prelude::standard().env()
    } else {
        Value::Nil
    };
    let mut machine = Vm::with_config(config);
    machine.load(module.code.clone(), args, env);
    machine
}

pub fn run_module(module: &Module, args: Value, config: MachineConfig) -> Outcome {
    let mut machine = load_machine(module, args, config);
    let outcome = machine.run();
    let stats = machine.stats();
    debug!(
        steps = stats.steps,
        max_dump = stats.max_dump_depth,
        max_calls = stats.max_pending_calls,
        "run finished"
    );
    outcome
}

// ========== Module files ==========

const MODULE_MAGIC: &[u8; 4] = b"SECD";

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode module: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("failed to decode module: {0}")]
    Decode(#[from] bincode::error::DecodeError),
    #[error("not a compiled module (bad header)")]
    BadHeader,
}

pub fn encode_module(module: &Module) -> Result<Vec<u8>, ModuleError> {
    let cfg = bincode::config::standard();
    let mut bytes = MODULE_MAGIC.to_vec();
    bytes.extend(bincode::serde::encode_to_vec(module, cfg)?);
    Ok(bytes)
}

pub fn decode_module(bytes: &[u8]) -> Result<Module, ModuleError> {
    let body = bytes
        .strip_prefix(MODULE_MAGIC.as_slice())
        .ok_or(ModuleError::BadHeader)?;
    let cfg = bincode::config::standard();
    let (module, _consumed): (Module, usize) = bincode::serde::decode_from_slice(body, cfg)?;
    Ok(module)
}

pub fn save_module(module: &Module, path: &str) -> Result<(), ModuleError> {
    std::fs::write(path, encode_module(module)?)?;
    Ok(())
}

pub fn load_module(path: &str) -> Result<Module, ModuleError> {
    let bytes = std::fs::read(path)?;
    decode_module(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_source_requires_one_datum() {
        assert!(read_source("(A B)").is_ok());
        let errs = read_source("").unwrap_err();
        assert!(errs[0].message.contains("end of input"));
        let errs = read_source("1 (2)").unwrap_err();
        assert_eq!(errs[0].span, 2..5);
    }

    #[test]
    fn test_lex_errors_become_diagnostics() {
        let errs = parse_source("(A # B)").unwrap_err();
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].span, 3..4);
    }

    #[test]
    fn test_parse_errors_are_reported() {
        assert!(!parse_source("(A B").unwrap_err().is_empty());
    }

    #[test]
    fn test_line_col() {
        let src = "(ADD 1\n  FOO)";
        let diag = Diagnostic {
            message: "x".into(),
            span: 9..12,
        };
        assert_eq!(diag.line_col(src), (2, 3));
        let first = Diagnostic {
            message: "x".into(),
            span: 0..1,
        };
        assert_eq!(first.line_col(src), (1, 1));
    }

    #[test]
    fn test_format_mentions_message() {
        let src = "(ADD 1 FOO)";
        let diags = compile_source(src, ProgramShape::Expression, None).unwrap_err();
        let text = diags[0].format("<test>", src, "Compile failed", 4);
        assert!(text.contains("undeclared identifier 'FOO'"));
    }

    #[test]
    fn test_compile_and_run() {
        let module = compile_source("(SUB 7 2)", ProgramShape::Expression, None).unwrap();
        let outcome = run_module(&module, Value::Nil, MachineConfig::default());
        assert_eq!(outcome, Outcome::Halted(Value::Int(5)));
    }

    #[test]
    fn test_applied_program_receives_args() {
        let module =
            compile_source("(LAMBDA (A B) (MUL A B))", ProgramShape::Applied, None).unwrap();
        let args = read_value("(6 7)").unwrap();
        let outcome = run_module(&module, args, MachineConfig::default());
        assert_eq!(outcome, Outcome::Halted(Value::Int(42)));
    }

    #[test]
    fn test_module_round_trip() {
        let prelude = Prelude::standard();
        let src = "(LETREC ((F (LAMBDA (N) (IF (LEQ N 0) 0 (ADD (ABS N) (F (SUB N 1))))))) (F 4))";
        let module = compile_source(src, ProgramShape::Expression, Some(&prelude)).unwrap();
        let bytes = encode_module(&module).unwrap();
        assert!(bytes.starts_with(b"SECD"));
        let loaded = decode_module(&bytes).unwrap();
        assert_eq!(loaded, module);
        assert!(loaded.uses_prelude);

        let block = loaded.code.nth(4).unwrap();
        assert_eq!(loaded.closure_name(&block), Some("F"));
        assert_eq!(
            run_module(&loaded, Value::Nil, MachineConfig::default()),
            Outcome::Halted(Value::Int(10))
        );
    }

    #[test]
    fn test_decode_rejects_foreign_bytes() {
        assert!(matches!(decode_module(b"nope"), Err(ModuleError::BadHeader)));
        assert!(matches!(decode_module(b"SECD\xff"), Err(ModuleError::Decode(_))));
    }
}
