//! secd REPL (Read-Eval-Print Loop)
//!
//! 각 입력은 독립적으로 컴파일되고 실행됩니다. The standard prelude is always
//! the outermost frame, so primitives such as `NEG` and `LENGTH` are in scope.

use crate::builtins::{self, Prelude};
use crate::runtime_io::{BufferIo, RuntimeIo};
use crate::vm::disasm::disassemble_module_to_string;
use crate::vm::{Compiler, MachineConfig, Module, Outcome, Value, Vm};
use crate::{Diagnostic, read_datums};

/// REPL 세션 상태
pub struct ReplState {
    pub prelude: Prelude,
    pub config: MachineConfig,
    /// Register dump per machine step.
    pub trace: bool,
    /// 마지막으로 컴파일된 모듈 (`:disasm`)
    last_module: Option<Module>,
    trace_output: BufferIo,
}

impl ReplState {
    pub fn new() -> Self {
        Self {
            prelude: Prelude::standard(),
            config: MachineConfig::default(),
            trace: false,
            last_module: None,
            trace_output: BufferIo::new(),
        }
    }

    /// 입력을 평가하고 실행
    ///
    /// Every datum on the line is evaluated in turn; the value of the last one
    /// is returned. `Ok(None)` for a blank line.
    pub fn eval_line(&mut self, input: &str) -> Result<Option<Value>, String> {
        if input.trim().is_empty() {
            return Ok(None);
        }

        let datums = read_datums(input).map_err(|diags| report(&diags, input, "Parsing failed", 3))?;

        let mut last = None;
        for (expr, map) in datums {
            let module = Compiler::new()
                .with_source_map(&map)
                .with_prelude(&self.prelude)
                .compile_program(&expr)
                .map_err(|errors| {
                    let diags: Vec<Diagnostic> = errors
                        .into_iter()
                        .map(|e| Diagnostic {
                            message: e.kind.to_string(),
                            span: e.span.or_else(|| map.root()).unwrap_or(0..0),
                        })
                        .collect();
                    report(&diags, input, "Compilation failed", 4)
                })?;

            let mut vm = Vm::with_config(self.config.clone());
            vm.load(module.code.clone(), Value::Nil, self.prelude.env());
            let outcome = if self.trace {
                vm.run_traced(&mut self.trace_output)
            } else {
                vm.run()
            };
            self.last_module = Some(module);

            match outcome {
                Outcome::Halted(v) => last = Some(v),
                Outcome::Faulted(err) => {
                    return Err(format!("Runtime Error: {}\n{:?}", err.message, err.kind));
                }
            }
        }
        Ok(last)
    }

    /// Trace lines collected since the last call.
    pub fn take_trace(&mut self) -> String {
        self.trace_output.drain_output()
    }
}

impl Default for ReplState {
    fn default() -> Self {
        Self::new()
    }
}

fn report(diags: &[Diagnostic], input: &str, kind: &str, code: usize) -> String {
    let mut error_msg = String::new();
    for diag in diags {
        error_msg.push_str(&diag.format("<repl>", input, kind, code));
    }
    error_msg
}

/// 특수 명령어 처리
///
/// 반환값: true이면 REPL 종료
pub fn handle_command<IO: RuntimeIo>(
    cmd: &str,
    state: &mut ReplState,
    io: &mut IO,
) -> Result<bool, String> {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(false);
    }

    match parts[0] {
        ":quit" | ":q" => {
            io.write_line("Goodbye!");
            Ok(true)
        }
        ":help" | ":h" => {
            io.write(HELP);
            Ok(false)
        }
        ":clear" | ":c" => {
            *state = ReplState::new();
            io.write_line("Session cleared.");
            Ok(false)
        }
        ":trace" | ":t" => {
            state.trace = !state.trace;
            io.write_line(if state.trace { "trace on" } else { "trace off" });
            Ok(false)
        }
        ":disasm" | ":d" => {
            match &state.last_module {
                Some(module) => io.write(&disassemble_module_to_string(module)),
                None => io.write_line("Nothing compiled yet."),
            }
            Ok(false)
        }
        ":prelude" | ":p" => {
            let selected: Vec<&builtins::Builtin> = match parts.get(1) {
                Some(name) => match builtins::lookup(name) {
                    Some(b) => vec![b],
                    None => return Err(format!("No primitive named {}", name)),
                },
                None => builtins::all().iter().collect(),
            };
            for b in selected {
                io.write_line(&format!("  {}/{}  ({})", b.name, b.arity(), b.params.join(" ")));
            }
            Ok(false)
        }
        ":steps" => {
            match parts.get(1).map(|n| n.parse::<u64>()) {
                Some(Ok(0)) | None => state.config.max_steps = None,
                Some(Ok(n)) => state.config.max_steps = Some(n),
                Some(Err(e)) => return Err(format!("Usage: :steps <n>: {}", e)),
            }
            io.write_line(&match state.config.max_steps {
                Some(n) => format!("step limit {}", n),
                None => "no step limit".to_string(),
            });
            Ok(false)
        }
        _ => Err(format!("Unknown command: {}", parts[0])),
    }
}

const HELP: &str = r#"secd REPL Commands:
  :quit, :q          Exit the REPL
  :help, :h          Show this help
  :clear, :c         Reset the session
  :trace, :t         Toggle the per-step register trace
  :disasm, :d        Disassemble the last compiled expression
  :prelude, :p [f]   List host primitives (or just f)
  :steps <n>         Set the step limit (0 removes it)

Tips:
  - Input continues on the next line until parentheses balance
  - 'x reads as (QUOTE x)
"#;

/// 괄호가 아직 닫히지 않았으면 true
pub fn needs_more_lines(buffer: &str) -> bool {
    let mut depth: i64 = 0;
    for line in buffer.lines() {
        let code = line.split(';').next().unwrap_or("");
        for ch in code.chars() {
            match ch {
                '(' => depth += 1,
                ')' => depth -= 1,
                _ => {}
            }
        }
    }
    depth > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_line() {
        let mut state = ReplState::new();
        assert_eq!(state.eval_line("(ADD 1 2)"), Ok(Some(Value::Int(3))));
        assert_eq!(state.eval_line("   "), Ok(None));
        assert_eq!(state.eval_line("1 (NEG 4)"), Ok(Some(Value::Int(-4))));
        assert_eq!(
            state.eval_line("(LENGTH '(A B C))"),
            Ok(Some(Value::Int(3)))
        );
    }

    #[test]
    fn test_lines_are_independent() {
        let mut state = ReplState::new();
        assert!(state.eval_line("(LET ((X 1)) X)").is_ok());
        let err = state.eval_line("X").unwrap_err();
        assert!(err.contains("undeclared identifier 'X'"));
    }

    #[test]
    fn test_runtime_error_message() {
        let mut state = ReplState::new();
        let err = state.eval_line("(CAR 5)").unwrap_err();
        assert!(err.starts_with("Runtime Error:"));
    }

    #[test]
    fn test_commands() {
        let mut state = ReplState::new();
        let mut io = BufferIo::new();
        assert_eq!(handle_command(":trace", &mut state, &mut io), Ok(false));
        assert!(state.trace);
        state.eval_line("(ADD 1 2)").unwrap();
        assert!(state.take_trace().contains("=> 3"));

        assert_eq!(handle_command(":disasm", &mut state, &mut io), Ok(false));
        assert!(io.get_output().contains("ADD"));

        assert_eq!(handle_command(":steps 10", &mut state, &mut io), Ok(false));
        assert_eq!(state.config.max_steps, Some(10));

        io.drain_output();
        assert_eq!(handle_command(":prelude MAX", &mut state, &mut io), Ok(false));
        assert_eq!(io.get_output(), "  MAX/2  (a b)\n");
        assert!(handle_command(":prelude FROB", &mut state, &mut io).is_err());

        assert!(handle_command(":nope", &mut state, &mut io).is_err());
        assert_eq!(handle_command(":q", &mut state, &mut io), Ok(true));
    }

    #[test]
    fn test_needs_more_lines() {
        assert!(needs_more_lines("(ADD 1"));
        assert!(!needs_more_lines("(ADD 1 2)"));
        assert!(needs_more_lines("(LET ((X 1)) ; )\n"));
        assert!(!needs_more_lines("(LET ((X 1))\n X)"));
    }
}
