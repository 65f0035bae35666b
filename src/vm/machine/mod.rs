// machine 모듈 - SECD 실행 엔진
//
// 네 개의 레지스터 S/E/C/D 위에서 fetch-execute 루프를 돌립니다.
// 소스 프로그램의 재귀는 호스트 스택이 아니라 D의 성장으로 나타납니다.

use crate::runtime_io::RuntimeIo;
use crate::vm::bytecode::Opcode;
use crate::vm::utils::display_truncated;
use crate::vm::value::Value;
use thiserror::Error;
use tracing::{debug, trace};

// 서브모듈
mod instruction;


pub use instruction::Flow;

// ========== 타입 정의 ==========

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmErrorKind {
    #[error("type error: expected {0}")]
    TypeError(&'static str),
    #[error("division by zero")]
    ZeroDivision,
    #[error("integer overflow")]
    Overflow,
    #[error("arity error: expected {expected}, got {got}")]
    ArityError { expected: usize, got: usize },
    #[error("stack underflow")]
    StackUnderflow,
    #[error("environment underflow")]
    EnvironmentUnderflow,
    #[error("dump underflow")]
    DumpUnderflow,
    #[error("dump entry does not match instruction")]
    DumpMismatch,
    #[error("dump overflow")]
    DumpOverflow,
    #[error("letrec frame is still pending")]
    PendingFrame,
    #[error("unknown instruction {0}")]
    UnknownInstruction(String),
    #[error("missing operand for {0}")]
    MissingOperand(&'static str),
    #[error("control exhausted without STOP")]
    MissingStop,
    #[error("step limit {0} reached")]
    StepLimit(u64),
    #[error("host error: {0}")]
    HostError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct VmError {
    pub kind: VmErrorKind,
    pub message: String,
}

pub type VmResult<T> = Result<T, VmError>;

/// Saved machine state.
#[derive(Debug, Clone)]
pub enum DumpEntry {
    /// Pushed by `AP`/`RAP`, popped by `RTN`.
    Call { s: Value, e: Value, c: Value },
    /// Pushed by `SEL`, popped by `JOIN`.
    Join { c: Value },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    pub max_steps: Option<u64>,
    pub max_dump: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_dump: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub steps: u64,
    pub max_dump_depth: usize,
    /// Most calls that had not yet returned at the same time.
    pub max_pending_calls: usize,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Halted(Value),
    Faulted(VmError),
}

impl Outcome {
    pub fn is_halted(&self) -> bool {
        matches!(self, Outcome::Halted(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Outcome::Halted(v) => Some(v),
            Outcome::Faulted(_) => None,
        }
    }

    pub fn into_result(self) -> VmResult<Value> {
        match self {
            Outcome::Halted(v) => Ok(v),
            Outcome::Faulted(e) => Err(e),
        }
    }
}

pub struct Vm {
    s: Value,
    e: Value,
    c: Value,
    d: Vec<DumpEntry>,
    pub config: MachineConfig,
    stats: Stats,
    pending_calls: usize,
}

// ========== 유틸리티 함수 ==========

/// VmError 생성 헬퍼 함수
pub fn err(kind: VmErrorKind, message: String) -> VmError {
    VmError { kind, message }
}

/// Error whose message is the kind's own description.
fn fault(kind: VmErrorKind) -> VmError {
    let message = kind.to_string();
    VmError { kind, message }
}

// ========== VM 구현 ==========

impl Vm {
    pub fn new() -> Self {
        Self::with_config(MachineConfig::default())
    }

    pub fn with_config(config: MachineConfig) -> Self {
        Self {
            s: Value::Nil,
            e: Value::Nil,
            c: Value::Nil,
            d: Vec::with_capacity(32),
            config,
            stats: Stats::default(),
            pending_calls: 0,
        }
    }

    /// Initial state: `S = (args)`, `E = env`, `C = code`, `D` empty.
    pub fn load(&mut self, code: Value, args: Value, env: Value) {
        self.s = Value::list([args]);
        self.e = env;
        self.c = code;
        self.d.clear();
        self.stats = Stats::default();
        self.pending_calls = 0;
    }

    /// `load` with an empty environment, then `run`.
    pub fn execute(&mut self, code: Value, args: Value) -> Outcome {
        self.load(code, args, Value::Nil);
        self.run()
    }

    pub fn run(&mut self) -> Outcome {
        loop {
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop(v)) => {
                    debug!(steps = self.stats.steps, result = %v, "halted");
                    return Outcome::Halted(v);
                }
                Err(e) => {
                    debug!(steps = self.stats.steps, error = %e, "faulted");
                    return Outcome::Faulted(e);
                }
            }
        }
    }

    /// Like [`Vm::run`], writing the registers to `io` before every step.
    pub fn run_traced<IO: RuntimeIo>(&mut self, io: &mut IO) -> Outcome {
        loop {
            io.write_line(&self.registers_line());
            match self.step() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop(v)) => {
                    io.write_line(&format!("=> {}", v));
                    return Outcome::Halted(v);
                }
                Err(e) => {
                    io.write_line(&format!("!! {}", e));
                    return Outcome::Faulted(e);
                }
            }
        }
    }

    /// Executes one instruction.
    pub fn step(&mut self) -> VmResult<Flow> {
        if let Some(limit) = self.config.max_steps {
            if self.stats.steps >= limit {
                return Err(fault(VmErrorKind::StepLimit(limit)));
            }
        }
        let head = self.fetch().ok_or_else(|| fault(VmErrorKind::MissingStop))?;
        let op = Opcode::from_value(&head).ok_or_else(|| {
            let name = head.to_string();
            err(
                VmErrorKind::UnknownInstruction(name.clone()),
                format!("unknown instruction {}", name),
            )
        })?;
        self.stats.steps += 1;
        trace!(step = self.stats.steps, op = op.mnemonic(), dump = self.d.len());

        let flow = self.execute_instruction(op)?;
        self.stats.max_dump_depth = self.stats.max_dump_depth.max(self.d.len());
        self.stats.max_pending_calls = self.stats.max_pending_calls.max(self.pending_calls);
        Ok(flow)
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn dump_depth(&self) -> usize {
        self.d.len()
    }

    pub fn stack(&self) -> &Value {
        &self.s
    }

    pub fn env(&self) -> &Value {
        &self.e
    }

    pub fn control(&self) -> &Value {
        &self.c
    }

    fn registers_line(&self) -> String {
        format!(
            "{:>6}  S={}  E={}  C={}  D={}",
            self.stats.steps,
            display_truncated(&self.s, 40),
            display_truncated(&self.e, 40),
            display_truncated(&self.c, 40),
            self.d.len()
        )
    }

    // ========== 레지스터 연산 ==========

    /// Pops the head of `C`; `None` when the control list is exhausted.
    fn fetch(&mut self) -> Option<Value> {
        match std::mem::replace(&mut self.c, Value::Nil) {
            Value::Pair(p) => {
                self.c = p.tail();
                Some(p.head())
            }
            other => {
                self.c = other;
                None
            }
        }
    }

    fn operand(&mut self, op: Opcode) -> VmResult<Value> {
        self.fetch()
            .ok_or_else(|| fault(VmErrorKind::MissingOperand(op.mnemonic())))
    }

    fn push(&mut self, v: Value) {
        let rest = std::mem::replace(&mut self.s, Value::Nil);
        self.s = Value::cons(v, rest);
    }

    fn pop(&mut self) -> VmResult<Value> {
        match std::mem::replace(&mut self.s, Value::Nil) {
            Value::Pair(p) => {
                self.s = p.tail();
                Ok(p.head())
            }
            other => {
                self.s = other;
                Err(fault(VmErrorKind::StackUnderflow))
            }
        }
    }

    fn pop_int(&mut self) -> VmResult<i64> {
        let v = self.pop()?;
        v.as_int().map_err(|e| err(VmErrorKind::TypeError("int"), e.to_string()))
    }

    // ========== 덤프 관리 ==========

    fn push_dump(&mut self, entry: DumpEntry) -> VmResult<()> {
        if self.d.len() >= self.config.max_dump {
            return Err(fault(VmErrorKind::DumpOverflow));
        }
        self.d.push(entry);
        Ok(())
    }

    fn pop_dump(&mut self) -> VmResult<DumpEntry> {
        self.d.pop().ok_or_else(|| fault(VmErrorKind::DumpUnderflow))
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
