use super::value::{Symbol, Value};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

/// SECD 명령어 집합
///
/// The mnemonics are part of the external contract (traces, disassembly, saved
/// modules) and are spelled exactly as shown by `Display`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    EnumCount,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Opcode {
    /// `LD (i . j)`: push slot `j` of frame `i`
    Ld,
    /// `LDC x`: push the constant `x`
    Ldc,
    /// `LDF c'`: push the closure `(c' . e)`
    Ldf,
    /// Stack: closure, args → (call)
    Ap,
    Rtn,
    /// Push the pending frame for a letrec
    Dum,
    /// Like `AP`, but patches the pending frame with the argument list
    Rap,
    /// `SEL ct cf`
    Sel,
    Join,

    Car,
    Cdr,
    Atom,
    Cons,
    Eq,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Leq,

    Stop,
}

impl Opcode {
    pub fn mnemonic(self) -> &'static str {
        self.into()
    }

    pub fn symbol(self) -> Symbol {
        Symbol::new(self.mnemonic())
    }

    /// The opcode as a code Value (a bare symbol in the instruction list).
    pub fn value(self) -> Value {
        Value::Symbol(self.symbol())
    }

    pub fn from_value(v: &Value) -> Option<Opcode> {
        match v {
            Value::Symbol(s) => Opcode::from_str(s.name()).ok(),
            _ => None,
        }
    }

    /// Number of inline operands that follow the mnemonic in the control list.
    pub fn operand_count(self) -> usize {
        match self {
            Opcode::Ld | Opcode::Ldc | Opcode::Ldf => 1,
            Opcode::Sel => 2,
            _ => 0,
        }
    }
}

/// 소스 언어 키워드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Keyword {
    Quote,
    Lambda,
    Let,
    Letrec,
    If,

    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Leq,

    Car,
    Cdr,
    Atom,
    Cons,
}

impl Keyword {
    pub fn from_value(v: &Value) -> Option<Keyword> {
        match v {
            Value::Symbol(s) => Keyword::from_str(s.name()).ok(),
            _ => None,
        }
    }

    pub fn symbol(self) -> Symbol {
        let name: &'static str = self.into();
        Symbol::new(name)
    }

    pub fn is_reserved(name: &str) -> bool {
        Keyword::from_str(name).is_ok()
    }

    /// Operand count of the form, e.g. `(IF p t e)` has three.
    pub fn operand_count(self) -> usize {
        match self {
            Keyword::Quote | Keyword::Car | Keyword::Cdr | Keyword::Atom => 1,
            Keyword::Lambda | Keyword::Let | Keyword::Letrec => 2,
            Keyword::If => 3,
            Keyword::Add
            | Keyword::Sub
            | Keyword::Mul
            | Keyword::Div
            | Keyword::Rem
            | Keyword::Eq
            | Keyword::Leq
            | Keyword::Cons => 2,
        }
    }

    /// The machine instruction a primitive form lowers to.
    pub fn opcode(self) -> Option<Opcode> {
        match self {
            Keyword::Add => Some(Opcode::Add),
            Keyword::Sub => Some(Opcode::Sub),
            Keyword::Mul => Some(Opcode::Mul),
            Keyword::Div => Some(Opcode::Div),
            Keyword::Rem => Some(Opcode::Rem),
            Keyword::Eq => Some(Opcode::Eq),
            Keyword::Leq => Some(Opcode::Leq),
            Keyword::Car => Some(Opcode::Car),
            Keyword::Cdr => Some(Opcode::Cdr),
            Keyword::Atom => Some(Opcode::Atom),
            Keyword::Cons => Some(Opcode::Cons),
            Keyword::Quote | Keyword::Lambda | Keyword::Let | Keyword::Letrec | Keyword::If => None,
        }
    }
}

/// What the code expects to find on the stack when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgramShape {
    /// Code ends in `STOP`; the argument list is ignored.
    Expression,
    /// Code ends in `AP STOP`; the program is a function applied to the argument list.
    Applied,
}

/// A letrec-bound procedure and the code block `LDF` loads for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedClosure {
    pub name: String,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// 실행할 명령어 리스트
    pub code: Value,

    pub shape: ProgramShape,

    /// The program was compiled against the host prelude frame.
    pub uses_prelude: bool,

    /// letrec으로 정의된 이름 있는 클로저 목록
    pub named_closures: Vec<NamedClosure>,
}

impl Module {
    pub fn new(code: Value, shape: ProgramShape) -> Self {
        Module {
            code,
            shape,
            uses_prelude: false,
            named_closures: Vec::new(),
        }
    }

    pub fn closure_name(&self, body: &Value) -> Option<&str> {
        self.named_closures
            .iter()
            .find(|n| n.body.ptr_eq(body))
            .or_else(|| self.named_closures.iter().find(|n| &n.body == body))
            .map(|n| n.name.as_str())
    }
}
