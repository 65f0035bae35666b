//! 호스트 primitive 레지스트리
//!
//! Each entry is a fixed-arity host function. A [`Prelude`] turns the
//! registry into the outermost environment frame of a program: the compiler
//! sees the names, the machine sees [`Callable`] values in the same order.

use crate::vm::value::{Callable, HostFn, HostResult, Symbol, Value};
use std::rc::Rc;

/// Host function pointer, one variant per supported arity.
#[derive(Debug, Clone, Copy)]
pub enum Imp {
    Nullary(fn() -> HostResult),
    Unary(fn(&Value) -> HostResult),
    Binary(fn(&Value, &Value) -> HostResult),
    Ternary(fn(&Value, &Value, &Value) -> HostResult),
    Quaternary(fn(&Value, &Value, &Value, &Value) -> HostResult),
}

#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub params: &'static [&'static str],
    pub imp: Imp,
}

impl Builtin {
    pub const fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn to_callable(&self) -> Callable {
        let func = match self.imp {
            Imp::Nullary(f) => HostFn::Nullary(Rc::new(f)),
            Imp::Unary(f) => HostFn::Unary(Rc::new(f)),
            Imp::Binary(f) => HostFn::Binary(Rc::new(f)),
            Imp::Ternary(f) => HostFn::Ternary(Rc::new(f)),
            Imp::Quaternary(f) => HostFn::Quaternary(Rc::new(f)),
        };
        Callable::new(self.name, func)
    }
}

// ========== 구현 ==========

fn int_arg(name: &str, v: &Value) -> Result<i64, String> {
    v.as_int().map_err(|e| format!("{}: {}", name, e))
}

fn zero() -> HostResult {
    Ok(Value::Int(0))
}

fn neg(x: &Value) -> HostResult {
    int_arg("NEG", x)?
        .checked_neg()
        .map(Value::Int)
        .ok_or_else(|| "NEG: integer overflow".to_string())
}

fn abs(x: &Value) -> HostResult {
    int_arg("ABS", x)?
        .checked_abs()
        .map(Value::Int)
        .ok_or_else(|| "ABS: integer overflow".to_string())
}

fn null(x: &Value) -> HostResult {
    Ok(Value::truth(x.is_nil()))
}

fn length(x: &Value) -> HostResult {
    let n = x.list_len().map_err(|e| format!("LENGTH: {}", e))?;
    Ok(Value::Int(n as i64))
}

fn max(a: &Value, b: &Value) -> HostResult {
    Ok(Value::Int(int_arg("MAX", a)?.max(int_arg("MAX", b)?)))
}

fn min(a: &Value, b: &Value) -> HostResult {
    Ok(Value::Int(int_arg("MIN", a)?.min(int_arg("MIN", b)?)))
}

fn list3(a: &Value, b: &Value, c: &Value) -> HostResult {
    Ok(Value::list([a.clone(), b.clone(), c.clone()]))
}

fn sum4(a: &Value, b: &Value, c: &Value, d: &Value) -> HostResult {
    [a, b, c, d]
        .into_iter()
        .try_fold(0i64, |acc, v| {
            let n = int_arg("SUM4", v)?;
            acc.checked_add(n)
                .ok_or_else(|| "SUM4: integer overflow".to_string())
        })
        .map(Value::Int)
}

// ========== 레지스트리 ==========

const ZERO: Builtin = Builtin {
    name: "ZERO",
    params: &[],
    imp: Imp::Nullary(zero),
};
const NEG: Builtin = Builtin {
    name: "NEG",
    params: &["x"],
    imp: Imp::Unary(neg),
};
const ABS: Builtin = Builtin {
    name: "ABS",
    params: &["x"],
    imp: Imp::Unary(abs),
};
const NULL: Builtin = Builtin {
    name: "NULL",
    params: &["x"],
    imp: Imp::Unary(null),
};
const LENGTH: Builtin = Builtin {
    name: "LENGTH",
    params: &["list"],
    imp: Imp::Unary(length),
};
const MAX: Builtin = Builtin {
    name: "MAX",
    params: &["a", "b"],
    imp: Imp::Binary(max),
};
const MIN: Builtin = Builtin {
    name: "MIN",
    params: &["a", "b"],
    imp: Imp::Binary(min),
};
const LIST3: Builtin = Builtin {
    name: "LIST3",
    params: &["a", "b", "c"],
    imp: Imp::Ternary(list3),
};
const SUM4: Builtin = Builtin {
    name: "SUM4",
    params: &["a", "b", "c", "d"],
    imp: Imp::Quaternary(sum4),
};

static REGISTRY: &[Builtin] = &[ZERO, NEG, ABS, NULL, LENGTH, MAX, MIN, LIST3, SUM4];

pub fn all() -> &'static [Builtin] {
    REGISTRY
}

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    REGISTRY.iter().find(|&b| b.name == name)
}

// ========== Prelude ==========

/// The host-supplied outermost frame.
#[derive(Debug, Clone, Default)]
pub struct Prelude {
    entries: Vec<Callable>,
}

impl Prelude {
    /// Every registered primitive, in registry order.
    pub fn standard() -> Self {
        Self {
            entries: REGISTRY.iter().map(Builtin::to_callable).collect(),
        }
    }

    /// Binder names for the compile-time frame.
    pub fn names(&self) -> Vec<Symbol> {
        self.entries.iter().map(|c| c.name().clone()).collect()
    }

    pub fn arity_of(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|c| c.name().name() == name)
            .map(Callable::arity)
    }

    /// Runtime environment holding the single prelude frame: `((c1 c2 ...))`.
    pub fn env(&self) -> Value {
        let frame = Value::list(self.entries.iter().cloned().map(Value::Callable));
        Value::list([frame])
    }
}
