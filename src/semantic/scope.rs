use crate::vm::value::{Symbol, Value, ValueError, ValueResult};

/// `(frame, slot)` address of a variable in the runtime environment.
/// Frame 0 is the innermost frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    pub frame: usize,
    pub slot: usize,
}

impl Address {
    /// `(i . j)`, the operand form of `LD`.
    pub fn to_value(self) -> Value {
        Value::cons(Value::Int(self.frame as i64), Value::Int(self.slot as i64))
    }

    pub fn from_value(v: &Value) -> ValueResult<Self> {
        let frame = v.head()?.as_int()?;
        let slot = v.tail()?.as_int()?;
        if frame < 0 || slot < 0 {
            return Err(ValueError::IndexOutOfRange(frame.min(slot).unsigned_abs() as usize));
        }
        Ok(Address {
            frame: frame as usize,
            slot: slot as usize,
        })
    }
}

/// Compile-time environment: one frame of binder names per enclosing
/// LAMBDA/LET/LETREC, innermost last.
#[derive(Debug, Default)]
pub struct ScopeStack {
    stack: Vec<Vec<Symbol>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    pub fn push(&mut self, frame: Vec<Symbol>) {
        self.stack.push(frame);
    }

    pub fn pop(&mut self) {
        self.stack.pop();
    }

    /// Scans frames outward from the innermost and binders left to right.
    pub fn locate(&self, name: &str) -> Option<Address> {
        for (frame, binders) in self.stack.iter().rev().enumerate() {
            if let Some(slot) = binders.iter().position(|b| b.name() == name) {
                return Some(Address { frame, slot });
            }
        }
        None
    }

    /// True when `addr` points into the outermost frame.
    pub fn is_outermost(&self, addr: Address) -> bool {
        !self.stack.is_empty() && addr.frame == self.stack.len() - 1
    }
}
