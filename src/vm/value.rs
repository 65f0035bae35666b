//! # Value model
//!
//! 프로그램 데이터와 컴파일된 코드가 같은 타입을 공유합니다 ("code is data").
//!
//! 1. **Nil**: 유일한 빈 리스트. 예약 심볼 `NIL`과 같은 값입니다.
//! 2. **Pair**: head/tail 슬롯. letrec back-patch를 위해서만 변경됩니다.
//! 3. **Symbol**: interned 이름. 이름이 같으면 같은 심볼입니다.
//! 4. **Int**: `i64` 정수.
//! 5. **Callable**: 호스트 함수 (arity 0-4).

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

pub const NIL_NAME: &str = "NIL";
pub const TRUE_NAME: &str = "T";
pub const FALSE_NAME: &str = "F";
/// Marker stored in the environment by `DUM` until `RAP` patches it.
/// The reader never produces symbols starting with `#`.
pub const PENDING_NAME: &str = "#pending";

/// Host callables are limited to these arities.
pub const MAX_CALLABLE_ARITY: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("expected a pair, found {0}")]
    NotAPair(&'static str),
    #[error("expected an integer, found {0}")]
    NotAnInt(&'static str),
    #[error("expected a symbol, found {0}")]
    NotASymbol(&'static str),
    #[error("improper list ending in {0}")]
    ImproperList(&'static str),
    #[error("list index {0} out of range")]
    IndexOutOfRange(usize),
}

pub type ValueResult<T> = Result<T, ValueError>;

// ========== Symbol ==========

thread_local! {
    static INTERNER: RefCell<HashMap<Box<str>, Rc<str>>> = RefCell::new(HashMap::new());
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        INTERNER.with(|table| {
            let mut table = table.borrow_mut();
            if let Some(interned) = table.get(name) {
                return Symbol(interned.clone());
            }
            let interned: Rc<str> = Rc::from(name);
            table.insert(name.into(), interned.clone());
            Symbol(interned)
        })
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn pending() -> Self {
        Symbol::new(PENDING_NAME)
    }

    pub fn is_pending(&self) -> bool {
        self.name() == PENDING_NAME
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl From<String> for Symbol {
    fn from(name: String) -> Self {
        Symbol::new(&name)
    }
}

impl From<Symbol> for String {
    fn from(sym: Symbol) -> Self {
        sym.name().to_string()
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ========== Callable ==========

pub type HostResult = Result<Value, String>;

/// 고정 arity 호스트 함수
#[derive(Clone)]
pub enum HostFn {
    Nullary(Rc<dyn Fn() -> HostResult>),
    Unary(Rc<dyn Fn(&Value) -> HostResult>),
    Binary(Rc<dyn Fn(&Value, &Value) -> HostResult>),
    Ternary(Rc<dyn Fn(&Value, &Value, &Value) -> HostResult>),
    Quaternary(Rc<dyn Fn(&Value, &Value, &Value, &Value) -> HostResult>),
}

impl HostFn {
    pub fn arity(&self) -> usize {
        match self {
            HostFn::Nullary(_) => 0,
            HostFn::Unary(_) => 1,
            HostFn::Binary(_) => 2,
            HostFn::Ternary(_) => 3,
            HostFn::Quaternary(_) => 4,
        }
    }

    fn addr(&self) -> *const () {
        match self {
            HostFn::Nullary(f) => Rc::as_ptr(f) as *const (),
            HostFn::Unary(f) => Rc::as_ptr(f) as *const (),
            HostFn::Binary(f) => Rc::as_ptr(f) as *const (),
            HostFn::Ternary(f) => Rc::as_ptr(f) as *const (),
            HostFn::Quaternary(f) => Rc::as_ptr(f) as *const (),
        }
    }
}

#[derive(Clone)]
pub struct Callable {
    name: Symbol,
    func: HostFn,
}

impl Callable {
    pub fn new(name: &str, func: HostFn) -> Self {
        Self {
            name: Symbol::new(name),
            func,
        }
    }

    pub fn name(&self) -> &Symbol {
        &self.name
    }

    pub fn arity(&self) -> usize {
        self.func.arity()
    }

    pub fn call(&self, args: &[Value]) -> HostResult {
        match (&self.func, args) {
            (HostFn::Nullary(f), []) => f(),
            (HostFn::Unary(f), [a]) => f(a),
            (HostFn::Binary(f), [a, b]) => f(a, b),
            (HostFn::Ternary(f), [a, b, c]) => f(a, b, c),
            (HostFn::Quaternary(f), [a, b, c, d]) => f(a, b, c, d),
            _ => Err(format!(
                "{} expects {} argument(s), got {}",
                self.name,
                self.arity(),
                args.len()
            )),
        }
    }

    /// Identity comparison: two callables are the same if they wrap the same host function.
    pub fn same(&self, other: &Callable) -> bool {
        std::ptr::eq(self.func.addr(), other.func.addr())
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<{}/{}>", self.name, self.arity())
    }
}

// ========== Pair ==========

#[derive(Serialize, Deserialize)]
pub struct Pair {
    head: RefCell<Value>,
    tail: RefCell<Value>,
}

impl Pair {
    pub fn head(&self) -> Value {
        self.head.borrow().clone()
    }

    pub fn tail(&self) -> Value {
        self.tail.borrow().clone()
    }
}

impl Drop for Pair {
    // Uniquely owned cells are unlinked onto a worklist, so dropping a long
    // list or a deeply nested one never recurses once per cell.
    fn drop(&mut self) {
        let mut stack: Vec<Rc<Pair>> = Vec::new();
        for slot in [self.head.get_mut(), self.tail.get_mut()] {
            if let Value::Pair(rc) = std::mem::replace(slot, Value::Nil) {
                stack.push(rc);
            }
        }
        while let Some(rc) = stack.pop() {
            if let Ok(mut pair) = Rc::try_unwrap(rc) {
                for slot in [pair.head.get_mut(), pair.tail.get_mut()] {
                    if let Value::Pair(rc) = std::mem::replace(slot, Value::Nil) {
                        stack.push(rc);
                    }
                }
            }
        }
    }
}

// ========== Value ==========

#[derive(Clone, Serialize, Deserialize)]
pub enum Value {
    Nil,
    Pair(Rc<Pair>),
    Symbol(Symbol),
    Int(i64),

    #[serde(skip)]
    Callable(Callable),
}

impl Value {
    /// Symbol constructor that maps the reserved name `NIL` onto the empty list.
    pub fn symbol(name: &str) -> Value {
        if name == NIL_NAME {
            Value::Nil
        } else {
            Value::Symbol(Symbol::new(name))
        }
    }

    pub fn cons(head: Value, tail: Value) -> Value {
        Value::Pair(Rc::new(Pair {
            head: RefCell::new(head),
            tail: RefCell::new(tail),
        }))
    }

    pub fn list<I>(items: I) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        Self::dotted(items, Value::Nil)
    }

    /// `(a b ... . tail)`
    pub fn dotted<I>(items: I, tail: Value) -> Value
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: DoubleEndedIterator,
    {
        items
            .into_iter()
            .rev()
            .fold(tail, |acc, item| Value::cons(item, acc))
    }

    pub fn truth(b: bool) -> Value {
        Value::symbol(if b { TRUE_NAME } else { FALSE_NAME })
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Value::Symbol(s) if s.name() == TRUE_NAME)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_pair(&self) -> bool {
        matches!(self, Value::Pair(_))
    }

    pub fn is_atom(&self) -> bool {
        !self.is_pair()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Value::Symbol(s) if s.is_pending())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Pair(_) => "pair",
            Value::Symbol(_) => "symbol",
            Value::Int(_) => "integer",
            Value::Callable(_) => "callable",
        }
    }

    // ========== 접근자 ==========

    pub fn as_pair(&self) -> ValueResult<&Rc<Pair>> {
        match self {
            Value::Pair(p) => Ok(p),
            other => Err(ValueError::NotAPair(other.type_name())),
        }
    }

    pub fn head(&self) -> ValueResult<Value> {
        self.as_pair().map(|p| p.head())
    }

    pub fn tail(&self) -> ValueResult<Value> {
        self.as_pair().map(|p| p.tail())
    }

    pub fn as_int(&self) -> ValueResult<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(ValueError::NotAnInt(other.type_name())),
        }
    }

    pub fn as_symbol(&self) -> ValueResult<&Symbol> {
        match self {
            Value::Symbol(s) => Ok(s),
            other => Err(ValueError::NotASymbol(other.type_name())),
        }
    }

    pub fn as_symbol_name(&self) -> ValueResult<&str> {
        self.as_symbol().map(Symbol::name)
    }

    /// head of tail
    pub fn second(&self) -> ValueResult<Value> {
        self.tail()?.head()
    }

    pub fn third(&self) -> ValueResult<Value> {
        self.tail_tail()?.head()
    }

    pub fn tail_tail(&self) -> ValueResult<Value> {
        self.tail()?.tail()
    }

    pub fn nth(&self, index: usize) -> ValueResult<Value> {
        let mut cur = self.clone();
        for _ in 0..index {
            cur = match cur {
                Value::Pair(p) => p.tail(),
                Value::Nil => return Err(ValueError::IndexOutOfRange(index)),
                other => return Err(ValueError::ImproperList(other.type_name())),
            };
        }
        match cur {
            Value::Pair(p) => Ok(p.head()),
            Value::Nil => Err(ValueError::IndexOutOfRange(index)),
            other => Err(ValueError::ImproperList(other.type_name())),
        }
    }

    /// Back-patch the head slot. Only the letrec `RAP` transition uses this.
    pub(crate) fn set_head(&self, value: Value) -> ValueResult<()> {
        let pair = self.as_pair()?;
        *pair.head.borrow_mut() = value;
        Ok(())
    }

    pub(crate) fn set_tail(&self, value: Value) -> ValueResult<()> {
        let pair = self.as_pair()?;
        *pair.tail.borrow_mut() = value;
        Ok(())
    }

    // ========== 리스트 ==========

    pub fn iter(&self) -> ListIter {
        ListIter {
            cur: self.clone(),
            done: false,
        }
    }

    /// Walks the pair cells of a list; each item is the cell itself, whose
    /// head is the element. Stops at the first non-pair tail.
    pub fn cells(&self) -> Cells {
        Cells(self.clone())
    }

    pub fn to_vec(&self) -> ValueResult<Vec<Value>> {
        self.iter().collect()
    }

    pub fn list_len(&self) -> ValueResult<usize> {
        let mut n = 0;
        for item in self.iter() {
            item?;
            n += 1;
        }
        Ok(n)
    }

    /// Pair cell identity, used as a side-table key.
    pub fn cell_id(&self) -> Option<usize> {
        match self {
            Value::Pair(p) => Some(Rc::as_ptr(p) as *const () as usize),
            _ => None,
        }
    }

    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<Symbol> for Value {
    fn from(s: Symbol) -> Self {
        if s.name() == NIL_NAME {
            Value::Nil
        } else {
            Value::Symbol(s)
        }
    }
}

impl From<Callable> for Value {
    fn from(c: Callable) -> Self {
        Value::Callable(c)
    }
}

/// Structural equality with an explicit worklist.
///
/// A pair of cells already under comparison counts as equal, so two letrec
/// closures with separately built (cyclic) environments compare without
/// looping, and deep nesting never grows the host stack.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        let mut work = vec![(self.clone(), other.clone())];
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        while let Some((a, b)) = work.pop() {
            match (&a, &b) {
                (Value::Pair(x), Value::Pair(y)) => {
                    if Rc::ptr_eq(x, y) {
                        continue;
                    }
                    let key = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
                    if !seen.insert(key) {
                        continue;
                    }
                    work.push((x.tail(), y.tail()));
                    work.push((x.head(), y.head()));
                }
                (Value::Nil, Value::Nil) => {}
                (Value::Int(x), Value::Int(y)) if x == y => {}
                (Value::Symbol(x), Value::Symbol(y)) if x == y => {}
                (Value::Callable(x), Value::Callable(y)) if x.same(y) => {}
                _ => return false,
            }
        }
        true
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::utils::display_value(self))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::utils::display_value(self))
    }
}

pub struct ListIter {
    cur: Value,
    done: bool,
}

impl Iterator for ListIter {
    type Item = ValueResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match std::mem::replace(&mut self.cur, Value::Nil) {
            Value::Nil => {
                self.done = true;
                None
            }
            Value::Pair(p) => {
                self.cur = p.tail();
                Some(Ok(p.head()))
            }
            other => {
                self.done = true;
                Some(Err(ValueError::ImproperList(other.type_name())))
            }
        }
    }
}

pub struct Cells(Value);

impl Iterator for Cells {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match &self.0 {
            Value::Pair(p) => {
                let next = p.tail();
                Some(std::mem::replace(&mut self.0, next))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> Value {
        Value::symbol(name)
    }

    #[test]
    fn test_nil_symbol_is_empty_list() {
        assert_eq!(Value::symbol("NIL"), Value::Nil);
        assert!(Value::Nil.is_atom());
        assert!(Value::from(Symbol::new("NIL")).is_nil());
    }

    #[test]
    fn test_symbols_are_interned() {
        let a = Symbol::new("FOO");
        let b = Symbol::new("FOO");
        assert!(Rc::ptr_eq(&a.0, &b.0));
        assert_eq!(a, b);
        assert_ne!(a, Symbol::new("BAR"));
    }

    #[test]
    fn test_accessors() {
        let v = Value::list([sym("A"), sym("B"), Value::Int(3)]);
        assert_eq!(v.head().unwrap(), sym("A"));
        assert_eq!(v.second().unwrap(), sym("B"));
        assert_eq!(v.third().unwrap(), Value::Int(3));
        assert_eq!(v.tail_tail().unwrap().tail().unwrap(), Value::Nil);
        assert_eq!(v.nth(2).unwrap(), Value::Int(3));
        assert_eq!(v.nth(3), Err(ValueError::IndexOutOfRange(3)));
        assert_eq!(v.list_len().unwrap(), 3);
    }

    #[test]
    fn test_accessor_type_faults() {
        assert_eq!(Value::Int(1).head(), Err(ValueError::NotAPair("integer")));
        assert_eq!(Value::Nil.tail(), Err(ValueError::NotAPair("nil")));
        assert_eq!(sym("A").as_int(), Err(ValueError::NotAnInt("symbol")));
        assert_eq!(
            Value::Int(4).as_symbol_name(),
            Err(ValueError::NotASymbol("integer"))
        );
    }

    #[test]
    fn test_structural_equality() {
        let a = Value::list([sym("A"), Value::list([Value::Int(1), Value::Int(2)])]);
        let b = Value::list([sym("A"), Value::list([Value::Int(1), Value::Int(2)])]);
        let c = Value::list([sym("A"), Value::list([Value::Int(1), Value::Int(3)])]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(Value::cons(sym("A"), sym("B")), Value::list([sym("A"), sym("B")]));
    }

    #[test]
    fn test_improper_list_iteration() {
        let v = Value::dotted([Value::Int(1), Value::Int(2)], sym("X"));
        let items: Vec<_> = v.iter().collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2], Err(ValueError::ImproperList("symbol")));
        assert!(v.to_vec().is_err());
        assert_eq!(v.cells().count(), 2);
    }

    #[test]
    fn test_set_head_creates_cycle_in_place() {
        let frame = Value::cons(Value::symbol(PENDING_NAME), Value::Nil);
        assert!(frame.head().unwrap().is_pending());
        let closure = Value::cons(Value::Nil, frame.clone());
        frame.set_head(Value::list([closure.clone()])).unwrap();
        // closure -> frame -> (closure) -> frame
        let captured = closure.tail().unwrap();
        assert!(captured.ptr_eq(&frame));
        assert!(captured.head().unwrap().head().unwrap().ptr_eq(&closure));
        assert_eq!(closure, closure.clone());
    }

    #[test]
    fn test_equality_of_separate_cycles_terminates() {
        let make = |n: i64| {
            let frame = Value::cons(Value::symbol(PENDING_NAME), Value::Nil);
            let closure = Value::cons(Value::list([Value::Int(n)]), frame.clone());
            frame.set_head(Value::list([closure.clone()])).unwrap();
            closure
        };
        assert_eq!(make(1), make(1));
        assert_ne!(make(1), make(2));
    }

    #[test]
    fn test_deeply_nested_equality() {
        let nest = || (0..200_000).fold(Value::Nil, |acc, _| Value::list([acc]));
        assert_eq!(nest(), nest());
    }

    #[test]
    fn test_callable_call_and_arity() {
        let add = Callable::new(
            "PLUS",
            HostFn::Binary(Rc::new(|a: &Value, b: &Value| {
                Ok(Value::Int(
                    a.as_int().map_err(|e| e.to_string())? + b.as_int().map_err(|e| e.to_string())?,
                ))
            })),
        );
        assert_eq!(add.arity(), 2);
        assert_eq!(add.call(&[Value::Int(2), Value::Int(3)]), Ok(Value::Int(5)));
        assert!(add.call(&[Value::Int(2)]).is_err());
        assert!(add.same(&add.clone()));
    }

    #[test]
    fn test_long_list_drop_does_not_overflow() {
        let v = Value::list((0..200_000).map(Value::Int).collect::<Vec<_>>());
        assert_eq!(v.list_len().unwrap(), 200_000);
        drop(v);
    }
}
