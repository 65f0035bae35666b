//! Value 출력 유틸리티
//!
//! The printer is the inverse of the reader for every value the reader can
//! produce: `read(display_value(v)) == v`.

use super::value::{Pair, Value};
use std::collections::HashSet;
use std::rc::Rc;

/// Value를 S-expression 문자열로 변환
///
/// ```ignore
/// display_value(&Value::Int(42))                          // → "42"
/// display_value(&Value::Nil)                              // → "NIL"
/// display_value(&Value::cons(Value::Int(1), Value::Int(2))) // → "(1 . 2)"
/// ```
pub fn display_value(v: &Value) -> String {
    let mut out = String::new();
    let mut path = HashSet::new();
    write_value(v, &mut out, &mut path);
    out
}

/// Same as [`display_value`] but cut off after `max` characters.
pub fn display_truncated(v: &Value, max: usize) -> String {
    let s = display_value(v);
    if s.chars().count() <= max {
        s
    } else {
        let mut cut: String = s.chars().take(max).collect();
        cut.push_str("...");
        cut
    }
}

fn cell_key(p: &Rc<Pair>) -> usize {
    Rc::as_ptr(p) as *const () as usize
}

// `path` holds the pair cells currently being printed; revisiting one means
// the value is cyclic (a letrec closure reaching its own frame).
fn write_value(v: &Value, out: &mut String, path: &mut HashSet<usize>) {
    match v {
        Value::Nil => out.push_str("NIL"),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Symbol(s) => out.push_str(s.name()),
        Value::Callable(c) => out.push_str(&format!("#<{}/{}>", c.name(), c.arity())),
        Value::Pair(first) => {
            if path.contains(&cell_key(first)) {
                out.push_str("#cycle");
                return;
            }
            let mut entered = vec![cell_key(first)];
            path.insert(cell_key(first));
            out.push('(');
            write_value(&first.head(), out, path);

            let mut rest = first.tail();
            loop {
                match rest {
                    Value::Nil => break,
                    Value::Pair(p) => {
                        let key = cell_key(&p);
                        if path.contains(&key) {
                            out.push_str(" . #cycle");
                            break;
                        }
                        path.insert(key);
                        entered.push(key);
                        out.push(' ');
                        write_value(&p.head(), out, path);
                        rest = p.tail();
                    }
                    atom => {
                        out.push_str(" . ");
                        write_value(&atom, out, path);
                        break;
                    }
                }
            }
            out.push(')');
            for key in entered {
                path.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::value::PENDING_NAME;

    #[test]
    fn test_display_atoms() {
        assert_eq!(display_value(&Value::Int(-42)), "-42");
        assert_eq!(display_value(&Value::Nil), "NIL");
        assert_eq!(display_value(&Value::symbol("ABC")), "ABC");
    }

    #[test]
    fn test_display_lists() {
        let v = Value::list([Value::symbol("A"), Value::list([Value::Int(1)]), Value::Nil]);
        assert_eq!(display_value(&v), "(A (1) NIL)");
        let dotted = Value::dotted([Value::Int(1), Value::Int(2)], Value::Int(3));
        assert_eq!(display_value(&dotted), "(1 2 . 3)");
    }

    #[test]
    fn test_display_shared_but_acyclic() {
        let shared = Value::list([Value::Int(1)]);
        let v = Value::list([shared.clone(), shared]);
        assert_eq!(display_value(&v), "((1) (1))");
    }

    #[test]
    fn test_display_cycle_is_guarded() {
        let frame = Value::cons(Value::symbol(PENDING_NAME), Value::Nil);
        let closure = Value::cons(Value::list([Value::symbol("RTN")]), frame.clone());
        frame.set_head(Value::list([closure.clone()])).unwrap();
        assert_eq!(display_value(&closure), "((RTN) (#cycle))");
    }

    #[test]
    fn test_display_truncated() {
        let v = Value::list((1..=20).map(Value::Int).collect::<Vec<_>>());
        let s = display_truncated(&v, 10);
        assert_eq!(s, "(1 2 3 4 5...");
    }
}
