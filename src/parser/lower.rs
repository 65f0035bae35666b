//! Datum → Value 변환 (linearizer)
//!
//! Spans do not live on the values themselves. Each pair cell built here is
//! recorded in a [`SourceMap`] together with the span of the datum stored in
//! its head slot, so the compiler can point diagnostics at a sub-expression.

use super::ast::{Datum, DatumS};
use crate::types::Span;
use crate::vm::bytecode::Keyword;
use crate::vm::value::Value;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct SourceMap {
    heads: HashMap<usize, Span>,
    root: Option<Span>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Span of the datum held in the head of `cell`.
    pub fn head_span(&self, cell: &Value) -> Option<Span> {
        cell.cell_id().and_then(|id| self.heads.get(&id).cloned())
    }

    /// Span of the whole top-level datum.
    pub fn root(&self) -> Option<Span> {
        self.root.clone()
    }

    fn record(&mut self, cell: &Value, span: Span) {
        if let Some(id) = cell.cell_id() {
            self.heads.insert(id, span);
        }
    }
}

/// Converts a parsed datum into a Value and fills `map` with the spans of its
/// list elements.
pub fn lower(datum: &DatumS, map: &mut SourceMap) -> Value {
    map.root = Some(datum.1.clone());
    lower_datum(datum, map)
}

fn lower_datum((datum, span): &DatumS, map: &mut SourceMap) -> Value {
    match datum {
        Datum::Int(i) => Value::Int(*i),
        Datum::Symbol(name) => Value::symbol(name),
        Datum::Quote(inner) => {
            let quoted = lower_datum(inner, map);
            let rest = Value::cons(quoted, Value::Nil);
            map.record(&rest, inner.1.clone());
            let head = Value::cons(Value::Symbol(Keyword::Quote.symbol()), rest);
            map.record(&head, span.start..span.start + 1);
            head
        }
        Datum::List(items, tail) => {
            let tail = match tail {
                Some(t) => lower_datum(t, map),
                None => Value::Nil,
            };
            let elements: Vec<(Value, Span)> = items
                .iter()
                .map(|item| (lower_datum(item, map), item.1.clone()))
                .collect();
            // back to front, so every cell is built with its final tail
            elements.into_iter().rev().fold(tail, |rest, (value, span)| {
                let cell = Value::cons(value, rest);
                map.record(&cell, span);
                cell
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str) -> DatumS {
        (Datum::Symbol(name.into()), 0..0)
    }

    #[test]
    fn test_lower_list_records_element_spans() {
        let datum = (
            Datum::List(
                vec![
                    (Datum::Symbol("F".into()), 1..2),
                    (Datum::Int(7), 3..4),
                ],
                None,
            ),
            0..5,
        );
        let mut map = SourceMap::new();
        let v = lower(&datum, &mut map);
        assert_eq!(v.to_string(), "(F 7)");
        let cells: Vec<Value> = v.cells().collect();
        assert_eq!(map.head_span(&cells[0]), Some(1..2));
        assert_eq!(map.head_span(&cells[1]), Some(3..4));
        assert_eq!(map.root(), Some(0..5));
    }

    #[test]
    fn test_lower_dotted_and_nil() {
        let datum = (Datum::List(vec![sym("A")], Some(Box::new(sym("B")))), 0..0);
        let v = lower(&datum, &mut SourceMap::new());
        assert_eq!(v, Value::cons(Value::symbol("A"), Value::symbol("B")));

        let empty = (Datum::List(vec![], None), 0..2);
        assert_eq!(lower(&empty, &mut SourceMap::new()), Value::Nil);
        assert_eq!(lower(&sym("NIL"), &mut SourceMap::new()), Value::Nil);
    }

    #[test]
    fn test_lower_quote() {
        let datum = (Datum::Quote(Box::new((Datum::Int(3), 1..2))), 0..2);
        let mut map = SourceMap::new();
        let v = lower(&datum, &mut map);
        assert_eq!(v.to_string(), "(QUOTE 3)");
        let second_cell = v.tail().unwrap();
        assert_eq!(map.head_span(&second_cell), Some(1..2));
    }
}
