use crate::types::Span;

pub type DatumS = (Datum, Span);

/// Surface syntax of an S-expression, before it becomes a [`Value`](crate::vm::Value).
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Int(i64),
    Symbol(String),
    /// `(a b ...)` or `(a b ... . tail)`
    List(Vec<DatumS>, Option<Box<DatumS>>),
    /// `'d`
    Quote(Box<DatumS>),
}
