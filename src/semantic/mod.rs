pub mod scope;

use crate::vm::bytecode::{Keyword, NamedClosure};
use crate::vm::value::{Symbol, Value};

pub use scope::{Address, ScopeStack};

/// letrec arms whose initializer is a LAMBDA, each with the code block the
/// compiler emitted for it, so listings can label the block.
#[derive(Debug, Default)]
pub struct NamedClosures {
    entries: Vec<NamedClosure>,
}

impl NamedClosures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the block of one arm right after that arm is compiled, so a
    /// binder name reused by a nested LETREC labels its own block only.
    pub fn record(&mut self, name: &Symbol, body: Value) {
        self.entries.push(NamedClosure {
            name: name.name().to_string(),
            body,
        });
    }

    pub fn into_entries(self) -> Vec<NamedClosure> {
        self.entries
    }
}

/// `(LAMBDA params body)` 형태인지 확인
pub fn is_lambda_form(v: &Value) -> bool {
    v.head()
        .map(|h| Keyword::from_value(&h) == Some(Keyword::Lambda))
        .unwrap_or(false)
}

/// Checks a binder list: proper list of non-reserved, distinct symbols.
pub fn check_binders(names: &Value) -> Result<Vec<Symbol>, String> {
    let mut out: Vec<Symbol> = Vec::new();
    for item in names.iter() {
        let item = item.map_err(|e| format!("binder list: {e}"))?;
        let sym = match &item {
            Value::Symbol(s) => s.clone(),
            Value::Nil => return Err("NIL cannot be bound".to_string()),
            other => return Err(format!("binder must be a symbol, found {}", other.type_name())),
        };
        if Keyword::is_reserved(sym.name()) {
            return Err(format!("keyword {} cannot be bound", sym));
        }
        if out.contains(&sym) {
            return Err(format!("duplicate binder {}", sym));
        }
        out.push(sym);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_binders() {
        let ok = Value::list([Value::symbol("A"), Value::symbol("B")]);
        assert_eq!(check_binders(&ok).unwrap().len(), 2);

        let dup = Value::list([Value::symbol("A"), Value::symbol("A")]);
        assert!(check_binders(&dup).unwrap_err().contains("duplicate"));

        let kw = Value::list([Value::symbol("IF")]);
        assert!(check_binders(&kw).unwrap_err().contains("keyword"));

        let num = Value::list([Value::Int(3)]);
        assert!(check_binders(&num).is_err());

        assert!(check_binders(&Value::Nil).unwrap().is_empty());
    }

    #[test]
    fn test_named_closures_keep_record_order() {
        let mut named = NamedClosures::new();
        named.record(&Symbol::new("F"), Value::Int(1));
        named.record(&Symbol::new("F"), Value::Int(2));
        let entries = named.into_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "F");
        assert_eq!(entries[1].body, Value::Int(2));
    }

    #[test]
    fn test_is_lambda_form() {
        let lam = Value::list([Value::symbol("LAMBDA"), Value::Nil, Value::Int(1)]);
        assert!(is_lambda_form(&lam));
        assert!(!is_lambda_form(&Value::symbol("LAMBDA")));
        assert!(!is_lambda_form(&Value::list([Value::symbol("F")])));
    }
}
