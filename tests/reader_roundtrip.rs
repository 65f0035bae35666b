use proptest::prelude::*;
use secdkit::vm::Value;

fn symbol() -> impl Strategy<Value = Value> {
    "[A-Z][A-Z0-9*+-]{0,5}"
        .prop_filter("NIL reads as the empty list", |s| s != "NIL")
        .prop_map(|s| Value::symbol(&s))
}

fn atom() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Int),
        symbol(),
        Just(Value::Nil),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    atom().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::list),
            (prop::collection::vec(inner.clone(), 1..4), atom())
                .prop_filter("a dotted tail must not be NIL", |(_, tail)| !tail.is_nil())
                .prop_map(|(items, tail)| Value::dotted(items, tail)),
        ]
    })
}

proptest! {
    #[test]
    fn printed_values_read_back(v in value()) {
        let text = v.to_string();
        let read = secdkit::read_value(&text);
        prop_assert!(read.is_ok(), "failed to read {:?}: {:?}", text, read);
        prop_assert_eq!(read.unwrap(), v);
    }

    #[test]
    fn print_is_a_fixed_point(v in value()) {
        let once = v.to_string();
        let twice = secdkit::read_value(&once).map(|r| r.to_string());
        prop_assert_eq!(twice, Ok(once));
    }
}

#[test]
fn quote_sugar_reads_as_a_list() {
    let v = secdkit::read_value("'(A . B)").unwrap();
    assert_eq!(v.to_string(), "(QUOTE (A . B))");
}
