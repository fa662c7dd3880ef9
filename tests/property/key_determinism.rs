//! Property-based tests for operation key derivation

use proptest::prelude::*;
use querypipe::key::{hash, query_key, stable_stringify};
use querypipe::{QueryDocument, QuerySource, Variables};
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug)]
struct Printed(String);

impl QueryDocument for Printed {
    fn print(&self) -> String {
        self.0.clone()
    }
}

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-z ]{0,12}".prop_map(Value::from),
    ]
}

fn json_value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

fn variables() -> impl Strategy<Value = Vec<(String, Value)>> {
    prop::collection::btree_map("[a-z]{1,8}", json_value(), 0..6)
        .prop_map(|map| map.into_iter().collect())
}

fn build<'a>(entries: impl Iterator<Item = &'a (String, Value)>) -> Variables {
    let mut vars = Variables::new();
    for (name, value) in entries {
        vars.insert(name.clone(), value.clone());
    }
    vars
}

proptest! {
    #[test]
    fn key_is_independent_of_variable_insertion_order(
        query in "[a-z{} ]{1,40}",
        entries in variables(),
    ) {
        let source = QuerySource::from(query.as_str());
        prop_assert_eq!(
            query_key(&source, Some(&build(entries.iter())), &[]),
            query_key(&source, Some(&build(entries.iter().rev())), &[])
        );
    }

    #[test]
    fn document_and_text_hash_identically(query in "[a-zA-Z{}() :$!]{1,60}") {
        let text = QuerySource::from(query.as_str());
        let document = QuerySource::Document(Arc::new(Printed(query.clone())));
        prop_assert_eq!(query_key(&text, None, &[]), query_key(&document, None, &[]));
    }

    #[test]
    fn stable_stringify_is_valid_json_with_same_value(value in json_value()) {
        let text = stable_stringify(&value);
        let reparsed: Value = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(reparsed, value);
    }

    #[test]
    fn hash_is_deterministic(input in ".*") {
        prop_assert_eq!(hash(&input), hash(&input));
    }
}

#[test]
fn test_components_discriminate_otherwise_identical_requests() {
    let source = QuerySource::from("{ feed { id } }");
    let mut vars = Variables::new();
    vars.insert("first".into(), json!(10));
    assert_ne!(
        query_key(&source, Some(&vars), &["page:1"]),
        query_key(&source, Some(&vars), &["page:2"])
    );
}
