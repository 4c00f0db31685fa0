//! Property-based tests for the value system and builtins, driven through
//! the public evaluation entry point.

use proptest::prelude::*;

use tactus_lang::ast::{BinaryOp, Node};
use tactus_lang::dispatch::NullDispatch;
use tactus_lang::interp::Interpreter;
use tactus_lang::value::MincValue;

fn eval(score: Node) -> MincValue {
    Interpreter::new()
        .run(&score, &mut NullDispatch)
        .expect("evaluation succeeds")
}

fn float_list_node(items: &[f64]) -> Node {
    Node::list(items.iter().map(|&v| Node::float(v)).collect())
}

proptest! {
    /// tostring followed by a literal parse recovers every finite float.
    #[test]
    fn tostring_roundtrip(x in proptest::num::f64::NORMAL | proptest::num::f64::ZERO) {
        let result = eval(Node::call_named("tostring", vec![Node::float(x)]));
        let MincValue::String(s) = result else {
            panic!("tostring yielded a non-string");
        };
        let parsed: f64 = s.parse().expect("canonical text parses");
        prop_assert_eq!(parsed, x);
    }

    /// substring(s, i, j) ++ substring(s, j, len) == substring(s, i, len)
    /// for any 0 <= i <= j <= len.
    #[test]
    fn substring_concatenation(
        s in "[a-z]{0,20}",
        raw_i in 0usize..=20,
        raw_j in 0usize..=20,
    ) {
        let len = s.len();
        let (i, j) = {
            let i = raw_i.min(len);
            let j = raw_j.min(len);
            (i.min(j), i.max(j))
        };

        let piecewise = eval(Node::binary(
            BinaryOp::Add,
            Node::call_named("substring", vec![
                Node::string(s.as_str()),
                Node::float(i as f64),
                Node::float(j as f64),
            ]),
            Node::call_named("substring", vec![
                Node::string(s.as_str()),
                Node::float(j as f64),
                Node::float(len as f64),
            ]),
        ));
        let whole = eval(Node::call_named("substring", vec![
            Node::string(s.as_str()),
            Node::float(i as f64),
            Node::float(len as f64),
        ]));
        prop_assert_eq!(piecewise.try_eq(&whole), Some(true));
    }

    /// interp(L, 0) is the first element and interp(L, 1) the last, for any
    /// nonempty float list.
    #[test]
    fn interp_endpoints(items in prop::collection::vec(-1000.0f64..1000.0, 1..12)) {
        let first = eval(Node::call_named("interp", vec![
            float_list_node(&items),
            Node::float(0.0),
        ]));
        prop_assert_eq!(first.try_eq(&items[0].into()), Some(true));

        let last = eval(Node::call_named("interp", vec![
            float_list_node(&items),
            Node::float(1.0),
        ]));
        prop_assert_eq!(last.try_eq(&items[items.len() - 1].into()), Some(true));
    }

    /// index(L, v) == i exactly when L[i] == v and no earlier element does.
    #[test]
    fn index_finds_first_match(
        items in prop::collection::vec(0.0f64..5.0, 0..10),
        needle in 0.0f64..5.0,
    ) {
        let items: Vec<f64> = items.iter().map(|v| v.trunc()).collect();
        let needle = needle.trunc();

        let result = eval(Node::call_named("index", vec![
            float_list_node(&items),
            Node::float(needle),
        ]));

        let expected = items
            .iter()
            .position(|&v| v == needle)
            .map_or(-1.0, |i| i as f64);
        prop_assert_eq!(result.try_eq(&expected.into()), Some(true));
    }

    /// Element-wise list arithmetic matches scalar arithmetic per slot.
    #[test]
    fn list_scalar_elementwise(
        items in prop::collection::vec(-100.0f64..100.0, 0..8),
        scalar in -100.0f64..100.0,
    ) {
        let result = eval(Node::binary(
            BinaryOp::Mul,
            float_list_node(&items),
            Node::float(scalar),
        ));
        let expected: Vec<f64> = items.iter().map(|v| v * scalar).collect();
        let expected = MincValue::new_list(expected.into_iter().map(MincValue::from).collect());
        prop_assert_eq!(result.try_eq(&expected), Some(true));
    }
}
