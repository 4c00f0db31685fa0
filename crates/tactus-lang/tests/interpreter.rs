//! End-to-end interpreter tests: whole score trees evaluated through the
//! public entry point, including host dispatch and method calls.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use tactus_lang::ast::{BinaryOp, MemberDecl, Node, NodeKind, ParamDecl, RelOp};
use tactus_lang::dispatch::{DispatchError, ExternalDispatch, NullDispatch};
use tactus_lang::error::MincError;
use tactus_lang::interp::Interpreter;
use tactus_lang::value::{MincHandle, MincType, MincValue};

/// Host that records external calls and implements a toy handle algebra.
#[derive(Default)]
struct RecordingHost {
    calls: Vec<(String, Vec<MincValue>)>,
}

impl ExternalDispatch for RecordingHost {
    fn call_function(
        &mut self,
        name: &str,
        args: &[MincValue],
    ) -> Result<MincValue, DispatchError> {
        self.calls.push((name.to_string(), args.to_vec()));
        match name {
            "maketable" => Ok(MincValue::Handle(MincHandle(7))),
            "rtsetparams" => Ok(MincValue::Float(0.0)),
            "failing" => Err(DispatchError::Failed("device busy".into())),
            _ => Err(DispatchError::NotFound),
        }
    }

    fn handle_op(
        &mut self,
        op: BinaryOp,
        lhs: &MincValue,
        rhs: &MincValue,
    ) -> Result<MincValue, DispatchError> {
        // Toy semantics: fold the float operand into the handle id.
        let (MincValue::Handle(h), MincValue::Float(v)) = (lhs, rhs) else {
            return Err(DispatchError::NotFound);
        };
        match op {
            BinaryOp::Add => Ok(MincValue::Handle(MincHandle(h.0 + *v as u64))),
            _ => Err(DispatchError::NotFound),
        }
    }
}

struct Capture(Rc<RefCell<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route interpreter diagnostics through the test harness so failures show
/// the warnings that led up to them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("warn")
        .try_init();
}

fn eval(score: Node) -> Result<MincValue, MincError> {
    init_tracing();
    Interpreter::new().run(&score, &mut NullDispatch)
}

fn assert_float(result: &MincValue, expected: f64) {
    assert_eq!(
        result.try_eq(&MincValue::Float(expected)),
        Some(true),
        "expected {expected}, got {result:?}"
    );
}

#[test]
fn test_arithmetic_expression() {
    // (2 + 3) * 4
    let score = Node::binary(
        BinaryOp::Mul,
        Node::binary(BinaryOp::Add, Node::float(2.0), Node::float(3.0)),
        Node::float(4.0),
    );
    assert_float(&eval(score).unwrap(), 20.0);
}

#[test]
fn test_store_and_load() {
    let score = Node::stmts(vec![
        Node::store(Node::load_auto("amp"), Node::float(0.5)),
        Node::binary(BinaryOp::Mul, Node::load("amp"), Node::float(2.0)),
    ]);
    assert_float(&eval(score).unwrap(), 1.0);
}

#[test]
fn test_undefined_symbol_is_fatal() {
    let err = eval(Node::load("nothing")).unwrap_err();
    assert!(matches!(err, MincError::UndefinedSymbol(_)));
}

#[test]
fn test_list_write_growth() {
    // L = {}; L[3] = 7  =>  L == {0, 0, 0, 7}
    let score = Node::stmts(vec![
        Node::store(Node::load_auto("L"), Node::list(vec![])),
        Node::subscript_write(Node::load("L"), Node::float(3.0), Node::float(7.0)),
    ]);
    let mut interp = Interpreter::new();
    interp.run(&score, &mut NullDispatch).unwrap();

    let expected = MincValue::new_list(vec![
        0.0.into(),
        0.0.into(),
        0.0.into(),
        7.0.into(),
    ]);
    assert_eq!(interp.global("L").unwrap().try_eq(&expected), Some(true));
}

#[test]
fn test_list_negative_index_and_interpolation() {
    let score = Node::stmts(vec![
        Node::store(
            Node::load_auto("L"),
            Node::list(vec![Node::float(0.0), Node::float(10.0)]),
        ),
        Node::store(
            Node::load_auto("last"),
            Node::subscript(Node::load("L"), Node::float(-1.0)),
        ),
        Node::subscript(Node::load("L"), Node::float(0.5)),
    ]);
    let mut interp = Interpreter::new();
    let mid = interp.run(&score, &mut NullDispatch).unwrap();
    assert_float(&mid, 5.0);
    assert_float(&interp.global("last").unwrap(), 10.0);
}

#[test]
fn test_map_created_on_first_write() {
    // m["freq"] = 440; m["freq"]
    let score = Node::stmts(vec![
        Node::subscript_write(
            Node::load_auto("m"),
            Node::string("freq"),
            Node::float(440.0),
        ),
        Node::subscript(Node::load("m"), Node::string("freq")),
    ]);
    assert_float(&eval(score).unwrap(), 440.0);
}

#[test]
fn test_map_missing_key_is_fatal() {
    let score = Node::stmts(vec![
        Node::subscript_write(Node::load_auto("m"), Node::float(1.0), Node::float(2.0)),
        Node::subscript(Node::load("m"), Node::string("absent")),
    ]);
    assert!(matches!(eval(score), Err(MincError::MapKeyMissing(_))));
}

#[test]
fn test_string_subscript_clamps() {
    let score = Node::subscript(Node::string("abc"), Node::float(99.0));
    assert_eq!(eval(score).unwrap().try_eq(&"c".into()), Some(true));
}

#[test]
fn test_list_aliasing_through_assignment() {
    // a = {1}; b = a; b[0] = 9; a[0]
    let score = Node::stmts(vec![
        Node::store(Node::load_auto("a"), Node::list(vec![Node::float(1.0)])),
        Node::store(Node::load_auto("b"), Node::load("a")),
        Node::subscript_write(Node::load("b"), Node::float(0.0), Node::float(9.0)),
        Node::subscript(Node::load("a"), Node::float(0.0)),
    ]);
    assert_float(&eval(score).unwrap(), 9.0);
}

#[test]
fn test_control_flow_while_loop() {
    // total = 0; i = 0; while (i < 5) { total += i; i += 1 }
    let body = Node::stmts(vec![
        Node::new(NodeKind::OpAssign {
            lhs: Box::new(Node::load("total")),
            rhs: Box::new(Node::load("i")),
            op: BinaryOp::Add,
        }),
        Node::new(NodeKind::OpAssign {
            lhs: Box::new(Node::load("i")),
            rhs: Box::new(Node::float(1.0)),
            op: BinaryOp::Add,
        }),
    ]);
    let score = Node::stmts(vec![
        Node::store(Node::load_auto("total"), Node::float(0.0)),
        Node::store(Node::load_auto("i"), Node::float(0.0)),
        Node::new(NodeKind::While {
            cond: Box::new(Node::relation(RelOp::Lt, Node::load("i"), Node::float(5.0))),
            body: Box::new(body),
        }),
        Node::load("total"),
    ]);
    assert_float(&eval(score).unwrap(), 10.0);
}

#[test]
fn test_for_loop() {
    // for (i = 0; i < 4; i += 1) acc = acc + 2
    let score = Node::stmts(vec![
        Node::store(Node::load_auto("acc"), Node::float(0.0)),
        Node::new(NodeKind::For {
            init: Box::new(Node::store(Node::load_auto("i"), Node::float(0.0))),
            cond: Box::new(Node::relation(RelOp::Lt, Node::load("i"), Node::float(4.0))),
            step: Box::new(Node::new(NodeKind::OpAssign {
                lhs: Box::new(Node::load("i")),
                rhs: Box::new(Node::float(1.0)),
                op: BinaryOp::Add,
            })),
            body: Box::new(Node::store(
                Node::load_auto("acc"),
                Node::binary(BinaryOp::Add, Node::load("acc"), Node::float(2.0)),
            )),
        }),
        Node::load("acc"),
    ]);
    assert_float(&eval(score).unwrap(), 8.0);
}

#[test]
fn test_or_short_circuits_rhs() {
    // 1 || undefined() must not reach the undefined call.
    let score = Node::new(NodeKind::Or(
        Box::new(Node::float(1.0)),
        Box::new(Node::call_named("undefined_function", vec![])),
    ));
    assert_float(&eval(score).unwrap(), 1.0);
}

#[test]
fn test_function_call_and_recursion() {
    // function fact(n) { if (n <= 1) return 1 else return n * fact(n - 1) }
    let body = Node::new(NodeKind::IfElse {
        cond: Box::new(Node::relation(RelOp::Le, Node::load("n"), Node::float(1.0))),
        then: Box::new(Node::ret(Node::float(1.0))),
        other: Box::new(Node::ret(Node::binary(
            BinaryOp::Mul,
            Node::load("n"),
            Node::call_named(
                "fact",
                vec![Node::binary(BinaryOp::Sub, Node::load("n"), Node::float(1.0))],
            ),
        ))),
    });
    let score = Node::stmts(vec![
        Node::func_def("fact", vec![ParamDecl::new("n", MincType::Float)], body),
        Node::call_named("fact", vec![Node::float(5.0)]),
    ]);
    assert_float(&eval(score).unwrap(), 120.0);
}

#[test]
fn test_scope_restored_after_calls() {
    let body = Node::new(NodeKind::Block(Box::new(Node::ret(Node::float(5.0)))));
    let score = Node::stmts(vec![
        Node::func_def("f", vec![], body),
        Node::call_named("f", vec![]),
    ]);

    let mut interp = Interpreter::new();
    let before = interp.current_scope();
    let result = interp.run(&score, &mut NullDispatch).unwrap();
    assert_float(&result, 5.0);
    // Nonlocal return through a nested block must land back at the same depth.
    assert_eq!(interp.current_scope(), before);
}

#[test]
fn test_missing_args_default_to_zero() {
    // function f(a, b) { return a + b }  f(3) => 3 + 0
    let score = Node::stmts(vec![
        Node::func_def(
            "f",
            vec![
                ParamDecl::new("a", MincType::Float),
                ParamDecl::new("b", MincType::Float),
            ],
            Node::ret(Node::binary(BinaryOp::Add, Node::load("a"), Node::load("b"))),
        ),
        Node::call_named("f", vec![Node::float(3.0)]),
    ]);
    assert_float(&eval(score).unwrap(), 3.0);
}

#[test]
fn test_too_many_args_is_fatal() {
    let score = Node::stmts(vec![
        Node::func_def("f", vec![], Node::ret(Node::float(0.0))),
        Node::call_named("f", vec![Node::float(1.0)]),
    ]);
    assert!(matches!(eval(score), Err(MincError::TooManyArgs { .. })));
}

#[test]
fn test_function_redeclaration() {
    let score = Node::stmts(vec![
        Node::func_def("f", vec![], Node::ret(Node::float(1.0))),
        Node::func_def("f", vec![], Node::ret(Node::float(2.0))),
    ]);
    assert!(matches!(eval(score), Err(MincError::FunctionRedeclared(_))));

    // Embedded hosts tolerate redefinition; the newest body wins.
    let score = Node::stmts(vec![
        Node::func_def("f", vec![], Node::ret(Node::float(1.0))),
        Node::func_def("f", vec![], Node::ret(Node::float(2.0))),
        Node::call_named("f", vec![]),
    ]);
    let mut interp = Interpreter::new();
    interp.settings_mut().embedded = true;
    let result = interp.run(&score, &mut NullDispatch).unwrap();
    assert_float(&result, 2.0);
}

#[test]
fn test_type_overwrite_gate() {
    let score = Node::stmts(vec![
        Node::store(Node::load_auto("x"), Node::float(1.0)),
        Node::store(Node::load_auto("x"), Node::string("s")),
    ]);

    // Permissive by default: warn and overwrite.
    assert!(eval(score.clone()).is_ok());

    let mut interp = Interpreter::new();
    interp.settings_mut().allow_type_overwrite = false;
    let err = interp.run(&score, &mut NullDispatch).unwrap_err();
    assert!(matches!(err, MincError::TypeClash { .. }));
}

#[test]
fn test_method_dispatch() {
    // struct P { float x }; function P.get() { return this.x }
    // p = P{42}; p.get()
    let score = Node::stmts(vec![
        Node::new(NodeKind::StructDef {
            name: "P".into(),
            members: vec![MemberDecl::new("x", MincType::Float)],
        }),
        Node::method_def(
            "P",
            "get",
            vec![],
            Node::ret(Node::member(Node::load("this"), "x")),
        ),
        Node::new(NodeKind::StructDecl {
            type_name: "P".into(),
            var_name: "p".into(),
            inits: Some(vec![Node::float(42.0)]),
        }),
        Node::call(Node::member(Node::load("p"), "get"), vec![]),
    ]);
    assert_float(&eval(score).unwrap(), 42.0);
}

#[test]
fn test_member_read_and_write() {
    let score = Node::stmts(vec![
        Node::new(NodeKind::StructDef {
            name: "Env".into(),
            members: vec![
                MemberDecl::new("attack", MincType::Float),
                MemberDecl::new("label", MincType::String),
            ],
        }),
        Node::new(NodeKind::StructDecl {
            type_name: "Env".into(),
            var_name: "e".into(),
            inits: None,
        }),
        Node::store(Node::member(Node::load("e"), "attack"), Node::float(0.01)),
        Node::member(Node::load("e"), "attack"),
    ]);
    assert_float(&eval(score).unwrap(), 0.01);
}

#[test]
fn test_struct_def_outside_global_scope_is_fatal() {
    let score = Node::block(Node::new(NodeKind::StructDef {
        name: "P".into(),
        members: vec![MemberDecl::new("x", MincType::Float)],
    }));
    assert!(matches!(eval(score), Err(MincError::StructTypeNotGlobal(_))));
}

#[test]
fn test_struct_initializer_type_mismatch() {
    let score = Node::stmts(vec![
        Node::new(NodeKind::StructDef {
            name: "P".into(),
            members: vec![MemberDecl::new("x", MincType::Float)],
        }),
        Node::new(NodeKind::StructDecl {
            type_name: "P".into(),
            var_name: "p".into(),
            inits: Some(vec![Node::string("not a float")]),
        }),
    ]);
    assert!(matches!(eval(score), Err(MincError::InitializerType { .. })));
}

#[test]
fn test_external_dispatch() {
    let score = Node::call_named(
        "rtsetparams",
        vec![Node::float(44100.0), Node::float(2.0)],
    );
    let mut host = RecordingHost::default();
    Interpreter::new().run(&score, &mut host).unwrap();
    assert_eq!(host.calls.len(), 1);
    assert_eq!(host.calls[0].0, "rtsetparams");
    assert_eq!(host.calls[0].1.len(), 2);
}

#[test]
fn test_external_failure_propagates() {
    let mut host = RecordingHost::default();
    let err = Interpreter::new()
        .run(&Node::call_named("failing", vec![]), &mut host)
        .unwrap_err();
    assert!(matches!(err, MincError::External { .. }));
}

#[test]
fn test_unknown_function_is_fatal() {
    let err = eval(Node::call_named("no_such_thing", vec![])).unwrap_err();
    assert!(matches!(err, MincError::UndefinedFunction(_)));
}

#[test]
fn test_handle_ops_are_delegated() {
    // t = maketable(); t + 3 => handle with folded id
    let score = Node::stmts(vec![
        Node::store(Node::load_auto("t"), Node::call_named("maketable", vec![])),
        Node::binary(BinaryOp::Add, Node::load("t"), Node::float(3.0)),
    ]);
    let mut host = RecordingHost::default();
    let result = Interpreter::new().run(&score, &mut host).unwrap();
    assert_eq!(
        result.try_eq(&MincValue::Handle(MincHandle(10))),
        Some(true)
    );
}

#[test]
fn test_nested_list_depth_cap() {
    let mut interp = Interpreter::new();
    interp.settings_mut().max_stack = 2;
    let score = Node::list(vec![Node::list(vec![Node::list(vec![Node::float(1.0)])])]);
    let err = interp.run(&score, &mut NullDispatch).unwrap_err();
    assert!(matches!(err, MincError::StackOverflow(_)));
}

#[test]
fn test_builtin_output_through_run() {
    let buffer = Rc::new(RefCell::new(Vec::new()));
    let mut interp = Interpreter::new();
    interp.set_output(Box::new(Capture(Rc::clone(&buffer))));

    let score = Node::call_named(
        "printf",
        vec![
            Node::string("%s=%d\\n"),
            Node::string("beats"),
            Node::float(4.9),
        ],
    );
    interp.run(&score, &mut NullDispatch).unwrap();
    assert_eq!(String::from_utf8(buffer.borrow().clone()).unwrap(), "beats=4\n");
}

#[test]
fn test_interpreter_usable_after_fatal_error() {
    let mut interp = Interpreter::new();
    assert!(interp.run(&Node::load("nope"), &mut NullDispatch).is_err());
    // A failed pass must not poison the next one.
    let result = interp
        .run(&Node::float(1.0), &mut NullDispatch)
        .unwrap();
    assert_float(&result, 1.0);
    assert_eq!(interp.current_scope(), 0);
}
