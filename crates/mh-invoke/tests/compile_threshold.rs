//! Runs with forms compiled on first use; this binary installs its own
//! configuration before anything reads the global one.

mod support;

use mh_bytecode::Instr;
use mh_core::config::{self, InvokeConfig};
use mh_core::{classes, BasicType, Value};
use mh_invoke::combinators::{catch_exception, filter_return_value, guard_with_test, identity};
use mh_invoke::form::{Argument, Intrinsic};
use mh_invoke::{FormBuilder, FormKind, Lookup};
use pretty_assertions::assert_eq;
use std::sync::Once;
use support::{demo, int, ty};

static SETUP: Once = Once::new();

fn setup() {
    SETUP.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let installed = config::install(InvokeConfig {
            compile_threshold: 0,
            max_compiled_names: 8,
            ..InvokeConfig::default()
        });
        assert!(installed.is_ok(), "configuration was read before install");
    });
}

#[test]
fn forms_compile_on_first_use() {
    setup();
    let mut b = FormBuilder::new(&[BasicType::L, BasicType::I]);
    let arg = b.param(1);
    let result = b.add(Intrinsic::Identity(BasicType::I), vec![arg]);
    let form = b.build(Some(result), FormKind::Identity).unwrap();
    assert!(!form.is_compiled());
    assert_eq!(
        form.invoke(&[Value::Null, Value::Int(3)]).unwrap(),
        Value::Int(3)
    );
    assert!(form.is_compiled());
    assert_eq!(
        form.invoke(&[Value::Null, Value::Int(-3)]).unwrap(),
        Value::Int(-3)
    );
}

#[test]
fn compiled_combinators_keep_their_results() {
    setup();
    let d = demo();
    let lookup = Lookup::new(&d.math);
    let unary = ty(&int(), &[int()]);
    let binary = ty(&int(), &[int(), int()]);
    let negate = lookup.find_static(&d.math, "negate", &unary).unwrap();
    let max = lookup.find_static(&d.math, "max", &binary).unwrap();

    let negated_max = filter_return_value(&max, &negate).unwrap();
    assert_eq!(
        negated_max
            .invoke_exact(&binary, &[Value::Int(2), Value::Int(6)])
            .unwrap(),
        Value::Int(-6)
    );
    assert!(negated_max.form().is_compiled());

    let is_negative = lookup
        .find_static(&d.math, "isNegative", &ty(classes::boolean(), &[int()]))
        .unwrap();
    let abs = guard_with_test(&is_negative, &negate, &identity(classes::int()).unwrap()).unwrap();
    for (input, expected) in [(-4, 4), (4, 4)] {
        assert_eq!(
            abs.invoke_exact(&unary, &[Value::Int(input)]).unwrap(),
            Value::Int(expected)
        );
    }

    let divide = lookup.find_static(&d.math, "divide", &binary).unwrap();
    let return_zero = lookup
        .find_static(
            &d.math,
            "returnZero",
            &ty(&int(), &[classes::arithmetic_exception().clone()]),
        )
        .unwrap();
    let safe = catch_exception(&divide, classes::arithmetic_exception(), &return_zero).unwrap();
    assert_eq!(
        safe.invoke_exact(&binary, &[Value::Int(9), Value::Int(0)])
            .unwrap(),
        Value::Int(0)
    );
    assert_eq!(
        safe.invoke_exact(&binary, &[Value::Int(9), Value::Int(3)])
            .unwrap(),
        Value::Int(3)
    );
}

#[test]
fn oversized_forms_link_an_interpreter_stub() {
    setup();
    let mut b = FormBuilder::new(&[BasicType::L, BasicType::I]);
    let mut last = b.param(1);
    for _ in 0..10 {
        last = Argument::Name(b.add(Intrinsic::Identity(BasicType::I), vec![last]));
    }
    let Argument::Name(result) = last else {
        unreachable!("chain ends in a name");
    };
    let form = b.build(Some(result), FormKind::Identity).unwrap();
    assert!(form.names().len() > config::global().max_compiled_names);

    assert_eq!(
        form.invoke(&[Value::Null, Value::Int(11)]).unwrap(),
        Value::Int(11)
    );
    let executable = form.compiled().unwrap();
    assert!(executable
        .function()
        .code
        .iter()
        .any(|instr| matches!(instr, Instr::InvokeInterpreter { .. })));
    assert_eq!(
        form.invoke(&[Value::Null, Value::Int(12)]).unwrap(),
        Value::Int(12)
    );
}
