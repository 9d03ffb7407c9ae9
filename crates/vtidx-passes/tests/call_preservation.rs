// tests/call_preservation.rs
//
// Programs compute the same results before and after the vtable rewrite.

mod common;

use common::{sequential, zoo};
use vtidx_ir::{Interpreter, Trap, Value};
use vtidx_passes::vtable_to_indexes;

fn run(module: &vtidx_ir::Module, name: &str) -> Result<Vec<Value>, Trap> {
    let func = module.function_by_name(name).expect("function exists");
    Interpreter::new(module)?.call(func, vec![])
}

#[test]
fn dispatch_through_field_is_preserved() {
    let mut module = zoo().module;
    let before = run(&module, "main").unwrap();
    assert_eq!(before, vec![Value::I32(106)]);

    vtable_to_indexes(&mut module, &sequential()).unwrap();
    assert_eq!(run(&module, "main").unwrap(), before);
}

#[test]
fn loaded_reference_is_still_callable() {
    let mut module = zoo().module;
    let before = run(&module, "fetch_and_call").unwrap();
    assert_eq!(before, vec![Value::I32(6)]);

    vtable_to_indexes(&mut module, &sequential()).unwrap();
    assert_eq!(run(&module, "fetch_and_call").unwrap(), before);
}

#[test]
fn fields_hold_indices_at_run_time() {
    let z = zoo();
    let mut module = z.module;
    vtable_to_indexes(&mut module, &sequential()).unwrap();

    let interp = Interpreter::new(&module).unwrap();
    let Some(Value::Struct(rex)) = interp.global_value(z.dog_global.as_usize()) else {
        panic!("rex is not a struct");
    };
    assert_eq!(rex.fields.borrow()[0], Value::I32(1));

    let table = module.table_by_name("vtable$Animal$speak").unwrap();
    assert_eq!(
        interp.table_contents(table),
        Some(&[Value::Func(z.meow), Value::Func(z.bark)][..])
    );
}
