// tests/common/mod.rs
//
// Sample modules shared by the integration tests.

#![allow(dead_code)]

use vtidx_ir::{
    BinaryOp, Expr, Field, FunctionId, GlobalId, HeapTypeId, Module, Signature, Type,
};
use vtidx_passes::{Parallelism, PassOptions};

pub fn sequential() -> PassOptions {
    PassOptions::default().with_parallelism(Parallelism::Sequential)
}

/// `Animal { speak: (ref $speak), legs: i32 }` and `Dog : Animal { .., weight: f64 }`,
/// where `$speak` takes the animal itself.
pub struct Zoo {
    pub module: Module,
    pub speak: HeapTypeId,
    pub animal: HeapTypeId,
    pub dog: HeapTypeId,
    pub meow: FunctionId,
    pub bark: FunctionId,
    pub cat_global: GlobalId,
    pub dog_global: GlobalId,
    /// `() -> i32`: `speak(cat) * 100 + speak(dog)` through `call_ref`.
    pub main: FunctionId,
    /// `() -> i32`: calls the reference returned by `speaker_of(dog)`.
    pub fetch_and_call: FunctionId,
}

pub fn zoo() -> Zoo {
    let mut module = Module::new();
    // $speak and $Animal refer to each other.
    let speak = HeapTypeId::new(module.types.len() as u32);
    let animal = HeapTypeId::new(speak.index() + 1);
    assert_eq!(
        module.add_signature("speak", Signature::new([Type::nullable(animal)], [Type::I32])),
        speak
    );
    assert_eq!(
        module.types.push_struct(
            vec![Field::new(Type::non_null(speak)), Field::new(Type::I32)],
            None,
        ),
        animal
    );
    let dog = module.types.push_struct(
        vec![
            Field::new(Type::non_null(speak)),
            Field::new(Type::I32),
            Field::mutable(Type::F64),
        ],
        Some(animal),
    );
    module.set_type_name(animal, "Animal");
    module.set_type_name(dog, "Dog");
    module.set_field_name(animal, 0, "speak");
    module.set_field_name(animal, 1, "legs");

    let meow = module.add_function("meow", speak, vec![], Some(Expr::i32_const(1)));
    let legs = Expr::struct_get(&module.types, Expr::local_get(0, Type::nullable(animal)), 1);
    let bark = module.add_function(
        "bark",
        speak,
        vec![],
        Some(Expr::binary(BinaryOp::AddI32, Expr::i32_const(2), legs)),
    );

    let cat_global = module.add_global(
        "cat",
        Type::non_null(animal),
        false,
        Expr::struct_new(animal, vec![Expr::ref_func(meow, speak), Expr::i32_const(4)]),
    );
    let dog_global = module.add_global(
        "rex",
        Type::non_null(dog),
        false,
        Expr::struct_new(
            dog,
            vec![
                Expr::ref_func(bark, speak),
                Expr::i32_const(4),
                Expr::f64_const(30.0),
            ],
        ),
    );

    // speak_of(a) = call_ref (struct.get 0 a) a
    let speak_of_sig = module.add_signature(
        "speak_of",
        Signature::new([Type::nullable(animal)], [Type::I32]),
    );
    let self_ref = || Expr::local_get(0, Type::nullable(animal));
    let target = Expr::struct_get(&module.types, self_ref(), 0);
    let speak_of_body = Expr::call_ref(&module.types, target, vec![self_ref()]);
    let speak_of = module.add_function("speak_of", speak_of_sig, vec![], Some(speak_of_body));

    // speaker_of(a) = struct.get 0 a
    let speaker_of_sig = module.add_signature(
        "speaker_of",
        Signature::new([Type::nullable(animal)], [Type::non_null(speak)]),
    );
    let speaker_of_body = Expr::struct_get(&module.types, self_ref(), 0);
    let speaker_of = module.add_function("speaker_of", speaker_of_sig, vec![], Some(speaker_of_body));

    let thunk = module.add_signature("thunk", Signature::new([], [Type::I32]));
    let cat = Expr::global_get(cat_global, Type::non_null(animal));
    let rex = Expr::global_get(dog_global, Type::non_null(dog));
    let main_body = Expr::binary(
        BinaryOp::AddI32,
        Expr::binary(
            BinaryOp::MulI32,
            Expr::call(&module.types, speak_of, speak_of_sig, vec![cat]),
            Expr::i32_const(100),
        ),
        Expr::call(&module.types, speak_of, speak_of_sig, vec![rex.clone()]),
    );
    let main = module.add_function("main", thunk, vec![], Some(main_body));

    let fetched = Expr::call(&module.types, speaker_of, speaker_of_sig, vec![rex.clone()]);
    let fetch_body = Expr::call_ref(&module.types, fetched, vec![rex]);
    let fetch_and_call = module.add_function("fetch_and_call", thunk, vec![], Some(fetch_body));

    Zoo {
        module,
        speak,
        animal,
        dog,
        meow,
        bark,
        cat_global,
        dog_global,
        main,
        fetch_and_call,
    }
}
