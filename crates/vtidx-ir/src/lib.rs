// src/lib.rs
//
// Host IR for vtidx: GC heap types, typed expression trees and modules.

pub mod collect;
pub mod expr;
pub mod interp;
pub mod module;
pub mod print;
pub mod type_arena;
pub mod type_builder;
pub mod types;
pub mod visit;

pub use collect::{CollectedTypes, collect_heap_types};
pub use expr::{BinaryOp, Expr, ExprKind, Literal};
pub use interp::{Interpreter, Trap, Value};
pub use module::{CodeOwner, ElementSegment, Function, Global, Module, Table, TypeNames};
pub use print::{print_expr, print_module, print_type};
pub use type_arena::TypeArena;
pub use type_builder::{TypeBuildError, TypeBuilder};
pub use types::{
    Array, BasicHeapType, Field, HeapType, HeapTypeDef, HeapTypeKind, Nullability, PackedType,
    Rtt, Signature, Struct, Type, TypeList,
};
pub use visit::{TypeField, TypeSlot, heap_types_of};

pub use vtidx_identity::{ElemSegmentId, FunctionId, GlobalId, HeapTypeId, TableId};
